//! Domain errors for the gitswarm coordination system.
//!
//! Every component below the coordinator returns these typed errors;
//! the coordinator and the CLI map them to wire codes and exit codes
//! exactly once at the boundary.

use thiserror::Error;

/// Domain-level errors with stable wire names.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Permission denied: {0}")]
    Permission(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Consensus not satisfied: {0}")]
    Consensus(String),

    #[error("Git backend error: {0}")]
    GitBackend(String),

    #[error("Rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Dependency unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl DomainError {
    /// Shorthand for a `NotFound` with a displayable id.
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound { entity, id: id.to_string() }
    }

    /// Stable wire name of the error class.
    pub fn wire_code(&self) -> &'static str {
        match self {
            Self::Auth(_) => "auth",
            Self::Permission(_) => "permission",
            Self::Validation(_) => "validation",
            Self::NotFound { .. } => "not_found",
            Self::Conflict(_) => "conflict",
            Self::Consensus(_) => "consensus",
            Self::GitBackend(_) => "git_backend",
            Self::RateLimited { .. } => "rate_limit",
            Self::Unavailable(_) => "unavailable",
            Self::Internal(_) => "internal",
        }
    }

    /// CLI exit code: 0 success, 1 general, 2 usage, 3 not found, 4 conflict.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Validation(_) => 2,
            Self::NotFound { .. } => 3,
            Self::Conflict(_) => 4,
            _ => 1,
        }
    }

    /// Whether the sync flusher may retry an operation failing with this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Internal(_) | Self::RateLimited { .. })
    }
}

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                DomainError::Conflict(db.message().to_string())
            }
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                DomainError::Validation(db.message().to_string())
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                DomainError::Unavailable(err.to_string())
            }
            _ => DomainError::Internal(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::Internal(format!("serialization: {err}"))
    }
}
