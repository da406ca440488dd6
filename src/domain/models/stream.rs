//! Streams: governed feature branches, and their worktree bindings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a stream. Transitions are monotonic: once a
/// stream leaves `active`/`in_review` it never returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamStatus {
    Active,
    InReview,
    Merged,
    Abandoned,
    Reverted,
}

impl Default for StreamStatus {
    fn default() -> Self {
        Self::Active
    }
}

impl StreamStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::InReview => "in_review",
            Self::Merged => "merged",
            Self::Abandoned => "abandoned",
            Self::Reverted => "reverted",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "active" => Some(Self::Active),
            "in_review" => Some(Self::InReview),
            "merged" => Some(Self::Merged),
            "abandoned" => Some(Self::Abandoned),
            "reverted" => Some(Self::Reverted),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Merged | Self::Abandoned | Self::Reverted)
    }

    /// Valid transitions from this status.
    pub fn valid_transitions(&self) -> &'static [StreamStatus] {
        match self {
            Self::Active => &[Self::InReview, Self::Merged, Self::Abandoned],
            Self::InReview => &[Self::Merged, Self::Abandoned],
            // A merged stream can only be rolled back by stabilization.
            Self::Merged => &[Self::Reverted],
            Self::Abandoned | Self::Reverted => &[],
        }
    }

    pub fn can_transition_to(&self, next: Self) -> bool {
        self.valid_transitions().contains(&next)
    }
}

/// Aggregated review state of a stream, derived from its reviews.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Pending,
    InReview,
    Approved,
    ChangesRequested,
}

impl Default for ReviewStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InReview => "in_review",
            Self::Approved => "approved",
            Self::ChangesRequested => "changes_requested",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "in_review" => Some(Self::InReview),
            "approved" => Some(Self::Approved),
            "changes_requested" => Some(Self::ChangesRequested),
            _ => None,
        }
    }
}

/// A stream: a named branch owned by one agent with review metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stream {
    pub id: Uuid,
    pub repo_id: Uuid,
    pub agent_id: Uuid,
    pub name: String,
    pub branch_ref: String,
    pub base_branch: String,
    pub parent_stream_id: Option<Uuid>,
    pub task_id: Option<Uuid>,
    pub status: StreamStatus,
    pub review_status: ReviewStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Stream {
    pub fn new(
        repo_id: Uuid,
        agent_id: Uuid,
        name: impl Into<String>,
        branch_ref: impl Into<String>,
        base_branch: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            repo_id,
            agent_id,
            name: name.into(),
            branch_ref: branch_ref.into(),
            base_branch: base_branch.into(),
            parent_stream_id: None,
            task_id: None,
            status: StreamStatus::Active,
            review_status: ReviewStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Binding between an agent and its single worktree in a repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorktreeBinding {
    pub id: Uuid,
    pub repo_id: Uuid,
    pub agent_id: Uuid,
    pub stream_id: Uuid,
    pub path: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_monotonicity() {
        assert!(StreamStatus::Active.can_transition_to(StreamStatus::InReview));
        assert!(StreamStatus::InReview.can_transition_to(StreamStatus::Merged));
        assert!(StreamStatus::Merged.can_transition_to(StreamStatus::Reverted));
        // Never back to active.
        assert!(!StreamStatus::Merged.can_transition_to(StreamStatus::Active));
        assert!(!StreamStatus::Abandoned.can_transition_to(StreamStatus::Active));
        assert!(!StreamStatus::Reverted.can_transition_to(StreamStatus::Active));
    }

    #[test]
    fn test_terminal_states() {
        assert!(!StreamStatus::Active.is_terminal());
        assert!(!StreamStatus::InReview.is_terminal());
        assert!(StreamStatus::Merged.is_terminal());
        assert!(StreamStatus::Abandoned.is_terminal());
        assert!(StreamStatus::Reverted.is_terminal());
    }

    #[test]
    fn test_status_roundtrip() {
        for s in [
            StreamStatus::Active,
            StreamStatus::InReview,
            StreamStatus::Merged,
            StreamStatus::Abandoned,
            StreamStatus::Reverted,
        ] {
            assert_eq!(StreamStatus::from_str(s.as_str()), Some(s));
        }
    }
}
