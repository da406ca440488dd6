//! Agent repository port.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Agent, AgentStatus};

/// Credential material for token authentication. Verification scans
/// these rows and compares in constant time.
#[derive(Debug, Clone)]
pub struct AgentCredential {
    pub agent_id: Uuid,
    pub salt: String,
    pub hash: String,
}

#[async_trait]
pub trait AgentRepository: Send + Sync {
    async fn create(&self, agent: &Agent) -> DomainResult<()>;

    async fn get(&self, id: Uuid) -> DomainResult<Option<Agent>>;

    async fn get_by_name(&self, name: &str) -> DomainResult<Option<Agent>>;

    async fn list(&self) -> DomainResult<Vec<Agent>>;

    async fn update_bio(&self, id: Uuid, bio: Option<&str>) -> DomainResult<()>;

    async fn set_status(&self, id: Uuid, status: AgentStatus) -> DomainResult<()>;

    /// Credentials of all active agents, for token verification.
    async fn list_credentials(&self) -> DomainResult<Vec<AgentCredential>>;

    /// Adjust karma by `delta`, clamping at zero; returns the new value.
    async fn adjust_karma(&self, id: Uuid, delta: i64) -> DomainResult<i64>;
}
