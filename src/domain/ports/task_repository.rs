//! Task market port: tasks and claims.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Claim, Task, TaskStatus};

/// Filter criteria for listing tasks.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub repo_id: Option<Uuid>,
    pub status: Option<TaskStatus>,
}

#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn create(&self, task: &Task) -> DomainResult<()>;

    async fn get(&self, id: Uuid) -> DomainResult<Option<Task>>;

    async fn update(&self, task: &Task) -> DomainResult<()>;

    async fn list(&self, filter: TaskFilter) -> DomainResult<Vec<Task>>;

    async fn create_claim(&self, claim: &Claim) -> DomainResult<()>;

    async fn get_claim(&self, id: Uuid) -> DomainResult<Option<Claim>>;

    async fn update_claim(&self, claim: &Claim) -> DomainResult<()>;

    async fn list_claims_for_task(&self, task_id: Uuid) -> DomainResult<Vec<Claim>>;

    /// The agent's claim on the task that is still in a non-terminal
    /// state, if any. At most one exists by invariant.
    async fn find_open_claim(&self, task_id: Uuid, agent_id: Uuid)
        -> DomainResult<Option<Claim>>;
}
