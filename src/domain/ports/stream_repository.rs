//! Stream and worktree-binding port.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{ReviewStatus, Stream, StreamStatus, WorktreeBinding};

/// Filter criteria for listing streams.
#[derive(Debug, Clone, Default)]
pub struct StreamFilter {
    pub repo_id: Option<Uuid>,
    pub agent_id: Option<Uuid>,
    pub status: Option<StreamStatus>,
}

#[async_trait]
pub trait StreamRepository: Send + Sync {
    async fn create(&self, stream: &Stream) -> DomainResult<()>;

    async fn get(&self, id: Uuid) -> DomainResult<Option<Stream>>;

    async fn list(&self, filter: StreamFilter) -> DomainResult<Vec<Stream>>;

    /// Transition the stream status, enforcing monotonicity; bumps
    /// `updated_at`.
    async fn set_status(&self, id: Uuid, status: StreamStatus) -> DomainResult<()>;

    async fn set_review_status(&self, id: Uuid, review_status: ReviewStatus) -> DomainResult<()>;

    /// Bump `updated_at` (after a commit).
    async fn touch(&self, id: Uuid) -> DomainResult<()>;

    /// Distinct authors of merged streams, for the contributor metric.
    async fn count_merged_authors(&self, repo_id: Uuid) -> DomainResult<u32>;

    async fn count_by_status(&self, repo_id: Uuid, status: StreamStatus) -> DomainResult<u32>;

    // Worktree bindings: at most one per (agent, repo).

    async fn bind_worktree(&self, binding: &WorktreeBinding) -> DomainResult<()>;

    async fn get_worktree(&self, repo_id: Uuid, agent_id: Uuid)
        -> DomainResult<Option<WorktreeBinding>>;

    async fn remove_worktree(&self, repo_id: Uuid, agent_id: Uuid) -> DomainResult<()>;

    async fn list_worktrees(&self, repo_id: Uuid) -> DomainResult<Vec<WorktreeBinding>>;
}
