//! Merge queue port.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{MergeEntryStatus, MergeQueueEntry};

#[async_trait]
pub trait MergeQueueRepository: Send + Sync {
    /// Append an entry. Rejects with `Conflict` when the stream already
    /// has a pending or processing entry.
    async fn enqueue(&self, entry: &MergeQueueEntry) -> DomainResult<()>;

    /// Insert at the head of the repository's queue (council
    /// authorisation): the entry gets a priority above every waiting
    /// entry.
    async fn enqueue_front(&self, entry: &MergeQueueEntry) -> DomainResult<()>;

    /// Atomically claim the next pending entry for the repository,
    /// transitioning it to `processing`. Ordering is priority
    /// descending, then admission order.
    async fn pop_next(&self, repo_id: Uuid) -> DomainResult<Option<MergeQueueEntry>>;

    async fn get(&self, id: Uuid) -> DomainResult<Option<MergeQueueEntry>>;

    async fn find_active_for_stream(&self, stream_id: Uuid)
        -> DomainResult<Option<MergeQueueEntry>>;

    async fn set_status(
        &self,
        id: Uuid,
        status: MergeEntryStatus,
        last_error: Option<&str>,
    ) -> DomainResult<()>;

    /// Record the buffer merge commit on a successful entry.
    async fn set_merge_commit(&self, id: Uuid, commit: &str) -> DomainResult<()>;

    async fn list(&self, repo_id: Uuid, status: Option<MergeEntryStatus>)
        -> DomainResult<Vec<MergeQueueEntry>>;

    /// Most recently merged entry for the repository, if any.
    async fn latest_merged(&self, repo_id: Uuid) -> DomainResult<Option<MergeQueueEntry>>;

    async fn count_pending(&self, repo_id: Uuid) -> DomainResult<u32>;
}
