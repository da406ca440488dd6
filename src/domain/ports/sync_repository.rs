//! Client-side sync state port: outbound queue and inbound cursors.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::errors::DomainResult;
use crate::domain::models::{SyncCategory, SyncEventType, SyncQueueItem};

#[async_trait]
pub trait SyncRepository: Send + Sync {
    /// Append an event to the outbound queue; returns the local id.
    async fn enqueue(
        &self,
        event_type: SyncEventType,
        payload: &serde_json::Value,
    ) -> DomainResult<i64>;

    /// Next batch in strict local-id order, skipping items whose
    /// backoff deadline has not yet arrived.
    async fn next_batch(&self, now: DateTime<Utc>, limit: u32)
        -> DomainResult<Vec<SyncQueueItem>>;

    async fn delete(&self, ids: &[i64]) -> DomainResult<()>;

    /// Record a failed push attempt and its backoff deadline.
    async fn record_failure(
        &self,
        id: i64,
        error: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> DomainResult<()>;

    async fn pending_count(&self) -> DomainResult<u64>;

    async fn get_cursor(&self, category: SyncCategory) -> DomainResult<Option<String>>;

    async fn set_cursor(&self, category: SyncCategory, cursor: &str) -> DomainResult<()>;
}
