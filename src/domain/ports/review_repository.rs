//! Review port.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::Review;

#[async_trait]
pub trait ReviewRepository: Send + Sync {
    /// Insert or overwrite the reviewer's row for the stream.
    /// Returns `true` when the row was newly created (first review by
    /// this reviewer on this stream), `false` on overwrite. An
    /// overwrite preserves a previously set `karma_awarded` flag.
    async fn upsert(&self, review: &Review) -> DomainResult<bool>;

    async fn get(&self, stream_id: Uuid, reviewer_id: Uuid) -> DomainResult<Option<Review>>;

    /// All current reviews for a stream (one per reviewer).
    async fn list_for_stream(&self, stream_id: Uuid) -> DomainResult<Vec<Review>>;

    async fn mark_karma_awarded(&self, stream_id: Uuid, reviewer_id: Uuid) -> DomainResult<()>;
}
