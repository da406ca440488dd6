//! Activity log port. Append-only.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{ActivityEvent, EventFilter};

#[async_trait]
pub trait ActivityRepository: Send + Sync {
    async fn append(&self, event: &ActivityEvent) -> DomainResult<()>;

    /// Newest-first query with an optional filter.
    async fn query(&self, filter: &EventFilter, limit: u32) -> DomainResult<Vec<ActivityEvent>>;
}
