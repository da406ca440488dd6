//! Sync protocol service: outbound flusher and inbound delta apply.
//!
//! Outbound events drain strictly in local-id order. Server failures
//! reschedule with capped exponential backoff; validation and conflict
//! responses drop the item (retrying cannot help). Inbound deltas are
//! applied idempotently keyed by `(table, id, updated_at)`.

use backoff::backoff::Backoff;
use backoff::ExponentialBackoffBuilder;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::adapters::server::SyncClient;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{DeltaRow, SyncCategory, SyncEventType, SyncQueueItem};
use crate::domain::ports::SyncRepository;

const FLUSH_BATCH_SIZE: u32 = 50;
const FLUSH_IDLE_INTERVAL: Duration = Duration::from_secs(10);
/// Backoff ceiling for failed pushes.
const MAX_BACKOFF: Duration = Duration::from_secs(300);

pub struct SyncService {
    queue: Arc<dyn SyncRepository>,
    client: Arc<SyncClient>,
    /// Apply target for inbound deltas (the embedded store).
    pool: SqlitePool,
}

/// Summary of one flush pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub pushed: u32,
    pub dropped: u32,
    pub failed: u32,
}

impl SyncService {
    pub fn new(queue: Arc<dyn SyncRepository>, client: Arc<SyncClient>, pool: SqlitePool) -> Self {
        Self { queue, client, pool }
    }

    /// Record an outbound event (called alongside state changes).
    pub async fn enqueue(
        &self,
        event_type: SyncEventType,
        payload: serde_json::Value,
    ) -> DomainResult<i64> {
        self.queue.enqueue(event_type, &payload).await
    }

    /// One flush pass: push ready batches until the queue is empty or
    /// a batch fails. Cancellable between batches only.
    pub async fn flush_once(&self, cancel: &CancellationToken) -> DomainResult<FlushReport> {
        let mut report = FlushReport::default();

        loop {
            if cancel.is_cancelled() {
                break;
            }
            let batch = self.queue.next_batch(Utc::now(), FLUSH_BATCH_SIZE).await?;
            if batch.is_empty() {
                break;
            }

            match self.client.push_events(&batch).await {
                Ok(push) => {
                    self.queue.delete(&push.accepted).await?;
                    report.pushed += push.accepted.len() as u32;
                    // Anything the server did not accept stays queued
                    // and retries on the next pass.
                    if push.accepted.len() < batch.len() {
                        let rejected: Vec<&SyncQueueItem> = batch
                            .iter()
                            .filter(|i| !push.accepted.contains(&i.id))
                            .collect();
                        for item in rejected {
                            self.record_failure(item, "rejected by server", &mut report).await?;
                        }
                        break;
                    }
                }
                Err(e) if e.is_retryable() => {
                    for item in &batch {
                        self.record_failure(item, &e.to_string(), &mut report).await?;
                    }
                    break;
                }
                Err(e) => {
                    // Validation/conflict classes never retry; drop the
                    // batch and log. Availability beats completeness
                    // here, mirroring the activity writer.
                    warn!(error = %e, count = batch.len(), "dropping unsyncable batch");
                    let ids: Vec<i64> = batch.iter().map(|i| i.id).collect();
                    self.queue.delete(&ids).await?;
                    report.dropped += ids.len() as u32;
                }
            }
        }

        Ok(report)
    }

    async fn record_failure(
        &self,
        item: &SyncQueueItem,
        error: &str,
        report: &mut FlushReport,
    ) -> DomainResult<()> {
        let next_attempt = Utc::now() + backoff_delay(item.attempts);
        self.queue.record_failure(item.id, error, next_attempt).await?;
        report.failed += 1;
        Ok(())
    }

    /// Background flusher loop; exits on cancellation.
    pub async fn run_flusher(self: Arc<Self>, cancel: CancellationToken) {
        info!("sync flusher started");
        loop {
            match self.flush_once(&cancel).await {
                Ok(report) if report.pushed > 0 || report.dropped > 0 => {
                    debug!(?report, "sync flush pass complete");
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "sync flush pass failed"),
            }
            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(FLUSH_IDLE_INTERVAL) => {}
            }
        }
        info!("sync flusher stopped");
    }

    /// Poll every category for inbound deltas and apply them.
    pub async fn pull_updates(&self) -> DomainResult<u32> {
        let mut applied = 0;
        for &category in SyncCategory::all() {
            let cursor = self.queue.get_cursor(category).await?;
            let delta = self.client.fetch_updates(category, cursor.as_deref()).await?;
            for row in &delta.rows {
                if self.apply_row(row).await? {
                    applied += 1;
                }
            }
            self.queue.set_cursor(category, &delta.next_cursor).await?;
        }
        Ok(applied)
    }

    /// Apply one delta row. Re-applying the same `(table, id,
    /// updated_at)` is a no-op, which makes retries safe.
    async fn apply_row(&self, row: &DeltaRow) -> DomainResult<bool> {
        let table = allowed_table(&row.table)?;
        // Tables keyed by composite ids or without an updated_at column
        // skip the staleness guard; INSERT OR REPLACE keeps the apply
        // idempotent there regardless.
        let existing: Option<(String,)> = sqlx::query_as(&format!(
            "SELECT updated_at FROM {table} WHERE id = ?"
        ))
        .bind(&row.id)
        .fetch_optional(&self.pool)
        .await
        .ok()
        .flatten();

        if let Some((updated_at,)) = existing {
            let current = DateTime::parse_from_rfc3339(&updated_at)
                .map(|t| t.with_timezone(&Utc))
                .unwrap_or(DateTime::<Utc>::MIN_UTC);
            if current >= row.updated_at {
                return Ok(false);
            }
        }

        let Some(object) = row.data.as_object() else {
            return Err(DomainError::Validation("delta row payload must be an object".to_string()));
        };

        let columns: Vec<&str> = object.keys().map(String::as_str).collect();
        let placeholders = vec!["?"; columns.len()].join(", ");
        let query = format!(
            "INSERT OR REPLACE INTO {table} ({}) VALUES ({placeholders})",
            columns.join(", ")
        );

        let mut q = sqlx::query(&query);
        for column in &columns {
            q = bind_json(q, &object[*column]);
        }
        q.execute(&self.pool).await?;
        Ok(true)
    }

    pub async fn pending_count(&self) -> DomainResult<u64> {
        self.queue.pending_count().await
    }

    /// Authoritative consensus answer from the server.
    pub async fn remote_consensus(
        &self,
        stream_id: uuid::Uuid,
    ) -> DomainResult<crate::domain::models::ConsensusDecision> {
        self.client.fetch_consensus(stream_id).await
    }
}

/// Exponential backoff for a failed item, derived from its attempt
/// count and capped at five minutes.
fn backoff_delay(attempts: u32) -> ChronoDuration {
    let mut builder = ExponentialBackoffBuilder::new();
    builder
        .with_initial_interval(Duration::from_secs(2))
        .with_multiplier(2.0)
        .with_randomization_factor(0.0)
        .with_max_interval(MAX_BACKOFF)
        .with_max_elapsed_time(None);
    let mut backoff = builder.build();

    let mut delay = Duration::from_secs(2);
    for _ in 0..attempts {
        match backoff.next_backoff() {
            Some(next) => delay = next,
            None => break,
        }
    }
    ChronoDuration::from_std(delay.min(MAX_BACKOFF)).unwrap_or(ChronoDuration::seconds(300))
}

/// Inbound deltas may only touch the replicated governance tables.
fn allowed_table(table: &str) -> DomainResult<&str> {
    const ALLOWED: &[&str] = &[
        "tasks",
        "claims",
        "repo_access",
        "maintainers",
        "proposals",
        "council_votes",
        "reviews",
        "streams",
        "merge_queue",
        "repositories",
    ];
    ALLOWED
        .iter()
        .find(|t| **t == table)
        .copied()
        .ok_or_else(|| DomainError::Validation(format!("table {table} is not replicated")))
}

fn bind_json<'q>(
    query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    value: &'q serde_json::Value,
) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    match value {
        serde_json::Value::Null => query.bind(Option::<String>::None),
        serde_json::Value::Bool(b) => query.bind(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                query.bind(i)
            } else {
                query.bind(n.as_f64().unwrap_or(0.0))
            }
        }
        serde_json::Value::String(s) => query.bind(s.as_str()),
        other => query.bind(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_and_caps() {
        let d0 = backoff_delay(0);
        let d1 = backoff_delay(1);
        let d3 = backoff_delay(3);
        assert!(d0 <= d1);
        assert!(d1 <= d3);
        let capped = backoff_delay(20);
        assert!(capped <= ChronoDuration::seconds(300));
    }

    #[test]
    fn test_allowed_table_rejects_unknown() {
        assert!(allowed_table("tasks").is_ok());
        assert!(allowed_table("agents; DROP TABLE agents").is_err());
        assert!(allowed_table("schema_migrations").is_err());
    }
}
