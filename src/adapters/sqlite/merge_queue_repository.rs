//! SQLite implementation of the MergeQueueRepository.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{MergeEntryStatus, MergeQueueEntry};
use crate::domain::ports::MergeQueueRepository;

use super::agent_repository::{parse_timestamp, parse_uuid};

#[derive(Clone)]
pub struct SqliteMergeQueueRepository {
    pool: SqlitePool,
}

impl SqliteMergeQueueRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn insert(&self, entry: &MergeQueueEntry) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO merge_queue (id, repo_id, stream_id, requester_id, status, priority,
               council_authorized, attempts, last_error, merge_commit, enqueued_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(entry.id.to_string())
        .bind(entry.repo_id.to_string())
        .bind(entry.stream_id.to_string())
        .bind(entry.requester_id.to_string())
        .bind(entry.status.as_str())
        .bind(entry.priority)
        .bind(entry.council_authorized)
        .bind(i64::from(entry.attempts))
        .bind(&entry.last_error)
        .bind(&entry.merge_commit)
        .bind(entry.enqueued_at.to_rfc3339())
        .bind(entry.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn reject_duplicate(&self, stream_id: Uuid) -> DomainResult<()> {
        if self.find_active_for_stream(stream_id).await?.is_some() {
            return Err(DomainError::Conflict(format!(
                "stream {stream_id} already has a queued merge request"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl MergeQueueRepository for SqliteMergeQueueRepository {
    async fn enqueue(&self, entry: &MergeQueueEntry) -> DomainResult<()> {
        self.reject_duplicate(entry.stream_id).await?;
        self.insert(entry).await
    }

    async fn enqueue_front(&self, entry: &MergeQueueEntry) -> DomainResult<()> {
        self.reject_duplicate(entry.stream_id).await?;

        let (max_priority,): (Option<i64>,) = sqlx::query_as(
            "SELECT MAX(priority) FROM merge_queue WHERE repo_id = ? AND status = 'pending'",
        )
        .bind(entry.repo_id.to_string())
        .fetch_one(&self.pool)
        .await?;

        let mut front = entry.clone();
        front.priority = max_priority.unwrap_or(0) + 1;
        self.insert(&front).await
    }

    async fn pop_next(&self, repo_id: Uuid) -> DomainResult<Option<MergeQueueEntry>> {
        // Single-statement claim keeps concurrent workers from taking
        // the same entry.
        let row: Option<EntryRow> = sqlx::query_as(
            r#"UPDATE merge_queue SET status = 'processing', attempts = attempts + 1, updated_at = ?
               WHERE id = (
                   SELECT id FROM merge_queue
                   WHERE repo_id = ? AND status = 'pending'
                   ORDER BY priority DESC, enqueued_at ASC, id ASC
                   LIMIT 1
               )
               RETURNING *"#,
        )
        .bind(Utc::now().to_rfc3339())
        .bind(repo_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<MergeQueueEntry>> {
        let row: Option<EntryRow> = sqlx::query_as("SELECT * FROM merge_queue WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn find_active_for_stream(
        &self,
        stream_id: Uuid,
    ) -> DomainResult<Option<MergeQueueEntry>> {
        let row: Option<EntryRow> = sqlx::query_as(
            r#"SELECT * FROM merge_queue WHERE stream_id = ?
               AND status IN ('pending', 'processing') LIMIT 1"#,
        )
        .bind(stream_id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn set_status(
        &self,
        id: Uuid,
        status: MergeEntryStatus,
        last_error: Option<&str>,
    ) -> DomainResult<()> {
        let result = sqlx::query(
            "UPDATE merge_queue SET status = ?, last_error = ?, updated_at = ? WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(last_error)
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::not_found("merge queue entry", id));
        }
        Ok(())
    }

    async fn set_merge_commit(&self, id: Uuid, commit: &str) -> DomainResult<()> {
        sqlx::query("UPDATE merge_queue SET merge_commit = ?, updated_at = ? WHERE id = ?")
            .bind(commit)
            .bind(Utc::now().to_rfc3339())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list(
        &self,
        repo_id: Uuid,
        status: Option<MergeEntryStatus>,
    ) -> DomainResult<Vec<MergeQueueEntry>> {
        let rows: Vec<EntryRow> = match status {
            Some(status) => {
                sqlx::query_as(
                    r#"SELECT * FROM merge_queue WHERE repo_id = ? AND status = ?
                       ORDER BY priority DESC, enqueued_at ASC"#,
                )
                .bind(repo_id.to_string())
                .bind(status.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(
                    "SELECT * FROM merge_queue WHERE repo_id = ? ORDER BY priority DESC, enqueued_at ASC",
                )
                .bind(repo_id.to_string())
                .fetch_all(&self.pool)
                .await?
            }
        };
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn latest_merged(&self, repo_id: Uuid) -> DomainResult<Option<MergeQueueEntry>> {
        let row: Option<EntryRow> = sqlx::query_as(
            r#"SELECT * FROM merge_queue WHERE repo_id = ? AND status = 'merged'
               ORDER BY updated_at DESC LIMIT 1"#,
        )
        .bind(repo_id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn count_pending(&self, repo_id: Uuid) -> DomainResult<u32> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM merge_queue WHERE repo_id = ? AND status = 'pending'",
        )
        .bind(repo_id.to_string())
        .fetch_one(&self.pool)
        .await?;
        Ok(u32::try_from(count.max(0)).unwrap_or(0))
    }
}

#[derive(sqlx::FromRow)]
struct EntryRow {
    id: String,
    repo_id: String,
    stream_id: String,
    requester_id: String,
    status: String,
    priority: i64,
    council_authorized: bool,
    attempts: i64,
    last_error: Option<String>,
    merge_commit: Option<String>,
    enqueued_at: String,
    updated_at: String,
}

impl TryFrom<EntryRow> for MergeQueueEntry {
    type Error = DomainError;

    fn try_from(row: EntryRow) -> Result<Self, Self::Error> {
        Ok(MergeQueueEntry {
            id: parse_uuid(&row.id, "merge queue entry")?,
            repo_id: parse_uuid(&row.repo_id, "repository")?,
            stream_id: parse_uuid(&row.stream_id, "stream")?,
            requester_id: parse_uuid(&row.requester_id, "agent")?,
            status: MergeEntryStatus::from_str(&row.status).ok_or_else(|| {
                DomainError::Internal(format!("bad merge entry status: {}", row.status))
            })?,
            priority: row.priority,
            council_authorized: row.council_authorized,
            attempts: u32::try_from(row.attempts.max(0)).unwrap_or(0),
            last_error: row.last_error,
            merge_commit: row.merge_commit,
            enqueued_at: parse_timestamp(&row.enqueued_at)?,
            updated_at: parse_timestamp(&row.updated_at)?,
        })
    }
}
