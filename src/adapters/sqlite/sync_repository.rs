//! SQLite implementation of the SyncRepository (client-side state).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{SyncCategory, SyncEventType, SyncQueueItem};
use crate::domain::ports::SyncRepository;

use super::agent_repository::{parse_timestamp, parse_timestamp_opt};

#[derive(Clone)]
pub struct SqliteSyncRepository {
    pool: SqlitePool,
}

impl SqliteSyncRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SyncRepository for SqliteSyncRepository {
    async fn enqueue(
        &self,
        event_type: SyncEventType,
        payload: &serde_json::Value,
    ) -> DomainResult<i64> {
        let payload_json = serde_json::to_string(payload)?;
        let result = sqlx::query(
            "INSERT INTO sync_queue (event_type, payload, created_at) VALUES (?, ?, ?)",
        )
        .bind(event_type.as_str())
        .bind(&payload_json)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    async fn next_batch(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> DomainResult<Vec<SyncQueueItem>> {
        let rows: Vec<ItemRow> = sqlx::query_as(
            r#"SELECT * FROM sync_queue
               WHERE next_attempt_at IS NULL OR next_attempt_at <= ?
               ORDER BY id ASC LIMIT ?"#,
        )
        .bind(now.to_rfc3339())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn delete(&self, ids: &[i64]) -> DomainResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let query = format!("DELETE FROM sync_queue WHERE id IN ({placeholders})");
        let mut q = sqlx::query(&query);
        for id in ids {
            q = q.bind(id);
        }
        q.execute(&self.pool).await?;
        Ok(())
    }

    async fn record_failure(
        &self,
        id: i64,
        error: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> DomainResult<()> {
        sqlx::query(
            r#"UPDATE sync_queue SET attempts = attempts + 1, last_error = ?, next_attempt_at = ?
               WHERE id = ?"#,
        )
        .bind(error)
        .bind(next_attempt_at.to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn pending_count(&self) -> DomainResult<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sync_queue")
            .fetch_one(&self.pool)
            .await?;
        Ok(u64::try_from(count.max(0)).unwrap_or(0))
    }

    async fn get_cursor(&self, category: SyncCategory) -> DomainResult<Option<String>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT cursor FROM sync_cursors WHERE category = ?")
                .bind(category.as_str())
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(c,)| c))
    }

    async fn set_cursor(&self, category: SyncCategory, cursor: &str) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO sync_cursors (category, cursor, updated_at) VALUES (?, ?, ?)
               ON CONFLICT (category)
               DO UPDATE SET cursor = excluded.cursor, updated_at = excluded.updated_at"#,
        )
        .bind(category.as_str())
        .bind(cursor)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct ItemRow {
    id: i64,
    event_type: String,
    payload: String,
    attempts: i64,
    last_error: Option<String>,
    next_attempt_at: Option<String>,
    created_at: String,
}

impl TryFrom<ItemRow> for SyncQueueItem {
    type Error = DomainError;

    fn try_from(row: ItemRow) -> Result<Self, Self::Error> {
        Ok(SyncQueueItem {
            id: row.id,
            event_type: row.event_type,
            payload: serde_json::from_str(&row.payload)?,
            attempts: u32::try_from(row.attempts.max(0)).unwrap_or(0),
            last_error: row.last_error,
            next_attempt_at: parse_timestamp_opt(row.next_attempt_at.as_deref())?,
            created_at: parse_timestamp(&row.created_at)?,
        })
    }
}
