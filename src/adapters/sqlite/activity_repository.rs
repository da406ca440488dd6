//! SQLite implementation of the ActivityRepository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{ActivityEvent, EventFilter};
use crate::domain::ports::ActivityRepository;

use super::agent_repository::{parse_timestamp, parse_uuid};

#[derive(Clone)]
pub struct SqliteActivityRepository {
    pool: SqlitePool,
}

impl SqliteActivityRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ActivityRepository for SqliteActivityRepository {
    async fn append(&self, event: &ActivityEvent) -> DomainResult<()> {
        let metadata = serde_json::to_string(&event.metadata)?;
        sqlx::query(
            r#"INSERT INTO activity_events
               (id, agent_id, event_type, target_type, target_id, metadata, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(event.id.to_string())
        .bind(event.agent_id.map(|id| id.to_string()))
        .bind(&event.event_type)
        .bind(&event.target_type)
        .bind(&event.target_id)
        .bind(&metadata)
        .bind(event.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn query(&self, filter: &EventFilter, limit: u32) -> DomainResult<Vec<ActivityEvent>> {
        let mut query = String::from("SELECT * FROM activity_events WHERE 1=1");
        let mut bindings: Vec<String> = Vec::new();

        if let Some(ref target) = filter.target_type {
            query.push_str(" AND target_type = ?");
            bindings.push(target.clone());
        }
        if let Some(agent_id) = filter.agent_id {
            query.push_str(" AND agent_id = ?");
            bindings.push(agent_id.to_string());
        }
        if let Some(ref types) = filter.event_types {
            if !types.is_empty() {
                let placeholders = vec!["?"; types.len()].join(", ");
                query.push_str(&format!(" AND event_type IN ({placeholders})"));
                bindings.extend(types.iter().cloned());
            }
        }

        query.push_str(" ORDER BY created_at DESC LIMIT ?");

        let mut q = sqlx::query_as::<_, EventRow>(&query);
        for binding in &bindings {
            q = q.bind(binding);
        }
        q = q.bind(i64::from(limit));

        let rows: Vec<EventRow> = q.fetch_all(&self.pool).await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }
}

#[derive(sqlx::FromRow)]
struct EventRow {
    id: String,
    agent_id: Option<String>,
    event_type: String,
    target_type: String,
    target_id: String,
    metadata: String,
    created_at: String,
}

impl TryFrom<EventRow> for ActivityEvent {
    type Error = DomainError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        Ok(ActivityEvent {
            id: parse_uuid(&row.id, "activity event")?,
            agent_id: row.agent_id.as_deref().map(|s| parse_uuid(s, "agent")).transpose()?,
            event_type: row.event_type,
            target_type: row.target_type,
            target_id: row.target_id,
            metadata: serde_json::from_str(&row.metadata)?,
            created_at: parse_timestamp(&row.created_at)?,
        })
    }
}
