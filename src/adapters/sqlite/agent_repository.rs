//! SQLite implementation of the AgentRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Agent, AgentStatus};
use crate::domain::ports::{AgentCredential, AgentRepository};

#[derive(Clone)]
pub struct SqliteAgentRepository {
    pool: SqlitePool,
}

impl SqliteAgentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AgentRepository for SqliteAgentRepository {
    async fn create(&self, agent: &Agent) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO agents (id, name, bio, api_key_hash, api_key_salt, karma, status, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(agent.id.to_string())
        .bind(&agent.name)
        .bind(&agent.bio)
        .bind(&agent.api_key_hash)
        .bind(&agent.api_key_salt)
        .bind(agent.karma)
        .bind(agent.status.as_str())
        .bind(agent.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<Agent>> {
        let row: Option<AgentRow> = sqlx::query_as("SELECT * FROM agents WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn get_by_name(&self, name: &str) -> DomainResult<Option<Agent>> {
        let row: Option<AgentRow> = sqlx::query_as("SELECT * FROM agents WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn list(&self) -> DomainResult<Vec<Agent>> {
        let rows: Vec<AgentRow> = sqlx::query_as("SELECT * FROM agents ORDER BY created_at")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn update_bio(&self, id: Uuid, bio: Option<&str>) -> DomainResult<()> {
        let result = sqlx::query("UPDATE agents SET bio = ? WHERE id = ?")
            .bind(bio)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DomainError::not_found("agent", id));
        }
        Ok(())
    }

    async fn set_status(&self, id: Uuid, status: AgentStatus) -> DomainResult<()> {
        let result = sqlx::query("UPDATE agents SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DomainError::not_found("agent", id));
        }
        Ok(())
    }

    async fn list_credentials(&self) -> DomainResult<Vec<AgentCredential>> {
        let rows: Vec<(String, String, String)> = sqlx::query_as(
            "SELECT id, api_key_salt, api_key_hash FROM agents WHERE status = 'active'",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(id, salt, hash)| {
                Ok(AgentCredential {
                    agent_id: parse_uuid(&id, "agent")?,
                    salt,
                    hash,
                })
            })
            .collect()
    }

    async fn adjust_karma(&self, id: Uuid, delta: i64) -> DomainResult<i64> {
        let result = sqlx::query("UPDATE agents SET karma = MAX(0, karma + ?) WHERE id = ?")
            .bind(delta)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DomainError::not_found("agent", id));
        }

        let (karma,): (i64,) = sqlx::query_as("SELECT karma FROM agents WHERE id = ?")
            .bind(id.to_string())
            .fetch_one(&self.pool)
            .await?;
        Ok(karma)
    }
}

#[derive(sqlx::FromRow)]
struct AgentRow {
    id: String,
    name: String,
    bio: Option<String>,
    api_key_hash: String,
    api_key_salt: String,
    karma: i64,
    status: String,
    created_at: String,
}

impl TryFrom<AgentRow> for Agent {
    type Error = DomainError;

    fn try_from(row: AgentRow) -> Result<Self, Self::Error> {
        Ok(Agent {
            id: parse_uuid(&row.id, "agent")?,
            name: row.name,
            bio: row.bio,
            api_key_hash: row.api_key_hash,
            api_key_salt: row.api_key_salt,
            karma: row.karma,
            status: AgentStatus::from_str(&row.status)
                .ok_or_else(|| DomainError::Internal(format!("bad agent status: {}", row.status)))?,
            created_at: parse_timestamp(&row.created_at)?,
        })
    }
}

pub(crate) fn parse_uuid(s: &str, entity: &'static str) -> DomainResult<Uuid> {
    Uuid::parse_str(s)
        .map_err(|_| DomainError::Internal(format!("malformed {entity} id in store: {s}")))
}

pub(crate) fn parse_timestamp(s: &str) -> DomainResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| DomainError::Internal(format!("malformed timestamp in store: {s}")))
}

pub(crate) fn parse_timestamp_opt(s: Option<&str>) -> DomainResult<Option<DateTime<Utc>>> {
    s.map(parse_timestamp).transpose()
}
