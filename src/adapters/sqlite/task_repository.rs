//! SQLite implementation of the TaskRepository.

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Claim, ClaimStatus, Task, TaskPriority, TaskStatus};
use crate::domain::ports::{TaskFilter, TaskRepository};

use super::agent_repository::{parse_timestamp, parse_timestamp_opt, parse_uuid};

#[derive(Clone)]
pub struct SqliteTaskRepository {
    pool: SqlitePool,
}

impl SqliteTaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskRepository for SqliteTaskRepository {
    async fn create(&self, task: &Task) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO tasks (id, repo_id, title, description, status, priority, amount,
               creator_id, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(task.id.to_string())
        .bind(task.repo_id.to_string())
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.status.as_str())
        .bind(task.priority.as_str())
        .bind(task.amount)
        .bind(task.creator_id.map(|id| id.to_string()))
        .bind(task.created_at.to_rfc3339())
        .bind(task.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<Task>> {
        let row: Option<TaskRow> = sqlx::query_as("SELECT * FROM tasks WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn update(&self, task: &Task) -> DomainResult<()> {
        let result = sqlx::query(
            r#"UPDATE tasks SET title = ?, description = ?, status = ?, priority = ?,
               amount = ?, updated_at = ? WHERE id = ?"#,
        )
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.status.as_str())
        .bind(task.priority.as_str())
        .bind(task.amount)
        .bind(task.updated_at.to_rfc3339())
        .bind(task.id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::not_found("task", task.id));
        }
        Ok(())
    }

    async fn list(&self, filter: TaskFilter) -> DomainResult<Vec<Task>> {
        let mut query = String::from("SELECT * FROM tasks WHERE 1=1");
        let mut bindings: Vec<String> = Vec::new();

        if let Some(repo_id) = &filter.repo_id {
            query.push_str(" AND repo_id = ?");
            bindings.push(repo_id.to_string());
        }
        if let Some(status) = &filter.status {
            query.push_str(" AND status = ?");
            bindings.push(status.as_str().to_string());
        }

        query.push_str(
            " ORDER BY CASE priority
                WHEN 'critical' THEN 1
                WHEN 'high' THEN 2
                WHEN 'medium' THEN 3
                WHEN 'low' THEN 4
              END, created_at",
        );

        let mut q = sqlx::query_as::<_, TaskRow>(&query);
        for binding in &bindings {
            q = q.bind(binding);
        }

        let rows: Vec<TaskRow> = q.fetch_all(&self.pool).await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn create_claim(&self, claim: &Claim) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO claims (id, task_id, agent_id, stream_id, status, notes,
               claimed_at, submitted_at, reviewed_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(claim.id.to_string())
        .bind(claim.task_id.to_string())
        .bind(claim.agent_id.to_string())
        .bind(claim.stream_id.map(|id| id.to_string()))
        .bind(claim.status.as_str())
        .bind(&claim.notes)
        .bind(claim.claimed_at.to_rfc3339())
        .bind(claim.submitted_at.map(|t| t.to_rfc3339()))
        .bind(claim.reviewed_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_claim(&self, id: Uuid) -> DomainResult<Option<Claim>> {
        let row: Option<ClaimRow> = sqlx::query_as("SELECT * FROM claims WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn update_claim(&self, claim: &Claim) -> DomainResult<()> {
        let result = sqlx::query(
            r#"UPDATE claims SET stream_id = ?, status = ?, notes = ?,
               submitted_at = ?, reviewed_at = ? WHERE id = ?"#,
        )
        .bind(claim.stream_id.map(|id| id.to_string()))
        .bind(claim.status.as_str())
        .bind(&claim.notes)
        .bind(claim.submitted_at.map(|t| t.to_rfc3339()))
        .bind(claim.reviewed_at.map(|t| t.to_rfc3339()))
        .bind(claim.id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::not_found("claim", claim.id));
        }
        Ok(())
    }

    async fn list_claims_for_task(&self, task_id: Uuid) -> DomainResult<Vec<Claim>> {
        let rows: Vec<ClaimRow> =
            sqlx::query_as("SELECT * FROM claims WHERE task_id = ? ORDER BY claimed_at")
                .bind(task_id.to_string())
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn find_open_claim(
        &self,
        task_id: Uuid,
        agent_id: Uuid,
    ) -> DomainResult<Option<Claim>> {
        let row: Option<ClaimRow> = sqlx::query_as(
            r#"SELECT * FROM claims WHERE task_id = ? AND agent_id = ?
               AND status IN ('active', 'submitted') LIMIT 1"#,
        )
        .bind(task_id.to_string())
        .bind(agent_id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.map(TryInto::try_into).transpose()
    }
}

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: String,
    repo_id: String,
    title: String,
    description: Option<String>,
    status: String,
    priority: String,
    amount: i64,
    creator_id: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<TaskRow> for Task {
    type Error = DomainError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        Ok(Task {
            id: parse_uuid(&row.id, "task")?,
            repo_id: parse_uuid(&row.repo_id, "repository")?,
            title: row.title,
            description: row.description,
            status: TaskStatus::from_str(&row.status)
                .ok_or_else(|| DomainError::Internal(format!("bad task status: {}", row.status)))?,
            priority: TaskPriority::from_str(&row.priority).ok_or_else(|| {
                DomainError::Internal(format!("bad task priority: {}", row.priority))
            })?,
            amount: row.amount,
            creator_id: row.creator_id.as_deref().map(|s| parse_uuid(s, "agent")).transpose()?,
            created_at: parse_timestamp(&row.created_at)?,
            updated_at: parse_timestamp(&row.updated_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ClaimRow {
    id: String,
    task_id: String,
    agent_id: String,
    stream_id: Option<String>,
    status: String,
    notes: Option<String>,
    claimed_at: String,
    submitted_at: Option<String>,
    reviewed_at: Option<String>,
}

impl TryFrom<ClaimRow> for Claim {
    type Error = DomainError;

    fn try_from(row: ClaimRow) -> Result<Self, Self::Error> {
        Ok(Claim {
            id: parse_uuid(&row.id, "claim")?,
            task_id: parse_uuid(&row.task_id, "task")?,
            agent_id: parse_uuid(&row.agent_id, "agent")?,
            stream_id: row.stream_id.as_deref().map(|s| parse_uuid(s, "stream")).transpose()?,
            status: ClaimStatus::from_str(&row.status)
                .ok_or_else(|| DomainError::Internal(format!("bad claim status: {}", row.status)))?,
            notes: row.notes,
            claimed_at: parse_timestamp(&row.claimed_at)?,
            submitted_at: parse_timestamp_opt(row.submitted_at.as_deref())?,
            reviewed_at: parse_timestamp_opt(row.reviewed_at.as_deref())?,
        })
    }
}
