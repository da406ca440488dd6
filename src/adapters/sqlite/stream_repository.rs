//! SQLite implementation of the StreamRepository.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{ReviewStatus, Stream, StreamStatus, WorktreeBinding};
use crate::domain::ports::{StreamFilter, StreamRepository};

use super::agent_repository::{parse_timestamp, parse_uuid};

#[derive(Clone)]
pub struct SqliteStreamRepository {
    pool: SqlitePool,
}

impl SqliteStreamRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StreamRepository for SqliteStreamRepository {
    async fn create(&self, stream: &Stream) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO streams (id, repo_id, agent_id, name, branch_ref, base_branch,
               parent_stream_id, task_id, status, review_status, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(stream.id.to_string())
        .bind(stream.repo_id.to_string())
        .bind(stream.agent_id.to_string())
        .bind(&stream.name)
        .bind(&stream.branch_ref)
        .bind(&stream.base_branch)
        .bind(stream.parent_stream_id.map(|id| id.to_string()))
        .bind(stream.task_id.map(|id| id.to_string()))
        .bind(stream.status.as_str())
        .bind(stream.review_status.as_str())
        .bind(stream.created_at.to_rfc3339())
        .bind(stream.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| match DomainError::from(e) {
            DomainError::Conflict(_) => DomainError::Conflict(format!(
                "agent already has an active stream on branch {}",
                stream.branch_ref
            )),
            other => other,
        })?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<Stream>> {
        let row: Option<StreamRow> = sqlx::query_as("SELECT * FROM streams WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn list(&self, filter: StreamFilter) -> DomainResult<Vec<Stream>> {
        let mut query = String::from("SELECT * FROM streams WHERE 1=1");
        let mut bindings: Vec<String> = Vec::new();

        if let Some(repo_id) = &filter.repo_id {
            query.push_str(" AND repo_id = ?");
            bindings.push(repo_id.to_string());
        }
        if let Some(agent_id) = &filter.agent_id {
            query.push_str(" AND agent_id = ?");
            bindings.push(agent_id.to_string());
        }
        if let Some(status) = &filter.status {
            query.push_str(" AND status = ?");
            bindings.push(status.as_str().to_string());
        }

        query.push_str(" ORDER BY created_at DESC");

        let mut q = sqlx::query_as::<_, StreamRow>(&query);
        for binding in &bindings {
            q = q.bind(binding);
        }

        let rows: Vec<StreamRow> = q.fetch_all(&self.pool).await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn set_status(&self, id: Uuid, status: StreamStatus) -> DomainResult<()> {
        let current = self.get(id).await?.ok_or_else(|| DomainError::not_found("stream", id))?;

        if !current.status.can_transition_to(status) {
            return Err(DomainError::Conflict(format!(
                "stream {} cannot move from {} to {}",
                id,
                current.status.as_str(),
                status.as_str()
            )));
        }

        // Guard on the status we just read so concurrent transitions
        // serialise: the second writer sees zero rows affected.
        let result = sqlx::query(
            "UPDATE streams SET status = ?, updated_at = ? WHERE id = ? AND status = ?",
        )
        .bind(status.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .bind(current.status.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::Conflict(format!(
                "stream {id} was transitioned concurrently"
            )));
        }
        Ok(())
    }

    async fn set_review_status(&self, id: Uuid, review_status: ReviewStatus) -> DomainResult<()> {
        let result = sqlx::query(
            "UPDATE streams SET review_status = ?, updated_at = ? WHERE id = ?",
        )
        .bind(review_status.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DomainError::not_found("stream", id));
        }
        Ok(())
    }

    async fn touch(&self, id: Uuid) -> DomainResult<()> {
        sqlx::query("UPDATE streams SET updated_at = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn count_merged_authors(&self, repo_id: Uuid) -> DomainResult<u32> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(DISTINCT agent_id) FROM streams WHERE repo_id = ? AND status = 'merged'",
        )
        .bind(repo_id.to_string())
        .fetch_one(&self.pool)
        .await?;
        Ok(u32::try_from(count.max(0)).unwrap_or(0))
    }

    async fn count_by_status(&self, repo_id: Uuid, status: StreamStatus) -> DomainResult<u32> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM streams WHERE repo_id = ? AND status = ?")
                .bind(repo_id.to_string())
                .bind(status.as_str())
                .fetch_one(&self.pool)
                .await?;
        Ok(u32::try_from(count.max(0)).unwrap_or(0))
    }

    async fn bind_worktree(&self, binding: &WorktreeBinding) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO worktrees (id, repo_id, agent_id, stream_id, path, created_at)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(binding.id.to_string())
        .bind(binding.repo_id.to_string())
        .bind(binding.agent_id.to_string())
        .bind(binding.stream_id.to_string())
        .bind(&binding.path)
        .bind(binding.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| match DomainError::from(e) {
            DomainError::Conflict(_) => {
                DomainError::Conflict("agent already has a worktree in this repository".to_string())
            }
            other => other,
        })?;
        Ok(())
    }

    async fn get_worktree(
        &self,
        repo_id: Uuid,
        agent_id: Uuid,
    ) -> DomainResult<Option<WorktreeBinding>> {
        let row: Option<WorktreeRow> =
            sqlx::query_as("SELECT * FROM worktrees WHERE repo_id = ? AND agent_id = ?")
                .bind(repo_id.to_string())
                .bind(agent_id.to_string())
                .fetch_optional(&self.pool)
                .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn remove_worktree(&self, repo_id: Uuid, agent_id: Uuid) -> DomainResult<()> {
        let result = sqlx::query("DELETE FROM worktrees WHERE repo_id = ? AND agent_id = ?")
            .bind(repo_id.to_string())
            .bind(agent_id.to_string())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DomainError::not_found("worktree", agent_id));
        }
        Ok(())
    }

    async fn list_worktrees(&self, repo_id: Uuid) -> DomainResult<Vec<WorktreeBinding>> {
        let rows: Vec<WorktreeRow> =
            sqlx::query_as("SELECT * FROM worktrees WHERE repo_id = ? ORDER BY created_at")
                .bind(repo_id.to_string())
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }
}

#[derive(sqlx::FromRow)]
struct StreamRow {
    id: String,
    repo_id: String,
    agent_id: String,
    name: String,
    branch_ref: String,
    base_branch: String,
    parent_stream_id: Option<String>,
    task_id: Option<String>,
    status: String,
    review_status: String,
    created_at: String,
    updated_at: String,
}

impl TryFrom<StreamRow> for Stream {
    type Error = DomainError;

    fn try_from(row: StreamRow) -> Result<Self, Self::Error> {
        Ok(Stream {
            id: parse_uuid(&row.id, "stream")?,
            repo_id: parse_uuid(&row.repo_id, "repository")?,
            agent_id: parse_uuid(&row.agent_id, "agent")?,
            name: row.name,
            branch_ref: row.branch_ref,
            base_branch: row.base_branch,
            parent_stream_id: row
                .parent_stream_id
                .as_deref()
                .map(|s| parse_uuid(s, "stream"))
                .transpose()?,
            task_id: row.task_id.as_deref().map(|s| parse_uuid(s, "task")).transpose()?,
            status: StreamStatus::from_str(&row.status)
                .ok_or_else(|| DomainError::Internal(format!("bad stream status: {}", row.status)))?,
            review_status: ReviewStatus::from_str(&row.review_status).ok_or_else(|| {
                DomainError::Internal(format!("bad review status: {}", row.review_status))
            })?,
            created_at: parse_timestamp(&row.created_at)?,
            updated_at: parse_timestamp(&row.updated_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct WorktreeRow {
    id: String,
    repo_id: String,
    agent_id: String,
    stream_id: String,
    path: String,
    created_at: String,
}

impl TryFrom<WorktreeRow> for WorktreeBinding {
    type Error = DomainError;

    fn try_from(row: WorktreeRow) -> Result<Self, Self::Error> {
        Ok(WorktreeBinding {
            id: parse_uuid(&row.id, "worktree")?,
            repo_id: parse_uuid(&row.repo_id, "repository")?,
            agent_id: parse_uuid(&row.agent_id, "agent")?,
            stream_id: parse_uuid(&row.stream_id, "stream")?,
            path: row.path,
            created_at: parse_timestamp(&row.created_at)?,
        })
    }
}
