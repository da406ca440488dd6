//! SQLite implementation of the RepoRepository.

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    AgentAccess, ConsensusAuthority, MergeMode, OwnershipModel, RepoStage, Repository,
};
use crate::domain::ports::{RepoRepository, StageChange};

use super::agent_repository::{parse_timestamp, parse_uuid};

#[derive(Clone)]
pub struct SqliteRepoRepository {
    pool: SqlitePool,
}

impl SqliteRepoRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RepoRepository for SqliteRepoRepository {
    async fn create(&self, repo: &Repository) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO repositories (
                id, name, stage, ownership_model, merge_mode, agent_access,
                min_karma, consensus_threshold, min_reviews, human_review_weight,
                buffer_branch, promote_target, stabilize_command, stabilize_timeout,
                auto_promote_on_green, auto_revert_on_red, consensus_authority,
                last_green_commit, contributor_count, patch_count, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(repo.id.to_string())
        .bind(&repo.name)
        .bind(repo.stage.as_str())
        .bind(repo.ownership_model.as_str())
        .bind(repo.merge_mode.as_str())
        .bind(repo.agent_access.as_str())
        .bind(repo.min_karma)
        .bind(repo.consensus_threshold)
        .bind(i64::from(repo.min_reviews))
        .bind(repo.human_review_weight)
        .bind(&repo.buffer_branch)
        .bind(&repo.promote_target)
        .bind(&repo.stabilize_command)
        .bind(repo.stabilize_timeout as i64)
        .bind(repo.auto_promote_on_green)
        .bind(repo.auto_revert_on_red)
        .bind(repo.consensus_authority.as_str())
        .bind(&repo.last_green_commit)
        .bind(i64::from(repo.contributor_count))
        .bind(i64::from(repo.patch_count))
        .bind(repo.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<Repository>> {
        let row: Option<RepoRow> = sqlx::query_as("SELECT * FROM repositories WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn get_by_name(&self, name: &str) -> DomainResult<Option<Repository>> {
        let row: Option<RepoRow> = sqlx::query_as("SELECT * FROM repositories WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn list(&self) -> DomainResult<Vec<Repository>> {
        let rows: Vec<RepoRow> = sqlx::query_as("SELECT * FROM repositories ORDER BY created_at")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn update(&self, repo: &Repository) -> DomainResult<()> {
        let result = sqlx::query(
            r#"UPDATE repositories SET
                ownership_model = ?, merge_mode = ?, agent_access = ?,
                min_karma = ?, consensus_threshold = ?, min_reviews = ?,
                human_review_weight = ?, buffer_branch = ?, promote_target = ?,
                stabilize_command = ?, stabilize_timeout = ?,
                auto_promote_on_green = ?, auto_revert_on_red = ?,
                consensus_authority = ?
               WHERE id = ?"#,
        )
        .bind(repo.ownership_model.as_str())
        .bind(repo.merge_mode.as_str())
        .bind(repo.agent_access.as_str())
        .bind(repo.min_karma)
        .bind(repo.consensus_threshold)
        .bind(i64::from(repo.min_reviews))
        .bind(repo.human_review_weight)
        .bind(&repo.buffer_branch)
        .bind(&repo.promote_target)
        .bind(&repo.stabilize_command)
        .bind(repo.stabilize_timeout as i64)
        .bind(repo.auto_promote_on_green)
        .bind(repo.auto_revert_on_red)
        .bind(repo.consensus_authority.as_str())
        .bind(repo.id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::not_found("repository", repo.id));
        }
        Ok(())
    }

    async fn set_stage(&self, id: Uuid, stage: RepoStage) -> DomainResult<()> {
        let result = sqlx::query("UPDATE repositories SET stage = ? WHERE id = ?")
            .bind(stage.as_str())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DomainError::not_found("repository", id));
        }
        Ok(())
    }

    async fn set_last_green_commit(&self, id: Uuid, commit: Option<&str>) -> DomainResult<()> {
        sqlx::query("UPDATE repositories SET last_green_commit = ? WHERE id = ?")
            .bind(commit)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_counters(&self, id: Uuid, contributors: u32, patches: u32) -> DomainResult<()> {
        sqlx::query("UPDATE repositories SET contributor_count = ?, patch_count = ? WHERE id = ?")
            .bind(i64::from(contributors))
            .bind(i64::from(patches))
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn record_stage_change(&self, change: &StageChange) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO stage_history (repo_id, from_stage, to_stage, forced, changed_at)
               VALUES (?, ?, ?, ?, ?)"#,
        )
        .bind(change.repo_id.to_string())
        .bind(change.from_stage.as_str())
        .bind(change.to_stage.as_str())
        .bind(change.forced)
        .bind(change.changed_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn stage_history(&self, repo_id: Uuid) -> DomainResult<Vec<StageChange>> {
        let rows: Vec<(String, String, String, bool, String)> = sqlx::query_as(
            r#"SELECT repo_id, from_stage, to_stage, forced, changed_at
               FROM stage_history WHERE repo_id = ? ORDER BY changed_at"#,
        )
        .bind(repo_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(repo, from, to, forced, at)| {
                Ok(StageChange {
                    repo_id: parse_uuid(&repo, "repository")?,
                    from_stage: parse_stage(&from)?,
                    to_stage: parse_stage(&to)?,
                    forced,
                    changed_at: parse_timestamp(&at)?,
                })
            })
            .collect()
    }
}

fn parse_stage(s: &str) -> DomainResult<RepoStage> {
    RepoStage::from_str(s).ok_or_else(|| DomainError::Internal(format!("bad stage in store: {s}")))
}

#[derive(sqlx::FromRow)]
struct RepoRow {
    id: String,
    name: String,
    stage: String,
    ownership_model: String,
    merge_mode: String,
    agent_access: String,
    min_karma: i64,
    consensus_threshold: f64,
    min_reviews: i64,
    human_review_weight: f64,
    buffer_branch: String,
    promote_target: String,
    stabilize_command: Option<String>,
    stabilize_timeout: i64,
    auto_promote_on_green: bool,
    auto_revert_on_red: bool,
    consensus_authority: String,
    last_green_commit: Option<String>,
    contributor_count: i64,
    patch_count: i64,
    created_at: String,
}

impl TryFrom<RepoRow> for Repository {
    type Error = DomainError;

    fn try_from(row: RepoRow) -> Result<Self, Self::Error> {
        let bad = |field: &str, value: &str| {
            DomainError::Internal(format!("bad repository {field} in store: {value}"))
        };
        Ok(Repository {
            id: parse_uuid(&row.id, "repository")?,
            name: row.name,
            stage: RepoStage::from_str(&row.stage).ok_or_else(|| bad("stage", &row.stage))?,
            ownership_model: OwnershipModel::from_str(&row.ownership_model)
                .ok_or_else(|| bad("ownership_model", &row.ownership_model))?,
            merge_mode: MergeMode::from_str(&row.merge_mode)
                .ok_or_else(|| bad("merge_mode", &row.merge_mode))?,
            agent_access: AgentAccess::from_str(&row.agent_access)
                .ok_or_else(|| bad("agent_access", &row.agent_access))?,
            min_karma: row.min_karma,
            consensus_threshold: row.consensus_threshold,
            min_reviews: u32::try_from(row.min_reviews.max(1)).unwrap_or(1),
            human_review_weight: row.human_review_weight,
            buffer_branch: row.buffer_branch,
            promote_target: row.promote_target,
            stabilize_command: row.stabilize_command,
            stabilize_timeout: u64::try_from(row.stabilize_timeout.max(0)).unwrap_or(600),
            auto_promote_on_green: row.auto_promote_on_green,
            auto_revert_on_red: row.auto_revert_on_red,
            consensus_authority: ConsensusAuthority::from_str(&row.consensus_authority)
                .ok_or_else(|| bad("consensus_authority", &row.consensus_authority))?,
            last_green_commit: row.last_green_commit,
            contributor_count: u32::try_from(row.contributor_count.max(0)).unwrap_or(0),
            patch_count: u32::try_from(row.patch_count.max(0)).unwrap_or(0),
            created_at: parse_timestamp(&row.created_at)?,
        })
    }
}
