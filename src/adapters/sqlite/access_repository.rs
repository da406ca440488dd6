//! SQLite implementation of the AccessRepository.

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    AccessGrant, AccessLevel, BranchRule, DirectPush, Maintainer, MaintainerRole,
};
use crate::domain::ports::AccessRepository;

use super::agent_repository::{parse_timestamp, parse_timestamp_opt, parse_uuid};

#[derive(Clone)]
pub struct SqliteAccessRepository {
    pool: SqlitePool,
}

impl SqliteAccessRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccessRepository for SqliteAccessRepository {
    async fn upsert_grant(&self, grant: &AccessGrant) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO repo_access (repo_id, agent_id, level, expires_at, granted_at)
               VALUES (?, ?, ?, ?, ?)
               ON CONFLICT (repo_id, agent_id)
               DO UPDATE SET level = excluded.level, expires_at = excluded.expires_at"#,
        )
        .bind(grant.repo_id.to_string())
        .bind(grant.agent_id.to_string())
        .bind(grant.level.as_str())
        .bind(grant.expires_at.map(|t| t.to_rfc3339()))
        .bind(grant.granted_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_grant(&self, repo_id: Uuid, agent_id: Uuid) -> DomainResult<Option<AccessGrant>> {
        let row: Option<GrantRow> =
            sqlx::query_as("SELECT * FROM repo_access WHERE repo_id = ? AND agent_id = ?")
                .bind(repo_id.to_string())
                .bind(agent_id.to_string())
                .fetch_optional(&self.pool)
                .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn revoke_grant(&self, repo_id: Uuid, agent_id: Uuid) -> DomainResult<()> {
        sqlx::query("DELETE FROM repo_access WHERE repo_id = ? AND agent_id = ?")
            .bind(repo_id.to_string())
            .bind(agent_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn add_maintainer(&self, maintainer: &Maintainer) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO maintainers (repo_id, agent_id, role, added_at)
               VALUES (?, ?, ?, ?)
               ON CONFLICT (repo_id, agent_id) DO UPDATE SET role = excluded.role"#,
        )
        .bind(maintainer.repo_id.to_string())
        .bind(maintainer.agent_id.to_string())
        .bind(maintainer.role.as_str())
        .bind(maintainer.added_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove_maintainer(&self, repo_id: Uuid, agent_id: Uuid) -> DomainResult<()> {
        let result = sqlx::query("DELETE FROM maintainers WHERE repo_id = ? AND agent_id = ?")
            .bind(repo_id.to_string())
            .bind(agent_id.to_string())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DomainError::not_found("maintainer", agent_id));
        }
        Ok(())
    }

    async fn get_maintainer(
        &self,
        repo_id: Uuid,
        agent_id: Uuid,
    ) -> DomainResult<Option<Maintainer>> {
        let row: Option<MaintainerRow> =
            sqlx::query_as("SELECT * FROM maintainers WHERE repo_id = ? AND agent_id = ?")
                .bind(repo_id.to_string())
                .bind(agent_id.to_string())
                .fetch_optional(&self.pool)
                .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn list_maintainers(&self, repo_id: Uuid) -> DomainResult<Vec<Maintainer>> {
        let rows: Vec<MaintainerRow> =
            sqlx::query_as("SELECT * FROM maintainers WHERE repo_id = ? ORDER BY added_at")
                .bind(repo_id.to_string())
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn count_with_role(&self, repo_id: Uuid, role: MaintainerRole) -> DomainResult<u32> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM maintainers WHERE repo_id = ? AND role = ?")
                .bind(repo_id.to_string())
                .bind(role.as_str())
                .fetch_one(&self.pool)
                .await?;
        Ok(u32::try_from(count.max(0)).unwrap_or(0))
    }

    async fn create_branch_rule(&self, rule: &BranchRule) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO branch_rules
               (id, repo_id, pattern, direct_push, required_approvals, require_tests_pass, priority)
               VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(rule.id.to_string())
        .bind(rule.repo_id.to_string())
        .bind(&rule.pattern)
        .bind(rule.direct_push.as_str())
        .bind(i64::from(rule.required_approvals))
        .bind(rule.require_tests_pass)
        .bind(rule.priority)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_branch_rules(&self, repo_id: Uuid) -> DomainResult<Vec<BranchRule>> {
        let rows: Vec<BranchRuleRow> =
            sqlx::query_as("SELECT * FROM branch_rules WHERE repo_id = ? ORDER BY priority DESC")
                .bind(repo_id.to_string())
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }
}

#[derive(sqlx::FromRow)]
struct GrantRow {
    repo_id: String,
    agent_id: String,
    level: String,
    expires_at: Option<String>,
    granted_at: String,
}

impl TryFrom<GrantRow> for AccessGrant {
    type Error = DomainError;

    fn try_from(row: GrantRow) -> Result<Self, Self::Error> {
        Ok(AccessGrant {
            repo_id: parse_uuid(&row.repo_id, "repository")?,
            agent_id: parse_uuid(&row.agent_id, "agent")?,
            level: AccessLevel::from_str(&row.level)
                .ok_or_else(|| DomainError::Internal(format!("bad access level: {}", row.level)))?,
            expires_at: parse_timestamp_opt(row.expires_at.as_deref())?,
            granted_at: parse_timestamp(&row.granted_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct MaintainerRow {
    repo_id: String,
    agent_id: String,
    role: String,
    added_at: String,
}

impl TryFrom<MaintainerRow> for Maintainer {
    type Error = DomainError;

    fn try_from(row: MaintainerRow) -> Result<Self, Self::Error> {
        Ok(Maintainer {
            repo_id: parse_uuid(&row.repo_id, "repository")?,
            agent_id: parse_uuid(&row.agent_id, "agent")?,
            role: MaintainerRole::from_str(&row.role)
                .ok_or_else(|| DomainError::Internal(format!("bad role: {}", row.role)))?,
            added_at: parse_timestamp(&row.added_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct BranchRuleRow {
    id: String,
    repo_id: String,
    pattern: String,
    direct_push: String,
    required_approvals: i64,
    require_tests_pass: bool,
    priority: i64,
}

impl TryFrom<BranchRuleRow> for BranchRule {
    type Error = DomainError;

    fn try_from(row: BranchRuleRow) -> Result<Self, Self::Error> {
        Ok(BranchRule {
            id: parse_uuid(&row.id, "branch rule")?,
            repo_id: parse_uuid(&row.repo_id, "repository")?,
            pattern: row.pattern,
            direct_push: DirectPush::from_str(&row.direct_push).ok_or_else(|| {
                DomainError::Internal(format!("bad direct_push: {}", row.direct_push))
            })?,
            required_approvals: u32::try_from(row.required_approvals.max(0)).unwrap_or(0),
            require_tests_pass: row.require_tests_pass,
            priority: row.priority,
        })
    }
}
