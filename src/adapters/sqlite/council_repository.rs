//! SQLite implementation of the CouncilRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    Council, CouncilMember, CouncilRole, CouncilStatus, Proposal, ProposalAction, ProposalStatus,
    VoteChoice,
};
use crate::domain::ports::CouncilRepository;

use super::agent_repository::{parse_timestamp, parse_timestamp_opt, parse_uuid};

#[derive(Clone)]
pub struct SqliteCouncilRepository {
    pool: SqlitePool,
}

impl SqliteCouncilRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CouncilRepository for SqliteCouncilRepository {
    async fn create(&self, council: &Council) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO councils (id, repo_id, status, min_members, max_members,
               standard_quorum, critical_quorum, term_days, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(council.id.to_string())
        .bind(council.repo_id.to_string())
        .bind(council.status.as_str())
        .bind(i64::from(council.min_members))
        .bind(i64::from(council.max_members))
        .bind(i64::from(council.standard_quorum))
        .bind(i64::from(council.critical_quorum))
        .bind(i64::from(council.term_days))
        .bind(council.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| match DomainError::from(e) {
            DomainError::Conflict(_) => {
                DomainError::Conflict("repository already has a council".to_string())
            }
            other => other,
        })?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<Council>> {
        let row: Option<CouncilRow> = sqlx::query_as("SELECT * FROM councils WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn get_by_repo(&self, repo_id: Uuid) -> DomainResult<Option<Council>> {
        let row: Option<CouncilRow> = sqlx::query_as("SELECT * FROM councils WHERE repo_id = ?")
            .bind(repo_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn set_status(&self, id: Uuid, status: CouncilStatus) -> DomainResult<()> {
        let result = sqlx::query("UPDATE councils SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DomainError::not_found("council", id));
        }
        Ok(())
    }

    async fn add_member(&self, member: &CouncilMember) -> DomainResult<bool> {
        let result = sqlx::query(
            r#"INSERT OR IGNORE INTO council_members
               (council_id, agent_id, role, term_expires_at, votes_cast, joined_at)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(member.council_id.to_string())
        .bind(member.agent_id.to_string())
        .bind(member.role.as_str())
        .bind(member.term_expires_at.map(|t| t.to_rfc3339()))
        .bind(i64::from(member.votes_cast))
        .bind(member.joined_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn remove_member(&self, council_id: Uuid, agent_id: Uuid) -> DomainResult<()> {
        let result =
            sqlx::query("DELETE FROM council_members WHERE council_id = ? AND agent_id = ?")
                .bind(council_id.to_string())
                .bind(agent_id.to_string())
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(DomainError::not_found("council member", agent_id));
        }
        Ok(())
    }

    async fn get_member(
        &self,
        council_id: Uuid,
        agent_id: Uuid,
    ) -> DomainResult<Option<CouncilMember>> {
        let row: Option<MemberRow> =
            sqlx::query_as("SELECT * FROM council_members WHERE council_id = ? AND agent_id = ?")
                .bind(council_id.to_string())
                .bind(agent_id.to_string())
                .fetch_optional(&self.pool)
                .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn list_members(&self, council_id: Uuid) -> DomainResult<Vec<CouncilMember>> {
        let rows: Vec<MemberRow> =
            sqlx::query_as("SELECT * FROM council_members WHERE council_id = ? ORDER BY joined_at")
                .bind(council_id.to_string())
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn member_count(&self, council_id: Uuid) -> DomainResult<u32> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM council_members WHERE council_id = ?")
                .bind(council_id.to_string())
                .fetch_one(&self.pool)
                .await?;
        Ok(u32::try_from(count.max(0)).unwrap_or(0))
    }

    async fn create_proposal(&self, proposal: &Proposal) -> DomainResult<()> {
        let action_json = serde_json::to_string(&proposal.action)?;
        sqlx::query(
            r#"INSERT INTO proposals (id, council_id, proposer_id, title, proposal_type,
               action_data, status, votes_for, votes_against, votes_abstain, quorum_required,
               resolution, expires_at, executed, execution_result, created_at, decided_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(proposal.id.to_string())
        .bind(proposal.council_id.to_string())
        .bind(proposal.proposer_id.to_string())
        .bind(&proposal.title)
        .bind(proposal.action.proposal_type())
        .bind(&action_json)
        .bind(proposal.status.as_str())
        .bind(i64::from(proposal.votes_for))
        .bind(i64::from(proposal.votes_against))
        .bind(i64::from(proposal.votes_abstain))
        .bind(i64::from(proposal.quorum_required))
        .bind(&proposal.resolution)
        .bind(proposal.expires_at.map(|t| t.to_rfc3339()))
        .bind(proposal.executed)
        .bind(&proposal.execution_result)
        .bind(proposal.created_at.to_rfc3339())
        .bind(proposal.decided_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_proposal(&self, id: Uuid) -> DomainResult<Option<Proposal>> {
        let row: Option<ProposalRow> = sqlx::query_as("SELECT * FROM proposals WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn list_proposals(
        &self,
        council_id: Uuid,
        status: Option<ProposalStatus>,
    ) -> DomainResult<Vec<Proposal>> {
        let rows: Vec<ProposalRow> = match status {
            Some(status) => {
                sqlx::query_as(
                    "SELECT * FROM proposals WHERE council_id = ? AND status = ? ORDER BY created_at DESC",
                )
                .bind(council_id.to_string())
                .bind(status.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(
                    "SELECT * FROM proposals WHERE council_id = ? ORDER BY created_at DESC",
                )
                .bind(council_id.to_string())
                .fetch_all(&self.pool)
                .await?
            }
        };
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn cast_vote(
        &self,
        proposal_id: Uuid,
        agent_id: Uuid,
        vote: VoteChoice,
    ) -> DomainResult<(Proposal, bool)> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        let existing: Option<(String,)> =
            sqlx::query_as("SELECT vote FROM council_votes WHERE proposal_id = ? AND agent_id = ?")
                .bind(proposal_id.to_string())
                .bind(agent_id.to_string())
                .fetch_optional(&mut *tx)
                .await?;
        let newly_created = existing.is_none();

        sqlx::query(
            r#"INSERT INTO council_votes (proposal_id, agent_id, vote, cast_at, updated_at)
               VALUES (?, ?, ?, ?, ?)
               ON CONFLICT (proposal_id, agent_id)
               DO UPDATE SET vote = excluded.vote, updated_at = excluded.updated_at"#,
        )
        .bind(proposal_id.to_string())
        .bind(agent_id.to_string())
        .bind(vote.as_str())
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        // Recompute aggregates from the vote rows inside the same
        // transaction; observers never see counters out of step.
        sqlx::query(
            r#"UPDATE proposals SET
                votes_for = (SELECT COUNT(*) FROM council_votes WHERE proposal_id = ? AND vote = 'for'),
                votes_against = (SELECT COUNT(*) FROM council_votes WHERE proposal_id = ? AND vote = 'against'),
                votes_abstain = (SELECT COUNT(*) FROM council_votes WHERE proposal_id = ? AND vote = 'abstain')
               WHERE id = ?"#,
        )
        .bind(proposal_id.to_string())
        .bind(proposal_id.to_string())
        .bind(proposal_id.to_string())
        .bind(proposal_id.to_string())
        .execute(&mut *tx)
        .await?;

        let row: Option<ProposalRow> = sqlx::query_as("SELECT * FROM proposals WHERE id = ?")
            .bind(proposal_id.to_string())
            .fetch_optional(&mut *tx)
            .await?;

        tx.commit().await?;

        let proposal = row
            .ok_or_else(|| DomainError::not_found("proposal", proposal_id))?
            .try_into()?;
        Ok((proposal, newly_created))
    }

    async fn resolve_proposal(
        &self,
        id: Uuid,
        status: ProposalStatus,
        resolution: Option<&str>,
        decided_at: DateTime<Utc>,
    ) -> DomainResult<()> {
        let result = sqlx::query(
            r#"UPDATE proposals SET status = ?, resolution = ?, decided_at = ?
               WHERE id = ? AND status = 'open'"#,
        )
        .bind(status.as_str())
        .bind(resolution)
        .bind(decided_at.to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::Conflict(format!("proposal {id} is no longer open")));
        }
        Ok(())
    }

    async fn record_execution(&self, id: Uuid, executed: bool, result: &str) -> DomainResult<()> {
        sqlx::query("UPDATE proposals SET executed = ?, execution_result = ? WHERE id = ?")
            .bind(executed)
            .bind(result)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn expire_overdue(&self, now: DateTime<Utc>) -> DomainResult<Vec<Proposal>> {
        let rows: Vec<ProposalRow> = sqlx::query_as(
            r#"SELECT * FROM proposals
               WHERE status = 'open' AND expires_at IS NOT NULL AND expires_at <= ?"#,
        )
        .bind(now.to_rfc3339())
        .fetch_all(&self.pool)
        .await?;

        let expired: Vec<Proposal> =
            rows.into_iter().map(TryInto::try_into).collect::<DomainResult<_>>()?;

        for proposal in &expired {
            sqlx::query(
                "UPDATE proposals SET status = 'expired', decided_at = ? WHERE id = ? AND status = 'open'",
            )
            .bind(now.to_rfc3339())
            .bind(proposal.id.to_string())
            .execute(&self.pool)
            .await?;
        }

        Ok(expired)
    }

    async fn increment_votes_cast(&self, council_id: Uuid, agent_id: Uuid) -> DomainResult<()> {
        sqlx::query(
            "UPDATE council_members SET votes_cast = votes_cast + 1 WHERE council_id = ? AND agent_id = ?",
        )
        .bind(council_id.to_string())
        .bind(agent_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct CouncilRow {
    id: String,
    repo_id: String,
    status: String,
    min_members: i64,
    max_members: i64,
    standard_quorum: i64,
    critical_quorum: i64,
    term_days: i64,
    created_at: String,
}

impl TryFrom<CouncilRow> for Council {
    type Error = DomainError;

    fn try_from(row: CouncilRow) -> Result<Self, Self::Error> {
        Ok(Council {
            id: parse_uuid(&row.id, "council")?,
            repo_id: parse_uuid(&row.repo_id, "repository")?,
            status: CouncilStatus::from_str(&row.status)
                .ok_or_else(|| DomainError::Internal(format!("bad council status: {}", row.status)))?,
            min_members: u32::try_from(row.min_members.max(0)).unwrap_or(0),
            max_members: u32::try_from(row.max_members.max(0)).unwrap_or(0),
            standard_quorum: u32::try_from(row.standard_quorum.max(0)).unwrap_or(0),
            critical_quorum: u32::try_from(row.critical_quorum.max(0)).unwrap_or(0),
            term_days: u32::try_from(row.term_days.max(0)).unwrap_or(0),
            created_at: parse_timestamp(&row.created_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct MemberRow {
    council_id: String,
    agent_id: String,
    role: String,
    term_expires_at: Option<String>,
    votes_cast: i64,
    joined_at: String,
}

impl TryFrom<MemberRow> for CouncilMember {
    type Error = DomainError;

    fn try_from(row: MemberRow) -> Result<Self, Self::Error> {
        Ok(CouncilMember {
            council_id: parse_uuid(&row.council_id, "council")?,
            agent_id: parse_uuid(&row.agent_id, "agent")?,
            role: CouncilRole::from_str(&row.role)
                .ok_or_else(|| DomainError::Internal(format!("bad council role: {}", row.role)))?,
            term_expires_at: parse_timestamp_opt(row.term_expires_at.as_deref())?,
            votes_cast: u32::try_from(row.votes_cast.max(0)).unwrap_or(0),
            joined_at: parse_timestamp(&row.joined_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ProposalRow {
    id: String,
    council_id: String,
    proposer_id: String,
    title: String,
    #[allow(dead_code)]
    proposal_type: String,
    action_data: String,
    status: String,
    votes_for: i64,
    votes_against: i64,
    votes_abstain: i64,
    quorum_required: i64,
    resolution: Option<String>,
    expires_at: Option<String>,
    executed: bool,
    execution_result: Option<String>,
    created_at: String,
    decided_at: Option<String>,
}

impl TryFrom<ProposalRow> for Proposal {
    type Error = DomainError;

    fn try_from(row: ProposalRow) -> Result<Self, Self::Error> {
        let action: ProposalAction = serde_json::from_str(&row.action_data)?;
        Ok(Proposal {
            id: parse_uuid(&row.id, "proposal")?,
            council_id: parse_uuid(&row.council_id, "council")?,
            proposer_id: parse_uuid(&row.proposer_id, "agent")?,
            title: row.title,
            action,
            status: ProposalStatus::from_str(&row.status).ok_or_else(|| {
                DomainError::Internal(format!("bad proposal status: {}", row.status))
            })?,
            votes_for: u32::try_from(row.votes_for.max(0)).unwrap_or(0),
            votes_against: u32::try_from(row.votes_against.max(0)).unwrap_or(0),
            votes_abstain: u32::try_from(row.votes_abstain.max(0)).unwrap_or(0),
            quorum_required: u32::try_from(row.quorum_required.max(0)).unwrap_or(0),
            resolution: row.resolution,
            expires_at: parse_timestamp_opt(row.expires_at.as_deref())?,
            executed: row.executed,
            execution_result: row.execution_result,
            created_at: parse_timestamp(&row.created_at)?,
            decided_at: parse_timestamp_opt(row.decided_at.as_deref())?,
        })
    }
}
