//! Council port: membership, proposals, votes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{
    Council, CouncilMember, CouncilStatus, Proposal, ProposalStatus, VoteChoice,
};

#[async_trait]
pub trait CouncilRepository: Send + Sync {
    async fn create(&self, council: &Council) -> DomainResult<()>;

    async fn get(&self, id: Uuid) -> DomainResult<Option<Council>>;

    async fn get_by_repo(&self, repo_id: Uuid) -> DomainResult<Option<Council>>;

    async fn set_status(&self, id: Uuid, status: CouncilStatus) -> DomainResult<()>;

    /// Insert a member; idempotent on `(council, agent)`. Returns
    /// `true` if the seat was newly created.
    async fn add_member(&self, member: &CouncilMember) -> DomainResult<bool>;

    async fn remove_member(&self, council_id: Uuid, agent_id: Uuid) -> DomainResult<()>;

    async fn get_member(&self, council_id: Uuid, agent_id: Uuid)
        -> DomainResult<Option<CouncilMember>>;

    async fn list_members(&self, council_id: Uuid) -> DomainResult<Vec<CouncilMember>>;

    async fn member_count(&self, council_id: Uuid) -> DomainResult<u32>;

    async fn create_proposal(&self, proposal: &Proposal) -> DomainResult<()>;

    async fn get_proposal(&self, id: Uuid) -> DomainResult<Option<Proposal>>;

    async fn list_proposals(
        &self,
        council_id: Uuid,
        status: Option<ProposalStatus>,
    ) -> DomainResult<Vec<Proposal>>;

    /// Record or update the agent's vote and recompute the proposal's
    /// aggregate counters in the same transaction, so no observer sees
    /// counters and votes out of step. Returns the refreshed proposal
    /// and whether the vote row was newly created.
    async fn cast_vote(
        &self,
        proposal_id: Uuid,
        agent_id: Uuid,
        vote: VoteChoice,
    ) -> DomainResult<(Proposal, bool)>;

    /// Resolve the proposal, guarded on it still being open.
    async fn resolve_proposal(
        &self,
        id: Uuid,
        status: ProposalStatus,
        resolution: Option<&str>,
        decided_at: DateTime<Utc>,
    ) -> DomainResult<()>;

    async fn record_execution(
        &self,
        id: Uuid,
        executed: bool,
        result: &str,
    ) -> DomainResult<()>;

    /// Expire open proposals whose deadline has passed; returns the
    /// proposals that were transitioned.
    async fn expire_overdue(&self, now: DateTime<Utc>) -> DomainResult<Vec<Proposal>>;

    /// Bump a member's `votes_cast` (new votes only, not updates).
    async fn increment_votes_cast(&self, council_id: Uuid, agent_id: Uuid) -> DomainResult<()>;
}
