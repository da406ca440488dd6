//! Council governance: membership, typed proposals, quorum voting,
//! and auto-execution of passed proposals.

use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    AccessGrant, ActivityEvent, Agent, Council, CouncilMember, CouncilRole, CouncilStatus,
    Maintainer, MaintainerRole, Proposal, ProposalAction, ProposalStatus, RepoSettingsPatch,
    Repository, VoteChoice,
};
use crate::domain::ports::{AccessRepository, CouncilRepository, RepoRepository};

use super::activity_log::ActivityLog;
use super::merge_queue::{MergeRequestOptions, MergeService};
use super::stage_engine::StageEngine;

/// Parameters for council creation.
#[derive(Debug, Clone)]
pub struct CouncilParams {
    pub min_members: u32,
    pub max_members: u32,
    pub standard_quorum: u32,
    pub critical_quorum: u32,
    pub term_days: u32,
}

impl Default for CouncilParams {
    fn default() -> Self {
        Self { min_members: 3, max_members: 9, standard_quorum: 2, critical_quorum: 3, term_days: 90 }
    }
}

pub struct CouncilService {
    councils: Arc<dyn CouncilRepository>,
    access: Arc<dyn AccessRepository>,
    repos: Arc<dyn RepoRepository>,
    merge: Arc<MergeService>,
    stage: Arc<StageEngine>,
    activity: Arc<ActivityLog>,
}

impl CouncilService {
    pub fn new(
        councils: Arc<dyn CouncilRepository>,
        access: Arc<dyn AccessRepository>,
        repos: Arc<dyn RepoRepository>,
        merge: Arc<MergeService>,
        stage: Arc<StageEngine>,
        activity: Arc<ActivityLog>,
    ) -> Self {
        Self { councils, access, repos, merge, stage, activity }
    }

    pub async fn create_council(
        &self,
        creator: &Agent,
        repo: &Repository,
        params: CouncilParams,
    ) -> DomainResult<Council> {
        if params.min_members == 0 || params.max_members < params.min_members {
            return Err(DomainError::Validation(
                "council member bounds are inconsistent".to_string(),
            ));
        }
        if params.standard_quorum == 0 || params.critical_quorum < params.standard_quorum {
            return Err(DomainError::Validation("council quorums are inconsistent".to_string()));
        }

        let mut council = Council::new(repo.id);
        council.min_members = params.min_members;
        council.max_members = params.max_members;
        council.standard_quorum = params.standard_quorum;
        council.critical_quorum = params.critical_quorum;
        council.term_days = params.term_days;
        self.councils.create(&council).await?;

        info!(council = %council.id, repo = %repo.name, "council created");
        self.activity
            .record(ActivityEvent::new(Some(creator.id), "council_created", "council", council.id))
            .await;
        Ok(council)
    }

    /// Add a member. Idempotent on membership; activates the council
    /// once the minimum seat count is reached.
    pub async fn add_member(
        &self,
        council_id: Uuid,
        agent: &Agent,
        role: CouncilRole,
    ) -> DomainResult<CouncilMember> {
        let council = self.get(council_id).await?;
        if council.status == CouncilStatus::Dissolved {
            return Err(DomainError::Conflict("council is dissolved".to_string()));
        }

        let count = self.councils.member_count(council.id).await?;
        let member = CouncilMember {
            council_id: council.id,
            agent_id: agent.id,
            role,
            term_expires_at: Some(Utc::now() + Duration::days(i64::from(council.term_days))),
            votes_cast: 0,
            joined_at: Utc::now(),
        };

        // The cap only applies to genuinely new seats.
        let existing = self.councils.get_member(council.id, agent.id).await?;
        if existing.is_none() && count >= council.max_members {
            return Err(DomainError::Conflict(format!(
                "council already has {} of {} members",
                count, council.max_members
            )));
        }

        let newly_added = self.councils.add_member(&member).await?;
        if newly_added {
            self.activity
                .record(
                    ActivityEvent::new(Some(agent.id), "council_member_added", "council", council.id)
                        .with_metadata(serde_json::json!({ "role": role.as_str() })),
                )
                .await;
        }

        if council.status == CouncilStatus::Forming {
            let count = self.councils.member_count(council.id).await?;
            if count >= council.min_members {
                self.councils.set_status(council.id, CouncilStatus::Active).await?;
                info!(council = %council.id, "council active");
            }
        }

        Ok(existing.unwrap_or(member))
    }

    /// Open a proposal. Quorum derives from the action's criticality.
    #[instrument(skip(self, proposer, action), fields(council = %council_id))]
    pub async fn propose(
        &self,
        proposer: &Agent,
        council_id: Uuid,
        title: &str,
        action: ProposalAction,
        expires_in: Option<Duration>,
    ) -> DomainResult<Proposal> {
        let council = self.get(council_id).await?;
        if council.status != CouncilStatus::Active {
            return Err(DomainError::Conflict(format!(
                "council is {}, proposals need an active council",
                council.status.as_str()
            )));
        }
        self.require_member(council.id, proposer.id).await?;
        validate_action(&action)?;

        let quorum = council.quorum_for(action.is_critical());
        let mut proposal = Proposal::new(council.id, proposer.id, title, action, quorum);
        proposal.expires_at = expires_in.map(|d| Utc::now() + d);
        self.councils.create_proposal(&proposal).await?;

        self.activity
            .record(
                ActivityEvent::new(Some(proposer.id), "proposal_created", "proposal", proposal.id)
                    .with_metadata(serde_json::json!({
                        "proposal_type": proposal.action.proposal_type(),
                        "quorum_required": quorum,
                    })),
            )
            .await;
        Ok(proposal)
    }

    /// Record a vote (or change one) and re-evaluate the outcome.
    /// When the proposal passes, the action executes immediately.
    #[instrument(skip(self, voter), fields(proposal = %proposal_id))]
    pub async fn vote(
        &self,
        voter: &Agent,
        proposal_id: Uuid,
        choice: VoteChoice,
    ) -> DomainResult<Proposal> {
        // Expiry sweeps run opportunistically on the vote path.
        self.councils.expire_overdue(Utc::now()).await?;

        let proposal = self
            .councils
            .get_proposal(proposal_id)
            .await?
            .ok_or_else(|| DomainError::not_found("proposal", proposal_id))?;
        if proposal.status != ProposalStatus::Open {
            return Err(DomainError::Conflict(format!(
                "proposal is {}",
                proposal.status.as_str()
            )));
        }
        self.require_member(proposal.council_id, voter.id).await?;

        let (updated, newly_created) =
            self.councils.cast_vote(proposal_id, voter.id, choice).await?;
        if newly_created {
            self.councils.increment_votes_cast(proposal.council_id, voter.id).await?;
        }

        self.activity
            .record(
                ActivityEvent::new(Some(voter.id), "proposal_vote", "proposal", proposal_id)
                    .with_metadata(serde_json::json!({
                        "vote": choice.as_str(),
                        "revote": !newly_created,
                    })),
            )
            .await;

        self.evaluate(updated).await
    }

    /// Quorum evaluation: with quorum met, F > A passes, A > F
    /// rejects, and an even split rejects with a tie marker.
    async fn evaluate(&self, proposal: Proposal) -> DomainResult<Proposal> {
        if proposal.status != ProposalStatus::Open
            || proposal.total_votes() < proposal.quorum_required
        {
            return Ok(proposal);
        }

        let now = Utc::now();
        let (status, resolution) = if proposal.votes_for > proposal.votes_against {
            (ProposalStatus::Passed, None)
        } else if proposal.votes_against > proposal.votes_for {
            (ProposalStatus::Rejected, None)
        } else {
            (ProposalStatus::Rejected, Some("tie"))
        };

        self.councils.resolve_proposal(proposal.id, status, resolution, now).await?;
        let event_type =
            if status == ProposalStatus::Passed { "proposal_passed" } else { "proposal_rejected" };
        self.activity
            .record(
                ActivityEvent::new(None, event_type, "proposal", proposal.id).with_metadata(
                    serde_json::json!({
                        "votes_for": proposal.votes_for,
                        "votes_against": proposal.votes_against,
                        "votes_abstain": proposal.votes_abstain,
                        "resolution": resolution,
                    }),
                ),
            )
            .await;

        let mut resolved = self
            .councils
            .get_proposal(proposal.id)
            .await?
            .ok_or_else(|| DomainError::not_found("proposal", proposal.id))?;

        if status == ProposalStatus::Passed && !resolved.executed {
            match self.execute(&resolved).await {
                Ok(result) => {
                    self.councils.record_execution(resolved.id, true, &result).await?;
                    resolved.executed = true;
                    resolved.execution_result = Some(result);
                }
                Err(e) => {
                    // The proposal stays passed and unexecuted; the
                    // failure is visible in the log for intervention.
                    let message = e.to_string();
                    warn!(proposal = %resolved.id, error = %message, "proposal execution failed");
                    self.councils.record_execution(resolved.id, false, &message).await?;
                    self.activity
                        .record(
                            ActivityEvent::new(None, "proposal_execution_failed", "proposal", resolved.id)
                                .with_metadata(serde_json::json!({ "error": message })),
                        )
                        .await;
                    resolved.execution_result = Some(message);
                }
            }
        }

        Ok(resolved)
    }

    /// Execute a passed proposal's action against repository state.
    async fn execute(&self, proposal: &Proposal) -> DomainResult<String> {
        let council = self.get(proposal.council_id).await?;
        let repo = self
            .repos
            .get(council.repo_id)
            .await?
            .ok_or_else(|| DomainError::not_found("repository", council.repo_id))?;

        match &proposal.action {
            ProposalAction::AddMaintainer { agent_id, role } => {
                self.access
                    .add_maintainer(&Maintainer {
                        repo_id: repo.id,
                        agent_id: *agent_id,
                        role: *role,
                        added_at: Utc::now(),
                    })
                    .await?;
                Ok(format!("added {agent_id} as {}", role.as_str()))
            }
            ProposalAction::RemoveMaintainer { agent_id } => {
                let target = self
                    .access
                    .get_maintainer(repo.id, *agent_id)
                    .await?
                    .ok_or_else(|| DomainError::not_found("maintainer", *agent_id))?;
                if target.role == MaintainerRole::Owner {
                    let owners = self.access.count_with_role(repo.id, MaintainerRole::Owner).await?;
                    if owners <= 1 {
                        return Err(DomainError::Conflict(
                            "removing the last owner is not permitted".to_string(),
                        ));
                    }
                }
                self.access.remove_maintainer(repo.id, *agent_id).await?;
                Ok(format!("removed maintainer {agent_id}"))
            }
            ProposalAction::ModifyAccess { agent_id, level, expires_at } => {
                self.access
                    .upsert_grant(&AccessGrant {
                        repo_id: repo.id,
                        agent_id: *agent_id,
                        level: *level,
                        expires_at: *expires_at,
                        granted_at: Utc::now(),
                    })
                    .await?;
                Ok(format!("granted {} to {agent_id}", level.as_str()))
            }
            ProposalAction::ChangeSettings { changes } => {
                self.apply_settings(&repo, changes).await?;
                Ok("settings updated".to_string())
            }
            ProposalAction::ChangeThreshold { consensus_threshold } => {
                let patch = RepoSettingsPatch {
                    consensus_threshold: Some(*consensus_threshold),
                    ..Default::default()
                };
                self.apply_settings(&repo, &patch).await?;
                Ok(format!("consensus threshold set to {consensus_threshold}"))
            }
            ProposalAction::ChangeStage { stage } => {
                self.stage.set_stage(&repo, *stage).await?;
                Ok(format!("stage set to {}", stage.as_str()))
            }
            ProposalAction::MergeStream { stream_id, bypass_consensus } => {
                let stream = self.merge.get_stream(*stream_id).await?;
                let entry = self
                    .merge
                    .request_merge(
                        proposal.proposer_id,
                        stream.id,
                        MergeRequestOptions {
                            council_authorized: true,
                            bypass_consensus: *bypass_consensus,
                        },
                    )
                    .await?;
                Ok(format!("merge request {} queued at head", entry.id))
            }
        }
    }

    async fn apply_settings(
        &self,
        repo: &Repository,
        patch: &RepoSettingsPatch,
    ) -> DomainResult<()> {
        patch.validate().map_err(DomainError::Validation)?;
        let mut updated = repo.clone();
        patch.apply(&mut updated);
        self.repos.update(&updated).await?;
        self.activity
            .record(ActivityEvent::new(None, "config_changed", "repository", repo.id))
            .await;
        Ok(())
    }

    pub async fn get(&self, council_id: Uuid) -> DomainResult<Council> {
        self.councils
            .get(council_id)
            .await?
            .ok_or_else(|| DomainError::not_found("council", council_id))
    }

    pub async fn get_by_repo(&self, repo_id: Uuid) -> DomainResult<Option<Council>> {
        self.councils.get_by_repo(repo_id).await
    }

    pub async fn members(&self, council_id: Uuid) -> DomainResult<Vec<CouncilMember>> {
        self.councils.list_members(council_id).await
    }

    pub async fn proposals(
        &self,
        council_id: Uuid,
        status: Option<ProposalStatus>,
    ) -> DomainResult<Vec<Proposal>> {
        self.councils.expire_overdue(Utc::now()).await?;
        self.councils.list_proposals(council_id, status).await
    }

    pub async fn get_proposal(&self, proposal_id: Uuid) -> DomainResult<Proposal> {
        self.councils.expire_overdue(Utc::now()).await?;
        self.councils
            .get_proposal(proposal_id)
            .await?
            .ok_or_else(|| DomainError::not_found("proposal", proposal_id))
    }

    async fn require_member(&self, council_id: Uuid, agent_id: Uuid) -> DomainResult<()> {
        if self.councils.get_member(council_id, agent_id).await?.is_none() {
            return Err(DomainError::Permission(
                "only council members may do this".to_string(),
            ));
        }
        Ok(())
    }
}

fn validate_action(action: &ProposalAction) -> DomainResult<()> {
    match action {
        ProposalAction::ChangeThreshold { consensus_threshold } => {
            if !(0.0..=1.0).contains(consensus_threshold) {
                return Err(DomainError::Validation(format!(
                    "consensus threshold {consensus_threshold} outside [0,1]"
                )));
            }
            Ok(())
        }
        ProposalAction::ChangeSettings { changes } => {
            changes.validate().map_err(DomainError::Validation)
        }
        _ => Ok(()),
    }
}
