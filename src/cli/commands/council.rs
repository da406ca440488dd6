//! Council commands.

use chrono::Duration;
use serde::Serialize;

use crate::cli::output::{print, short_id, table, truncate, CommandOutput, Message};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{CouncilRole, Proposal, ProposalAction, ProposalStatus, VoteChoice};
use crate::services::{Coordinator, CouncilParams};

use super::resolve_proposal;

#[derive(Serialize)]
pub struct CouncilStatusOutput {
    pub id: String,
    pub status: String,
    pub members: Vec<MemberRow>,
    pub standard_quorum: u32,
    pub critical_quorum: u32,
}

#[derive(Serialize)]
pub struct MemberRow {
    pub agent: String,
    pub role: String,
    pub votes_cast: u32,
}

impl CommandOutput for CouncilStatusOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![format!(
            "council {} ({}) quorum {}/{} (standard/critical)",
            short_id(&self.id),
            self.status,
            self.standard_quorum,
            self.critical_quorum
        )];
        if self.members.is_empty() {
            lines.push("no members".to_string());
        } else {
            let mut t = table(&["AGENT", "ROLE", "VOTES CAST"]);
            for m in &self.members {
                t.add_row(vec![m.agent.clone(), m.role.clone(), m.votes_cast.to_string()]);
            }
            lines.push(t.to_string());
        }
        lines.join("\n")
    }
}

#[derive(Serialize)]
pub struct ProposalOutput {
    pub id: String,
    pub title: String,
    pub proposal_type: String,
    pub status: String,
    pub votes_for: u32,
    pub votes_against: u32,
    pub votes_abstain: u32,
    pub quorum_required: u32,
    pub resolution: Option<String>,
    pub executed: bool,
}

impl From<&Proposal> for ProposalOutput {
    fn from(p: &Proposal) -> Self {
        Self {
            id: p.id.to_string(),
            title: p.title.clone(),
            proposal_type: p.action.proposal_type().to_string(),
            status: p.status.as_str().to_string(),
            votes_for: p.votes_for,
            votes_against: p.votes_against,
            votes_abstain: p.votes_abstain,
            quorum_required: p.quorum_required,
            resolution: p.resolution.clone(),
            executed: p.executed,
        }
    }
}

impl CommandOutput for ProposalOutput {
    fn to_human(&self) -> String {
        let mut line = format!(
            "proposal {} '{}' [{}] {}: {} for / {} against / {} abstain (quorum {})",
            short_id(&self.id),
            self.title,
            self.proposal_type,
            self.status,
            self.votes_for,
            self.votes_against,
            self.votes_abstain,
            self.quorum_required
        );
        if let Some(ref resolution) = self.resolution {
            line.push_str(&format!(" [{resolution}]"));
        }
        if self.executed {
            line.push_str(" (executed)");
        }
        line
    }
}

#[derive(Serialize)]
pub struct ProposalListOutput {
    pub proposals: Vec<ProposalOutput>,
}

impl CommandOutput for ProposalListOutput {
    fn to_human(&self) -> String {
        if self.proposals.is_empty() {
            return "no proposals".to_string();
        }
        let mut t = table(&["ID", "TITLE", "TYPE", "STATUS", "F/A/Ab", "EXEC"]);
        for p in &self.proposals {
            t.add_row(vec![
                short_id(&p.id),
                truncate(&p.title, 28),
                p.proposal_type.clone(),
                p.status.clone(),
                format!("{}/{}/{}", p.votes_for, p.votes_against, p.votes_abstain),
                if p.executed { "yes" } else { "no" }.to_string(),
            ]);
        }
        t.to_string()
    }
}

pub async fn handle_create(
    coordinator: &Coordinator,
    agent: &str,
    min_members: u32,
    max_members: u32,
    quorum: u32,
    critical_quorum: u32,
    json: bool,
) -> DomainResult<()> {
    let ctx = coordinator.context_by_name(agent).await?;
    let repo = coordinator.default_repository().await?;
    let council = coordinator
        .create_council(&ctx, repo.id, CouncilParams {
            min_members,
            max_members,
            standard_quorum: quorum,
            critical_quorum,
            term_days: CouncilParams::default().term_days,
        })
        .await?;
    print(
        &Message::new(format!(
            "council {} created ({})",
            short_id(council.id),
            council.status.as_str()
        )),
        json,
    );
    Ok(())
}

pub async fn handle_status(coordinator: &Coordinator, json: bool) -> DomainResult<()> {
    let repo = coordinator.default_repository().await?;
    let council = coordinator
        .council_for_repo(repo.id)
        .await?
        .ok_or_else(|| DomainError::not_found("council", repo.name.clone()))?;
    let members = coordinator.council_members(council.id).await?;
    let agents = coordinator.list_agents().await?;

    let rows = members
        .iter()
        .map(|m| MemberRow {
            agent: agents
                .iter()
                .find(|a| a.id == m.agent_id)
                .map_or_else(|| short_id(m.agent_id), |a| a.name.clone()),
            role: m.role.as_str().to_string(),
            votes_cast: m.votes_cast,
        })
        .collect();

    print(
        &CouncilStatusOutput {
            id: council.id.to_string(),
            status: council.status.as_str().to_string(),
            members: rows,
            standard_quorum: council.standard_quorum,
            critical_quorum: council.critical_quorum,
        },
        json,
    );
    Ok(())
}

pub async fn handle_propose(
    coordinator: &Coordinator,
    title: &str,
    agent: &str,
    action_json: &str,
    expires_in_hours: Option<i64>,
    json: bool,
) -> DomainResult<()> {
    let action: ProposalAction = serde_json::from_str(action_json)
        .map_err(|e| DomainError::Validation(format!("action payload: {e}")))?;
    let ctx = coordinator.context_by_name(agent).await?;
    let repo = coordinator.default_repository().await?;
    let council = coordinator
        .council_for_repo(repo.id)
        .await?
        .ok_or_else(|| DomainError::not_found("council", repo.name.clone()))?;

    let proposal = coordinator
        .propose(&ctx, council.id, title, action, expires_in_hours.map(Duration::hours))
        .await?;
    print(&ProposalOutput::from(&proposal), json);
    Ok(())
}

pub async fn handle_vote(
    coordinator: &Coordinator,
    proposal: &str,
    agent: &str,
    choice: &str,
    json: bool,
) -> DomainResult<()> {
    let choice = VoteChoice::from_str(choice)
        .ok_or_else(|| DomainError::Validation(format!("unknown vote '{choice}'")))?;
    let ctx = coordinator.context_by_name(agent).await?;
    let proposal_id = resolve_proposal(coordinator, proposal).await?;
    let proposal = coordinator.vote(&ctx, proposal_id, choice).await?;
    print(&ProposalOutput::from(&proposal), json);
    Ok(())
}

pub async fn handle_add_member(
    coordinator: &Coordinator,
    name: &str,
    agent: &str,
    role: &str,
    json: bool,
) -> DomainResult<()> {
    let role = CouncilRole::from_str(role)
        .ok_or_else(|| DomainError::Validation(format!("unknown role '{role}'")))?;
    let ctx = coordinator.context_by_name(agent).await?;
    let repo = coordinator.default_repository().await?;
    let council = coordinator
        .council_for_repo(repo.id)
        .await?
        .ok_or_else(|| DomainError::not_found("council", repo.name.clone()))?;

    coordinator.add_council_member(&ctx, council.id, name, role).await?;
    print(&Message::new(format!("{name} added to the council as {}", role.as_str())), json);
    Ok(())
}

pub async fn handle_proposals(
    coordinator: &Coordinator,
    status: Option<String>,
    json: bool,
) -> DomainResult<()> {
    let repo = coordinator.default_repository().await?;
    let council = coordinator
        .council_for_repo(repo.id)
        .await?
        .ok_or_else(|| DomainError::not_found("council", repo.name.clone()))?;
    let status = match status {
        Some(ref s) => Some(
            ProposalStatus::from_str(s)
                .ok_or_else(|| DomainError::Validation(format!("unknown status '{s}'")))?,
        ),
        None => None,
    };
    let proposals = coordinator.proposals(council.id, status).await?;
    print(&ProposalListOutput { proposals: proposals.iter().map(Into::into).collect() }, json);
    Ok(())
}
