//! Councils: multi-member governance bodies with typed proposals.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::access::{AccessLevel, MaintainerRole};
use super::repository::{RepoSettingsPatch, RepoStage};

/// Lifecycle status of a council.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CouncilStatus {
    Forming,
    Active,
    Dissolved,
}

impl CouncilStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Forming => "forming",
            Self::Active => "active",
            Self::Dissolved => "dissolved",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "forming" => Some(Self::Forming),
            "active" => Some(Self::Active),
            "dissolved" => Some(Self::Dissolved),
            _ => None,
        }
    }
}

/// One council per repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Council {
    pub id: Uuid,
    pub repo_id: Uuid,
    pub status: CouncilStatus,
    pub min_members: u32,
    pub max_members: u32,
    pub standard_quorum: u32,
    pub critical_quorum: u32,
    pub term_days: u32,
    pub created_at: DateTime<Utc>,
}

impl Council {
    pub fn new(repo_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            repo_id,
            status: CouncilStatus::Forming,
            min_members: 3,
            max_members: 9,
            standard_quorum: 2,
            critical_quorum: 3,
            term_days: 90,
            created_at: Utc::now(),
        }
    }

    /// Quorum for a proposal of the given criticality.
    pub fn quorum_for(&self, critical: bool) -> u32 {
        if critical {
            self.critical_quorum
        } else {
            self.standard_quorum
        }
    }
}

/// Member role within a council.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CouncilRole {
    Chair,
    Member,
}

impl CouncilRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chair => "chair",
            Self::Member => "member",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "chair" => Some(Self::Chair),
            "member" => Some(Self::Member),
            _ => None,
        }
    }
}

/// A council seat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouncilMember {
    pub council_id: Uuid,
    pub agent_id: Uuid,
    pub role: CouncilRole,
    pub term_expires_at: Option<DateTime<Utc>>,
    pub votes_cast: u32,
    pub joined_at: DateTime<Utc>,
}

/// Typed proposal action. Each variant carries its own payload;
/// dispatch is an exhaustive match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProposalAction {
    AddMaintainer {
        agent_id: Uuid,
        #[serde(default = "default_maintainer_role")]
        role: MaintainerRole,
    },
    RemoveMaintainer {
        agent_id: Uuid,
    },
    ModifyAccess {
        agent_id: Uuid,
        level: AccessLevel,
        #[serde(default)]
        expires_at: Option<DateTime<Utc>>,
    },
    ChangeSettings {
        changes: RepoSettingsPatch,
    },
    ChangeThreshold {
        consensus_threshold: f64,
    },
    ChangeStage {
        stage: RepoStage,
    },
    MergeStream {
        stream_id: Uuid,
        #[serde(default)]
        bypass_consensus: bool,
    },
}

fn default_maintainer_role() -> MaintainerRole {
    MaintainerRole::Maintainer
}

impl ProposalAction {
    /// Stable wire name of the proposal type.
    pub fn proposal_type(&self) -> &'static str {
        match self {
            Self::AddMaintainer { .. } => "add_maintainer",
            Self::RemoveMaintainer { .. } => "remove_maintainer",
            Self::ModifyAccess { .. } => "modify_access",
            Self::ChangeSettings { .. } => "change_settings",
            Self::ChangeThreshold { .. } => "change_threshold",
            Self::ChangeStage { .. } => "change_stage",
            Self::MergeStream { .. } => "merge_stream",
        }
    }

    /// Critical actions use the council's critical quorum.
    pub fn is_critical(&self) -> bool {
        matches!(self, Self::RemoveMaintainer { .. } | Self::ChangeStage { .. })
    }
}

/// Proposal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Open,
    Passed,
    Rejected,
    Expired,
}

impl ProposalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Passed => "passed",
            Self::Rejected => "rejected",
            Self::Expired => "expired",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "open" => Some(Self::Open),
            "passed" => Some(Self::Passed),
            "rejected" => Some(Self::Rejected),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        !matches!(self, Self::Open)
    }
}

/// A council proposal and its vote aggregates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proposal {
    pub id: Uuid,
    pub council_id: Uuid,
    pub proposer_id: Uuid,
    pub title: String,
    pub action: ProposalAction,
    pub status: ProposalStatus,
    pub votes_for: u32,
    pub votes_against: u32,
    pub votes_abstain: u32,
    pub quorum_required: u32,
    /// Set when resolved; `"tie"` marks an even split rejection.
    pub resolution: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub executed: bool,
    pub execution_result: Option<String>,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

impl Proposal {
    pub fn new(
        council_id: Uuid,
        proposer_id: Uuid,
        title: impl Into<String>,
        action: ProposalAction,
        quorum_required: u32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            council_id,
            proposer_id,
            title: title.into(),
            action,
            status: ProposalStatus::Open,
            votes_for: 0,
            votes_against: 0,
            votes_abstain: 0,
            quorum_required,
            resolution: None,
            expires_at: None,
            executed: false,
            execution_result: None,
            created_at: Utc::now(),
            decided_at: None,
        }
    }

    pub fn total_votes(&self) -> u32 {
        self.votes_for + self.votes_against + self.votes_abstain
    }
}

/// A single member's vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteChoice {
    For,
    Against,
    Abstain,
}

impl VoteChoice {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::For => "for",
            Self::Against => "against",
            Self::Abstain => "abstain",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "for" | "yes" => Some(Self::For),
            "against" | "no" => Some(Self::Against),
            "abstain" => Some(Self::Abstain),
            _ => None,
        }
    }
}

/// A vote row, updatable; changing it re-evaluates the proposal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouncilVote {
    pub proposal_id: Uuid,
    pub agent_id: Uuid,
    pub vote: VoteChoice,
    pub cast_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_type_names() {
        let a = ProposalAction::AddMaintainer {
            agent_id: Uuid::new_v4(),
            role: MaintainerRole::Maintainer,
        };
        assert_eq!(a.proposal_type(), "add_maintainer");
        let a = ProposalAction::MergeStream { stream_id: Uuid::new_v4(), bypass_consensus: true };
        assert_eq!(a.proposal_type(), "merge_stream");
    }

    #[test]
    fn test_action_serde_tagging() {
        let a = ProposalAction::ChangeThreshold { consensus_threshold: 0.75 };
        let json = serde_json::to_value(&a).unwrap();
        assert_eq!(json["type"], "change_threshold");
        let back: ProposalAction = serde_json::from_value(json).unwrap();
        assert_eq!(back, a);
    }

    #[test]
    fn test_add_maintainer_role_defaults() {
        let json = serde_json::json!({
            "type": "add_maintainer",
            "agent_id": Uuid::new_v4().to_string(),
        });
        let action: ProposalAction = serde_json::from_value(json).unwrap();
        match action {
            ProposalAction::AddMaintainer { role, .. } => {
                assert_eq!(role, MaintainerRole::Maintainer);
            }
            other => panic!("unexpected action: {other:?}"),
        }
    }

    #[test]
    fn test_critical_actions() {
        assert!(ProposalAction::RemoveMaintainer { agent_id: Uuid::new_v4() }.is_critical());
        assert!(ProposalAction::ChangeStage { stage: RepoStage::Mature }.is_critical());
        assert!(!ProposalAction::ChangeThreshold { consensus_threshold: 0.5 }.is_critical());
    }

    #[test]
    fn test_quorum_selection() {
        let council = Council::new(Uuid::new_v4());
        assert_eq!(council.quorum_for(false), council.standard_quorum);
        assert_eq!(council.quorum_for(true), council.critical_quorum);
    }
}
