//! Repository: the coordination unit and its governance policy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle stage of a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepoStage {
    Seed,
    Growth,
    Established,
    Mature,
}

impl Default for RepoStage {
    fn default() -> Self {
        Self::Seed
    }
}

impl RepoStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Seed => "seed",
            Self::Growth => "growth",
            Self::Established => "established",
            Self::Mature => "mature",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "seed" => Some(Self::Seed),
            "growth" => Some(Self::Growth),
            "established" => Some(Self::Established),
            "mature" => Some(Self::Mature),
            _ => None,
        }
    }

    /// The next stage, if any.
    pub fn next(&self) -> Option<Self> {
        match self {
            Self::Seed => Some(Self::Growth),
            Self::Growth => Some(Self::Established),
            Self::Established => Some(Self::Mature),
            Self::Mature => None,
        }
    }
}

/// Rule family used to interpret reviews.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnershipModel {
    /// Owner approval decides.
    Solo,
    /// Maintainer majority by threshold; any maintainer rejection blocks.
    Guild,
    /// Karma-weighted votes from anyone.
    Open,
}

impl OwnershipModel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Solo => "solo",
            Self::Guild => "guild",
            Self::Open => "open",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "solo" => Some(Self::Solo),
            "guild" => Some(Self::Guild),
            "open" => Some(Self::Open),
            _ => None,
        }
    }
}

/// How commits reach the buffer branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeMode {
    /// Every commit auto-queues for the buffer, no review gate.
    Swarm,
    /// Streams merge after review consensus.
    Review,
    /// Review consensus plus explicit merge request.
    Gated,
}

impl MergeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Swarm => "swarm",
            Self::Review => "review",
            Self::Gated => "gated",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "swarm" => Some(Self::Swarm),
            "review" => Some(Self::Review),
            "gated" => Some(Self::Gated),
            _ => None,
        }
    }
}

/// Who may write without an explicit grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentAccess {
    Public,
    KarmaThreshold,
    Allowlist,
}

impl AgentAccess {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::KarmaThreshold => "karma_threshold",
            Self::Allowlist => "allowlist",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "public" => Some(Self::Public),
            "karma_threshold" => Some(Self::KarmaThreshold),
            "allowlist" => Some(Self::Allowlist),
            _ => None,
        }
    }
}

/// Which site evaluates consensus authoritatively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsensusAuthority {
    Local,
    Server,
}

impl ConsensusAuthority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Server => "server",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "local" => Some(Self::Local),
            "server" => Some(Self::Server),
            _ => None,
        }
    }
}

/// A coordinated repository and its governance settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    pub id: Uuid,
    pub name: String,
    pub stage: RepoStage,
    pub ownership_model: OwnershipModel,
    pub merge_mode: MergeMode,
    pub agent_access: AgentAccess,
    pub min_karma: i64,
    pub consensus_threshold: f64,
    pub min_reviews: u32,
    pub human_review_weight: f64,
    pub buffer_branch: String,
    pub promote_target: String,
    pub stabilize_command: Option<String>,
    pub stabilize_timeout: u64,
    pub auto_promote_on_green: bool,
    pub auto_revert_on_red: bool,
    pub consensus_authority: ConsensusAuthority,
    pub last_green_commit: Option<String>,
    pub contributor_count: u32,
    pub patch_count: u32,
    pub created_at: DateTime<Utc>,
}

impl Repository {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            stage: RepoStage::Seed,
            ownership_model: OwnershipModel::Solo,
            merge_mode: MergeMode::Review,
            agent_access: AgentAccess::Public,
            min_karma: 0,
            consensus_threshold: 0.5,
            min_reviews: 1,
            human_review_weight: 1.0,
            buffer_branch: "swarm/buffer".to_string(),
            promote_target: "main".to_string(),
            stabilize_command: None,
            stabilize_timeout: 600,
            auto_promote_on_green: false,
            auto_revert_on_red: true,
            consensus_authority: ConsensusAuthority::Local,
            last_green_commit: None,
            contributor_count: 0,
            patch_count: 0,
            created_at: Utc::now(),
        }
    }
}

/// Partial update of mutable repository settings, used by council
/// `change_settings` proposals and the settings API.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepoSettingsPatch {
    pub ownership_model: Option<OwnershipModel>,
    pub merge_mode: Option<MergeMode>,
    pub agent_access: Option<AgentAccess>,
    pub min_karma: Option<i64>,
    pub consensus_threshold: Option<f64>,
    pub min_reviews: Option<u32>,
    pub human_review_weight: Option<f64>,
    pub buffer_branch: Option<String>,
    pub promote_target: Option<String>,
    pub stabilize_command: Option<String>,
    pub stabilize_timeout: Option<u64>,
    pub auto_promote_on_green: Option<bool>,
    pub auto_revert_on_red: Option<bool>,
    pub consensus_authority: Option<ConsensusAuthority>,
}

impl RepoSettingsPatch {
    /// Range-check the patch before applying.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(t) = self.consensus_threshold {
            if !(0.0..=1.0).contains(&t) {
                return Err(format!("consensus_threshold {t} outside [0,1]"));
            }
        }
        if let Some(m) = self.min_reviews {
            if m < 1 {
                return Err("min_reviews must be at least 1".to_string());
            }
        }
        if let Some(w) = self.human_review_weight {
            if w < 0.0 {
                return Err(format!("human_review_weight {w} must be non-negative"));
            }
        }
        Ok(())
    }

    /// Apply the patch to a repository in place.
    pub fn apply(&self, repo: &mut Repository) {
        if let Some(v) = self.ownership_model {
            repo.ownership_model = v;
        }
        if let Some(v) = self.merge_mode {
            repo.merge_mode = v;
        }
        if let Some(v) = self.agent_access {
            repo.agent_access = v;
        }
        if let Some(v) = self.min_karma {
            repo.min_karma = v;
        }
        if let Some(v) = self.consensus_threshold {
            repo.consensus_threshold = v;
        }
        if let Some(v) = self.min_reviews {
            repo.min_reviews = v;
        }
        if let Some(v) = self.human_review_weight {
            repo.human_review_weight = v;
        }
        if let Some(ref v) = self.buffer_branch {
            repo.buffer_branch = v.clone();
        }
        if let Some(ref v) = self.promote_target {
            repo.promote_target = v.clone();
        }
        if let Some(ref v) = self.stabilize_command {
            repo.stabilize_command = Some(v.clone());
        }
        if let Some(v) = self.stabilize_timeout {
            repo.stabilize_timeout = v;
        }
        if let Some(v) = self.auto_promote_on_green {
            repo.auto_promote_on_green = v;
        }
        if let Some(v) = self.auto_revert_on_red {
            repo.auto_revert_on_red = v;
        }
        if let Some(v) = self.consensus_authority {
            repo.consensus_authority = v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_progression() {
        assert_eq!(RepoStage::Seed.next(), Some(RepoStage::Growth));
        assert_eq!(RepoStage::Growth.next(), Some(RepoStage::Established));
        assert_eq!(RepoStage::Established.next(), Some(RepoStage::Mature));
        assert_eq!(RepoStage::Mature.next(), None);
    }

    #[test]
    fn test_patch_validation() {
        let patch = RepoSettingsPatch { consensus_threshold: Some(1.5), ..Default::default() };
        assert!(patch.validate().is_err());
        let patch = RepoSettingsPatch { min_reviews: Some(0), ..Default::default() };
        assert!(patch.validate().is_err());
        let patch = RepoSettingsPatch { consensus_threshold: Some(0.66), ..Default::default() };
        assert!(patch.validate().is_ok());
    }

    #[test]
    fn test_patch_apply() {
        let mut repo = Repository::new("demo");
        let patch = RepoSettingsPatch {
            ownership_model: Some(OwnershipModel::Guild),
            consensus_threshold: Some(0.66),
            min_reviews: Some(2),
            ..Default::default()
        };
        patch.apply(&mut repo);
        assert_eq!(repo.ownership_model, OwnershipModel::Guild);
        assert!((repo.consensus_threshold - 0.66).abs() < f64::EPSILON);
        assert_eq!(repo.min_reviews, 2);
        // Untouched fields keep their defaults.
        assert_eq!(repo.merge_mode, MergeMode::Review);
    }
}
