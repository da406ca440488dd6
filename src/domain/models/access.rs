//! Access levels, grants, maintainer roles, and branch rules.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Effective access level, ordered from least to most privileged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    None,
    Read,
    Write,
    Maintain,
    Admin,
}

impl AccessLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Read => "read",
            Self::Write => "write",
            Self::Maintain => "maintain",
            Self::Admin => "admin",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "none" => Some(Self::None),
            "read" => Some(Self::Read),
            "write" => Some(Self::Write),
            "maintain" => Some(Self::Maintain),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

/// Where a resolved permission came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionSource {
    Owner,
    Maintainer,
    Grant,
    RepoPolicy,
    Default,
}

/// Result of permission resolution for an (agent, repo) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedPermission {
    pub level: AccessLevel,
    pub source: PermissionSource,
}

/// Actions an agent can attempt against a repository, ordered
/// read < write < merge < settings < delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepoAction {
    Read,
    Write,
    Merge,
    Settings,
    Delete,
}

impl RepoAction {
    /// Minimum effective access level required for the action.
    pub fn required_level(&self) -> AccessLevel {
        match self {
            Self::Read => AccessLevel::Read,
            Self::Write | Self::Merge => AccessLevel::Write,
            Self::Settings => AccessLevel::Maintain,
            Self::Delete => AccessLevel::Admin,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Merge => "merge",
            Self::Settings => "settings",
            Self::Delete => "delete",
        }
    }
}

/// An explicit per-agent access grant, optionally expiring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessGrant {
    pub repo_id: Uuid,
    pub agent_id: Uuid,
    pub level: AccessLevel,
    pub expires_at: Option<DateTime<Utc>>,
    pub granted_at: DateTime<Utc>,
}

impl AccessGrant {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|t| t <= now)
    }
}

/// Maintainer role on a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaintainerRole {
    Owner,
    Maintainer,
}

impl MaintainerRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Maintainer => "maintainer",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "owner" => Some(Self::Owner),
            "maintainer" => Some(Self::Maintainer),
            _ => None,
        }
    }
}

/// A maintainer row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Maintainer {
    pub repo_id: Uuid,
    pub agent_id: Uuid,
    pub role: MaintainerRole,
    pub added_at: DateTime<Utc>,
}

/// Direct-push policy on a branch rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectPush {
    None,
    Maintainers,
    All,
}

impl DirectPush {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Maintainers => "maintainers",
            Self::All => "all",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "none" => Some(Self::None),
            "maintainers" => Some(Self::Maintainers),
            "all" => Some(Self::All),
            _ => None,
        }
    }
}

/// A branch protection rule. Rules are evaluated in descending
/// priority order; the first matching path prefix wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchRule {
    pub id: Uuid,
    pub repo_id: Uuid,
    pub pattern: String,
    pub direct_push: DirectPush,
    pub required_approvals: u32,
    pub require_tests_pass: bool,
    pub priority: i64,
}

impl BranchRule {
    /// Prefix match against a branch name.
    pub fn matches(&self, branch: &str) -> bool {
        branch.starts_with(&self.pattern)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ordering() {
        assert!(AccessLevel::None < AccessLevel::Read);
        assert!(AccessLevel::Read < AccessLevel::Write);
        assert!(AccessLevel::Write < AccessLevel::Maintain);
        assert!(AccessLevel::Maintain < AccessLevel::Admin);
    }

    #[test]
    fn test_action_required_levels() {
        assert_eq!(RepoAction::Read.required_level(), AccessLevel::Read);
        assert_eq!(RepoAction::Write.required_level(), AccessLevel::Write);
        assert_eq!(RepoAction::Merge.required_level(), AccessLevel::Write);
        assert_eq!(RepoAction::Settings.required_level(), AccessLevel::Maintain);
        assert_eq!(RepoAction::Delete.required_level(), AccessLevel::Admin);
    }

    #[test]
    fn test_grant_expiry() {
        let now = Utc::now();
        let mut grant = AccessGrant {
            repo_id: Uuid::new_v4(),
            agent_id: Uuid::new_v4(),
            level: AccessLevel::Write,
            expires_at: None,
            granted_at: now,
        };
        assert!(!grant.is_expired(now));
        grant.expires_at = Some(now - chrono::Duration::seconds(1));
        assert!(grant.is_expired(now));
        grant.expires_at = Some(now + chrono::Duration::hours(1));
        assert!(!grant.is_expired(now));
    }

    #[test]
    fn test_branch_rule_prefix_match() {
        let rule = BranchRule {
            id: Uuid::new_v4(),
            repo_id: Uuid::new_v4(),
            pattern: "release/".to_string(),
            direct_push: DirectPush::Maintainers,
            required_approvals: 2,
            require_tests_pass: true,
            priority: 10,
        };
        assert!(rule.matches("release/1.2"));
        assert!(!rule.matches("feature/release"));
    }
}
