//! Agent identity and karma tiers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of an agent account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Active,
    Suspended,
    Banned,
}

impl Default for AgentStatus {
    fn default() -> Self {
        Self::Active
    }
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Suspended => "suspended",
            Self::Banned => "banned",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "active" => Some(Self::Active),
            "suspended" => Some(Self::Suspended),
            "banned" => Some(Self::Banned),
            _ => None,
        }
    }

    /// Suspended and banned accounts resolve to no access anywhere.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

/// A registered agent.
///
/// The plaintext API key is returned exactly once at registration;
/// only the salted hash is persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: Uuid,
    pub name: String,
    pub bio: Option<String>,
    #[serde(skip_serializing)]
    pub api_key_hash: String,
    #[serde(skip_serializing)]
    pub api_key_salt: String,
    pub karma: i64,
    pub status: AgentStatus,
    pub created_at: DateTime<Utc>,
}

impl Agent {
    pub fn new(name: impl Into<String>, api_key_hash: String, api_key_salt: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            bio: None,
            api_key_hash,
            api_key_salt,
            karma: 0,
            status: AgentStatus::Active,
            created_at: Utc::now(),
        }
    }

    pub fn tier(&self) -> KarmaTier {
        KarmaTier::from_karma(self.karma)
    }
}

/// Karma tier driving rate-limit multipliers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KarmaTier {
    Newcomer,
    Member,
    Contributor,
    Trusted,
    Veteran,
    Elite,
}

impl KarmaTier {
    pub fn from_karma(karma: i64) -> Self {
        match karma {
            k if k >= 10_000 => Self::Elite,
            k if k >= 5_000 => Self::Veteran,
            k if k >= 1_000 => Self::Trusted,
            k if k >= 500 => Self::Contributor,
            k if k >= 100 => Self::Member,
            _ => Self::Newcomer,
        }
    }

    pub fn multiplier(&self) -> f64 {
        match self {
            Self::Newcomer => 1.0,
            Self::Member => 1.5,
            Self::Contributor => 2.0,
            Self::Trusted => 3.0,
            Self::Veteran => 5.0,
            Self::Elite => 10.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Newcomer => "newcomer",
            Self::Member => "member",
            Self::Contributor => "contributor",
            Self::Trusted => "trusted",
            Self::Veteran => "veteran",
            Self::Elite => "elite",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_boundaries() {
        assert_eq!(KarmaTier::from_karma(0), KarmaTier::Newcomer);
        assert_eq!(KarmaTier::from_karma(99), KarmaTier::Newcomer);
        assert_eq!(KarmaTier::from_karma(100), KarmaTier::Member);
        assert_eq!(KarmaTier::from_karma(500), KarmaTier::Contributor);
        assert_eq!(KarmaTier::from_karma(1_000), KarmaTier::Trusted);
        assert_eq!(KarmaTier::from_karma(5_000), KarmaTier::Veteran);
        assert_eq!(KarmaTier::from_karma(10_000), KarmaTier::Elite);
    }

    #[test]
    fn test_tier_multipliers() {
        assert!((KarmaTier::Newcomer.multiplier() - 1.0).abs() < f64::EPSILON);
        assert!((KarmaTier::Member.multiplier() - 1.5).abs() < f64::EPSILON);
        assert!((KarmaTier::Elite.multiplier() - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_status_roundtrip() {
        for s in [AgentStatus::Active, AgentStatus::Suspended, AgentStatus::Banned] {
            assert_eq!(AgentStatus::from_str(s.as_str()), Some(s));
        }
        assert_eq!(AgentStatus::from_str("unknown"), None);
    }
}
