//! Task market: tasks offered by a repository and claims against them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of a market task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Open,
    Claimed,
    Submitted,
    Completed,
    Cancelled,
    Expired,
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Open
    }
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Claimed => "claimed",
            Self::Submitted => "submitted",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "open" => Some(Self::Open),
            "claimed" => Some(Self::Claimed),
            "submitted" => Some(Self::Submitted),
            "completed" | "complete" => Some(Self::Completed),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Expired)
    }
}

/// Task priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
    Critical,
}

impl Default for TaskPriority {
    fn default() -> Self {
        Self::Medium
    }
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" | "normal" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

/// A unit of work offered on the market.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub repo_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    /// Bounty amount; drives the karma award on approval.
    pub amount: i64,
    pub creator_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(repo_id: Uuid, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            repo_id,
            title: title.into(),
            description: None,
            status: TaskStatus::Open,
            priority: TaskPriority::Medium,
            amount: 0,
            creator_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Karma awarded to the claimant when the claim is approved.
    /// Zero-amount tasks award nothing.
    pub fn karma_award(&self) -> i64 {
        if self.amount > 0 {
            (self.amount / 10).max(1)
        } else {
            0
        }
    }
}

/// Status of a claim on a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    Active,
    Submitted,
    Approved,
    Rejected,
    Abandoned,
}

impl ClaimStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Submitted => "submitted",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Abandoned => "abandoned",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "active" => Some(Self::Active),
            "submitted" => Some(Self::Submitted),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "abandoned" => Some(Self::Abandoned),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected | Self::Abandoned)
    }
}

/// An agent's claim on a task, optionally linked to the stream
/// carrying the work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claim {
    pub id: Uuid,
    pub task_id: Uuid,
    pub agent_id: Uuid,
    pub stream_id: Option<Uuid>,
    pub status: ClaimStatus,
    pub notes: Option<String>,
    pub claimed_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

impl Claim {
    pub fn new(task_id: Uuid, agent_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id,
            agent_id,
            stream_id: None,
            status: ClaimStatus::Active,
            notes: None,
            claimed_at: Utc::now(),
            submitted_at: None,
            reviewed_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_karma_award_formula() {
        let mut task = Task::new(Uuid::new_v4(), "t");
        task.amount = 0;
        assert_eq!(task.karma_award(), 0);
        task.amount = 5;
        assert_eq!(task.karma_award(), 1);
        task.amount = 10;
        assert_eq!(task.karma_award(), 1);
        task.amount = 250;
        assert_eq!(task.karma_award(), 25);
    }

    #[test]
    fn test_claim_terminality() {
        assert!(!ClaimStatus::Active.is_terminal());
        assert!(!ClaimStatus::Submitted.is_terminal());
        assert!(ClaimStatus::Approved.is_terminal());
        assert!(ClaimStatus::Rejected.is_terminal());
        assert!(ClaimStatus::Abandoned.is_terminal());
    }

    #[test]
    fn test_task_status_roundtrip() {
        for s in [
            TaskStatus::Open,
            TaskStatus::Claimed,
            TaskStatus::Submitted,
            TaskStatus::Completed,
            TaskStatus::Cancelled,
            TaskStatus::Expired,
        ] {
            assert_eq!(TaskStatus::from_str(s.as_str()), Some(s));
        }
    }
}
