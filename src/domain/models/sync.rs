//! Sync protocol types: outbound queue items, inbound deltas, cursors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Typed outbound event classes recorded alongside state changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncEventType {
    TaskClaim,
    TaskSubmission,
    Review,
    ConfigChange,
    StreamStatus,
    MergeRequest,
    AgentStatus,
    AccessChange,
    ProposalVote,
}

impl SyncEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TaskClaim => "task_claim",
            Self::TaskSubmission => "task_submission",
            Self::Review => "review",
            Self::ConfigChange => "config_change",
            Self::StreamStatus => "stream_status",
            Self::MergeRequest => "merge_request",
            Self::AgentStatus => "agent_status",
            Self::AccessChange => "access_change",
            Self::ProposalVote => "proposal_vote",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "task_claim" => Some(Self::TaskClaim),
            "task_submission" => Some(Self::TaskSubmission),
            "review" => Some(Self::Review),
            "config_change" => Some(Self::ConfigChange),
            "stream_status" => Some(Self::StreamStatus),
            "merge_request" => Some(Self::MergeRequest),
            "agent_status" => Some(Self::AgentStatus),
            "access_change" => Some(Self::AccessChange),
            "proposal_vote" => Some(Self::ProposalVote),
            _ => None,
        }
    }
}

/// A queued outbound event. The local id is monotonically increasing;
/// the flusher drains strictly in id order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncQueueItem {
    pub id: i64,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Inbound delta categories, each with its own cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncCategory {
    Tasks,
    AccessChanges,
    Proposals,
    Reviews,
    Merges,
    ConfigChanges,
}

impl SyncCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tasks => "tasks",
            Self::AccessChanges => "access_changes",
            Self::Proposals => "proposals",
            Self::Reviews => "reviews",
            Self::Merges => "merges",
            Self::ConfigChanges => "config_changes",
        }
    }

    pub fn all() -> &'static [SyncCategory] {
        &[
            Self::Tasks,
            Self::AccessChanges,
            Self::Proposals,
            Self::Reviews,
            Self::Merges,
            Self::ConfigChanges,
        ]
    }
}

/// One changed row inside a delta; applied idempotently keyed by
/// `(table, id, updated_at)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeltaRow {
    pub table: String,
    pub id: String,
    pub updated_at: DateTime<Utc>,
    pub data: serde_json::Value,
}

/// Server response to an update poll.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncDelta {
    pub category: SyncCategory,
    pub rows: Vec<DeltaRow>,
    pub next_cursor: String,
}

/// Server response to an outbound batch push.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushReport {
    pub accepted: Vec<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_roundtrip() {
        for t in [
            SyncEventType::TaskClaim,
            SyncEventType::Review,
            SyncEventType::ConfigChange,
            SyncEventType::StreamStatus,
            SyncEventType::MergeRequest,
        ] {
            assert_eq!(SyncEventType::from_str(t.as_str()), Some(t));
        }
    }

    #[test]
    fn test_all_categories_distinct() {
        let all = SyncCategory::all();
        let names: std::collections::HashSet<_> = all.iter().map(|c| c.as_str()).collect();
        assert_eq!(names.len(), all.len());
    }
}
