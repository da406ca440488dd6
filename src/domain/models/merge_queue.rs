//! Merge queue entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of a merge queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeEntryStatus {
    Pending,
    Processing,
    Merged,
    Failed,
    Cancelled,
}

impl MergeEntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Merged => "merged",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "merged" => Some(Self::Merged),
            "failed" => Some(Self::Failed),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Merged | Self::Failed | Self::Cancelled)
    }
}

/// A merge request in the per-repository FIFO queue.
///
/// Ordering is `(priority DESC, enqueued_at ASC)`; council-authorised
/// head insertions carry a priority above every pending entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeQueueEntry {
    pub id: Uuid,
    pub repo_id: Uuid,
    pub stream_id: Uuid,
    pub requester_id: Uuid,
    pub status: MergeEntryStatus,
    pub priority: i64,
    pub council_authorized: bool,
    pub attempts: u32,
    pub last_error: Option<String>,
    /// Merge commit on the buffer, recorded on success; used by
    /// stabilization auto-revert to locate the offending merge.
    pub merge_commit: Option<String>,
    pub enqueued_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MergeQueueEntry {
    pub fn new(repo_id: Uuid, stream_id: Uuid, requester_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            repo_id,
            stream_id,
            requester_id,
            status: MergeEntryStatus::Pending,
            priority: 0,
            council_authorized: false,
            attempts: 0,
            last_error: None,
            merge_commit: None,
            enqueued_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_defaults() {
        let e = MergeQueueEntry::new(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        assert_eq!(e.status, MergeEntryStatus::Pending);
        assert_eq!(e.priority, 0);
        assert!(!e.council_authorized);
        assert_eq!(e.attempts, 0);
    }

    #[test]
    fn test_terminality() {
        assert!(!MergeEntryStatus::Pending.is_terminal());
        assert!(!MergeEntryStatus::Processing.is_terminal());
        assert!(MergeEntryStatus::Merged.is_terminal());
        assert!(MergeEntryStatus::Failed.is_terminal());
        assert!(MergeEntryStatus::Cancelled.is_terminal());
    }
}
