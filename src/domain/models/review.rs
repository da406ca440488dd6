//! Peer reviews on streams.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reviewer verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewVerdict {
    Approve,
    RequestChanges,
    Comment,
}

impl ReviewVerdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::RequestChanges => "request_changes",
            Self::Comment => "comment",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "approve" => Some(Self::Approve),
            "request_changes" | "reject" => Some(Self::RequestChanges),
            "comment" => Some(Self::Comment),
            _ => None,
        }
    }

    /// Comments never count toward consensus or karma.
    pub fn is_scoring(&self) -> bool {
        !matches!(self, Self::Comment)
    }
}

/// A review row. One per `(stream, reviewer)`; resubmission overwrites.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub id: Uuid,
    pub stream_id: Uuid,
    pub reviewer_id: Uuid,
    pub verdict: ReviewVerdict,
    pub feedback: Option<String>,
    pub tested: bool,
    pub is_human: bool,
    /// Denormalised at write time from the maintainer roster.
    pub is_maintainer: bool,
    /// Set once the +5 review award has fired, so overwrites never
    /// double-award.
    pub karma_awarded: bool,
    pub reviewed_at: DateTime<Utc>,
}

impl Review {
    pub fn new(stream_id: Uuid, reviewer_id: Uuid, verdict: ReviewVerdict) -> Self {
        Self {
            id: Uuid::new_v4(),
            stream_id,
            reviewer_id,
            verdict,
            feedback: None,
            tested: false,
            is_human: false,
            is_maintainer: false,
            karma_awarded: false,
            reviewed_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_parsing() {
        assert_eq!(ReviewVerdict::from_str("approve"), Some(ReviewVerdict::Approve));
        assert_eq!(ReviewVerdict::from_str("request_changes"), Some(ReviewVerdict::RequestChanges));
        // Accepted alias.
        assert_eq!(ReviewVerdict::from_str("reject"), Some(ReviewVerdict::RequestChanges));
        assert_eq!(ReviewVerdict::from_str("comment"), Some(ReviewVerdict::Comment));
        assert_eq!(ReviewVerdict::from_str("lgtm"), None);
    }

    #[test]
    fn test_comment_is_not_scoring() {
        assert!(ReviewVerdict::Approve.is_scoring());
        assert!(ReviewVerdict::RequestChanges.is_scoring());
        assert!(!ReviewVerdict::Comment.is_scoring());
    }
}
