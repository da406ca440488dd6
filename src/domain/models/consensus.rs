//! Consensus decision types.

use serde::{Deserialize, Serialize};

/// Why a consensus check resolved the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsensusReason {
    Reached,
    ChangesRequested,
    InsufficientReviews,
    InsufficientOwnerApproval,
    BelowThreshold,
    MaintainerRejection,
    NoVotes,
}

impl ConsensusReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reached => "reached",
            Self::ChangesRequested => "changes_requested",
            Self::InsufficientReviews => "insufficient_reviews",
            Self::InsufficientOwnerApproval => "insufficient_owner_approval",
            Self::BelowThreshold => "below_threshold",
            Self::MaintainerRejection => "maintainer_rejection",
            Self::NoVotes => "no_votes",
        }
    }
}

/// Result of evaluating a stream's reviews against the repository's
/// ownership model. Pure data; computing it never mutates state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusDecision {
    pub reached: bool,
    pub reason: ConsensusReason,
    pub ratio: Option<f64>,
    pub threshold: Option<f64>,
    pub approvals: u32,
    pub rejections: u32,
    pub required: u32,
}

impl ConsensusDecision {
    pub fn blocked(reason: ConsensusReason, approvals: u32, rejections: u32, required: u32) -> Self {
        Self { reached: false, reason, ratio: None, threshold: None, approvals, rejections, required }
    }
}
