//! Consensus evaluation.
//!
//! `evaluate` is a pure function over the repository policy, the
//! current review set, the maintainer roster, and reviewer karma. It
//! never mutates anything; callers load state and interpret the
//! decision.

use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::models::{
    ConsensusDecision, ConsensusReason, Maintainer, MaintainerRole, OwnershipModel, Repository,
    Review, ReviewVerdict,
};

/// Evaluate the review set for a stream against the repository's
/// ownership model.
///
/// `reviews` must hold at most one row per reviewer (the store's
/// uniqueness constraint guarantees this); `karma_by_reviewer` feeds
/// the open model's vote weights.
pub fn evaluate(
    repo: &Repository,
    reviews: &[Review],
    maintainers: &[Maintainer],
    karma_by_reviewer: &HashMap<Uuid, i64>,
) -> ConsensusDecision {
    let scoring: Vec<&Review> = reviews.iter().filter(|r| r.verdict.is_scoring()).collect();
    let approvals =
        scoring.iter().filter(|r| r.verdict == ReviewVerdict::Approve).count() as u32;
    let rejections =
        scoring.iter().filter(|r| r.verdict == ReviewVerdict::RequestChanges).count() as u32;

    // A maintainer's request-changes blocks in every model. Ordinary
    // rejections in the open model weigh instead of vetoing.
    let maintainer_block = scoring
        .iter()
        .any(|r| r.verdict == ReviewVerdict::RequestChanges && r.is_maintainer);
    if maintainer_block {
        return ConsensusDecision::blocked(
            ConsensusReason::ChangesRequested,
            approvals,
            rejections,
            repo.min_reviews,
        );
    }

    if (reviews.len() as u32) < repo.min_reviews {
        return ConsensusDecision::blocked(
            ConsensusReason::InsufficientReviews,
            approvals,
            rejections,
            repo.min_reviews,
        );
    }

    match repo.ownership_model {
        OwnershipModel::Solo => evaluate_solo(repo, &scoring, maintainers, approvals, rejections),
        OwnershipModel::Guild => evaluate_guild(repo, &scoring, maintainers),
        OwnershipModel::Open => {
            evaluate_open(repo, &scoring, karma_by_reviewer, approvals, rejections)
        }
    }
}

fn evaluate_solo(
    repo: &Repository,
    scoring: &[&Review],
    maintainers: &[Maintainer],
    approvals: u32,
    rejections: u32,
) -> ConsensusDecision {
    let owner_approved = scoring.iter().any(|r| {
        r.verdict == ReviewVerdict::Approve
            && maintainers
                .iter()
                .any(|m| m.agent_id == r.reviewer_id && m.role == MaintainerRole::Owner)
    });

    if owner_approved {
        ConsensusDecision {
            reached: true,
            reason: ConsensusReason::Reached,
            ratio: None,
            threshold: None,
            approvals,
            rejections,
            required: repo.min_reviews,
        }
    } else {
        ConsensusDecision::blocked(
            ConsensusReason::InsufficientOwnerApproval,
            approvals,
            rejections,
            repo.min_reviews,
        )
    }
}

fn evaluate_guild(
    repo: &Repository,
    scoring: &[&Review],
    maintainers: &[Maintainer],
) -> ConsensusDecision {
    let maintainer_reviews: Vec<&&Review> =
        scoring.iter().filter(|r| r.is_maintainer).collect();
    let approvals =
        maintainer_reviews.iter().filter(|r| r.verdict == ReviewVerdict::Approve).count() as u32;
    let rejections = maintainer_reviews
        .iter()
        .filter(|r| r.verdict == ReviewVerdict::RequestChanges)
        .count() as u32;
    let total = maintainers.len() as u32;

    if total == 0 {
        return ConsensusDecision::blocked(
            ConsensusReason::NoVotes,
            approvals,
            rejections,
            repo.min_reviews,
        );
    }

    let ratio = f64::from(approvals) / f64::from(total);
    // Ties at exactly the threshold count as reached.
    let reached = ratio >= repo.consensus_threshold && rejections == 0;

    ConsensusDecision {
        reached,
        reason: if reached {
            ConsensusReason::Reached
        } else if rejections > 0 {
            ConsensusReason::MaintainerRejection
        } else {
            ConsensusReason::BelowThreshold
        },
        ratio: Some(ratio),
        threshold: Some(repo.consensus_threshold),
        approvals,
        rejections,
        required: repo.min_reviews,
    }
}

fn evaluate_open(
    repo: &Repository,
    scoring: &[&Review],
    karma_by_reviewer: &HashMap<Uuid, i64>,
    approvals: u32,
    rejections: u32,
) -> ConsensusDecision {
    let weight = |review: &Review| -> f64 {
        let karma = karma_by_reviewer.get(&review.reviewer_id).copied().unwrap_or(0);
        let mut w = karma.max(1) as f64;
        if review.is_human {
            w *= repo.human_review_weight;
        }
        w
    };

    let approve_weight: f64 = scoring
        .iter()
        .filter(|r| r.verdict == ReviewVerdict::Approve)
        .map(|r| weight(r))
        .sum();
    let reject_weight: f64 = scoring
        .iter()
        .filter(|r| r.verdict == ReviewVerdict::RequestChanges)
        .map(|r| weight(r))
        .sum();

    let total = approve_weight + reject_weight;
    if total <= 0.0 {
        return ConsensusDecision::blocked(
            ConsensusReason::NoVotes,
            approvals,
            rejections,
            repo.min_reviews,
        );
    }

    let ratio = approve_weight / total;
    let reached = ratio >= repo.consensus_threshold;

    ConsensusDecision {
        reached,
        reason: if reached { ConsensusReason::Reached } else { ConsensusReason::BelowThreshold },
        ratio: Some(ratio),
        threshold: Some(repo.consensus_threshold),
        approvals,
        rejections,
        required: repo.min_reviews,
    }
}
