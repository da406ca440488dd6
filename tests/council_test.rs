//! Council governance: quorum voting, auto-execution, tie handling,
//! last-owner protection, and head-of-queue merges.

mod common;

use common::{guild, testbed_with};
use gitswarm::domain::errors::DomainError;
use gitswarm::domain::models::{
    AccessLevel, CouncilRole, CouncilStatus, MaintainerRole, ProposalAction, ProposalStatus,
    VoteChoice,
};
use gitswarm::services::{CouncilParams, StreamOptions};

fn params(quorum: u32) -> CouncilParams {
    CouncilParams {
        min_members: 3,
        max_members: 9,
        standard_quorum: quorum,
        critical_quorum: quorum + 1,
        term_days: 90,
    }
}

#[tokio::test]
async fn test_council_forms_then_activates_at_min_members() {
    let bed = testbed_with(guild(0.5, 1)).await;
    let owner = bed.register("owner").await;
    bed.register("m2").await;
    bed.register("m3").await;

    let council = bed
        .coordinator
        .create_council(&owner, bed.repo.id, params(2))
        .await
        .unwrap();
    assert_eq!(council.status, CouncilStatus::Forming);

    bed.coordinator
        .add_council_member(&owner, council.id, "owner", CouncilRole::Chair)
        .await
        .unwrap();
    bed.coordinator
        .add_council_member(&owner, council.id, "m2", CouncilRole::Member)
        .await
        .unwrap();
    // Adding the same member again is idempotent.
    bed.coordinator
        .add_council_member(&owner, council.id, "m2", CouncilRole::Member)
        .await
        .unwrap();
    let members = bed.coordinator.council_members(council.id).await.unwrap();
    assert_eq!(members.len(), 2);

    bed.coordinator
        .add_council_member(&owner, council.id, "m3", CouncilRole::Member)
        .await
        .unwrap();
    let council = bed.coordinator.council_for_repo(bed.repo.id).await.unwrap().unwrap();
    assert_eq!(council.status, CouncilStatus::Active);
}

#[tokio::test]
async fn test_add_maintainer_proposal_passes_and_executes() {
    // S6: 3-member council, quorum 2, add_maintainer for agent_q.
    let bed = testbed_with(guild(0.5, 1)).await;
    let owner = bed.register("owner").await;
    let m2 = bed.register("m2").await;
    bed.register("m3").await;
    bed.register("agent_q").await;

    let council = bed
        .coordinator
        .create_council(&owner, bed.repo.id, params(2))
        .await
        .unwrap();
    for name in ["owner", "m2", "m3"] {
        bed.coordinator
            .add_council_member(&owner, council.id, name, CouncilRole::Member)
            .await
            .unwrap();
    }

    let target = bed.coordinator.get_agent("agent_q").await.unwrap();
    let proposal = bed
        .coordinator
        .propose(
            &owner,
            council.id,
            "seat agent_q",
            ProposalAction::AddMaintainer {
                agent_id: target.id,
                role: MaintainerRole::Maintainer,
            },
            None,
        )
        .await
        .unwrap();

    // One vote: below quorum, still open.
    let after_one = bed.coordinator.vote(&owner, proposal.id, VoteChoice::For).await.unwrap();
    assert_eq!(after_one.status, ProposalStatus::Open);
    assert_eq!(after_one.votes_for, 1);

    // Second vote meets quorum with F > A: passed and executed.
    let after_two = bed.coordinator.vote(&m2, proposal.id, VoteChoice::For).await.unwrap();
    assert_eq!(after_two.status, ProposalStatus::Passed);
    assert!(after_two.executed);

    let resolved =
        bed.coordinator.resolve_permissions("agent_q", bed.repo.id).await.unwrap();
    assert_eq!(resolved.level, AccessLevel::Maintain);
}

#[tokio::test]
async fn test_tie_rejects_with_marker_and_revote_reevaluates() {
    let bed = testbed_with(guild(0.5, 1)).await;
    let owner = bed.register("owner").await;
    let m2 = bed.register("m2").await;
    let m3 = bed.register("m3").await;

    let council = bed
        .coordinator
        .create_council(&owner, bed.repo.id, params(2))
        .await
        .unwrap();
    for name in ["owner", "m2", "m3"] {
        bed.coordinator
            .add_council_member(&owner, council.id, name, CouncilRole::Member)
            .await
            .unwrap();
    }

    let proposal = bed
        .coordinator
        .propose(
            &owner,
            council.id,
            "raise threshold",
            ProposalAction::ChangeThreshold { consensus_threshold: 0.75 },
            None,
        )
        .await
        .unwrap();

    bed.coordinator.vote(&owner, proposal.id, VoteChoice::For).await.unwrap();
    // A vote change re-evaluates: m2 first abstains, then goes against.
    let after = bed.coordinator.vote(&m2, proposal.id, VoteChoice::Abstain).await.unwrap();
    assert_eq!(after.status, ProposalStatus::Open);
    let _ = m3;

    let after = bed.coordinator.vote(&m2, proposal.id, VoteChoice::Against).await.unwrap();
    assert_eq!(after.status, ProposalStatus::Rejected);
    assert_eq!(after.resolution.as_deref(), Some("tie"));
    assert!(!after.executed);

    // votes_cast counts creations, not updates.
    let members = bed.coordinator.council_members(council.id).await.unwrap();
    let m2_row = members.iter().find(|m| m.agent_id == m2.agent.id).unwrap();
    assert_eq!(m2_row.votes_cast, 1);
}

#[tokio::test]
async fn test_remove_last_owner_fails_execution_but_keeps_proposal_passed() {
    let bed = testbed_with(guild(0.5, 1)).await;
    let owner = bed.register("owner").await; // sole owner
    let m2 = bed.register("m2").await;
    bed.register("m3").await;

    let council = bed
        .coordinator
        .create_council(&owner, bed.repo.id, params(2))
        .await
        .unwrap();
    for name in ["owner", "m2", "m3"] {
        bed.coordinator
            .add_council_member(&owner, council.id, name, CouncilRole::Member)
            .await
            .unwrap();
    }

    let proposal = bed
        .coordinator
        .propose(
            &owner,
            council.id,
            "oust the owner",
            ProposalAction::RemoveMaintainer { agent_id: owner.agent.id },
            None,
        )
        .await
        .unwrap();
    // Critical action: quorum is 3.
    assert_eq!(proposal.quorum_required, 3);

    bed.coordinator.vote(&owner, proposal.id, VoteChoice::Abstain).await.unwrap();
    bed.coordinator.vote(&m2, proposal.id, VoteChoice::For).await.unwrap();
    let m3 = bed.coordinator.context_by_name("m3").await.unwrap();
    let resolved = bed.coordinator.vote(&m3, proposal.id, VoteChoice::For).await.unwrap();

    // Passed, but execution refused: the last owner stays.
    assert_eq!(resolved.status, ProposalStatus::Passed);
    assert!(!resolved.executed);
    assert!(resolved.execution_result.unwrap().contains("last owner"));

    let resolved = bed.coordinator.resolve_permissions("owner", bed.repo.id).await.unwrap();
    assert_eq!(resolved.level, AccessLevel::Admin);
}

#[tokio::test]
async fn test_council_merge_stream_jumps_the_queue() {
    let bed = testbed_with(guild(0.5, 1)).await;
    let owner = bed.register("owner").await;
    let m2 = bed.register("m2").await;
    bed.register("m3").await;
    let author = bed.register("author").await;

    let council = bed
        .coordinator
        .create_council(&owner, bed.repo.id, params(2))
        .await
        .unwrap();
    for name in ["owner", "m2", "m3"] {
        bed.coordinator
            .add_council_member(&owner, council.id, name, CouncilRole::Member)
            .await
            .unwrap();
    }

    // An unreviewed stream the council wants in regardless.
    let (stream, _) = bed
        .coordinator
        .create_workspace(&author, bed.repo.id, StreamOptions::default())
        .await
        .unwrap();
    bed.git.stage_file(&stream.branch_ref, "urgent.txt");
    bed.coordinator.commit(&author, bed.repo.id, "urgent fix").await.unwrap();
    bed.coordinator.submit_stream_for_review(&author, stream.id).await.unwrap();

    // Without council authority the merge is blocked on consensus.
    let err = bed.coordinator.request_merge(&author, stream.id).await.unwrap_err();
    assert!(matches!(err, DomainError::Consensus(_)));

    let proposal = bed
        .coordinator
        .propose(
            &owner,
            council.id,
            "merge the urgent fix",
            ProposalAction::MergeStream { stream_id: stream.id, bypass_consensus: true },
            None,
        )
        .await
        .unwrap();
    bed.coordinator.vote(&owner, proposal.id, VoteChoice::For).await.unwrap();
    let resolved = bed.coordinator.vote(&m2, proposal.id, VoteChoice::For).await.unwrap();
    assert_eq!(resolved.status, ProposalStatus::Passed);
    assert!(resolved.executed);

    // The council-authorised entry sits at the head with a priority
    // above ordinary entries.
    let queue = bed.coordinator.merge_queue(bed.repo.id).await.unwrap();
    let entry = queue.iter().find(|e| e.stream_id == stream.id).unwrap();
    assert!(entry.council_authorized);
    assert!(entry.priority > 0);

    // Drain the queue and confirm the bypassed merge lands.
    let cancel = tokio_util::sync::CancellationToken::new();
    bed.coordinator.merge_service().drain(bed.repo.id, &cancel).await.unwrap();
    assert!(bed.git.branch_files("swarm/buffer").contains(&"urgent.txt".to_string()));

    // Consensus was bypassed by explicit policy; review rows remain
    // empty.
    let reviews = bed.coordinator.reviews_for_stream(stream.id).await.unwrap();
    assert!(reviews.is_empty());
}

#[tokio::test]
async fn test_proposal_expiry() {
    let bed = testbed_with(guild(0.5, 1)).await;
    let owner = bed.register("owner").await;
    let m2 = bed.register("m2").await;
    bed.register("m3").await;

    let council = bed
        .coordinator
        .create_council(&owner, bed.repo.id, params(2))
        .await
        .unwrap();
    for name in ["owner", "m2", "m3"] {
        bed.coordinator
            .add_council_member(&owner, council.id, name, CouncilRole::Member)
            .await
            .unwrap();
    }

    // Already-expired deadline: the sweep on the next read flips it.
    let proposal = bed
        .coordinator
        .propose(
            &owner,
            council.id,
            "stale idea",
            ProposalAction::ChangeThreshold { consensus_threshold: 0.9 },
            Some(chrono::Duration::hours(-1)),
        )
        .await
        .unwrap();

    let reloaded = bed.coordinator.proposal(proposal.id).await.unwrap();
    assert_eq!(reloaded.status, ProposalStatus::Expired);

    // Voting on an expired proposal is rejected.
    let err = bed.coordinator.vote(&m2, proposal.id, VoteChoice::For).await.unwrap_err();
    assert!(matches!(err, DomainError::Conflict(_)));
}
