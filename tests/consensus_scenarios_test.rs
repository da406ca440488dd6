//! End-to-end consensus scenarios: guild thresholds, solo owner
//! approval, and karma-weighted open voting.

mod common;

use common::{guild, testbed, testbed_with};
use gitswarm::domain::errors::DomainError;
use gitswarm::domain::models::{
    ConsensusReason, MaintainerRole, OwnershipModel, RepoSettingsPatch, ReviewVerdict,
};
use gitswarm::services::StreamOptions;

#[tokio::test]
async fn test_guild_merge_reaches_threshold_at_two_of_three() {
    let bed = testbed_with(guild(0.66, 1)).await;
    let m1 = bed.register("m1").await; // becomes owner
    let m2 = bed.register("m2").await;
    let m3 = bed.register("m3").await;
    bed.coordinator
        .add_maintainer(&m1, bed.repo.id, "m2", MaintainerRole::Maintainer)
        .await
        .unwrap();
    bed.coordinator
        .add_maintainer(&m1, bed.repo.id, "m3", MaintainerRole::Maintainer)
        .await
        .unwrap();
    let _ = m3;
    let a1 = bed.register("a1").await;

    let (stream, _) = bed
        .coordinator
        .create_workspace(&a1, bed.repo.id, StreamOptions {
            name: Some("s1".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    bed.git.stage_file(&stream.branch_ref, "a.txt");
    bed.coordinator.commit(&a1, bed.repo.id, "add a.txt").await.unwrap();
    bed.coordinator.submit_stream_for_review(&a1, stream.id).await.unwrap();

    // One of three maintainers is below the 0.66 threshold.
    let (_, decision) = bed
        .coordinator
        .submit_review(&m1, stream.id, ReviewVerdict::Approve, None, false, false)
        .await
        .unwrap();
    assert!(!decision.reached);
    assert!((decision.ratio.unwrap() - 1.0 / 3.0).abs() < 0.001);

    // The second approval crosses it.
    let (_, decision) = bed
        .coordinator
        .submit_review(&m2, stream.id, ReviewVerdict::Approve, None, false, false)
        .await
        .unwrap();
    assert!(decision.reached);
    assert!((decision.ratio.unwrap() - 2.0 / 3.0).abs() < 0.001);

    let entry = bed.coordinator.request_merge(&a1, stream.id).await.unwrap();
    assert_eq!(entry.status.as_str(), "merged");
    assert!(bed.git.branch_files("swarm/buffer").contains(&"a.txt".to_string()));

    // Consensus is a pure query: still reached after the merge.
    let decision = bed.coordinator.check_consensus(stream.id).await.unwrap();
    assert!(decision.reached);

    // The author earns the merge award, reviewers the review award.
    let a1 = bed.reload(&a1).await;
    assert_eq!(a1.agent.karma, 25);
    let m1 = bed.reload(&m1).await;
    assert_eq!(m1.agent.karma, 5);

    // Promotion fast-forwards the buffer into main.
    bed.coordinator.promote(&m1, bed.repo.id).await.unwrap();
    assert!(bed.git.branch_files("main").contains(&"a.txt".to_string()));
}

#[tokio::test]
async fn test_solo_requires_owner_approval() {
    let bed = testbed().await;
    let owner = bed.register("owner").await;
    let author = bed.register("author").await;
    let outsider = bed.register("outsider").await;

    let (stream, _) = bed
        .coordinator
        .create_workspace(&author, bed.repo.id, StreamOptions {
            name: Some("patch".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    bed.git.stage_file(&stream.branch_ref, "fix.txt");
    bed.coordinator.commit(&author, bed.repo.id, "fix").await.unwrap();
    bed.coordinator.submit_stream_for_review(&author, stream.id).await.unwrap();

    // A non-owner approval is informational only.
    let (_, decision) = bed
        .coordinator
        .submit_review(&outsider, stream.id, ReviewVerdict::Approve, None, false, false)
        .await
        .unwrap();
    assert!(!decision.reached);
    assert_eq!(decision.reason, ConsensusReason::InsufficientOwnerApproval);

    let err = bed.coordinator.request_merge(&author, stream.id).await.unwrap_err();
    assert!(matches!(err, DomainError::Consensus(_)));

    let (_, decision) = bed
        .coordinator
        .submit_review(&owner, stream.id, ReviewVerdict::Approve, None, false, false)
        .await
        .unwrap();
    assert!(decision.reached);

    let entry = bed.coordinator.request_merge(&author, stream.id).await.unwrap();
    assert_eq!(entry.status.as_str(), "merged");
}

#[tokio::test]
async fn test_open_karma_weighted_tie_and_human_weight() {
    // Tie at exactly the threshold counts as reached.
    let bed = testbed_with(RepoSettingsPatch {
        ownership_model: Some(OwnershipModel::Open),
        consensus_threshold: Some(0.5),
        ..Default::default()
    })
    .await;
    let _owner = bed.register("owner").await;
    let author = bed.register("author").await;
    let v1 = bed.register("v1").await;
    let v2 = bed.register("v2").await;
    let v1 = bed.set_karma(&v1, 100).await;
    let v2 = bed.set_karma(&v2, 100).await;

    let (stream, _) = bed
        .coordinator
        .create_workspace(&author, bed.repo.id, StreamOptions::default())
        .await
        .unwrap();
    bed.coordinator.submit_stream_for_review(&author, stream.id).await.unwrap();

    bed.coordinator
        .submit_review(&v1, stream.id, ReviewVerdict::Approve, None, false, false)
        .await
        .unwrap();
    let (_, decision) = bed
        .coordinator
        .submit_review(&v2, stream.id, ReviewVerdict::RequestChanges, None, false, false)
        .await
        .unwrap();
    // W_a = W_r = 100 => ratio 0.5 >= 0.5.
    assert!(decision.reached);
    assert!((decision.ratio.unwrap() - 0.5).abs() < f64::EPSILON);

    // With human weight 1.5 on the rejecting reviewer, ratio drops to
    // 0.4 and consensus is lost.
    let bed = testbed_with(RepoSettingsPatch {
        ownership_model: Some(OwnershipModel::Open),
        consensus_threshold: Some(0.5),
        human_review_weight: Some(1.5),
        ..Default::default()
    })
    .await;
    let _owner = bed.register("owner").await;
    let author = bed.register("author").await;
    let v1 = bed.register("v1").await;
    let v2 = bed.register("v2").await;
    let v1 = bed.set_karma(&v1, 100).await;
    let v2 = bed.set_karma(&v2, 100).await;

    let (stream, _) = bed
        .coordinator
        .create_workspace(&author, bed.repo.id, StreamOptions::default())
        .await
        .unwrap();
    bed.coordinator.submit_stream_for_review(&author, stream.id).await.unwrap();

    bed.coordinator
        .submit_review(&v1, stream.id, ReviewVerdict::Approve, None, false, false)
        .await
        .unwrap();
    let (_, decision) = bed
        .coordinator
        .submit_review(&v2, stream.id, ReviewVerdict::RequestChanges, None, false, true)
        .await
        .unwrap();
    assert!(!decision.reached);
    assert!((decision.ratio.unwrap() - 0.4).abs() < 0.001);
}

#[tokio::test]
async fn test_review_overwrite_does_not_double_count_or_double_award() {
    let bed = testbed_with(guild(0.5, 1)).await;
    let owner = bed.register("owner").await;
    let author = bed.register("author").await;

    let (stream, _) = bed
        .coordinator
        .create_workspace(&author, bed.repo.id, StreamOptions::default())
        .await
        .unwrap();
    bed.coordinator.submit_stream_for_review(&author, stream.id).await.unwrap();

    bed.coordinator
        .submit_review(&owner, stream.id, ReviewVerdict::RequestChanges, None, false, false)
        .await
        .unwrap();
    // Re-review by the same agent overwrites the row.
    bed.coordinator
        .submit_review(&owner, stream.id, ReviewVerdict::Approve, None, false, false)
        .await
        .unwrap();

    let reviews = bed.coordinator.reviews_for_stream(stream.id).await.unwrap();
    assert_eq!(reviews.len(), 1);
    assert_eq!(reviews[0].verdict, ReviewVerdict::Approve);

    // The +5 review award fires once despite the overwrite.
    let owner = bed.reload(&owner).await;
    assert_eq!(owner.agent.karma, 5);
}
