//! Stream lifecycle: workspace binding, parent ordering, swarm mode,
//! stabilization auto-revert, and promotion divergence.

mod common;

use common::{guild, testbed_with};
use gitswarm::domain::errors::DomainError;
use gitswarm::domain::models::{
    MergeMode, RepoSettingsPatch, ReviewVerdict, StreamStatus,
};
use gitswarm::domain::ports::GitBackend;
use gitswarm::services::StreamOptions;

#[tokio::test]
async fn test_one_worktree_per_agent_and_repo() {
    let bed = testbed_with(guild(0.5, 1)).await;
    let _owner = bed.register("owner").await;
    let agent = bed.register("worker").await;

    bed.coordinator
        .create_workspace(&agent, bed.repo.id, StreamOptions {
            name: Some("first".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();

    let err = bed
        .coordinator
        .create_workspace(&agent, bed.repo.id, StreamOptions {
            name: Some("second".to_string()),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Conflict(_)));

    // After destroying the workspace a new one can be created.
    bed.coordinator.destroy_workspace(&agent, bed.repo.id, false).await.unwrap();
    bed.coordinator
        .create_workspace(&agent, bed.repo.id, StreamOptions {
            name: Some("second".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn test_parent_must_merge_first() {
    let bed = testbed_with(guild(0.5, 1)).await;
    let owner = bed.register("owner").await;
    let author = bed.register("author").await;

    // S_a, then a stacked S_b forked from it.
    let (stream_a, _) = bed
        .coordinator
        .create_workspace(&author, bed.repo.id, StreamOptions {
            name: Some("base-work".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    bed.git.stage_file(&stream_a.branch_ref, "a.txt");
    bed.coordinator.commit(&author, bed.repo.id, "base").await.unwrap();
    bed.coordinator.submit_stream_for_review(&author, stream_a.id).await.unwrap();
    bed.coordinator.destroy_workspace(&author, bed.repo.id, false).await.unwrap();

    let (stream_b, _) = bed
        .coordinator
        .create_workspace(&author, bed.repo.id, StreamOptions {
            name: Some("stacked-work".to_string()),
            parent_stream_id: Some(stream_a.id),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(stream_b.base_branch, stream_a.branch_ref);
    bed.git.stage_file(&stream_b.branch_ref, "b.txt");
    bed.coordinator.commit(&author, bed.repo.id, "stacked").await.unwrap();
    bed.coordinator.submit_stream_for_review(&author, stream_b.id).await.unwrap();

    // Both approved.
    bed.coordinator
        .submit_review(&owner, stream_a.id, ReviewVerdict::Approve, None, false, false)
        .await
        .unwrap();
    bed.coordinator
        .submit_review(&owner, stream_b.id, ReviewVerdict::Approve, None, false, false)
        .await
        .unwrap();

    // Merging the child while the parent is in review is rejected.
    let err = bed.coordinator.request_merge(&author, stream_b.id).await.unwrap_err();
    match err {
        DomainError::Consensus(reason) => assert_eq!(reason, "parent_not_merged"),
        other => panic!("unexpected error: {other:?}"),
    }

    // Parent first, then the child goes through.
    let entry = bed.coordinator.request_merge(&author, stream_a.id).await.unwrap();
    assert_eq!(entry.status.as_str(), "merged");
    let entry = bed.coordinator.request_merge(&author, stream_b.id).await.unwrap();
    assert_eq!(entry.status.as_str(), "merged");

    let files = bed.git.branch_files("swarm/buffer");
    assert!(files.contains(&"a.txt".to_string()));
    assert!(files.contains(&"b.txt".to_string()));
}

#[tokio::test]
async fn test_stream_status_is_monotonic() {
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
        .submit_review(&owner, stream.id, ReviewVerdict::Approve, None, false, false)
        .await
        .unwrap();
    bed.coordinator.request_merge(&author, stream.id).await.unwrap();

    let stream = bed.coordinator.stream(stream.id).await.unwrap();
    assert_eq!(stream.status, StreamStatus::Merged);

    // A merged stream cannot be resubmitted or recommitted.
    let err = bed.coordinator.submit_stream_for_review(&author, stream.id).await.unwrap_err();
    assert!(matches!(err, DomainError::Conflict(_)));
    let err = bed.coordinator.commit(&author, bed.repo.id, "more").await.unwrap_err();
    assert!(matches!(err, DomainError::Conflict(_)));
}

#[tokio::test]
async fn test_swarm_mode_commits_flow_straight_to_buffer() {
    let bed = testbed_with(RepoSettingsPatch {
        merge_mode: Some(MergeMode::Swarm),
        ..Default::default()
    })
    .await;
    let _owner = bed.register("owner").await;
    let agent = bed.register("drone").await;

    let (stream, _) = bed
        .coordinator
        .create_workspace(&agent, bed.repo.id, StreamOptions::default())
        .await
        .unwrap();
    bed.git.stage_file(&stream.branch_ref, "swarm.txt");
    bed.coordinator.commit(&agent, bed.repo.id, "swarm work").await.unwrap();

    // No review round: the commit queued and merged inline.
    assert!(bed.git.branch_files("swarm/buffer").contains(&"swarm.txt".to_string()));
    let stream = bed.coordinator.stream(stream.id).await.unwrap();
    assert_eq!(stream.status, StreamStatus::Merged);
}

#[tokio::test]
async fn test_background_worker_drains_the_queue() {
    let bed = testbed_with(guild(0.5, 1)).await;
    let owner = bed.register("owner").await;
    let author = bed.register("author").await;

    let (stream, _) = bed
        .coordinator
        .create_workspace(&author, bed.repo.id, StreamOptions::default())
        .await
        .unwrap();
    bed.git.stage_file(&stream.branch_ref, "bg.txt");
    bed.coordinator.commit(&author, bed.repo.id, "background work").await.unwrap();
    bed.coordinator.submit_stream_for_review(&author, stream.id).await.unwrap();
    bed.coordinator
        .submit_review(&owner, stream.id, ReviewVerdict::Approve, None, false, false)
        .await
        .unwrap();

    // Enqueue below the coordinator so nothing drains inline, then let
    // the per-repository worker pick it up.
    let merge = bed.coordinator.merge_service();
    merge
        .request_merge(author.agent.id, stream.id, gitswarm::services::MergeRequestOptions::default())
        .await
        .unwrap();
    let cancel = merge.clone().spawn_worker(bed.repo.id).await;

    let mut merged = false;
    for _ in 0..50 {
        let current = bed.coordinator.stream(stream.id).await.unwrap();
        if current.status == StreamStatus::Merged {
            merged = true;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }
    cancel.cancel();
    merge.stop_worker(bed.repo.id).await;

    assert!(merged, "worker should have merged the stream");
    assert!(bed.git.branch_files("swarm/buffer").contains(&"bg.txt".to_string()));
}

#[tokio::test]
async fn test_merge_conflict_leaves_stream_in_review() {
    let bed = testbed_with(guild(0.5, 1)).await;
    let owner = bed.register("owner").await;
    let author = bed.register("author").await;

    let (stream, _) = bed
        .coordinator
        .create_workspace(&author, bed.repo.id, StreamOptions::default())
        .await
        .unwrap();
    bed.git.stage_file(&stream.branch_ref, "clash.txt");
    bed.coordinator.commit(&author, bed.repo.id, "clash").await.unwrap();
    bed.coordinator.submit_stream_for_review(&author, stream.id).await.unwrap();
    bed.coordinator
        .submit_review(&owner, stream.id, ReviewVerdict::Approve, None, false, false)
        .await
        .unwrap();

    bed.git.inject_conflict(&stream.branch_ref, "swarm/buffer");
    let entry = bed.coordinator.request_merge(&author, stream.id).await.unwrap();
    assert_eq!(entry.status.as_str(), "failed");
    assert!(entry.last_error.unwrap().contains("conflict"));

    // Intervention point: the stream stays in review, not failed.
    let stream = bed.coordinator.stream(stream.id).await.unwrap();
    assert_eq!(stream.status, StreamStatus::InReview);
}

#[tokio::test]
async fn test_red_stabilization_reverts_latest_merge() {
    let bed = testbed_with(RepoSettingsPatch {
        ownership_model: Some(gitswarm::domain::models::OwnershipModel::Guild),
        consensus_threshold: Some(0.5),
        stabilize_command: Some("./run-tests.sh".to_string()),
        auto_revert_on_red: Some(true),
        ..Default::default()
    })
    .await;
    let owner = bed.register("owner").await;
    let author = bed.register("author").await;

    let (stream, _) = bed
        .coordinator
        .create_workspace(&author, bed.repo.id, StreamOptions::default())
        .await
        .unwrap();
    bed.git.stage_file(&stream.branch_ref, "broken.txt");
    bed.coordinator.commit(&author, bed.repo.id, "break things").await.unwrap();
    bed.coordinator.submit_stream_for_review(&author, stream.id).await.unwrap();
    bed.coordinator
        .submit_review(&owner, stream.id, ReviewVerdict::Approve, None, false, false)
        .await
        .unwrap();
    bed.coordinator.request_merge(&author, stream.id).await.unwrap();
    assert!(bed.git.branch_files("swarm/buffer").contains(&"broken.txt".to_string()));

    // Red run: a revert commit lands on the buffer, the stream is
    // reverted, and main is untouched.
    bed.git.script_command(1, "tests failed");
    let outcome = bed.coordinator.stabilize(&owner, bed.repo.id).await.unwrap();
    assert!(!outcome.success);
    assert_eq!(outcome.reverted_stream, Some(stream.id));

    let stream = bed.coordinator.stream(stream.id).await.unwrap();
    assert_eq!(stream.status, StreamStatus::Reverted);
    assert!(!bed.git.branch_files("swarm/buffer").contains(&"broken.txt".to_string()));
    assert!(!bed.git.branch_files("main").contains(&"broken.txt".to_string()));
}

#[tokio::test]
async fn test_green_stabilization_tags_and_promotion_requires_fast_forward() {
    let bed = testbed_with(RepoSettingsPatch {
        ownership_model: Some(gitswarm::domain::models::OwnershipModel::Guild),
        consensus_threshold: Some(0.5),
        stabilize_command: Some("./run-tests.sh".to_string()),
        ..Default::default()
    })
    .await;
    let owner = bed.register("owner").await;
    let author = bed.register("author").await;

    let (stream, _) = bed
        .coordinator
        .create_workspace(&author, bed.repo.id, StreamOptions::default())
        .await
        .unwrap();
    bed.git.stage_file(&stream.branch_ref, "good.txt");
    bed.coordinator.commit(&author, bed.repo.id, "good").await.unwrap();
    bed.coordinator.submit_stream_for_review(&author, stream.id).await.unwrap();
    bed.coordinator
        .submit_review(&owner, stream.id, ReviewVerdict::Approve, None, false, false)
        .await
        .unwrap();
    bed.coordinator.request_merge(&author, stream.id).await.unwrap();

    bed.git.script_command(0, "all green");
    let outcome = bed.coordinator.stabilize(&owner, bed.repo.id).await.unwrap();
    assert!(outcome.success);
    assert!(bed.git.tags().iter().any(|(name, _)| name.starts_with("gitswarm-green-")));

    // Diverge main behind the buffer's back; promotion must refuse.
    bed.git.create_worktree(std::path::Path::new("/wt/rogue"), "main").await.unwrap();
    bed.git.stage_file("main", "rogue.txt");
    bed.git
        .commit(
            &gitswarm::domain::ports::WorktreeHandle {
                path: std::path::PathBuf::from("/wt/rogue"),
                branch: "main".to_string(),
            },
            "external interference",
        )
        .await
        .unwrap();

    let err = bed.coordinator.promote(&owner, bed.repo.id).await.unwrap_err();
    assert!(matches!(err, DomainError::Conflict(_)));
}
