//! Task market: claim rules, submission review, karma payouts.

mod common;

use common::{guild, testbed, testbed_with};
use gitswarm::domain::errors::DomainError;
use gitswarm::domain::models::{ClaimStatus, TaskPriority, TaskStatus};
use gitswarm::services::ClaimDecision;

#[tokio::test]
async fn test_claim_rules() {
    let bed = testbed().await;
    let creator = bed.register("creator").await;
    let worker = bed.register("worker").await;

    let task = bed
        .coordinator
        .create_task(&creator, bed.repo.id, "fix the parser", None, TaskPriority::High, 100)
        .await
        .unwrap();

    // Creators cannot claim their own tasks.
    let err = bed.coordinator.claim_task(&creator, task.id, None, None).await.unwrap_err();
    assert!(matches!(err, DomainError::Validation(_)));

    let claim = bed.coordinator.claim_task(&worker, task.id, None, None).await.unwrap();
    assert_eq!(claim.status, ClaimStatus::Active);
    let task = bed.coordinator.task(task.id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Claimed);

    // The task is no longer open, so another claim is rejected.
    let other = bed.register("other").await;
    let err = bed.coordinator.claim_task(&other, task.id, None, None).await.unwrap_err();
    assert!(matches!(err, DomainError::Conflict(_)));
}

#[tokio::test]
async fn test_approve_completes_and_pays_karma() {
    let bed = testbed().await;
    let creator = bed.register("creator").await;
    let worker = bed.register("worker").await;

    let task = bed
        .coordinator
        .create_task(&creator, bed.repo.id, "write docs", None, TaskPriority::Medium, 250)
        .await
        .unwrap();
    let claim = bed.coordinator.claim_task(&worker, task.id, None, None).await.unwrap();
    bed.coordinator
        .submit_claim(&worker, claim.id, Some("done, see stream".to_string()))
        .await
        .unwrap();

    // The creator may review without maintain access.
    let claim = bed
        .coordinator
        .review_claim(&creator, claim.id, ClaimDecision::Approve)
        .await
        .unwrap();
    assert_eq!(claim.status, ClaimStatus::Approved);

    let task = bed.coordinator.task(task.id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Completed);

    // Karma award is max(1, amount/10) = 25.
    let worker = bed.reload(&worker).await;
    assert_eq!(worker.agent.karma, 25);
}

#[tokio::test]
async fn test_reject_reopens_the_task() {
    let bed = testbed().await;
    let creator = bed.register("creator").await;
    let worker = bed.register("worker").await;
    let second = bed.register("second").await;

    let task = bed
        .coordinator
        .create_task(&creator, bed.repo.id, "flaky test hunt", None, TaskPriority::Low, 0)
        .await
        .unwrap();
    let claim = bed.coordinator.claim_task(&worker, task.id, None, None).await.unwrap();
    bed.coordinator.submit_claim(&worker, claim.id, None).await.unwrap();

    let claim = bed
        .coordinator
        .review_claim(&creator, claim.id, ClaimDecision::Reject)
        .await
        .unwrap();
    assert_eq!(claim.status, ClaimStatus::Rejected);

    // Rejected work reopens the task for another agent.
    let task = bed.coordinator.task(task.id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Open);
    bed.coordinator.claim_task(&second, task.id, None, None).await.unwrap();

    // The worker earned nothing.
    let worker = bed.reload(&worker).await;
    assert_eq!(worker.agent.karma, 0);
}

#[tokio::test]
async fn test_zero_amount_tasks_award_no_karma() {
    let bed = testbed().await;
    let creator = bed.register("creator").await;
    let worker = bed.register("worker").await;

    let task = bed
        .coordinator
        .create_task(&creator, bed.repo.id, "free labour", None, TaskPriority::Low, 0)
        .await
        .unwrap();
    let claim = bed.coordinator.claim_task(&worker, task.id, None, None).await.unwrap();
    bed.coordinator.submit_claim(&worker, claim.id, None).await.unwrap();
    bed.coordinator.review_claim(&creator, claim.id, ClaimDecision::Approve).await.unwrap();

    let worker = bed.reload(&worker).await;
    assert_eq!(worker.agent.karma, 0);
}

#[tokio::test]
async fn test_maintainer_may_review_others_claims() {
    let bed = testbed_with(guild(0.5, 1)).await;
    let owner = bed.register("owner").await;
    let creator = bed.register("creator").await;
    let worker = bed.register("worker").await;

    let task = bed
        .coordinator
        .create_task(&creator, bed.repo.id, "tune the cache", None, TaskPriority::Medium, 40)
        .await
        .unwrap();
    let claim = bed.coordinator.claim_task(&worker, task.id, None, None).await.unwrap();
    bed.coordinator.submit_claim(&worker, claim.id, None).await.unwrap();

    // A third agent with only write access cannot review.
    let bystander = bed.register("bystander").await;
    let err = bed
        .coordinator
        .review_claim(&bystander, claim.id, ClaimDecision::Approve)
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Permission(_)));

    // The owner can.
    let claim =
        bed.coordinator.review_claim(&owner, claim.id, ClaimDecision::Approve).await.unwrap();
    assert_eq!(claim.status, ClaimStatus::Approved);

    let worker = bed.reload(&worker).await;
    assert_eq!(worker.agent.karma, 4);
}

#[tokio::test]
async fn test_abandon_claim_reopens_task() {
    let bed = testbed().await;
    let creator = bed.register("creator").await;
    let worker = bed.register("worker").await;

    let task = bed
        .coordinator
        .create_task(&creator, bed.repo.id, "chores", None, TaskPriority::Low, 0)
        .await
        .unwrap();
    let claim = bed.coordinator.claim_task(&worker, task.id, None, None).await.unwrap();

    bed.coordinator.abandon_claim(&worker, claim.id).await.unwrap();
    let task = bed.coordinator.task(task.id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Open);

    // Abandoning frees the worker to claim again.
    bed.coordinator.claim_task(&worker, task.id, None, None).await.unwrap();
}
