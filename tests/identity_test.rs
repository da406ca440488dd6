//! Identity round trips: registration, token auth, account status.

mod common;

use common::testbed;
use gitswarm::domain::errors::DomainError;
use gitswarm::domain::models::{AccessLevel, AgentStatus};

#[tokio::test]
async fn test_register_then_authenticate_round_trip() {
    let bed = testbed().await;
    let registration =
        bed.coordinator.register_agent("keyholder", Some("just testing".to_string())).await.unwrap();
    assert!(registration.api_key.starts_with("gsw_"));

    // The returned token resolves to the same identity.
    let ctx = bed.coordinator.authenticate(&registration.api_key).await.unwrap();
    assert_eq!(ctx.agent.id, registration.agent.id);
    assert_eq!(ctx.agent.name, "keyholder");

    // A wrong token does not.
    let err = bed.coordinator.authenticate("gsw_00000000000000000000000000000000").await.unwrap_err();
    assert!(matches!(err, DomainError::Auth(_)));
    let err = bed.coordinator.authenticate("not-a-key").await.unwrap_err();
    assert!(matches!(err, DomainError::Auth(_)));
}

#[tokio::test]
async fn test_duplicate_names_rejected() {
    let bed = testbed().await;
    bed.coordinator.register_agent("taken", None).await.unwrap();
    let err = bed.coordinator.register_agent("taken", None).await.unwrap_err();
    assert!(matches!(err, DomainError::Conflict(_)));
}

#[tokio::test]
async fn test_suspended_agents_cannot_authenticate_and_resolve_none() {
    let bed = testbed().await;
    let owner = bed.register("admin").await; // first agent becomes owner
    let registration = bed.coordinator.register_agent("misbehaving", None).await.unwrap();

    bed.coordinator
        .set_agent_status(&owner, bed.repo.id, "misbehaving", AgentStatus::Suspended)
        .await
        .unwrap();

    let err = bed.coordinator.authenticate(&registration.api_key).await.unwrap_err();
    assert!(matches!(err, DomainError::Auth(_)));

    // Even on a public repository, a suspended account resolves to none.
    let resolved =
        bed.coordinator.resolve_permissions("misbehaving", bed.repo.id).await.unwrap();
    assert_eq!(resolved.level, AccessLevel::None);
}

#[tokio::test]
async fn test_first_agent_adopts_ownership() {
    let bed = testbed().await;
    let first = bed.register("founder").await;
    let second = bed.register("later").await;

    let resolved = bed.coordinator.resolve_permissions("founder", bed.repo.id).await.unwrap();
    assert_eq!(resolved.level, AccessLevel::Admin);
    let resolved = bed.coordinator.resolve_permissions("later", bed.repo.id).await.unwrap();
    assert_eq!(resolved.level, AccessLevel::Write);
    let _ = (first, second);
}
