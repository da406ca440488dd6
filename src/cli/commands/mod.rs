//! Command handlers. Each handler resolves identity, calls the
//! coordinator, and renders a `CommandOutput`.

pub mod agent;
pub mod config;
pub mod council;
pub mod init;
pub mod merge;
pub mod review;
pub mod status;
pub mod stream;
pub mod task;
pub mod workspace;

use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::{StreamFilter, TaskFilter};
use crate::services::Coordinator;

/// Resolve a stream from a full UUID or a unique id/name prefix within
/// the configured repository.
pub async fn resolve_stream(coordinator: &Coordinator, input: &str) -> DomainResult<Uuid> {
    if let Ok(id) = Uuid::parse_str(input) {
        return Ok(id);
    }

    let repo = coordinator.default_repository().await?;
    let streams = coordinator
        .list_streams(StreamFilter { repo_id: Some(repo.id), ..Default::default() })
        .await?;
    let matches: Vec<Uuid> = streams
        .iter()
        .filter(|s| s.id.to_string().starts_with(input) || s.name == input)
        .map(|s| s.id)
        .collect();

    match matches.as_slice() {
        [id] => Ok(*id),
        [] => Err(DomainError::not_found("stream", input)),
        _ => Err(DomainError::Validation(format!("stream id '{input}' is ambiguous"))),
    }
}

/// Resolve a task from a full UUID or a unique id prefix.
pub async fn resolve_task(coordinator: &Coordinator, input: &str) -> DomainResult<Uuid> {
    if let Ok(id) = Uuid::parse_str(input) {
        return Ok(id);
    }

    let repo = coordinator.default_repository().await?;
    let tasks = coordinator
        .list_tasks(TaskFilter { repo_id: Some(repo.id), ..Default::default() })
        .await?;
    let matches: Vec<Uuid> =
        tasks.iter().filter(|t| t.id.to_string().starts_with(input)).map(|t| t.id).collect();

    match matches.as_slice() {
        [id] => Ok(*id),
        [] => Err(DomainError::not_found("task", input)),
        _ => Err(DomainError::Validation(format!("task id '{input}' is ambiguous"))),
    }
}

/// Resolve a claim by UUID or prefix, scanning the repository's tasks.
pub async fn resolve_claim(coordinator: &Coordinator, input: &str) -> DomainResult<Uuid> {
    if let Ok(id) = Uuid::parse_str(input) {
        return Ok(id);
    }

    let repo = coordinator.default_repository().await?;
    let tasks = coordinator
        .list_tasks(TaskFilter { repo_id: Some(repo.id), ..Default::default() })
        .await?;
    let mut matches = Vec::new();
    for task in &tasks {
        for claim in coordinator.claims_for_task(task.id).await? {
            if claim.id.to_string().starts_with(input) {
                matches.push(claim.id);
            }
        }
    }

    match matches.as_slice() {
        [id] => Ok(*id),
        [] => Err(DomainError::not_found("claim", input)),
        _ => Err(DomainError::Validation(format!("claim id '{input}' is ambiguous"))),
    }
}

/// Resolve a proposal by UUID or prefix within the repo's council.
pub async fn resolve_proposal(coordinator: &Coordinator, input: &str) -> DomainResult<Uuid> {
    if let Ok(id) = Uuid::parse_str(input) {
        return Ok(id);
    }

    let repo = coordinator.default_repository().await?;
    let council = coordinator
        .council_for_repo(repo.id)
        .await?
        .ok_or_else(|| DomainError::not_found("council", repo.name.clone()))?;
    let proposals = coordinator.proposals(council.id, None).await?;
    let matches: Vec<Uuid> = proposals
        .iter()
        .filter(|p| p.id.to_string().starts_with(input))
        .map(|p| p.id)
        .collect();

    match matches.as_slice() {
        [id] => Ok(*id),
        [] => Err(DomainError::not_found("proposal", input)),
        _ => Err(DomainError::Validation(format!("proposal id '{input}' is ambiguous"))),
    }
}
