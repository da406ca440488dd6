//! Repository (coordination unit) port.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{RepoStage, Repository};

/// One stage transition, as recorded in `stage_history`.
#[derive(Debug, Clone)]
pub struct StageChange {
    pub repo_id: Uuid,
    pub from_stage: RepoStage,
    pub to_stage: RepoStage,
    pub forced: bool,
    pub changed_at: DateTime<Utc>,
}

impl StageChange {
    pub fn now(repo_id: Uuid, from_stage: RepoStage, to_stage: RepoStage, forced: bool) -> Self {
        Self { repo_id, from_stage, to_stage, forced, changed_at: Utc::now() }
    }
}

#[async_trait]
pub trait RepoRepository: Send + Sync {
    async fn create(&self, repo: &Repository) -> DomainResult<()>;

    async fn get(&self, id: Uuid) -> DomainResult<Option<Repository>>;

    async fn get_by_name(&self, name: &str) -> DomainResult<Option<Repository>>;

    async fn list(&self) -> DomainResult<Vec<Repository>>;

    /// Persist all mutable policy fields of the repository row.
    async fn update(&self, repo: &Repository) -> DomainResult<()>;

    async fn set_stage(&self, id: Uuid, stage: RepoStage) -> DomainResult<()>;

    async fn set_last_green_commit(&self, id: Uuid, commit: Option<&str>) -> DomainResult<()>;

    /// Refresh the denormalised contributor/patch counters.
    async fn update_counters(&self, id: Uuid, contributors: u32, patches: u32) -> DomainResult<()>;

    async fn record_stage_change(&self, change: &StageChange) -> DomainResult<()>;

    async fn stage_history(&self, repo_id: Uuid) -> DomainResult<Vec<StageChange>>;
}
