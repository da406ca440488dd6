//! Shared fixtures for integration tests.
//!
//! Tests run against a fresh in-memory SQLite pool and the in-memory
//! git backend, wired through the same coordinator the CLI uses.
#![allow(dead_code)]

use std::sync::Arc;

use gitswarm::adapters::git::MemoryGitBackend;
use gitswarm::adapters::sqlite::{
    all_migrations, create_test_pool, Migrator, SqliteAgentRepository,
};
use gitswarm::domain::models::{OwnershipModel, RepoSettingsPatch, Repository};
use gitswarm::domain::ports::{AgentRepository, GitBackend};
use gitswarm::services::{AgentContext, Config, Coordinator};
use sqlx::SqlitePool;
use uuid::Uuid;

pub const REPO_NAME: &str = "testrepo";

pub struct TestBed {
    pub coordinator: Coordinator,
    pub git: Arc<MemoryGitBackend>,
    pub pool: SqlitePool,
    pub repo: Repository,
}

/// Build a coordinator over a fresh store and git double, with the
/// default repository bootstrapped and its branches cut.
pub async fn testbed() -> TestBed {
    testbed_with(RepoSettingsPatch::default()).await
}

pub async fn testbed_with(patch: RepoSettingsPatch) -> TestBed {
    let pool = create_test_pool().await.expect("test pool");
    Migrator::new(pool.clone()).run(all_migrations()).await.expect("migrations");

    let git = Arc::new(MemoryGitBackend::new());
    let defaults = Repository::new(REPO_NAME);
    git.init_repo(&defaults.promote_target).await.expect("init repo");
    git.create_branch(&defaults.buffer_branch, &defaults.promote_target)
        .await
        .expect("buffer branch");

    let mut config = Config::default();
    config.repository.name = REPO_NAME.to_string();

    let root = std::env::temp_dir().join(format!("gitswarm-test-{}", Uuid::new_v4()));
    let coordinator = Coordinator::wire(root, config, pool.clone(), git.clone())
        .expect("coordinator");

    let repo = coordinator.bootstrap_repository(REPO_NAME).await.expect("bootstrap repo");
    let repo = if is_noop(&patch) {
        repo
    } else {
        // Apply test policy directly; there is no owner yet to act.
        apply_patch(&pool, &repo, &patch).await
    };

    TestBed { coordinator, git, pool, repo }
}

fn is_noop(patch: &RepoSettingsPatch) -> bool {
    serde_json::to_value(patch)
        .map(|v| v.as_object().is_some_and(|o| o.values().all(serde_json::Value::is_null)))
        .unwrap_or(false)
}

async fn apply_patch(
    pool: &SqlitePool,
    repo: &Repository,
    patch: &RepoSettingsPatch,
) -> Repository {
    use gitswarm::adapters::sqlite::SqliteRepoRepository;
    use gitswarm::domain::ports::RepoRepository;

    let repos = SqliteRepoRepository::new(pool.clone());
    let mut updated = repo.clone();
    patch.apply(&mut updated);
    repos.update(&updated).await.expect("apply repo patch");
    repos.get(repo.id).await.expect("reload repo").expect("repo exists")
}

/// Convenience patch for a guild repository.
pub fn guild(threshold: f64, min_reviews: u32) -> RepoSettingsPatch {
    RepoSettingsPatch {
        ownership_model: Some(OwnershipModel::Guild),
        consensus_threshold: Some(threshold),
        min_reviews: Some(min_reviews),
        ..Default::default()
    }
}

impl TestBed {
    /// Register an agent and return its context. The first registered
    /// agent becomes the repository owner.
    pub async fn register(&self, name: &str) -> AgentContext {
        self.coordinator.register_agent(name, None).await.expect("register agent");
        self.coordinator.context_by_name(name).await.expect("agent context")
    }

    /// Set an agent's karma directly (the store clamps at zero).
    pub async fn set_karma(&self, ctx: &AgentContext, karma: i64) -> AgentContext {
        let agents = SqliteAgentRepository::new(self.pool.clone());
        agents.adjust_karma(ctx.agent.id, karma - ctx.agent.karma).await.expect("set karma");
        self.coordinator.context_by_name(&ctx.agent.name).await.expect("reload context")
    }

    /// Refresh an agent context after karma or status changes.
    pub async fn reload(&self, ctx: &AgentContext) -> AgentContext {
        self.coordinator.context_by_name(&ctx.agent.name).await.expect("reload context")
    }
}
