//! `init`: set up the state directory, database, git branches, and
//! the repository record.

use std::path::Path;
use std::sync::Arc;

use crate::adapters::git::GitCliBackend;
use crate::adapters::sqlite::{all_migrations, create_pool, Migrator};
use crate::cli::output::{print, Message};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::GitBackend;
use crate::services::config::{Config, STATE_DIR};
use crate::services::Coordinator;

pub async fn handle_init(root: &Path, name: Option<String>, force: bool, json: bool) -> DomainResult<()> {
    let state_dir = root.join(STATE_DIR);
    if state_dir.exists() && !force {
        return Err(DomainError::Conflict(
            "already initialized; use --force to reinitialize".to_string(),
        ));
    }

    let repo_name = name.unwrap_or_else(|| {
        root.file_name().map_or_else(|| "gitswarm".to_string(), |n| n.to_string_lossy().to_string())
    });

    let mut config = Config::default();
    config.repository.name.clone_from(&repo_name);
    config.save(root).map_err(|e| DomainError::Validation(format!("configuration: {e}")))?;

    let pool = create_pool(&config.database_url(root), None)
        .await
        .map_err(|e| DomainError::Unavailable(format!("store: {e}")))?;
    Migrator::new(pool.clone()).run(all_migrations()).await?;

    // Seed main and the buffer branch; both are idempotent on re-init.
    let git = GitCliBackend::new(root.join(&config.repository.path));
    let defaults = crate::domain::models::Repository::new(&repo_name);
    git.init_repo(&defaults.promote_target).await?;
    if !git.branch_exists(&defaults.buffer_branch).await? {
        git.create_branch(&defaults.buffer_branch, &defaults.promote_target).await?;
    }

    let coordinator =
        Coordinator::wire(root.to_path_buf(), config, pool, Arc::new(git))?;
    if coordinator.repository_by_name(&repo_name).await.is_err() {
        coordinator.bootstrap_repository(&repo_name).await?;
    }

    print(
        &Message::new(format!(
            "initialized gitswarm repository '{repo_name}' (state in {STATE_DIR}/)"
        )),
        json,
    );
    Ok(())
}
