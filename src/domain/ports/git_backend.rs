//! Abstract git backend.
//!
//! The core never touches git state directly; everything goes through
//! this trait. One implementation shells out to the host git CLI, one
//! is an in-memory double for tests. Every operation is atomic: in
//! particular a failed merge leaves the destination unchanged.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::domain::errors::DomainResult;

/// Result of a commit: the new hash and the deterministic Change-Id
/// the backend appended as a trailer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitOutcome {
    pub commit_hash: String,
    pub change_id: String,
}

/// Result of a three-way merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    Merged { commit: String },
    Conflict { files: Vec<String> },
}

/// Result of a fast-forward attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FastForwardOutcome {
    FastForwarded { commit: String },
    NotFastForward,
}

/// Result of running an external command in a worktree.
#[derive(Debug, Clone)]
pub struct CommandOutcome {
    pub exit_code: i32,
    pub output: String,
    pub timed_out: bool,
}

impl CommandOutcome {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }
}

/// Handle to a materialised worktree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorktreeHandle {
    pub path: PathBuf,
    pub branch: String,
}

/// The operations the coordination core needs from git.
#[async_trait]
pub trait GitBackend: Send + Sync {
    /// Initialise the underlying repository with the given default
    /// branch (idempotent).
    async fn init_repo(&self, default_branch: &str) -> DomainResult<()>;

    /// Create `name` pointing at `base`'s tip; returns the new ref.
    async fn create_branch(&self, name: &str, base: &str) -> DomainResult<String>;

    async fn delete_branch(&self, name: &str) -> DomainResult<()>;

    async fn branch_exists(&self, name: &str) -> DomainResult<bool>;

    /// Materialise a worktree for `branch` at `path`.
    async fn create_worktree(&self, path: &Path, branch: &str) -> DomainResult<WorktreeHandle>;

    async fn remove_worktree(&self, handle: &WorktreeHandle) -> DomainResult<()>;

    /// Stage everything in the worktree and commit with a generated
    /// Change-Id trailer.
    async fn commit(&self, worktree: &WorktreeHandle, message: &str) -> DomainResult<CommitOutcome>;

    /// Three-way merge `src` into `dst`. On conflict the destination
    /// is left unchanged.
    async fn merge(&self, dst: &str, src: &str) -> DomainResult<MergeOutcome>;

    /// Fast-forward `dst` to `src`'s tip, refusing if histories
    /// diverged.
    async fn fast_forward(&self, dst: &str, src: &str) -> DomainResult<FastForwardOutcome>;

    /// Append a revert of `commit` on `branch`; returns the revert
    /// commit hash.
    async fn revert(&self, branch: &str, commit: &str) -> DomainResult<String>;

    /// Diff of `branch` against `base`.
    async fn diff(&self, branch: &str, base: &str) -> DomainResult<String>;

    async fn tag(&self, name: &str, reference: &str) -> DomainResult<()>;

    /// Resolve a ref to a commit hash.
    async fn rev_parse(&self, reference: &str) -> DomainResult<String>;

    /// Run an external command inside a worktree under a timeout,
    /// capturing combined output. Honours the cancellation token;
    /// on cancel or timeout the process (group) is killed.
    async fn run_command(
        &self,
        worktree: &WorktreeHandle,
        command: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> DomainResult<CommandOutcome>;

    /// Discard uncommitted state in a worktree (cancellation rollback).
    async fn reset_hard(&self, worktree: &WorktreeHandle) -> DomainResult<()>;
}
