//! Git backend shelling out to the host git CLI.
//!
//! All operations on a repository are serialised through one mutex on
//! top of whatever locking git performs itself. Branch names are
//! validated against injection before reaching the command line.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::{
    CommandOutcome, CommitOutcome, FastForwardOutcome, GitBackend, MergeOutcome, WorktreeHandle,
};

pub struct GitCliBackend {
    repo_path: PathBuf,
    lock: Mutex<()>,
}

impl GitCliBackend {
    pub fn new(repo_path: impl Into<PathBuf>) -> Self {
        Self { repo_path: repo_path.into(), lock: Mutex::new(()) }
    }

    async fn git(&self, dir: &Path, args: &[&str]) -> DomainResult<String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(dir)
            .output()
            .await
            .map_err(|e| DomainError::GitBackend(format!("failed to run git: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DomainError::GitBackend(format!(
                "git {} failed: {}",
                args.first().unwrap_or(&""),
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn git_in_repo(&self, args: &[&str]) -> DomainResult<String> {
        self.git(&self.repo_path.clone(), args).await
    }

    async fn checkout(&self, branch: &str) -> DomainResult<()> {
        self.git_in_repo(&["checkout", "-q", branch]).await?;
        Ok(())
    }
}

#[async_trait]
impl GitBackend for GitCliBackend {
    async fn init_repo(&self, default_branch: &str) -> DomainResult<()> {
        validate_branch_name(default_branch)?;
        let _guard = self.lock.lock().await;

        tokio::fs::create_dir_all(&self.repo_path)
            .await
            .map_err(|e| DomainError::GitBackend(format!("create repo dir: {e}")))?;
        self.git_in_repo(&["init", "-q", "-b", default_branch]).await?;

        // An empty repository has no commits to branch from; seed one.
        if self.git_in_repo(&["rev-parse", "--verify", "HEAD"]).await.is_err() {
            self.git_in_repo(&["commit", "-q", "--allow-empty", "-m", "initial commit"]).await?;
        }
        Ok(())
    }

    async fn create_branch(&self, name: &str, base: &str) -> DomainResult<String> {
        validate_branch_name(name)?;
        validate_branch_name(base)?;
        let _guard = self.lock.lock().await;
        self.git_in_repo(&["branch", name, base]).await?;
        Ok(name.to_string())
    }

    async fn delete_branch(&self, name: &str) -> DomainResult<()> {
        validate_branch_name(name)?;
        let _guard = self.lock.lock().await;
        self.git_in_repo(&["branch", "-D", name]).await?;
        Ok(())
    }

    async fn branch_exists(&self, name: &str) -> DomainResult<bool> {
        validate_branch_name(name)?;
        let output = Command::new("git")
            .args(["show-ref", "--verify", "--quiet", &format!("refs/heads/{name}")])
            .current_dir(&self.repo_path)
            .status()
            .await
            .map_err(|e| DomainError::GitBackend(format!("failed to run git: {e}")))?;
        Ok(output.success())
    }

    async fn create_worktree(&self, path: &Path, branch: &str) -> DomainResult<WorktreeHandle> {
        validate_branch_name(branch)?;
        let _guard = self.lock.lock().await;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DomainError::GitBackend(format!("create worktree parent: {e}")))?;
        }

        let path_str = path.to_string_lossy().to_string();
        self.git_in_repo(&["worktree", "add", "-q", &path_str, branch]).await?;
        Ok(WorktreeHandle { path: path.to_path_buf(), branch: branch.to_string() })
    }

    async fn remove_worktree(&self, handle: &WorktreeHandle) -> DomainResult<()> {
        let _guard = self.lock.lock().await;
        let path_str = handle.path.to_string_lossy().to_string();
        self.git_in_repo(&["worktree", "remove", "--force", &path_str]).await?;
        Ok(())
    }

    async fn commit(&self, worktree: &WorktreeHandle, message: &str) -> DomainResult<CommitOutcome> {
        let _guard = self.lock.lock().await;

        self.git(&worktree.path, &["add", "-A"]).await?;

        // Change-Id derives from branch, parent, and message, so
        // re-driving the same change produces the same trailer.
        let parent = self.git(&worktree.path, &["rev-parse", "HEAD"]).await.unwrap_or_default();
        let change_id = generate_change_id(&worktree.branch, &parent, message);
        let full_message = format!("{message}\n\nChange-Id: {change_id}");

        self.git(&worktree.path, &["commit", "-q", "-m", &full_message]).await?;
        let commit_hash = self.git(&worktree.path, &["rev-parse", "HEAD"]).await?;

        debug!(branch = %worktree.branch, commit = %commit_hash, "committed");
        Ok(CommitOutcome { commit_hash, change_id })
    }

    async fn merge(&self, dst: &str, src: &str) -> DomainResult<MergeOutcome> {
        validate_branch_name(dst)?;
        validate_branch_name(src)?;
        let _guard = self.lock.lock().await;

        self.checkout(dst).await?;

        let message = format!("Merge {src} into {dst}");
        let merge = Command::new("git")
            .args(["merge", "--no-ff", "-m", &message, "--", src])
            .current_dir(&self.repo_path)
            .output()
            .await
            .map_err(|e| DomainError::GitBackend(format!("failed to run git: {e}")))?;

        if !merge.status.success() {
            // Collect conflicting paths, then restore the destination.
            let conflicts = self
                .git_in_repo(&["diff", "--name-only", "--diff-filter=U"])
                .await
                .unwrap_or_default();
            let files: Vec<String> =
                conflicts.lines().map(str::trim).filter(|l| !l.is_empty()).map(String::from).collect();

            if let Err(e) = self.git_in_repo(&["merge", "--abort"]).await {
                warn!(error = %e, "merge --abort failed after conflict");
            }

            if files.is_empty() {
                let stderr = String::from_utf8_lossy(&merge.stderr);
                return Err(DomainError::GitBackend(format!("merge failed: {}", stderr.trim())));
            }
            return Ok(MergeOutcome::Conflict { files });
        }

        let commit = self.git_in_repo(&["rev-parse", "HEAD"]).await?;
        Ok(MergeOutcome::Merged { commit })
    }

    async fn fast_forward(&self, dst: &str, src: &str) -> DomainResult<FastForwardOutcome> {
        validate_branch_name(dst)?;
        validate_branch_name(src)?;
        let _guard = self.lock.lock().await;

        // Refuse before touching anything if histories diverged.
        let is_ancestor = Command::new("git")
            .args(["merge-base", "--is-ancestor", dst, src])
            .current_dir(&self.repo_path)
            .status()
            .await
            .map_err(|e| DomainError::GitBackend(format!("failed to run git: {e}")))?;
        if !is_ancestor.success() {
            return Ok(FastForwardOutcome::NotFastForward);
        }

        self.checkout(dst).await?;
        self.git_in_repo(&["merge", "--ff-only", "-q", "--", src]).await?;
        let commit = self.git_in_repo(&["rev-parse", "HEAD"]).await?;
        Ok(FastForwardOutcome::FastForwarded { commit })
    }

    async fn revert(&self, branch: &str, commit: &str) -> DomainResult<String> {
        validate_branch_name(branch)?;
        let _guard = self.lock.lock().await;

        self.checkout(branch).await?;
        let result = self.git_in_repo(&["revert", "--no-edit", "-m", "1", commit]).await;
        if let Err(e) = result {
            let _ = self.git_in_repo(&["revert", "--abort"]).await;
            return Err(e);
        }
        self.git_in_repo(&["rev-parse", "HEAD"]).await
    }

    async fn diff(&self, branch: &str, base: &str) -> DomainResult<String> {
        validate_branch_name(branch)?;
        validate_branch_name(base)?;
        self.git_in_repo(&["diff", &format!("{base}...{branch}")]).await
    }

    async fn tag(&self, name: &str, reference: &str) -> DomainResult<()> {
        let _guard = self.lock.lock().await;
        self.git_in_repo(&["tag", "-f", name, reference]).await?;
        Ok(())
    }

    async fn rev_parse(&self, reference: &str) -> DomainResult<String> {
        self.git_in_repo(&["rev-parse", reference]).await
    }

    async fn run_command(
        &self,
        worktree: &WorktreeHandle,
        command: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> DomainResult<CommandOutcome> {
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .current_dir(&worktree.path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child =
            cmd.spawn().map_err(|e| DomainError::GitBackend(format!("spawn command: {e}")))?;
        let pid = child.id();

        let mut stdout = child.stdout.take();
        let mut stderr = child.stderr.take();
        let reader = tokio::spawn(async move {
            let mut out = String::new();
            if let Some(ref mut s) = stdout {
                let _ = s.read_to_string(&mut out).await;
            }
            if let Some(ref mut s) = stderr {
                let _ = s.read_to_string(&mut out).await;
            }
            out
        });

        let mut timed_out = false;
        let status = tokio::select! {
            status = child.wait() => {
                Some(status.map_err(|e| DomainError::GitBackend(format!("wait command: {e}")))?)
            }
            () = tokio::time::sleep(timeout) => {
                timed_out = true;
                None
            }
            () = cancel.cancelled() => None,
        };

        if status.is_none() {
            kill_process_group(pid);
            let _ = child.kill().await;
            let _ = child.wait().await;
        }

        if status.is_none() && !timed_out {
            return Err(DomainError::GitBackend("command cancelled".to_string()));
        }

        let output = reader.await.unwrap_or_default();
        let exit_code = status.and_then(|s| s.code()).unwrap_or(-1);
        Ok(CommandOutcome { exit_code, output, timed_out })
    }

    async fn reset_hard(&self, worktree: &WorktreeHandle) -> DomainResult<()> {
        let _guard = self.lock.lock().await;
        self.git(&worktree.path, &["reset", "--hard", "-q"]).await?;
        Ok(())
    }
}

/// Deterministic gerrit-style Change-Id trailer.
fn generate_change_id(branch: &str, parent: &str, message: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(branch.as_bytes());
    hasher.update(parent.as_bytes());
    hasher.update(message.as_bytes());
    let digest = hasher.finalize();
    let hex: String = digest.iter().take(20).map(|b| format!("{b:02x}")).collect();
    format!("I{hex}")
}

#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;
    if let Some(pid) = pid {
        if let Ok(raw) = i32::try_from(pid) {
            // With process_group(0) the child's pgid equals its pid.
            let _ = killpg(Pid::from_raw(raw), Signal::SIGKILL);
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}

/// Validates a git branch name to prevent command injection.
///
/// Rejects names that could be interpreted as git flags or otherwise
/// subvert git command execution. Follows `git check-ref-format` rules.
pub fn validate_branch_name(name: &str) -> DomainResult<()> {
    if name.is_empty() {
        return Err(DomainError::Validation("branch name cannot be empty".to_string()));
    }
    if name.starts_with('-') {
        return Err(DomainError::Validation(format!(
            "invalid branch name '{name}': must not start with '-'"
        )));
    }
    if name.contains("..") {
        return Err(DomainError::Validation(format!(
            "invalid branch name '{name}': must not contain '..'"
        )));
    }
    for ch in name.chars() {
        if ch.is_ascii_control() || matches!(ch, ' ' | '~' | '^' | ':' | '?' | '*' | '[' | '\\') {
            return Err(DomainError::Validation(format!(
                "invalid branch name '{name}': contains disallowed character '{ch}'"
            )));
        }
    }
    if name.ends_with(".lock") {
        return Err(DomainError::Validation(format!(
            "invalid branch name '{name}': must not end with '.lock'"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_branch_name_rejects_flags() {
        assert!(validate_branch_name("-Xours").is_err());
        assert!(validate_branch_name("--strategy=recursive").is_err());
        assert!(validate_branch_name("-").is_err());
    }

    #[test]
    fn test_validate_branch_name_rejects_double_dot() {
        assert!(validate_branch_name("main..evil").is_err());
    }

    #[test]
    fn test_validate_branch_name_rejects_invalid_chars() {
        assert!(validate_branch_name("branch~1").is_err());
        assert!(validate_branch_name("branch^evil").is_err());
        assert!(validate_branch_name("branch name").is_err());
        assert!(validate_branch_name("feature.lock").is_err());
        assert!(validate_branch_name("").is_err());
    }

    #[test]
    fn test_validate_branch_name_accepts_valid_names() {
        assert!(validate_branch_name("main").is_ok());
        assert!(validate_branch_name("swarm/buffer").is_ok());
        assert!(validate_branch_name("streams/agent-1/fix-parser").is_ok());
        assert!(validate_branch_name("release/1.0.0").is_ok());
    }

    #[test]
    fn test_change_id_is_deterministic() {
        let a = generate_change_id("streams/a/x", "abc123", "fix: parser");
        let b = generate_change_id("streams/a/x", "abc123", "fix: parser");
        assert_eq!(a, b);
        assert!(a.starts_with('I'));
        assert_eq!(a.len(), 41);

        let c = generate_change_id("streams/a/x", "abc123", "fix: lexer");
        assert_ne!(a, c);
    }
}
