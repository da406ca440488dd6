//! In-memory git backend used by tests.
//!
//! Models branches as commit lists plus file sets, supports conflict
//! injection and scripted stabilize commands, and is deterministic.

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::{
    CommandOutcome, CommitOutcome, FastForwardOutcome, GitBackend, MergeOutcome, WorktreeHandle,
};

#[derive(Debug, Clone)]
struct MemCommit {
    hash: String,
    change_id: String,
    files: Vec<String>,
}

#[derive(Default)]
struct MemState {
    branches: HashMap<String, Vec<MemCommit>>,
    files: HashMap<String, BTreeSet<String>>,
    worktrees: HashMap<PathBuf, String>,
    staged: HashMap<String, Vec<String>>,
    tags: HashMap<String, String>,
    conflicts: BTreeSet<(String, String)>,
    scripted: VecDeque<CommandOutcome>,
    counter: u64,
}

impl MemState {
    fn next_hash(&mut self) -> String {
        self.counter += 1;
        format!("{:040x}", self.counter)
    }

    fn tip(&self, branch: &str) -> Option<&MemCommit> {
        self.branches.get(branch).and_then(|c| c.last())
    }
}

#[derive(Default)]
pub struct MemoryGitBackend {
    state: Mutex<MemState>,
}

impl MemoryGitBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemState> {
        // Lock poisoning only happens after a panic in another test
        // thread; propagating the inner state is fine there.
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Test helper: stage a file on a branch for the next commit.
    pub fn stage_file(&self, branch: &str, file: impl Into<String>) {
        let mut state = self.lock();
        state.staged.entry(branch.to_string()).or_default().push(file.into());
    }

    /// Test helper: the committed file set of a branch.
    pub fn branch_files(&self, branch: &str) -> Vec<String> {
        let state = self.lock();
        state.files.get(branch).map(|s| s.iter().cloned().collect()).unwrap_or_default()
    }

    /// Test helper: make the next merge of `src` into `dst` conflict.
    pub fn inject_conflict(&self, src: &str, dst: &str) {
        let mut state = self.lock();
        state.conflicts.insert((src.to_string(), dst.to_string()));
    }

    /// Test helper: script the outcome of the next `run_command` call.
    pub fn script_command(&self, exit_code: i32, output: impl Into<String>) {
        let mut state = self.lock();
        state.scripted.push_back(CommandOutcome {
            exit_code,
            output: output.into(),
            timed_out: false,
        });
    }

    /// Test helper: tags recorded so far.
    pub fn tags(&self) -> Vec<(String, String)> {
        let state = self.lock();
        state.tags.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }
}

#[async_trait]
impl GitBackend for MemoryGitBackend {
    async fn init_repo(&self, default_branch: &str) -> DomainResult<()> {
        let mut state = self.lock();
        if state.branches.contains_key(default_branch) {
            return Ok(());
        }
        let hash = state.next_hash();
        let initial = MemCommit {
            hash,
            change_id: "I0000000000000000000000000000000000000000".to_string(),
            files: vec![],
        };
        state.branches.insert(default_branch.to_string(), vec![initial]);
        state.files.insert(default_branch.to_string(), BTreeSet::new());
        Ok(())
    }

    async fn create_branch(&self, name: &str, base: &str) -> DomainResult<String> {
        let mut state = self.lock();
        if state.branches.contains_key(name) {
            return Err(DomainError::GitBackend(format!("branch {name} already exists")));
        }
        let history = state
            .branches
            .get(base)
            .cloned()
            .ok_or_else(|| DomainError::GitBackend(format!("base branch {base} not found")))?;
        let files = state.files.get(base).cloned().unwrap_or_default();
        state.branches.insert(name.to_string(), history);
        state.files.insert(name.to_string(), files);
        Ok(name.to_string())
    }

    async fn delete_branch(&self, name: &str) -> DomainResult<()> {
        let mut state = self.lock();
        if state.branches.remove(name).is_none() {
            return Err(DomainError::GitBackend(format!("branch {name} not found")));
        }
        state.files.remove(name);
        Ok(())
    }

    async fn branch_exists(&self, name: &str) -> DomainResult<bool> {
        Ok(self.lock().branches.contains_key(name))
    }

    async fn create_worktree(&self, path: &Path, branch: &str) -> DomainResult<WorktreeHandle> {
        let mut state = self.lock();
        if !state.branches.contains_key(branch) {
            return Err(DomainError::GitBackend(format!("branch {branch} not found")));
        }
        state.worktrees.insert(path.to_path_buf(), branch.to_string());
        Ok(WorktreeHandle { path: path.to_path_buf(), branch: branch.to_string() })
    }

    async fn remove_worktree(&self, handle: &WorktreeHandle) -> DomainResult<()> {
        let mut state = self.lock();
        if state.worktrees.remove(&handle.path).is_none() {
            return Err(DomainError::GitBackend(format!(
                "worktree {} not found",
                handle.path.display()
            )));
        }
        Ok(())
    }

    async fn commit(&self, worktree: &WorktreeHandle, message: &str) -> DomainResult<CommitOutcome> {
        let mut state = self.lock();
        let branch = state
            .worktrees
            .get(&worktree.path)
            .cloned()
            .ok_or_else(|| DomainError::GitBackend("worktree not registered".to_string()))?;

        let files = state.staged.remove(&branch).unwrap_or_default();
        let hash = state.next_hash();
        let change_id = format!("I{:039x}", state.counter);
        let _ = message;

        let commit = MemCommit { hash: hash.clone(), change_id: change_id.clone(), files: files.clone() };
        state
            .branches
            .get_mut(&branch)
            .ok_or_else(|| DomainError::GitBackend(format!("branch {branch} not found")))?
            .push(commit);
        state.files.entry(branch).or_default().extend(files);

        Ok(CommitOutcome { commit_hash: hash, change_id })
    }

    async fn merge(&self, dst: &str, src: &str) -> DomainResult<MergeOutcome> {
        let mut state = self.lock();

        let key = (src.to_string(), dst.to_string());
        if state.conflicts.remove(&key) {
            return Ok(MergeOutcome::Conflict { files: vec!["CONFLICT".to_string()] });
        }

        let src_files = state
            .files
            .get(src)
            .cloned()
            .ok_or_else(|| DomainError::GitBackend(format!("branch {src} not found")))?;
        if !state.branches.contains_key(dst) {
            return Err(DomainError::GitBackend(format!("branch {dst} not found")));
        }

        let hash = state.next_hash();
        let commit = MemCommit {
            hash: hash.clone(),
            change_id: format!("I{:039x}", state.counter),
            files: src_files.iter().cloned().collect(),
        };
        state.branches.get_mut(dst).expect("checked above").push(commit);
        state.files.entry(dst.to_string()).or_default().extend(src_files);

        Ok(MergeOutcome::Merged { commit: hash })
    }

    async fn fast_forward(&self, dst: &str, src: &str) -> DomainResult<FastForwardOutcome> {
        let mut state = self.lock();

        let src_history = state
            .branches
            .get(src)
            .cloned()
            .ok_or_else(|| DomainError::GitBackend(format!("branch {src} not found")))?;
        let dst_history = state
            .branches
            .get(dst)
            .cloned()
            .ok_or_else(|| DomainError::GitBackend(format!("branch {dst} not found")))?;

        let is_prefix = dst_history.len() <= src_history.len()
            && dst_history
                .iter()
                .zip(src_history.iter())
                .all(|(a, b)| a.hash == b.hash);
        if !is_prefix {
            return Ok(FastForwardOutcome::NotFastForward);
        }

        let tip = src_history.last().map(|c| c.hash.clone()).unwrap_or_default();
        let src_files = state.files.get(src).cloned().unwrap_or_default();
        state.branches.insert(dst.to_string(), src_history);
        state.files.insert(dst.to_string(), src_files);
        Ok(FastForwardOutcome::FastForwarded { commit: tip })
    }

    async fn revert(&self, branch: &str, commit: &str) -> DomainResult<String> {
        let mut state = self.lock();

        let history = state
            .branches
            .get(branch)
            .cloned()
            .ok_or_else(|| DomainError::GitBackend(format!("branch {branch} not found")))?;
        let target = history
            .iter()
            .find(|c| c.hash == commit)
            .cloned()
            .ok_or_else(|| DomainError::GitBackend(format!("commit {commit} not on {branch}")))?;

        if let Some(files) = state.files.get_mut(branch) {
            for f in &target.files {
                files.remove(f);
            }
        }

        let hash = state.next_hash();
        let revert = MemCommit {
            hash: hash.clone(),
            change_id: format!("I{:039x}", state.counter),
            files: vec![],
        };
        state.branches.get_mut(branch).expect("checked above").push(revert);
        Ok(hash)
    }

    async fn diff(&self, branch: &str, base: &str) -> DomainResult<String> {
        let state = self.lock();
        let branch_files = state.files.get(branch).cloned().unwrap_or_default();
        let base_files = state.files.get(base).cloned().unwrap_or_default();
        Ok(branch_files
            .difference(&base_files)
            .map(|f| format!("+ {f}"))
            .collect::<Vec<_>>()
            .join("\n"))
    }

    async fn tag(&self, name: &str, reference: &str) -> DomainResult<()> {
        let mut state = self.lock();
        let target = state
            .tip(reference)
            .map(|c| c.hash.clone())
            .unwrap_or_else(|| reference.to_string());
        state.tags.insert(name.to_string(), target);
        Ok(())
    }

    async fn rev_parse(&self, reference: &str) -> DomainResult<String> {
        let state = self.lock();
        if let Some(commit) = state.tip(reference) {
            return Ok(commit.hash.clone());
        }
        if let Some(hash) = state.tags.get(reference) {
            return Ok(hash.clone());
        }
        Err(DomainError::GitBackend(format!("unknown ref: {reference}")))
    }

    async fn run_command(
        &self,
        _worktree: &WorktreeHandle,
        _command: &str,
        _timeout: Duration,
        _cancel: &CancellationToken,
    ) -> DomainResult<CommandOutcome> {
        let mut state = self.lock();
        Ok(state
            .scripted
            .pop_front()
            .unwrap_or(CommandOutcome { exit_code: 0, output: String::new(), timed_out: false }))
    }

    async fn reset_hard(&self, worktree: &WorktreeHandle) -> DomainResult<()> {
        let mut state = self.lock();
        let branch = state.worktrees.get(&worktree.path).cloned();
        if let Some(branch) = branch {
            state.staged.remove(&branch);
        }
        Ok(())
    }
}
