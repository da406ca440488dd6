//! Merge queue: per-repository FIFO drained by a single worker, plus
//! buffer stabilization and promotion.
//!
//! A failed merge is terminal for the queue entry and leaves the
//! stream in review for human or council intervention; the worker
//! never retries git failures.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    ActivityEvent, MergeEntryStatus, MergeMode, MergeQueueEntry, Repository, ReviewStatus, Stream,
    StreamStatus, SyncEventType,
};
use crate::domain::ports::{
    FastForwardOutcome, GitBackend, MergeOutcome, MergeQueueRepository, RepoRepository,
    StreamRepository, SyncRepository, WorktreeHandle,
};

use super::activity_log::ActivityLog;
use super::karma::{KarmaService, MERGE_AWARD};
use super::stage_engine::StageEngine;
use super::stream_tracker::StreamTracker;

const WORKER_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Options for a merge request.
#[derive(Debug, Clone, Copy, Default)]
pub struct MergeRequestOptions {
    /// Council authorisation: insert at the head of the queue.
    pub council_authorized: bool,
    /// Council policy bit: skip the consensus re-check entirely.
    pub bypass_consensus: bool,
}

/// Result of one stabilization run.
#[derive(Debug, Clone)]
pub struct StabilizationOutcome {
    pub success: bool,
    pub exit_code: i32,
    pub timed_out: bool,
    pub output: String,
    pub reverted_stream: Option<Uuid>,
    pub promoted: bool,
}

struct Worker {
    cancel: CancellationToken,
    notify: Arc<Notify>,
    handle: JoinHandle<()>,
}

pub struct MergeService {
    queue: Arc<dyn MergeQueueRepository>,
    streams: Arc<dyn StreamRepository>,
    repos: Arc<dyn RepoRepository>,
    git: Arc<dyn GitBackend>,
    tracker: Arc<StreamTracker>,
    karma: Arc<KarmaService>,
    stage: Arc<StageEngine>,
    activity: Arc<ActivityLog>,
    sync: Option<Arc<dyn SyncRepository>>,
    worktree_root: PathBuf,
    workers: Mutex<HashMap<Uuid, Worker>>,
}

impl MergeService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        queue: Arc<dyn MergeQueueRepository>,
        streams: Arc<dyn StreamRepository>,
        repos: Arc<dyn RepoRepository>,
        git: Arc<dyn GitBackend>,
        tracker: Arc<StreamTracker>,
        karma: Arc<KarmaService>,
        stage: Arc<StageEngine>,
        activity: Arc<ActivityLog>,
        sync: Option<Arc<dyn SyncRepository>>,
        worktree_root: PathBuf,
    ) -> Self {
        Self {
            queue,
            streams,
            repos,
            git,
            tracker,
            karma,
            stage,
            activity,
            sync,
            worktree_root,
            workers: Mutex::new(HashMap::new()),
        }
    }

    /// Append a merge request, re-validating consensus and parent
    /// ordering up front so obviously unmergeable requests are
    /// rejected synchronously.
    #[instrument(skip(self), fields(stream = %stream_id))]
    pub async fn request_merge(
        &self,
        requester_id: Uuid,
        stream_id: Uuid,
        opts: MergeRequestOptions,
    ) -> DomainResult<MergeQueueEntry> {
        let stream = self
            .streams
            .get(stream_id)
            .await?
            .ok_or_else(|| DomainError::not_found("stream", stream_id))?;
        if stream.status.is_terminal() {
            return Err(DomainError::Conflict(format!(
                "stream {} is {}",
                stream.name,
                stream.status.as_str()
            )));
        }
        let repo = self
            .repos
            .get(stream.repo_id)
            .await?
            .ok_or_else(|| DomainError::not_found("repository", stream.repo_id))?;

        let bypass = opts.bypass_consensus || repo.merge_mode == MergeMode::Swarm;
        let decision = self.tracker.compute_consensus(&stream, &repo).await?;
        self.tracker.check_merge_ready(&stream, &decision, bypass).await?;

        let mut entry = MergeQueueEntry::new(repo.id, stream.id, requester_id);
        // The flag carries the council's consensus-bypass grant; head
        // insertion itself is visible through the entry's priority.
        entry.council_authorized = opts.council_authorized && opts.bypass_consensus;
        if opts.council_authorized {
            self.queue.enqueue_front(&entry).await?;
        } else {
            self.queue.enqueue(&entry).await?;
        }

        self.activity
            .record(
                ActivityEvent::new(Some(requester_id), "merge_requested", "stream", stream.id)
                    .with_metadata(serde_json::json!({
                        "entry_id": entry.id.to_string(),
                        "council_authorized": opts.council_authorized,
                    })),
            )
            .await;
        self.enqueue_sync(
            SyncEventType::MergeRequest,
            serde_json::json!({
                "stream_id": stream.id.to_string(),
                "repo_id": repo.id.to_string(),
                "requester_id": requester_id.to_string(),
            }),
        )
        .await;

        // Wake the worker if one is running for this repository.
        let workers = self.workers.lock().await;
        if let Some(worker) = workers.get(&repo.id) {
            worker.notify.notify_one();
        }

        Ok(self.queue.get(entry.id).await?.unwrap_or(entry))
    }

    /// Drain the repository's queue until empty. Strictly sequential;
    /// this is the single-worker path the CLI uses.
    pub async fn drain(&self, repo_id: Uuid, cancel: &CancellationToken) -> DomainResult<u32> {
        let mut processed = 0;
        loop {
            if cancel.is_cancelled() {
                break;
            }
            let Some(entry) = self.queue.pop_next(repo_id).await? else {
                break;
            };
            self.process_entry(entry, cancel).await;
            processed += 1;
        }
        Ok(processed)
    }

    /// Ensure a background worker is draining this repository's queue.
    /// One worker per repository; calling again is a no-op.
    pub async fn spawn_worker(self: Arc<Self>, repo_id: Uuid) -> CancellationToken {
        let mut workers = self.workers.lock().await;
        if let Some(existing) = workers.get(&repo_id) {
            if !existing.handle.is_finished() {
                return existing.cancel.clone();
            }
        }

        let cancel = CancellationToken::new();
        let notify = Arc::new(Notify::new());
        let service = Arc::clone(&self);
        let worker_cancel = cancel.clone();
        let worker_notify = notify.clone();

        let handle = tokio::spawn(async move {
            info!(repo_id = %repo_id, "merge worker started");
            loop {
                if let Err(e) = service.drain(repo_id, &worker_cancel).await {
                    error!(repo_id = %repo_id, error = %e, "merge worker drain failed");
                }
                tokio::select! {
                    () = worker_cancel.cancelled() => break,
                    () = worker_notify.notified() => {}
                    () = tokio::time::sleep(WORKER_POLL_INTERVAL) => {}
                }
            }
            info!(repo_id = %repo_id, "merge worker stopped");
        });

        workers.insert(repo_id, Worker { cancel: cancel.clone(), notify, handle });
        cancel
    }

    /// Stop the repository's worker, if any.
    pub async fn stop_worker(&self, repo_id: Uuid) {
        let mut workers = self.workers.lock().await;
        if let Some(worker) = workers.remove(&repo_id) {
            worker.cancel.cancel();
            worker.notify.notify_one();
        }
    }

    /// Process one claimed entry to a terminal state.
    async fn process_entry(&self, entry: MergeQueueEntry, cancel: &CancellationToken) {
        match self.try_merge(&entry, cancel).await {
            Ok(()) => {}
            Err(e) => {
                let terminal = if cancel.is_cancelled() {
                    MergeEntryStatus::Cancelled
                } else {
                    MergeEntryStatus::Failed
                };
                if let Err(store_err) =
                    self.queue.set_status(entry.id, terminal, Some(&e.to_string())).await
                {
                    error!(entry = %entry.id, error = %store_err, "failed to record merge failure");
                }
                self.activity
                    .record(
                        ActivityEvent::new(None, "merge_failed", "stream", entry.stream_id)
                            .with_metadata(serde_json::json!({
                                "entry_id": entry.id.to_string(),
                                "error": e.to_string(),
                            })),
                    )
                    .await;
            }
        }
    }

    async fn try_merge(
        &self,
        entry: &MergeQueueEntry,
        cancel: &CancellationToken,
    ) -> DomainResult<()> {
        if cancel.is_cancelled() {
            return Err(DomainError::Internal("merge cancelled".to_string()));
        }

        let stream = self
            .streams
            .get(entry.stream_id)
            .await?
            .ok_or_else(|| DomainError::not_found("stream", entry.stream_id))?;
        let repo = self
            .repos
            .get(entry.repo_id)
            .await?
            .ok_or_else(|| DomainError::not_found("repository", entry.repo_id))?;

        // Consensus may have changed while the entry waited; re-check
        // under the same rules used at admission.
        let bypass = entry.council_authorized || repo.merge_mode == MergeMode::Swarm;
        let decision = self.tracker.compute_consensus(&stream, &repo).await?;
        self.tracker.check_merge_ready(&stream, &decision, bypass).await?;

        match self.git.merge(&repo.buffer_branch, &stream.branch_ref).await? {
            MergeOutcome::Conflict { files } => {
                // Conflict resolution is a human/council intervention
                // point; the stream stays in review.
                let message = format!("merge conflict in: {}", files.join(", "));
                warn!(stream = %stream.id, %message, "merge conflict");
                Err(DomainError::GitBackend(message))
            }
            MergeOutcome::Merged { commit } => {
                self.queue.set_merge_commit(entry.id, &commit).await?;
                self.queue.set_status(entry.id, MergeEntryStatus::Merged, None).await?;
                // Swarm-mode streams merge straight from active;
                // reviewed streams from in_review. Both are valid.
                self.streams.set_status(stream.id, StreamStatus::Merged).await?;
                self.streams.set_review_status(stream.id, ReviewStatus::Approved).await?;

                if let Err(e) = self.karma.award(stream.agent_id, MERGE_AWARD, "stream_merged").await
                {
                    warn!(agent = %stream.agent_id, error = %e, "merge karma award failed");
                }
                if let Err(e) = self.stage.recompute_metrics(&repo).await {
                    warn!(repo = %repo.id, error = %e, "metric recompute failed");
                }

                info!(stream = %stream.id, commit = %commit, "stream merged to buffer");
                self.activity
                    .record(
                        ActivityEvent::new(Some(stream.agent_id), "stream_merged", "stream", stream.id)
                            .with_metadata(serde_json::json!({
                                "commit": commit,
                                "buffer_branch": repo.buffer_branch,
                            })),
                    )
                    .await;
                self.enqueue_sync(
                    SyncEventType::StreamStatus,
                    serde_json::json!({
                        "stream_id": stream.id.to_string(),
                        "status": "merged",
                        "commit": commit,
                    }),
                )
                .await;

                if repo.auto_promote_on_green && repo.stabilize_command.is_some() {
                    let outcome = self.stabilize(repo.id, cancel).await?;
                    info!(success = outcome.success, "post-merge stabilization finished");
                }
                Ok(())
            }
        }
    }

    /// Run the repository's stabilize command against the buffer tip.
    #[instrument(skip(self, cancel))]
    pub async fn stabilize(
        &self,
        repo_id: Uuid,
        cancel: &CancellationToken,
    ) -> DomainResult<StabilizationOutcome> {
        let repo = self
            .repos
            .get(repo_id)
            .await?
            .ok_or_else(|| DomainError::not_found("repository", repo_id))?;
        let command = repo.stabilize_command.clone().ok_or_else(|| {
            DomainError::Validation(format!("repository {} has no stabilize command", repo.name))
        })?;

        // Pin a dedicated worktree at the buffer's current tip.
        let path = self.worktree_root.join(format!(".stabilize-{}", &repo_id.to_string()[..8]));
        let handle = match self.git.create_worktree(&path, &repo.buffer_branch).await {
            Ok(handle) => handle,
            Err(_) => {
                // A stale worktree from an earlier run; replace it.
                let stale =
                    WorktreeHandle { path: path.clone(), branch: repo.buffer_branch.clone() };
                self.git.remove_worktree(&stale).await.ok();
                self.git.create_worktree(&path, &repo.buffer_branch).await?
            }
        };

        let timeout = Duration::from_secs(repo.stabilize_timeout);
        let result = self.git.run_command(&handle, &command, timeout, cancel).await;
        // A killed command can leave half-written state behind;
        // discard it before tearing the worktree down.
        if result.is_err() || matches!(&result, Ok(o) if o.timed_out) {
            self.git.reset_hard(&handle).await.ok();
        }
        self.git.remove_worktree(&handle).await.ok();
        let outcome = result?;

        let success = outcome.succeeded();
        self.activity
            .record(
                ActivityEvent::new(None, "stabilization", "repository", repo.id).with_metadata(
                    serde_json::json!({
                        "success": success,
                        "exit_code": outcome.exit_code,
                        "timed_out": outcome.timed_out,
                    }),
                ),
            )
            .await;

        if success {
            let tip = self.git.rev_parse(&repo.buffer_branch).await?;
            let tag = format!("gitswarm-green-{}", &tip[..tip.len().min(8)]);
            self.git.tag(&tag, &repo.buffer_branch).await?;
            self.repos.set_last_green_commit(repo.id, Some(&tip)).await?;

            let promoted = if repo.auto_promote_on_green {
                self.promote(repo.id).await.is_ok()
            } else {
                false
            };
            return Ok(StabilizationOutcome {
                success: true,
                exit_code: outcome.exit_code,
                timed_out: false,
                output: outcome.output,
                reverted_stream: None,
                promoted,
            });
        }

        let reverted_stream = if repo.auto_revert_on_red {
            self.revert_latest_merge(&repo).await?
        } else {
            None
        };

        Ok(StabilizationOutcome {
            success: false,
            exit_code: outcome.exit_code,
            timed_out: outcome.timed_out,
            output: outcome.output,
            reverted_stream,
            promoted: false,
        })
    }

    /// Revert the most recently merged stream above the last green
    /// point: a revert commit lands on the buffer and the stream is
    /// marked reverted.
    async fn revert_latest_merge(&self, repo: &Repository) -> DomainResult<Option<Uuid>> {
        let Some(entry) = self.queue.latest_merged(repo.id).await? else {
            return Ok(None);
        };
        let Some(merge_commit) = entry.merge_commit.clone() else {
            return Ok(None);
        };
        if repo.last_green_commit.as_deref() == Some(merge_commit.as_str()) {
            // Nothing merged above the last green point.
            return Ok(None);
        }

        let revert_commit = self.git.revert(&repo.buffer_branch, &merge_commit).await?;
        self.streams.set_status(entry.stream_id, StreamStatus::Reverted).await?;
        self.queue
            .set_status(
                entry.id,
                MergeEntryStatus::Failed,
                Some("auto-reverted after failed stabilization"),
            )
            .await?;

        warn!(stream = %entry.stream_id, commit = %merge_commit, "stream auto-reverted");
        self.activity
            .record(
                ActivityEvent::new(None, "stream_reverted", "stream", entry.stream_id)
                    .with_metadata(serde_json::json!({
                        "merge_commit": merge_commit,
                        "revert_commit": revert_commit,
                    })),
            )
            .await;
        self.enqueue_sync(
            SyncEventType::StreamStatus,
            serde_json::json!({
                "stream_id": entry.stream_id.to_string(),
                "status": "reverted",
            }),
        )
        .await;
        Ok(Some(entry.stream_id))
    }

    /// Fast-forward the promote target onto the buffer tip.
    pub async fn promote(&self, repo_id: Uuid) -> DomainResult<String> {
        let repo = self
            .repos
            .get(repo_id)
            .await?
            .ok_or_else(|| DomainError::not_found("repository", repo_id))?;

        match self.git.fast_forward(&repo.promote_target, &repo.buffer_branch).await? {
            FastForwardOutcome::NotFastForward => {
                // External interference on the target branch; operators
                // must reconcile, nothing is rolled back automatically.
                self.activity
                    .record(
                        ActivityEvent::new(None, "promotion", "repository", repo.id)
                            .with_metadata(serde_json::json!({ "success": false })),
                    )
                    .await;
                Err(DomainError::Conflict(format!(
                    "{} has diverged from {}; promotion requires operator intervention",
                    repo.promote_target, repo.buffer_branch
                )))
            }
            FastForwardOutcome::FastForwarded { commit } => {
                info!(repo = %repo.name, commit = %commit, "buffer promoted");
                self.activity
                    .record(
                        ActivityEvent::new(None, "promotion", "repository", repo.id).with_metadata(
                            serde_json::json!({ "success": true, "commit": commit }),
                        ),
                    )
                    .await;
                Ok(commit)
            }
        }
    }

    /// Cancel a pending entry.
    pub async fn cancel_entry(&self, entry_id: Uuid) -> DomainResult<()> {
        let entry = self
            .queue
            .get(entry_id)
            .await?
            .ok_or_else(|| DomainError::not_found("merge queue entry", entry_id))?;
        if entry.status != MergeEntryStatus::Pending {
            return Err(DomainError::Conflict(format!(
                "entry is {}, only pending entries can be cancelled",
                entry.status.as_str()
            )));
        }
        self.queue.set_status(entry_id, MergeEntryStatus::Cancelled, None).await
    }

    pub async fn list_queue(&self, repo_id: Uuid) -> DomainResult<Vec<MergeQueueEntry>> {
        self.queue.list(repo_id, None).await
    }

    pub async fn get_entry(&self, entry_id: Uuid) -> DomainResult<Option<MergeQueueEntry>> {
        self.queue.get(entry_id).await
    }

    /// Look up the stream for council merge execution.
    pub async fn get_stream(&self, stream_id: Uuid) -> DomainResult<Stream> {
        self.streams
            .get(stream_id)
            .await?
            .ok_or_else(|| DomainError::not_found("stream", stream_id))
    }

    async fn enqueue_sync(&self, event_type: SyncEventType, payload: serde_json::Value) {
        if let Some(ref sync) = self.sync {
            if let Err(e) = sync.enqueue(event_type, &payload).await {
                warn!(error = %e, "sync enqueue failed");
            }
        }
    }
}
