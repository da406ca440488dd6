//! Stream tracker: the authoritative record of every stream, the
//! binding between agents and worktrees, and merge-order preconditions.

use chrono::Utc;
use futures::future::try_join_all;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::adapters::git::validate_branch_name;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    ActivityEvent, Agent, ConsensusDecision, MergeMode, Repository, Review, ReviewStatus,
    ReviewVerdict, Stream, StreamStatus, WorktreeBinding,
};
use crate::domain::ports::{
    AccessRepository, AgentRepository, CommitOutcome, GitBackend, ReviewRepository,
    StreamRepository, WorktreeHandle,
};

use super::activity_log::ActivityLog;
use super::consensus;

/// Options for stream/workspace creation.
#[derive(Debug, Clone, Default)]
pub struct StreamOptions {
    pub name: Option<String>,
    pub base_branch: Option<String>,
    pub parent_stream_id: Option<Uuid>,
    pub task_id: Option<Uuid>,
}

/// Outcome of a review submission.
#[derive(Debug, Clone)]
pub struct SubmittedReview {
    pub review: Review,
    /// True when this is the reviewer's first scoring review on the
    /// stream, so the review karma award should fire.
    pub award_karma: bool,
    pub consensus: ConsensusDecision,
}

// Parent chains deeper than this indicate a cycle or runaway stack.
const MAX_STACK_DEPTH: usize = 64;

pub struct StreamTracker {
    streams: Arc<dyn StreamRepository>,
    reviews: Arc<dyn ReviewRepository>,
    access: Arc<dyn AccessRepository>,
    agents: Arc<dyn AgentRepository>,
    git: Arc<dyn GitBackend>,
    activity: Arc<ActivityLog>,
    worktree_root: PathBuf,
}

impl StreamTracker {
    pub fn new(
        streams: Arc<dyn StreamRepository>,
        reviews: Arc<dyn ReviewRepository>,
        access: Arc<dyn AccessRepository>,
        agents: Arc<dyn AgentRepository>,
        git: Arc<dyn GitBackend>,
        activity: Arc<ActivityLog>,
        worktree_root: PathBuf,
    ) -> Self {
        Self { streams, reviews, access, agents, git, activity, worktree_root }
    }

    /// Create a stream: persist the row and cut its branch. With a
    /// parent, the branch forks from the parent's branch instead of
    /// the base.
    #[instrument(skip(self, agent, repo, opts), fields(agent = %agent.name, repo = %repo.name))]
    pub async fn create_stream(
        &self,
        agent: &Agent,
        repo: &Repository,
        opts: StreamOptions,
    ) -> DomainResult<Stream> {
        let name = opts.name.unwrap_or_else(|| format!("work-{}", &Uuid::new_v4().to_string()[..8]));
        let branch_ref = format!("streams/{}/{}", agent.name, name);
        validate_branch_name(&branch_ref)?;

        let base_branch = match opts.parent_stream_id {
            Some(parent_id) => {
                let parent = self
                    .streams
                    .get(parent_id)
                    .await?
                    .ok_or_else(|| DomainError::not_found("stream", parent_id))?;
                if parent.repo_id != repo.id {
                    return Err(DomainError::Validation(
                        "parent stream belongs to a different repository".to_string(),
                    ));
                }
                if parent.status.is_terminal() && parent.status != StreamStatus::Merged {
                    return Err(DomainError::Validation(format!(
                        "parent stream is {}",
                        parent.status.as_str()
                    )));
                }
                parent.branch_ref
            }
            None => opts.base_branch.unwrap_or_else(|| repo.buffer_branch.clone()),
        };

        let mut stream = Stream::new(repo.id, agent.id, name, branch_ref, base_branch);
        stream.parent_stream_id = opts.parent_stream_id;
        stream.task_id = opts.task_id;

        self.git.create_branch(&stream.branch_ref, &stream.base_branch).await?;
        if let Err(e) = self.streams.create(&stream).await {
            // Roll back the branch so a retry is clean.
            let _ = self.git.delete_branch(&stream.branch_ref).await;
            return Err(e);
        }

        info!(stream = %stream.id, branch = %stream.branch_ref, "stream created");
        self.activity
            .record(
                ActivityEvent::new(Some(agent.id), "stream_created", "stream", stream.id)
                    .with_metadata(serde_json::json!({
                        "repo_id": repo.id.to_string(),
                        "branch_ref": stream.branch_ref,
                    })),
            )
            .await;
        Ok(stream)
    }

    /// Create a stream plus a worktree bound to the agent. At most one
    /// worktree per (agent, repo).
    pub async fn create_workspace(
        &self,
        agent: &Agent,
        repo: &Repository,
        opts: StreamOptions,
    ) -> DomainResult<(Stream, WorktreeBinding)> {
        if self.streams.get_worktree(repo.id, agent.id).await?.is_some() {
            return Err(DomainError::Conflict(format!(
                "agent {} already has a worktree in {}",
                agent.name, repo.name
            )));
        }

        let stream = self.create_stream(agent, repo, opts).await?;
        let path = self.worktree_root.join(&stream.name);
        let handle = match self.git.create_worktree(&path, &stream.branch_ref).await {
            Ok(handle) => handle,
            Err(e) => {
                let _ = self.streams.set_status(stream.id, StreamStatus::Abandoned).await;
                return Err(e);
            }
        };

        let binding = WorktreeBinding {
            id: Uuid::new_v4(),
            repo_id: repo.id,
            agent_id: agent.id,
            stream_id: stream.id,
            path: handle.path.to_string_lossy().to_string(),
            created_at: Utc::now(),
        };
        self.streams.bind_worktree(&binding).await?;
        Ok((stream, binding))
    }

    /// Remove the agent's worktree; optionally abandon its stream.
    pub async fn destroy_workspace(
        &self,
        agent: &Agent,
        repo: &Repository,
        abandon_stream: bool,
    ) -> DomainResult<()> {
        let binding = self
            .streams
            .get_worktree(repo.id, agent.id)
            .await?
            .ok_or_else(|| DomainError::not_found("worktree", agent.name.clone()))?;

        let stream = self
            .streams
            .get(binding.stream_id)
            .await?
            .ok_or_else(|| DomainError::not_found("stream", binding.stream_id))?;

        let handle =
            WorktreeHandle { path: PathBuf::from(&binding.path), branch: stream.branch_ref.clone() };
        self.git.remove_worktree(&handle).await?;
        self.streams.remove_worktree(repo.id, agent.id).await?;

        if abandon_stream && !stream.status.is_terminal() {
            self.streams.set_status(stream.id, StreamStatus::Abandoned).await?;
            self.activity
                .record(ActivityEvent::new(Some(agent.id), "stream_abandoned", "stream", stream.id))
                .await;
        }
        Ok(())
    }

    /// Commit the agent's worktree. The backend stages everything and
    /// appends the Change-Id trailer.
    #[instrument(skip(self, agent, repo, message), fields(agent = %agent.name))]
    pub async fn commit(
        &self,
        agent: &Agent,
        repo: &Repository,
        message: &str,
    ) -> DomainResult<(Stream, CommitOutcome)> {
        if message.trim().is_empty() {
            return Err(DomainError::Validation("commit message cannot be empty".to_string()));
        }

        let binding = self
            .streams
            .get_worktree(repo.id, agent.id)
            .await?
            .ok_or_else(|| DomainError::not_found("worktree", agent.name.clone()))?;
        let stream = self
            .streams
            .get(binding.stream_id)
            .await?
            .ok_or_else(|| DomainError::not_found("stream", binding.stream_id))?;

        if stream.status.is_terminal() {
            return Err(DomainError::Conflict(format!(
                "stream {} is {}",
                stream.name,
                stream.status.as_str()
            )));
        }

        let handle =
            WorktreeHandle { path: PathBuf::from(&binding.path), branch: stream.branch_ref.clone() };
        let outcome = self.git.commit(&handle, message).await?;
        self.streams.touch(stream.id).await?;

        self.activity
            .record(
                ActivityEvent::new(Some(agent.id), "stream_committed", "stream", stream.id)
                    .with_metadata(serde_json::json!({
                        "commit": outcome.commit_hash,
                        "change_id": outcome.change_id,
                    })),
            )
            .await;
        Ok((stream, outcome))
    }

    /// Move an active stream into review.
    pub async fn submit_for_review(&self, stream_id: Uuid) -> DomainResult<Stream> {
        let stream = self
            .streams
            .get(stream_id)
            .await?
            .ok_or_else(|| DomainError::not_found("stream", stream_id))?;

        if stream.status != StreamStatus::Active {
            return Err(DomainError::Conflict(format!(
                "stream {} is {}, only active streams can be submitted",
                stream.name,
                stream.status.as_str()
            )));
        }

        self.streams.set_status(stream_id, StreamStatus::InReview).await?;
        self.streams.set_review_status(stream_id, ReviewStatus::InReview).await?;
        self.activity
            .record(ActivityEvent::new(Some(stream.agent_id), "stream_submitted", "stream", stream_id))
            .await;
        self.streams.get(stream_id).await?.ok_or_else(|| DomainError::not_found("stream", stream_id))
    }

    /// Submit (or overwrite) a review and recompute the stream's
    /// aggregated review status.
    pub async fn submit_review(
        &self,
        reviewer: &Agent,
        repo: &Repository,
        stream_id: Uuid,
        verdict: ReviewVerdict,
        feedback: Option<String>,
        tested: bool,
        is_human: bool,
    ) -> DomainResult<SubmittedReview> {
        let stream = self
            .streams
            .get(stream_id)
            .await?
            .ok_or_else(|| DomainError::not_found("stream", stream_id))?;

        if stream.status.is_terminal() {
            return Err(DomainError::Conflict(format!(
                "stream {} is {}, reviews are closed",
                stream.name,
                stream.status.as_str()
            )));
        }
        if stream.agent_id == reviewer.id {
            return Err(DomainError::Validation(
                "agents cannot review their own stream".to_string(),
            ));
        }

        let is_maintainer =
            self.access.get_maintainer(repo.id, reviewer.id).await?.is_some();

        let previous = self.reviews.get(stream_id, reviewer.id).await?;
        let already_awarded = previous.as_ref().is_some_and(|r| r.karma_awarded);
        let award_karma = verdict.is_scoring() && !already_awarded;

        let mut review = Review::new(stream_id, reviewer.id, verdict);
        review.feedback = feedback;
        review.tested = tested;
        review.is_human = is_human;
        review.is_maintainer = is_maintainer;
        review.karma_awarded = award_karma || already_awarded;
        self.reviews.upsert(&review).await?;

        let consensus = self.compute_consensus(&stream, repo).await?;
        let review_status = if consensus.reached {
            ReviewStatus::Approved
        } else if consensus.reason == crate::domain::models::ConsensusReason::ChangesRequested {
            ReviewStatus::ChangesRequested
        } else {
            ReviewStatus::InReview
        };
        self.streams.set_review_status(stream_id, review_status).await?;

        self.activity
            .record(
                ActivityEvent::new(Some(reviewer.id), "review_submitted", "stream", stream_id)
                    .with_metadata(serde_json::json!({
                        "verdict": verdict.as_str(),
                        "is_maintainer": is_maintainer,
                        "consensus_reached": consensus.reached,
                    })),
            )
            .await;

        Ok(SubmittedReview { review, award_karma, consensus })
    }

    /// Evaluate consensus for a stream from current store state.
    pub async fn compute_consensus(
        &self,
        stream: &Stream,
        repo: &Repository,
    ) -> DomainResult<ConsensusDecision> {
        let reviews = self.reviews.list_for_stream(stream.id).await?;
        let maintainers = self.access.list_maintainers(repo.id).await?;

        let reviewers =
            try_join_all(reviews.iter().map(|r| self.agents.get(r.reviewer_id))).await?;
        let karma_by_reviewer: HashMap<Uuid, i64> =
            reviewers.into_iter().flatten().map(|a| (a.id, a.karma)).collect();

        Ok(consensus::evaluate(repo, &reviews, &maintainers, &karma_by_reviewer))
    }

    /// Merge-order preconditions beyond consensus itself: the parent
    /// (if any) must already be merged, and no ancestor in the stack
    /// may sit at changes-requested. Only the immediate parent's merge
    /// state needs checking; transitivity follows because children
    /// cannot merge before their parent.
    pub async fn check_merge_ready(
        &self,
        stream: &Stream,
        decision: &ConsensusDecision,
        bypass_consensus: bool,
    ) -> DomainResult<()> {
        if let Some(parent_id) = stream.parent_stream_id {
            let parent = self
                .streams
                .get(parent_id)
                .await?
                .ok_or_else(|| DomainError::not_found("stream", parent_id))?;
            if parent.status != StreamStatus::Merged {
                return Err(DomainError::Consensus("parent_not_merged".to_string()));
            }
        }

        let mut cursor = stream.parent_stream_id;
        let mut depth = 0usize;
        while let Some(ancestor_id) = cursor {
            depth += 1;
            if depth > MAX_STACK_DEPTH {
                return Err(DomainError::Internal("stream stack too deep".to_string()));
            }
            let ancestor = self
                .streams
                .get(ancestor_id)
                .await?
                .ok_or_else(|| DomainError::not_found("stream", ancestor_id))?;
            if ancestor.agent_id == stream.agent_id
                && ancestor.review_status == ReviewStatus::ChangesRequested
            {
                return Err(DomainError::Consensus("ancestor_changes_requested".to_string()));
            }
            cursor = ancestor.parent_stream_id;
        }

        if !bypass_consensus && !decision.reached {
            return Err(DomainError::Consensus(decision.reason.as_str().to_string()));
        }
        Ok(())
    }

    /// Current reviews on a stream, one row per reviewer.
    pub async fn reviews_for_stream(&self, stream_id: Uuid) -> DomainResult<Vec<Review>> {
        self.reviews.list_for_stream(stream_id).await
    }

    /// Diff of the stream's branch against its base.
    pub async fn diff(&self, stream: &Stream) -> DomainResult<String> {
        self.git.diff(&stream.branch_ref, &stream.base_branch).await
    }

    /// Whether a commit on this stream should auto-queue for merge.
    pub fn auto_queues_on_commit(repo: &Repository) -> bool {
        repo.merge_mode == MergeMode::Swarm
    }
}
