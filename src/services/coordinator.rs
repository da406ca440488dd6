//! Coordinator: the single public API over the governance engine.
//!
//! Every operation follows the same shape: resolve identity, check
//! the rate limit, check access, perform the domain action, and let
//! the services emit activity and sync events. Nothing below this
//! layer formats user-facing strings or wire codes.

use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use crate::adapters::server::{SyncClient, SyncClientConfig};
use crate::adapters::sqlite::{
    all_migrations, create_pool, Migrator, SqliteAccessRepository, SqliteActivityRepository,
    SqliteAgentRepository, SqliteCouncilRepository, SqliteMergeQueueRepository,
    SqliteRepoRepository, SqliteReviewRepository, SqliteStreamRepository, SqliteSyncRepository,
    SqliteTaskRepository,
};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    AccessGrant, AccessLevel, ActivityEvent, Agent, AgentStatus, BranchRule, Claim,
    ConsensusAuthority, ConsensusDecision, Council, CouncilMember, CouncilRole, DirectPush,
    EventFilter, Maintainer, MaintainerRole, MergeQueueEntry, Proposal, ProposalAction,
    ProposalStatus, RepoAction, RepoSettingsPatch, Repository, Review, ReviewVerdict, Stream,
    StreamStatus, SyncEventType, Task, TaskPriority, VoteChoice, WorktreeBinding,
};
use crate::domain::ports::{
    AccessRepository as _, AgentRepository as _, GitBackend, RepoRepository as _, StreamFilter,
    StreamRepository as _, TaskFilter,
};

use super::access::AccessService;
use super::activity_log::ActivityLog;
use super::config::Config;
use super::council::{CouncilParams, CouncilService};
use super::identity::{AgentContext, IdentityService, Registration};
use super::karma::{KarmaService, REVIEW_AWARD};
use super::merge_queue::{MergeRequestOptions, MergeService, StabilizationOutcome};
use super::rate_limiter::{default_limits, RateLimiter};
use super::stage_engine::{AdvancementReport, StageEngine};
use super::stream_tracker::{StreamOptions, StreamTracker};
use super::sync::SyncService;
use super::task_market::{ClaimDecision, TaskMarket};

/// Repository status overview for the `status` command.
#[derive(Debug, Clone, serde::Serialize)]
pub struct StatusSummary {
    pub repository: String,
    pub stage: String,
    pub active_streams: u32,
    pub in_review_streams: u32,
    pub merged_streams: u32,
    pub pending_merges: u32,
    pub contributor_count: u32,
    pub council_status: Option<String>,
    pub sync_backlog: Option<u64>,
}

pub struct Coordinator {
    root: PathBuf,
    config: Config,
    agents: Arc<SqliteAgentRepository>,
    repos: Arc<SqliteRepoRepository>,
    access_repo: Arc<SqliteAccessRepository>,
    streams: Arc<SqliteStreamRepository>,
    identity: IdentityService<SqliteAgentRepository>,
    access: AccessService<SqliteAccessRepository>,
    karma: Arc<KarmaService>,
    tracker: Arc<StreamTracker>,
    merge: Arc<MergeService>,
    council: CouncilService,
    market: TaskMarket,
    stage: Arc<StageEngine>,
    activity: Arc<ActivityLog>,
    limiter: RateLimiter,
    sync: Option<Arc<SyncService>>,
}

impl Coordinator {
    /// Open the embedded deployment rooted at `root`: load config,
    /// connect and migrate the store, and wire the services.
    pub async fn open(root: &Path, git: Arc<dyn GitBackend>) -> DomainResult<Self> {
        let config = Config::load(root)
            .map_err(|e| DomainError::Validation(format!("configuration: {e}")))?;
        let pool = create_pool(&config.database_url(root), None)
            .await
            .map_err(|e| DomainError::Unavailable(format!("store: {e}")))?;
        crate::adapters::sqlite::verify_connection(&pool)
            .await
            .map_err(|e| DomainError::Unavailable(format!("store: {e}")))?;
        Migrator::new(pool.clone()).run(all_migrations()).await?;
        Self::wire(root.to_path_buf(), config, pool, git)
    }

    /// Wire a coordinator over an existing pool (tests use an
    /// in-memory pool and the memory git backend).
    pub fn wire(
        root: PathBuf,
        config: Config,
        pool: sqlx::SqlitePool,
        git: Arc<dyn GitBackend>,
    ) -> DomainResult<Self> {
        let agents = Arc::new(SqliteAgentRepository::new(pool.clone()));
        let repos = Arc::new(SqliteRepoRepository::new(pool.clone()));
        let access_repo = Arc::new(SqliteAccessRepository::new(pool.clone()));
        let streams = Arc::new(SqliteStreamRepository::new(pool.clone()));
        let reviews = Arc::new(SqliteReviewRepository::new(pool.clone()));
        let tasks = Arc::new(SqliteTaskRepository::new(pool.clone()));
        let councils = Arc::new(SqliteCouncilRepository::new(pool.clone()));
        let queue = Arc::new(SqliteMergeQueueRepository::new(pool.clone()));
        let activity_repo = Arc::new(SqliteActivityRepository::new(pool.clone()));

        let activity = Arc::new(ActivityLog::new(activity_repo));
        let karma = Arc::new(KarmaService::new(agents.clone(), activity.clone()));
        let worktree_root = config.worktree_root(&root);

        let sync_repo: Option<Arc<SqliteSyncRepository>> = if config.sync.enabled {
            Some(Arc::new(SqliteSyncRepository::new(pool.clone())))
        } else {
            None
        };
        let sync = match (&sync_repo, config.sync.enabled) {
            (Some(repo), true) if !config.sync.server_url.is_empty() => {
                let client = Arc::new(SyncClient::new(SyncClientConfig::new(
                    config.sync.server_url.clone(),
                    config.sync.api_key.clone(),
                ))?);
                Some(Arc::new(SyncService::new(repo.clone(), client, pool.clone())))
            }
            _ => None,
        };

        let tracker = Arc::new(StreamTracker::new(
            streams.clone(),
            reviews,
            access_repo.clone(),
            agents.clone(),
            git.clone(),
            activity.clone(),
            worktree_root.clone(),
        ));
        let stage = Arc::new(StageEngine::new(
            repos.clone(),
            streams.clone(),
            access_repo.clone(),
            councils.clone(),
            activity.clone(),
        ));
        let merge = Arc::new(MergeService::new(
            queue,
            streams.clone(),
            repos.clone(),
            git,
            tracker.clone(),
            karma.clone(),
            stage.clone(),
            activity.clone(),
            sync_repo.clone().map(|r| r as _),
            worktree_root,
        ));
        let council = CouncilService::new(
            councils,
            access_repo.clone(),
            repos.clone(),
            merge.clone(),
            stage.clone(),
            activity.clone(),
        );
        let market = TaskMarket::new(
            tasks,
            karma.clone(),
            activity.clone(),
            sync_repo.map(|r| r as _),
        );

        Ok(Self {
            root,
            identity: IdentityService::new(agents.clone()),
            access: AccessService::new(access_repo.clone()),
            agents,
            repos,
            access_repo,
            streams,
            karma,
            tracker,
            merge,
            council,
            market,
            stage,
            activity,
            limiter: RateLimiter::new(default_limits()),
            sync,
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn activity_log(&self) -> Arc<ActivityLog> {
        self.activity.clone()
    }

    pub fn merge_service(&self) -> Arc<MergeService> {
        self.merge.clone()
    }

    fn limit_key(ctx: &AgentContext) -> Option<(Uuid, i64)> {
        Some((ctx.agent.id, ctx.agent.karma))
    }

    // ----- identity -----

    pub async fn register_agent(
        &self,
        name: &str,
        bio: Option<String>,
    ) -> DomainResult<Registration> {
        self.limiter.enforce("register", None)?;
        let registration = self.identity.register(name, bio).await?;
        self.activity
            .record(ActivityEvent::new(
                Some(registration.agent.id),
                "agent_registered",
                "agent",
                registration.agent.id,
            ))
            .await;

        // An ownerless configured repository adopts its first agent as
        // owner, so a freshly initialized deployment can govern itself.
        if let Ok(repo) = self.default_repository().await {
            if self.access_repo.list_maintainers(repo.id).await?.is_empty() {
                self.access_repo
                    .add_maintainer(&Maintainer {
                        repo_id: repo.id,
                        agent_id: registration.agent.id,
                        role: MaintainerRole::Owner,
                        added_at: Utc::now(),
                    })
                    .await?;
                info!(agent = %registration.agent.name, repo = %repo.name, "first agent adopted as owner");
            }
        }
        Ok(registration)
    }

    /// Create the repository record during `init`, before any agent
    /// exists to own it. The first registered agent becomes owner.
    pub async fn bootstrap_repository(&self, name: &str) -> DomainResult<Repository> {
        let repo = Repository::new(name);
        self.repos.create(&repo).await?;
        self.activity
            .record(ActivityEvent::new(None, "repo_created", "repository", repo.id))
            .await;
        Ok(repo)
    }

    pub async fn context_by_name(&self, name: &str) -> DomainResult<AgentContext> {
        self.identity.context_by_name(name).await
    }

    pub async fn authenticate(&self, token: &str) -> DomainResult<AgentContext> {
        self.identity.authenticate(token).await
    }

    pub async fn get_agent(&self, name: &str) -> DomainResult<Agent> {
        self.agents
            .get_by_name(name)
            .await?
            .ok_or_else(|| DomainError::not_found("agent", name))
    }

    pub async fn list_agents(&self) -> DomainResult<Vec<Agent>> {
        self.agents.list().await
    }

    /// Administrative account status change; requires settings access
    /// on the repository whose governance the administrator wields.
    pub async fn set_agent_status(
        &self,
        ctx: &AgentContext,
        repo_id: Uuid,
        target_name: &str,
        status: AgentStatus,
    ) -> DomainResult<()> {
        let repo = self.repository(repo_id).await?;
        self.access.can_perform(&ctx.agent, &repo, RepoAction::Settings).await?;
        let target = self.get_agent(target_name).await?;
        self.agents.set_status(target.id, status).await?;
        self.activity
            .record(
                ActivityEvent::new(Some(ctx.agent.id), "agent_status_changed", "agent", target.id)
                    .with_metadata(serde_json::json!({ "status": status.as_str() })),
            )
            .await;
        self.enqueue_sync(
            SyncEventType::AgentStatus,
            serde_json::json!({
                "agent_id": target.id.to_string(),
                "status": status.as_str(),
            }),
        )
        .await;
        Ok(())
    }

    pub async fn update_bio(&self, ctx: &AgentContext, bio: Option<&str>) -> DomainResult<()> {
        self.agents.update_bio(ctx.agent.id, bio).await
    }

    // ----- repositories -----

    /// Create a repository: persist the row, make the creator its
    /// owner, and cut the buffer branch.
    pub async fn create_repository(
        &self,
        ctx: &AgentContext,
        name: &str,
        patch: RepoSettingsPatch,
    ) -> DomainResult<Repository> {
        self.limiter.enforce("query", Self::limit_key(ctx))?;
        patch.validate().map_err(DomainError::Validation)?;

        let mut repo = Repository::new(name);
        patch.apply(&mut repo);
        self.repos.create(&repo).await?;
        self.access_repo
            .add_maintainer(&Maintainer {
                repo_id: repo.id,
                agent_id: ctx.agent.id,
                role: MaintainerRole::Owner,
                added_at: Utc::now(),
            })
            .await?;

        info!(repo = %repo.name, "repository created");
        self.activity
            .record(ActivityEvent::new(Some(ctx.agent.id), "repo_created", "repository", repo.id))
            .await;
        Ok(repo)
    }

    pub async fn repository(&self, id: Uuid) -> DomainResult<Repository> {
        self.repos.get(id).await?.ok_or_else(|| DomainError::not_found("repository", id))
    }

    pub async fn repository_by_name(&self, name: &str) -> DomainResult<Repository> {
        self.repos
            .get_by_name(name)
            .await?
            .ok_or_else(|| DomainError::not_found("repository", name))
    }

    /// The repository registered by `init` for this working copy.
    pub async fn default_repository(&self) -> DomainResult<Repository> {
        if self.config.repository.name.is_empty() {
            return Err(DomainError::Validation(
                "no repository configured; run init first".to_string(),
            ));
        }
        self.repository_by_name(&self.config.repository.name).await
    }

    pub async fn list_repositories(&self) -> DomainResult<Vec<Repository>> {
        self.repos.list().await
    }

    pub async fn update_settings(
        &self,
        ctx: &AgentContext,
        repo_id: Uuid,
        patch: RepoSettingsPatch,
    ) -> DomainResult<Repository> {
        let repo = self.repository(repo_id).await?;
        self.access.can_perform(&ctx.agent, &repo, RepoAction::Settings).await?;
        patch.validate().map_err(DomainError::Validation)?;

        let mut updated = repo.clone();
        patch.apply(&mut updated);
        self.repos.update(&updated).await?;

        self.activity
            .record(ActivityEvent::new(Some(ctx.agent.id), "config_changed", "repository", repo.id))
            .await;
        self.enqueue_sync(
            SyncEventType::ConfigChange,
            serde_json::json!({ "repo_id": repo.id.to_string() }),
        )
        .await;
        self.repository(repo_id).await
    }

    pub async fn grant_access(
        &self,
        ctx: &AgentContext,
        repo_id: Uuid,
        agent_name: &str,
        level: AccessLevel,
        expires_at: Option<chrono::DateTime<Utc>>,
    ) -> DomainResult<()> {
        let repo = self.repository(repo_id).await?;
        self.access.can_perform(&ctx.agent, &repo, RepoAction::Settings).await?;
        let target = self.get_agent(agent_name).await?;

        self.access_repo
            .upsert_grant(&AccessGrant {
                repo_id,
                agent_id: target.id,
                level,
                expires_at,
                granted_at: Utc::now(),
            })
            .await?;
        self.activity
            .record(
                ActivityEvent::new(Some(ctx.agent.id), "access_granted", "repository", repo_id)
                    .with_metadata(serde_json::json!({
                        "agent_id": target.id.to_string(),
                        "level": level.as_str(),
                    })),
            )
            .await;
        self.enqueue_sync(
            SyncEventType::AccessChange,
            serde_json::json!({
                "repo_id": repo_id.to_string(),
                "agent_id": target.id.to_string(),
                "level": level.as_str(),
            }),
        )
        .await;
        Ok(())
    }

    /// Direct maintainer appointment. Owner seats need admin access.
    pub async fn add_maintainer(
        &self,
        ctx: &AgentContext,
        repo_id: Uuid,
        agent_name: &str,
        role: MaintainerRole,
    ) -> DomainResult<()> {
        let repo = self.repository(repo_id).await?;
        let action =
            if role == MaintainerRole::Owner { RepoAction::Delete } else { RepoAction::Settings };
        self.access.can_perform(&ctx.agent, &repo, action).await?;
        let target = self.get_agent(agent_name).await?;

        self.access_repo
            .add_maintainer(&Maintainer {
                repo_id,
                agent_id: target.id,
                role,
                added_at: Utc::now(),
            })
            .await?;
        self.activity
            .record(
                ActivityEvent::new(Some(ctx.agent.id), "maintainer_added", "repository", repo_id)
                    .with_metadata(serde_json::json!({
                        "agent_id": target.id.to_string(),
                        "role": role.as_str(),
                    })),
            )
            .await;
        Ok(())
    }

    /// Demotion guard: the last owner can never be removed.
    pub async fn remove_maintainer(
        &self,
        ctx: &AgentContext,
        repo_id: Uuid,
        agent_name: &str,
    ) -> DomainResult<()> {
        let repo = self.repository(repo_id).await?;
        self.access.can_perform(&ctx.agent, &repo, RepoAction::Delete).await?;
        let target = self.get_agent(agent_name).await?;

        if let Some(maintainer) = self.access_repo.get_maintainer(repo_id, target.id).await? {
            if maintainer.role == MaintainerRole::Owner {
                let owners =
                    self.access_repo.count_with_role(repo_id, MaintainerRole::Owner).await?;
                if owners <= 1 {
                    return Err(DomainError::Conflict(
                        "repositories must keep at least one owner".to_string(),
                    ));
                }
            }
        }
        self.access_repo.remove_maintainer(repo_id, target.id).await
    }

    pub async fn maintainers(&self, repo_id: Uuid) -> DomainResult<Vec<Maintainer>> {
        self.access_repo.list_maintainers(repo_id).await
    }

    /// Effective access for an agent against a repository.
    pub async fn resolve_permissions(
        &self,
        agent_name: &str,
        repo_id: Uuid,
    ) -> DomainResult<crate::domain::models::ResolvedPermission> {
        let agent = self.get_agent(agent_name).await?;
        let repo = self.repository(repo_id).await?;
        self.access.resolve_permissions(&agent, &repo).await
    }

    pub async fn create_branch_rule(
        &self,
        ctx: &AgentContext,
        repo_id: Uuid,
        pattern: &str,
        direct_push: DirectPush,
        required_approvals: u32,
        require_tests_pass: bool,
        priority: i64,
    ) -> DomainResult<BranchRule> {
        let repo = self.repository(repo_id).await?;
        self.access.can_perform(&ctx.agent, &repo, RepoAction::Settings).await?;

        let rule = BranchRule {
            id: Uuid::new_v4(),
            repo_id,
            pattern: pattern.to_string(),
            direct_push,
            required_approvals,
            require_tests_pass,
            priority,
        };
        self.access_repo.create_branch_rule(&rule).await?;
        Ok(rule)
    }

    // ----- streams and workspaces -----

    pub async fn create_workspace(
        &self,
        ctx: &AgentContext,
        repo_id: Uuid,
        opts: StreamOptions,
    ) -> DomainResult<(Stream, WorktreeBinding)> {
        self.limiter.enforce("commit", Self::limit_key(ctx))?;
        let repo = self.repository(repo_id).await?;
        self.access.can_perform(&ctx.agent, &repo, RepoAction::Write).await?;
        self.tracker.create_workspace(&ctx.agent, &repo, opts).await
    }

    pub async fn destroy_workspace(
        &self,
        ctx: &AgentContext,
        repo_id: Uuid,
        abandon_stream: bool,
    ) -> DomainResult<()> {
        let repo = self.repository(repo_id).await?;
        self.tracker.destroy_workspace(&ctx.agent, &repo, abandon_stream).await
    }

    pub async fn list_worktrees(&self, repo_id: Uuid) -> DomainResult<Vec<WorktreeBinding>> {
        self.streams.list_worktrees(repo_id).await
    }

    /// Commit the agent's workspace. In swarm mode the stream
    /// auto-queues for the buffer and the queue drains inline.
    pub async fn commit(
        &self,
        ctx: &AgentContext,
        repo_id: Uuid,
        message: &str,
    ) -> DomainResult<(Stream, String)> {
        self.limiter.enforce("commit", Self::limit_key(ctx))?;
        let repo = self.repository(repo_id).await?;
        self.access.can_perform(&ctx.agent, &repo, RepoAction::Write).await?;

        let (stream, outcome) = self.tracker.commit(&ctx.agent, &repo, message).await?;
        if !self.access.can_push_to_branch(&ctx.agent, &repo, &stream.branch_ref).await? {
            // The commit landed on the stream branch; pushing it out is
            // what branch rules guard. Surfacing the denial here keeps
            // protected prefixes locked even for stream naming tricks.
            return Err(DomainError::Permission(format!(
                "branch {} is protected against direct pushes",
                stream.branch_ref
            )));
        }

        if StreamTracker::auto_queues_on_commit(&repo) {
            self.merge
                .request_merge(ctx.agent.id, stream.id, MergeRequestOptions::default())
                .await?;
            let cancel = CancellationToken::new();
            self.merge.drain(repo.id, &cancel).await?;
        }
        Ok((stream, outcome.commit_hash))
    }

    pub async fn stream(&self, stream_id: Uuid) -> DomainResult<Stream> {
        self.streams
            .get(stream_id)
            .await?
            .ok_or_else(|| DomainError::not_found("stream", stream_id))
    }

    pub async fn list_streams(&self, filter: StreamFilter) -> DomainResult<Vec<Stream>> {
        self.streams.list(filter).await
    }

    pub async fn stream_diff(&self, stream_id: Uuid) -> DomainResult<String> {
        let stream = self.stream(stream_id).await?;
        self.tracker.diff(&stream).await
    }

    pub async fn submit_stream_for_review(
        &self,
        ctx: &AgentContext,
        stream_id: Uuid,
    ) -> DomainResult<Stream> {
        let stream = self.stream(stream_id).await?;
        if stream.agent_id != ctx.agent.id {
            return Err(DomainError::Permission(
                "only the stream author may submit it for review".to_string(),
            ));
        }
        self.tracker.submit_for_review(stream_id).await
    }

    // ----- reviews and consensus -----

    pub async fn submit_review(
        &self,
        ctx: &AgentContext,
        stream_id: Uuid,
        verdict: ReviewVerdict,
        feedback: Option<String>,
        tested: bool,
        is_human: bool,
    ) -> DomainResult<(Review, ConsensusDecision)> {
        self.limiter.enforce("review", Self::limit_key(ctx))?;
        let stream = self.stream(stream_id).await?;
        let repo = self.repository(stream.repo_id).await?;
        self.access.can_perform(&ctx.agent, &repo, RepoAction::Read).await?;

        let submitted = self
            .tracker
            .submit_review(&ctx.agent, &repo, stream_id, verdict, feedback, tested, is_human)
            .await?;
        if submitted.award_karma {
            self.karma.award(ctx.agent.id, REVIEW_AWARD, "review_submitted").await?;
        }
        self.enqueue_sync(
            SyncEventType::Review,
            serde_json::json!({
                "stream_id": stream_id.to_string(),
                "reviewer_id": ctx.agent.id.to_string(),
                "verdict": verdict.as_str(),
            }),
        )
        .await;
        Ok((submitted.review, submitted.consensus))
    }

    pub async fn check_consensus(&self, stream_id: Uuid) -> DomainResult<ConsensusDecision> {
        let stream = self.stream(stream_id).await?;
        let repo = self.repository(stream.repo_id).await?;
        self.tracker.compute_consensus(&stream, &repo).await
    }

    pub async fn reviews_for_stream(&self, stream_id: Uuid) -> DomainResult<Vec<Review>> {
        let stream = self.stream(stream_id).await?;
        self.tracker.reviews_for_stream(stream.id).await
    }

    // ----- merging, stabilization, promotion -----

    /// Request a merge and drive the repository's queue to completion.
    pub async fn request_merge(
        &self,
        ctx: &AgentContext,
        stream_id: Uuid,
    ) -> DomainResult<MergeQueueEntry> {
        self.limiter.enforce("merge_request", Self::limit_key(ctx))?;
        let stream = self.stream(stream_id).await?;
        let repo = self.repository(stream.repo_id).await?;
        self.access.can_perform(&ctx.agent, &repo, RepoAction::Merge).await?;

        // With a server-side consensus authority the local decision is
        // advisory; the authoritative answer comes over the wire.
        if repo.consensus_authority == ConsensusAuthority::Server && self.sync.is_some() {
            // The client re-queries the authoritative site before acting.
            let decision = self.remote_consensus(stream_id).await?;
            if !decision.reached {
                return Err(DomainError::Consensus(decision.reason.as_str().to_string()));
            }
        }

        let entry = self
            .merge
            .request_merge(ctx.agent.id, stream_id, MergeRequestOptions::default())
            .await?;
        let cancel = CancellationToken::new();
        self.merge.drain(repo.id, &cancel).await?;
        self.merge
            .get_entry(entry.id)
            .await?
            .ok_or_else(|| DomainError::not_found("merge queue entry", entry.id))
    }

    async fn remote_consensus(&self, stream_id: Uuid) -> DomainResult<ConsensusDecision> {
        let sync = self
            .sync
            .as_ref()
            .ok_or_else(|| DomainError::Unavailable("sync is not configured".to_string()))?;
        sync.remote_consensus(stream_id).await
    }

    pub async fn stabilize(
        &self,
        ctx: &AgentContext,
        repo_id: Uuid,
    ) -> DomainResult<StabilizationOutcome> {
        let repo = self.repository(repo_id).await?;
        self.access.can_perform(&ctx.agent, &repo, RepoAction::Settings).await?;
        let cancel = CancellationToken::new();
        self.merge.stabilize(repo_id, &cancel).await
    }

    pub async fn promote(&self, ctx: &AgentContext, repo_id: Uuid) -> DomainResult<String> {
        let repo = self.repository(repo_id).await?;
        self.access.can_perform(&ctx.agent, &repo, RepoAction::Settings).await?;
        self.merge.promote(repo_id).await
    }

    pub async fn merge_queue(&self, repo_id: Uuid) -> DomainResult<Vec<MergeQueueEntry>> {
        self.merge.list_queue(repo_id).await
    }

    // ----- task market -----

    pub async fn create_task(
        &self,
        ctx: &AgentContext,
        repo_id: Uuid,
        title: &str,
        description: Option<String>,
        priority: TaskPriority,
        amount: i64,
    ) -> DomainResult<Task> {
        self.limiter.enforce("task", Self::limit_key(ctx))?;
        let repo = self.repository(repo_id).await?;
        self.access.can_perform(&ctx.agent, &repo, RepoAction::Read).await?;
        self.market.create_task(&ctx.agent, repo_id, title, description, priority, amount).await
    }

    pub async fn list_tasks(&self, filter: TaskFilter) -> DomainResult<Vec<Task>> {
        self.market.list_tasks(filter).await
    }

    pub async fn claim_task(
        &self,
        ctx: &AgentContext,
        task_id: Uuid,
        stream_id: Option<Uuid>,
        notes: Option<String>,
    ) -> DomainResult<Claim> {
        self.limiter.enforce("task", Self::limit_key(ctx))?;
        let task = self.market.get_task(task_id).await?;
        let repo = self.repository(task.repo_id).await?;
        self.access.can_perform(&ctx.agent, &repo, RepoAction::Write).await?;
        self.market.claim_task(&ctx.agent, task_id, stream_id, notes).await
    }

    pub async fn link_claim_to_stream(
        &self,
        ctx: &AgentContext,
        claim_id: Uuid,
        stream_id: Uuid,
    ) -> DomainResult<()> {
        let claim = self.market.get_claim(claim_id).await?;
        if claim.agent_id != ctx.agent.id {
            return Err(DomainError::Permission("not your claim".to_string()));
        }
        self.market.link_claim_to_stream(claim_id, stream_id).await
    }

    pub async fn submit_claim(
        &self,
        ctx: &AgentContext,
        claim_id: Uuid,
        notes: Option<String>,
    ) -> DomainResult<Claim> {
        self.market.submit_claim(&ctx.agent, claim_id, notes).await
    }

    /// Claim review: maintain-level access or task authorship.
    pub async fn review_claim(
        &self,
        ctx: &AgentContext,
        claim_id: Uuid,
        decision: ClaimDecision,
    ) -> DomainResult<Claim> {
        let claim = self.market.get_claim(claim_id).await?;
        let task = self.market.get_task(claim.task_id).await?;
        let repo = self.repository(task.repo_id).await?;

        let is_creator = task.creator_id == Some(ctx.agent.id);
        if !is_creator {
            self.access.can_perform(&ctx.agent, &repo, RepoAction::Settings).await?;
        }
        self.market.review_claim(&ctx.agent, claim_id, decision).await
    }

    pub async fn abandon_claim(&self, ctx: &AgentContext, claim_id: Uuid) -> DomainResult<()> {
        self.market.abandon_claim(&ctx.agent, claim_id).await
    }

    pub async fn cancel_task(&self, ctx: &AgentContext, task_id: Uuid) -> DomainResult<()> {
        let task = self.market.get_task(task_id).await?;
        let repo = self.repository(task.repo_id).await?;
        if task.creator_id != Some(ctx.agent.id) {
            self.access.can_perform(&ctx.agent, &repo, RepoAction::Settings).await?;
        }
        self.market.cancel_task(&ctx.agent, task_id).await
    }

    pub async fn claims_for_task(&self, task_id: Uuid) -> DomainResult<Vec<Claim>> {
        self.market.claims_for_task(task_id).await
    }

    pub async fn task(&self, task_id: Uuid) -> DomainResult<Task> {
        self.market.get_task(task_id).await
    }

    // ----- council -----

    pub async fn create_council(
        &self,
        ctx: &AgentContext,
        repo_id: Uuid,
        params: CouncilParams,
    ) -> DomainResult<Council> {
        self.limiter.enforce("council", Self::limit_key(ctx))?;
        let repo = self.repository(repo_id).await?;
        self.access.can_perform(&ctx.agent, &repo, RepoAction::Settings).await?;
        self.council.create_council(&ctx.agent, &repo, params).await
    }

    pub async fn council_for_repo(&self, repo_id: Uuid) -> DomainResult<Option<Council>> {
        self.council.get_by_repo(repo_id).await
    }

    pub async fn council_members(&self, council_id: Uuid) -> DomainResult<Vec<CouncilMember>> {
        self.council.members(council_id).await
    }

    pub async fn add_council_member(
        &self,
        ctx: &AgentContext,
        council_id: Uuid,
        agent_name: &str,
        role: CouncilRole,
    ) -> DomainResult<CouncilMember> {
        let council = self.council.get(council_id).await?;
        let repo = self.repository(council.repo_id).await?;
        self.access.can_perform(&ctx.agent, &repo, RepoAction::Settings).await?;
        let target = self.get_agent(agent_name).await?;
        self.council.add_member(council_id, &target, role).await
    }

    pub async fn propose(
        &self,
        ctx: &AgentContext,
        council_id: Uuid,
        title: &str,
        action: ProposalAction,
        expires_in: Option<chrono::Duration>,
    ) -> DomainResult<Proposal> {
        self.limiter.enforce("council", Self::limit_key(ctx))?;
        self.council.propose(&ctx.agent, council_id, title, action, expires_in).await
    }

    pub async fn vote(
        &self,
        ctx: &AgentContext,
        proposal_id: Uuid,
        choice: VoteChoice,
    ) -> DomainResult<Proposal> {
        self.limiter.enforce("council", Self::limit_key(ctx))?;
        self.council.vote(&ctx.agent, proposal_id, choice).await
    }

    pub async fn proposals(
        &self,
        council_id: Uuid,
        status: Option<ProposalStatus>,
    ) -> DomainResult<Vec<Proposal>> {
        self.council.proposals(council_id, status).await
    }

    pub async fn proposal(&self, proposal_id: Uuid) -> DomainResult<Proposal> {
        self.council.get_proposal(proposal_id).await
    }

    // ----- stage engine -----

    pub async fn stage_report(&self, repo_id: Uuid) -> DomainResult<AdvancementReport> {
        let repo = self.repository(repo_id).await?;
        self.stage.check_advancement_eligibility(&repo).await
    }

    pub async fn advance_stage(
        &self,
        ctx: &AgentContext,
        repo_id: Uuid,
        force: bool,
    ) -> DomainResult<()> {
        let repo = self.repository(repo_id).await?;
        self.access.can_perform(&ctx.agent, &repo, RepoAction::Settings).await?;
        self.stage.advance_stage(&repo, force).await?;
        Ok(())
    }

    // ----- activity, status, sync -----

    pub async fn activity(&self, filter: &EventFilter, limit: u32) -> DomainResult<Vec<ActivityEvent>> {
        self.activity.query(filter, limit).await
    }

    pub async fn status_summary(&self, repo_id: Uuid) -> DomainResult<StatusSummary> {
        let repo = self.repository(repo_id).await?;
        let active = self.streams.count_by_status(repo.id, StreamStatus::Active).await?;
        let in_review = self.streams.count_by_status(repo.id, StreamStatus::InReview).await?;
        let merged = self.streams.count_by_status(repo.id, StreamStatus::Merged).await?;
        let pending = self
            .merge
            .list_queue(repo.id)
            .await?
            .iter()
            .filter(|e| !e.status.is_terminal())
            .count() as u32;
        let council = self.council.get_by_repo(repo.id).await?;
        let sync_backlog = match &self.sync {
            Some(sync) => Some(sync.pending_count().await?),
            None => None,
        };

        Ok(StatusSummary {
            repository: repo.name,
            stage: repo.stage.as_str().to_string(),
            active_streams: active,
            in_review_streams: in_review,
            merged_streams: merged,
            pending_merges: pending,
            contributor_count: repo.contributor_count,
            council_status: council.map(|c| c.status.as_str().to_string()),
            sync_backlog,
        })
    }

    /// Flush the outbound sync queue once (CLI-driven).
    pub async fn sync_flush(&self) -> DomainResult<()> {
        let sync = self
            .sync
            .as_ref()
            .ok_or_else(|| DomainError::Validation("sync is not enabled".to_string()))?;
        let cancel = CancellationToken::new();
        sync.flush_once(&cancel).await?;
        Ok(())
    }

    /// Pull config/permission/review/merge updates from the server.
    pub async fn sync_pull(&self) -> DomainResult<u32> {
        let sync = self
            .sync
            .as_ref()
            .ok_or_else(|| DomainError::Validation("sync is not enabled".to_string()))?;
        sync.pull_updates().await
    }

    async fn enqueue_sync(&self, event_type: SyncEventType, payload: serde_json::Value) {
        if let Some(ref sync) = self.sync {
            if let Err(e) = sync.enqueue(event_type, payload).await {
                tracing::warn!(error = %e, "sync enqueue failed");
            }
        }
    }
}
