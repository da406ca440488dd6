//! Task market: tasks offered on a repository, claims, submissions,
//! and claim review with karma payout.

use chrono::Utc;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    ActivityEvent, Agent, Claim, ClaimStatus, SyncEventType, Task, TaskPriority, TaskStatus,
};
use crate::domain::ports::{SyncRepository, TaskFilter, TaskRepository};

use super::activity_log::ActivityLog;
use super::karma::KarmaService;

/// Review decision on a submitted claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimDecision {
    Approve,
    Reject,
}

pub struct TaskMarket {
    tasks: Arc<dyn TaskRepository>,
    karma: Arc<KarmaService>,
    activity: Arc<ActivityLog>,
    sync: Option<Arc<dyn SyncRepository>>,
}

impl TaskMarket {
    pub fn new(
        tasks: Arc<dyn TaskRepository>,
        karma: Arc<KarmaService>,
        activity: Arc<ActivityLog>,
        sync: Option<Arc<dyn SyncRepository>>,
    ) -> Self {
        Self { tasks, karma, activity, sync }
    }

    pub async fn create_task(
        &self,
        creator: &Agent,
        repo_id: Uuid,
        title: &str,
        description: Option<String>,
        priority: TaskPriority,
        amount: i64,
    ) -> DomainResult<Task> {
        if title.trim().is_empty() {
            return Err(DomainError::Validation("task title cannot be empty".to_string()));
        }
        if amount < 0 {
            return Err(DomainError::Validation("task amount cannot be negative".to_string()));
        }

        let mut task = Task::new(repo_id, title);
        task.description = description;
        task.priority = priority;
        task.amount = amount;
        task.creator_id = Some(creator.id);
        self.tasks.create(&task).await?;

        self.activity
            .record(
                ActivityEvent::new(Some(creator.id), "task_created", "task", task.id)
                    .with_metadata(serde_json::json!({ "amount": amount })),
            )
            .await;
        Ok(task)
    }

    pub async fn get_task(&self, task_id: Uuid) -> DomainResult<Task> {
        self.tasks.get(task_id).await?.ok_or_else(|| DomainError::not_found("task", task_id))
    }

    pub async fn list_tasks(&self, filter: TaskFilter) -> DomainResult<Vec<Task>> {
        self.tasks.list(filter).await
    }

    /// Claim an open task. Creators cannot claim their own tasks, and
    /// an agent holds at most one open claim per task.
    #[instrument(skip(self, claimer), fields(task = %task_id, agent = %claimer.name))]
    pub async fn claim_task(
        &self,
        claimer: &Agent,
        task_id: Uuid,
        stream_id: Option<Uuid>,
        notes: Option<String>,
    ) -> DomainResult<Claim> {
        let mut task = self.get_task(task_id).await?;

        if task.status != TaskStatus::Open {
            return Err(DomainError::Conflict(format!(
                "task is {}, only open tasks can be claimed",
                task.status.as_str()
            )));
        }
        if task.creator_id == Some(claimer.id) {
            return Err(DomainError::Validation(
                "task creators cannot claim their own task".to_string(),
            ));
        }
        if self.tasks.find_open_claim(task_id, claimer.id).await?.is_some() {
            return Err(DomainError::Conflict(
                "agent already has an open claim on this task".to_string(),
            ));
        }

        let mut claim = Claim::new(task_id, claimer.id);
        claim.stream_id = stream_id;
        claim.notes = notes;
        self.tasks.create_claim(&claim).await?;

        task.status = TaskStatus::Claimed;
        task.updated_at = Utc::now();
        self.tasks.update(&task).await?;

        info!(claim = %claim.id, "task claimed");
        self.activity
            .record(ActivityEvent::new(Some(claimer.id), "task_claimed", "task", task_id))
            .await;
        self.enqueue_sync(
            SyncEventType::TaskClaim,
            serde_json::json!({
                "task_id": task_id.to_string(),
                "claim_id": claim.id.to_string(),
                "agent_id": claimer.id.to_string(),
            }),
        )
        .await;
        Ok(claim)
    }

    /// Attach a stream to a claim after the fact.
    pub async fn link_claim_to_stream(&self, claim_id: Uuid, stream_id: Uuid) -> DomainResult<()> {
        let mut claim = self.get_claim(claim_id).await?;
        if claim.status.is_terminal() {
            return Err(DomainError::Conflict(format!("claim is {}", claim.status.as_str())));
        }
        claim.stream_id = Some(stream_id);
        self.tasks.update_claim(&claim).await
    }

    /// Submit a claim for review.
    pub async fn submit_claim(
        &self,
        submitter: &Agent,
        claim_id: Uuid,
        notes: Option<String>,
    ) -> DomainResult<Claim> {
        let mut claim = self.get_claim(claim_id).await?;
        if claim.agent_id != submitter.id {
            return Err(DomainError::Permission(
                "only the claim holder may submit it".to_string(),
            ));
        }
        if claim.status != ClaimStatus::Active {
            return Err(DomainError::Conflict(format!(
                "claim is {}, only active claims can be submitted",
                claim.status.as_str()
            )));
        }

        claim.status = ClaimStatus::Submitted;
        claim.submitted_at = Some(Utc::now());
        if notes.is_some() {
            claim.notes = notes;
        }
        self.tasks.update_claim(&claim).await?;

        let mut task = self.get_task(claim.task_id).await?;
        task.status = TaskStatus::Submitted;
        task.updated_at = Utc::now();
        self.tasks.update(&task).await?;

        self.activity
            .record(ActivityEvent::new(Some(submitter.id), "claim_submitted", "task", claim.task_id))
            .await;
        self.enqueue_sync(
            SyncEventType::TaskSubmission,
            serde_json::json!({
                "task_id": claim.task_id.to_string(),
                "claim_id": claim.id.to_string(),
            }),
        )
        .await;
        Ok(claim)
    }

    /// Review a submitted claim. Approval completes the task and pays
    /// the karma bounty; rejection reopens the task for others.
    ///
    /// Caller must have verified the reviewer holds maintain access or
    /// created the task.
    #[instrument(skip(self, reviewer), fields(claim = %claim_id))]
    pub async fn review_claim(
        &self,
        reviewer: &Agent,
        claim_id: Uuid,
        decision: ClaimDecision,
    ) -> DomainResult<Claim> {
        let mut claim = self.get_claim(claim_id).await?;
        if claim.status != ClaimStatus::Submitted {
            return Err(DomainError::Conflict(format!(
                "claim is {}, only submitted claims can be reviewed",
                claim.status.as_str()
            )));
        }

        let mut task = self.get_task(claim.task_id).await?;
        claim.reviewed_at = Some(Utc::now());
        task.updated_at = Utc::now();

        match decision {
            ClaimDecision::Approve => {
                claim.status = ClaimStatus::Approved;
                task.status = TaskStatus::Completed;
                self.tasks.update_claim(&claim).await?;
                self.tasks.update(&task).await?;

                let award = task.karma_award();
                if award > 0 {
                    self.karma.award(claim.agent_id, award, "task_approved").await?;
                }

                info!(task = %task.id, award, "claim approved");
                self.activity
                    .record(
                        ActivityEvent::new(Some(reviewer.id), "claim_approved", "task", task.id)
                            .with_metadata(serde_json::json!({ "karma_award": award })),
                    )
                    .await;
            }
            ClaimDecision::Reject => {
                claim.status = ClaimStatus::Rejected;
                // The task reopens so another agent can try.
                task.status = TaskStatus::Open;
                self.tasks.update_claim(&claim).await?;
                self.tasks.update(&task).await?;

                self.activity
                    .record(ActivityEvent::new(Some(reviewer.id), "claim_rejected", "task", task.id))
                    .await;
            }
        }
        Ok(claim)
    }

    /// Abandon an active claim, reopening the task.
    pub async fn abandon_claim(&self, holder: &Agent, claim_id: Uuid) -> DomainResult<()> {
        let mut claim = self.get_claim(claim_id).await?;
        if claim.agent_id != holder.id {
            return Err(DomainError::Permission("only the claim holder may abandon it".to_string()));
        }
        if claim.status.is_terminal() {
            return Err(DomainError::Conflict(format!("claim is {}", claim.status.as_str())));
        }

        claim.status = ClaimStatus::Abandoned;
        self.tasks.update_claim(&claim).await?;

        let mut task = self.get_task(claim.task_id).await?;
        if !task.status.is_terminal() {
            task.status = TaskStatus::Open;
            task.updated_at = Utc::now();
            self.tasks.update(&task).await?;
        }
        Ok(())
    }

    /// Cancel a task outright (creator or maintainer path; the caller
    /// checks permissions).
    pub async fn cancel_task(&self, actor: &Agent, task_id: Uuid) -> DomainResult<()> {
        let mut task = self.get_task(task_id).await?;
        if task.status.is_terminal() {
            return Err(DomainError::Conflict(format!("task is {}", task.status.as_str())));
        }
        task.status = TaskStatus::Cancelled;
        task.updated_at = Utc::now();
        self.tasks.update(&task).await?;
        self.activity
            .record(ActivityEvent::new(Some(actor.id), "task_cancelled", "task", task_id))
            .await;
        Ok(())
    }

    pub async fn get_claim(&self, claim_id: Uuid) -> DomainResult<Claim> {
        self.tasks.get_claim(claim_id).await?.ok_or_else(|| DomainError::not_found("claim", claim_id))
    }

    pub async fn claims_for_task(&self, task_id: Uuid) -> DomainResult<Vec<Claim>> {
        self.tasks.list_claims_for_task(task_id).await
    }

    async fn enqueue_sync(&self, event_type: SyncEventType, payload: serde_json::Value) {
        if let Some(ref sync) = self.sync {
            if let Err(e) = sync.enqueue(event_type, &payload).await {
                tracing::warn!(error = %e, "sync enqueue failed");
            }
        }
    }
}
