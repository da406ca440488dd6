//! Task market commands.

use serde::Serialize;

use crate::cli::output::{print, short_id, table, truncate, CommandOutput, Message};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Task, TaskPriority, TaskStatus};
use crate::domain::ports::TaskFilter;
use crate::services::{ClaimDecision, Coordinator};

use super::{resolve_claim, resolve_stream, resolve_task};

#[derive(Serialize)]
pub struct TaskOutput {
    pub id: String,
    pub title: String,
    pub status: String,
    pub priority: String,
    pub amount: i64,
}

impl From<&Task> for TaskOutput {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id.to_string(),
            title: task.title.clone(),
            status: task.status.as_str().to_string(),
            priority: task.priority.as_str().to_string(),
            amount: task.amount,
        }
    }
}

impl CommandOutput for TaskOutput {
    fn to_human(&self) -> String {
        format!(
            "task {} ({}) [{} / {}] bounty {}",
            self.title,
            short_id(&self.id),
            self.status,
            self.priority,
            self.amount
        )
    }
}

#[derive(Serialize)]
pub struct TaskListOutput {
    pub tasks: Vec<TaskOutput>,
}

impl CommandOutput for TaskListOutput {
    fn to_human(&self) -> String {
        if self.tasks.is_empty() {
            return "no tasks".to_string();
        }
        let mut t = table(&["ID", "TITLE", "STATUS", "PRIORITY", "BOUNTY"]);
        for task in &self.tasks {
            t.add_row(vec![
                short_id(&task.id),
                truncate(&task.title, 40),
                task.status.clone(),
                task.priority.clone(),
                task.amount.to_string(),
            ]);
        }
        t.to_string()
    }
}

#[allow(clippy::too_many_arguments)]
pub async fn handle_create(
    coordinator: &Coordinator,
    title: &str,
    agent: &str,
    description: Option<String>,
    priority: &str,
    amount: i64,
    json: bool,
) -> DomainResult<()> {
    let priority = TaskPriority::from_str(priority)
        .ok_or_else(|| DomainError::Validation(format!("unknown priority '{priority}'")))?;
    let ctx = coordinator.context_by_name(agent).await?;
    let repo = coordinator.default_repository().await?;
    let task =
        coordinator.create_task(&ctx, repo.id, title, description, priority, amount).await?;
    print(&TaskOutput::from(&task), json);
    Ok(())
}

pub async fn handle_list(
    coordinator: &Coordinator,
    status: Option<String>,
    json: bool,
) -> DomainResult<()> {
    let repo = coordinator.default_repository().await?;
    let status = match status {
        Some(ref s) => Some(
            TaskStatus::from_str(s)
                .ok_or_else(|| DomainError::Validation(format!("unknown status '{s}'")))?,
        ),
        None => None,
    };
    let tasks =
        coordinator.list_tasks(TaskFilter { repo_id: Some(repo.id), status }).await?;
    print(&TaskListOutput { tasks: tasks.iter().map(Into::into).collect() }, json);
    Ok(())
}

pub async fn handle_claim(
    coordinator: &Coordinator,
    task: &str,
    agent: &str,
    stream: Option<String>,
    json: bool,
) -> DomainResult<()> {
    let ctx = coordinator.context_by_name(agent).await?;
    let task_id = resolve_task(coordinator, task).await?;
    let stream_id = match stream {
        Some(ref s) => Some(resolve_stream(coordinator, s).await?),
        None => None,
    };
    let claim = coordinator.claim_task(&ctx, task_id, stream_id, None).await?;
    print(&Message::new(format!("claimed task as {}", short_id(claim.id))), json);
    Ok(())
}

pub async fn handle_submit(
    coordinator: &Coordinator,
    claim: &str,
    agent: &str,
    notes: Option<String>,
    json: bool,
) -> DomainResult<()> {
    let ctx = coordinator.context_by_name(agent).await?;
    let claim_id = resolve_claim(coordinator, claim).await?;
    coordinator.submit_claim(&ctx, claim_id, notes).await?;
    print(&Message::new("claim submitted for review"), json);
    Ok(())
}

pub async fn handle_review(
    coordinator: &Coordinator,
    claim: &str,
    agent: &str,
    approve: bool,
    reject: bool,
    json: bool,
) -> DomainResult<()> {
    if approve == reject {
        return Err(DomainError::Validation(
            "pass exactly one of --approve or --reject".to_string(),
        ));
    }
    let ctx = coordinator.context_by_name(agent).await?;
    let claim_id = resolve_claim(coordinator, claim).await?;
    let decision = if approve { ClaimDecision::Approve } else { ClaimDecision::Reject };
    let claim = coordinator.review_claim(&ctx, claim_id, decision).await?;
    print(&Message::new(format!("claim {}", claim.status.as_str())), json);
    Ok(())
}
