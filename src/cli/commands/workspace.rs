//! Workspace commands: create, list, destroy, commit.

use serde::Serialize;

use crate::cli::output::{print, short_id, table, CommandOutput, Message};
use crate::domain::errors::DomainResult;
use crate::services::{Coordinator, StreamOptions};

use super::{resolve_stream, resolve_task};

#[derive(Serialize)]
pub struct WorkspaceOutput {
    pub stream_id: String,
    pub stream_name: String,
    pub branch: String,
    pub path: String,
}

impl CommandOutput for WorkspaceOutput {
    fn to_human(&self) -> String {
        format!(
            "workspace ready\nstream: {} ({})\nbranch: {}\npath:   {}",
            self.stream_name,
            short_id(&self.stream_id),
            self.branch,
            self.path
        )
    }
}

#[derive(Serialize)]
pub struct WorkspaceListOutput {
    pub worktrees: Vec<WorktreeRow>,
}

#[derive(Serialize)]
pub struct WorktreeRow {
    pub agent: String,
    pub stream: String,
    pub path: String,
}

impl CommandOutput for WorkspaceListOutput {
    fn to_human(&self) -> String {
        if self.worktrees.is_empty() {
            return "no worktrees".to_string();
        }
        let mut t = table(&["AGENT", "STREAM", "PATH"]);
        for row in &self.worktrees {
            t.add_row(vec![row.agent.clone(), row.stream.clone(), row.path.clone()]);
        }
        t.to_string()
    }
}

pub async fn handle_create(
    coordinator: &Coordinator,
    agent: &str,
    name: Option<String>,
    task: Option<String>,
    parent: Option<String>,
    json: bool,
) -> DomainResult<()> {
    let ctx = coordinator.context_by_name(agent).await?;
    let repo = coordinator.default_repository().await?;

    let task_id = match task {
        Some(ref t) => Some(resolve_task(coordinator, t).await?),
        None => None,
    };
    let parent_stream_id = match parent {
        Some(ref p) => Some(resolve_stream(coordinator, p).await?),
        None => None,
    };

    let (stream, binding) = coordinator
        .create_workspace(&ctx, repo.id, StreamOptions {
            name,
            base_branch: None,
            parent_stream_id,
            task_id,
        })
        .await?;

    print(
        &WorkspaceOutput {
            stream_id: stream.id.to_string(),
            stream_name: stream.name,
            branch: stream.branch_ref,
            path: binding.path,
        },
        json,
    );
    Ok(())
}

pub async fn handle_list(coordinator: &Coordinator, json: bool) -> DomainResult<()> {
    let repo = coordinator.default_repository().await?;
    let bindings = coordinator.list_worktrees(repo.id).await?;

    let mut rows = Vec::new();
    for binding in &bindings {
        let stream = coordinator.stream(binding.stream_id).await?;
        let agents = coordinator.list_agents().await?;
        let agent = agents
            .iter()
            .find(|a| a.id == binding.agent_id)
            .map_or_else(|| short_id(binding.agent_id), |a| a.name.clone());
        rows.push(WorktreeRow { agent, stream: stream.name, path: binding.path.clone() });
    }
    print(&WorkspaceListOutput { worktrees: rows }, json);
    Ok(())
}

pub async fn handle_destroy(
    coordinator: &Coordinator,
    agent: &str,
    abandon: bool,
    json: bool,
) -> DomainResult<()> {
    let ctx = coordinator.context_by_name(agent).await?;
    let repo = coordinator.default_repository().await?;
    coordinator.destroy_workspace(&ctx, repo.id, abandon).await?;
    print(&Message::new("workspace removed"), json);
    Ok(())
}

pub async fn handle_commit(
    coordinator: &Coordinator,
    agent: &str,
    message: &str,
    json: bool,
) -> DomainResult<()> {
    let ctx = coordinator.context_by_name(agent).await?;
    let repo = coordinator.default_repository().await?;
    let (stream, commit) = coordinator.commit(&ctx, repo.id, message).await?;
    print(
        &Message::new(format!(
            "committed {} on stream {} ({})",
            short_id(&commit),
            stream.name,
            short_id(stream.id)
        )),
        json,
    );
    Ok(())
}
