//! Stream commands.

use serde::Serialize;

use crate::cli::output::{print, short_id, table, truncate, CommandOutput};
use crate::domain::errors::DomainResult;
use crate::domain::models::{Stream, StreamStatus};
use crate::domain::ports::StreamFilter;
use crate::services::Coordinator;

use super::resolve_stream;

#[derive(Serialize)]
pub struct StreamOutput {
    pub id: String,
    pub name: String,
    pub agent_id: String,
    pub branch: String,
    pub base: String,
    pub parent: Option<String>,
    pub status: String,
    pub review_status: String,
}

impl From<&Stream> for StreamOutput {
    fn from(stream: &Stream) -> Self {
        Self {
            id: stream.id.to_string(),
            name: stream.name.clone(),
            agent_id: stream.agent_id.to_string(),
            branch: stream.branch_ref.clone(),
            base: stream.base_branch.clone(),
            parent: stream.parent_stream_id.map(|id| id.to_string()),
            status: stream.status.as_str().to_string(),
            review_status: stream.review_status.as_str().to_string(),
        }
    }
}

impl CommandOutput for StreamOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![
            format!("stream: {} ({})", self.name, short_id(&self.id)),
            format!("branch: {} (base {})", self.branch, self.base),
            format!("status: {} / review {}", self.status, self.review_status),
        ];
        if let Some(ref parent) = self.parent {
            lines.push(format!("parent: {}", short_id(parent)));
        }
        lines.join("\n")
    }
}

#[derive(Serialize)]
pub struct StreamListOutput {
    pub streams: Vec<StreamOutput>,
}

impl CommandOutput for StreamListOutput {
    fn to_human(&self) -> String {
        if self.streams.is_empty() {
            return "no streams".to_string();
        }
        let mut t = table(&["ID", "NAME", "BRANCH", "STATUS", "REVIEW"]);
        for s in &self.streams {
            t.add_row(vec![
                short_id(&s.id),
                truncate(&s.name, 24),
                truncate(&s.branch, 40),
                s.status.clone(),
                s.review_status.clone(),
            ]);
        }
        t.to_string()
    }
}

#[derive(Serialize)]
pub struct DiffOutput {
    pub stream_id: String,
    pub diff: String,
}

impl CommandOutput for DiffOutput {
    fn to_human(&self) -> String {
        if self.diff.is_empty() {
            "no changes against base".to_string()
        } else {
            self.diff.clone()
        }
    }
}

pub async fn handle_list(
    coordinator: &Coordinator,
    status: Option<String>,
    json: bool,
) -> DomainResult<()> {
    let repo = coordinator.default_repository().await?;
    let status = match status {
        Some(ref s) => Some(StreamStatus::from_str(s).ok_or_else(|| {
            crate::domain::errors::DomainError::Validation(format!("unknown status '{s}'"))
        })?),
        None => None,
    };
    let streams = coordinator
        .list_streams(StreamFilter { repo_id: Some(repo.id), status, ..Default::default() })
        .await?;
    print(&StreamListOutput { streams: streams.iter().map(Into::into).collect() }, json);
    Ok(())
}

pub async fn handle_info(coordinator: &Coordinator, stream: &str, json: bool) -> DomainResult<()> {
    let stream_id = resolve_stream(coordinator, stream).await?;
    let stream = coordinator.stream(stream_id).await?;
    print(&StreamOutput::from(&stream), json);
    Ok(())
}

pub async fn handle_diff(coordinator: &Coordinator, stream: &str, json: bool) -> DomainResult<()> {
    let stream_id = resolve_stream(coordinator, stream).await?;
    let diff = coordinator.stream_diff(stream_id).await?;
    print(&DiffOutput { stream_id: stream_id.to_string(), diff }, json);
    Ok(())
}

pub async fn handle_submit(
    coordinator: &Coordinator,
    stream: &str,
    agent: &str,
    json: bool,
) -> DomainResult<()> {
    let ctx = coordinator.context_by_name(agent).await?;
    let stream_id = resolve_stream(coordinator, stream).await?;
    let stream = coordinator.submit_stream_for_review(&ctx, stream_id).await?;
    print(&StreamOutput::from(&stream), json);
    Ok(())
}
