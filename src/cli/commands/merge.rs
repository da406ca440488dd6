//! Merge, stabilize, and promote commands.

use serde::Serialize;

use crate::cli::output::{print, short_id, CommandOutput, Message};
use crate::domain::errors::DomainResult;
use crate::services::Coordinator;

use super::resolve_stream;

#[derive(Serialize)]
pub struct MergeOutput {
    pub entry_id: String,
    pub status: String,
    pub merge_commit: Option<String>,
    pub last_error: Option<String>,
}

impl CommandOutput for MergeOutput {
    fn to_human(&self) -> String {
        match (self.status.as_str(), &self.merge_commit, &self.last_error) {
            ("merged", Some(commit), _) => {
                format!("merged into buffer at {}", short_id(commit))
            }
            ("failed", _, Some(error)) => format!("merge failed: {error}"),
            (status, _, _) => format!("merge request {} is {status}", short_id(&self.entry_id)),
        }
    }
}

#[derive(Serialize)]
pub struct StabilizeOutput {
    pub success: bool,
    pub exit_code: i32,
    pub timed_out: bool,
    pub reverted_stream: Option<String>,
    pub promoted: bool,
    pub output: String,
}

impl CommandOutput for StabilizeOutput {
    fn to_human(&self) -> String {
        let mut lines = Vec::new();
        if self.success {
            lines.push("stabilization green".to_string());
            if self.promoted {
                lines.push("buffer promoted".to_string());
            }
        } else if self.timed_out {
            lines.push("stabilization timed out".to_string());
        } else {
            lines.push(format!("stabilization red (exit {})", self.exit_code));
        }
        if let Some(ref stream) = self.reverted_stream {
            lines.push(format!("auto-reverted stream {}", short_id(stream)));
        }
        if !self.output.trim().is_empty() {
            lines.push(format!("--- output ---\n{}", self.output.trim()));
        }
        lines.join("\n")
    }
}

pub async fn handle_merge(
    coordinator: &Coordinator,
    stream: &str,
    agent: &str,
    json: bool,
) -> DomainResult<()> {
    let ctx = coordinator.context_by_name(agent).await?;
    let stream_id = resolve_stream(coordinator, stream).await?;
    let entry = coordinator.request_merge(&ctx, stream_id).await?;
    print(
        &MergeOutput {
            entry_id: entry.id.to_string(),
            status: entry.status.as_str().to_string(),
            merge_commit: entry.merge_commit,
            last_error: entry.last_error,
        },
        json,
    );
    Ok(())
}

pub async fn handle_stabilize(
    coordinator: &Coordinator,
    agent: &str,
    json: bool,
) -> DomainResult<()> {
    let ctx = coordinator.context_by_name(agent).await?;
    let repo = coordinator.default_repository().await?;
    let outcome = coordinator.stabilize(&ctx, repo.id).await?;
    print(
        &StabilizeOutput {
            success: outcome.success,
            exit_code: outcome.exit_code,
            timed_out: outcome.timed_out,
            reverted_stream: outcome.reverted_stream.map(|id| id.to_string()),
            promoted: outcome.promoted,
            output: outcome.output,
        },
        json,
    );
    Ok(())
}

pub async fn handle_promote(
    coordinator: &Coordinator,
    agent: &str,
    json: bool,
) -> DomainResult<()> {
    let ctx = coordinator.context_by_name(agent).await?;
    let repo = coordinator.default_repository().await?;
    let commit = coordinator.promote(&ctx, repo.id).await?;
    print(
        &Message::new(format!("promoted {} to {}", short_id(&commit), repo.promote_target)),
        json,
    );
    Ok(())
}
