//! `status` and `log` commands.

use serde::Serialize;

use crate::cli::output::{print, short_id, table, truncate, CommandOutput};
use crate::domain::errors::DomainResult;
use crate::domain::models::EventFilter;
use crate::services::{Coordinator, StatusSummary};

impl CommandOutput for StatusSummary {
    fn to_human(&self) -> String {
        let mut lines = vec![
            format!("repository: {} (stage {})", self.repository, self.stage),
            format!(
                "streams: {} active, {} in review, {} merged",
                self.active_streams, self.in_review_streams, self.merged_streams
            ),
            format!("merge queue: {} pending", self.pending_merges),
            format!("contributors: {}", self.contributor_count),
        ];
        if let Some(ref council) = self.council_status {
            lines.push(format!("council: {council}"));
        }
        if let Some(backlog) = self.sync_backlog {
            lines.push(format!("sync backlog: {backlog} events"));
        }
        lines.join("\n")
    }
}

#[derive(Serialize)]
pub struct LogOutput {
    pub events: Vec<LogRow>,
}

#[derive(Serialize)]
pub struct LogRow {
    pub at: String,
    pub event_type: String,
    pub target: String,
    pub agent_id: Option<String>,
}

impl CommandOutput for LogOutput {
    fn to_human(&self) -> String {
        if self.events.is_empty() {
            return "no activity".to_string();
        }
        let mut t = table(&["WHEN", "EVENT", "TARGET", "AGENT"]);
        for e in &self.events {
            t.add_row(vec![
                e.at.clone(),
                e.event_type.clone(),
                truncate(&e.target, 32),
                e.agent_id.as_deref().map_or_else(|| "system".to_string(), |id| short_id(id)),
            ]);
        }
        t.to_string()
    }
}

pub async fn handle_status(coordinator: &Coordinator, json: bool) -> DomainResult<()> {
    let repo = coordinator.default_repository().await?;
    let summary = coordinator.status_summary(repo.id).await?;
    print(&summary, json);
    Ok(())
}

pub async fn handle_log(coordinator: &Coordinator, limit: u32, json: bool) -> DomainResult<()> {
    let events = coordinator.activity(&EventFilter::default(), limit).await?;
    print(
        &LogOutput {
            events: events
                .iter()
                .map(|e| LogRow {
                    at: e.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                    event_type: e.event_type.clone(),
                    target: format!("{} {}", e.target_type, short_id(&e.target_id)),
                    agent_id: e.agent_id.map(|id| id.to_string()),
                })
                .collect(),
        },
        json,
    );
    Ok(())
}
