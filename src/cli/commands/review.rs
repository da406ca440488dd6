//! Review commands: submit, list, consensus check.

use serde::Serialize;

use crate::cli::output::{print, short_id, table, truncate, CommandOutput};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{ConsensusDecision, ReviewVerdict};
use crate::services::Coordinator;

use super::resolve_stream;

#[derive(Serialize)]
pub struct ConsensusOutput {
    pub reached: bool,
    pub reason: String,
    pub ratio: Option<f64>,
    pub threshold: Option<f64>,
    pub approvals: u32,
    pub rejections: u32,
    pub required: u32,
}

impl From<&ConsensusDecision> for ConsensusOutput {
    fn from(decision: &ConsensusDecision) -> Self {
        Self {
            reached: decision.reached,
            reason: decision.reason.as_str().to_string(),
            ratio: decision.ratio,
            threshold: decision.threshold,
            approvals: decision.approvals,
            rejections: decision.rejections,
            required: decision.required,
        }
    }
}

impl CommandOutput for ConsensusOutput {
    fn to_human(&self) -> String {
        let verdict = if self.reached { "reached" } else { "not reached" };
        let mut line = format!(
            "consensus {verdict} ({}): {} approvals, {} rejections",
            self.reason, self.approvals, self.rejections
        );
        if let (Some(ratio), Some(threshold)) = (self.ratio, self.threshold) {
            line.push_str(&format!(", ratio {ratio:.3} vs threshold {threshold:.3}"));
        }
        line
    }
}

#[derive(Serialize)]
pub struct ReviewListOutput {
    pub reviews: Vec<ReviewRow>,
}

#[derive(Serialize)]
pub struct ReviewRow {
    pub reviewer_id: String,
    pub verdict: String,
    pub maintainer: bool,
    pub human: bool,
    pub tested: bool,
    pub feedback: Option<String>,
}

impl CommandOutput for ReviewListOutput {
    fn to_human(&self) -> String {
        if self.reviews.is_empty() {
            return "no reviews".to_string();
        }
        let mut t = table(&["REVIEWER", "VERDICT", "MAINTAINER", "TESTED", "FEEDBACK"]);
        for r in &self.reviews {
            t.add_row(vec![
                short_id(&r.reviewer_id),
                r.verdict.clone(),
                if r.maintainer { "yes" } else { "no" }.to_string(),
                if r.tested { "yes" } else { "no" }.to_string(),
                truncate(r.feedback.as_deref().unwrap_or("-"), 40),
            ]);
        }
        t.to_string()
    }
}

#[allow(clippy::too_many_arguments)]
pub async fn handle_submit(
    coordinator: &Coordinator,
    stream: &str,
    agent: &str,
    verdict: &str,
    feedback: Option<String>,
    tested: bool,
    human: bool,
    json: bool,
) -> DomainResult<()> {
    let verdict = ReviewVerdict::from_str(verdict)
        .ok_or_else(|| DomainError::Validation(format!("unknown verdict '{verdict}'")))?;
    let ctx = coordinator.context_by_name(agent).await?;
    let stream_id = resolve_stream(coordinator, stream).await?;

    let (_, consensus) = coordinator
        .submit_review(&ctx, stream_id, verdict, feedback, tested, human)
        .await?;
    print(&ConsensusOutput::from(&consensus), json);
    Ok(())
}

pub async fn handle_list(coordinator: &Coordinator, stream: &str, json: bool) -> DomainResult<()> {
    let stream_id = resolve_stream(coordinator, stream).await?;
    let reviews = coordinator.reviews_for_stream(stream_id).await?;
    print(
        &ReviewListOutput {
            reviews: reviews
                .iter()
                .map(|r| ReviewRow {
                    reviewer_id: r.reviewer_id.to_string(),
                    verdict: r.verdict.as_str().to_string(),
                    maintainer: r.is_maintainer,
                    human: r.is_human,
                    tested: r.tested,
                    feedback: r.feedback.clone(),
                })
                .collect(),
        },
        json,
    );
    Ok(())
}

pub async fn handle_check(coordinator: &Coordinator, stream: &str, json: bool) -> DomainResult<()> {
    let stream_id = resolve_stream(coordinator, stream).await?;
    let decision = coordinator.check_consensus(stream_id).await?;
    print(&ConsensusOutput::from(&decision), json);
    Ok(())
}
