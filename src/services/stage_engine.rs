//! Repository stage progression: seed → growth → established → mature.

use std::sync::Arc;
use tracing::info;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{ActivityEvent, CouncilStatus, RepoStage, Repository};
use crate::domain::ports::{
    AccessRepository, CouncilRepository, RepoRepository, StageChange, StreamRepository,
};
use crate::domain::models::StreamStatus;

use super::activity_log::ActivityLog;

/// Thresholds a repository must meet to enter a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageRequirements {
    pub min_contributors: u32,
    pub min_merged_streams: u32,
    pub min_maintainers: u32,
    pub council_required: bool,
}

/// Requirements gate for entering `stage`.
pub fn requirements_for(stage: RepoStage) -> StageRequirements {
    match stage {
        RepoStage::Seed => StageRequirements {
            min_contributors: 0,
            min_merged_streams: 0,
            min_maintainers: 0,
            council_required: false,
        },
        RepoStage::Growth => StageRequirements {
            min_contributors: 2,
            min_merged_streams: 3,
            min_maintainers: 1,
            council_required: false,
        },
        RepoStage::Established => StageRequirements {
            min_contributors: 5,
            min_merged_streams: 10,
            min_maintainers: 2,
            council_required: false,
        },
        RepoStage::Mature => StageRequirements {
            min_contributors: 10,
            min_merged_streams: 25,
            min_maintainers: 3,
            council_required: true,
        },
    }
}

/// One unmet metric in an eligibility report.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct UnmetRequirement {
    pub metric: &'static str,
    pub required: u32,
    pub actual: u32,
}

/// Result of an advancement eligibility check.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AdvancementReport {
    pub current_stage: RepoStage,
    pub next_stage: Option<RepoStage>,
    pub eligible: bool,
    pub unmet: Vec<UnmetRequirement>,
}

pub struct StageEngine {
    repos: Arc<dyn RepoRepository>,
    streams: Arc<dyn StreamRepository>,
    access: Arc<dyn AccessRepository>,
    councils: Arc<dyn CouncilRepository>,
    activity: Arc<ActivityLog>,
}

impl StageEngine {
    pub fn new(
        repos: Arc<dyn RepoRepository>,
        streams: Arc<dyn StreamRepository>,
        access: Arc<dyn AccessRepository>,
        councils: Arc<dyn CouncilRepository>,
        activity: Arc<ActivityLog>,
    ) -> Self {
        Self { repos, streams, access, councils, activity }
    }

    /// Recompute the denormalised contributor/patch counters. Called
    /// after every successful merge.
    pub async fn recompute_metrics(&self, repo: &Repository) -> DomainResult<(u32, u32)> {
        let contributors = self.streams.count_merged_authors(repo.id).await?;
        let patches = self.streams.count_by_status(repo.id, StreamStatus::Merged).await?;
        self.repos.update_counters(repo.id, contributors, patches).await?;
        Ok((contributors, patches))
    }

    pub async fn check_advancement_eligibility(
        &self,
        repo: &Repository,
    ) -> DomainResult<AdvancementReport> {
        let Some(next) = repo.stage.next() else {
            return Ok(AdvancementReport {
                current_stage: repo.stage,
                next_stage: None,
                eligible: false,
                unmet: vec![],
            });
        };

        let requirements = requirements_for(next);
        let contributors = self.streams.count_merged_authors(repo.id).await?;
        let merged = self.streams.count_by_status(repo.id, StreamStatus::Merged).await?;
        let maintainers = self.access.list_maintainers(repo.id).await?.len() as u32;

        let mut unmet = Vec::new();
        if contributors < requirements.min_contributors {
            unmet.push(UnmetRequirement {
                metric: "contributors",
                required: requirements.min_contributors,
                actual: contributors,
            });
        }
        if merged < requirements.min_merged_streams {
            unmet.push(UnmetRequirement {
                metric: "merged_streams",
                required: requirements.min_merged_streams,
                actual: merged,
            });
        }
        if maintainers < requirements.min_maintainers {
            unmet.push(UnmetRequirement {
                metric: "maintainers",
                required: requirements.min_maintainers,
                actual: maintainers,
            });
        }
        if requirements.council_required {
            let council_active = self
                .councils
                .get_by_repo(repo.id)
                .await?
                .is_some_and(|c| c.status == CouncilStatus::Active);
            if !council_active {
                unmet.push(UnmetRequirement { metric: "council", required: 1, actual: 0 });
            }
        }

        Ok(AdvancementReport {
            current_stage: repo.stage,
            next_stage: Some(next),
            eligible: unmet.is_empty(),
            unmet,
        })
    }

    /// Advance one stage. Without `force` the repository must be
    /// eligible; `force` (council override) skips the gate.
    pub async fn advance_stage(&self, repo: &Repository, force: bool) -> DomainResult<RepoStage> {
        let report = self.check_advancement_eligibility(repo).await?;
        let Some(next) = report.next_stage else {
            return Err(DomainError::Validation(format!(
                "repository {} is already at the final stage",
                repo.name
            )));
        };

        if !force && !report.eligible {
            let missing: Vec<String> = report
                .unmet
                .iter()
                .map(|u| format!("{} {}/{}", u.metric, u.actual, u.required))
                .collect();
            return Err(DomainError::Validation(format!(
                "repository {} not eligible for {}: {}",
                repo.name,
                next.as_str(),
                missing.join(", ")
            )));
        }

        self.repos.set_stage(repo.id, next).await?;
        self.repos
            .record_stage_change(&StageChange::now(repo.id, repo.stage, next, force))
            .await?;
        info!(repo = %repo.name, from = repo.stage.as_str(), to = next.as_str(), force, "stage advanced");
        self.activity
            .record(
                ActivityEvent::new(None, "stage_advanced", "repository", repo.id).with_metadata(
                    serde_json::json!({
                        "from": repo.stage.as_str(),
                        "to": next.as_str(),
                        "forced": force,
                    }),
                ),
            )
            .await;
        Ok(next)
    }

    /// Set an explicit stage (council `change_stage` override).
    pub async fn set_stage(&self, repo: &Repository, stage: RepoStage) -> DomainResult<()> {
        if stage == repo.stage {
            return Ok(());
        }
        self.repos.set_stage(repo.id, stage).await?;
        self.repos
            .record_stage_change(&StageChange::now(repo.id, repo.stage, stage, true))
            .await?;
        self.activity
            .record(
                ActivityEvent::new(None, "stage_advanced", "repository", repo.id).with_metadata(
                    serde_json::json!({
                        "from": repo.stage.as_str(),
                        "to": stage.as_str(),
                        "forced": true,
                    }),
                ),
            )
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requirement_table() {
        let growth = requirements_for(RepoStage::Growth);
        assert_eq!(growth.min_contributors, 2);
        assert_eq!(growth.min_merged_streams, 3);
        assert_eq!(growth.min_maintainers, 1);
        assert!(!growth.council_required);

        let established = requirements_for(RepoStage::Established);
        assert_eq!(established.min_contributors, 5);
        assert_eq!(established.min_merged_streams, 10);
        assert_eq!(established.min_maintainers, 2);

        let mature = requirements_for(RepoStage::Mature);
        assert_eq!(mature.min_contributors, 10);
        assert_eq!(mature.min_merged_streams, 25);
        assert_eq!(mature.min_maintainers, 3);
        assert!(mature.council_required);
    }
}
