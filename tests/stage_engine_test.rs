//! Stage progression: eligibility reporting and advancement.

mod common;

use common::{guild, testbed_with};
use gitswarm::domain::errors::DomainError;
use gitswarm::domain::models::{MaintainerRole, RepoStage, ReviewVerdict};
use gitswarm::services::StreamOptions;

#[tokio::test]
async fn test_seed_repo_reports_unmet_growth_requirements() {
    let bed = testbed_with(guild(0.5, 1)).await;
    let _owner = bed.register("owner").await;

    let report = bed.coordinator.stage_report(bed.repo.id).await.unwrap();
    assert_eq!(report.current_stage, RepoStage::Seed);
    assert_eq!(report.next_stage, Some(RepoStage::Growth));
    assert!(!report.eligible);

    let metrics: Vec<&str> = report.unmet.iter().map(|u| u.metric).collect();
    assert!(metrics.contains(&"contributors"));
    assert!(metrics.contains(&"merged_streams"));
    // One maintainer (the owner) already satisfies the growth gate.
    assert!(!metrics.contains(&"maintainers"));
}

#[tokio::test]
async fn test_advancement_after_enough_merges() {
    let bed = testbed_with(guild(0.5, 1)).await;
    let owner = bed.register("owner").await;
    bed.register("m2").await;
    bed.coordinator
        .add_maintainer(&owner, bed.repo.id, "m2", MaintainerRole::Maintainer)
        .await
        .unwrap();

    // Three merged streams from two distinct contributors.
    for (i, author_name) in ["alpha", "beta", "alpha"].iter().enumerate() {
        let author = match bed.coordinator.context_by_name(author_name).await {
            Ok(ctx) => ctx,
            Err(_) => bed.register(author_name).await,
        };
        let (stream, _) = bed
            .coordinator
            .create_workspace(&author, bed.repo.id, StreamOptions {
                name: Some(format!("work-{i}")),
                ..Default::default()
            })
            .await
            .unwrap();
        bed.git.stage_file(&stream.branch_ref, format!("f{i}.txt"));
        bed.coordinator.commit(&author, bed.repo.id, "work").await.unwrap();
        bed.coordinator.submit_stream_for_review(&author, stream.id).await.unwrap();
        bed.coordinator
            .submit_review(&owner, stream.id, ReviewVerdict::Approve, None, false, false)
            .await
            .unwrap();
        bed.coordinator.request_merge(&author, stream.id).await.unwrap();
        bed.coordinator.destroy_workspace(&author, bed.repo.id, false).await.unwrap();
    }

    // Metrics were recomputed on each merge.
    let repo = bed.coordinator.repository(bed.repo.id).await.unwrap();
    assert_eq!(repo.patch_count, 3);
    assert_eq!(repo.contributor_count, 2);

    let report = bed.coordinator.stage_report(bed.repo.id).await.unwrap();
    assert!(report.eligible, "unmet: {:?}", report.unmet);

    bed.coordinator.advance_stage(&owner, bed.repo.id, false).await.unwrap();
    let repo = bed.coordinator.repository(bed.repo.id).await.unwrap();
    assert_eq!(repo.stage, RepoStage::Growth);

    // Ineligible for the next step without force.
    let err = bed.coordinator.advance_stage(&owner, bed.repo.id, false).await.unwrap_err();
    assert!(matches!(err, DomainError::Validation(_)));

    // Force (council override path) moves a single step anyway, and
    // the transitions are recorded in the stage history.
    bed.coordinator.advance_stage(&owner, bed.repo.id, true).await.unwrap();
    let repo = bed.coordinator.repository(bed.repo.id).await.unwrap();
    assert_eq!(repo.stage, RepoStage::Established);

    let repos = gitswarm::adapters::sqlite::SqliteRepoRepository::new(bed.pool.clone());
    use gitswarm::domain::ports::RepoRepository;
    let history = repos.stage_history(bed.repo.id).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].to_stage, RepoStage::Growth);
    assert!(!history[0].forced);
    assert_eq!(history[1].to_stage, RepoStage::Established);
    assert!(history[1].forced);
}
