//! Embedded store behavior: migrations, uniqueness constraints, and
//! queue ordering.

mod common;

use chrono::Utc;
use common::testbed;
use gitswarm::adapters::sqlite::{all_migrations, create_test_pool, Migrator};
use gitswarm::domain::errors::DomainError;
use gitswarm::domain::models::{
    Agent, MergeQueueEntry, Repository, Review, ReviewVerdict, Stream,
};
use gitswarm::domain::ports::{
    AgentRepository, MergeQueueRepository, RepoRepository, ReviewRepository, StreamRepository,
};
use uuid::Uuid;

#[tokio::test]
async fn test_migrations_rerun_is_noop() {
    let pool = create_test_pool().await.unwrap();
    let migrator = Migrator::new(pool.clone());

    let applied = migrator.run(all_migrations()).await.unwrap();
    assert_eq!(applied, all_migrations().len());
    assert_eq!(migrator.get_current_version().await.unwrap(), 3);

    // Re-running applies nothing beyond the recorded version.
    let applied = migrator.run(all_migrations()).await.unwrap();
    assert_eq!(applied, 0);
    assert_eq!(migrator.get_current_version().await.unwrap(), 3);
}

#[tokio::test]
async fn test_agent_name_uniqueness_and_karma_floor() {
    let pool = create_test_pool().await.unwrap();
    Migrator::new(pool.clone()).run(all_migrations()).await.unwrap();
    let agents = gitswarm::adapters::sqlite::SqliteAgentRepository::new(pool);

    let agent = Agent::new("dup", "h1".into(), "s1".into());
    agents.create(&agent).await.unwrap();
    let clash = Agent::new("dup", "h2".into(), "s2".into());
    let err = agents.create(&clash).await.unwrap_err();
    assert!(matches!(err, DomainError::Conflict(_)));

    // Karma clamps at zero on deduction.
    assert_eq!(agents.adjust_karma(agent.id, 10).await.unwrap(), 10);
    assert_eq!(agents.adjust_karma(agent.id, -50).await.unwrap(), 0);
}

#[tokio::test]
async fn test_one_active_stream_per_branch() {
    let bed = testbed().await;
    let pool = bed.pool.clone();
    let agents = gitswarm::adapters::sqlite::SqliteAgentRepository::new(pool.clone());
    let streams = gitswarm::adapters::sqlite::SqliteStreamRepository::new(pool);

    let agent = Agent::new("dev", "h".into(), "s".into());
    agents.create(&agent).await.unwrap();

    let stream =
        Stream::new(bed.repo.id, agent.id, "one", "streams/dev/one", "swarm/buffer");
    streams.create(&stream).await.unwrap();

    let duplicate =
        Stream::new(bed.repo.id, agent.id, "one", "streams/dev/one", "swarm/buffer");
    let err = streams.create(&duplicate).await.unwrap_err();
    assert!(matches!(err, DomainError::Conflict(_)));

    // Once the first stream leaves active, the branch is reusable.
    streams
        .set_status(stream.id, gitswarm::domain::models::StreamStatus::Abandoned)
        .await
        .unwrap();
    streams.create(&duplicate).await.unwrap();
}

#[tokio::test]
async fn test_review_row_per_reviewer_latest_wins() {
    let bed = testbed().await;
    let pool = bed.pool.clone();
    let agents = gitswarm::adapters::sqlite::SqliteAgentRepository::new(pool.clone());
    let streams = gitswarm::adapters::sqlite::SqliteStreamRepository::new(pool.clone());
    let reviews = gitswarm::adapters::sqlite::SqliteReviewRepository::new(pool);

    let author = Agent::new("author", "h".into(), "s".into());
    let reviewer = Agent::new("reviewer", "h".into(), "s".into());
    agents.create(&author).await.unwrap();
    agents.create(&reviewer).await.unwrap();
    let stream = Stream::new(bed.repo.id, author.id, "s", "streams/author/s", "swarm/buffer");
    streams.create(&stream).await.unwrap();

    let mut first = Review::new(stream.id, reviewer.id, ReviewVerdict::RequestChanges);
    first.karma_awarded = true;
    assert!(reviews.upsert(&first).await.unwrap());

    let second = Review::new(stream.id, reviewer.id, ReviewVerdict::Approve);
    assert!(!reviews.upsert(&second).await.unwrap());

    let all = reviews.list_for_stream(stream.id).await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].verdict, ReviewVerdict::Approve);
    // The award flag survives the overwrite.
    assert!(all[0].karma_awarded);
}

#[tokio::test]
async fn test_merge_queue_fifo_with_council_head_insertion() {
    let pool = create_test_pool().await.unwrap();
    Migrator::new(pool.clone()).run(all_migrations()).await.unwrap();
    let agents = gitswarm::adapters::sqlite::SqliteAgentRepository::new(pool.clone());
    let repos = gitswarm::adapters::sqlite::SqliteRepoRepository::new(pool.clone());
    let streams = gitswarm::adapters::sqlite::SqliteStreamRepository::new(pool.clone());
    let queue = gitswarm::adapters::sqlite::SqliteMergeQueueRepository::new(pool);

    let repo = Repository::new("q");
    repos.create(&repo).await.unwrap();
    let agent = Agent::new("req", "h".into(), "s".into());
    agents.create(&agent).await.unwrap();

    let make_stream = |n: &str| {
        Stream::new(repo.id, agent.id, n, format!("streams/req/{n}"), "swarm/buffer")
    };
    let s1 = make_stream("s1");
    let s2 = make_stream("s2");
    let s3 = make_stream("s3");
    for s in [&s1, &s2, &s3] {
        streams.create(s).await.unwrap();
    }

    let mut e1 = MergeQueueEntry::new(repo.id, s1.id, agent.id);
    e1.enqueued_at = Utc::now() - chrono::Duration::seconds(3);
    let mut e2 = MergeQueueEntry::new(repo.id, s2.id, agent.id);
    e2.enqueued_at = Utc::now() - chrono::Duration::seconds(2);
    queue.enqueue(&e1).await.unwrap();
    queue.enqueue(&e2).await.unwrap();

    // Duplicate admission for a queued stream is rejected.
    let dup = MergeQueueEntry::new(repo.id, s1.id, agent.id);
    assert!(matches!(queue.enqueue(&dup).await.unwrap_err(), DomainError::Conflict(_)));

    // Council insertion takes the head despite arriving last.
    let mut urgent = MergeQueueEntry::new(repo.id, s3.id, agent.id);
    urgent.council_authorized = true;
    queue.enqueue_front(&urgent).await.unwrap();

    let popped: Vec<Uuid> = {
        let mut out = Vec::new();
        while let Some(entry) = queue.pop_next(repo.id).await.unwrap() {
            out.push(entry.stream_id);
            queue
                .set_status(entry.id, gitswarm::domain::models::MergeEntryStatus::Merged, None)
                .await
                .unwrap();
        }
        out
    };
    // Head insertion first, then strict admission order.
    assert_eq!(popped, vec![s3.id, s1.id, s2.id]);
}
