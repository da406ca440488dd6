//! Sync protocol: flusher round trips, backoff retention, and
//! idempotent inbound apply.

use std::sync::Arc;

use chrono::Utc;
use gitswarm::adapters::server::{SyncClient, SyncClientConfig};
use gitswarm::adapters::sqlite::{
    all_migrations, create_test_pool, Migrator, SqliteSyncRepository,
};
use gitswarm::domain::models::SyncEventType;
use gitswarm::domain::ports::SyncRepository;
use gitswarm::services::SyncService;
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;

async fn sync_service(server_url: &str) -> (SyncService, Arc<SqliteSyncRepository>, SqlitePool) {
    let pool = create_test_pool().await.unwrap();
    Migrator::new(pool.clone()).run(all_migrations()).await.unwrap();
    let queue = Arc::new(SqliteSyncRepository::new(pool.clone()));
    let client =
        Arc::new(SyncClient::new(SyncClientConfig::new(server_url, "gsw_key")).unwrap());
    (SyncService::new(queue.clone(), client, pool.clone()), queue, pool)
}

#[tokio::test]
async fn test_flush_deletes_accepted_events() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/api/v1/sync/events")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"accepted": [1, 2]}"#)
        .create_async()
        .await;

    let (service, queue, _pool) = sync_service(&server.url()).await;
    queue.enqueue(SyncEventType::Review, &serde_json::json!({"n": 1})).await.unwrap();
    queue.enqueue(SyncEventType::TaskClaim, &serde_json::json!({"n": 2})).await.unwrap();

    let report = service.flush_once(&CancellationToken::new()).await.unwrap();
    assert_eq!(report.pushed, 2);
    assert_eq!(service.pending_count().await.unwrap(), 0);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_server_failure_retains_with_backoff() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/api/v1/sync/events")
        .with_status(503)
        .with_body("down")
        .create_async()
        .await;

    let (service, queue, _pool) = sync_service(&server.url()).await;
    let id = queue.enqueue(SyncEventType::Review, &serde_json::json!({"n": 1})).await.unwrap();

    let report = service.flush_once(&CancellationToken::new()).await.unwrap();
    assert_eq!(report.pushed, 0);
    assert_eq!(report.failed, 1);

    // The entry survives with attempts bumped and a future deadline,
    // so the immediate next pass skips it.
    assert_eq!(service.pending_count().await.unwrap(), 1);
    let ready = queue.next_batch(Utc::now(), 10).await.unwrap();
    assert!(ready.is_empty());
    let later = queue.next_batch(Utc::now() + chrono::Duration::minutes(10), 10).await.unwrap();
    assert_eq!(later.len(), 1);
    assert_eq!(later[0].id, id);
    assert_eq!(later[0].attempts, 1);
}

#[tokio::test]
async fn test_validation_failure_drops_batch() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/api/v1/sync/events")
        .with_status(422)
        .with_body("malformed")
        .create_async()
        .await;

    let (service, queue, _pool) = sync_service(&server.url()).await;
    queue.enqueue(SyncEventType::Review, &serde_json::json!({"bad": true})).await.unwrap();

    let report = service.flush_once(&CancellationToken::new()).await.unwrap();
    assert_eq!(report.dropped, 1);
    assert_eq!(service.pending_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_queue_drains_in_local_id_order() {
    let pool = create_test_pool().await.unwrap();
    Migrator::new(pool.clone()).run(all_migrations()).await.unwrap();
    let queue = SqliteSyncRepository::new(pool);

    for n in 0..5 {
        queue
            .enqueue(SyncEventType::StreamStatus, &serde_json::json!({ "n": n }))
            .await
            .unwrap();
    }
    let batch = queue.next_batch(Utc::now(), 10).await.unwrap();
    let ids: Vec<i64> = batch.iter().map(|i| i.id).collect();
    let mut sorted = ids.clone();
    sorted.sort_unstable();
    assert_eq!(ids, sorted);
    assert_eq!(ids.len(), 5);
}

#[tokio::test]
async fn test_inbound_apply_is_idempotent() {
    let mut server = mockito::Server::new_async().await;
    let task_id = uuid::Uuid::new_v4().to_string();
    let updated_at = Utc::now().to_rfc3339();
    let repo_id = uuid::Uuid::new_v4().to_string();
    let row = serde_json::json!({
        "table": "tasks",
        "id": task_id,
        "updated_at": updated_at,
        "data": {
            "id": task_id,
            "repo_id": repo_id,
            "title": "replicated task",
            "description": null,
            "status": "open",
            "priority": "medium",
            "amount": 50,
            "creator_id": null,
            "created_at": updated_at,
            "updated_at": updated_at,
        }
    });
    let body = serde_json::json!({ "rows": [row], "next_cursor": "c1" }).to_string();
    server
        .mock("GET", mockito::Matcher::Regex("/api/v1/sync/updates.*".to_string()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(body)
        .expect_at_least(2)
        .create_async()
        .await;

    let (service, queue, pool) = sync_service(&server.url()).await;

    // Replicated tables have no FK target here; create the repo row.
    sqlx::query("INSERT INTO repositories (id, name, created_at) VALUES (?, 'remote', ?)")
        .bind(&repo_id)
        .bind(Utc::now().to_rfc3339())
        .execute(&pool)
        .await
        .unwrap();

    let first = service.pull_updates().await.unwrap();
    assert!(first >= 1);
    // Applying the identical delta again changes nothing.
    let second = service.pull_updates().await.unwrap();
    assert_eq!(second, 0);

    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tasks WHERE id = ?")
        .bind(&task_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 1);

    // Cursor advanced and is reused on the next poll.
    assert_eq!(
        queue.get_cursor(gitswarm::domain::models::SyncCategory::Tasks).await.unwrap(),
        Some("c1".to_string())
    );
}
