//! Activity log: append-only persistence plus in-process fan-out.
//!
//! Writes never fail the causing operation: persistence and subscriber
//! errors are logged and swallowed. In-process handlers run in the
//! writer's context; cross-process consumers take the broadcast
//! channel. Ordering holds per writer, not globally.

use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::warn;

use crate::domain::errors::DomainResult;
use crate::domain::models::{ActivityEvent, EventFilter};
use crate::domain::ports::ActivityRepository;

type Handler = Box<dyn Fn(&ActivityEvent) + Send + Sync>;

const BROADCAST_CAPACITY: usize = 1024;

pub struct ActivityLog {
    store: Arc<dyn ActivityRepository>,
    subscribers: RwLock<Vec<(EventFilter, Handler)>>,
    broadcast: broadcast::Sender<ActivityEvent>,
}

impl ActivityLog {
    pub fn new(store: Arc<dyn ActivityRepository>) -> Self {
        let (broadcast, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self { store, subscribers: RwLock::new(Vec::new()), broadcast }
    }

    /// Append an event and fan out. Never returns an error.
    pub async fn record(&self, event: ActivityEvent) {
        if let Err(e) = self.store.append(&event).await {
            warn!(event_type = %event.event_type, error = %e, "activity append failed");
        }

        let subscribers = self.subscribers.read().await;
        for (filter, handler) in subscribers.iter() {
            if filter.matches(&event) {
                handler(&event);
            }
        }
        drop(subscribers);

        // No receivers is fine; lagging receivers drop old events.
        let _ = self.broadcast.send(event);
    }

    /// Register an in-process handler invoked synchronously on every
    /// matching write. Handler panics are the handler's problem;
    /// errors cannot propagate because handlers return nothing.
    pub async fn on_event(&self, filter: EventFilter, handler: Handler) {
        self.subscribers.write().await.push((filter, handler));
    }

    /// Broadcast receiver for wire transports and long-lived consumers.
    pub fn subscribe(&self) -> broadcast::Receiver<ActivityEvent> {
        self.broadcast.subscribe()
    }

    /// Query persisted history, newest first.
    pub async fn query(&self, filter: &EventFilter, limit: u32) -> DomainResult<Vec<ActivityEvent>> {
        self.store.query(filter, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{
        all_migrations, create_test_pool, Migrator, SqliteActivityRepository,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn make_log() -> ActivityLog {
        let pool = create_test_pool().await.expect("pool");
        Migrator::new(pool.clone()).run(all_migrations()).await.expect("migrations");
        ActivityLog::new(Arc::new(SqliteActivityRepository::new(pool)))
    }

    #[tokio::test]
    async fn test_record_persists_and_queries() {
        let log = make_log().await;
        log.record(ActivityEvent::new(None, "stream_created", "stream", "s1")).await;
        log.record(ActivityEvent::new(None, "stream_merged", "stream", "s1")).await;

        let all = log.query(&EventFilter::default(), 10).await.unwrap();
        assert_eq!(all.len(), 2);

        let merged_only = log
            .query(
                &EventFilter {
                    event_types: Some(vec!["stream_merged".to_string()]),
                    ..Default::default()
                },
                10,
            )
            .await
            .unwrap();
        assert_eq!(merged_only.len(), 1);
        assert_eq!(merged_only[0].event_type, "stream_merged");
    }

    #[tokio::test]
    async fn test_filtered_handler_dispatch() {
        let log = make_log().await;
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        log.on_event(
            EventFilter {
                event_types: Some(vec!["stream_merged".to_string()]),
                ..Default::default()
            },
            Box::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .await;

        log.record(ActivityEvent::new(None, "stream_created", "stream", "s")).await;
        log.record(ActivityEvent::new(None, "stream_merged", "stream", "s")).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_broadcast_receives_events() {
        let log = make_log().await;
        let mut rx = log.subscribe();
        log.record(ActivityEvent::new(None, "promotion", "repository", "r")).await;
        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type, "promotion");
    }
}
