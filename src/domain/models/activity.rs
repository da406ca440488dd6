//! Append-only activity events and subscriber filters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single activity event. `agent_id = None` marks system events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub id: Uuid,
    pub agent_id: Option<Uuid>,
    pub event_type: String,
    pub target_type: String,
    pub target_id: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl ActivityEvent {
    pub fn new(
        agent_id: Option<Uuid>,
        event_type: impl Into<String>,
        target_type: impl Into<String>,
        target_id: impl ToString,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            agent_id,
            event_type: event_type.into(),
            target_type: target_type.into(),
            target_id: target_id.to_string(),
            metadata: serde_json::Value::Object(serde_json::Map::new()),
            created_at: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Filter for subscribers and queries. Empty fields match everything.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub event_types: Option<Vec<String>>,
    pub target_type: Option<String>,
    pub agent_id: Option<Uuid>,
}

impl EventFilter {
    pub fn matches(&self, event: &ActivityEvent) -> bool {
        if let Some(ref types) = self.event_types {
            if !types.iter().any(|t| t == &event.event_type) {
                return false;
            }
        }
        if let Some(ref target) = self.target_type {
            if target != &event.target_type {
                return false;
            }
        }
        if let Some(agent) = self.agent_id {
            if event.agent_id != Some(agent) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_filter_matches_all() {
        let ev = ActivityEvent::new(None, "stream_merged", "stream", "abc");
        assert!(EventFilter::default().matches(&ev));
    }

    #[test]
    fn test_filter_by_type_and_target() {
        let ev = ActivityEvent::new(None, "stream_merged", "stream", "abc");
        let filter = EventFilter {
            event_types: Some(vec!["stream_merged".to_string()]),
            target_type: Some("stream".to_string()),
            agent_id: None,
        };
        assert!(filter.matches(&ev));

        let filter = EventFilter {
            event_types: Some(vec!["task_created".to_string()]),
            ..Default::default()
        };
        assert!(!filter.matches(&ev));
    }

    #[test]
    fn test_filter_by_agent() {
        let agent = Uuid::new_v4();
        let ev = ActivityEvent::new(Some(agent), "review_submitted", "stream", "s");
        let filter = EventFilter { agent_id: Some(agent), ..Default::default() };
        assert!(filter.matches(&ev));
        let filter = EventFilter { agent_id: Some(Uuid::new_v4()), ..Default::default() };
        assert!(!filter.matches(&ev));
    }
}
