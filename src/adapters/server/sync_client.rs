//! HTTP client for the sync protocol (client → authoritative server).
//!
//! Every request carries the agent's API key as a bearer token; the
//! server resolves it to an identity by salted hash.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{ConsensusDecision, PushReport, SyncCategory, SyncDelta, SyncQueueItem};

#[derive(Debug, Clone)]
pub struct SyncClientConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout: Duration,
}

impl SyncClientConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            timeout: Duration::from_secs(30),
        }
    }
}

pub struct SyncClient {
    config: SyncClientConfig,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct PushRequest<'a> {
    events: Vec<PushEvent<'a>>,
}

#[derive(Serialize)]
struct PushEvent<'a> {
    local_id: i64,
    event_type: &'a str,
    payload: &'a serde_json::Value,
}

#[derive(Deserialize)]
struct UpdatesResponse {
    rows: Vec<crate::domain::models::DeltaRow>,
    next_cursor: String,
}

impl SyncClient {
    pub fn new(config: SyncClientConfig) -> DomainResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| DomainError::Internal(format!("http client: {e}")))?;
        Ok(Self { config, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{path}", self.config.base_url.trim_end_matches('/'))
    }

    /// Push a batch of outbound events in local-id order.
    pub async fn push_events(&self, items: &[SyncQueueItem]) -> DomainResult<PushReport> {
        let body = PushRequest {
            events: items
                .iter()
                .map(|i| PushEvent {
                    local_id: i.id,
                    event_type: &i.event_type,
                    payload: &i.payload,
                })
                .collect(),
        };

        let response = self
            .client
            .post(self.url("/sync/events"))
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| DomainError::Unavailable(format!("sync push: {e}")))?;

        let response = check_status(response).await?;
        response
            .json::<PushReport>()
            .await
            .map_err(|e| DomainError::Internal(format!("sync push response: {e}")))
    }

    /// Poll one category for deltas after the cursor.
    pub async fn fetch_updates(
        &self,
        category: SyncCategory,
        cursor: Option<&str>,
    ) -> DomainResult<SyncDelta> {
        let mut request = self
            .client
            .get(self.url("/sync/updates"))
            .bearer_auth(&self.config.api_key)
            .query(&[("category", category.as_str())]);
        if let Some(cursor) = cursor {
            request = request.query(&[("cursor", cursor)]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| DomainError::Unavailable(format!("sync poll: {e}")))?;

        let response = check_status(response).await?;
        let body: UpdatesResponse = response
            .json()
            .await
            .map_err(|e| DomainError::Internal(format!("sync poll response: {e}")))?;
        Ok(SyncDelta { category, rows: body.rows, next_cursor: body.next_cursor })
    }

    /// Re-query consensus from the authoritative server.
    pub async fn fetch_consensus(&self, stream_id: Uuid) -> DomainResult<ConsensusDecision> {
        let response = self
            .client
            .get(self.url(&format!("/streams/{stream_id}/consensus")))
            .bearer_auth(&self.config.api_key)
            .send()
            .await
            .map_err(|e| DomainError::Unavailable(format!("consensus query: {e}")))?;

        let response = check_status(response).await?;
        response
            .json::<ConsensusDecision>()
            .await
            .map_err(|e| DomainError::Internal(format!("consensus response: {e}")))
    }
}

/// Map HTTP status classes to the domain error taxonomy.
async fn check_status(response: reqwest::Response) -> DomainResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    let body = response.text().await.unwrap_or_default();
    let detail = if body.is_empty() { status.to_string() } else { body };

    Err(match status {
        StatusCode::UNAUTHORIZED => DomainError::Auth(detail),
        StatusCode::FORBIDDEN => DomainError::Permission(detail),
        StatusCode::NOT_FOUND => DomainError::not_found("resource", detail),
        StatusCode::CONFLICT => DomainError::Conflict(detail),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            DomainError::Validation(detail)
        }
        StatusCode::TOO_MANY_REQUESTS => {
            DomainError::RateLimited { retry_after_secs: retry_after.unwrap_or(60) }
        }
        s if s.is_server_error() => DomainError::Unavailable(detail),
        _ => DomainError::Internal(detail),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn item(id: i64) -> SyncQueueItem {
        SyncQueueItem {
            id,
            event_type: "review".to_string(),
            payload: serde_json::json!({"stream_id": "s"}),
            attempts: 0,
            last_error: None,
            next_attempt_at: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_push_events_success_returns_accepted_ids() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v1/sync/events")
            .match_header("authorization", "Bearer gsw_testkey")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"accepted": [1, 2]}"#)
            .create_async()
            .await;

        let client =
            SyncClient::new(SyncClientConfig::new(server.url(), "gsw_testkey")).unwrap();
        let report = client.push_events(&[item(1), item(2)]).await.unwrap();
        assert_eq!(report.accepted, vec![1, 2]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_server_error_maps_to_unavailable() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/v1/sync/events")
            .with_status(503)
            .with_body("maintenance")
            .create_async()
            .await;

        let client = SyncClient::new(SyncClientConfig::new(server.url(), "k")).unwrap();
        let err = client.push_events(&[item(1)]).await.unwrap_err();
        assert!(matches!(err, DomainError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_validation_error_is_not_retryable() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/v1/sync/events")
            .with_status(422)
            .with_body("bad payload")
            .create_async()
            .await;

        let client = SyncClient::new(SyncClientConfig::new(server.url(), "k")).unwrap();
        let err = client.push_events(&[item(1)]).await.unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_rate_limit_carries_retry_after() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", mockito::Matcher::Regex("/api/v1/sync/updates.*".to_string()))
            .with_status(429)
            .with_header("retry-after", "17")
            .create_async()
            .await;

        let client = SyncClient::new(SyncClientConfig::new(server.url(), "k")).unwrap();
        let err = client.fetch_updates(SyncCategory::Reviews, None).await.unwrap_err();
        assert!(matches!(err, DomainError::RateLimited { retry_after_secs: 17 }));
    }
}
