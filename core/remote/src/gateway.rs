//! Remote sync gateway trait and HTTP implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use shelfmark_common::{BookRecord, Error, Result};

use crate::retry::{RetryConfig, RetryExecutor};

/// Direction of one gateway round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncDirection {
    /// Fetch remote changes, offering no local changes.
    Pull,
    /// Send local changes without requesting remote changes.
    Push,
    /// Send local changes and fetch remote changes in one round trip.
    Both,
}

/// Authoritative batch returned by the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncBatch {
    /// Records changed or deleted since the requested cursor, unsorted.
    pub records: Vec<BookRecord>,
    /// New cursor watermark.
    pub last_synced_at: i64,
}

/// Remote sync gateway.
///
/// Accepts a batch of local changes and a "since" cursor, returns the
/// server's authoritative batch of changed/deleted records. Must be
/// idempotent under retry with the same `last_synced_at`.
#[async_trait]
pub trait SyncGateway: Send + Sync {
    async fn sync(
        &self,
        local_changes: Vec<BookRecord>,
        last_synced_at: i64,
        direction: SyncDirection,
    ) -> Result<SyncBatch>;
}

/// Wire body for the sync endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct SyncRequestBody {
    books: Vec<BookRecord>,
    last_synced_at: i64,
    #[serde(rename = "type")]
    direction: SyncDirection,
    device_id: Uuid,
}

/// HTTP sync gateway speaking the host application's JSON protocol.
///
/// Transient failures (connect/timeout) are retried with backoff here;
/// the sync core above never retries.
pub struct HttpSyncGateway {
    endpoint: Url,
    token: String,
    device_id: Uuid,
    client: reqwest::Client,
    retry: RetryExecutor,
}

impl HttpSyncGateway {
    /// Create a gateway for the given endpoint and session token.
    pub fn new(endpoint: Url, token: impl Into<String>) -> Self {
        Self {
            endpoint,
            token: token.into(),
            device_id: Uuid::new_v4(),
            client: reqwest::Client::new(),
            retry: RetryExecutor::default(),
        }
    }

    /// Use a stable device identity instead of a per-session one.
    pub fn with_device_id(mut self, device_id: Uuid) -> Self {
        self.device_id = device_id;
        self
    }

    /// Override the retry behavior.
    pub fn with_retry(mut self, config: RetryConfig) -> Self {
        self.retry = RetryExecutor::new(config);
        self
    }
}

#[async_trait]
impl SyncGateway for HttpSyncGateway {
    async fn sync(
        &self,
        local_changes: Vec<BookRecord>,
        last_synced_at: i64,
        direction: SyncDirection,
    ) -> Result<SyncBatch> {
        let body = SyncRequestBody {
            books: local_changes,
            last_synced_at,
            direction,
            device_id: self.device_id,
        };

        let client = self.client.clone();
        let endpoint = self.endpoint.clone();
        let token = self.token.clone();

        self.retry
            .execute(move || {
                let client = client.clone();
                let endpoint = endpoint.clone();
                let token = token.clone();
                let body = body.clone();
                async move {
                    let response = client
                        .post(endpoint)
                        .bearer_auth(&token)
                        .json(&body)
                        .send()
                        .await
                        .map_err(request_error)?;

                    let status = response.status();
                    if !status.is_success() {
                        let detail = response.text().await.unwrap_or_default();
                        return Err(Error::Gateway(format!("sync returned {status}: {detail}")));
                    }

                    response
                        .json::<SyncBatch>()
                        .await
                        .map_err(|e| Error::Serialization(e.to_string()))
                }
            })
            .await
    }
}

fn request_error(err: reqwest::Error) -> Error {
    if err.is_connect() || err.is_timeout() {
        Error::Network(err.to_string())
    } else {
        Error::Gateway(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&SyncDirection::Both).unwrap(),
            "\"both\""
        );
        assert_eq!(
            serde_json::to_string(&SyncDirection::Pull).unwrap(),
            "\"pull\""
        );
    }

    #[test]
    fn test_request_body_matches_wire_protocol() {
        let body = SyncRequestBody {
            books: vec![BookRecord::new("h1", "T", "A", 7)],
            last_synced_at: 42,
            direction: SyncDirection::Push,
            device_id: Uuid::nil(),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["lastSyncedAt"], 42);
        assert_eq!(json["type"], "push");
        assert_eq!(json["books"][0]["hash"], "h1");
        assert!(json.get("deviceId").is_some());
    }

    #[test]
    fn test_batch_round_trips() {
        let batch = SyncBatch {
            records: vec![BookRecord::new("h1", "T", "A", 7)],
            last_synced_at: 9,
        };
        let json = serde_json::to_string(&batch).unwrap();
        let restored: SyncBatch = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.last_synced_at, 9);
        assert_eq!(restored.records.len(), 1);
    }
}
