//! Network handoff of batches to the collector.

use async_trait::async_trait;
use pulse_types::{Event, Properties};
use serde::{Deserialize, Serialize};

use crate::error::TransportError;

/// Request body POSTed to the collector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchPayload {
    #[serde(rename = "apiKey")]
    pub api_key: String,
    pub events: Vec<Event>,
    /// User-properties snapshot taken when the batch was cut.
    #[serde(default)]
    pub user: Properties,
}

/// Delivers batches to a collector endpoint.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends `payload` and waits for the response.
    ///
    /// Any response is a completed attempt and yields its status code.
    /// `Err` means the request never completed.
    async fn send(&self, endpoint: &str, payload: &BatchPayload) -> Result<u16, TransportError>;

    /// Hands `payload` off without waiting for the outcome.
    ///
    /// Returns `false` only if the handoff itself was refused.
    fn send_beacon(&self, endpoint: &str, payload: &BatchPayload) -> bool;
}

/// [`Transport`] over `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Builds a client identifying itself as the Pulse engine.
    ///
    /// No request timeout is set beyond the client's own defaults.
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("pulse-engine/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, endpoint: &str, payload: &BatchPayload) -> Result<u16, TransportError> {
        let body = serde_json::to_vec(payload)?;
        let resp = self
            .client
            .post(endpoint)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "collector rejected batch");
        }
        Ok(status.as_u16())
    }

    fn send_beacon(&self, endpoint: &str, payload: &BatchPayload) -> bool {
        let body = match serde_json::to_vec(payload) {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode beacon batch");
                return false;
            }
        };
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("no async runtime available for beacon delivery");
            return false;
        };

        let request = self
            .client
            .post(endpoint)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body);
        handle.spawn(async move {
            if let Err(e) = request.send().await {
                tracing::debug!(error = %e, "beacon delivery failed");
            }
        });
        true
    }
}
