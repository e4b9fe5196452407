//! Topic publishing for accepted train locations.

use crate::model::TrainLocation;
use crate::remote::{HttpClient, RemoteError};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("publish to '{topic}' failed: {source}")]
    Transport {
        topic: String,
        #[source]
        source: RemoteError,
    },

    #[error("failed to encode message for '{topic}': {message}")]
    Encode { topic: String, message: String },
}

/// Destination for per-train topic messages. Delivery is at-least-once.
#[async_trait]
pub trait PublishSink: Send + Sync {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), PublishError>;
}

/// `{prefix}train-locations/{departureDate}/{trainNumber}`
pub fn topic_for(prefix: &str, location: &TrainLocation) -> String {
    format!(
        "{}train-locations/{}/{}",
        prefix,
        location.train_location_id.departure_date,
        location.train_location_id.train_number
    )
}

#[derive(Serialize)]
struct BridgeMessage<'a> {
    topic: &'a str,
    payload: serde_json::Value,
}

/// Forwards messages to an HTTP-to-MQTT bridge as `{"topic", "payload"}` JSON.
pub struct HttpPublishSink {
    endpoint: String,
    http: Arc<dyn HttpClient>,
}

impl HttpPublishSink {
    pub fn new(endpoint: impl Into<String>, http: Arc<dyn HttpClient>) -> Self {
        Self {
            endpoint: endpoint.into(),
            http,
        }
    }
}

#[async_trait]
impl PublishSink for HttpPublishSink {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), PublishError> {
        let encode_err = |message: String| PublishError::Encode {
            topic: topic.to_string(),
            message,
        };
        let payload: serde_json::Value =
            serde_json::from_slice(payload).map_err(|e| encode_err(e.to_string()))?;
        let body = serde_json::to_vec(&BridgeMessage { topic, payload })
            .map_err(|e| encode_err(e.to_string()))?;

        let transport_err = |source: RemoteError| PublishError::Transport {
            topic: topic.to_string(),
            source,
        };
        let response = self
            .http
            .post_json(&self.endpoint, body)
            .await
            .map_err(transport_err)?;
        if !response.is_success() {
            return Err(transport_err(RemoteError::from_status(
                &self.endpoint,
                response.status,
            )));
        }
        Ok(())
    }
}

/// Writes messages to the log instead of a broker.
#[derive(Debug, Default)]
pub struct LogSink;

#[async_trait]
impl PublishSink for LogSink {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), PublishError> {
        info!(topic, payload = %String::from_utf8_lossy(payload), "Publish");
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// In-process fan-out over a tokio broadcast channel.
///
/// Slow subscribers lag and lose messages rather than blocking the pipeline.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    sender: broadcast::Sender<PublishedMessage>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PublishedMessage> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl PublishSink for BroadcastSink {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), PublishError> {
        let message = PublishedMessage {
            topic: topic.to_string(),
            payload: payload.to_vec(),
        };
        if self.sender.send(message).is_err() {
            debug!(topic, "No subscribers for published message");
        }
        Ok(())
    }
}
