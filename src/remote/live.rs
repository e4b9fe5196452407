//! HTTP client for the live interface endpoints.

use super::{HttpClient, PositionSource, RemoteDocumentSource, RemoteError};
use crate::model::{RemoteDocumentStatus, TrackWorkNotification, TrainLocation};
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

const STATUS_PATH: &str = "/ruma/rti";
const LOCATIONS_PATH: &str = "/kuplas";

/// Live interface client. Every call goes through the shared retry policy.
#[derive(Clone)]
pub struct LiveInterfaceClient {
    base_url: String,
    http: Arc<dyn HttpClient>,
    retry: RetryPolicy,
}

impl LiveInterfaceClient {
    pub fn new(base_url: impl Into<String>, http: Arc<dyn HttpClient>, retry: RetryPolicy) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            http,
            retry,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        operation: &str,
        url: &str,
    ) -> Result<T, RemoteError> {
        self.retry
            .execute(operation, move || async move {
                debug!(url, "Requesting");
                let response = self.http.get(url).await?;
                response.json::<T>(url)
            })
            .await
    }
}

#[async_trait]
impl RemoteDocumentSource for LiveInterfaceClient {
    async fn statuses(&self) -> Result<Vec<RemoteDocumentStatus>, RemoteError> {
        let url = self.url(STATUS_PATH);
        self.get_json("trackwork.statuses", &url).await
    }

    async fn fetch_version(
        &self,
        id: u64,
        version: u32,
    ) -> Result<TrackWorkNotification, RemoteError> {
        let url = self.url(&format!("{}/{}/{}", STATUS_PATH, id, version));
        let notification: TrackWorkNotification =
            self.get_json("trackwork.version", &url).await?;

        if notification.id != id || notification.version != version {
            return Err(RemoteError::malformed(
                &url,
                format!(
                    "expected {}@v{}, got {}",
                    id,
                    version,
                    notification.versioned_id()
                ),
            ));
        }

        Ok(notification)
    }
}

#[async_trait]
impl PositionSource for LiveInterfaceClient {
    async fn fetch_locations(&self) -> Result<Vec<TrainLocation>, RemoteError> {
        let url = self.url(LOCATIONS_PATH);
        self.get_json("trainlocation.fetch", &url).await
    }
}
