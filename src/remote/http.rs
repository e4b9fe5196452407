//! HTTP client abstraction

use super::RemoteError;
use async_trait::async_trait;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Parse a successful JSON body; non-success statuses become errors.
    pub fn json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, RemoteError> {
        if !self.is_success() {
            return Err(RemoteError::from_status(url, self.status));
        }
        serde_json::from_slice(&self.body)
            .map_err(|e| RemoteError::malformed(url, format!("invalid JSON: {}", e)))
    }
}

#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn request(
        &self,
        method: &str,
        url: &str,
        headers: Vec<(String, String)>,
        body: Option<Vec<u8>>,
    ) -> Result<HttpResponse, RemoteError>;

    async fn get(&self, url: &str) -> Result<HttpResponse, RemoteError> {
        self.request("GET", url, vec![("accept".into(), "application/json".into())], None)
            .await
    }

    async fn post_json(&self, url: &str, body: Vec<u8>) -> Result<HttpResponse, RemoteError> {
        self.request(
            "POST",
            url,
            vec![("content-type".into(), "application/json".into())],
            Some(body),
        )
        .await
    }
}

/// reqwest-based HTTP client
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("railsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn request(
        &self,
        method: &str,
        url: &str,
        headers: Vec<(String, String)>,
        body: Option<Vec<u8>>,
    ) -> Result<HttpResponse, RemoteError> {
        let method: reqwest::Method = method
            .parse()
            .map_err(|_| RemoteError::transport(url, format!("invalid HTTP method {}", method)))?;
        let mut builder = self.client.request(method, url);

        for (name, value) in &headers {
            builder = builder.header(name, value);
        }

        if let Some(body_bytes) = body {
            builder = builder.body(body_bytes);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| RemoteError::transport(url, e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| RemoteError::transport(url, format!("failed to read body: {}", e)))?
            .to_vec();

        Ok(HttpResponse { status, body })
    }
}
