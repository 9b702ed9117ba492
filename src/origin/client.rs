//! Remote Origin HTTP Client
//!
//! Resolves intercepted request URLs against the configured origin and
//! snapshots full responses. No retry logic lives here: read-path recovery
//! is the strategy dispatcher's job and mutation retries are driven by
//! connectivity signals in the deferred task queue.

use std::time::Duration;

use reqwest::Client;
use tracing::debug;
use url::Url;

use crate::store::{RequestKey, ResponseSnapshot};

use super::errors::OriginError;
use super::transport::OriginTransport;

/// HTTP client timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client for the remote origin
#[derive(Clone)]
pub struct OriginClient {
    /// HTTP client for making requests
    http_client: Client,
    /// Base URL all relative request paths resolve against
    base_url: Url,
}

impl OriginClient {
    /// Create a client for the given origin base URL
    ///
    /// # Arguments
    /// * `origin_url` - Absolute base URL of the remote origin
    pub fn new(origin_url: &str) -> Result<Self, OriginError> {
        let base_url = Url::parse(origin_url)
            .map_err(|e| OriginError::Request(format!("invalid origin url '{}': {}", origin_url, e)))?;

        let http_client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(OriginError::from)?;

        Ok(Self {
            http_client,
            base_url,
        })
    }

    /// Resolve a request URL (absolute or path-relative) against the origin
    fn resolve(&self, url: &str) -> Result<Url, OriginError> {
        self.base_url
            .join(url)
            .map_err(|e| OriginError::Request(format!("cannot resolve '{}': {}", url, e)))
    }

    /// Send a prepared request and snapshot status, headers, and body
    async fn execute(&self, request: reqwest::RequestBuilder) -> Result<ResponseSnapshot, OriginError> {
        let response = request.send().await?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).to_string(),
                )
            })
            .collect();
        let body = response.bytes().await?.to_vec();

        Ok(ResponseSnapshot {
            status,
            headers,
            body,
        })
    }
}

impl OriginTransport for OriginClient {
    fn fetch(
        &self,
        key: &RequestKey,
    ) -> impl std::future::Future<Output = Result<ResponseSnapshot, OriginError>> + Send {
        async move {
            let url = self.resolve(&key.url)?;
            let method = reqwest::Method::from_bytes(key.method.as_bytes())
                .map_err(|e| OriginError::Request(format!("invalid method '{}': {}", key.method, e)))?;

            debug!(method = %key.method, url = %url, "Fetching from origin");
            self.execute(self.http_client.request(method, url)).await
        }
    }

    fn fetch_fresh(
        &self,
        key: &RequestKey,
    ) -> impl std::future::Future<Output = Result<ResponseSnapshot, OriginError>> + Send {
        async move {
            let url = self.resolve(&key.url)?;

            debug!(url = %url, "Fetching fresh copy from origin");
            self.execute(
                self.http_client
                    .get(url)
                    .header("Cache-Control", "no-cache")
                    .header("Pragma", "no-cache"),
            )
            .await
        }
    }

    fn replay(
        &self,
        url: &str,
        payload: &serde_json::Value,
    ) -> impl std::future::Future<Output = Result<ResponseSnapshot, OriginError>> + Send {
        let body = payload.clone();
        async move {
            let url = self.resolve(url)?;

            debug!(url = %url, "Replaying deferred mutation to origin");
            self.execute(self.http_client.post(url).json(&body)).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_relative_path() {
        let client = OriginClient::new("https://api.example.test").unwrap();
        let url = client.resolve("/api/transactions?limit=10").unwrap();
        assert_eq!(url.as_str(), "https://api.example.test/api/transactions?limit=10");
    }

    #[test]
    fn test_resolve_keeps_absolute_urls() {
        let client = OriginClient::new("https://api.example.test").unwrap();
        let url = client.resolve("https://other.example.test/asset.js").unwrap();
        assert_eq!(url.host_str(), Some("other.example.test"));
    }

    #[test]
    fn test_rejects_invalid_origin() {
        assert!(OriginClient::new("not a url").is_err());
    }
}
