//! Room-side client for the search proxy

use async_trait::async_trait;
use partydj_api::{ErrorBody, SearchPage, SearchRequest};
use partydj_core::{SearchBackend, SearchError};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Reaches a running proxy's `/search` endpoint
pub struct ProxySearchClient {
    client: Client,
    search_url: String,
}

impl ProxySearchClient {
    /// `base_url` is the proxy root, e.g. `http://127.0.0.1:8787`
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            search_url: format!("{}/search", base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl SearchBackend for ProxySearchClient {
    async fn search(&self, request: &SearchRequest) -> Result<SearchPage, SearchError> {
        let response = self
            .client
            .get(&self.search_url)
            .query(&request.proxy_params())
            .send()
            .await
            .map_err(|e| SearchError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| SearchError::Transport(e.to_string()))?;
        debug!(status = %status, bytes = text.len(), "Proxy search response");

        if !status.is_success() {
            let (code, message) = match serde_json::from_str::<ErrorBody>(&text) {
                Ok(body) => (body.code, body.error),
                Err(_) => (None, text.chars().take(200).collect()),
            };
            return Err(SearchError::Status {
                status: status.as_u16(),
                code,
                message,
            });
        }

        let body: Value =
            serde_json::from_str(&text).map_err(|e| SearchError::Decode(e.to_string()))?;
        Ok(SearchPage::from_upstream(&body))
    }
}
