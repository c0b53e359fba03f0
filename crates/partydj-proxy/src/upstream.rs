//! Upstream video search API

use async_trait::async_trait;
use partydj_api::SearchRequest;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Longest upstream body excerpt kept in an error
const DETAIL_LIMIT: usize = 200;

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("upstream returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("upstream body is not JSON: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for UpstreamError {
    fn from(e: reqwest::Error) -> Self {
        // The request URL carries the API key
        UpstreamError::Transport(e.without_url().to_string())
    }
}

/// Something that answers search requests with the upstream JSON body
#[async_trait]
pub trait Upstream: Send + Sync {
    async fn search(
        &self,
        request: &SearchRequest,
        max_results: u32,
        api_key: &str,
    ) -> Result<Value, UpstreamError>;
}

/// Query parameters for the upstream search endpoint
pub fn upstream_params(
    request: &SearchRequest,
    max_results: u32,
    api_key: &str,
) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("part", "snippet".to_string()),
        ("type", "video".to_string()),
        ("maxResults", max_results.to_string()),
    ];
    let page_token = match request {
        SearchRequest::Query { q, page_token } => {
            params.push(("q", q.trim().to_string()));
            page_token
        }
        SearchRequest::Related {
            video_id,
            page_token,
        } => {
            params.push(("relatedToVideoId", video_id.trim().to_string()));
            page_token
        }
    };
    if let Some(token) = page_token.as_ref().filter(|t| !t.is_empty()) {
        params.push(("pageToken", token.clone()));
    }
    params.push(("key", api_key.to_string()));
    params
}

/// The YouTube Data API search endpoint
pub struct YouTubeUpstream {
    client: Client,
    url: String,
}

impl YouTubeUpstream {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Upstream for YouTubeUpstream {
    async fn search(
        &self,
        request: &SearchRequest,
        max_results: u32,
        api_key: &str,
    ) -> Result<Value, UpstreamError> {
        let params = upstream_params(request, max_results, api_key);
        let response = self.client.get(&self.url).query(&params).send().await?;
        let status = response.status();
        let text = response.text().await?;
        debug!(status = %status, bytes = text.len(), "Upstream search complete");

        if !status.is_success() {
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body: text.chars().take(DETAIL_LIMIT).collect(),
            });
        }

        serde_json::from_str(&text).map_err(|e| UpstreamError::Decode(e.to_string()))
    }
}
