//! Proxy error responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use partydj_api::{ErrorBody, ErrorCode};
use partydj_util::RateLimitReason;
use thiserror::Error;

use crate::UpstreamError;

/// Every way a `/search` request can fail
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("forbidden")]
    Forbidden,

    #[error("Too many requests ({0})")]
    RateLimited(RateLimitReason),

    /// Carries the name of the environment variable that should hold the key
    #[error("{0} not set")]
    MissingApiKey(String),

    #[error("Missing q")]
    MissingQuery,

    #[error("YouTube fetch failed")]
    Upstream(#[from] UpstreamError),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::Forbidden => StatusCode::FORBIDDEN,
            ProxyError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            ProxyError::MissingApiKey(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::MissingQuery => StatusCode::BAD_REQUEST,
            ProxyError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            ProxyError::Forbidden => ErrorCode::Forbidden,
            ProxyError::RateLimited(RateLimitReason::Gap) => ErrorCode::RateLimitedGap,
            ProxyError::RateLimited(RateLimitReason::Window) => ErrorCode::RateLimitedWindow,
            ProxyError::MissingApiKey(_) => ErrorCode::MissingApiKey,
            ProxyError::MissingQuery => ErrorCode::MissingQuery,
            ProxyError::Upstream(_) => ErrorCode::UpstreamFailed,
        }
    }

    pub fn body(&self) -> ErrorBody {
        let body = ErrorBody::new(self.code(), self.to_string());
        match self {
            ProxyError::Upstream(e) => body.with_detail(e.to_string()),
            _ => body,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_body_names_the_reason() {
        let err = ProxyError::RateLimited(RateLimitReason::Window);
        assert_eq!(err.status(), StatusCode::TOO_MANY_REQUESTS);
        let body = err.body();
        assert_eq!(body.error, "Too many requests (window)");
        assert_eq!(body.code, Some(ErrorCode::RateLimitedWindow));
        assert!(body.detail.is_none());
    }

    #[test]
    fn upstream_failure_carries_detail() {
        let err = ProxyError::from(UpstreamError::Status {
            status: 403,
            body: "quotaExceeded".into(),
        });
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
        let body = err.body();
        assert_eq!(body.error, "YouTube fetch failed");
        assert!(body.detail.unwrap().contains("403"));
    }

    #[test]
    fn missing_key_names_the_variable() {
        let err = ProxyError::MissingApiKey("YOUTUBE_API_KEY".into());
        assert_eq!(err.body().error, "YOUTUBE_API_KEY not set");
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
