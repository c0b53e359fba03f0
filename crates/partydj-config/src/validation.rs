//! Configuration validation

use crate::connection::{parse_connection, ConnectionParseError};
use crate::schema::{RawConfig, RawRateLimit, DEFAULT_HEARTBEAT_MS, DEFAULT_PRESENCE_STALE_MS};
use partydj_util::RateLimitConfig;
use std::net::SocketAddr;
use thiserror::Error;

/// Validation error
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("Rate limit [{section}]: {message}")]
    RateLimit {
        section: &'static str,
        message: String,
    },

    #[error("allowed_origins must list explicit origins, not '*'")]
    WildcardOrigin,

    #[error("Invalid bind address '{value}': {message}")]
    InvalidBind { value: String, message: String },

    #[error("upstream_url must be an http(s) URL: {0}")]
    InvalidUpstreamUrl(String),

    #[error("max_results {0} is outside 1..=50")]
    MaxResultsOutOfRange(u32),

    #[error("Room config error: {0}")]
    RoomError(String),

    #[error("Store connection: {0}")]
    StoreConnection(#[from] ConnectionParseError),
}

/// Validate a raw configuration, collecting every problem
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let proxy = &config.proxy;
    errors.extend(validate_rate_limit(
        "proxy.rate_limit",
        &proxy.rate_limit,
        RateLimitConfig::PROXY,
    ));
    errors.extend(validate_rate_limit(
        "room.search_rate_limit",
        &config.room.search_rate_limit,
        RateLimitConfig::CLIENT_SEARCH,
    ));

    if proxy.allowed_origins.iter().any(|o| o.trim() == "*") {
        errors.push(ValidationError::WildcardOrigin);
    }

    if let Err(e) = parse_bind(proxy.bind_str()) {
        errors.push(e);
    }

    let upstream = proxy.upstream_url_str();
    if !(upstream.starts_with("http://") || upstream.starts_with("https://")) {
        errors.push(ValidationError::InvalidUpstreamUrl(upstream.to_string()));
    }

    let max_results = proxy.max_results_or_default();
    if !(1..=50).contains(&max_results) {
        errors.push(ValidationError::MaxResultsOutOfRange(max_results));
    }

    let room = &config.room;
    let heartbeat_ms = room.heartbeat_ms.unwrap_or(DEFAULT_HEARTBEAT_MS);
    let stale_ms = room.presence_stale_ms.unwrap_or(DEFAULT_PRESENCE_STALE_MS);
    if heartbeat_ms == 0 {
        errors.push(ValidationError::RoomError("heartbeat_ms must be positive".into()));
    }
    if stale_ms < heartbeat_ms {
        errors.push(ValidationError::RoomError(format!(
            "presence_stale_ms ({}) is shorter than heartbeat_ms ({})",
            stale_ms, heartbeat_ms
        )));
    }
    if room.max_songs_per_user == Some(0) {
        errors.push(ValidationError::RoomError(
            "max_songs_per_user must be at least 1".into(),
        ));
    }
    if room.chat_max_len == Some(0) {
        errors.push(ValidationError::RoomError("chat_max_len must be positive".into()));
    }

    if let Some(text) = &config.store.connection
        && let Err(e) = parse_connection(text)
    {
        errors.push(e.into());
    }

    errors
}

fn validate_rate_limit(
    section: &'static str,
    raw: &RawRateLimit,
    defaults: RateLimitConfig,
) -> Vec<ValidationError> {
    let config = raw.resolve(defaults);
    let mut errors = Vec::new();

    if config.window_ms == 0 {
        errors.push(ValidationError::RateLimit {
            section,
            message: "window_ms must be positive".into(),
        });
    }
    if config.max_per_window == 0 {
        errors.push(ValidationError::RateLimit {
            section,
            message: "max_per_window must be positive".into(),
        });
    }
    if config.window_ms > 0 && config.min_gap_ms >= config.window_ms {
        errors.push(ValidationError::RateLimit {
            section,
            message: format!(
                "min_gap_ms ({}) must be shorter than window_ms ({})",
                config.min_gap_ms, config.window_ms
            ),
        });
    }

    errors
}

/// Parse a listen address like `0.0.0.0:8787` or `[::1]:8787`
pub fn parse_bind(value: &str) -> Result<SocketAddr, ValidationError> {
    value
        .trim()
        .parse()
        .map_err(|e: std::net::AddrParseError| ValidationError::InvalidBind {
            value: value.to_string(),
            message: e.to_string(),
        })
}
