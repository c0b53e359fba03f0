//! Raw configuration schema (as parsed from TOML)
//!
//! Every field is optional; omitted values take the built-in defaults when
//! the raw config is resolved.

use partydj_util::RateLimitConfig;
use serde::{Deserialize, Serialize};

pub const DEFAULT_BIND: &str = "0.0.0.0:8787";
pub const DEFAULT_UPSTREAM_URL: &str = "https://www.googleapis.com/youtube/v3/search";
pub const DEFAULT_API_KEY_ENV: &str = "YOUTUBE_API_KEY";
pub const DEFAULT_MAX_RESULTS: u32 = 12;
pub const DEFAULT_EVICT_INTERVAL_SECS: u64 = 60;

pub const DEFAULT_MAX_SONGS_PER_USER: u32 = 3;
pub const DEFAULT_HEARTBEAT_MS: u64 = 15_000;
pub const DEFAULT_PRESENCE_STALE_MS: u64 = 60_000;
pub const DEFAULT_CHAT_MAX_LEN: usize = 300;
pub const DEFAULT_CHAT_HISTORY: usize = 100;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    /// Search proxy settings
    #[serde(default)]
    pub proxy: RawProxyConfig,

    /// Room behaviour shared by every client
    #[serde(default)]
    pub room: RawRoomConfig,

    /// Shared room store
    #[serde(default)]
    pub store: RawStoreConfig,
}

impl RawConfig {
    /// Empty config at the current version; resolves to all defaults
    pub fn empty() -> Self {
        Self {
            config_version: crate::CURRENT_CONFIG_VERSION,
            proxy: RawProxyConfig::default(),
            room: RawRoomConfig::default(),
            store: RawStoreConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawProxyConfig {
    /// Listen address (default: 0.0.0.0:8787)
    pub bind: Option<String>,

    /// Frontend origins allowed to call the proxy
    #[serde(default)]
    pub allowed_origins: Vec<String>,

    /// Accept requests that carry no Origin header (default: true)
    pub allow_missing_origin: Option<bool>,

    /// Upstream search endpoint
    pub upstream_url: Option<String>,

    /// Results per upstream page (1..=50)
    pub max_results: Option<u32>,

    /// Name of the environment variable holding the upstream API key
    pub api_key_env: Option<String>,

    /// How often idle rate-limit windows are dropped
    pub evict_interval_secs: Option<u64>,

    /// Per client address
    #[serde(default)]
    pub rate_limit: RawRateLimit,
}

impl RawProxyConfig {
    pub fn bind_str(&self) -> &str {
        self.bind.as_deref().unwrap_or(DEFAULT_BIND)
    }

    pub fn upstream_url_str(&self) -> &str {
        self.upstream_url.as_deref().unwrap_or(DEFAULT_UPSTREAM_URL)
    }

    pub fn max_results_or_default(&self) -> u32 {
        self.max_results.unwrap_or(DEFAULT_MAX_RESULTS)
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawRoomConfig {
    pub max_songs_per_user: Option<u32>,
    pub heartbeat_ms: Option<u64>,
    pub presence_stale_ms: Option<u64>,
    pub chat_max_len: Option<usize>,
    pub chat_history: Option<usize>,

    /// Queue a related video when the queue runs dry
    #[serde(default)]
    pub autofill: bool,

    /// Per local client
    #[serde(default)]
    pub search_rate_limit: RawRateLimit,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawStoreConfig {
    /// Connection object text; JSON or a pasted JS object literal
    pub connection: Option<String>,
}

/// Rate limit overrides; unset fields keep the call site's defaults
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawRateLimit {
    pub window_ms: Option<u64>,
    pub max_per_window: Option<u32>,
    pub min_gap_ms: Option<u64>,
}

impl RawRateLimit {
    pub fn resolve(&self, defaults: RateLimitConfig) -> RateLimitConfig {
        RateLimitConfig::new(
            self.window_ms.unwrap_or(defaults.window_ms),
            self.max_per_window.unwrap_or(defaults.max_per_window),
            self.min_gap_ms.unwrap_or(defaults.min_gap_ms),
        )
    }
}
