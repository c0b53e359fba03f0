//! Validated settings structures

use crate::connection::{parse_connection, StoreConnection};
use crate::schema::*;
use crate::validation::{parse_bind, ValidationError};
use partydj_util::{default_data_dir, RateLimitConfig};
use std::net::SocketAddr;
use std::time::Duration;

/// Validated settings ready for use by the proxy and room clients
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub proxy: ProxySettings,
    pub room: RoomSettings,
    pub store: StoreSettings,
}

impl Settings {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Result<Self, ValidationError> {
        Ok(Self {
            proxy: ProxySettings::from_raw(raw.proxy)?,
            room: RoomSettings::from_raw(raw.room),
            store: StoreSettings::from_raw(raw.store)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ProxySettings {
    pub bind: SocketAddr,
    pub allowed_origins: Vec<String>,
    pub allow_missing_origin: bool,
    pub upstream_url: String,
    pub max_results: u32,
    pub api_key_env: String,
    pub evict_interval: Duration,
    pub rate_limit: RateLimitConfig,
}

impl ProxySettings {
    fn from_raw(raw: RawProxyConfig) -> Result<Self, ValidationError> {
        Ok(Self {
            bind: parse_bind(raw.bind_str())?,
            upstream_url: raw.upstream_url_str().to_string(),
            max_results: raw.max_results_or_default(),
            allowed_origins: raw
                .allowed_origins
                .iter()
                .map(|o| o.trim().trim_end_matches('/').to_string())
                .filter(|o| !o.is_empty())
                .collect(),
            allow_missing_origin: raw.allow_missing_origin.unwrap_or(true),
            api_key_env: raw
                .api_key_env
                .unwrap_or_else(|| DEFAULT_API_KEY_ENV.to_string()),
            evict_interval: Duration::from_secs(
                raw.evict_interval_secs
                    .unwrap_or(DEFAULT_EVICT_INTERVAL_SECS)
                    .max(1),
            ),
            rate_limit: raw.rate_limit.resolve(RateLimitConfig::PROXY),
        })
    }

    /// Whether a request with this Origin header may use the proxy
    pub fn origin_allowed(&self, origin: Option<&str>) -> bool {
        match origin {
            None => self.allow_missing_origin,
            Some(origin) => {
                let origin = origin.trim_end_matches('/');
                self.allowed_origins.iter().any(|allowed| allowed == origin)
            }
        }
    }
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8787)),
            allowed_origins: Vec::new(),
            allow_missing_origin: true,
            upstream_url: DEFAULT_UPSTREAM_URL.to_string(),
            max_results: DEFAULT_MAX_RESULTS,
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            evict_interval: Duration::from_secs(DEFAULT_EVICT_INTERVAL_SECS),
            rate_limit: RateLimitConfig::PROXY,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RoomSettings {
    pub max_songs_per_user: u32,
    pub heartbeat_ms: u64,
    pub presence_stale_ms: u64,
    pub chat_max_len: usize,
    pub chat_history: usize,
    pub autofill: bool,
    pub search_rate_limit: RateLimitConfig,
}

impl RoomSettings {
    fn from_raw(raw: RawRoomConfig) -> Self {
        Self {
            max_songs_per_user: raw.max_songs_per_user.unwrap_or(DEFAULT_MAX_SONGS_PER_USER),
            heartbeat_ms: raw.heartbeat_ms.unwrap_or(DEFAULT_HEARTBEAT_MS),
            presence_stale_ms: raw.presence_stale_ms.unwrap_or(DEFAULT_PRESENCE_STALE_MS),
            chat_max_len: raw.chat_max_len.unwrap_or(DEFAULT_CHAT_MAX_LEN),
            chat_history: raw.chat_history.unwrap_or(DEFAULT_CHAT_HISTORY),
            autofill: raw.autofill,
            search_rate_limit: raw.search_rate_limit.resolve(RateLimitConfig::CLIENT_SEARCH),
        }
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_ms.max(1))
    }
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self::from_raw(RawRoomConfig::default())
    }
}

#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub connection: StoreConnection,
}

impl StoreSettings {
    fn from_raw(raw: RawStoreConfig) -> Result<Self, ValidationError> {
        let connection = match raw.connection {
            Some(text) => parse_connection(&text)?,
            None => default_connection(),
        };
        Ok(Self { connection })
    }
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            connection: default_connection(),
        }
    }
}

/// SQLite database under the data directory
fn default_connection() -> StoreConnection {
    let path = default_data_dir().join("rooms.db");
    StoreConnection::new(format!("sqlite:{}", path.display()))
}
