//! Configuration parsing and validation for partydj
//!
//! Supports TOML configuration with:
//! - Versioned schema
//! - Search proxy settings (origins, upstream, per-address rate limit)
//! - Room behaviour (per-user queue cap, heartbeat and staleness, chat)
//! - A tolerant parser for pasted store connection objects
//! - Validation that reports every problem at once

mod connection;
mod schema;
mod settings;
mod validation;

pub use connection::*;
pub use schema::*;
pub use settings::*;
pub use validation::*;

use std::path::Path;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation failed: {errors:?}")]
    ValidationFailed { errors: Vec<ValidationError> },

    #[error("Unsupported config version: {0}")]
    UnsupportedVersion(u32),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Current supported config version
pub const CURRENT_CONFIG_VERSION: u32 = 1;

/// Load and validate configuration from a TOML file
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<Settings> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Load the config at `path`, falling back to built-in defaults when the
/// file does not exist. Any other failure is returned.
pub fn load_config_or_default(path: impl AsRef<Path>) -> ConfigResult<Settings> {
    let path = path.as_ref();
    match std::fs::read_to_string(path) {
        Ok(content) => parse_config(&content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!(path = %path.display(), "No config file, using defaults");
            Ok(Settings::default())
        }
        Err(e) => Err(e.into()),
    }
}

/// Parse and validate configuration from a TOML string
pub fn parse_config(content: &str) -> ConfigResult<Settings> {
    let raw: RawConfig = toml::from_str(content)?;

    if raw.config_version != CURRENT_CONFIG_VERSION {
        return Err(ConfigError::UnsupportedVersion(raw.config_version));
    }

    let errors = validate_config(&raw);
    if !errors.is_empty() {
        return Err(ConfigError::ValidationFailed { errors });
    }

    Settings::from_raw(raw).map_err(|e| ConfigError::ValidationFailed { errors: vec![e] })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parse_minimal_config() {
        let settings = parse_config("config_version = 1").unwrap();
        assert_eq!(settings.proxy.bind.port(), 8787);
        assert_eq!(settings.proxy.rate_limit.max_per_window, 60);
        assert_eq!(settings.room.search_rate_limit.min_gap_ms, 800);
        assert_eq!(settings.room.max_songs_per_user, 3);
        assert!(settings.proxy.allow_missing_origin);
    }

    #[test]
    fn parse_full_config() {
        let config = r#"
            config_version = 1

            [proxy]
            bind = "127.0.0.1:9000"
            allowed_origins = ["https://party.example.net/"]
            allow_missing_origin = false
            max_results = 25

            [proxy.rate_limit]
            max_per_window = 10

            [room]
            max_songs_per_user = 5
            autofill = true

            [store]
            connection = '''{ databaseURL: "memory:" }'''
        "#;

        let settings = parse_config(config).unwrap();
        assert_eq!(settings.proxy.bind.port(), 9000);
        assert_eq!(settings.proxy.max_results, 25);
        assert_eq!(settings.proxy.rate_limit.max_per_window, 10);
        assert_eq!(settings.proxy.rate_limit.window_ms, 60_000);
        assert_eq!(settings.room.max_songs_per_user, 5);
        assert!(settings.room.autofill);
        assert_eq!(settings.store.connection.database_url, "memory:");

        assert!(settings.proxy.origin_allowed(Some("https://party.example.net")));
        assert!(!settings.proxy.origin_allowed(Some("https://evil.example.com")));
        assert!(!settings.proxy.origin_allowed(None));
    }

    #[test]
    fn reject_wrong_version() {
        let result = parse_config("config_version = 99");
        assert!(matches!(result, Err(ConfigError::UnsupportedVersion(99))));
    }

    #[test]
    fn reject_invalid_values() {
        let config = r#"
            config_version = 1

            [room]
            chat_max_len = 0
        "#;
        match parse_config(config) {
            Err(ConfigError::ValidationFailed { errors }) => assert_eq!(errors.len(), 1),
            other => panic!("expected validation failure, got {:?}", other),
        }
    }

    #[test]
    fn load_from_file_and_missing_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "config_version = 1\n[room]\nheartbeat_ms = 5000").unwrap();
        let settings = load_config(file.path()).unwrap();
        assert_eq!(settings.room.heartbeat_ms, 5000);

        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        assert!(matches!(load_config(&missing), Err(ConfigError::ReadError(_))));
        let defaults = load_config_or_default(&missing).unwrap();
        assert_eq!(defaults.room.heartbeat_ms, DEFAULT_HEARTBEAT_MS);
    }
}
