//! Default paths for partydj components
//!
//! - Config: `$PARTYDJ_CONFIG`, else `<config dir>/partydj/config.toml`
//! - Data: `$PARTYDJ_DATA_DIR`, else `<data dir>/partydj`

use std::path::PathBuf;

/// Environment variable for overriding the config file path
pub const PARTYDJ_CONFIG_ENV: &str = "PARTYDJ_CONFIG";

/// Environment variable for overriding the data directory
pub const PARTYDJ_DATA_DIR_ENV: &str = "PARTYDJ_DATA_DIR";

const APP_DIR: &str = "partydj";
const CONFIG_FILENAME: &str = "config.toml";

/// Get the default config file path.
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = std::env::var(PARTYDJ_CONFIG_ENV) {
        return PathBuf::from(path);
    }
    config_path_without_env()
}

/// Config path from the platform config directory, ignoring `PARTYDJ_CONFIG`.
pub fn config_path_without_env() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(APP_DIR)
        .join(CONFIG_FILENAME)
}

/// Get the default data directory.
pub fn default_data_dir() -> PathBuf {
    if let Ok(path) = std::env::var(PARTYDJ_DATA_DIR_ENV) {
        return PathBuf::from(path);
    }
    data_dir_without_env()
}

/// Data directory from the platform data directory, ignoring `PARTYDJ_DATA_DIR`.
pub fn data_dir_without_env() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from("/tmp").join(APP_DIR).join("data"))
}
