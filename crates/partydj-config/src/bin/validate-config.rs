//! Config validation CLI tool
//!
//! Validates a partydj configuration file and reports any errors.

use partydj_util::default_config_path;
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let config_path = match args.get(1) {
        Some(path) => PathBuf::from(path),
        None => {
            let default_path = default_config_path();
            eprintln!("Usage: validate-config [config-file]");
            eprintln!();
            eprintln!("Validates a partydj configuration file.");
            eprintln!();
            eprintln!("If no path is provided, uses: {}", default_path.display());
            return ExitCode::from(2);
        }
    };

    if !config_path.exists() {
        eprintln!("Error: Configuration file not found: {}", config_path.display());
        return ExitCode::from(1);
    }

    match partydj_config::load_config(&config_path) {
        Ok(settings) => {
            let proxy = &settings.proxy;
            let room = &settings.room;
            println!("✓ Configuration is valid");
            println!();
            println!("Proxy:");
            println!("  Bind: {}", proxy.bind);
            println!("  Upstream: {} (max {} results)", proxy.upstream_url, proxy.max_results);
            println!("  API key variable: {}", proxy.api_key_env);
            if proxy.allowed_origins.is_empty() {
                println!("  Allowed origins: (none)");
            } else {
                println!("  Allowed origins:");
                for origin in &proxy.allowed_origins {
                    println!("    - {}", origin);
                }
            }
            println!(
                "  Rate limit: {} per {}ms, gap {}ms",
                proxy.rate_limit.max_per_window, proxy.rate_limit.window_ms, proxy.rate_limit.min_gap_ms
            );
            println!();
            println!("Room:");
            println!("  Songs per user: {}", room.max_songs_per_user);
            println!(
                "  Heartbeat: {}ms, stale after {}ms",
                room.heartbeat_ms, room.presence_stale_ms
            );
            println!("  Auto DJ: {}", if room.autofill { "on" } else { "off" });
            println!();
            println!("Store: {}", settings.store.connection.database_url);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed");
            eprintln!();
            match &e {
                partydj_config::ConfigError::ReadError(io_err) => {
                    eprintln!("Failed to read file: {}", io_err);
                }
                partydj_config::ConfigError::ParseError(parse_err) => {
                    eprintln!("TOML parse error:");
                    eprintln!("  {}", parse_err);
                }
                partydj_config::ConfigError::ValidationFailed { errors } => {
                    eprintln!("Validation errors ({}):", errors.len());
                    for err in errors {
                        eprintln!("  - {}", err);
                    }
                }
                partydj_config::ConfigError::UnsupportedVersion(ver) => {
                    eprintln!(
                        "Unsupported config version: {} (expected {})",
                        ver,
                        partydj_config::CURRENT_CONFIG_VERSION
                    );
                }
            }
            ExitCode::from(1)
        }
    }
}
