//! partydjd - The partydj service
//!
//! Wires together:
//! - Configuration loading
//! - Room store initialization
//! - The search proxy (HTTP)
//! - Periodic maintenance: idle rate-limit windows, stale presence entries

use anyhow::{Context, Result};
use clap::Parser;
use partydj_config::{load_config_or_default, Settings};
use partydj_core::sweep_stale_presence;
use partydj_proxy::{ProxyState, SharedState, YouTubeUpstream};
use partydj_store::{open_store, AuditEvent, AuditEventType, RoomStore};
use partydj_util::{default_config_path, Clock, SystemClock};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// Upstream search API request timeout
const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(10);

/// partydjd - Search proxy and room maintenance for partydj
#[derive(Parser, Debug)]
#[command(name = "partydjd")]
#[command(about = "Search proxy and room maintenance for partydj", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/partydj/config.toml)
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Listen address override (or set PARTYDJ_BIND env var)
    #[arg(short, long, env = "PARTYDJ_BIND")]
    bind: Option<SocketAddr>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

/// Main service state
struct Service {
    settings: Settings,
    bind: SocketAddr,
    store: Arc<dyn RoomStore>,
    proxy: SharedState,
    clock: Arc<dyn Clock>,
}

impl Service {
    fn new(args: &Args) -> Result<Self> {
        let settings = load_config_or_default(&args.config)
            .with_context(|| format!("Failed to load config from {:?}", args.config))?;

        info!(
            config_path = %args.config.display(),
            allowed_origins = settings.proxy.allowed_origins.len(),
            max_songs_per_user = settings.room.max_songs_per_user,
            "Configuration loaded"
        );

        let database_url = settings.store.connection.database_url.clone();
        let store = open_store(&database_url)
            .with_context(|| format!("Failed to open room store {}", database_url))?;

        info!(database_url = %database_url, "Store initialized");

        store.append_audit(AuditEvent::new(AuditEventType::ServiceStarted))?;

        let api_key = std::env::var(&settings.proxy.api_key_env).ok();
        if api_key.is_none() {
            warn!(
                env = %settings.proxy.api_key_env,
                "Search API key not set, /search will answer 500"
            );
        }

        let upstream = YouTubeUpstream::new(&settings.proxy.upstream_url, UPSTREAM_TIMEOUT)
            .context("Failed to create HTTP client")?;

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let proxy = ProxyState::new(
            settings.proxy.clone(),
            api_key,
            clock.clone(),
            Arc::new(upstream),
        );

        let bind = args.bind.unwrap_or(settings.proxy.bind);

        Ok(Self {
            settings,
            bind,
            store,
            proxy,
            clock,
        })
    }

    async fn run(self) -> Result<()> {
        let listener = TcpListener::bind(self.bind)
            .await
            .with_context(|| format!("Failed to bind {}", self.bind))?;

        // Set up signal handlers
        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;
        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;
        let shutdown = async move {
            tokio::select! {
                _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully"),
                _ = sigint.recv() => info!("Received SIGINT, shutting down gracefully"),
            }
        };

        let (stop_tx, stop_rx) = watch::channel(false);
        let maintenance = self.spawn_maintenance(stop_rx);

        info!("Service running");

        let served = partydj_proxy::serve(listener, self.proxy.clone(), shutdown).await;
        if let Err(e) = &served {
            error!(error = %e, "Search proxy failed");
        }

        info!("Shutting down partydjd");

        let _ = stop_tx.send(true);
        if let Err(e) = maintenance.await {
            warn!(error = %e, "Maintenance task ended abnormally");
        }

        if let Err(e) = self
            .store
            .append_audit(AuditEvent::new(AuditEventType::ServiceStopped))
        {
            warn!(error = %e, "Failed to log service shutdown");
        }

        info!("Shutdown complete");
        served.context("Search proxy error")
    }

    /// Every `evict_interval`: drop idle rate-limit windows and sweep stale
    /// presence entries out of the store
    fn spawn_maintenance(&self, mut stop: watch::Receiver<bool>) -> JoinHandle<()> {
        let proxy = self.proxy.clone();
        let store = self.store.clone();
        let clock = self.clock.clone();
        let period = self.settings.proxy.evict_interval;
        let stale_ms = self.settings.room.presence_stale_ms;

        tokio::spawn(async move {
            let mut timer = tokio::time::interval(period);
            // First tick fires immediately
            timer.tick().await;

            loop {
                tokio::select! {
                    _ = stop.changed() => break,
                    _ = timer.tick() => {
                        let evicted = proxy.evict_expired();
                        match sweep_stale_presence(store.as_ref(), clock.now_millis(), stale_ms) {
                            Ok(swept) => debug!(evicted, swept, "Maintenance pass complete"),
                            Err(e) => warn!(error = %e, "Presence sweep failed"),
                        }
                    }
                }
            }
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "partydjd starting");

    let service = Service::new(&args)?;
    service.run().await
}
