//! HTTP routes and the shared proxy state

use axum::{
    extract::{ConnectInfo, Query, Request, State},
    http::{HeaderMap, StatusCode},
    middleware,
    routing::get,
    Json, Router,
};
use partydj_api::SearchRequest;
use partydj_config::ProxySettings;
use partydj_util::{ActorKey, Clock, RateDecision, SharedRateLimiter};
use serde::Deserialize;
use serde_json::{json, Value};
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::cors::{cors_headers, request_origin};
use crate::{ProxyError, Upstream};

pub type SharedState = Arc<ProxyState>;

/// Everything a request handler needs
pub struct ProxyState {
    settings: ProxySettings,
    api_key: Option<String>,
    limiter: SharedRateLimiter,
    clock: Arc<dyn Clock>,
    upstream: Arc<dyn Upstream>,
}

impl ProxyState {
    /// An empty `api_key` counts as not configured
    pub fn new(
        settings: ProxySettings,
        api_key: Option<String>,
        clock: Arc<dyn Clock>,
        upstream: Arc<dyn Upstream>,
    ) -> SharedState {
        let limiter = SharedRateLimiter::new(settings.rate_limit);
        Arc::new(Self {
            settings,
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            limiter,
            clock,
            upstream,
        })
    }

    pub fn settings(&self) -> &ProxySettings {
        &self.settings
    }

    pub fn limiter(&self) -> &SharedRateLimiter {
        &self.limiter
    }

    /// Forget clients whose rate windows have fully expired
    pub fn evict_expired(&self) -> usize {
        let evicted = self.limiter.evict_expired(self.clock.now_millis());
        if evicted > 0 {
            debug!(
                evicted,
                remaining = self.limiter.actor_count(),
                "Evicted idle rate limit windows"
            );
        }
        evicted
    }
}

/// Query string of `GET /search`
#[derive(Debug, Default, Deserialize)]
struct SearchParams {
    q: Option<String>,
    related: Option<String>,
    #[serde(rename = "pageToken")]
    page_token: Option<String>,
}

impl SearchParams {
    /// `related` wins over `q`; blank values count as absent
    fn into_request(self) -> Option<SearchRequest> {
        let page_token = self.page_token.filter(|t| !t.is_empty());
        let non_blank = |v: Option<String>| {
            v.map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(video_id) = non_blank(self.related) {
            return Some(SearchRequest::Related {
                video_id,
                page_token,
            });
        }
        non_blank(self.q).map(|q| SearchRequest::Query { q, page_token })
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Key a request is rate limited under: the address reported by the
/// fronting proxy if any, else the socket peer
pub fn client_address(headers: &HeaderMap, peer: Option<IpAddr>) -> ActorKey {
    let forwarded = header_str(headers, "x-forwarded-for")
        .and_then(|list| list.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());

    let address = header_str(headers, "x-nf-client-connection-ip")
        .or(forwarded)
        .or_else(|| header_str(headers, "client-ip"))
        .map(str::to_string)
        .or_else(|| peer.map(|ip| ip.to_string()))
        .unwrap_or_else(|| "unknown".to_string());

    ActorKey::new(address)
}

async fn search(
    State(state): State<SharedState>,
    request: Request,
) -> Result<Json<Value>, ProxyError> {
    let headers = request.headers();

    if !state.settings.origin_allowed(request_origin(headers)) {
        debug!(origin = ?request_origin(headers), "Origin rejected");
        return Err(ProxyError::Forbidden);
    }

    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let client = client_address(headers, peer);

    if let RateDecision::Rejected(reason) = state.limiter.allow(&client, state.clock.now_millis()) {
        debug!(client = %client, reason = %reason, "Search rate limited");
        return Err(ProxyError::RateLimited(reason));
    }

    let Some(api_key) = state.api_key.as_deref() else {
        warn!(env = %state.settings.api_key_env, "Search API key not configured");
        return Err(ProxyError::MissingApiKey(state.settings.api_key_env.clone()));
    };

    let params = Query::<SearchParams>::try_from_uri(request.uri())
        .map(|Query(params)| params)
        .unwrap_or_default();
    let search = params.into_request().ok_or(ProxyError::MissingQuery)?;

    debug!(client = %client, request = ?search, "Forwarding search");
    match state
        .upstream
        .search(&search, state.settings.max_results, api_key)
        .await
    {
        Ok(body) => Ok(Json(body)),
        Err(e) => {
            warn!(client = %client, error = %e, "Upstream search failed");
            Err(e.into())
        }
    }
}

async fn preflight() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn health() -> Json<Value> {
    Json(json!({ "ok": true }))
}

/// The proxy's routes with CORS and request tracing applied
pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/search", get(search).options(preflight))
        .route("/health", get(health))
        .layer(middleware::from_fn_with_state(state.clone(), cors_headers))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until `shutdown` resolves
pub async fn serve(
    listener: TcpListener,
    state: SharedState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(addr = %addr, "Search proxy listening");
    }
    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
}
