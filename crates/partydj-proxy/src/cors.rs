//! CORS headers
//!
//! The allowed origin is reflected back; anything else gets `null`. Never
//! a wildcard.

use axum::{
    extract::{Request, State},
    http::{
        header::{
            ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
            ACCESS_CONTROL_ALLOW_ORIGIN, ORIGIN, VARY,
        },
        HeaderMap, HeaderValue,
    },
    middleware::Next,
    response::Response,
};
use partydj_config::ProxySettings;

use crate::SharedState;

const NULL_ORIGIN: HeaderValue = HeaderValue::from_static("null");

/// Origin header of a request, if present and readable
pub(crate) fn request_origin(headers: &HeaderMap) -> Option<&str> {
    headers.get(ORIGIN).and_then(|v| v.to_str().ok())
}

/// Value for `Access-Control-Allow-Origin`
pub(crate) fn allow_origin(settings: &ProxySettings, origin: Option<&str>) -> HeaderValue {
    match origin {
        Some(origin) if settings.origin_allowed(Some(origin)) => {
            HeaderValue::from_str(origin).unwrap_or(NULL_ORIGIN)
        }
        _ => NULL_ORIGIN,
    }
}

/// Middleware adding CORS headers to every response
pub(crate) async fn cors_headers(
    State(state): State<SharedState>,
    request: Request,
    next: Next,
) -> Response {
    let allowed = allow_origin(state.settings(), request_origin(request.headers()));

    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, allowed);
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, OPTIONS"),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    headers.insert(VARY, HeaderValue::from_static("Origin"));
    response
}
