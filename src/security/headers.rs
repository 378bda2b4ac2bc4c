//! Response header policy shared by every route.
//!
//! # Responsibilities
//! - Permissive CORS so the browser frontend can live on any origin
//! - No-cache headers so measurements never hit an intermediary cache
//!
//! # Design Decisions
//! - Headers are set with `overriding` layers, handlers cannot opt out
//! - `Expires` uses the Unix epoch in RFC 1123 form

use axum::http::{header, HeaderName, HeaderValue, Method};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;

pub const NO_CACHE_CONTROL: &str = "no-cache, no-store, no-transform, must-revalidate, private, max-age=0";
pub const EPOCH_EXPIRES: &str = "Thu, 01 Jan 1970 00:00:00 UTC";

/// CORS policy: any origin, any header, the methods the frontend uses.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::HEAD, Method::OPTIONS])
        .allow_headers(Any)
}

/// Headers attached to every response to defeat caching.
pub fn no_cache_headers() -> [(HeaderName, HeaderValue); 4] {
    [
        (header::CACHE_CONTROL, HeaderValue::from_static(NO_CACHE_CONTROL)),
        (header::PRAGMA, HeaderValue::from_static("no-cache")),
        (header::EXPIRES, HeaderValue::from_static(EPOCH_EXPIRES)),
        (HeaderName::from_static("x-accel-expires"), HeaderValue::from_static("0")),
    ]
}

/// Wrap `router` so every response carries the no-cache headers.
pub fn with_no_cache<S>(router: Router<S>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    no_cache_headers()
        .into_iter()
        .fold(router, |router, (name, value)| {
            router.layer(SetResponseHeaderLayer::overriding(name, value))
        })
}
