//! Route table and middleware stack.
//!
//! # Responsibilities
//! - Register every endpoint under its plain, `/backend`, and `.php` paths
//! - Mount the table under `url_base` when configured
//! - Wire up middleware (request ID, tracing, CORS, no-cache, panic recovery)

use axum::extract::DefaultBodyLimit;
use axum::routing::{any, get, post, MethodRouter};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::http::handlers::{download, ip, stats, telemetry, upload};
use crate::http::state::AppState;
use crate::security::headers::{cors_layer, with_no_cache};

/// Legacy prefix older frontends put in front of every endpoint.
pub const BACKEND_PREFIX: &str = "/backend";

/// The four paths an endpoint answers on.
pub fn endpoint_paths(path: &str) -> [String; 4] {
    [
        path.to_string(),
        format!("{BACKEND_PREFIX}{path}"),
        format!("{path}.php"),
        format!("{BACKEND_PREFIX}{path}.php"),
    ]
}

fn endpoints() -> [(&'static str, MethodRouter<AppState>); 5] {
    [
        ("/empty", any(upload::empty).layer(DefaultBodyLimit::disable())),
        ("/garbage", get(download::garbage)),
        ("/getIP", get(ip::get_ip)),
        ("/results/telemetry", post(telemetry::telemetry)),
        ("/stats", get(stats::stats).post(stats::stats)),
    ]
}

/// Normalized mount point, `None` for the root.
pub fn mount_point(url_base: &str) -> Option<String> {
    let trimmed = url_base.trim_matches('/');
    (!trimmed.is_empty()).then(|| format!("/{trimmed}"))
}

/// Build the application router.
pub fn build_router(state: AppState, url_base: &str) -> Router {
    let mut api = Router::new();
    for (path, handler) in endpoints() {
        for alias in endpoint_paths(path) {
            api = api.route(&alias, handler.clone());
        }
    }
    let api = api.with_state(state);

    let app = match mount_point(url_base) {
        Some(base) => {
            tracing::info!(url_base = %base, "Mounting routes under base path");
            Router::new().nest(&base, api)
        }
        None => api,
    };

    with_middleware(app)
}

pub(crate) fn with_middleware(router: Router) -> Router {
    with_no_cache(router).layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(TraceLayer::new_for_http())
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(cors_layer())
            .layer(CatchPanicLayer::new()),
    )
}
