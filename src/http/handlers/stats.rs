//! `/stats`: password-gated read access to stored results.

use std::collections::HashMap;

use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::http::request::collect_params;
use crate::http::state::AppState;
use crate::observability::metrics;
use crate::storage::{TelemetryRecord, LAST_RESULTS};

/// Largest urlencoded login body read.
const FORM_LIMIT: usize = 16 * 1024;

/// `id` value selecting the most recent results.
pub const LAST_RESULTS_ID: &str = "L100";

/// Body of an authorized `/stats` response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatsPage {
    pub data: Vec<TelemetryRecord>,
}

pub async fn stats(State(state): State<AppState>, request: Request) -> Response {
    metrics::record_request("stats");

    if !state.stats_enabled {
        return "Statistics are disabled".into_response();
    }
    if !state.stats_gate.is_configured() {
        return (StatusCode::FORBIDDEN, "Statistics password is not configured").into_response();
    }

    let (parts, body) = request.into_parts();
    let mut params = HashMap::new();
    let is_form = parts
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/x-www-form-urlencoded"));
    if is_form {
        match axum::body::to_bytes(body, FORM_LIMIT).await {
            Ok(bytes) => collect_params(&mut params, &bytes),
            Err(e) => {
                tracing::debug!(error = %e, "Reading stats form body");
                return StatusCode::BAD_REQUEST.into_response();
            }
        }
    }
    if let Some(query) = parts.uri.query() {
        collect_params(&mut params, query.as_bytes());
    }

    if !state.stats_gate.authorize(&parts.headers, &params) {
        let presented = parts.headers.contains_key(header::AUTHORIZATION) || params.contains_key("password");
        let status = if presented {
            StatusCode::FORBIDDEN
        } else {
            StatusCode::UNAUTHORIZED
        };
        return (status, [(header::WWW_AUTHENTICATE, "Bearer")], "Unauthorized").into_response();
    }

    let id = params.remove("id").unwrap_or_default();
    let store = state.store.clone();
    let fetched = tokio::task::spawn_blocking(move || match id.as_str() {
        LAST_RESULTS_ID => store.fetch_last(LAST_RESULTS),
        "" => Ok(Vec::new()),
        uuid => store.fetch_by_uuid(uuid).map(|record| vec![record]),
    })
    .await;

    match fetched {
        Ok(Ok(data)) => Json(StatsPage { data }).into_response(),
        Ok(Err(e)) => {
            tracing::error!(error = %e, "Fetching data from database");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "Stats fetch task failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
