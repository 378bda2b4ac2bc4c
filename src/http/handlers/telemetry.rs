//! `/results/telemetry`: persist one finished test run.
//!
//! Fields arrive URL-encoded or as multipart form data. The stored record
//! gets a fresh UUID and the current UTC time; the UUID is echoed back as
//! `id <uuid>` so the frontend can link to the result.

use std::collections::HashMap;
use std::sync::LazyLock;

use axum::body::Bytes;
use axum::extract::{FromRequest, Multipart, Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use regex::Regex;
use uuid::Uuid;

use crate::http::request::{collect_params, ClientIp};
use crate::http::state::AppState;
use crate::observability::metrics;
use crate::storage::TelemetryRecord;

pub const REDACTED_ADDRESS: &str = "0.0.0.0";

static IPV4_LITERAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:\d{1,3}\.){3}\d{1,3}\b").expect("valid regex"));

static IPV6_LITERAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:[0-9a-f]{1,4}:){7}[0-9a-f]{1,4}|(?:[0-9a-f]{1,4}:){1,7}:(?:[0-9a-f]{1,4}(?::[0-9a-f]{1,4}){0,5})?|::(?:[0-9a-f]{1,4}:){0,6}[0-9a-f]{1,4}",
    )
    .expect("valid regex")
});

static HOSTNAME_FIELD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""hostname"\s*:\s*"(?:[^"\\]|\\.)*""#).expect("valid regex"));

pub async fn telemetry(
    State(state): State<AppState>,
    client: ClientIp,
    headers: HeaderMap,
    request: Request,
) -> Response {
    metrics::record_request("telemetry");

    let fields = match read_fields(request).await {
        Ok(fields) => fields,
        Err(rejection) => return rejection,
    };
    let record = build_record(&fields, &client, &headers, state.redact_ip_addresses);
    let id = record.uuid.clone();

    let store = state.store.clone();
    match tokio::task::spawn_blocking(move || store.insert(&record)).await {
        Ok(Ok(())) => {
            metrics::record_telemetry_insert("ok");
            tracing::debug!(uuid = %id, "Telemetry stored");
            format!("id {id}").into_response()
        }
        Ok(Err(e)) => {
            metrics::record_telemetry_insert("error");
            tracing::error!(error = %e, "Inserting telemetry");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
        Err(e) => {
            metrics::record_telemetry_insert("error");
            tracing::error!(error = %e, "Telemetry insert task failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Form fields from the body, then the query string.
async fn read_fields(request: Request) -> Result<HashMap<String, String>, Response> {
    let query = request.uri().query().map(str::to_owned);
    let is_multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("multipart/form-data"));

    let mut fields = HashMap::new();
    if is_multipart {
        let mut multipart = Multipart::from_request(request, &())
            .await
            .map_err(IntoResponse::into_response)?;
        while let Some(field) = multipart.next_field().await.map_err(IntoResponse::into_response)? {
            let Some(name) = field.name().map(str::to_owned) else {
                continue;
            };
            let value = field.text().await.map_err(IntoResponse::into_response)?;
            fields.entry(name).or_insert(value);
        }
    } else {
        let body = Bytes::from_request(request, &())
            .await
            .map_err(IntoResponse::into_response)?;
        collect_params(&mut fields, &body);
    }

    if let Some(query) = query {
        collect_params(&mut fields, query.as_bytes());
    }
    Ok(fields)
}

fn build_record(
    fields: &HashMap<String, String>,
    client: &ClientIp,
    headers: &HeaderMap,
    redact: bool,
) -> TelemetryRecord {
    let field = |name: &str| fields.get(name).cloned().unwrap_or_default();
    let header_value = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    };

    let mut isp_info = field("ispinfo");
    if isp_info.is_empty() {
        isp_info = "{}".to_string();
    }
    let mut log = field("log");
    let mut ip_address = client.as_str().to_string();

    if redact {
        ip_address = REDACTED_ADDRESS.to_string();
        isp_info = redact_text(&isp_info);
        log = redact_text(&log);
    }

    TelemetryRecord {
        timestamp: Utc::now(),
        ip_address,
        isp_info,
        extra: field("extra"),
        user_agent: header_value(header::USER_AGENT),
        language: header_value(header::ACCEPT_LANGUAGE),
        download: field("dl"),
        upload: field("ul"),
        ping: field("ping"),
        jitter: field("jitter"),
        log,
        uuid: Uuid::new_v4().to_string(),
    }
}

/// Scrub address literals and JSON `hostname` values.
pub fn redact_text(text: &str) -> String {
    let text = HOSTNAME_FIELD.replace_all(text, r#""hostname":"REDACTED""#);
    let text = IPV4_LITERAL.replace_all(&text, REDACTED_ADDRESS);
    IPV6_LITERAL.replace_all(&text, REDACTED_ADDRESS).into_owned()
}
