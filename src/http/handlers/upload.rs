//! `/empty`: drain and discard the request body.

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use futures_util::StreamExt;

use crate::observability::metrics;

pub async fn empty(body: Body) -> Response {
    metrics::record_request("empty");

    let mut frames = body.into_data_stream();
    let mut received = 0u64;
    while let Some(frame) = frames.next().await {
        match frame {
            Ok(bytes) => received += bytes.len() as u64,
            Err(e) => {
                tracing::debug!(error = %e, received, "Upload body read failed");
                metrics::record_upload_bytes(received);
                return StatusCode::BAD_REQUEST.into_response();
            }
        }
    }
    metrics::record_upload_bytes(received);

    ([(header::CONNECTION, "keep-alive")], StatusCode::OK).into_response()
}
