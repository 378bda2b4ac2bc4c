//! `/garbage`: stream the shared random chunk `ckSize` times.

use axum::body::Body;
use axum::extract::{RawQuery, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};

use crate::http::request::first_param;
use crate::http::response::ChunkStream;
use crate::http::state::AppState;
use crate::measure::chunk_count;
use crate::observability::metrics;

pub async fn garbage(State(state): State<AppState>, RawQuery(query): RawQuery) -> Response {
    metrics::record_request("garbage");

    let requested = first_param(query.as_deref(), "ckSize");
    let chunks = chunk_count(requested.as_deref(), state.default_chunks);
    let stream = ChunkStream::new(state.chunk.bytes(), chunks);

    (
        [
            ("content-description", "File Transfer"),
            (header::CONTENT_TYPE.as_str(), "application/octet-stream"),
            (header::CONTENT_DISPOSITION.as_str(), "attachment; filename=random.dat"),
            ("content-transfer-encoding", "binary"),
        ],
        Body::from_stream(stream),
    )
        .into_response()
}
