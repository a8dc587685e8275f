//! Stream retrieval route.
//!
//! Connecting consumes the reservation and starts the piped encoder; the
//! response body is the encoder's stdout for as long as it runs. When the
//! client goes away the pipe is closed and the encoder exits on its own.

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tokio_util::io::ReaderStream;
use tracing::warn;

use crate::api::error::{ApiError, ApiResult};
use crate::api::server::AppState;

pub const STREAM_CONTENT_TYPE: &str = "video/mp2t";

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    #[serde(rename = "videoID")]
    pub video_id: Option<String>,
}

pub async fn stream_video(
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
) -> ApiResult<Response> {
    let video_id = query
        .video_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::bad_request("videoID is required"))?;

    let handle = state
        .manager
        .connect_stream(&video_id)
        .await
        .inspect_err(|e| {
            if !e.is_not_found() {
                warn!(video_id = %video_id, error = %e, "Failed to start stream");
            }
        })?;

    let body = Body::from_stream(ReaderStream::new(handle.output));
    Ok((
        [(CONTENT_TYPE, STREAM_CONTENT_TYPE), (CACHE_CONTROL, "no-cache")],
        body,
    )
        .into_response())
}
