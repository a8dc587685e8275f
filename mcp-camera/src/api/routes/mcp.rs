//! MCP over HTTP: one JSON-RPC message per `POST /mcp`.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};

use crate::api::server::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", post(handle_message))
}

/// Notifications are acknowledged with `202 Accepted` and no body.
async fn handle_message(State(state): State<AppState>, body: String) -> Response {
    match state.mcp.handle_text(&body).await {
        Some(response) => Json(response).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}
