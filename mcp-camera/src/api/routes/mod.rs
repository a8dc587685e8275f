//! API route modules.

pub mod health;
pub mod mcp;
pub mod stream;

use axum::Router;
use axum::routing::get;

use crate::api::server::AppState;
use crate::camera::STREAM_ROUTE;

/// Create the main router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route(STREAM_ROUTE, get(stream::stream_video))
        .nest("/mcp", mcp::router())
        .nest("/health", health::router())
        .with_state(state)
}
