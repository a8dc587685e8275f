//! Health check routes.

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;

use crate::api::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
    pub cameras: usize,
    pub recordings: usize,
    pub reservations: usize,
}

/// Create the health router.
pub fn router() -> Router<AppState> {
    Router::new().route("/", get(health_check))
}

/// Liveness plus camera and session counts.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let counts = state.manager.session_counts();
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.start_time.elapsed().as_secs(),
        cameras: state.manager.list_cameras().len(),
        recordings: counts.recordings,
        reservations: counts.reservations,
    })
}
