use crate::pipeline::PipelineStatsSnapshot;
use crate::relay::RelayMetrics;
use crate::state::AppState;
use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub subscribers: usize,
    #[serde(flatten)]
    pub pipeline: PipelineStatsSnapshot,
    pub relay: RelayMetrics,
    pub uptime_seconds: u64,
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let status = if state.cancel.is_cancelled() {
        "shutting_down"
    } else {
        "healthy"
    };

    let response = HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        subscribers: state.hub.subscriber_count(),
        pipeline: state.stats.snapshot(),
        relay: state.relay.metrics(),
        uptime_seconds: state.uptime_seconds(),
    };

    (StatusCode::OK, Json(response))
}
