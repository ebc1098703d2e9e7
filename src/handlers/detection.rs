//! Detection handler

use axum::{extract::State, Json};

use crate::app::AppState;
use crate::error::AppResult;
use crate::models::{DetectionRequest, DetectionResponse};

/// Classify a batch of hosts and update tracking
pub async fn detect(
    State(state): State<AppState>,
    Json(req): Json<DetectionRequest>,
) -> AppResult<Json<DetectionResponse>> {
    let options = req.options;
    let run_options = req.run_options();
    let service = state.service.clone();
    let now = chrono::Utc::now();

    // Tracker I/O blocks
    let run = tokio::task::spawn_blocking(move || service.run(&req.hosts, &run_options, now)).await??;

    Ok(Json(DetectionResponse::from_run(run, options)))
}
