//! Zombie tracking handlers

use axum::{extract::{State, Path, Query}, Json};
use chrono::Utc;
use validator::Validate;

use crate::app::AppState;
use crate::error::{AppError, AppResult};
use crate::models::{CleanupQuery, CleanupResponse, KilledQuery, ZombieKilledResponse};
use crate::tracking::{KilledSummary, TrackingUpdate, ZombieLifecycle};

/// Zombies killed in the last `since_hours`
pub async fn killed(
    State(state): State<AppState>,
    Query(query): Query<KilledQuery>,
) -> AppResult<Json<KilledSummary>> {
    query.validate()?;
    let tracker = state.tracker()?;

    let summary = tokio::task::spawn_blocking(move || tracker.killed_since(query.since_hours, Utc::now())).await?;
    Ok(Json(summary))
}

/// Partition computed by the last detection run
pub async fn tracking_stats(State(state): State<AppState>) -> AppResult<Json<TrackingUpdate>> {
    let tracker = state.tracker()?;
    let update = tokio::task::spawn_blocking(move || tracker.tracking_stats()).await?;
    Ok(Json(update))
}

pub async fn zombie_killed(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<ZombieKilledResponse>> {
    let tracker = state.tracker()?;
    let lookup = id.clone();
    let killed_info = tokio::task::spawn_blocking(move || tracker.killed_record(&lookup)).await?;

    Ok(Json(ZombieKilledResponse {
        is_killed: killed_info.is_some(),
        zombie_id: id,
        killed_info,
    }))
}

pub async fn lifecycle(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<ZombieLifecycle>> {
    let tracker = state.tracker()?;
    let lookup = id.clone();
    let lifecycle = tokio::task::spawn_blocking(move || tracker.lifecycle(&lookup)).await?;

    if lifecycle.is_unknown() {
        return Err(AppError::NotFound(format!("No lifecycle data found for zombie {}", id)));
    }

    Ok(Json(lifecycle))
}

/// Drop tracking data older than `days_to_keep`
pub async fn cleanup(
    State(state): State<AppState>,
    Query(query): Query<CleanupQuery>,
) -> AppResult<Json<CleanupResponse>> {
    query.validate()?;
    let tracker = state.tracker()?;
    let days = query.days_to_keep;

    let report = tokio::task::spawn_blocking(move || tracker.cleanup(days, Utc::now())).await??;

    Ok(Json(CleanupResponse {
        message: format!("Cleaned up zombie data older than {} days", days),
        history_removed: report.history_removed,
        killed_removed: report.killed_removed,
    }))
}
