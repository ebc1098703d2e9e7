//! Code catalogue handlers

use axum::{extract::State, Json};

use crate::app::AppState;
use crate::models::{CriteriaResponse, StatesResponse};

/// Effective state of every code
pub async fn states(State(state): State<AppState>) -> Json<StatesResponse> {
    Json(StatesResponse::from_policy(state.service.policy()))
}

pub async fn criteria() -> Json<CriteriaResponse> {
    Json(CriteriaResponse::catalogue())
}
