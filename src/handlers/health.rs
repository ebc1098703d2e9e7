//! Health check handler

use axum::Json;
use serde::Serialize;

use crate::detection::batch::required_fields;
use crate::publisher::SERVICE_NAME;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
    timestamp: i64,
}

pub async fn check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
        timestamp: chrono::Utc::now().timestamp(),
    })
}

#[derive(Serialize)]
pub struct ServiceInfo {
    service: &'static str,
    version: &'static str,
    health: &'static str,
    description: &'static str,
    /// Fields every submitted host record must carry
    required_fields: Vec<&'static str>,
}

pub async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        service: "Zombie Host Detector API",
        version: env!("CARGO_PKG_VERSION"),
        health: "/api/v1/health",
        description: "Zombie host classification and lifecycle tracking",
        required_fields: required_fields(),
    })
}
