//! Application state and router

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{
    cors::{CorsLayer, Any},
    trace::TraceLayer,
    compression::CompressionLayer,
};

use crate::config::Config;
use crate::detection::PolicyTable;
use crate::error::{AppError, AppResult};
use crate::handlers;
use crate::publisher::{EventPublisher, NoopPublisher, WebhookPublisher};
use crate::service::DetectionService;
use crate::tracking::ZombieTracker;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub service: Arc<DetectionService>,
}

impl AppState {
    pub fn new(config: Config, service: DetectionService) -> Self {
        Self {
            config,
            service: Arc::new(service),
        }
    }

    /// Wire policy, tracker and publisher from configuration
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let policy = PolicyTable::load(&config.states_path);

        let mut service = DetectionService::new(policy);

        if config.tracking_enabled {
            let tracker = ZombieTracker::open(&config.data_dir, config.tracker_settings())?;
            tracing::info!("Tracking data in {}", config.data_dir.display());
            service = service.with_tracker(Arc::new(tracker));
        } else {
            tracing::info!("Zombie tracking disabled");
        }

        let publisher: Arc<dyn EventPublisher> = if config.publisher_enabled {
            let publisher = WebhookPublisher::new(
                config.publisher_url.clone(),
                &config.topic_prefix,
                config.publish_timeout(),
            )?;
            tracing::info!("Publishing events to {}", publisher.url());
            Arc::new(publisher)
        } else {
            Arc::new(NoopPublisher)
        };
        service = service.with_publisher(publisher);

        Ok(Self::new(config, service))
    }

    /// Tracker, or 503 when tracking is disabled
    pub fn tracker(&self) -> AppResult<Arc<ZombieTracker>> {
        self.service
            .tracker()
            .cloned()
            .ok_or_else(|| AppError::ServiceUnavailable("Zombie tracking is disabled".to_string()))
    }
}

/// Create the main router with all routes
pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/api/v1/health", get(handlers::health::check))
        .route("/api/v1/zombie-detection", post(handlers::detection::detect))
        .route("/api/v1/states", get(handlers::catalog::states))
        .route("/api/v1/criteria", get(handlers::catalog::criteria));

    let zombie_routes = Router::new()
        .route("/api/v1/zombies/killed", get(handlers::zombies::killed))
        .route("/api/v1/zombies/tracking-stats", get(handlers::zombies::tracking_stats))
        .route("/api/v1/zombies/cleanup", post(handlers::zombies::cleanup))
        .route("/api/v1/zombies/:id/killed", get(handlers::zombies::zombie_killed))
        .route("/api/v1/zombies/:id/lifecycle", get(handlers::zombies::lifecycle));

    Router::new()
        .route("/", get(handlers::health::root))
        .merge(api_routes)
        .merge(zombie_routes)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        )
        .with_state(state)
}
