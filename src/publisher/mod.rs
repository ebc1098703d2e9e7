//! Event Publisher
//!
//! Best-effort delivery of detection, tracking and lifecycle events.
//! Publishing never fails a run: errors are logged and dropped.

pub mod webhook;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;

use crate::detection::{BatchSummary, DetectionResult};
use crate::tracking::TrackingUpdate;

pub use webhook::WebhookPublisher;

pub const SERVICE_NAME: &str = "zombie-detector";

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("endpoint rejected event with status {0}")]
    Status(u16),

    #[error("no async runtime available")]
    NoRuntime,
}

// ============================================================================
// EVENTS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleKind {
    ZombieNew,
    ZombieKilled,
}

impl LifecycleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleKind::ZombieNew => "zombie_new",
            LifecycleKind::ZombieKilled => "zombie_killed",
        }
    }
}

/// A host entering or leaving the zombie set
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LifecycleEvent {
    pub event_type: LifecycleKind,
    pub zombie_id: String,
    /// Detection result for new zombies, last known one for killed zombies
    pub zombie: Option<DetectionResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EventMetadata {
    pub service: &'static str,
    pub version: &'static str,
}

impl Default for EventMetadata {
    fn default() -> Self {
        Self {
            service: SERVICE_NAME,
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

/// Wire envelope for every published message
#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    pub topic: String,
    pub key: String,
    pub timestamp: DateTime<Utc>,
    pub payload: Value,
    pub metadata: EventMetadata,
}

/// Topic names derived from a common prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    pub detections: String,
    pub tracking: String,
    pub lifecycle: String,
}

impl Topics {
    pub fn new(prefix: &str) -> Self {
        Self {
            detections: format!("{}-detections", prefix),
            tracking: format!("{}-tracking", prefix),
            lifecycle: format!("{}-lifecycle", prefix),
        }
    }

    /// One summary message followed by one message per zombie result
    pub fn detection_envelopes(
        &self,
        results: &[DetectionResult],
        summary: &BatchSummary,
        now: DateTime<Utc>,
    ) -> Vec<Envelope> {
        let mut envelopes = Vec::with_capacity(results.len() + 1);
        envelopes.push(envelope(
            &self.detections,
            "detection-summary".to_string(),
            now,
            serde_json::to_value(summary).unwrap_or(Value::Null),
        ));
        for result in results {
            envelopes.push(envelope(
                &self.detections,
                format!("host-{}", result.host_id),
                now,
                serde_json::to_value(result).unwrap_or(Value::Null),
            ));
        }
        envelopes
    }

    pub fn tracking_envelope(&self, update: &TrackingUpdate, now: DateTime<Utc>) -> Envelope {
        envelope(
            &self.tracking,
            "tracking-stats".to_string(),
            now,
            serde_json::to_value(update).unwrap_or(Value::Null),
        )
    }

    pub fn lifecycle_envelope(&self, event: &LifecycleEvent, now: DateTime<Utc>) -> Envelope {
        envelope(
            &self.lifecycle,
            format!("lifecycle-{}", event.zombie_id),
            now,
            serde_json::to_value(event).unwrap_or(Value::Null),
        )
    }
}

fn envelope(topic: &str, key: String, timestamp: DateTime<Utc>, payload: Value) -> Envelope {
    Envelope {
        topic: topic.to_string(),
        key,
        timestamp,
        payload,
        metadata: EventMetadata::default(),
    }
}

// ============================================================================
// PUBLISHER TRAIT
// ============================================================================

pub trait EventPublisher: Send + Sync {
    fn publish_detection(&self, results: &[DetectionResult], summary: &BatchSummary);

    fn publish_tracking(&self, update: &TrackingUpdate);

    fn publish_lifecycle(&self, event: LifecycleEvent);

    /// False for publishers that drop everything
    fn is_enabled(&self) -> bool {
        true
    }

    /// In-flight deliveries, for callers that must wait before exiting
    fn take_pending(&self) -> Vec<JoinHandle<()>> {
        Vec::new()
    }
}

/// Wait for every in-flight delivery of `publisher`
pub async fn flush(publisher: &dyn EventPublisher) {
    for handle in publisher.take_pending() {
        if let Err(e) = handle.await {
            tracing::warn!("Publish task failed: {}", e);
        }
    }
}

/// Publisher used when publishing is disabled
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPublisher;

impl EventPublisher for NoopPublisher {
    fn publish_detection(&self, _results: &[DetectionResult], _summary: &BatchSummary) {}

    fn publish_tracking(&self, _update: &TrackingUpdate) {}

    fn publish_lifecycle(&self, _event: LifecycleEvent) {}

    fn is_enabled(&self) -> bool {
        false
    }
}
