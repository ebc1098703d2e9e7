//! Detection Service
//!
//! One detection run: batch processing, then the tracking update, then
//! publishing. A tracking failure does not discard results and a publish
//! failure does not affect either.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::detection::{self, BatchOutcome, InvalidRecord, PolicyTable};
use crate::publisher::{EventPublisher, LifecycleEvent, LifecycleKind, NoopPublisher};
use crate::tracking::{TrackingUpdate, ZombieTracker};

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("no hosts provided")]
    NoHosts,

    #[error("all {} host records are invalid", .0.len())]
    AllInvalid(Vec<InvalidRecord>),
}

/// Per-run switches
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Merged over the configured policy table for this run only
    pub overrides: Option<PolicyTable>,
    pub track: bool,
    pub publish: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            overrides: None,
            track: true,
            publish: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingStatus {
    Updated,
    Disabled,
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackingReport {
    pub status: TrackingStatus,
    #[serde(flatten)]
    pub update: Option<TrackingUpdate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TrackingReport {
    fn disabled() -> Self {
        Self {
            status: TrackingStatus::Disabled,
            update: None,
            error: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishingStatus {
    Dispatched,
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PublishingReport {
    pub status: PublishingStatus,
    pub lifecycle_events: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionRun {
    pub outcome: BatchOutcome,
    pub tracking: TrackingReport,
    pub publishing: PublishingReport,
}

pub struct DetectionService {
    policy: PolicyTable,
    tracker: Option<Arc<ZombieTracker>>,
    publisher: Arc<dyn EventPublisher>,
}

impl DetectionService {
    pub fn new(policy: PolicyTable) -> Self {
        Self {
            policy,
            tracker: None,
            publisher: Arc::new(NoopPublisher),
        }
    }

    pub fn with_tracker(mut self, tracker: Arc<ZombieTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.publisher = publisher;
        self
    }

    pub fn policy(&self) -> &PolicyTable {
        &self.policy
    }

    pub fn tracker(&self) -> Option<&Arc<ZombieTracker>> {
        self.tracker.as_ref()
    }

    pub fn publisher(&self) -> &Arc<dyn EventPublisher> {
        &self.publisher
    }

    /// Run a detection over raw host records. Blocks on tracker I/O.
    pub fn run(&self, hosts: &[Value], options: &RunOptions, now: DateTime<Utc>) -> Result<DetectionRun, RunError> {
        if hosts.is_empty() {
            return Err(RunError::NoHosts);
        }

        let policy = match &options.overrides {
            Some(overrides) => self.policy.with_overrides(overrides),
            None => self.policy.clone(),
        };

        let outcome = detection::process(hosts, &policy);
        if outcome.results.is_empty() {
            return Err(RunError::AllInvalid(outcome.invalid));
        }

        tracing::info!(
            "Detection run: {} hosts, {} zombies, {} invalid",
            outcome.summary.total_hosts,
            outcome.summary.zombie_hosts,
            outcome.invalid.len()
        );

        let tracking = match (&self.tracker, options.track) {
            (Some(tracker), true) => match tracker.update(&outcome.results, now) {
                Ok(update) => TrackingReport {
                    status: TrackingStatus::Updated,
                    update: Some(update),
                    error: None,
                },
                Err(e) => {
                    tracing::error!("Tracking update failed: {}", e);
                    TrackingReport {
                        status: TrackingStatus::Unavailable,
                        update: None,
                        error: Some(e.to_string()),
                    }
                }
            },
            _ => TrackingReport::disabled(),
        };

        let publishing = if options.publish && self.publisher.is_enabled() {
            let lifecycle_events = self.publish(&outcome, &tracking);
            PublishingReport {
                status: PublishingStatus::Dispatched,
                lifecycle_events,
            }
        } else {
            PublishingReport {
                status: PublishingStatus::Disabled,
                lifecycle_events: 0,
            }
        };

        Ok(DetectionRun {
            outcome,
            tracking,
            publishing,
        })
    }

    fn publish(&self, outcome: &BatchOutcome, tracking: &TrackingReport) -> usize {
        // Per-host messages cover zombies only; the summary covers the batch
        self.publisher.publish_detection(&outcome.zombies(), &outcome.summary);

        let update = match &tracking.update {
            Some(update) => update,
            None => return 0,
        };
        self.publisher.publish_tracking(update);

        let mut events = Vec::with_capacity(update.new_zombies.len() + update.killed_zombies.len());
        for id in &update.new_zombies {
            events.push(LifecycleEvent {
                event_type: LifecycleKind::ZombieNew,
                zombie_id: id.clone(),
                zombie: outcome.results.iter().find(|r| &r.host_id == id).cloned(),
            });
        }
        for id in &update.killed_zombies {
            let last = self
                .tracker
                .as_ref()
                .and_then(|t| t.killed_record(id))
                .map(|record| record.last_detection);
            events.push(LifecycleEvent {
                event_type: LifecycleKind::ZombieKilled,
                zombie_id: id.clone(),
                zombie: last,
            });
        }

        let count = events.len();
        for event in events {
            tracing::debug!("Lifecycle event {} for {}", event.event_type.as_str(), event.zombie_id);
            self.publisher.publish_lifecycle(event);
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::{BatchSummary, DetectionResult};
    use crate::tracking::{MemoryStore, TrackerSettings};
    use parking_lot::Mutex;
    use serde_json::json;

    #[derive(Default)]
    struct RecordingPublisher {
        events: Mutex<Vec<String>>,
    }

    impl EventPublisher for RecordingPublisher {
        fn publish_detection(&self, results: &[DetectionResult], _summary: &BatchSummary) {
            self.events.lock().push(format!("detection:{}", results.len()));
        }

        fn publish_tracking(&self, update: &TrackingUpdate) {
            self.events.lock().push(format!("tracking:{}", update.stats.total_zombies));
        }

        fn publish_lifecycle(&self, event: LifecycleEvent) {
            self.events
                .lock()
                .push(format!("{}:{}", event.event_type.as_str(), event.zombie_id));
        }
    }

    fn host(id: &str, cpu: i64) -> Value {
        json!({
            "dynatrace_host_id": id,
            "hostname": id.to_lowercase(),
            "Recent_CPU_decrease_criterion": cpu,
            "Recent_net_traffic_decrease_criterion": 0,
            "Sustained_Low_CPU_criterion": 0,
            "Excessively_constant_RAM_criterion": 0,
            "Daily_CPU_profile_lost_criterion": 0,
        })
    }

    fn service(store: Arc<MemoryStore>, publisher: Arc<RecordingPublisher>) -> DetectionService {
        let tracker = ZombieTracker::with_store(store, TrackerSettings::default());
        DetectionService::new(PolicyTable::new())
            .with_tracker(Arc::new(tracker))
            .with_publisher(publisher)
    }

    #[test]
    fn test_empty_request_rejected() {
        let service = DetectionService::new(PolicyTable::new());
        assert!(matches!(
            service.run(&[], &RunOptions::default(), Utc::now()),
            Err(RunError::NoHosts)
        ));
    }

    #[test]
    fn test_all_invalid_rejected() {
        let service = DetectionService::new(PolicyTable::new());
        let result = service.run(&[json!({"hostname": "x"})], &RunOptions::default(), Utc::now());
        match result {
            Err(RunError::AllInvalid(invalid)) => assert_eq!(invalid.len(), 1),
            other => panic!("unexpected: {:?}", other.map(|r| r.outcome.results.len())),
        }
    }

    #[test]
    fn test_tracking_failure_keeps_results() {
        let store = Arc::new(MemoryStore::new());
        store.set_fail_writes(true);
        let service = service(store, Arc::new(RecordingPublisher::default()));

        let run = service
            .run(&[host("A", 1)], &RunOptions::default(), Utc::now())
            .unwrap();
        assert_eq!(run.outcome.results.len(), 1);
        assert_eq!(run.tracking.status, TrackingStatus::Unavailable);
        assert!(run.tracking.error.is_some());
    }

    #[test]
    fn test_lifecycle_events_published() {
        let store = Arc::new(MemoryStore::new());
        let publisher = Arc::new(RecordingPublisher::default());
        let service = service(store, publisher.clone());

        service.run(&[host("A", 1), host("B", 0)], &RunOptions::default(), Utc::now()).unwrap();
        let run = service.run(&[host("C", 1)], &RunOptions::default(), Utc::now()).unwrap();

        assert_eq!(run.publishing.lifecycle_events, 2);
        let events = publisher.events.lock().clone();
        assert!(events.contains(&"zombie_new:A".to_string()));
        assert!(events.contains(&"zombie_killed:A".to_string()));
        assert!(events.contains(&"zombie_new:C".to_string()));
        assert!(!events.iter().any(|e| e.ends_with(":B")));
    }

    #[test]
    fn test_only_zombies_published_per_host() {
        let publisher = Arc::new(RecordingPublisher::default());
        let service = service(Arc::new(MemoryStore::new()), publisher.clone());

        let options = RunOptions {
            overrides: Some(PolicyTable::from_states([("1B", false)])),
            ..RunOptions::default()
        };
        let hosts = [
            host("A", 1),
            host("B", 0),
            json!({
                "dynatrace_host_id": "C",
                "hostname": "c",
                "Recent_CPU_decrease_criterion": 0,
                "Recent_net_traffic_decrease_criterion": 1,
                "Sustained_Low_CPU_criterion": 0,
                "Excessively_constant_RAM_criterion": 0,
                "Daily_CPU_profile_lost_criterion": 0,
            }),
        ];
        let run = service.run(&hosts, &options, Utc::now()).unwrap();

        assert_eq!(run.outcome.results.len(), 3);
        assert_eq!(run.outcome.summary.total_hosts, 3);
        assert!(publisher.events.lock().contains(&"detection:1".to_string()));
    }

    #[test]
    fn test_switches_disable_tracking_and_publishing() {
        let store = Arc::new(MemoryStore::new());
        let publisher = Arc::new(RecordingPublisher::default());
        let service = service(store.clone(), publisher.clone());

        let options = RunOptions {
            track: false,
            publish: false,
            ..RunOptions::default()
        };
        let run = service.run(&[host("A", 1)], &options, Utc::now()).unwrap();

        assert_eq!(run.tracking.status, TrackingStatus::Disabled);
        assert_eq!(run.publishing.status, PublishingStatus::Disabled);
        assert!(publisher.events.lock().is_empty());
        assert!(store.get_raw(crate::tracking::Document::CurrentState).is_none());
    }

    #[test]
    fn test_request_overrides_policy() {
        let service = DetectionService::new(PolicyTable::new());
        let options = RunOptions {
            overrides: Some(PolicyTable::from_states([("1A", false)])),
            ..RunOptions::default()
        };
        let run = service.run(&[host("A", 1)], &options, Utc::now()).unwrap();
        assert!(!run.outcome.results[0].is_zombie);
        assert!(service.policy().is_active("1A"));
    }
}
