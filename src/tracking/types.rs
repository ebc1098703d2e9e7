//! Tracking Types
//!
//! Persisted documents (current state, history log, killed log) and the
//! values returned by tracker operations.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::detection::DetectionResult;

// ============================================================================
// PERSISTED DOCUMENTS
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingStats {
    pub total_zombies: usize,
    pub new_zombies: usize,
    pub persisting_zombies: usize,
    pub killed_zombies: usize,
}

/// Current tracking state, replaced whole on every run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingState {
    pub timestamp: DateTime<Utc>,
    pub zombie_ids: BTreeSet<String>,
    pub zombies: Vec<DetectionResult>,
    pub stats: TrackingStats,
    #[serde(default)]
    pub new_zombies: Vec<String>,
    #[serde(default)]
    pub persisting_zombies: Vec<String>,
    #[serde(default)]
    pub killed_zombies: Vec<String>,
}

impl TrackingState {
    /// Last detection result recorded for `id`
    pub fn zombie(&self, id: &str) -> Option<&DetectionResult> {
        self.zombies.iter().find(|z| z.host_id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.zombie_ids.contains(id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub zombie_count: usize,
    pub zombies: Vec<DetectionResult>,
}

/// Chronological run snapshots, oldest first
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryLog {
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KilledRecord {
    #[serde(rename = "dynatrace_host_id")]
    pub host_id: String,
    pub hostname: String,
    pub criterion_type: String,
    pub criterion_alias: String,
    pub killed_at: DateTime<Utc>,
    /// Timestamp of the last run that still saw the zombie. Together with the
    /// host id it identifies one present -> absent transition.
    #[serde(default)]
    pub last_seen_at: DateTime<Utc>,
    pub last_detection: DetectionResult,
}

impl KilledRecord {
    pub fn from_last_detection(
        last: &DetectionResult,
        last_seen_at: DateTime<Utc>,
        killed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            host_id: last.host_id.clone(),
            hostname: last.hostname.clone(),
            criterion_type: last.code.clone(),
            criterion_alias: last.alias.clone(),
            killed_at,
            last_seen_at,
            last_detection: last.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KilledLog {
    #[serde(default)]
    pub killed_zombies: Vec<KilledRecord>,
}

// ============================================================================
// OPERATION RESULTS
// ============================================================================

/// Partition of one run against the previous one (id lists sorted)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingUpdate {
    pub new_zombies: Vec<String>,
    pub persisting_zombies: Vec<String>,
    pub killed_zombies: Vec<String>,
    pub stats: TrackingStats,
}

impl From<&TrackingState> for TrackingUpdate {
    fn from(state: &TrackingState) -> Self {
        Self {
            new_zombies: state.new_zombies.clone(),
            persisting_zombies: state.persisting_zombies.clone(),
            killed_zombies: state.killed_zombies.clone(),
            stats: state.stats,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    pub days_to_keep: i64,
    pub history_removed: usize,
    pub killed_removed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KilledSummary {
    pub killed_zombies_count: usize,
    pub since_hours: i64,
    pub killed_zombies: Vec<KilledRecord>,
    pub criterion_breakdown: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionSighting {
    pub timestamp: DateTime<Utc>,
    pub criterion_type: String,
    pub criterion_alias: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    Appeared,
    Killed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleTransition {
    pub kind: TransitionKind,
    pub at: DateTime<Utc>,
}

/// Read-only projection of one host's zombie history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZombieLifecycle {
    pub zombie_id: String,
    pub first_seen: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
    pub total_detections: usize,
    pub is_active: bool,
    pub killed_at: Option<DateTime<Utc>>,
    pub killed_info: Option<KilledRecord>,
    pub transitions: Vec<LifecycleTransition>,
    pub detection_history: Vec<DetectionSighting>,
}

impl ZombieLifecycle {
    /// True when neither history, killed log nor current state mention the id
    pub fn is_unknown(&self) -> bool {
        self.total_detections == 0 && self.killed_info.is_none() && !self.is_active
    }
}
