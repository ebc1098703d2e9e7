//! Lifecycle Tracker
//!
//! Persists the zombie set between runs so appearances and disappearances
//! can be reported.

pub mod lifecycle;
pub mod store;
pub mod tracker;
pub mod types;

pub use store::{write_atomic, Document, FileStore, MemoryStore, StoreError, TrackerStore};
pub use tracker::{
    TrackerError, TrackerSettings, ZombieTracker, DEFAULT_CLEANUP_DAYS, DEFAULT_MAX_HISTORY_ENTRIES,
};
pub use types::{
    CleanupReport, DetectionSighting, HistoryEntry, HistoryLog, KilledLog, KilledRecord,
    KilledSummary, LifecycleTransition, TrackingState, TrackingStats, TrackingUpdate,
    TransitionKind, ZombieLifecycle,
};
