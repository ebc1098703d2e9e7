//! Zombie Tracker
//!
//! Compares each run's zombie set with the persisted one, records killed
//! zombies and appends to a bounded history.
//!
//! Flow per `update`:
//! 1. Load previous state (unreadable -> empty, logged)
//! 2. Partition ids into new / persisting / killed
//! 3. Append killed records (once per transition), append history entry,
//!    replace current state
//! 4. Enforce history retention
//!
//! The current state is written last. If an earlier write fails the next
//! run diffs against the same previous state again; killed records are keyed
//! by `(host_id, last_seen_at)` so the retry does not duplicate them.
//!
//! Host ids must be stable across runs; a recycled id is indistinguishable
//! from a zombie that persisted.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::lifecycle;
use super::store::{Document, FileStore, StoreError, TrackerStore};
use super::types::{
    CleanupReport, HistoryEntry, HistoryLog, KilledLog, KilledRecord, KilledSummary,
    TrackingState, TrackingStats, TrackingUpdate, ZombieLifecycle,
};
use crate::detection::DetectionResult;

// ============================================================================
// CONSTANTS
// ============================================================================

pub const DEFAULT_MAX_HISTORY_ENTRIES: usize = 1000;
pub const DEFAULT_CLEANUP_DAYS: i64 = 30;

#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("failed to persist {document}: {source}")]
    Write {
        document: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("failed to open tracking store: {0}")]
    Open(#[source] StoreError),
}

/// Retention parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerSettings {
    pub max_history_entries: usize,
    pub cleanup_days: i64,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            max_history_entries: DEFAULT_MAX_HISTORY_ENTRIES,
            cleanup_days: DEFAULT_CLEANUP_DAYS,
        }
    }
}

pub struct ZombieTracker {
    store: Arc<dyn TrackerStore>,
    settings: TrackerSettings,
}

impl std::fmt::Debug for ZombieTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZombieTracker")
            .field("store", &self.store.describe())
            .field("settings", &self.settings)
            .finish()
    }
}

impl ZombieTracker {
    /// Tracker backed by JSON files in `data_dir`
    pub fn open(data_dir: impl AsRef<Path>, settings: TrackerSettings) -> Result<Self, TrackerError> {
        let store = FileStore::open(data_dir).map_err(TrackerError::Open)?;
        Ok(Self::with_store(Arc::new(store), settings))
    }

    pub fn with_store(store: Arc<dyn TrackerStore>, settings: TrackerSettings) -> Self {
        Self { store, settings }
    }

    pub fn settings(&self) -> TrackerSettings {
        self.settings
    }

    // ========================================================================
    // WRITERS
    // ========================================================================

    /// Record the current run. Results not flagged as zombies are ignored;
    /// duplicate ids keep their first result.
    pub fn update(&self, current: &[DetectionResult], now: DateTime<Utc>) -> Result<TrackingUpdate, TrackerError> {
        let lock = self.store.write_lock();
        let _guard = lock.lock();

        let previous = self.load_state();
        let mut history: HistoryLog = self.load_document(Document::History).unwrap_or_default();
        let now = run_timestamp(now, previous.as_ref(), &history);

        let previous_ids: BTreeSet<String> = previous
            .as_ref()
            .map(|s| s.zombie_ids.clone())
            .unwrap_or_default();

        let mut current_ids = BTreeSet::new();
        let zombies: Vec<DetectionResult> = current
            .iter()
            .filter(|r| r.is_zombie && current_ids.insert(r.host_id.clone()))
            .cloned()
            .collect();

        let new_zombies: Vec<String> = current_ids.difference(&previous_ids).cloned().collect();
        let persisting_zombies: Vec<String> = current_ids.intersection(&previous_ids).cloned().collect();
        let killed_zombies: Vec<String> = previous_ids.difference(&current_ids).cloned().collect();

        let stats = TrackingStats {
            total_zombies: zombies.len(),
            new_zombies: new_zombies.len(),
            persisting_zombies: persisting_zombies.len(),
            killed_zombies: killed_zombies.len(),
        };

        if let (Some(previous), false) = (previous.as_ref(), killed_zombies.is_empty()) {
            let mut killed_log: KilledLog = self.load_document(Document::Killed).unwrap_or_default();
            let mut appended = 0;
            for id in &killed_zombies {
                let last = match previous.zombie(id) {
                    Some(last) => last,
                    None => continue,
                };
                // An earlier run may have recorded this transition and then
                // failed before replacing the current state
                let recorded = killed_log
                    .killed_zombies
                    .iter()
                    .any(|r| r.host_id == *id && r.last_seen_at == previous.timestamp);
                if recorded {
                    tracing::debug!("Killed record for {} already present", id);
                    continue;
                }
                killed_log
                    .killed_zombies
                    .push(KilledRecord::from_last_detection(last, previous.timestamp, now));
                appended += 1;
            }
            if appended > 0 {
                self.save_document(Document::Killed, &killed_log)?;
            }
        }

        history.history.push(HistoryEntry {
            timestamp: now,
            zombie_count: zombies.len(),
            zombies: zombies.clone(),
        });
        let trimmed = self.enforce_retention(&mut history, now);
        if trimmed > 0 {
            tracing::debug!("Trimmed {} history entries", trimmed);
        }
        self.save_document(Document::History, &history)?;

        let state = TrackingState {
            timestamp: now,
            zombie_ids: current_ids,
            zombies,
            stats,
            new_zombies,
            persisting_zombies,
            killed_zombies,
        };
        self.save_document(Document::CurrentState, &state)?;

        tracing::info!(
            "Tracking updated: {} zombies ({} new, {} persisting, {} killed)",
            stats.total_zombies,
            stats.new_zombies,
            stats.persisting_zombies,
            stats.killed_zombies
        );

        Ok(TrackingUpdate::from(&state))
    }

    /// Drop history entries and killed records older than `days_to_keep`
    pub fn cleanup(&self, days_to_keep: i64, now: DateTime<Utc>) -> Result<CleanupReport, TrackerError> {
        let lock = self.store.write_lock();
        let _guard = lock.lock();

        let cutoff = retention_cutoff(now, days_to_keep);

        let mut history: HistoryLog = self.load_document(Document::History).unwrap_or_default();
        let before = history.history.len();
        if let Some(cutoff) = cutoff {
            history.history.retain(|entry| entry.timestamp >= cutoff);
        }
        let history_removed = before - history.history.len();
        self.save_document(Document::History, &history)?;

        let mut killed: KilledLog = self.load_document(Document::Killed).unwrap_or_default();
        let before = killed.killed_zombies.len();
        if let Some(cutoff) = cutoff {
            killed.killed_zombies.retain(|record| record.killed_at >= cutoff);
        }
        let killed_removed = before - killed.killed_zombies.len();
        self.save_document(Document::Killed, &killed)?;

        tracing::info!(
            "Cleanup older than {} days: removed {} history entries, {} killed records",
            days_to_keep,
            history_removed,
            killed_removed
        );

        Ok(CleanupReport {
            days_to_keep,
            history_removed,
            killed_removed,
        })
    }

    fn enforce_retention(&self, history: &mut HistoryLog, now: DateTime<Utc>) -> usize {
        let before = history.history.len();
        if let Some(cutoff) = retention_cutoff(now, self.settings.cleanup_days) {
            history.history.retain(|entry| entry.timestamp >= cutoff);
        }

        let max = self.settings.max_history_entries;
        if history.history.len() > max {
            let excess = history.history.len() - max;
            history.history.drain(0..excess);
        }
        before - history.history.len()
    }

    // ========================================================================
    // READERS
    // ========================================================================

    /// Last persisted state, `None` before the first run
    pub fn current_state(&self) -> Option<TrackingState> {
        self.load_state()
    }

    /// Partition computed by the last run (empty before the first run)
    pub fn tracking_stats(&self) -> TrackingUpdate {
        self.load_state()
            .map(|state| TrackingUpdate::from(&state))
            .unwrap_or_default()
    }

    pub fn history(&self) -> HistoryLog {
        self.load_document(Document::History).unwrap_or_default()
    }

    pub fn killed_log(&self) -> KilledLog {
        self.load_document(Document::Killed).unwrap_or_default()
    }

    /// Zombies killed within the last `since_hours`
    pub fn killed_since(&self, since_hours: i64, now: DateTime<Utc>) -> KilledSummary {
        let cutoff = Duration::try_hours(since_hours.max(0)).and_then(|window| now.checked_sub_signed(window));
        let killed_zombies: Vec<KilledRecord> = self
            .killed_log()
            .killed_zombies
            .into_iter()
            .filter(|record| cutoff.map_or(true, |cutoff| record.killed_at >= cutoff))
            .collect();

        let mut criterion_breakdown: BTreeMap<String, usize> = BTreeMap::new();
        for record in &killed_zombies {
            *criterion_breakdown.entry(record.criterion_type.clone()).or_insert(0) += 1;
        }

        KilledSummary {
            killed_zombies_count: killed_zombies.len(),
            since_hours,
            killed_zombies,
            criterion_breakdown,
        }
    }

    /// Most recent killed record for `id`
    pub fn killed_record(&self, id: &str) -> Option<KilledRecord> {
        self.killed_log()
            .killed_zombies
            .into_iter()
            .filter(|record| record.host_id == id)
            .max_by_key(|record| record.killed_at)
    }

    pub fn lifecycle(&self, id: &str) -> ZombieLifecycle {
        let history = self.history();
        let killed = self.killed_log();
        let is_active = self.load_state().map(|s| s.contains(id)).unwrap_or(false);
        lifecycle::project(id, &history, &killed, is_active)
    }

    // ========================================================================
    // DOCUMENT I/O
    // ========================================================================

    fn load_state(&self) -> Option<TrackingState> {
        self.load_document(Document::CurrentState)
    }

    /// Degraded read: missing, unreadable or malformed documents are `None`
    fn load_document<T: DeserializeOwned>(&self, document: Document) -> Option<T> {
        let bytes = match self.store.load(document) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!("Tracking store {} unreadable, treating as empty: {}", self.store.describe(), e);
                return None;
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(source) => {
                let e = StoreError::Json {
                    document: document.file_name(),
                    source,
                };
                tracing::warn!("Tracking store {}: {}, treating as empty", self.store.describe(), e);
                None
            }
        }
    }

    fn save_document<T: Serialize>(&self, document: Document, value: &T) -> Result<(), TrackerError> {
        let bytes = serde_json::to_vec_pretty(value).map_err(|source| TrackerError::Write {
            document: document.file_name(),
            source: StoreError::Json {
                document: document.file_name(),
                source,
            },
        })?;

        self.store.save(document, &bytes).map_err(|source| {
            tracing::error!("Failed to persist {}: {}", document.file_name(), source);
            TrackerError::Write {
                document: document.file_name(),
                source,
            }
        })
    }
}

/// Run time that never precedes the last recorded run. A caller that
/// sampled its clock earlier but took the lock later is moved forward.
fn run_timestamp(now: DateTime<Utc>, previous: Option<&TrackingState>, history: &HistoryLog) -> DateTime<Utc> {
    let latest = previous
        .map(|state| state.timestamp)
        .into_iter()
        .chain(history.history.last().map(|entry| entry.timestamp))
        .max();

    match latest {
        Some(latest) if latest > now => {
            tracing::debug!("Run time {} precedes last recorded run {}, using the latter", now, latest);
            latest
        }
        _ => now,
    }
}

/// `now - days`, negative windows counting as zero. `None` when the window
/// reaches past the representable range, meaning nothing is old enough to drop.
fn retention_cutoff(now: DateTime<Utc>, days: i64) -> Option<DateTime<Utc>> {
    Duration::try_days(days.max(0)).and_then(|window| now.checked_sub_signed(window))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::store::MemoryStore;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Memory store that rejects its `fail_on`-th save (counting from 1)
    struct FailingSave {
        inner: MemoryStore,
        saves: AtomicUsize,
        fail_on: usize,
    }

    impl FailingSave {
        fn new(fail_on: usize) -> Self {
            Self {
                inner: MemoryStore::new(),
                saves: AtomicUsize::new(0),
                fail_on,
            }
        }
    }

    impl TrackerStore for FailingSave {
        fn load(&self, document: Document) -> Result<Option<Vec<u8>>, StoreError> {
            self.inner.load(document)
        }

        fn save(&self, document: Document, bytes: &[u8]) -> Result<(), StoreError> {
            if self.saves.fetch_add(1, Ordering::SeqCst) + 1 == self.fail_on {
                return Err(StoreError::Unavailable(format!("{} rejected", document.file_name())));
            }
            self.inner.save(document, bytes)
        }

        fn write_lock(&self) -> Arc<Mutex<()>> {
            self.inner.write_lock()
        }

        fn describe(&self) -> String {
            "failing".to_string()
        }
    }

    fn zombie(id: &str, code: &str) -> DetectionResult {
        DetectionResult {
            host_id: id.to_string(),
            hostname: format!("{}.example", id.to_lowercase()),
            code: code.to_string(),
            alias: crate::detection::codes::alias_for(code).to_string(),
            description: String::new(),
            state: 1,
            is_zombie: true,
        }
    }

    fn tracker() -> (Arc<MemoryStore>, ZombieTracker) {
        let store = Arc::new(MemoryStore::new());
        let tracker = ZombieTracker::with_store(store.clone(), TrackerSettings::default());
        (store, tracker)
    }

    fn at(hour: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_760_000_000, 0).unwrap() + Duration::hours(hour)
    }

    #[test]
    fn test_first_run_everything_new() {
        let (_, tracker) = tracker();
        let update = tracker.update(&[zombie("A", "1A"), zombie("B", "2A")], at(0)).unwrap();

        assert_eq!(update.new_zombies, vec!["A", "B"]);
        assert!(update.persisting_zombies.is_empty());
        assert!(update.killed_zombies.is_empty());
        assert_eq!(update.stats.total_zombies, 2);
    }

    #[test]
    fn test_second_run_partitions() {
        let (_, tracker) = tracker();
        tracker.update(&[zombie("A", "1A"), zombie("B", "2A")], at(0)).unwrap();
        let update = tracker.update(&[zombie("B", "2A"), zombie("C", "3A")], at(1)).unwrap();

        assert_eq!(update.new_zombies, vec!["C"]);
        assert_eq!(update.persisting_zombies, vec!["B"]);
        assert_eq!(update.killed_zombies, vec!["A"]);

        let killed = tracker.killed_record("A").unwrap();
        assert_eq!(killed.killed_at, at(1));
        assert_eq!(killed.criterion_type, "1A");
        assert_eq!(killed.last_detection.host_id, "A");
    }

    #[test]
    fn test_non_zombies_ignored() {
        let (_, tracker) = tracker();
        let mut healthy = zombie("H", "0");
        healthy.is_zombie = false;

        let update = tracker.update(&[healthy, zombie("A", "1A")], at(0)).unwrap();
        assert_eq!(update.new_zombies, vec!["A"]);
    }

    #[test]
    fn test_corrupt_state_treated_as_empty() {
        let (store, tracker) = tracker();
        store.put_raw(Document::CurrentState, "{ broken");

        let update = tracker.update(&[zombie("A", "1A")], at(0)).unwrap();
        assert_eq!(update.new_zombies, vec!["A"]);
        assert!(update.killed_zombies.is_empty());
    }

    #[test]
    fn test_write_failure_is_reported() {
        let (store, tracker) = tracker();
        store.set_fail_writes(true);
        assert!(matches!(
            tracker.update(&[zombie("A", "1A")], at(0)),
            Err(TrackerError::Write { .. })
        ));
    }

    #[test]
    fn test_history_bounded_by_max_entries() {
        let store = Arc::new(MemoryStore::new());
        let tracker = ZombieTracker::with_store(
            store,
            TrackerSettings {
                max_history_entries: 3,
                cleanup_days: 30,
            },
        );

        for hour in 0..5 {
            tracker.update(&[zombie("A", "1A")], at(hour)).unwrap();
        }

        let history = tracker.history().history;
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].timestamp, at(2));
        assert_eq!(history[2].timestamp, at(4));
    }

    #[test]
    fn test_history_drops_entries_older_than_cleanup_days() {
        let store = Arc::new(MemoryStore::new());
        let tracker = ZombieTracker::with_store(
            store,
            TrackerSettings {
                max_history_entries: 100,
                cleanup_days: 1,
            },
        );

        tracker.update(&[zombie("A", "1A")], at(0)).unwrap();
        tracker.update(&[zombie("A", "1A")], at(48)).unwrap();

        let history = tracker.history().history;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].timestamp, at(48));
    }

    #[test]
    fn test_cleanup_prunes_killed_records() {
        let (_, tracker) = tracker();
        tracker.update(&[zombie("OLD", "1A")], at(0)).unwrap();
        tracker.update(&[], at(1)).unwrap();

        let report = tracker.cleanup(0, at(2)).unwrap();
        assert_eq!(report.killed_removed, 1);
        assert_eq!(report.history_removed, 2);
        assert_eq!(tracker.killed_since(24, at(2)).killed_zombies_count, 0);
    }

    #[test]
    fn test_killed_since_window() {
        let (_, tracker) = tracker();
        tracker.update(&[zombie("A", "1A"), zombie("B", "2A")], at(0)).unwrap();
        tracker.update(&[zombie("B", "2A")], at(1)).unwrap();
        tracker.update(&[], at(30)).unwrap();

        let recent = tracker.killed_since(24, at(30));
        assert_eq!(recent.killed_zombies_count, 1);
        assert_eq!(recent.killed_zombies[0].host_id, "B");
        assert_eq!(recent.criterion_breakdown["2A"], 1);

        assert_eq!(tracker.killed_since(48, at(30)).killed_zombies_count, 2);
    }

    #[test]
    fn test_tracking_stats_reflect_last_run() {
        let (_, tracker) = tracker();
        assert_eq!(tracker.tracking_stats(), TrackingUpdate::default());

        tracker.update(&[zombie("A", "1A")], at(0)).unwrap();
        let update = tracker.update(&[zombie("B", "1B")], at(1)).unwrap();
        assert_eq!(tracker.tracking_stats(), update);
    }

    #[test]
    fn test_failed_run_does_not_duplicate_killed_record() {
        // Saves: run 1 history, run 1 state, run 2 killed, run 2 history (rejected)
        let store = Arc::new(FailingSave::new(4));
        let tracker = ZombieTracker::with_store(store, TrackerSettings::default());

        tracker.update(&[zombie("A", "1A")], at(0)).unwrap();
        assert!(tracker.update(&[], at(1)).is_err());
        let retry = tracker.update(&[], at(2)).unwrap();
        assert_eq!(retry.killed_zombies, vec!["A"]);

        let killed = tracker.killed_log().killed_zombies;
        assert_eq!(killed.len(), 1);
        assert_eq!(killed[0].last_seen_at, at(0));
        assert_eq!(killed[0].killed_at, at(1));
    }

    #[test]
    fn test_killed_again_after_reappearing() {
        let (_, tracker) = tracker();
        tracker.update(&[zombie("A", "1A")], at(0)).unwrap();
        tracker.update(&[], at(1)).unwrap();
        tracker.update(&[zombie("A", "1A")], at(2)).unwrap();
        tracker.update(&[], at(3)).unwrap();

        let killed = tracker.killed_log().killed_zombies;
        assert_eq!(killed.len(), 2);
        assert_eq!(killed[1].last_seen_at, at(2));
    }

    #[test]
    fn test_late_run_keeps_history_chronological() {
        let (_, tracker) = tracker();
        tracker.update(&[zombie("A", "1A")], at(5)).unwrap();
        tracker.update(&[zombie("B", "1B")], at(3)).unwrap();

        let history = tracker.history().history;
        assert_eq!(history.len(), 2);
        assert!(history.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        assert_eq!(tracker.current_state().unwrap().timestamp, at(5));
        assert_eq!(tracker.killed_record("A").unwrap().killed_at, at(5));
    }

    #[test]
    fn test_negative_cleanup_days_keeps_current_run() {
        let tracker = ZombieTracker::with_store(
            Arc::new(MemoryStore::new()),
            TrackerSettings {
                max_history_entries: 100,
                cleanup_days: -1,
            },
        );

        tracker.update(&[zombie("A", "1A")], at(0)).unwrap();
        assert_eq!(tracker.history().history.len(), 1);
    }

    #[test]
    fn test_huge_retention_window_keeps_everything() {
        let tracker = ZombieTracker::with_store(
            Arc::new(MemoryStore::new()),
            TrackerSettings {
                max_history_entries: 100,
                cleanup_days: 1_000_000_000,
            },
        );

        tracker.update(&[zombie("A", "1A")], at(0)).unwrap();
        tracker.update(&[], at(1)).unwrap();
        assert_eq!(tracker.history().history.len(), 2);

        let report = tracker.cleanup(i64::MAX, at(2)).unwrap();
        assert_eq!(report.history_removed, 0);
        assert_eq!(tracker.killed_since(i64::MAX, at(2)).killed_zombies_count, 1);
    }
}
