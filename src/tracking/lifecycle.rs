//! Lifecycle projection for a single host, derived from the history and
//! killed logs. Nothing here writes.

use super::types::{
    DetectionSighting, HistoryLog, KilledLog, LifecycleTransition, TransitionKind, ZombieLifecycle,
};

pub fn project(id: &str, history: &HistoryLog, killed: &KilledLog, is_active: bool) -> ZombieLifecycle {
    let mut detection_history = Vec::new();
    let mut transitions = Vec::new();
    let mut present_before = false;

    for entry in &history.history {
        let sighting = entry.zombies.iter().find(|z| z.host_id == id);
        match sighting {
            Some(result) => {
                if !present_before {
                    transitions.push(LifecycleTransition {
                        kind: TransitionKind::Appeared,
                        at: entry.timestamp,
                    });
                }
                detection_history.push(DetectionSighting {
                    timestamp: entry.timestamp,
                    criterion_type: result.code.clone(),
                    criterion_alias: result.alias.clone(),
                });
                present_before = true;
            }
            None if present_before => {
                transitions.push(LifecycleTransition {
                    kind: TransitionKind::Killed,
                    at: entry.timestamp,
                });
                present_before = false;
            }
            None => {}
        }
    }

    // Killed records outlive trimmed history
    let mut records: Vec<_> = killed.killed_zombies.iter().filter(|r| r.host_id == id).collect();
    records.sort_by_key(|r| r.killed_at);
    for record in &records {
        let known = transitions
            .iter()
            .any(|t| t.kind == TransitionKind::Killed && t.at == record.killed_at);
        if !known {
            transitions.push(LifecycleTransition {
                kind: TransitionKind::Killed,
                at: record.killed_at,
            });
        }
    }
    transitions.sort_by_key(|t| t.at);

    let killed_info = records.last().map(|r| (*r).clone());
    let killed_at = match (&killed_info, is_active) {
        (Some(record), false) => Some(record.killed_at),
        _ => None,
    };

    ZombieLifecycle {
        zombie_id: id.to_string(),
        first_seen: detection_history.first().map(|s| s.timestamp),
        last_seen: detection_history.last().map(|s| s.timestamp),
        total_detections: detection_history.len(),
        is_active,
        killed_at,
        killed_info,
        transitions,
        detection_history,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{DateTime, Duration, Utc};

    use crate::detection::DetectionResult;
    use crate::tracking::store::MemoryStore;
    use crate::tracking::{TrackerSettings, ZombieTracker};

    use super::*;

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

    fn at(hour: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_760_000_000, 0).unwrap() + Duration::hours(hour)
    }

    fn tracker() -> ZombieTracker {
        ZombieTracker::with_store(Arc::new(MemoryStore::new()), TrackerSettings::default())
    }

    #[test]
    fn test_unknown_id() {
        let lifecycle = tracker().lifecycle("NOPE");
        assert!(lifecycle.is_unknown());
        assert!(lifecycle.first_seen.is_none());
        assert!(lifecycle.transitions.is_empty());
    }

    #[test]
    fn test_active_zombie() {
        let tracker = tracker();
        tracker.update(&[zombie("A", "1A")], at(0)).unwrap();
        tracker.update(&[zombie("A", "2A")], at(1)).unwrap();

        let lifecycle = tracker.lifecycle("A");
        assert!(lifecycle.is_active);
        assert_eq!(lifecycle.total_detections, 2);
        assert_eq!(lifecycle.first_seen, Some(at(0)));
        assert_eq!(lifecycle.last_seen, Some(at(1)));
        assert_eq!(lifecycle.detection_history[1].criterion_type, "2A");
        assert!(lifecycle.killed_at.is_none());
        assert_eq!(lifecycle.transitions.len(), 1);
    }

    #[test]
    fn test_killed_then_reappeared() {
        let tracker = tracker();
        tracker.update(&[zombie("A", "1A")], at(0)).unwrap();
        tracker.update(&[], at(1)).unwrap();
        tracker.update(&[zombie("A", "1A")], at(2)).unwrap();

        let lifecycle = tracker.lifecycle("A");
        let kinds: Vec<TransitionKind> = lifecycle.transitions.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![TransitionKind::Appeared, TransitionKind::Killed, TransitionKind::Appeared]
        );
        assert!(lifecycle.is_active);
        // Active again: the kill is history, not current
        assert!(lifecycle.killed_at.is_none());
        assert_eq!(lifecycle.killed_info.unwrap().killed_at, at(1));
    }

    #[test]
    fn test_killed_record_survives_history_cleanup() {
        let tracker = tracker();
        tracker.update(&[zombie("A", "1A")], at(0)).unwrap();
        tracker.update(&[], at(1)).unwrap();

        let mut history = tracker.history();
        history.history.clear();
        let killed = tracker.killed_log();

        let lifecycle = project("A", &history, &killed, false);
        assert_eq!(lifecycle.total_detections, 0);
        assert_eq!(lifecycle.killed_at, Some(at(1)));
        assert_eq!(lifecycle.transitions.len(), 1);
        assert!(!lifecycle.is_unknown());
    }
}
