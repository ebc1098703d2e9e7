//! Batch Processor
//!
//! Validates raw host records, classifies each one, applies the policy table
//! and aggregates a summary. Malformed records are reported by index and
//! skipped; the rest of the batch is still processed.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::classifier::classify;
use super::codes;
use super::criteria::{CriteriaVector, Criterion};
use super::policy::PolicyTable;

pub const HOST_ID_FIELD: &str = "dynatrace_host_id";
pub const HOSTNAME_FIELD: &str = "hostname";

/// Field names every host record must carry
pub fn required_fields() -> Vec<&'static str> {
    let mut fields = vec![HOST_ID_FIELD, HOSTNAME_FIELD];
    fields.extend(Criterion::ALL.iter().map(|c| c.wire_name()));
    fields
}

/// Validated host input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostRecord {
    pub id: String,
    pub hostname: String,
    pub criteria: CriteriaVector,
}

/// Classification outcome for one host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionResult {
    #[serde(rename = "dynatrace_host_id")]
    pub host_id: String,
    pub hostname: String,
    #[serde(rename = "criterion_type")]
    pub code: String,
    #[serde(rename = "criterion_alias")]
    pub alias: String,
    #[serde(rename = "criterion_description")]
    pub description: String,
    #[serde(rename = "criterion_state", default = "default_state")]
    pub state: u8,
    pub is_zombie: bool,
}

fn default_state() -> u8 {
    1
}

/// Rejected input record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidRecord {
    pub index: usize,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeCount {
    pub count: usize,
    pub alias: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total_hosts: usize,
    pub zombie_hosts: usize,
    pub non_zombie_hosts: usize,
    pub zombie_percentage: f64,
    /// Zombie results only
    pub criterion_breakdown: BTreeMap<String, CodeCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchOutcome {
    pub results: Vec<DetectionResult>,
    pub summary: BatchSummary,
    pub invalid: Vec<InvalidRecord>,
}

impl BatchOutcome {
    pub fn zombies(&self) -> Vec<DetectionResult> {
        filter_zombies(&self.results)
    }

    pub fn is_partial(&self) -> bool {
        !self.invalid.is_empty()
    }
}

impl HostRecord {
    /// Validate and normalise one raw record
    pub fn from_value(value: &Value) -> Result<Self, String> {
        let object = value
            .as_object()
            .ok_or_else(|| "host record must be a JSON object".to_string())?;

        let id = required_text(object, HOST_ID_FIELD)?;
        let hostname = required_text(object, HOSTNAME_FIELD)?;

        let mut criteria = CriteriaVector::default();
        for criterion in Criterion::ALL {
            let field = criterion.wire_name();
            let raw = object
                .get(field)
                .ok_or_else(|| format!("missing field `{}`", field))?;
            let flag = coerce_flag(raw)
                .ok_or_else(|| format!("field `{}` is not a criterion flag: {}", field, raw))?;
            criteria.set(criterion, flag);
        }

        Ok(HostRecord { id, hostname, criteria })
    }
}

fn required_text(object: &serde_json::Map<String, Value>, field: &str) -> Result<String, String> {
    match object.get(field) {
        Some(Value::String(text)) if !text.trim().is_empty() => Ok(text.clone()),
        Some(Value::String(_)) => Err(format!("field `{}` is empty", field)),
        Some(other) => Err(format!("field `{}` must be a string, got {}", field, other)),
        None => Err(format!("missing field `{}`", field)),
    }
}

/// Criterion value normalisation.
///
/// Positive numbers are active; zero and negatives are not (`-1` marks a
/// criterion the exporter could not evaluate).
pub fn coerce_flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(flag) => Some(*flag),
        Value::Number(n) => n.as_f64().map(|f| f > 0.0),
        Value::String(text) => match text.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => Some(true),
            "0" | "-1" | "false" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Classify one validated record under `policy`.
///
/// A code switched off in the policy keeps its code and alias; only
/// `criterion_state` (0) and `is_zombie` (false) reflect the policy. Callers
/// that want disabled hosts reported as code "0" must map them themselves.
pub fn evaluate(record: &HostRecord, policy: &PolicyTable) -> DetectionResult {
    let classification = classify(&record.criteria);
    let state = policy.state(classification.code);

    DetectionResult {
        host_id: record.id.clone(),
        hostname: record.hostname.clone(),
        code: classification.code.to_string(),
        alias: classification.alias.to_string(),
        description: classification.description.to_string(),
        state,
        is_zombie: !classification.is_no_zombie() && state == 1,
    }
}

/// Process a batch of raw host records
pub fn process(records: &[Value], policy: &PolicyTable) -> BatchOutcome {
    let mut results = Vec::with_capacity(records.len());
    let mut invalid = Vec::new();
    let mut seen: HashSet<String> = HashSet::with_capacity(records.len());

    for (index, raw) in records.iter().enumerate() {
        let record = match HostRecord::from_value(raw) {
            Ok(record) => record,
            Err(reason) => {
                invalid.push(InvalidRecord { index, reason });
                continue;
            }
        };

        if !seen.insert(record.id.clone()) {
            invalid.push(InvalidRecord {
                index,
                reason: format!("duplicate host id `{}` in batch", record.id),
            });
            continue;
        }

        results.push(evaluate(&record, policy));
    }

    if !invalid.is_empty() {
        tracing::warn!("{} of {} host records rejected", invalid.len(), records.len());
    }

    let summary = summarize(&results);
    tracing::debug!(
        "Classified {} hosts, {} zombies ({}%)",
        summary.total_hosts,
        summary.zombie_hosts,
        summary.zombie_percentage
    );

    BatchOutcome { results, summary, invalid }
}

/// Aggregate statistics over detection results
pub fn summarize(results: &[DetectionResult]) -> BatchSummary {
    let total_hosts = results.len();
    let mut criterion_breakdown: BTreeMap<String, CodeCount> = BTreeMap::new();

    for result in results.iter().filter(|r| r.is_zombie) {
        criterion_breakdown
            .entry(result.code.clone())
            .or_insert_with(|| CodeCount {
                count: 0,
                alias: codes::alias_for(&result.code).to_string(),
            })
            .count += 1;
    }

    let zombie_hosts: usize = criterion_breakdown.values().map(|c| c.count).sum();

    BatchSummary {
        total_hosts,
        zombie_hosts,
        non_zombie_hosts: total_hosts - zombie_hosts,
        zombie_percentage: percentage(zombie_hosts, total_hosts),
        criterion_breakdown,
    }
}

fn percentage(part: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (part as f64 / total as f64 * 10_000.0).round() / 100.0
}

pub fn filter_zombies(results: &[DetectionResult]) -> Vec<DetectionResult> {
    results.iter().filter(|r| r.is_zombie).cloned().collect()
}

pub fn zombie_ids(results: &[DetectionResult]) -> BTreeSet<String> {
    results
        .iter()
        .filter(|r| r.is_zombie)
        .map(|r| r.host_id.clone())
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn host(id: &str, bits: [i64; 5]) -> Value {
        json!({
            "dynatrace_host_id": id,
            "hostname": format!("{}.example", id.to_lowercase()),
            "Recent_CPU_decrease_criterion": bits[0],
            "Recent_net_traffic_decrease_criterion": bits[1],
            "Sustained_Low_CPU_criterion": bits[2],
            "Excessively_constant_RAM_criterion": bits[3],
            "Daily_CPU_profile_lost_criterion": bits[4],
        })
    }

    #[test]
    fn test_unevaluated_criteria_are_inactive() {
        let outcome = process(&[host("HOST-1", [1, -1, 1, 0, -1])], &PolicyTable::new());
        assert_eq!(outcome.results[0].code, "2B");
        assert_eq!(outcome.results[0].alias, "Wraith");
        assert!(outcome.results[0].is_zombie);
    }

    #[test]
    fn test_disabled_code_is_not_zombie() {
        let policy = PolicyTable::from_states([("1A", false)]);
        let outcome = process(&[host("HOST-1", [1, 0, 0, 0, 0])], &policy);

        let result = &outcome.results[0];
        assert_eq!(result.code, "1A");
        assert_eq!(result.state, 0);
        assert!(!result.is_zombie);
        assert_eq!(outcome.summary.zombie_hosts, 0);
    }

    #[test]
    fn test_no_zombie_code_never_flagged() {
        let outcome = process(&[host("HOST-1", [0, 0, 0, 0, 0])], &PolicyTable::new());
        assert_eq!(outcome.results[0].code, "0");
        assert!(!outcome.results[0].is_zombie);
    }

    #[test]
    fn test_invalid_records_reported_by_index() {
        let mut missing = host("HOST-2", [1, 1, 0, 0, 0]);
        missing.as_object_mut().unwrap().remove("Sustained_Low_CPU_criterion");

        let records = vec![
            host("HOST-1", [1, 1, 0, 0, 0]),
            missing,
            json!({"dynatrace_host_id": "", "hostname": "x"}),
            json!("not an object"),
            host("HOST-5", [0, 0, 1, 1, 1]),
        ];

        let outcome = process(&records, &PolicyTable::new());
        let indices: Vec<usize> = outcome.invalid.iter().map(|i| i.index).collect();
        assert_eq!(indices, vec![1, 2, 3]);
        assert_eq!(outcome.results.len(), 2);
        assert!(outcome.is_partial());
        assert!(outcome.invalid[0].reason.contains("Sustained_Low_CPU_criterion"));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let records = vec![host("HOST-1", [1, 0, 0, 0, 0]), host("HOST-1", [0, 1, 0, 0, 0])];
        let outcome = process(&records, &PolicyTable::new());
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.results[0].code, "1A");
        assert_eq!(outcome.invalid[0].index, 1);
    }

    #[test]
    fn test_flag_coercion() {
        assert_eq!(coerce_flag(&json!(true)), Some(true));
        assert_eq!(coerce_flag(&json!(2)), Some(true));
        assert_eq!(coerce_flag(&json!(0.0)), Some(false));
        assert_eq!(coerce_flag(&json!(-1)), Some(false));
        assert_eq!(coerce_flag(&json!("1")), Some(true));
        assert_eq!(coerce_flag(&json!("false")), Some(false));
        assert_eq!(coerce_flag(&json!("maybe")), None);
        assert_eq!(coerce_flag(&Value::Null), None);
    }

    #[test]
    fn test_summary() {
        let records = vec![
            host("HOST-1", [1, 1, 0, 0, 0]),
            host("HOST-2", [1, 0, 0, 0, 0]),
            host("HOST-3", [0, 0, 0, 0, 0]),
        ];
        let summary = process(&records, &PolicyTable::new()).summary;

        assert_eq!(summary.total_hosts, 3);
        assert_eq!(summary.zombie_hosts, 2);
        assert_eq!(summary.non_zombie_hosts, 1);
        assert_eq!(summary.zombie_percentage, 66.67);
        assert_eq!(summary.criterion_breakdown["2A"].count, 1);
        assert_eq!(summary.criterion_breakdown["2A"].alias, "Mummy");
        assert!(!summary.criterion_breakdown.contains_key("0"));
    }

    #[test]
    fn test_empty_batch() {
        let outcome = process(&[], &PolicyTable::new());
        assert_eq!(outcome.summary.total_hosts, 0);
        assert_eq!(outcome.summary.zombie_percentage, 0.0);
    }

    #[test]
    fn test_result_wire_names() {
        let outcome = process(&[host("HOST-1", [1, 1, 0, 0, 0])], &PolicyTable::new());
        let json = serde_json::to_value(&outcome.results[0]).unwrap();
        assert_eq!(json["dynatrace_host_id"], "HOST-1");
        assert_eq!(json["criterion_type"], "2A");
        assert_eq!(json["criterion_alias"], "Mummy");
        assert_eq!(json["criterion_state"], 1);
        assert_eq!(json["is_zombie"], true);
    }
}
