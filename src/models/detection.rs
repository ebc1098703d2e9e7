//! Detection request/response model

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::detection::{BatchSummary, DetectionResult, InvalidRecord, PolicyTable};
use crate::service::{DetectionRun, PublishingReport, RunOptions, TrackingReport};

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct DetectionOptions {
    /// Return only hosts classified as zombies
    pub zombies_only: bool,
    /// Include summary statistics in the response
    pub include_summary: bool,
}

#[derive(Debug, Deserialize)]
pub struct DetectionRequest {
    pub hosts: Vec<Value>,
    /// Per-request overrides of the configured states
    #[serde(default)]
    pub states: Option<PolicyTable>,
    #[serde(default)]
    pub options: DetectionOptions,
}

impl DetectionRequest {
    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            overrides: self.states.clone(),
            ..RunOptions::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Success,
    Partial,
}

#[derive(Debug, Serialize)]
pub struct DetectionResponse {
    pub status: ResponseStatus,
    pub results: Vec<DetectionResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<BatchSummary>,
    pub invalid_hosts: Vec<InvalidRecord>,
    pub tracking: TrackingReport,
    pub publishing: PublishingReport,
}

impl DetectionResponse {
    pub fn from_run(run: DetectionRun, options: DetectionOptions) -> Self {
        let status = if run.outcome.is_partial() {
            ResponseStatus::Partial
        } else {
            ResponseStatus::Success
        };

        let results = if options.zombies_only {
            run.outcome.zombies()
        } else {
            run.outcome.results
        };

        Self {
            status,
            results,
            summary: options.include_summary.then_some(run.outcome.summary),
            invalid_hosts: run.outcome.invalid,
            tracking: run.tracking,
            publishing: run.publishing,
        }
    }
}
