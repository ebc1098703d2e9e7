//! Zombie tracking query models

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::tracking::KilledRecord;

fn default_since_hours() -> i64 {
    24
}

fn default_days_to_keep() -> i64 {
    30
}

#[derive(Debug, Deserialize, Validate)]
pub struct KilledQuery {
    #[serde(default = "default_since_hours")]
    #[validate(range(min = 1, max = 168))]
    pub since_hours: i64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CleanupQuery {
    #[serde(default = "default_days_to_keep")]
    #[validate(range(min = 1, max = 365))]
    pub days_to_keep: i64,
}

#[derive(Debug, Serialize)]
pub struct ZombieKilledResponse {
    pub is_killed: bool,
    pub zombie_id: String,
    pub killed_info: Option<KilledRecord>,
}

#[derive(Debug, Serialize)]
pub struct CleanupResponse {
    pub message: String,
    pub history_removed: usize,
    pub killed_removed: usize,
}
