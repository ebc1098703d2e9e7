//! Configuration module

use std::env;
use std::fmt::Display;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::tracking::{TrackerSettings, DEFAULT_CLEANUP_DAYS, DEFAULT_MAX_HISTORY_ENTRIES};

/// Accepted `ZOMBIE_CLEANUP_DAYS` values (ten years at most)
pub const CLEANUP_DAYS_RANGE: RangeInclusive<i64> = 1..=3650;

/// Accepted `ZOMBIE_MAX_HISTORY_ENTRIES` values
pub const MAX_HISTORY_ENTRIES_RANGE: RangeInclusive<usize> = 1..=100_000;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port
    pub port: u16,

    /// Directory holding the tracker's JSON documents
    pub data_dir: PathBuf,

    /// `{code: 0|1}` states file
    pub states_path: PathBuf,

    pub max_history_entries: usize,

    pub cleanup_days: i64,

    pub tracking_enabled: bool,

    pub publisher_enabled: bool,

    pub publisher_url: String,

    pub topic_prefix: String,

    pub publish_timeout_secs: u64,

    /// Environment (development, production)
    pub environment: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8000,
            data_dir: PathBuf::from("/var/lib/zombie-detector"),
            states_path: PathBuf::from("/etc/zombie-detector/states.json"),
            max_history_entries: DEFAULT_MAX_HISTORY_ENTRIES,
            cleanup_days: DEFAULT_CLEANUP_DAYS,
            tracking_enabled: true,
            publisher_enabled: false,
            publisher_url: "http://localhost:8080/events".to_string(),
            topic_prefix: "zombie-detector".to_string(),
            publish_timeout_secs: 5,
            environment: "development".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            port: parsed("PORT").unwrap_or(defaults.port),

            data_dir: env::var("ZOMBIE_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),

            states_path: env::var("ZOMBIE_STATES_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.states_path),

            max_history_entries: bounded(
                "ZOMBIE_MAX_HISTORY_ENTRIES",
                MAX_HISTORY_ENTRIES_RANGE,
                defaults.max_history_entries,
            ),

            cleanup_days: bounded("ZOMBIE_CLEANUP_DAYS", CLEANUP_DAYS_RANGE, defaults.cleanup_days),

            tracking_enabled: flag("ZOMBIE_TRACKING_ENABLED").unwrap_or(defaults.tracking_enabled),

            publisher_enabled: flag("ZOMBIE_PUBLISHER_ENABLED").unwrap_or(defaults.publisher_enabled),

            publisher_url: env::var("ZOMBIE_PUBLISHER_URL").unwrap_or(defaults.publisher_url),

            topic_prefix: env::var("ZOMBIE_TOPIC_PREFIX").unwrap_or(defaults.topic_prefix),

            publish_timeout_secs: parsed("ZOMBIE_PUBLISH_TIMEOUT_SECS")
                .unwrap_or(defaults.publish_timeout_secs),

            environment: env::var("ENVIRONMENT").unwrap_or(defaults.environment),
        }
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        is_production(&self.environment)
    }

    pub fn tracker_settings(&self) -> TrackerSettings {
        TrackerSettings {
            max_history_entries: self.max_history_entries,
            cleanup_days: self.cleanup_days,
        }
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_secs(self.publish_timeout_secs)
    }
}

pub fn is_production(environment: &str) -> bool {
    environment.eq_ignore_ascii_case("production")
}

/// Production check straight from `ENVIRONMENT`, for use before logging is
/// initialised and the full configuration is loaded
pub fn production_from_env() -> bool {
    env::var("ENVIRONMENT").map(|e| is_production(&e)).unwrap_or(false)
}

fn parsed<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn bounded<T>(key: &str, range: RangeInclusive<T>, default: T) -> T
where
    T: FromStr + PartialOrd + Display + Copy,
{
    within(key, parsed(key), range, default)
}

/// `value` if it lies in `range`, otherwise `default` with a warning
fn within<T>(key: &str, value: Option<T>, range: RangeInclusive<T>, default: T) -> T
where
    T: PartialOrd + Display + Copy,
{
    match value {
        Some(value) if range.contains(&value) => value,
        Some(value) => {
            tracing::warn!(
                "{}={} outside {}..={}, using {}",
                key,
                value,
                range.start(),
                range.end(),
                default
            );
            default
        }
        None => default,
    }
}

fn flag(key: &str) -> Option<bool> {
    env::var(key).ok().and_then(|v| parse_flag(&v))
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.port, 8000);
        assert_eq!(config.tracker_settings(), TrackerSettings::default());
        assert!(!config.publisher_enabled);
        assert!(!config.is_production());
        assert!(is_production("Production"));
        assert!(!is_production("staging"));
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("TRUE"), Some(true));
        assert_eq!(parse_flag(" off "), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }

    #[test]
    fn test_retention_values_out_of_range_fall_back() {
        let days = |value| within("ZOMBIE_CLEANUP_DAYS", value, CLEANUP_DAYS_RANGE, DEFAULT_CLEANUP_DAYS);
        assert_eq!(days(Some(7)), 7);
        assert_eq!(days(Some(-1)), DEFAULT_CLEANUP_DAYS);
        assert_eq!(days(Some(0)), DEFAULT_CLEANUP_DAYS);
        assert_eq!(days(Some(1_000_000_000)), DEFAULT_CLEANUP_DAYS);
        assert_eq!(days(None), DEFAULT_CLEANUP_DAYS);

        let entries = |value| {
            within(
                "ZOMBIE_MAX_HISTORY_ENTRIES",
                value,
                MAX_HISTORY_ENTRIES_RANGE,
                DEFAULT_MAX_HISTORY_ENTRIES,
            )
        };
        assert_eq!(entries(Some(0)), DEFAULT_MAX_HISTORY_ENTRIES);
        assert_eq!(entries(Some(50)), 50);
    }
}
