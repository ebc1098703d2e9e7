//! Policy Table
//!
//! Enable/disable switch per classification code, loaded from a JSON
//! `{code: 0|1}` states file. Codes the table does not mention are active.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::codes;

#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("failed to read states file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid states file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Code -> active flag. Serialised as `{code: 0|1}`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyTable {
    states: BTreeMap<String, bool>,
}

/// Table value for `code`, defaulting to active when absent
pub fn is_active(code: &str, table: &PolicyTable) -> bool {
    table.states.get(code).copied().unwrap_or(true)
}

impl PolicyTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_states<I, K>(states: I) -> Self
    where
        I: IntoIterator<Item = (K, bool)>,
        K: Into<String>,
    {
        Self {
            states: states.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    pub fn is_active(&self, code: &str) -> bool {
        is_active(code, self)
    }

    /// 0/1 state reported alongside detection results
    pub fn state(&self, code: &str) -> u8 {
        u8::from(self.is_active(code))
    }

    pub fn set(&mut self, code: impl Into<String>, active: bool) {
        self.states.insert(code.into(), active);
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Entries of `overrides` take precedence over this table
    pub fn with_overrides(&self, overrides: &PolicyTable) -> PolicyTable {
        let mut merged = self.clone();
        for (code, active) in &overrides.states {
            merged.states.insert(code.clone(), *active);
        }
        merged
    }

    /// State of every catalogue code, in canonical order
    pub fn effective(&self) -> Vec<(&'static str, u8)> {
        codes::all_codes().map(|code| (code, self.state(code))).collect()
    }

    /// Codes present in the table that the catalogue does not know
    pub fn unknown_codes(&self) -> Vec<&str> {
        self.states
            .keys()
            .map(String::as_str)
            .filter(|code| !codes::is_known_code(code))
            .collect()
    }

    /// Strict load: any read or parse failure is an error.
    /// A missing file yields the default (all-active) table.
    pub fn try_load(path: &Path) -> Result<PolicyTable, PolicyError> {
        if !path.exists() {
            tracing::info!("States file {} not found, all codes active", path.display());
            return Ok(PolicyTable::default());
        }

        let data = fs::read(path).map_err(|source| PolicyError::Read {
            path: path.display().to_string(),
            source,
        })?;

        let table: PolicyTable = serde_json::from_slice(&data).map_err(|source| PolicyError::Parse {
            path: path.display().to_string(),
            source,
        })?;

        let unknown = table.unknown_codes();
        if !unknown.is_empty() {
            tracing::warn!("States file {} lists unknown codes: {:?}", path.display(), unknown);
        }

        tracing::debug!("Loaded {} code states from {}", table.len(), path.display());
        Ok(table)
    }

    /// Lenient load used by the binaries: failures fall back to all-active.
    pub fn load(path: &Path) -> PolicyTable {
        match Self::try_load(path) {
            Ok(table) => table,
            Err(e) => {
                tracing::warn!("{}; falling back to all codes active", e);
                PolicyTable::default()
            }
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StateValue {
    Flag(bool),
    Level(i64),
}

impl<'de> Deserialize<'de> for PolicyTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<String, StateValue>::deserialize(deserializer)?;
        let states = raw
            .into_iter()
            .map(|(code, value)| {
                let active = match value {
                    StateValue::Flag(flag) => flag,
                    StateValue::Level(level) => level != 0,
                };
                (code, active)
            })
            .collect();
        Ok(PolicyTable { states })
    }
}

impl Serialize for PolicyTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.states.iter().map(|(code, active)| (code, u8::from(*active))))
    }
}
