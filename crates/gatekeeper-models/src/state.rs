use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Mode {
    /// Evaluation never leads to execution.
    #[default]
    Standby,
    Active,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Standby => write!(f, "STANDBY"),
            Mode::Active => write!(f, "ACTIVE"),
        }
    }
}

/// Per-instrument Freshness Gate counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FreshnessCounters {
    pub stale: u64,
    pub delayed: u64,
    pub slow: u64,
    pub unknown: u64,
}

/// The live mode and instrument configuration. Written only by the decision loop.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OperationalState {
    pub mode: Mode,
    pub active_instruments: BTreeSet<String>,
    pub last_updated: DateTime<Utc>,
    /// Incremented on every mutation.
    pub version: u64,
    #[serde(default)]
    pub freshness: BTreeMap<String, FreshnessCounters>,
}

impl Default for OperationalState {
    fn default() -> Self {
        Self {
            mode: Mode::Standby,
            active_instruments: BTreeSet::new(),
            last_updated: DateTime::<Utc>::default(),
            version: 0,
            freshness: BTreeMap::new(),
        }
    }
}

impl OperationalState {
    pub fn is_active(&self, instrument: &str) -> bool {
        self.active_instruments.contains(instrument)
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.version += 1;
        self.last_updated = now;
    }
}
