//! Operational tuning knobs.
//!
//! Only behavior that is genuinely tunable lives here — warm-up length,
//! confidence thresholds, reporting cadence. Protocol facts (the slot
//! table, pulse windows, acode timings) are compile-time constants in
//! [`crate::schedule`] and [`crate::pulse`]; a config file cannot change
//! what the base stations transmit.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Events dropped after startup while the sensor front-end settles.
pub const DEFAULT_STABILIZE_EVENTS: u32 = 200;

/// Confidence a lock must reach before light records are emitted upstream.
pub const DEFAULT_EMIT_CONFIDENCE: i32 = 80;

/// Confidence ceiling.
pub const DEFAULT_MAX_CONFIDENCE: i32 = 100;

/// Confidence cost of a sync pulse that matches no acode timing.
pub const DEFAULT_MISMATCH_PENALTY: i32 = 3;

/// Anchor corrections above this many ticks are warned about.
pub const DEFAULT_DRIFT_WARN_TICKS: u32 = 100;

/// Unlocked events between "still searching" warnings.
pub const DEFAULT_DISCOVERY_REPORT_INTERVAL: u32 = 1_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Tunable parameters of a [`Disambiguator`].
///
/// Every field falls back to its default when absent from the file, so a
/// config only needs the keys it overrides.
///
/// [`Disambiguator`]: crate::tracker::Disambiguator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisambiguatorConfig {
    /// Events dropped unconditionally at startup (hardware warm-up).
    pub stabilize_events: u32,
    /// Emission is suppressed until confidence exceeds this.
    pub emit_confidence: i32,
    /// Upper clamp on the confidence tally.
    pub max_confidence: i32,
    /// Penalty for a sync pulse whose width fits no expected timing.
    pub mismatch_penalty: i32,
    /// Anchor drift (ticks) beyond which a warning is logged.
    pub drift_warn_ticks: u32,
    /// How many failed discovery attempts go by between warnings.
    pub discovery_report_interval: u32,
}

impl Default for DisambiguatorConfig {
    fn default() -> Self {
        Self {
            stabilize_events: DEFAULT_STABILIZE_EVENTS,
            emit_confidence: DEFAULT_EMIT_CONFIDENCE,
            max_confidence: DEFAULT_MAX_CONFIDENCE,
            mismatch_penalty: DEFAULT_MISMATCH_PENALTY,
            drift_warn_ticks: DEFAULT_DRIFT_WARN_TICKS,
            discovery_report_interval: DEFAULT_DISCOVERY_REPORT_INTERVAL,
        }
    }
}

impl DisambiguatorConfig {
    /// Load overrides from a TOML file.
    pub fn from_toml_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }
}
