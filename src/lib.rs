//! Phase-locked disambiguation of lighthouse optical pulse streams.
//!
//! Two rotating-laser base stations alternately emit short omnidirectional
//! *sync* flashes and long *sweep* passes on a strictly periodic 1.6 M-tick
//! schedule (800 k in single-lighthouse 60 Hz installations). A tracked
//! object reports raw optical events — sensor id, 32-bit tick timestamp,
//! on-duration — with nothing saying which lighthouse, slot, or axis each
//! one belongs to. This crate answers that question in real time: it locks
//! onto the schedule phase, tracks it through oscillator drift and counter
//! rollover, and emits normalized [`LightRecord`]s for the pose solver.
//!
//! ## Architecture
//!
//! - [`schedule`]: the static 12-slot pulse timetable and the modular
//!   phase arithmetic used to follow it across 32-bit clock wrap.
//! - [`pulse`]: sync-vs-sweep classification by width, acode matching,
//!   and coalescing of concurrently visible sync reports.
//! - [`discovery`]: searches a rolling history of coalesced syncs for the
//!   unique schedule phase consistent with all of them.
//! - [`tracker`]: the per-object state machine — once locked it advances
//!   slot by slot, validates every pulse, re-anchors on each sync, and
//!   flushes records at slot boundaries, all guarded by a confidence
//!   tally.
//! - [`context`]: the one piece of cross-object state, the 60 Hz regime
//!   flag.
//! - [`replay`]: parses recorded lightcap logs for offline re-runs.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use pulselock::{Disambiguator, DisambiguatorConfig, DisambiguatorContext, LightEvent, LightRecord};
//!
//! let ctx = Arc::new(DisambiguatorContext::new());
//! let mut disambiguator =
//!     Disambiguator::with_sensor_count(ctx, DisambiguatorConfig::default(), 32);
//!
//! let mut records: Vec<LightRecord> = Vec::new();
//! disambiguator.ingest(
//!     LightEvent { sensor_id: 3, timestamp: 48_026_210, length: 4_750 },
//!     &mut records,
//! );
//! // Records appear once the disambiguator has locked and built confidence.
//! ```

pub mod config;
pub mod context;
pub mod discovery;
pub mod pulse;
pub mod replay;
pub mod schedule;
pub mod tracker;
pub mod types;

pub use config::{ConfigError, DisambiguatorConfig};
pub use context::DisambiguatorContext;
pub use replay::{LightcapLog, ReplayError, ReplayEvent};
pub use tracker::{Disambiguator, LockState};
pub use types::{
    Axis, LightEvent, LightRecord, LightSink, Lighthouse, Regime, SlotCode, SYNC_INDEX,
    TIMEBASE_HZ,
};
