//! Per-object pulse-stream disambiguation.
//!
//! Each tracked object owns one [`Disambiguator`]. Events flow through
//! [`Disambiguator::ingest`] and take one of two paths:
//!
//! - **Unknown**: pulses are classified by width, concurrent syncs are
//!   coalesced, and every sealed sync triggers a phase search over the
//!   rolling history ([`crate::discovery`]).
//! - **Locked**: the tracker predicts the schedule slot from the pulse
//!   center and the per-lighthouse anchor, validates the pulse against
//!   that slot, and flushes normalized records at each slot boundary.
//!
//! A confidence tally arbitrates between the two: validated syncs raise
//! it, mismatches and event gaps spend it, and exhausting it drops the
//! tracker back to discovery. Emission is suppressed until confidence
//! clears the configured threshold, so a fresh (possibly wrong) lock never
//! feeds the pose solver.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::DisambiguatorConfig;
use crate::context::DisambiguatorContext;
use crate::discovery::{discover_phase, PhaseLock};
use crate::pulse::{acode_error, classify, PulseClass, SyncAccumulator, SyncHistory};
use crate::schedule::{
    acode_timing, anchor_drift, apply_mod, find_slot_by_offset, period, slot_start, PULSE_WINDOW,
    SCHEDULE, SLOT_COUNT,
};
use crate::types::{
    LightEvent, LightRecord, LightSink, Regime, TIMEBASE_HZ, SYNC_INDEX,
};

// ============================================================================
// Pulse acceptance thresholds
// ============================================================================

/// Sync-slot pulses shorter than this are reflections and carry no timing.
const MIN_SYNC_PULSE: u32 = 400;

/// Sweep-slot pulses longer than this are saturation artifacts.
const MAX_SWEEP_PULSE: u32 = 7_000;

/// Legitimate sweep hits are short; longer pulses cost confidence.
const SUSPECT_SWEEP_PULSE: u32 = 3_000;

/// Width error beyond which a sync pulse does not match its slot's acode.
const SYNC_ERROR_TOLERANCE: u32 = 1_250;

/// Sweep pulses below this length are dropped at flush time.
const MIN_SWEEP_FLUSH: u32 = 10;

/// Sweep pulses longer than this multiple of the slot average are dropped.
const SWEEP_SPREAD_LIMIT: u32 = 3;

/// Confidence cost per elapsed second without any event.
const GAP_PENALTY_PER_SECOND: i32 = 10;

/// Where the tracker believes the schedule currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockState {
    /// No phase lock; events feed the discovery search.
    Unknown,
    /// Locked onto this slot of [`SCHEDULE`].
    Slot(usize),
}

/// Phase-locked disambiguator for one tracked object.
pub struct Disambiguator {
    ctx: Arc<DisambiguatorContext>,
    config: DisambiguatorConfig,
    sensor_count: usize,
    state: Option<Box<ObjectState>>,
}

impl Disambiguator {
    /// A disambiguator with no sensor map yet; events are dropped until
    /// [`set_sensor_count`](Self::set_sensor_count) is called.
    pub fn new(ctx: Arc<DisambiguatorContext>, config: DisambiguatorConfig) -> Self {
        Self {
            ctx,
            config,
            sensor_count: 0,
            state: None,
        }
    }

    pub fn with_sensor_count(
        ctx: Arc<DisambiguatorContext>,
        config: DisambiguatorConfig,
        sensor_count: usize,
    ) -> Self {
        let mut this = Self::new(ctx, config);
        this.set_sensor_count(sensor_count);
        this
    }

    /// Declare how many sensors the object carries. Arrives with the
    /// object's configuration, typically after the first events.
    pub fn set_sensor_count(&mut self, sensor_count: usize) {
        self.sensor_count = sensor_count;
        if let Some(state) = &mut self.state {
            state.sweep_buffer.resize(sensor_count, LightEvent::default());
        }
    }

    pub fn sensor_count(&self) -> usize {
        self.sensor_count
    }

    pub fn lock_state(&self) -> LockState {
        self.state.as_ref().map_or(LockState::Unknown, |s| s.lock)
    }

    pub fn is_locked(&self) -> bool {
        self.lock_state() != LockState::Unknown
    }

    /// Current confidence tally.
    pub fn confidence(&self) -> i32 {
        self.state.as_ref().map_or(0, |s| s.confidence)
    }

    /// Per-lighthouse phase anchors, once locked.
    pub fn anchors(&self) -> Option<[u32; 2]> {
        let state = self.state.as_ref()?;
        (state.lock != LockState::Unknown).then_some(state.mod_offset)
    }

    /// Feed one raw event; normalized records come out through `sink`.
    pub fn ingest<S: LightSink + ?Sized>(&mut self, le: LightEvent, sink: &mut S) {
        // Without a sensor map nothing downstream could use the event.
        if self.sensor_count == 0 {
            return;
        }
        let sensor_count = self.sensor_count;
        let state = self
            .state
            .get_or_insert_with(|| Box::new(ObjectState::new(sensor_count)));

        // The first couple hundred events off the hardware drop a lot of
        // pulses; let it settle before trusting anything.
        if state.stabilize < self.config.stabilize_events {
            state.stabilize += 1;
            return;
        }

        if usize::from(le.sensor_id) >= sensor_count {
            warn!(sensor_id = le.sensor_id, "event from unmapped sensor dropped");
            return;
        }

        match state.lock {
            LockState::Unknown => state.attempt_lock(&le, &self.ctx, &self.config),
            LockState::Slot(_) => state.track(&le, &self.ctx, &self.config, sink),
        }

        state.last_timestamp = le.timestamp;
    }
}

impl Drop for Disambiguator {
    fn drop(&mut self) {
        if let Some(state) = &self.state {
            if state.lock != LockState::Unknown {
                self.ctx.note_unlock();
            }
        }
    }
}

#[derive(Debug)]
struct ObjectState {
    lock: LockState,
    /// Tick at which each lighthouse's slot-0 start last aligned.
    mod_offset: [u32; 2],
    confidence: i32,
    history: SyncHistory,
    accumulator: SyncAccumulator,
    /// Longest pulse per sensor within the current sweep slot.
    sweep_buffer: Vec<LightEvent>,
    stabilize: u32,
    last_timestamp: u32,
    failures: u32,
    last_was_sync: bool,
}

impl ObjectState {
    fn new(sensor_count: usize) -> Self {
        Self {
            lock: LockState::Unknown,
            mod_offset: [0; 2],
            confidence: 0,
            history: SyncHistory::default(),
            accumulator: SyncAccumulator::default(),
            sweep_buffer: vec![LightEvent::default(); sensor_count],
            stabilize: 0,
            last_timestamp: 0,
            failures: 0,
            last_was_sync: false,
        }
    }

    // ------------------------------------------------------------------
    // Unknown path
    // ------------------------------------------------------------------

    fn attempt_lock(
        &mut self,
        le: &LightEvent,
        ctx: &DisambiguatorContext,
        config: &DisambiguatorConfig,
    ) {
        let locked = match classify(le.length) {
            PulseClass::Sync => {
                let mut locked = None;
                if !self.last_was_sync || !self.accumulator.overlaps(le) {
                    // A distinct new sync; the sealed one may pin the phase.
                    if self.last_was_sync {
                        locked = self.end_sync(ctx);
                    }
                    if locked.is_none() {
                        self.accumulator.reset();
                    }
                }
                if locked.is_none() {
                    self.accumulator.register(le);
                    self.last_was_sync = true;
                }
                locked
            }
            PulseClass::Sweep => {
                let locked = if self.last_was_sync {
                    self.end_sync(ctx)
                } else {
                    None
                };
                self.last_was_sync = false;
                locked
            }
        };

        match locked {
            Some(lock) => {
                ctx.note_lock(lock.regime);
                self.confidence = 0;
                self.failures = 0;
                self.set_lock(LockState::Slot(lock.slot), ctx);
                info!(
                    slot = lock.slot,
                    anchor = lock.anchor,
                    regime = ?lock.regime,
                    "locked onto pulse schedule"
                );
            }
            None => {
                self.failures += 1;
                if self.failures > config.discovery_report_interval {
                    self.failures = 0;
                    warn!("no consistent pulse schedule phase found yet");
                }
            }
        }
    }

    /// Seal the in-progress sync into the history and run the phase search.
    fn end_sync(&mut self, ctx: &DisambiguatorContext) -> Option<PhaseLock> {
        if let Some(sync) = self.accumulator.snapshot() {
            self.history.push(sync);
        }
        let lock = discover_phase(&self.history, ctx.regime_hint())?;
        self.mod_offset = [lock.anchor; 2];
        Some(lock)
    }

    // ------------------------------------------------------------------
    // Locked path
    // ------------------------------------------------------------------

    fn track<S: LightSink + ?Sized>(
        &mut self,
        le: &LightEvent,
        ctx: &DisambiguatorContext,
        config: &DisambiguatorConfig,
        sink: &mut S,
    ) {
        let gap = le.timestamp.wrapping_sub(self.last_timestamp);
        if gap > TIMEBASE_HZ {
            let penalty = (gap / TIMEBASE_HZ) as i32 * GAP_PENALTY_PER_SECOND;
            if self.confidence < penalty {
                self.set_lock(LockState::Unknown, ctx);
                warn!(
                    timestamp = le.timestamp,
                    gap, "signal lost; restarting phase discovery"
                );
                return;
            }
            self.confidence -= penalty;
        }

        let regime = ctx.regime();
        let LockState::Slot(current) = self.lock else {
            return;
        };

        // Predict the slot from the pulse center against the anchor of the
        // lighthouse we believe is firing.
        let lighthouse = SCHEDULE[current].lighthouse;
        let center = le.timestamp.wrapping_add(le.length / 2);
        let offset = apply_mod(center, self.mod_offset[lighthouse.index()], period(regime));
        let (new_slot, _offset_error) = find_slot_by_offset(offset);

        if new_slot != current {
            if new_slot != (current + 1) % SLOT_COUNT {
                debug!(from = current, to = new_slot, "slots skipped");
            }
            self.process_transition(current, new_slot, regime, ctx, config, sink);
        }

        let LockState::Slot(current) = self.lock else {
            return;
        };
        let params = &SCHEDULE[current];
        if !params.is_sweep {
            self.capture_sync(current, le, ctx, config);
        } else {
            if le.length > MAX_SWEEP_PULSE {
                return;
            }
            if le.length > SUSPECT_SWEEP_PULSE {
                self.confidence -= 1;
                if self.confidence <= 0 {
                    self.set_lock(LockState::Unknown, ctx);
                    warn!(
                        timestamp = le.timestamp,
                        "sweep noise exhausted confidence; restarting phase discovery"
                    );
                    return;
                }
            }
            let buffered = &mut self.sweep_buffer[usize::from(le.sensor_id)];
            if le.length > buffered.length {
                *buffered = *le;
            }
        }
    }

    /// Validate a pulse against the sync slot the tracker is sitting in.
    fn capture_sync(
        &mut self,
        slot: usize,
        le: &LightEvent,
        ctx: &DisambiguatorContext,
        config: &DisambiguatorConfig,
    ) {
        // Reflections; ignoring them measurably improves signal quality.
        if le.length < MIN_SYNC_PULSE {
            return;
        }

        let error = acode_error(SCHEDULE[slot].code.bits(), le.length);
        if error > SYNC_ERROR_TOLERANCE {
            // Misses happen — reflections, cross-talk. Tally them against
            // the hits and restart the search once they win.
            if self.confidence < config.mismatch_penalty {
                self.set_lock(LockState::Unknown, ctx);
                warn!(
                    timestamp = le.timestamp,
                    error, "lost track of pulse schedule; restarting phase discovery"
                );
            }
            self.confidence -= config.mismatch_penalty;
            return;
        }

        if self.confidence < config.max_confidence {
            self.confidence += 1;
        }
        self.accumulator.register(le);
    }

    /// Flush the slot being left and move to `new_slot`.
    fn process_transition<S: LightSink + ?Sized>(
        &mut self,
        old_slot: usize,
        new_slot: usize,
        regime: Regime,
        ctx: &DisambiguatorContext,
        config: &DisambiguatorConfig,
        sink: &mut S,
    ) {
        let params = &SCHEDULE[old_slot];
        if !params.is_sweep {
            if let Some(sync) = self.accumulator.snapshot() {
                self.history.push(sync);

                // Re-anchor on the sync we just watched; this absorbs
                // long-term oscillator drift on either side.
                let lighthouse = params.lighthouse;
                let refreshed = sync.first_timestamp.wrapping_sub(slot_start(old_slot));
                let drift = anchor_drift(
                    refreshed,
                    self.mod_offset[lighthouse.index()],
                    period(regime),
                );
                if drift.unsigned_abs() > config.drift_warn_ticks {
                    warn!(
                        %lighthouse,
                        drift,
                        average_length = self.accumulator.average_length(),
                        "timecode drift"
                    );
                }
                self.mod_offset[lighthouse.index()] = refreshed;

                // OOTX downstream needs to know whether the pulse carried
                // the data bit; whichever timing is nearer wins.
                let base = params.code;
                let with_data = base.with_data(true);
                let base_error = acode_timing(base.bits()).abs_diff(sync.longest_length);
                let data_error = acode_timing(with_data.bits()).abs_diff(sync.longest_length);
                let code = if data_error < base_error { with_data } else { base };

                if self.confidence > config.emit_confidence {
                    sink.emit_light(LightRecord {
                        index: SYNC_INDEX,
                        sensor: -(sync.count as i32),
                        acode: code.bits(),
                        sweep_offset: 0,
                        timestamp: sync.first_timestamp,
                        length: sync.longest_length,
                        lighthouse,
                    });
                }
            }
        } else {
            self.flush_sweep(old_slot, regime, config, sink);
        }

        self.set_lock(LockState::Slot(new_slot), ctx);
    }

    /// Emit the buffered sweep hits of the slot being left.
    fn flush_sweep<S: LightSink + ?Sized>(
        &mut self,
        old_slot: usize,
        regime: Regime,
        config: &DisambiguatorConfig,
        sink: &mut S,
    ) {
        let params = &SCHEDULE[old_slot];

        let mut lit = 0u32;
        let mut length_sum = 0u64;
        for le in &self.sweep_buffer {
            if le.length > 0 {
                lit += 1;
                length_sum += u64::from(le.length);
            }
        }
        if lit == 0 {
            return;
        }
        let average = ((length_sum + u64::from(lit) / 2) / u64::from(lit)) as u32;
        let max_length = SWEEP_SPREAD_LIMIT * average;
        let anchor = self.mod_offset[params.lighthouse.index()];

        for (sensor, le) in self.sweep_buffer.iter().enumerate() {
            if le.length < MIN_SWEEP_FLUSH || le.length > max_length {
                continue;
            }
            let center = le.timestamp.wrapping_add(le.length / 2);
            let le_offset = apply_mod(center, anchor, period(regime));
            // Offsets are measured from the start of the sync slot that
            // opened this half-rotation.
            let sweep_offset = i64::from(le_offset) - i64::from(slot_start(old_slot))
                + i64::from(PULSE_WINDOW);
            assert!(sweep_offset > 0, "sweep offset fell outside the slot window");

            if self.confidence > config.emit_confidence {
                sink.emit_light(LightRecord {
                    index: sensor as i32,
                    sensor: sensor as i32,
                    acode: params.code.bits(),
                    sweep_offset: sweep_offset as u32,
                    timestamp: le.timestamp,
                    length: le.length,
                    lighthouse: params.lighthouse,
                });
            }
        }
    }

    /// Move to a new slot. Always clears the per-slot capture state;
    /// dropping to Unknown also clears the history and releases this
    /// object's claim on the regime.
    fn set_lock(&mut self, new: LockState, ctx: &DisambiguatorContext) {
        if new == LockState::Unknown {
            self.history.clear();
            self.last_was_sync = false;
            if self.lock != LockState::Unknown {
                ctx.note_unlock();
            }
        }
        self.lock = new;
        self.accumulator.reset();
        self.sweep_buffer.fill(LightEvent::default());
    }
}
