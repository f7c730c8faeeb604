//! Pulse classification and sync coalescing.
//!
//! Sync flashes are omnidirectional, so every sensor on the object reports
//! the same flash within a few ticks. The [`SyncAccumulator`] merges those
//! concurrent reports into one representative pulse; sealed pulses roll
//! into the [`SyncHistory`] ring that phase discovery searches.

use crate::schedule::acode_timing;
use crate::types::{LightEvent, DATA_BIT};

// ============================================================================
// Width thresholds
// ============================================================================

/// Shortest pulse still classified as a sync, in ticks.
pub const SYNC_PULSE_MIN: u32 = 2_250;
/// Longest pulse still classified as a sync, in ticks.
pub const SYNC_PULSE_MAX: u32 = 6_750;

/// Start of the first acode width bucket.
const ACODE_BUCKET_BASE: u32 = 2_550;
/// Width of each acode bucket.
const ACODE_BUCKET_WIDTH: u32 = 500;

/// Coalesced sync pulses the discovery search keeps.
pub const SYNC_HISTORY_LEN: usize = 12;

/// Coarse shape of a pulse, judged by width alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PulseClass {
    Sync,
    Sweep,
}

/// Classify a pulse by width. The sync window brackets every legal acode
/// timing with margin for sensor jitter.
pub fn classify(length: u32) -> PulseClass {
    if (SYNC_PULSE_MIN..=SYNC_PULSE_MAX).contains(&length) {
        PulseClass::Sync
    } else {
        PulseClass::Sweep
    }
}

/// Bucket a sync pulse width into an acode guess. Only used during phase
/// discovery; once locked the tracker verifies the expected acode instead.
pub fn find_acode(length: u32) -> Option<u8> {
    let buckets = 8;
    if !(ACODE_BUCKET_BASE..ACODE_BUCKET_BASE + buckets * ACODE_BUCKET_WIDTH).contains(&length) {
        return None;
    }
    Some(((length - ACODE_BUCKET_BASE) / ACODE_BUCKET_WIDTH) as u8)
}

/// Width error of a pulse against a target acode, taking whichever of the
/// with-data and without-data timings is nearer.
pub fn acode_error(target_acode: u8, length: u32) -> u32 {
    let plain = acode_timing(target_acode & !DATA_BIT).abs_diff(length);
    let with_data = acode_timing(target_acode | DATA_BIT).abs_diff(length);
    plain.min(with_data)
}

// ============================================================================
// Sync coalescing
// ============================================================================

/// One coalesced sync pulse as remembered by the history ring.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncPulse {
    /// Earliest start tick among the merged reports.
    pub first_timestamp: u32,
    /// Longest on-duration among the merged reports.
    pub longest_length: u32,
    /// How many reports were merged.
    pub count: u32,
}

/// Merges the per-sensor reports of one physical sync flash.
#[derive(Debug, Default)]
pub struct SyncAccumulator {
    first_timestamp: u32,
    longest_length: u32,
    timestamp_sum: u64,
    length_sum: u64,
    count: u32,
    last: LightEvent,
}

impl SyncAccumulator {
    /// Fold another report into the pulse being accumulated.
    pub fn register(&mut self, le: &LightEvent) {
        if self.longest_length == 0 || le.timestamp < self.first_timestamp {
            self.first_timestamp = le.timestamp;
        }
        if le.length > self.longest_length {
            self.longest_length = le.length;
        }
        self.timestamp_sum += u64::from(le.timestamp);
        self.length_sum += u64::from(le.length);
        self.count += 1;
        self.last = *le;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// The accumulated pulse, or `None` when nothing has been registered.
    pub fn snapshot(&self) -> Option<SyncPulse> {
        (self.count > 0).then(|| SyncPulse {
            first_timestamp: self.first_timestamp,
            longest_length: self.longest_length,
            count: self.count,
        })
    }

    /// Mean on-duration of the merged reports.
    pub fn average_length(&self) -> u32 {
        if self.count == 0 {
            0
        } else {
            (self.length_sum / u64::from(self.count)) as u32
        }
    }

    /// Mean start tick of the merged reports.
    pub fn average_timestamp(&self) -> u32 {
        if self.count == 0 {
            0
        } else {
            (self.timestamp_sum / u64::from(self.count)) as u32
        }
    }

    /// The most recently merged report.
    pub fn last_event(&self) -> Option<&LightEvent> {
        (self.count > 0).then_some(&self.last)
    }

    /// Whether `le` belongs to the pulse being accumulated: the intervals
    /// must overlap by more than half of the shorter pulse.
    pub fn overlaps(&self, le: &LightEvent) -> bool {
        if self.count == 0 {
            return false;
        }
        let a_start = u64::from(self.first_timestamp);
        let a_end = a_start + u64::from(self.longest_length);
        let b_start = u64::from(le.timestamp);
        let b_end = b_start + u64::from(le.length);
        let overlap = a_end.min(b_end).saturating_sub(a_start.max(b_start));
        overlap > u64::from(self.longest_length.min(le.length)) / 2
    }
}

/// Ring of the last [`SYNC_HISTORY_LEN`] sealed sync pulses.
///
/// Entries stay causally ordered by `first_timestamp` modulo counter wrap;
/// zero-length pulses are never stored.
#[derive(Debug)]
pub struct SyncHistory {
    entries: [SyncPulse; SYNC_HISTORY_LEN],
    write_index: usize,
}

impl Default for SyncHistory {
    fn default() -> Self {
        Self {
            entries: [SyncPulse::default(); SYNC_HISTORY_LEN],
            write_index: 0,
        }
    }
}

impl SyncHistory {
    pub fn push(&mut self, pulse: SyncPulse) {
        if pulse.longest_length == 0 {
            return;
        }
        self.entries[self.write_index] = pulse;
        self.write_index = (self.write_index + 1) % SYNC_HISTORY_LEN;
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// The most recently pushed pulse.
    pub fn latest(&self) -> Option<&SyncPulse> {
        let index = (self.write_index + SYNC_HISTORY_LEN - 1) % SYNC_HISTORY_LEN;
        let entry = &self.entries[index];
        (entry.longest_length > 0).then_some(entry)
    }

    /// All stored pulses, in ring order.
    pub fn filled(&self) -> impl Iterator<Item = &SyncPulse> {
        self.entries.iter().filter(|e| e.longest_length > 0)
    }
}
