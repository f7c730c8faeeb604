//! Static description of the lighthouse pulse schedule and the phase
//! arithmetic used to track it.
//!
//! The two base stations cycle through twelve scheduled slots per period:
//!
//! ```text
//!     Ticks  Slot
//!         0  sync  B  acode 4
//!    20 000  sync  A  acode 0
//!    40 000  sweep A  X axis
//!   400 000  sync  B  acode 5
//!   420 000  sync  A  acode 1
//!   440 000  sweep A  Y axis
//!   800 000  sync  B  acode 0
//!   820 000  sync  A  acode 4
//!   840 000  sweep B  X axis
//! 1 200 000  sync  B  acode 1
//! 1 220 000  sync  A  acode 5
//! 1 240 000  sweep B  Y axis
//! 1 600 000  repeat
//! ```
//!
//! In single-lighthouse 60 Hz installations only the first six slots exist
//! and the period halves to 800 000 ticks.

use crate::types::{Axis, Lighthouse, Regime, SlotCode};

/// Width of a sync slot in ticks.
pub const PULSE_WINDOW: u32 = 20_000;
/// Width of a sweep capture slot in ticks.
pub const CAPTURE_WINDOW: u32 = 360_000;

/// Number of slots in the full schedule.
pub const SLOT_COUNT: usize = 12;
/// Number of slots used in single-lighthouse 60 Hz mode.
pub const HALF_SLOT_COUNT: usize = 6;

/// Distance inside which an event near the end of a sweep window may be
/// claimed by the following sync slot.
const SWEEP_TAIL_GUARD: u32 = 1_000;

/// One scheduled position in the period.
#[derive(Debug, Clone, Copy)]
pub struct ScheduleSlot {
    /// The acode the slot's sync pulse encodes (data bit clear at rest).
    pub code: SlotCode,
    pub lighthouse: Lighthouse,
    pub window: u32,
    pub is_sweep: bool,
}

impl ScheduleSlot {
    pub const fn axis(&self) -> Axis {
        self.code.axis
    }

    const fn sync(skip: bool, axis: Axis, lighthouse: Lighthouse) -> Self {
        Self {
            code: SlotCode::new(skip, axis),
            lighthouse,
            window: PULSE_WINDOW,
            is_sweep: false,
        }
    }

    const fn sweep(skip: bool, axis: Axis, lighthouse: Lighthouse) -> Self {
        Self {
            code: SlotCode::new(skip, axis),
            lighthouse,
            window: CAPTURE_WINDOW,
            is_sweep: true,
        }
    }
}

/// The full twelve-slot schedule, in firing order.
pub const SCHEDULE: [ScheduleSlot; SLOT_COUNT] = [
    ScheduleSlot::sync(true, Axis::X, Lighthouse::B), // 0
    ScheduleSlot::sync(false, Axis::X, Lighthouse::A), // 20 000
    ScheduleSlot::sweep(true, Axis::X, Lighthouse::A), // 40 000
    ScheduleSlot::sync(true, Axis::Y, Lighthouse::B), // 400 000
    ScheduleSlot::sync(false, Axis::Y, Lighthouse::A), // 420 000
    ScheduleSlot::sweep(false, Axis::Y, Lighthouse::A), // 440 000
    ScheduleSlot::sync(false, Axis::X, Lighthouse::B), // 800 000
    ScheduleSlot::sync(true, Axis::X, Lighthouse::A), // 820 000
    ScheduleSlot::sweep(true, Axis::X, Lighthouse::B), // 840 000
    ScheduleSlot::sync(false, Axis::Y, Lighthouse::B), // 1 200 000
    ScheduleSlot::sync(true, Axis::Y, Lighthouse::A), // 1 220 000
    ScheduleSlot::sweep(true, Axis::Y, Lighthouse::B), // 1 240 000
];

const fn prefix_sums() -> [u32; SLOT_COUNT + 1] {
    let mut starts = [0u32; SLOT_COUNT + 1];
    let mut i = 0;
    while i < SLOT_COUNT {
        starts[i + 1] = starts[i] + SCHEDULE[i].window;
        i += 1;
    }
    starts
}

/// Start offset of every slot, plus the full period as the final entry.
pub const SLOT_STARTS: [u32; SLOT_COUNT + 1] = prefix_sums();

/// Full two-lighthouse period in ticks.
pub const FULL_PERIOD: u32 = SLOT_STARTS[SLOT_COUNT];
/// Single-lighthouse 60 Hz period in ticks.
pub const HALF_PERIOD: u32 = SLOT_STARTS[HALF_SLOT_COUNT];

pub const fn slot_start(slot: usize) -> u32 {
    SLOT_STARTS[slot]
}

pub const fn period(regime: Regime) -> u32 {
    match regime {
        Regime::Full => FULL_PERIOD,
        Regime::Single60Hz => HALF_PERIOD,
    }
}

/// Expected sync pulse width for a packed acode, in ticks.
pub const fn acode_timing(acode: u8) -> u32 {
    3_000 + (acode & 1) as u32 * 500 + ((acode >> 1) & 1) as u32 * 1_000 + ((acode >> 2) & 1) as u32 * 2_000 - 250
}

/// Map a period offset to the slot it falls in.
///
/// Returns the slot index and the distance to the nearest slot boundary.
/// Offsets are claimed by whichever boundary slot is closer, except that
/// the tail of a sweep window stays with the sweep unless the offset is
/// within [`SWEEP_TAIL_GUARD`] of the next sync slot. The end-of-period
/// boundary wraps to slot 0.
pub fn find_slot_by_offset(offset: u32) -> (usize, u32) {
    for slot in 1..=SLOT_COUNT {
        if SLOT_STARTS[slot] > offset {
            let dist_from_prev = offset - SLOT_STARTS[slot - 1];
            let dist_from_this = SLOT_STARTS[slot] - offset;

            let mut this_is_closer = dist_from_prev > dist_from_this;
            if SCHEDULE[slot - 1].is_sweep && dist_from_this > SWEEP_TAIL_GUARD {
                this_is_closer = false;
            }

            return if this_is_closer {
                (if slot == SLOT_COUNT { 0 } else { slot }, dist_from_this)
            } else {
                (slot - 1, dist_from_prev)
            };
        }
    }
    panic!("offset {offset} outside the schedule period");
}

/// `(timestamp - anchor) mod period`, tolerant of the 32-bit tick counter
/// wrapping between `anchor` and `timestamp`.
pub fn apply_mod(timestamp: u32, anchor: u32, period: u32) -> u32 {
    if timestamp >= anchor {
        return (timestamp - anchor) % period;
    }
    // A gap of more than half the counter range means the anchor predates
    // a rollover, not that the event ran backwards.
    if anchor - timestamp > u32::MAX / 2 {
        return timestamp.wrapping_sub(anchor) % period;
    }
    let delta = (timestamp % period) as i64 - (anchor % period) as i64;
    delta.rem_euclid(i64::from(period)) as u32
}

/// Signed distance from `old` to `new`, reduced into `(-period/2, period/2]`.
///
/// Used to measure anchor drift between consecutive refreshes; exact as
/// long as the true distance stays within half the counter range.
pub fn anchor_drift(new: u32, old: u32, period: u32) -> i32 {
    let raw = i64::from(new.wrapping_sub(old) as i32);
    let period = i64::from(period);
    let mut delta = raw.rem_euclid(period);
    if delta > period / 2 {
        delta -= period;
    }
    delta as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_starts_match_the_published_table() {
        assert_eq!(
            SLOT_STARTS,
            [
                0, 20_000, 40_000, 400_000, 420_000, 440_000, 800_000, 820_000, 840_000,
                1_200_000, 1_220_000, 1_240_000, 1_600_000
            ]
        );
        assert_eq!(FULL_PERIOD, 1_600_000);
        assert_eq!(HALF_PERIOD, 800_000);
    }

    #[test]
    fn acode_timings() {
        assert_eq!(acode_timing(0), 2_750);
        assert_eq!(acode_timing(1), 3_250);
        assert_eq!(acode_timing(4), 4_750);
        assert_eq!(acode_timing(5), 5_250);
        // The data bit adds 1 000 ticks.
        assert_eq!(acode_timing(0b010), 3_750);
        assert_eq!(acode_timing(0b110), 5_750);
    }

    #[test]
    fn every_slot_start_maps_to_its_own_slot() {
        for slot in 0..SLOT_COUNT {
            let (found, error) = find_slot_by_offset(slot_start(slot));
            assert_eq!(found, slot);
            assert_eq!(error, 0);
        }
    }

    #[test]
    fn sweep_tails_stay_with_the_sweep() {
        // Deep into the first sweep window, closer to the next sync start.
        let (slot, _) = find_slot_by_offset(slot_start(3) - 5_000);
        assert_eq!(slot, 2);
        // Within the guard of the next sync the successor wins.
        let (slot, error) = find_slot_by_offset(slot_start(3) - 500);
        assert_eq!(slot, 3);
        assert_eq!(error, 500);
    }

    #[test]
    fn sync_midpoints_split_between_neighbours() {
        let (slot, _) = find_slot_by_offset(slot_start(1) + 9_000);
        assert_eq!(slot, 1);
        let (slot, _) = find_slot_by_offset(slot_start(1) + 11_000);
        assert_eq!(slot, 2);
    }

    #[test]
    fn end_of_period_wraps_to_slot_zero() {
        let (slot, error) = find_slot_by_offset(FULL_PERIOD - 300);
        assert_eq!(slot, 0);
        assert_eq!(error, 300);
    }

    #[test]
    fn apply_mod_is_periodic() {
        let anchor = 123_456;
        for k in 0..4u32 {
            assert_eq!(
                apply_mod(anchor + 777 + k * FULL_PERIOD, anchor, FULL_PERIOD),
                777
            );
        }
    }

    #[test]
    fn apply_mod_survives_counter_rollover() {
        // Anchor recorded shortly before the counter wrapped.
        let anchor = u32::MAX - 10_000;
        let elapsed = 250_000u32;
        let timestamp = anchor.wrapping_add(elapsed);
        assert!(timestamp < anchor);
        assert_eq!(
            apply_mod(timestamp, anchor, FULL_PERIOD),
            elapsed % FULL_PERIOD
        );
        // Still periodic on the far side of the wrap.
        assert_eq!(
            apply_mod(timestamp.wrapping_add(FULL_PERIOD), anchor, FULL_PERIOD),
            elapsed % FULL_PERIOD
        );
    }

    #[test]
    fn apply_mod_handles_backward_events() {
        let anchor = 5_000_000;
        let result = apply_mod(anchor - 300, anchor, FULL_PERIOD);
        assert_eq!(result, FULL_PERIOD - 300);
        assert!(result < FULL_PERIOD);
    }

    #[test]
    fn anchor_drift_is_signed_and_period_reduced() {
        assert_eq!(anchor_drift(1_000_300, 1_000_000, FULL_PERIOD), 300);
        assert_eq!(anchor_drift(1_000_000, 1_000_050, FULL_PERIOD), -50);
        // One full period of advance is no drift at all.
        assert_eq!(anchor_drift(1_000_000 + FULL_PERIOD, 1_000_000, FULL_PERIOD), 0);
        // Exact across a counter rollover.
        let old = u32::MAX - 100;
        assert_eq!(anchor_drift(old.wrapping_add(FULL_PERIOD + 40), old, FULL_PERIOD), 40);
    }
}
