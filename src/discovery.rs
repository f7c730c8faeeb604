//! Phase discovery over the rolling sync history.
//!
//! A single sync pulse is ambiguous: without the data bit its width matches
//! two slots per period, and its timestamp alone says nothing about where
//! the period starts. Twelve coalesced syncs spanning at least one full
//! period are enough to make the phase unique — the search below tries
//! every slot the latest pulse could belong to and keeps the first guess
//! that explains (almost) the whole history.

use tracing::{debug, trace};

use crate::pulse::{acode_error, find_acode, SyncHistory, SYNC_HISTORY_LEN};
use crate::schedule::{apply_mod, find_slot_by_offset, period, slot_start, HALF_SLOT_COUNT, SCHEDULE};
use crate::types::{Lighthouse, Regime, AXIS_BIT, SKIP_BIT};

/// Width and phase error (ticks) below which a history entry counts as an
/// inlier for a phase guess.
pub const INLIER_TOLERANCE: u32 = 500;

/// Inliers required across the history before a phase guess is accepted.
pub const MIN_INLIERS: usize = SYNC_HISTORY_LEN - 1;

/// A successful phase search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseLock {
    /// Slot the latest history entry belongs to.
    pub slot: usize,
    /// Tick value of the period start implied by that slot.
    pub anchor: u32,
    /// Timing regime the history is consistent with.
    pub regime: Regime,
}

/// Search the sync history for a period phase consistent with it.
///
/// `regime_hint` pins the regime when a sibling object is already locked,
/// skipping the rediscovery of something the process already knows.
pub fn discover_phase(history: &SyncHistory, regime_hint: Option<Regime>) -> Option<PhaseLock> {
    let latest = *history.latest()?;
    // The data bit is unknowable from one pulse; mask it out and let the
    // history vote between the two remaining physical configurations.
    let approx = find_acode(latest.longest_length)? & (SKIP_BIT | AXIS_BIT);

    for (slot, params) in SCHEDULE.iter().enumerate() {
        if params.is_sweep || params.code.bits() != approx {
            continue;
        }
        let anchor = latest.first_timestamp.wrapping_sub(slot_start(slot));
        // Second-half slots only exist on the full schedule.
        let regimes: &[Regime] = if slot >= HALF_SLOT_COUNT {
            &[Regime::Full]
        } else {
            &[Regime::Full, Regime::Single60Hz]
        };
        for &regime in regimes {
            if regime_hint.is_some_and(|hint| hint != regime) {
                continue;
            }
            let inliers = count_inliers(history, anchor, regime);
            trace!(slot, anchor, ?regime, inliers, "phase guess evaluated");
            if inliers >= MIN_INLIERS {
                debug!(slot, anchor, ?regime, inliers, "phase search converged");
                return Some(PhaseLock { slot, anchor, regime });
            }
        }
    }
    None
}

fn count_inliers(history: &SyncHistory, anchor: u32, regime: Regime) -> usize {
    let period_ticks = period(regime);
    let mut inliers = 0;
    for entry in history.filled() {
        let offset = apply_mod(entry.first_timestamp, anchor, period_ticks);
        let (slot, offset_error) = find_slot_by_offset(offset);
        let params = &SCHEDULE[slot];
        if params.is_sweep {
            continue;
        }
        // A lone lighthouse never fires the B slots; entries landing there
        // are absent evidence, not contradicting evidence.
        if regime == Regime::Single60Hz && params.lighthouse == Lighthouse::B {
            continue;
        }
        if acode_error(params.code.bits(), entry.longest_length) <= INLIER_TOLERANCE
            && offset_error <= INLIER_TOLERANCE
        {
            inliers += 1;
        }
    }
    inliers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pulse::SyncPulse;
    use crate::schedule::{acode_timing, FULL_PERIOD, HALF_PERIOD};

    /// Push one coalesced sync per sync slot, walking the schedule from
    /// `anchor` until `count` pulses have been stored.
    fn fill_full_schedule(history: &mut SyncHistory, anchor: u32, count: usize) {
        let mut pushed = 0;
        let mut period_base = anchor;
        'outer: loop {
            for (slot, params) in SCHEDULE.iter().enumerate() {
                if params.is_sweep {
                    continue;
                }
                history.push(SyncPulse {
                    first_timestamp: period_base.wrapping_add(slot_start(slot)),
                    longest_length: acode_timing(params.code.bits()),
                    count: 5,
                });
                pushed += 1;
                if pushed == count {
                    break 'outer;
                }
            }
            period_base = period_base.wrapping_add(FULL_PERIOD);
        }
    }

    /// Single-lighthouse stream: only the A slots of the first half fire,
    /// every 800 k ticks.
    fn fill_60hz_schedule(history: &mut SyncHistory, anchor: u32, count: usize) {
        let mut pushed = 0;
        let mut period_base = anchor;
        'outer: loop {
            for slot in [1usize, 4] {
                history.push(SyncPulse {
                    first_timestamp: period_base.wrapping_add(slot_start(slot)),
                    longest_length: acode_timing(SCHEDULE[slot].code.bits()),
                    count: 5,
                });
                pushed += 1;
                if pushed == count {
                    break 'outer;
                }
            }
            period_base = period_base.wrapping_add(HALF_PERIOD);
        }
    }

    #[test]
    fn perfect_full_history_converges() {
        let mut history = SyncHistory::default();
        let anchor = 2_000_000;
        fill_full_schedule(&mut history, anchor, SYNC_HISTORY_LEN);

        let lock = discover_phase(&history, None).expect("no phase found");
        assert_eq!(lock.regime, Regime::Full);
        assert!(!SCHEDULE[lock.slot].is_sweep);
        // The anchor must agree with the true period start modulo the period.
        assert_eq!(apply_mod(lock.anchor, anchor, FULL_PERIOD), 0);
    }

    #[test]
    fn single_lighthouse_history_selects_60hz() {
        let mut history = SyncHistory::default();
        let anchor = 500_000;
        fill_60hz_schedule(&mut history, anchor, SYNC_HISTORY_LEN);

        let lock = discover_phase(&history, None).expect("no phase found");
        assert_eq!(lock.regime, Regime::Single60Hz);
        assert_eq!(apply_mod(lock.anchor, anchor, HALF_PERIOD), 0);
    }

    #[test]
    fn regime_hint_excludes_the_other_regime() {
        let mut history = SyncHistory::default();
        fill_60hz_schedule(&mut history, 500_000, SYNC_HISTORY_LEN);

        assert!(discover_phase(&history, Some(Regime::Full)).is_none());
        assert!(discover_phase(&history, Some(Regime::Single60Hz)).is_some());
    }

    #[test]
    fn short_history_is_inconclusive() {
        let mut history = SyncHistory::default();
        fill_full_schedule(&mut history, 2_000_000, MIN_INLIERS - 1);
        assert!(discover_phase(&history, None).is_none());
    }

    #[test]
    fn corrupted_history_is_rejected() {
        let mut history = SyncHistory::default();
        fill_full_schedule(&mut history, 2_000_000, SYNC_HISTORY_LEN - 2);
        // Two pulses that fit no slot timing.
        for i in 0..2u32 {
            history.push(SyncPulse {
                first_timestamp: 2_000_000 + 7_777 + i * 31_000,
                longest_length: 6_400,
                count: 1,
            });
        }
        assert!(discover_phase(&history, None).is_none());
    }
}
