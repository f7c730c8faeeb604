//! Process-wide state shared by every tracked object's disambiguator.
//!
//! The only cross-object fact is the timing regime: once any object has
//! locked and identified a single-lighthouse 60 Hz installation, sibling
//! objects skip rediscovering it. The flag lives behind a mutex because
//! callers may drive one disambiguator per thread; per-object state needs
//! no such protection.

use std::sync::{Mutex, MutexGuard};

use tracing::info;

use crate::types::Regime;

#[derive(Debug, Default)]
struct RegimeState {
    locked_objects: usize,
    single_60hz: bool,
}

/// Shared context handed (via `Arc`) to every [`Disambiguator`] in the
/// process.
///
/// [`Disambiguator`]: crate::tracker::Disambiguator
#[derive(Debug, Default)]
pub struct DisambiguatorContext {
    state: Mutex<RegimeState>,
}

impl DisambiguatorContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a locked object has identified the single-lighthouse 60 Hz
    /// regime.
    pub fn single_60hz_mode(&self) -> bool {
        self.lock().single_60hz
    }

    /// The timing regime currently in force.
    pub fn regime(&self) -> Regime {
        if self.single_60hz_mode() {
            Regime::Single60Hz
        } else {
            Regime::Full
        }
    }

    /// The regime locked objects have established, if any. Lets a fresh
    /// object restrict its phase search to the regime the process already
    /// knows.
    pub(crate) fn regime_hint(&self) -> Option<Regime> {
        let state = self.lock();
        (state.locked_objects > 0).then(|| {
            if state.single_60hz {
                Regime::Single60Hz
            } else {
                Regime::Full
            }
        })
    }

    pub(crate) fn note_lock(&self, regime: Regime) {
        let mut state = self.lock();
        state.locked_objects += 1;
        let single = regime == Regime::Single60Hz;
        if single && !state.single_60hz {
            info!("single-lighthouse 60 Hz regime detected");
        }
        state.single_60hz = single;
    }

    pub(crate) fn note_unlock(&self) {
        let mut state = self.lock();
        state.locked_objects = state.locked_objects.saturating_sub(1);
        if state.locked_objects == 0 && state.single_60hz {
            info!("last locked object lost; clearing 60 Hz regime flag");
            state.single_60hz = false;
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegimeState> {
        // Nothing here can leave the state inconsistent across a panic.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regime_defaults_to_full() {
        let ctx = DisambiguatorContext::new();
        assert_eq!(ctx.regime(), Regime::Full);
        assert!(!ctx.single_60hz_mode());
        assert_eq!(ctx.regime_hint(), None);
    }

    #[test]
    fn flag_clears_when_the_last_locked_object_leaves() {
        let ctx = DisambiguatorContext::new();
        ctx.note_lock(Regime::Single60Hz);
        ctx.note_lock(Regime::Single60Hz);
        assert!(ctx.single_60hz_mode());
        assert_eq!(ctx.regime_hint(), Some(Regime::Single60Hz));

        ctx.note_unlock();
        assert!(ctx.single_60hz_mode());

        ctx.note_unlock();
        assert!(!ctx.single_60hz_mode());
        assert_eq!(ctx.regime_hint(), None);
    }

    #[test]
    fn full_regime_lock_reports_a_hint_too() {
        let ctx = DisambiguatorContext::new();
        ctx.note_lock(Regime::Full);
        assert_eq!(ctx.regime_hint(), Some(Regime::Full));
        assert!(!ctx.single_60hz_mode());
    }
}
