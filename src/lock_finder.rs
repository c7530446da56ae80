//! Lock acquisition: find where in the cycle we are from recent syncs alone.
//!
//! Each candidate is a (phase, mode) pair. Anchoring the most recent burst at
//! a candidate sync phase fixes the cycle start; the candidate survives only
//! if every burst in the history ring then lands on a sync slot whose acode
//! matches its length. Requiring a full ring of inliers keeps reflections and
//! partial cycles from producing a false lock.

use log::debug;

use crate::classify::{find_acode, length_error};
use crate::history::{SyncHistory, SYNC_HISTORY_LEN};
use crate::schedule::{
    apply_mod_offset, cycle_ticks, find_by_offset, phase, phase_start, NUM_PHASES,
    SECOND_HALF_START,
};

/// Longest tolerated acode length error for an inlier, in ticks.
const INLIER_LENGTH_ERROR: u32 = 500;
/// Longest tolerated distance from the slot start for an inlier, in ticks.
const INLIER_OFFSET_ERROR: u32 = 500;

/// A successful lock candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lock {
    /// Phase the most recent sync burst belongs to.
    pub phase: usize,
    /// Tick at which the cycle containing that burst started.
    pub mod_offset: u32,
    pub single_60hz: bool,
}

/// Search the history ring for a consistent cycle anchor.
///
/// `peer_mode` pins the cycle mode when another tracked object already holds
/// a lock; a single context never mixes 60 Hz and full-cycle interpretations.
pub fn find_lock(history: &SyncHistory, peer_mode: Option<bool>) -> Option<Lock> {
    let recent = history.most_recent()?;
    // The data bit changes per cycle, so only the skip and axis bits of the
    // most recent burst constrain the candidate phases.
    let acode_hint = find_acode(recent.length) & 0b101;

    for guess in 0..NUM_PHASES {
        let params = phase(guess);
        if params.is_sweep || params.acode & 0b101 != acode_hint {
            continue;
        }
        let guess_mod = recent.timestamp.wrapping_sub(phase_start(guess));

        // Second-half phases cannot occur in the halved 60 Hz cycle.
        let modes: &[bool] = if guess >= SECOND_HALF_START { &[false] } else { &[false, true] };
        for &test_60hz in modes {
            if let Some(peer) = peer_mode {
                if test_60hz != peer {
                    continue;
                }
            }
            let inliers = count_inliers(history, guess_mod, test_60hz);
            debug!(
                "[lock] candidate phase {} mod {} 60hz={}: {} inliers",
                guess, guess_mod, test_60hz, inliers
            );
            if inliers > SYNC_HISTORY_LEN - 1 {
                return Some(Lock { phase: guess, mod_offset: guess_mod, single_60hz: test_60hz });
            }
        }
    }
    None
}

fn count_inliers(history: &SyncHistory, guess_mod: u32, test_60hz: bool) -> usize {
    let cycle = cycle_ticks(test_60hz);
    history
        .iter()
        .filter(|pulse| {
            let offset = apply_mod_offset(pulse.timestamp, guess_mod, cycle);
            let (slot, offset_error) = find_by_offset(offset);
            let params = phase(slot);
            if params.is_sweep {
                return false;
            }
            // A lone 60 Hz station only fills the lh-0 slots.
            if params.lh != 0 && test_60hz {
                return false;
            }
            length_error(params.acode, pulse.length) < INLIER_LENGTH_ERROR
                && offset_error < INLIER_OFFSET_ERROR
        })
        .count()
}
