//! The fixed per-cycle schedule the base stations follow.
//!
//! One 1 600 000-tick cycle contains twelve slots:
//!
//! ```text
//!     Ticks  Slot
//!         0  sync  B acode 4
//!    20 000  sync  A acode 0
//!    40 000  sweep A X
//!   400 000  sync  B acode 5
//!   420 000  sync  A acode 1
//!   440 000  sweep A Y
//!   800 000  sync  B acode 0
//!   820 000  sync  A acode 4
//!   840 000  sweep B X
//! 1 200 000  sync  B acode 1
//! 1 220 000  sync  A acode 5
//! 1 240 000  sweep B Y
//! 1 600 000  repeat
//! ```
//!
//! A single station running at 60 Hz repeats the first half of the table, so
//! the effective cycle halves to 800 000 ticks. Tracking works by anchoring
//! this table to the tick counter with a per-station modular offset and
//! mapping every event timestamp to the nearest slot.

/// Width of a sync slot in ticks.
pub const PULSE_WINDOW: u32 = 20_000;
/// Width of a sweep slot in ticks.
pub const CAPTURE_WINDOW: u32 = 360_000;

pub const NUM_PHASES: usize = 12;
/// First phase of the second half of the table; where the 60 Hz cycle wraps.
pub const SECOND_HALF_START: usize = 6;

/// Full dual-station cycle length in ticks.
pub const CYCLE_TICKS: u32 = 1_600_000;
/// Cycle length in 60 Hz single-station mode.
pub const CYCLE_TICKS_60HZ: u32 = 800_000;

/// One slot of the schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Phase {
    /// Expected acode of the sync flash (data bit always clear in the table).
    pub acode: i32,
    /// Base station this slot belongs to.
    pub lh: u8,
    /// Axis about to sweep, 0 = X, 1 = Y.
    pub axis: u8,
    /// Slot duration in ticks.
    pub window: u32,
    pub is_sweep: bool,
}

const fn sync(acode: i32, lh: u8, axis: u8) -> Phase {
    Phase { acode, lh, axis, window: PULSE_WINDOW, is_sweep: false }
}

const fn sweep(acode: i32, lh: u8, axis: u8) -> Phase {
    Phase { acode, lh, axis, window: CAPTURE_WINDOW, is_sweep: true }
}

pub static SCHEDULE: [Phase; NUM_PHASES] = [
    sync(4, 1, 0),
    sync(0, 0, 0),
    sweep(4, 0, 0),
    sync(5, 1, 1),
    sync(1, 0, 1),
    sweep(1, 0, 1),
    sync(0, 1, 0),
    sync(4, 0, 0),
    sweep(4, 1, 0),
    sync(1, 1, 1),
    sync(5, 0, 1),
    sweep(5, 1, 1),
];

// Stand-in returned for the one-past-the-end slot `find_by_offset` can yield
// for events within snapping distance of the cycle boundary.
static END_MARKER: Phase = Phase { acode: 0, lh: 0, axis: 0, window: 0, is_sweep: false };

// Cumulative slot starts; every third slot is the wide sweep window. The
// table-coherence test checks this against SCHEDULE.
const STARTS: [u32; NUM_PHASES + 1] = {
    let mut starts = [0u32; NUM_PHASES + 1];
    let mut i = 1;
    while i <= NUM_PHASES {
        let window = if i % 3 == 0 { CAPTURE_WINDOW } else { PULSE_WINDOW };
        starts[i] = starts[i - 1] + window;
        i += 1;
    }
    starts
};

/// Parameters of a phase; indices past the table yield the end marker.
pub fn phase(index: usize) -> &'static Phase {
    if index < NUM_PHASES {
        &SCHEDULE[index]
    } else {
        &END_MARKER
    }
}

/// Tick offset of a phase from the cycle start. `phase_start(NUM_PHASES)` is
/// the cycle length.
pub fn phase_start(index: usize) -> u32 {
    STARTS[index]
}

pub fn cycle_ticks(single_60hz: bool) -> u32 {
    if single_60hz {
        CYCLE_TICKS_60HZ
    } else {
        CYCLE_TICKS
    }
}

/// Map an offset inside the cycle to the nearest phase, returning the phase
/// index and the distance to its start.
///
/// The nearest phase by start distance is usually right, with one exception:
/// events deep inside a sweep window would otherwise snap forward to the next
/// sync slot, so the following phase only wins over a sweep within 1000 ticks
/// of the boundary. The returned index can be `NUM_PHASES` for offsets inside
/// that margin at the very end of the cycle.
pub fn find_by_offset(offset: u32) -> (usize, u32) {
    for i in 1..=NUM_PHASES {
        if STARTS[i] > offset {
            let dist_from_last = offset - STARTS[i - 1];
            let dist_from_this = STARTS[i] - offset;
            let mut this_is_closest = dist_from_last > dist_from_this;
            if SCHEDULE[i - 1].is_sweep && dist_from_this > 1000 {
                this_is_closest = false;
            }
            return if this_is_closest {
                (i, dist_from_this)
            } else {
                (i - 1, dist_from_last)
            };
        }
    }
    unreachable!("offset {} outside cycle", offset)
}

/// Position of `timestamp` inside the cycle anchored at `mod_offset`.
///
/// The anchor is a raw timecode, not reduced modulo the cycle, so three cases
/// arise: the common one where the timestamp is past the anchor, the rollover
/// one where the anchor predates a 32-bit counter wrap (detected by a gap of
/// more than half the counter range, and resolved exactly by wrapping
/// subtraction), and the residual one where the anchor is slightly ahead of
/// the timestamp and both are compared modulo the cycle.
pub fn apply_mod_offset(timestamp: u32, mod_offset: u32, cycle: u32) -> u32 {
    if timestamp > mod_offset {
        return (timestamp - mod_offset) % cycle;
    }

    if mod_offset - timestamp > u32::MAX / 2 {
        return timestamp.wrapping_sub(mod_offset) % cycle;
    }

    let t = (timestamp % cycle) as i64;
    let m = (mod_offset % cycle) as i64;
    (t - m).rem_euclid(cycle as i64) as u32
}
