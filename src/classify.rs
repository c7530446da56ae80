//! Pulse classification.
//!
//! Base stations encode a 3-bit "acode" into the length of each sync flash:
//! bit 2 is the skip flag, bit 1 the OOTX data bit, bit 0 the axis about to
//! sweep. Sweep pulses are much shorter (or, very close to a station, much
//! longer) than any sync, so a single length band separates the two.

/// Skip flag: this station is not about to sweep.
pub const SKIP_BIT: i32 = 0b100;
/// OOTX data bit, modulated per cycle. Unknown until a burst is measured.
pub const DATA_BIT: i32 = 0b010;
/// Axis of the upcoming sweep, 0 = X, 1 = Y.
pub const AXIS_BIT: i32 = 0b001;

/// Pulses inside this band (ticks, inclusive) are sync flashes.
pub const SYNC_LOWER: u16 = 2250;
pub const SYNC_UPPER: u16 = 6750;

// Observed sync lengths sit ~50 ticks above their nominal bucket.
const BUCKET_OFFSET: u32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Sync,
    Sweep,
}

/// Length-only classification; anything outside the sync band is a sweep.
pub fn classify(length: u16) -> Classification {
    if length < SYNC_LOWER || length > SYNC_UPPER {
        Classification::Sweep
    } else {
        Classification::Sync
    }
}

/// Nominal sync pulse length in ticks for an acode.
pub fn expected_length(acode: i32) -> i32 {
    3000 + (acode & 1) * 500 + ((acode >> 1) & 1) * 1000 + ((acode >> 2) & 1) * 2000 - 250
}

/// Bucket a sync pulse length into its acode, or -1 outside the coding range.
pub fn find_acode(length: u32) -> i32 {
    if length < 2500 + BUCKET_OFFSET {
        return -1;
    }
    for acode in 0..8u32 {
        if length < 3000 + acode * 500 + BUCKET_OFFSET {
            return acode as i32;
        }
    }
    -1
}

/// Distance in ticks between a pulse length and the nearer of the two lengths
/// the target acode can legally produce. The data bit flips per cycle and is
/// not known while verifying a phase, so both variants are tried.
pub fn length_error(target_acode: i32, length: u32) -> u32 {
    let clear = (expected_length(target_acode) - length as i32).unsigned_abs();
    let set = (expected_length(target_acode | DATA_BIT) - length as i32).unsigned_abs();
    clear.min(set)
}
