//! Per-object 12-phase state tracker.
//!
//! Once a lock is found the tracker follows the schedule by pure timestamp
//! arithmetic: every event maps to a phase through the per-station anchors,
//! sync slots accumulate bursts, sweep slots keep the longest pulse per
//! sensor, and leaving a phase flushes whatever it gathered downstream. A
//! hit/miss confidence tally decides when the lock is no longer trustworthy.

use log::{debug, info, warn};

use crate::classify::{self, Classification, DATA_BIT};
use crate::config::DisambiguatorConfig;
use crate::event::{timecode_difference, LightcapEvent, LightRecord};
use crate::history::{SyncAccumulator, SyncHistory};
use crate::lock_finder::{self, Lock};
use crate::schedule::{self, NUM_PHASES, PULSE_WINDOW, SECOND_HALF_START};
use crate::traits::LightSink;

pub const NUM_BASE_STATIONS: usize = 2;

// Sync slots ignore pulses under this length outright; dropping them has a
// measurable effect on decode quality.
const NOISE_FLOOR_TICKS: u16 = 400;
// A sync pulse further than this from both acode variants counts as a miss.
const LENGTH_ERROR_MAX: u32 = 1250;
// Confidence lost per miss; lock is abandoned once confidence falls under it.
const MISS_PENALTY: i32 = 3;
const CONFIDENCE_CAP: i32 = 100;
// Sweep pulses above this are noise, hard stop.
const SWEEP_MAX_TICKS: u16 = 7000;
// Sweep pulses above this are suspect and charged against confidence.
const SWEEP_SUSPECT_TICKS: u16 = 3000;
// Re-anchor movement beyond this many ticks is reported as drift.
const DRIFT_WARN_TICKS: i32 = 100;
// Sweep-exit length filter: fixed floor and multiple of the burst average.
const SWEEP_EXIT_MIN_TICKS: u64 = 10;
const SWEEP_EXIT_AVG_FACTOR: u64 = 3;
// Unlocked objects log every this many fruitless lock attempts.
const LOCK_FAILURE_WARN: u32 = 1000;

/// Global effects of one tracked event, applied by the dispatcher.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TrackOutcome {
    /// A lock was just acquired, carrying the chosen cycle mode.
    pub locked: Option<bool>,
    pub lost_lock: bool,
}

pub struct ObjectTracker {
    object: u32,
    sensor_count: usize,

    /// Current schedule phase; `None` while searching for a lock.
    state: Option<usize>,
    /// Cycle-start anchors, one per base station so their independent clock
    /// drift never fights.
    mod_offset: [u32; NUM_BASE_STATIONS],
    confidence: i32,
    last_timestamp: u32,

    warmup: u32,
    failures: u32,
    drift_warnings: u32,
    last_was_sync: bool,

    sync: SyncAccumulator,
    history: SyncHistory,
    /// Longest pulse seen per sensor during the current sweep phase.
    sweep: Vec<Option<LightcapEvent>>,
}

impl ObjectTracker {
    pub fn new(object: u32, sensor_count: usize) -> Self {
        ObjectTracker {
            object,
            sensor_count,
            state: None,
            mod_offset: [0; NUM_BASE_STATIONS],
            confidence: 0,
            last_timestamp: 0,
            warmup: 0,
            failures: 0,
            drift_warnings: 0,
            last_was_sync: false,
            sync: SyncAccumulator::default(),
            history: SyncHistory::new(),
            sweep: vec![None; sensor_count],
        }
    }

    pub fn sensor_count(&self) -> usize {
        self.sensor_count
    }

    pub fn state(&self) -> Option<usize> {
        self.state
    }

    pub fn confidence(&self) -> i32 {
        self.confidence
    }

    pub fn mod_offsets(&self) -> [u32; NUM_BASE_STATIONS] {
        self.mod_offset
    }

    pub fn drift_warnings(&self) -> u32 {
        self.drift_warnings
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Count one event against the warm-up budget; the first few hundred
    /// events of a capture stream are unreliable while the reader settles.
    pub fn warming_up(&mut self, warmup_events: u32) -> bool {
        if self.warmup < warmup_events {
            self.warmup += 1;
            return true;
        }
        false
    }

    /// Process one event past warm-up. `single_60hz` is the context-wide
    /// cycle mode, `peer_mode` its pinned value if any other object is
    /// already locked.
    pub fn advance<S: LightSink>(
        &mut self,
        le: &LightcapEvent,
        single_60hz: bool,
        peer_mode: Option<bool>,
        config: &DisambiguatorConfig,
        sink: &mut S,
    ) -> TrackOutcome {
        let mut out = TrackOutcome::default();

        match self.state {
            None => {
                if let Some(lock) = self.attempt_find_state(le, peer_mode) {
                    self.confidence = 0;
                    self.failures = 0;
                    self.mod_offset = [lock.mod_offset; NUM_BASE_STATIONS];
                    self.enter_phase(lock.phase);
                    out.locked = Some(lock.single_60hz);
                    info!(
                        "[lock] object {} locked onto phase {} at {} (anchor {})",
                        self.object, lock.phase, le.timestamp, lock.mod_offset
                    );
                } else {
                    self.failures += 1;
                    if self.failures > LOCK_FAILURE_WARN {
                        self.failures = 0;
                        warn!(
                            "[lock] object {} still searching after {} events",
                            self.object, LOCK_FAILURE_WARN
                        );
                    }
                }
            }
            Some(state) => {
                let timediff = timecode_difference(le.timestamp, self.last_timestamp);
                if timediff > config.timebase_hz {
                    let penalty =
                        (timediff / config.timebase_hz) as i32 * config.silence_penalty_per_sec;
                    if self.confidence < penalty {
                        self.lose_lock(&mut out);
                        warn!(
                            "[lock] object {} lost lock at {} after {} ticks of silence",
                            self.object, le.timestamp, timediff
                        );
                        return out;
                    }
                    self.confidence -= penalty;
                }
                self.propagate(state, le, single_60hz, config, sink, &mut out);
            }
        }

        self.last_timestamp = le.timestamp;
        out
    }

    // ------------------------------------------------------------------
    // Lock acquisition
    // ------------------------------------------------------------------

    /// Feed one event into the burst/history machinery and ask the lock
    /// finder whenever a sync burst completes.
    fn attempt_find_state(&mut self, le: &LightcapEvent, peer_mode: Option<bool>) -> Option<Lock> {
        match classify::classify(le.length) {
            Classification::Sync => {
                let burst = self.sync.burst();
                let same_flash =
                    self.last_was_sync && burst.map_or(false, |b| b.overlaps(le));
                if !same_flash {
                    // A new flash starts; the finished one may complete the
                    // picture.
                    if self.last_was_sync {
                        if let Some(lock) = self.end_sync_burst(peer_mode) {
                            return Some(lock);
                        }
                    }
                    self.sync.reset();
                }
                self.sync.register(le);
                self.last_was_sync = true;
            }
            Classification::Sweep => {
                if self.last_was_sync {
                    if let Some(lock) = self.end_sync_burst(peer_mode) {
                        return Some(lock);
                    }
                }
                self.last_was_sync = false;
            }
        }
        None
    }

    fn end_sync_burst(&mut self, peer_mode: Option<bool>) -> Option<Lock> {
        if let Some(burst) = self.sync.burst() {
            self.history.push(burst);
        }
        lock_finder::find_lock(&self.history, peer_mode)
    }

    // ------------------------------------------------------------------
    // Locked tracking
    // ------------------------------------------------------------------

    fn propagate<S: LightSink>(
        &mut self,
        state: usize,
        le: &LightcapEvent,
        single_60hz: bool,
        config: &DisambiguatorConfig,
        sink: &mut S,
        out: &mut TrackOutcome,
    ) {
        if le.sensor_id as usize >= self.sensor_count {
            warn!("[track] object {} hit on invalid sensor {}", self.object, le.sensor_id);
            return;
        }

        let cycle = schedule::cycle_ticks(single_60hz);
        let lh = schedule::phase(state).lh as usize;
        // The pulse midpoint keeps sweeps that straddle a boundary in the
        // phase where most of the light landed.
        let midpoint = le.timestamp.wrapping_add(le.length as u32 / 2);
        let le_offset = schedule::apply_mod_offset(midpoint, self.mod_offset[lh], cycle);
        let (new_state, _offset_error) = schedule::find_by_offset(le_offset);

        let current = if new_state != state {
            if state + 1 != new_state && !(state == NUM_PHASES - 1 && new_state == 0) {
                debug!("[track] object {} skipped phases {} -> {}", self.object, state, new_state);
            }
            self.leave_phase(state, new_state, single_60hz, config, sink)
        } else {
            state
        };

        let params = schedule::phase(current);
        if !params.is_sweep {
            if self.run_acode_capture(params.acode, le) {
                out.lost_lock = true;
            }
        } else {
            self.capture_sweep(le);
        }
    }

    /// Verify a pulse against the acode the current phase expects.
    ///
    /// Reflections and noise do land in sync slots; a hit/miss tally decides
    /// whether the lock is still believable. Returns true when the lock was
    /// abandoned.
    fn run_acode_capture(&mut self, target_acode: i32, le: &LightcapEvent) -> bool {
        if le.length < NOISE_FLOOR_TICKS {
            return false;
        }

        let error = classify::length_error(target_acode, le.length as u32);
        if error > LENGTH_ERROR_MAX {
            let mut lost = false;
            if self.confidence < MISS_PENALTY {
                self.set_unknown();
                warn!(
                    "[lock] object {} lost lock at {}; pulse of {} ticks does not fit acode {}",
                    self.object, le.timestamp, le.length, target_acode
                );
                lost = true;
            }
            self.confidence -= MISS_PENALTY;
            debug!(
                "[track] object {} sync miss: error {} confidence {}",
                self.object, error, self.confidence
            );
            return lost;
        }

        if self.confidence < 50 {
            debug!(
                "[track] object {} sync hit: error {} confidence {}",
                self.object, error, self.confidence
            );
        }
        if self.confidence < CONFIDENCE_CAP {
            self.confidence += 1;
        }
        self.sync.register(le);
        false
    }

    /// Keep only the longest plausible pulse per sensor for this sweep.
    fn capture_sweep(&mut self, le: &LightcapEvent) {
        let slot = &mut self.sweep[le.sensor_id as usize];
        let current = slot.map_or(0, |s| s.length);
        if le.length > current && le.length < SWEEP_MAX_TICKS {
            if le.length > SWEEP_SUSPECT_TICKS {
                self.confidence -= 1;
            }
            *slot = Some(*le);
        }
    }

    /// Flush the phase being left and enter the next one. Returns the phase
    /// actually entered (the one-past-the-end marker wraps to phase 0).
    fn leave_phase<S: LightSink>(
        &mut self,
        state: usize,
        new_state: usize,
        single_60hz: bool,
        config: &DisambiguatorConfig,
        sink: &mut S,
    ) -> usize {
        let cycle = schedule::cycle_ticks(single_60hz);
        let params = schedule::phase(state);

        if !params.is_sweep {
            if let Some(burst) = self.sync.burst() {
                self.history.push(burst);
                debug!(
                    "[track] object {} phase {} burst: {} pulses, longest {}, avg {}",
                    self.object,
                    state,
                    burst.count,
                    burst.length,
                    self.sync.average_length()
                );

                // Re-anchor on the observed burst; this absorbs slow drift in
                // the station timing.
                let lh = params.lh as usize;
                let new_offset = burst.timestamp.wrapping_sub(schedule::phase_start(state));
                let delta = anchor_delta(new_offset, self.mod_offset[lh], cycle);
                if delta.abs() > DRIFT_WARN_TICKS {
                    self.drift_warnings += 1;
                    warn!(
                        "[track] object {} timecode drift of {} ticks on station {}",
                        self.object, delta, lh
                    );
                }
                self.mod_offset[lh] = new_offset;

                // The burst length tells us whether the data bit was set this
                // cycle; downstream OOTX decoding needs it.
                let mut acode = params.acode;
                let with_data = classify::expected_length(acode | DATA_BIT);
                let without = classify::expected_length(acode);
                if (with_data - burst.length as i32).abs() < (without - burst.length as i32).abs() {
                    acode |= DATA_BIT;
                }

                let mut next_state = state + 1;
                if next_state == NUM_PHASES || (single_60hz && next_state == SECOND_HALF_START) {
                    next_state = 0;
                }
                let sensor_id = if schedule::phase(next_state).is_sweep { -1 } else { -2 };

                if self.confidence > config.emit_confidence {
                    sink.record(
                        self.object,
                        LightRecord {
                            sensor_id,
                            acode,
                            offset_in_phase: 0,
                            timestamp: burst.timestamp,
                            length: burst.length,
                            lh: params.lh,
                        },
                    );
                }
            }
        } else {
            self.flush_sweep(state, params.lh, cycle, config, sink);
        }

        self.enter_phase(new_state)
    }

    fn flush_sweep<S: LightSink>(
        &mut self,
        state: usize,
        lh: u8,
        cycle: u32,
        config: &DisambiguatorConfig,
        sink: &mut S,
    ) {
        let mut sum: u64 = 0;
        let mut count: u64 = 0;
        for sample in self.sweep.iter().flatten() {
            sum += sample.length as u64;
            count += 1;
        }
        if count == 0 {
            return;
        }

        // Anything far off the burst average is a reflection; the band scales
        // with how much light this sweep actually produced.
        let max_len = SWEEP_EXIT_AVG_FACTOR * div_round_closest(sum, count);

        for (sensor, sample) in self.sweep.iter().enumerate() {
            let sample = match sample {
                Some(s) => s,
                None => continue,
            };
            let len = sample.length as u64;
            if len < SWEEP_EXIT_MIN_TICKS || len > max_len {
                continue;
            }

            let midpoint = sample.timestamp.wrapping_add(sample.length as u32 / 2);
            let le_offset =
                schedule::apply_mod_offset(midpoint, self.mod_offset[lh as usize], cycle);
            let offset_in_phase =
                le_offset as i64 - schedule::phase_start(state) as i64 + PULSE_WINDOW as i64;
            debug_assert!(
                offset_in_phase > 0,
                "sweep sample before its phase: {} in phase {}",
                le_offset,
                state
            );

            if self.confidence > config.emit_confidence {
                sink.record(
                    self.object,
                    LightRecord {
                        sensor_id: sensor as i32,
                        acode: schedule::phase(state).acode,
                        offset_in_phase: offset_in_phase as i32,
                        timestamp: sample.timestamp,
                        length: sample.length as u32,
                        lh,
                    },
                );
            }
        }
    }

    // ------------------------------------------------------------------
    // State bookkeeping
    // ------------------------------------------------------------------

    fn enter_phase(&mut self, state: usize) -> usize {
        let state = if state >= NUM_PHASES { 0 } else { state };
        self.state = Some(state);
        self.clear_phase_buffers();
        state
    }

    fn set_unknown(&mut self) {
        self.state = None;
        self.history.clear();
        self.clear_phase_buffers();
    }

    fn lose_lock(&mut self, out: &mut TrackOutcome) {
        self.set_unknown();
        out.lost_lock = true;
    }

    fn clear_phase_buffers(&mut self) {
        self.sync.reset();
        self.sweep.fill(None);
    }
}

/// Signed movement of a cycle anchor, reduced to the nearest equivalent
/// within half a cycle. Wrapping subtraction keeps this exact across 32-bit
/// counter rollover.
fn anchor_delta(new_offset: u32, old_offset: u32, cycle: u32) -> i32 {
    let raw = new_offset.wrapping_sub(old_offset) as i32;
    let cycle = cycle as i32;
    let mut delta = raw % cycle;
    if delta > cycle / 2 {
        delta -= cycle;
    } else if delta < -cycle / 2 {
        delta += cycle;
    }
    delta
}

fn div_round_closest(n: u64, d: u64) -> u64 {
    (n + d / 2) / d
}
