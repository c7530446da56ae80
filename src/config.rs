use serde::{Deserialize, Serialize};

/// Host-tunable parameters. Everything else about the decode (the schedule,
/// the classification bands, the confidence arithmetic) is fixed by the base
/// station protocol and lives as constants next to the code that uses it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisambiguatorConfig {
    /// Tick rate of the capture timestamp counter.
    pub timebase_hz: u32,

    /// Events discarded per object at startup while the capture stream
    /// stabilises.
    pub warmup_events: u32,

    /// Records are only emitted while confidence exceeds this.
    pub emit_confidence: i32,

    /// Confidence charged per full second of stream silence. With the
    /// historical value of 10, one silent second is survivable only for a
    /// well-established lock; raise it to drop out faster.
    pub silence_penalty_per_sec: i32,
}

impl Default for DisambiguatorConfig {
    fn default() -> Self {
        DisambiguatorConfig {
            timebase_hz: 48_000_000,
            warmup_events: 200,
            emit_confidence: 80,
            silence_penalty_per_sec: 10,
        }
    }
}
