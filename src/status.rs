use serde::{Deserialize, Serialize};

/// Decode status shared with the host application.
///
/// Snapshots are cheap to build and serialise, so hosts can poll lock health
/// (or ship it over IPC) without reaching into the tracking state.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct DisambiguatorStatus {
    /// True once a lock established 60 Hz single-station mode. Cleared only
    /// when every object has lost its lock.
    pub single_60hz_mode: bool,

    /// Per-tracked-object detail, ordered by object id.
    pub objects: Vec<ObjectStatus>,

    /// Unix timestamp of the last update.
    pub updated_ts: u64,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ObjectStatus {
    pub object: u32,

    /// Current schedule phase, or -1 while searching for a lock.
    pub phase: i32,

    pub locked: bool,
    pub confidence: i32,

    /// Cycle anchors, one per base station.
    pub mod_offset: [u32; 2],

    /// Re-anchors that moved by more than the drift tolerance.
    pub drift_warnings: u32,

    /// Lock attempts since the last lock (or the last failure log).
    pub failures: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_default() {
        let status = DisambiguatorStatus::default();
        assert!(!status.single_60hz_mode);
        assert!(status.objects.is_empty());
        assert_eq!(status.updated_ts, 0);
    }

    #[test]
    fn test_status_serde_roundtrip() {
        let status = DisambiguatorStatus {
            single_60hz_mode: true,
            objects: vec![ObjectStatus {
                object: 2,
                phase: 7,
                locked: true,
                confidence: 93,
                mod_offset: [123_456, 123_470],
                drift_warnings: 1,
                failures: 0,
            }],
            updated_ts: 1_700_000_000,
        };

        let json = serde_json::to_string(&status).expect("serialize failed");
        let restored: DisambiguatorStatus = serde_json::from_str(&json).expect("deserialize failed");

        assert!(restored.single_60hz_mode);
        assert_eq!(restored.objects.len(), 1);
        assert_eq!(restored.objects[0].phase, 7);
        assert_eq!(restored.objects[0].mod_offset, [123_456, 123_470]);
    }
}
