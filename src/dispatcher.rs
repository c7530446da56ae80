//! Per-context entry point.
//!
//! A context owns one tracker per tracked object plus the single piece of
//! state the objects share: whether the installation runs one base station in
//! 60 Hz mode. The first object to lock decides that flag; everyone else is
//! then constrained to the same interpretation until all locks are lost.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, info};

use crate::config::DisambiguatorConfig;
use crate::event::LightcapEvent;
use crate::status::{DisambiguatorStatus, ObjectStatus};
use crate::tracker::ObjectTracker;
use crate::traits::LightSink;

pub struct Disambiguator<S: LightSink> {
    sink: S,
    config: DisambiguatorConfig,
    single_60hz_mode: bool,
    objects: HashMap<u32, ObjectTracker>,
    status_shared: Arc<RwLock<DisambiguatorStatus>>,
}

impl<S: LightSink> Disambiguator<S> {
    pub fn new(
        sink: S,
        status_shared: Arc<RwLock<DisambiguatorStatus>>,
        config: DisambiguatorConfig,
    ) -> Self {
        info!(
            "[lightcap] disambiguator ready: timebase {} Hz, warm-up {} events, emit gate {}",
            config.timebase_hz, config.warmup_events, config.emit_confidence
        );
        Disambiguator {
            sink,
            config,
            single_60hz_mode: false,
            objects: HashMap::new(),
            status_shared,
        }
    }

    pub fn status_shared(&self) -> Arc<RwLock<DisambiguatorStatus>> {
        self.status_shared.clone()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn single_60hz_mode(&self) -> bool {
        self.single_60hz_mode
    }

    /// Declare how many sensors a tracked object carries. Events for objects
    /// without a sensor count are discarded (hardware config not loaded yet).
    /// Re-declaring with a different count resets that object's tracking.
    pub fn set_sensor_count(&mut self, object: u32, sensor_count: usize) {
        if sensor_count == 0 {
            self.objects.remove(&object);
            return;
        }
        let stale = self
            .objects
            .get(&object)
            .map_or(true, |t| t.sensor_count() != sensor_count);
        if stale {
            debug!("[lightcap] object {} configured with {} sensors", object, sensor_count);
            self.objects.insert(object, ObjectTracker::new(object, sensor_count));
        }
    }

    /// Feed one capture event for a tracked object.
    pub fn push_event(&mut self, object: u32, le: LightcapEvent) {
        // A locked peer pins the cycle mode for everyone still searching.
        let peer_mode = if self.any_locked() { Some(self.single_60hz_mode) } else { None };
        let single_60hz = self.single_60hz_mode;

        let tracker = match self.objects.get_mut(&object) {
            Some(t) => t,
            None => return,
        };
        if tracker.warming_up(self.config.warmup_events) {
            return;
        }

        let out = tracker.advance(&le, single_60hz, peer_mode, &self.config, &mut self.sink);

        if let Some(mode) = out.locked {
            self.single_60hz_mode = mode;
            if mode {
                info!("[lightcap] running in 60 Hz single-station mode");
            }
            self.update_status();
        }
        if out.lost_lock {
            if !self.any_locked() {
                if self.single_60hz_mode {
                    info!("[lightcap] all locks lost, clearing 60 Hz mode flag");
                }
                self.single_60hz_mode = false;
            }
            self.update_status();
        }
    }

    /// Drop all tracking state and the cycle-mode flag.
    pub fn reset(&mut self) {
        info!("[lightcap] full reset");
        let configured: Vec<(u32, usize)> =
            self.objects.iter().map(|(&id, t)| (id, t.sensor_count())).collect();
        self.objects.clear();
        for (id, count) in configured {
            self.objects.insert(id, ObjectTracker::new(id, count));
        }
        self.single_60hz_mode = false;
        self.update_status();
    }

    /// Build a fresh status snapshot.
    pub fn snapshot(&self) -> DisambiguatorStatus {
        let mut objects: Vec<ObjectStatus> = self
            .objects
            .iter()
            .map(|(&id, t)| ObjectStatus {
                object: id,
                phase: t.state().map_or(-1, |s| s as i32),
                locked: t.state().is_some(),
                confidence: t.confidence(),
                mod_offset: t.mod_offsets(),
                drift_warnings: t.drift_warnings(),
                failures: t.failures(),
            })
            .collect();
        objects.sort_by_key(|o| o.object);

        DisambiguatorStatus {
            single_60hz_mode: self.single_60hz_mode,
            objects,
            updated_ts: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
        }
    }

    /// Publish the current snapshot to the shared status handle.
    pub fn update_status(&self) {
        let snapshot = self.snapshot();
        if let Ok(mut status) = self.status_shared.write() {
            *status = snapshot;
        }
    }

    fn any_locked(&self) -> bool {
        self.objects
            .values()
            .any(|t| t.state().is_some() && t.confidence() > 0)
    }
}
