#![forbid(unsafe_code)]

//! Frame statistics collaborator.
//!
//! Classification results are pushed to an external aggregation service via
//! [`JankStats`]. The engine calls it once per classified surface frame
//! (keyed by owner and layer) and once per classified display frame (the
//! bitwise-OR of everything in the cycle). [`CountingJankStats`] is a
//! simple in-process implementation for tests and embedders that only need
//! tallies.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::jank::JankType;

/// Receiver for per-frame jank classification results.
pub trait JankStats: Send + Sync + std::fmt::Debug {
    /// One surface frame finished classification.
    fn record_surface_jank(&self, owner_uid: u32, layer_name: &str, jank: JankType);

    /// One display frame finished classification; `jank` is the OR of the
    /// display's own causes and every attached surface's.
    fn record_display_jank(&self, jank: JankType);
}

/// Discards everything.
#[derive(Debug, Default)]
pub struct NoopJankStats;

impl JankStats for NoopJankStats {
    fn record_surface_jank(&self, _owner_uid: u32, _layer_name: &str, _jank: JankType) {}
    fn record_display_jank(&self, _jank: JankType) {}
}

/// Aggregate counts kept by [`CountingJankStats`].
#[derive(Debug, Clone, Default)]
pub struct JankStatsSnapshot {
    /// Surface-frame classifications observed (janky or not).
    pub surface_records: u64,
    /// Display-frame classifications observed (janky or not).
    pub display_records: u64,
    /// Surface-frame classifications with a non-empty jank mask.
    pub janky_surface_frames: u64,
    /// Display-frame classifications with a non-empty jank mask.
    pub janky_display_frames: u64,
    /// Per-layer janky surface-frame counts.
    pub janky_by_layer: HashMap<String, u64>,
}

/// Mutex-guarded tally of classification results.
#[derive(Debug, Default)]
pub struct CountingJankStats {
    state: Mutex<JankStatsSnapshot>,
}

impl CountingJankStats {
    /// Create an empty tally.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current tallies.
    #[must_use]
    pub fn snapshot(&self) -> JankStatsSnapshot {
        self.state.lock().unwrap().clone()
    }
}

impl JankStats for CountingJankStats {
    fn record_surface_jank(&self, _owner_uid: u32, layer_name: &str, jank: JankType) {
        let mut state = self.state.lock().unwrap();
        state.surface_records += 1;
        if !jank.is_empty() {
            state.janky_surface_frames += 1;
            *state
                .janky_by_layer
                .entry(layer_name.to_string())
                .or_insert(0) += 1;
        }
    }

    fn record_display_jank(&self, jank: JankType) {
        let mut state = self.state.lock().unwrap();
        state.display_records += 1;
        if !jank.is_empty() {
            state.janky_display_frames += 1;
        }
    }
}
