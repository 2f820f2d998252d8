#![forbid(unsafe_code)]

//! Timeline coordinator.
//!
//! [`FrameTimeline`] owns the in-progress display frame, a bounded history
//! of finalized ones, and the queue of present fences still waiting for a
//! signal. One mutex guards all three as a unit, so the
//! attach/wake-up/resolve/finalize sequence is a single critical section;
//! the prediction registry keeps its own lock so producers issuing tokens
//! never contend with the compositor thread.
//!
//! # Fence resolution
//!
//! Fences are polled, never awaited. Every present submission re-walks the
//! pending queue: signaled entries are classified and exported, invalid
//! ones are discarded unclassified, and still-pending entries stay queued
//! for the next call. The scan deliberately continues past pending entries
//! so an out-of-order signal never blocks resolution of later frames.
//!
//! # Finalization
//!
//! Finalization is unconditional: every present submission pushes the
//! current frame into history and starts a fresh one, whether or not its
//! fence has resolved. A frame can therefore sit in history unclassified
//! until a later resolution pass revisits it through the queue, which holds
//! its own reference.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::display::DisplayFrame;
use crate::fence::{FenceSignal, PresentFence};
use crate::item::{Nanos, PredictionState, TimelineItem};
use crate::jank::{JankThresholds, JankType, PresentMetadata, ReadyMetadata, StartMetadata};
use crate::stats::{JankStats, NoopJankStats};
use crate::surface::{PresentState, SurfaceFrame};
use crate::token::{DEFAULT_TOKEN_RETENTION, FrameToken, PredictionRegistry};
use crate::trace::{NoopTraceSink, TraceSink};

use std::fmt::Write as _;

/// Default bound on retained display frames.
pub const DEFAULT_MAX_HISTORY: usize = 64;

/// Construction-time parameters for [`FrameTimeline`].
#[derive(Debug, Clone)]
pub struct TimelineConfig {
    /// Maximum finalized display frames retained for dump/trace.
    /// Must be non-zero.
    pub max_history: usize,
    /// Jank classification tolerances.
    pub thresholds: JankThresholds,
    /// Retention window for issued prediction tokens.
    pub token_retention: Nanos,
    /// Compositor process id attached to display-frame trace events.
    pub compositor_pid: u32,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            max_history: DEFAULT_MAX_HISTORY,
            thresholds: JankThresholds::default(),
            token_retention: DEFAULT_TOKEN_RETENTION,
            compositor_pid: 0,
        }
    }
}

/// Read-only copy of a retained display frame, for telemetry consumers.
#[derive(Debug, Clone)]
pub struct DisplayFrameSnapshot {
    /// Prediction token for the cycle.
    pub token: FrameToken,
    /// Whether compositor predictions resolved.
    pub prediction_state: PredictionState,
    /// Predicted schedule.
    pub predictions: TimelineItem,
    /// Actual schedule (present time zero until the fence resolves).
    pub actuals: TimelineItem,
    /// Vsync period in effect.
    pub vsync_period: Nanos,
    /// Display-level jank mask.
    pub jank: JankType,
    /// Present metadata.
    pub present_metadata: PresentMetadata,
    /// Finish metadata.
    pub ready_metadata: ReadyMetadata,
    /// Start metadata.
    pub start_metadata: StartMetadata,
    /// Number of surface frames composited in the cycle.
    pub surface_count: usize,
}

/// Read-only copy of a surface frame within a retained display frame.
#[derive(Debug, Clone)]
pub struct SurfaceFrameSnapshot {
    /// Prediction token for the frame.
    pub token: FrameToken,
    /// Whether predictions resolved.
    pub prediction_state: PredictionState,
    /// Predicted schedule.
    pub predictions: TimelineItem,
    /// Actual schedule.
    pub actuals: TimelineItem,
    /// Presented/dropped/unknown.
    pub present_state: PresentState,
    /// Jank mask, absent until a present is recorded.
    pub jank: Option<JankType>,
    /// Owning process id.
    pub owner_pid: u32,
    /// Owning user id.
    pub owner_uid: u32,
    /// Layer name.
    pub layer_name: String,
}

#[derive(Debug)]
struct TimelineState {
    current: Arc<Mutex<DisplayFrame>>,
    history: VecDeque<Arc<Mutex<DisplayFrame>>>,
    pending_fences: Vec<(Arc<PresentFence>, Arc<Mutex<DisplayFrame>>)>,
    max_history: usize,
}

/// Tracks per-frame timelines and classifies missed deadlines.
pub struct FrameTimeline {
    registry: PredictionRegistry,
    state: Mutex<TimelineState>,
    stats: Arc<dyn JankStats>,
    trace_sink: Arc<dyn TraceSink>,
    thresholds: JankThresholds,
    compositor_pid: u32,
}

impl std::fmt::Debug for FrameTimeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameTimeline")
            .field("registry", &self.registry)
            .field("thresholds", &self.thresholds)
            .field("compositor_pid", &self.compositor_pid)
            .finish_non_exhaustive()
    }
}

impl FrameTimeline {
    /// Create an engine that discards stats and trace output.
    ///
    /// # Panics
    ///
    /// Panics if `config.max_history` is zero. An engine that can retain
    /// nothing is a configuration error, caught at construction.
    #[must_use]
    pub fn new(config: TimelineConfig) -> Self {
        Self::with_sinks(config, Arc::new(NoopJankStats), Arc::new(NoopTraceSink))
    }

    /// Create an engine with explicit stats and trace collaborators.
    ///
    /// # Panics
    ///
    /// Panics if `config.max_history` is zero.
    #[must_use]
    pub fn with_sinks(
        config: TimelineConfig,
        stats: Arc<dyn JankStats>,
        trace_sink: Arc<dyn TraceSink>,
    ) -> Self {
        assert!(config.max_history > 0, "max_history must be non-zero");
        Self {
            registry: PredictionRegistry::new(config.token_retention),
            state: Mutex::new(TimelineState {
                current: Arc::new(Mutex::new(DisplayFrame::new(config.thresholds))),
                history: VecDeque::new(),
                pending_fences: Vec::new(),
                max_history: config.max_history,
            }),
            stats,
            trace_sink,
            thresholds: config.thresholds,
            compositor_pid: config.compositor_pid,
        }
    }

    /// The prediction registry producers issue tokens against.
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &PredictionRegistry {
        &self.registry
    }

    // --- Producer side ------------------------------------------------------

    /// Create a surface frame, resolving `token` against the registry.
    ///
    /// The frame is not yet part of any display frame; call
    /// [`attach_surface_frame`](Self::attach_surface_frame) once the
    /// compositor latches it into a cycle. Passing no token yields an
    /// untracked frame ([`PredictionState::None`]).
    #[must_use]
    pub fn create_surface_frame(
        &self,
        owner_pid: u32,
        owner_uid: u32,
        layer_name: impl Into<String>,
        debug_name: impl Into<String>,
        token: Option<FrameToken>,
    ) -> Arc<SurfaceFrame> {
        let (token, prediction_state, predictions) = match token {
            None => (FrameToken::INVALID, PredictionState::None, TimelineItem::zeroed()),
            Some(token) => match self.registry.lookup(token) {
                Some(predictions) => (token, PredictionState::Valid, predictions),
                None => (token, PredictionState::Expired, TimelineItem::zeroed()),
            },
        };
        Arc::new(SurfaceFrame::new(
            token,
            owner_pid,
            owner_uid,
            layer_name.into(),
            debug_name.into(),
            prediction_state,
            predictions,
            self.thresholds,
            self.stats.clone(),
        ))
    }

    // --- Compositor side ----------------------------------------------------

    /// Append a surface frame to the current display frame.
    pub fn attach_surface_frame(&self, surface_frame: Arc<SurfaceFrame>) {
        let state = self.state.lock().unwrap();
        state.current.lock().unwrap().attach_surface_frame(surface_frame);
    }

    /// Record the compositor's wake-up for the current cycle.
    pub fn on_wake_up(&self, token: FrameToken, wake_up_time: Nanos, vsync_period: Nanos) {
        let predictions = self.registry.lookup(token);
        let state = self.state.lock().unwrap();
        state
            .current
            .lock()
            .unwrap()
            .on_wake_up(token, vsync_period, predictions, wake_up_time);
    }

    /// Mark the current cycle as GPU-composited.
    pub fn set_gpu_composition(&self, gpu_composition: bool) {
        let state = self.state.lock().unwrap();
        state.current.lock().unwrap().set_gpu_composition(gpu_composition);
    }

    /// Record the present submission for the current cycle.
    ///
    /// Sets the cycle's actual end time, queues its fence, resolves any
    /// already-signaled fences (classifying and exporting their frames),
    /// then finalizes the current frame into history unconditionally and
    /// starts a new one.
    pub fn on_present_submitted(&self, actual_end_time: Nanos, fence: Arc<PresentFence>) {
        let mut state = self.state.lock().unwrap();
        state.current.lock().unwrap().set_actual_end_time(actual_end_time);
        let current = state.current.clone();
        state.pending_fences.push((fence, current));
        self.resolve_pending(&mut state);
        Self::finalize_current(&mut state, self.thresholds);
    }

    fn resolve_pending(&self, state: &mut TimelineState) {
        let mut still_pending = Vec::new();
        for (fence, frame) in state.pending_fences.drain(..) {
            match fence.poll() {
                FenceSignal::Pending => still_pending.push((fence, frame)),
                FenceSignal::Invalid => {
                    // Never presented; the frame stays in history
                    // unclassified.
                    debug!("dropping pending fence entry: fence invalid");
                }
                FenceSignal::SignaledAt(signal_time) => {
                    let mut frame = frame.lock().unwrap();
                    let total = frame.on_present(signal_time);
                    self.stats.record_display_jank(total);
                    frame.emit_trace(self.compositor_pid, self.trace_sink.as_ref());
                }
            }
        }
        state.pending_fences = still_pending;
    }

    fn finalize_current(state: &mut TimelineState, thresholds: JankThresholds) {
        while state.history.len() >= state.max_history {
            state.history.pop_front();
        }
        let finished = std::mem::replace(
            &mut state.current,
            Arc::new(Mutex::new(DisplayFrame::new(thresholds))),
        );
        state.history.push_back(finished);
    }

    // --- Maintenance --------------------------------------------------------

    /// Change the history bound.
    ///
    /// Clears retained history and the pending-fence queue entirely: a
    /// resize must not leave data windowed under the old bound. The current
    /// frame keeps building.
    pub fn set_max_history(&self, max_history: usize) {
        assert!(max_history > 0, "max_history must be non-zero");
        let mut state = self.state.lock().unwrap();
        debug!(max_history, "resizing display-frame history");
        state.history.clear();
        state.pending_fences.clear();
        state.max_history = max_history;
    }

    /// Restore the default history bound (clearing retained state).
    pub fn reset(&self) {
        self.set_max_history(DEFAULT_MAX_HISTORY);
    }

    // --- Introspection ------------------------------------------------------

    /// Number of finalized display frames currently retained.
    #[must_use]
    pub fn history_len(&self) -> usize {
        self.state.lock().unwrap().history.len()
    }

    /// Current history bound.
    #[must_use]
    pub fn max_history(&self) -> usize {
        self.state.lock().unwrap().max_history
    }

    /// Number of fences still awaiting a signal.
    #[must_use]
    pub fn pending_fence_count(&self) -> usize {
        self.state.lock().unwrap().pending_fences.len()
    }

    /// Snapshot of the `idx`-th retained display frame (0 = oldest).
    #[must_use]
    pub fn display_frame_snapshot(&self, idx: usize) -> Option<DisplayFrameSnapshot> {
        let state = self.state.lock().unwrap();
        let frame = state.history.get(idx)?.lock().unwrap();
        let (present_metadata, ready_metadata, start_metadata) = frame.metadata();
        Some(DisplayFrameSnapshot {
            token: frame.token(),
            prediction_state: frame.prediction_state(),
            predictions: frame.predictions(),
            actuals: frame.actuals(),
            vsync_period: frame.vsync_period(),
            jank: frame.jank_type(),
            present_metadata,
            ready_metadata,
            start_metadata,
            surface_count: frame.surface_frames().len(),
        })
    }

    /// Snapshot of one surface frame within a retained display frame.
    #[must_use]
    pub fn surface_frame_snapshot(
        &self,
        frame_idx: usize,
        surface_idx: usize,
    ) -> Option<SurfaceFrameSnapshot> {
        let state = self.state.lock().unwrap();
        let frame = state.history.get(frame_idx)?.lock().unwrap();
        let surface_frame = frame.surface_frames().get(surface_idx)?;
        Some(SurfaceFrameSnapshot {
            token: surface_frame.token(),
            prediction_state: surface_frame.prediction_state(),
            predictions: surface_frame.predictions(),
            actuals: surface_frame.actuals(),
            present_state: surface_frame.present_state(),
            jank: surface_frame.jank_type(),
            owner_pid: surface_frame.owner_pid(),
            owner_uid: surface_frame.owner_uid(),
            layer_name: surface_frame.layer_name().to_string(),
        })
    }

    // --- Dump ---------------------------------------------------------------

    /// Render every retained display frame.
    #[must_use]
    pub fn dump_all(&self) -> String {
        let state = self.state.lock().unwrap();
        let mut out = String::new();
        let _ = writeln!(out, "Number of display frames: {}", state.history.len());
        let base_time = Self::dump_base_time(&state);
        for (i, frame) in state.history.iter().enumerate() {
            let _ = write!(out, "Display Frame {i}");
            frame.lock().unwrap().dump(&mut out, base_time);
        }
        out
    }

    /// Render only the retained display frames that carry jank, themselves
    /// or in any of their surfaces.
    #[must_use]
    pub fn dump_jank(&self) -> String {
        let state = self.state.lock().unwrap();
        let mut out = String::new();
        let base_time = Self::dump_base_time(&state);
        for (i, frame) in state.history.iter().enumerate() {
            let frame = frame.lock().unwrap();
            if !frame.is_janky() {
                continue;
            }
            let _ = write!(out, "Display Frame {i}");
            frame.dump(&mut out, base_time);
        }
        out
    }

    // All frames in one dump share the oldest frame's base so the window
    // reads as a single relative timeline.
    fn dump_base_time(state: &TimelineState) -> Nanos {
        state
            .history
            .front()
            .and_then(|frame| frame.lock().unwrap().base_time())
            .unwrap_or(0)
    }
}
