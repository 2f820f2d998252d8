#![forbid(unsafe_code)]

//! Per-layer frame records.
//!
//! A [`SurfaceFrame`] tracks one application-submitted buffer from queueing
//! through presentation. Producer threads fill in actual timestamps as the
//! buffer moves through the pipeline; the compositor thread records the
//! final present and runs jank classification once the owning display
//! frame's fence resolves.
//!
//! # Locking
//!
//! Identity (token, owner, names, predictions) is immutable and read
//! lock-free. Everything mutable sits behind one per-instance mutex,
//! because producer threads (queue/acquire times) race the compositor
//! thread (present state, classification).
//!
//! # Classification
//!
//! Classification runs exactly once, from
//! [`SurfaceFrame::record_present`], and only for buffers that were
//! actually presented. The decision tree:
//!
//! | Present  | Finish   | Outcome                                          |
//! |----------|----------|--------------------------------------------------|
//! | on time  | any      | `NONE`                                           |
//! | early    | on time  | vsync-aligned ? `COMPOSITOR_SCHEDULING` : `PREDICTION_ERROR` |
//! | early    | late     | `UNKNOWN`                                        |
//! | late     | on time  | display jank if any, else vsync-aligned ? `COMPOSITOR_SCHEDULING` : `PREDICTION_ERROR` |
//! | late     | late     | display janky ? display jank : `APP_DEADLINE_MISSED` |
//!
//! Late presents additionally OR in `BUFFER_STUFFING` when the buffer sat
//! queued past its own predicted deadline before the compositor last
//! latched.

use std::fmt::Write as _;
use std::sync::{Arc, Mutex};

use crate::dump::{dump_table, fmt_ms};
use crate::item::{Nanos, PredictionState, TimelineItem, min_timestamp};
use crate::jank::{JankThresholds, JankType, PresentMetadata, ReadyMetadata};
use crate::stats::JankStats;
use crate::token::FrameToken;
use crate::trace::{SurfaceFrameEvent, TracePresentType};

/// What the compositor ultimately did with the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PresentState {
    /// Compositor has not seen the buffer yet.
    #[default]
    Unknown,
    /// Buffer was latched and presented.
    Presented,
    /// Buffer was dropped without being presented.
    Dropped,
}

impl PresentState {
    /// Human-readable name for dumps.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "Unknown",
            Self::Presented => "Presented",
            Self::Dropped => "Dropped",
        }
    }
}

#[derive(Debug, Default)]
struct SurfaceFrameState {
    present_state: PresentState,
    actuals: TimelineItem,
    actual_queue_time: Nanos,
    last_latch_time: Nanos,
    jank: JankType,
    present_metadata: PresentMetadata,
    ready_metadata: ReadyMetadata,
    gpu_composition: bool,
}

/// Timeline record for one application layer's contribution to a cycle.
#[derive(Debug)]
pub struct SurfaceFrame {
    token: FrameToken,
    owner_pid: u32,
    owner_uid: u32,
    layer_name: String,
    debug_name: String,
    prediction_state: PredictionState,
    predictions: TimelineItem,
    thresholds: JankThresholds,
    stats: Arc<dyn JankStats>,
    state: Mutex<SurfaceFrameState>,
}

impl SurfaceFrame {
    /// Construct a record with resolved predictions.
    ///
    /// Callers normally go through
    /// [`FrameTimeline::create_surface_frame`](crate::timeline::FrameTimeline::create_surface_frame),
    /// which resolves the token against the prediction registry first.
    #[must_use]
    pub fn new(
        token: FrameToken,
        owner_pid: u32,
        owner_uid: u32,
        layer_name: String,
        debug_name: String,
        prediction_state: PredictionState,
        predictions: TimelineItem,
        thresholds: JankThresholds,
        stats: Arc<dyn JankStats>,
    ) -> Self {
        Self {
            token,
            owner_pid,
            owner_uid,
            layer_name,
            debug_name,
            prediction_state,
            predictions,
            thresholds,
            stats,
            state: Mutex::new(SurfaceFrameState::default()),
        }
    }

    // --- Producer-side setters ---------------------------------------------

    /// Record when the app started working on the frame.
    pub fn set_actual_start_time(&self, start_time: Nanos) {
        self.state.lock().unwrap().actuals.start_time = start_time;
    }

    /// Record when the buffer was queued to the compositor.
    pub fn set_actual_queue_time(&self, queue_time: Nanos) {
        self.state.lock().unwrap().actual_queue_time = queue_time;
    }

    /// Record the acquire fence signal time.
    ///
    /// Acquire fences can signal out of order relative to queueing, so the
    /// actual end time is the max of the two.
    pub fn set_acquire_fence_time(&self, acquire_fence_time: Nanos) {
        let mut state = self.state.lock().unwrap();
        state.actuals.end_time = acquire_fence_time.max(state.actual_queue_time);
    }

    /// Record whether the buffer was presented or dropped, along with the
    /// compositor's last latch time (used for buffer-stuffing detection).
    pub fn set_present_state(&self, present_state: PresentState, last_latch_time: Nanos) {
        let mut state = self.state.lock().unwrap();
        state.present_state = present_state;
        state.last_latch_time = last_latch_time;
    }

    /// Mark the owning cycle as GPU-composited.
    pub fn set_gpu_composition(&self, gpu_composition: bool) {
        self.state.lock().unwrap().gpu_composition = gpu_composition;
    }

    // --- Accessors ----------------------------------------------------------

    /// The correlation token this record was created against.
    #[inline]
    #[must_use]
    pub fn token(&self) -> FrameToken {
        self.token
    }

    /// Owning process id.
    #[inline]
    #[must_use]
    pub fn owner_pid(&self) -> u32 {
        self.owner_pid
    }

    /// Owning user id.
    #[inline]
    #[must_use]
    pub fn owner_uid(&self) -> u32 {
        self.owner_uid
    }

    /// Layer the buffer belongs to.
    #[inline]
    #[must_use]
    pub fn layer_name(&self) -> &str {
        &self.layer_name
    }

    /// Whether predictions were resolved for this frame.
    #[inline]
    #[must_use]
    pub fn prediction_state(&self) -> PredictionState {
        self.prediction_state
    }

    /// The predicted timeline (zeroed unless `prediction_state` is valid).
    #[inline]
    #[must_use]
    pub fn predictions(&self) -> TimelineItem {
        self.predictions
    }

    /// Copy of the actual timestamps recorded so far.
    #[must_use]
    pub fn actuals(&self) -> TimelineItem {
        self.state.lock().unwrap().actuals
    }

    /// The queue time as last recorded.
    #[must_use]
    pub fn actual_queue_time(&self) -> Nanos {
        self.state.lock().unwrap().actual_queue_time
    }

    /// Whether the buffer was presented, dropped, or not yet seen.
    #[must_use]
    pub fn present_state(&self) -> PresentState {
        self.state.lock().unwrap().present_state
    }

    /// Present and finish metadata as last classified.
    #[must_use]
    pub fn metadata(&self) -> (PresentMetadata, ReadyMetadata) {
        let state = self.state.lock().unwrap();
        (state.present_metadata, state.ready_metadata)
    }

    /// The jank mask, or `None` while the frame has no recorded present.
    #[must_use]
    pub fn jank_type(&self) -> Option<JankType> {
        let state = self.state.lock().unwrap();
        if state.actuals.present_time == 0 {
            return None;
        }
        Some(state.jank)
    }

    /// Smallest known timestamp across predictions and actuals.
    #[must_use]
    pub fn base_time(&self) -> Option<Nanos> {
        let state = self.state.lock().unwrap();
        min_timestamp(self.prediction_state, self.predictions, state.actuals)
    }

    // --- Classification -----------------------------------------------------

    /// Record the resolved present time and classify this frame.
    ///
    /// Invoked by the owning display frame when its present fence resolves;
    /// `display_jank` is the display-level result, propagated into late
    /// presents. Dropped (and never-latched) buffers are left untouched.
    pub fn record_present(&self, present_time: Nanos, display_jank: JankType, vsync_period: Nanos) {
        let mut state = self.state.lock().unwrap();
        if state.present_state != PresentState::Presented {
            // Dropped buffers are never classified.
            return;
        }

        state.actuals.present_time = present_time;
        match self.prediction_state {
            PredictionState::None => {
                // No token, no baseline: nothing to classify against.
                return;
            }
            PredictionState::Expired => {
                // The prediction is gone; anything we said here would be a
                // guess. Report it as unknown.
                state.jank = JankType::UNKNOWN;
                state.present_metadata = PresentMetadata::Unknown;
                state.ready_metadata = ReadyMetadata::Unknown;
                let jank = state.jank;
                drop(state);
                self.stats
                    .record_surface_jank(self.owner_uid, &self.layer_name, jank);
                return;
            }
            PredictionState::Valid => {}
        }

        let present_delta = state.actuals.present_time - self.predictions.present_time;
        let deadline_delta = state.actuals.end_time - self.predictions.end_time;

        state.ready_metadata = if deadline_delta > self.thresholds.deadline {
            ReadyMetadata::LateFinish
        } else {
            ReadyMetadata::OnTimeFinish
        };
        state.present_metadata = if present_delta.abs() > self.thresholds.present {
            if present_delta > 0 {
                PresentMetadata::Late
            } else {
                PresentMetadata::Early
            }
        } else {
            PresentMetadata::OnTime
        };

        let aligned = self.thresholds.vsync_aligned(present_delta, vsync_period);
        match state.present_metadata {
            PresentMetadata::OnTime => {
                state.jank = JankType::NONE;
            }
            PresentMetadata::Early => {
                if state.ready_metadata == ReadyMetadata::OnTimeFinish {
                    state.jank = if aligned {
                        JankType::COMPOSITOR_SCHEDULING
                    } else {
                        JankType::PREDICTION_ERROR
                    };
                } else {
                    // Finished late yet presented early: nothing coherent to
                    // blame.
                    state.jank = JankType::UNKNOWN;
                }
            }
            PresentMetadata::Late => {
                if state.last_latch_time != 0 && self.predictions.end_time <= state.last_latch_time
                {
                    // The buffer sat queued past its own deadline before the
                    // compositor even looked at it.
                    state.jank |= JankType::BUFFER_STUFFING;
                }
                if state.ready_metadata == ReadyMetadata::OnTimeFinish {
                    if !display_jank.is_empty() {
                        state.jank |= display_jank;
                    } else if aligned {
                        state.jank |= JankType::COMPOSITOR_SCHEDULING;
                    } else {
                        state.jank |= JankType::PREDICTION_ERROR;
                    }
                } else if display_jank.is_empty() {
                    // Display frame was clean, so the app alone is at fault.
                    state.jank |= JankType::APP_DEADLINE_MISSED;
                } else {
                    state.jank |= display_jank;
                }
            }
            // Present metadata was assigned above; Unknown cannot reach here.
            PresentMetadata::Unknown => {}
        }

        let jank = state.jank;
        drop(state);
        self.stats
            .record_surface_jank(self.owner_uid, &self.layer_name, jank);
    }

    // --- Export -------------------------------------------------------------

    /// Build the trace record for this frame, or `None` when either token
    /// is the invalid sentinel (untracked frames are not traced).
    #[must_use]
    pub fn trace_event(&self, display_frame_token: FrameToken) -> Option<SurfaceFrameEvent> {
        if !self.token.is_valid() {
            tracing::debug!(layer = %self.layer_name, "skipping surface-frame trace: invalid token");
            return None;
        }
        if !display_frame_token.is_valid() {
            tracing::debug!(
                layer = %self.layer_name,
                "skipping surface-frame trace: invalid display-frame token"
            );
            return None;
        }
        let state = self.state.lock().unwrap();
        let present_type = match state.present_state {
            PresentState::Dropped => TracePresentType::Dropped,
            PresentState::Unknown => TracePresentType::Unspecified,
            PresentState::Presented => match state.present_metadata {
                PresentMetadata::OnTime => TracePresentType::OnTime,
                PresentMetadata::Early => TracePresentType::Early,
                PresentMetadata::Late => TracePresentType::Late,
                PresentMetadata::Unknown => TracePresentType::Unspecified,
            },
        };
        Some(SurfaceFrameEvent {
            token: self.token,
            display_frame_token,
            present_type,
            on_time_finish: state.ready_metadata == ReadyMetadata::OnTimeFinish,
            gpu_composition: state.gpu_composition,
            jank: state.jank,
            expected_start: self.predictions.start_time,
            expected_end: self.predictions.end_time,
            actual_start: state.actuals.start_time,
            actual_end: state.actuals.end_time,
            layer_name: self.layer_name.clone(),
            pid: self.owner_pid,
        })
    }

    /// Append a human-readable report of this frame.
    pub fn dump(&self, out: &mut String, indent: &str, base_time: Nanos) {
        let state = self.state.lock().unwrap();
        let _ = write!(out, "{indent}Layer - {}", self.debug_name);
        if !state.jank.is_empty() {
            // Make janky frames easy to spot when scanning.
            let _ = write!(out, " [*]");
        }
        let _ = writeln!(out);
        let _ = writeln!(out, "{indent}Token: {}", self.token.raw());
        let _ = writeln!(out, "{indent}Owner Pid: {}", self.owner_pid);
        let _ = writeln!(out, "{indent}Present State: {}", state.present_state.as_str());
        let _ = writeln!(
            out,
            "{indent}Prediction State: {}",
            self.prediction_state.as_str()
        );
        let _ = writeln!(out, "{indent}Jank: {}", state.jank.describe());
        let _ = writeln!(
            out,
            "{indent}Present Metadata: {}",
            state.present_metadata.as_str()
        );
        let _ = writeln!(
            out,
            "{indent}Finish Metadata: {}",
            state.ready_metadata.as_str()
        );
        let _ = writeln!(
            out,
            "{indent}Last latch time: {} ms",
            fmt_ms((state.last_latch_time - base_time).max(0))
        );
        if self.prediction_state == PredictionState::Valid {
            let present_delta = state.actuals.present_time - self.predictions.present_time;
            let _ = writeln!(out, "{indent}Present delta: {} ms", fmt_ms(present_delta.abs()));
        }
        dump_table(
            out,
            self.predictions,
            state.actuals,
            indent,
            self.prediction_state,
            base_time,
        );
    }
}
