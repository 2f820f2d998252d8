#![forbid(unsafe_code)]

//! Per-cycle frame records.
//!
//! A [`DisplayFrame`] tracks one composition cycle: the compositor's own
//! predicted and actual schedule, plus every surface frame composited in
//! that cycle. Exactly one display frame is "current" at any time; the
//! coordinator finalizes it into history on every present submission and
//! classifies it later, when its present fence resolves.
//!
//! Fields here carry no lock of their own: the current frame is only
//! touched under the coordinator lock, and finalized frames are only
//! revisited by the fence-resolution pass, which also runs under that lock.
//!
//! Display-level classification mirrors the surface tree with compositor
//! attributions: an early present points at scheduling, a late but
//! vsync-aligned present at the display hardware, a late finish at the
//! compositor's own deadline. The resolved mask is then propagated into
//! every attached surface frame.

use std::fmt::Write as _;

use smallvec::SmallVec;
use std::sync::Arc;

use crate::dump::{dump_table, fmt_ms};
use crate::item::{Nanos, PredictionState, TimelineItem, min_timestamp};
use crate::jank::{JankThresholds, JankType, PresentMetadata, ReadyMetadata, StartMetadata};
use crate::surface::SurfaceFrame;
use crate::token::FrameToken;
use crate::trace::{DisplayFrameEvent, TracePresentType, TraceSink};

/// Timeline record for one composition cycle.
#[derive(Debug)]
pub struct DisplayFrame {
    token: FrameToken,
    vsync_period: Nanos,
    prediction_state: PredictionState,
    predictions: TimelineItem,
    actuals: TimelineItem,
    jank: JankType,
    present_metadata: PresentMetadata,
    ready_metadata: ReadyMetadata,
    start_metadata: StartMetadata,
    gpu_composition: bool,
    surface_frames: SmallVec<[Arc<SurfaceFrame>; 8]>,
    thresholds: JankThresholds,
}

impl DisplayFrame {
    /// A fresh, empty cycle record.
    #[must_use]
    pub fn new(thresholds: JankThresholds) -> Self {
        Self {
            token: FrameToken::INVALID,
            vsync_period: 0,
            prediction_state: PredictionState::None,
            predictions: TimelineItem::zeroed(),
            actuals: TimelineItem::zeroed(),
            jank: JankType::NONE,
            present_metadata: PresentMetadata::Unknown,
            ready_metadata: ReadyMetadata::Unknown,
            start_metadata: StartMetadata::Unknown,
            gpu_composition: false,
            surface_frames: SmallVec::new(),
            thresholds,
        }
    }

    /// Record the compositor's wake-up for this cycle.
    ///
    /// Missing predictions mean the token already expired; the cycle keeps
    /// going, it just classifies degraded later.
    pub fn on_wake_up(
        &mut self,
        token: FrameToken,
        vsync_period: Nanos,
        predictions: Option<TimelineItem>,
        wake_up_time: Nanos,
    ) {
        self.token = token;
        self.vsync_period = vsync_period;
        match predictions {
            Some(predictions) => {
                self.prediction_state = PredictionState::Valid;
                self.predictions = predictions;
            }
            None => {
                self.prediction_state = PredictionState::Expired;
            }
        }
        self.actuals.start_time = wake_up_time;
    }

    /// Append a surface frame composited in this cycle.
    pub fn attach_surface_frame(&mut self, surface_frame: Arc<SurfaceFrame>) {
        self.surface_frames.push(surface_frame);
    }

    /// Record when the composited frame was handed to the display.
    pub fn set_actual_end_time(&mut self, end_time: Nanos) {
        self.actuals.end_time = end_time;
    }

    /// Mark this cycle as GPU-composited.
    pub fn set_gpu_composition(&mut self, gpu_composition: bool) {
        self.gpu_composition = gpu_composition;
    }

    // --- Accessors ----------------------------------------------------------

    /// The compositor's prediction token for this cycle.
    #[inline]
    #[must_use]
    pub fn token(&self) -> FrameToken {
        self.token
    }

    /// The vsync period in effect for this cycle.
    #[inline]
    #[must_use]
    pub fn vsync_period(&self) -> Nanos {
        self.vsync_period
    }

    /// Whether compositor predictions were resolved.
    #[inline]
    #[must_use]
    pub fn prediction_state(&self) -> PredictionState {
        self.prediction_state
    }

    /// The compositor's predicted schedule.
    #[inline]
    #[must_use]
    pub fn predictions(&self) -> TimelineItem {
        self.predictions
    }

    /// The compositor's actual schedule so far.
    #[inline]
    #[must_use]
    pub fn actuals(&self) -> TimelineItem {
        self.actuals
    }

    /// The display-level jank mask (empty until classified).
    #[inline]
    #[must_use]
    pub fn jank_type(&self) -> JankType {
        self.jank
    }

    /// Present, finish, and start metadata as last classified.
    #[must_use]
    pub fn metadata(&self) -> (PresentMetadata, ReadyMetadata, StartMetadata) {
        (self.present_metadata, self.ready_metadata, self.start_metadata)
    }

    /// The surface frames composited in this cycle.
    #[must_use]
    pub fn surface_frames(&self) -> &[Arc<SurfaceFrame>] {
        &self.surface_frames
    }

    /// Whether the frame itself or any of its surfaces carries jank.
    #[must_use]
    pub fn is_janky(&self) -> bool {
        if !self.jank.is_empty() {
            return true;
        }
        self.surface_frames
            .iter()
            .any(|sf| sf.jank_type().is_some_and(|j| !j.is_empty()))
    }

    /// Smallest known timestamp across this frame and all its surfaces.
    ///
    /// Only used to normalize dump output; classification never reads it.
    #[must_use]
    pub fn base_time(&self) -> Option<Nanos> {
        let mut base = min_timestamp(self.prediction_state, self.predictions, self.actuals);
        for surface_frame in &self.surface_frames {
            base = match (base, surface_frame.base_time()) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            };
        }
        base
    }

    // --- Classification -----------------------------------------------------

    /// Classify this cycle against the resolved present time, propagate the
    /// result into every attached surface frame, and return the bitwise-OR
    /// of all jank observed in the cycle.
    pub fn on_present(&mut self, signal_time: Nanos) -> JankType {
        self.actuals.present_time = signal_time;

        let present_delta = self.actuals.present_time - self.predictions.present_time;
        self.present_metadata = if present_delta.abs() > self.thresholds.present {
            if present_delta > 0 {
                PresentMetadata::Late
            } else {
                PresentMetadata::Early
            }
        } else {
            PresentMetadata::OnTime
        };

        self.ready_metadata =
            if self.actuals.end_time - self.predictions.end_time > self.thresholds.deadline {
                ReadyMetadata::LateFinish
            } else {
                ReadyMetadata::OnTimeFinish
            };

        let start_delta = self.actuals.start_time - self.predictions.start_time;
        self.start_metadata = if start_delta.abs() > self.thresholds.start {
            if start_delta > 0 {
                StartMetadata::LateStart
            } else {
                StartMetadata::EarlyStart
            }
        } else {
            StartMetadata::OnTimeStart
        };

        let aligned = self.thresholds.vsync_aligned(present_delta, self.vsync_period);
        match self.present_metadata {
            PresentMetadata::OnTime => {}
            PresentMetadata::Early => {
                if self.ready_metadata == ReadyMetadata::OnTimeFinish {
                    self.jank = if aligned {
                        JankType::COMPOSITOR_SCHEDULING
                    } else {
                        JankType::PREDICTION_ERROR
                    };
                } else {
                    // Composition ran long yet the frame still went up
                    // early: the compositor latched a vsync too soon.
                    self.jank = JankType::COMPOSITOR_SCHEDULING;
                }
            }
            PresentMetadata::Late => {
                if self.ready_metadata == ReadyMetadata::OnTimeFinish {
                    self.jank = if aligned {
                        // Composition was done on schedule; the extra whole
                        // vsyncs happened below us.
                        JankType::DISPLAY_HAL
                    } else {
                        JankType::PREDICTION_ERROR
                    };
                } else {
                    self.jank = JankType::COMPOSITOR_CPU_DEADLINE_MISSED;
                }
            }
            PresentMetadata::Unknown => {
                self.jank = JankType::UNKNOWN;
            }
        }

        let mut total = self.jank;
        for surface_frame in &self.surface_frames {
            surface_frame.record_present(signal_time, self.jank, self.vsync_period);
            if let Some(jank) = surface_frame.jank_type() {
                total |= jank;
            }
        }
        total
    }

    // --- Export -------------------------------------------------------------

    /// Emit trace records for this cycle and its surfaces.
    ///
    /// Nothing is emitted when the cycle never saw a wake-up (invalid
    /// token); surfaces with invalid tokens are skipped individually.
    pub fn emit_trace(&self, compositor_pid: u32, sink: &dyn TraceSink) {
        if !self.token.is_valid() {
            tracing::debug!("skipping display-frame trace: invalid token");
        } else {
            let present_type = match self.present_metadata {
                PresentMetadata::OnTime => TracePresentType::OnTime,
                PresentMetadata::Early => TracePresentType::Early,
                PresentMetadata::Late => TracePresentType::Late,
                PresentMetadata::Unknown => TracePresentType::Unspecified,
            };
            sink.record_display_frame(DisplayFrameEvent {
                token: self.token,
                present_type,
                on_time_finish: self.ready_metadata == ReadyMetadata::OnTimeFinish,
                gpu_composition: self.gpu_composition,
                jank: self.jank,
                expected_start: self.predictions.start_time,
                expected_end: self.predictions.end_time,
                actual_start: self.actuals.start_time,
                actual_end: self.actuals.end_time,
                pid: compositor_pid,
            });
        }
        for surface_frame in &self.surface_frames {
            if let Some(event) = surface_frame.trace_event(self.token) {
                sink.record_surface_frame(event);
            }
        }
    }

    /// Append a human-readable report of this cycle and its surfaces.
    pub fn dump(&self, out: &mut String, base_time: Nanos) {
        if !self.jank.is_empty() {
            let _ = write!(out, " [*]");
        }
        let _ = writeln!(out);
        let _ = writeln!(out, "Prediction State: {}", self.prediction_state.as_str());
        let _ = writeln!(out, "Jank: {}", self.jank.describe());
        let _ = writeln!(out, "Present Metadata: {}", self.present_metadata.as_str());
        let _ = writeln!(out, "Finish Metadata: {}", self.ready_metadata.as_str());
        let _ = writeln!(out, "Start Metadata: {}", self.start_metadata.as_str());
        let _ = writeln!(out, "Vsync Period: {} ms", fmt_ms(self.vsync_period));
        let present_delta = self.actuals.present_time - self.predictions.present_time;
        let _ = writeln!(out, "Present delta: {} ms", fmt_ms(present_delta.abs()));
        if self.vsync_period > 0 {
            let _ = writeln!(
                out,
                "Present delta % vsync: {} ms",
                fmt_ms(present_delta.abs() % self.vsync_period)
            );
        }
        dump_table(
            out,
            self.predictions,
            self.actuals,
            "",
            self.prediction_state,
            base_time,
        );
        let _ = writeln!(out);
        for surface_frame in &self.surface_frames {
            surface_frame.dump(out, "    ", base_time);
        }
        let _ = writeln!(out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::NANOS_PER_MS;
    use crate::stats::NoopJankStats;
    use crate::surface::PresentState;
    use crate::trace::{JsonlTraceRecorder, TimelineTraceEvent};

    fn ms(v: Nanos) -> Nanos {
        v * NANOS_PER_MS
    }

    fn wake_frame(predictions: TimelineItem, wake: Nanos) -> DisplayFrame {
        let mut frame = DisplayFrame::new(JankThresholds::default());
        frame.on_wake_up(FrameToken::from_raw(7), ms(11), Some(predictions), wake);
        frame
    }

    fn surface(predictions: TimelineItem) -> Arc<SurfaceFrame> {
        Arc::new(SurfaceFrame::new(
            FrameToken::from_raw(1),
            10,
            0,
            "layer1".to_string(),
            "layer1".to_string(),
            PredictionState::Valid,
            predictions,
            JankThresholds::default(),
            Arc::new(NoopJankStats),
        ))
    }

    #[test]
    fn wake_up_with_missing_predictions_is_expired() {
        let mut frame = DisplayFrame::new(JankThresholds::default());
        frame.on_wake_up(FrameToken::from_raw(7), ms(11), None, ms(22));
        assert_eq!(frame.prediction_state(), PredictionState::Expired);
        assert_eq!(frame.actuals().start_time, ms(22));
        assert_eq!(frame.vsync_period(), ms(11));
    }

    #[test]
    fn on_time_present_leaves_frame_clean() {
        let mut frame = wake_frame(TimelineItem::new(ms(22), ms(26), ms(30)), ms(22));
        frame.set_actual_end_time(ms(26));
        let total = frame.on_present(ms(31));
        assert_eq!(frame.jank_type(), JankType::NONE);
        assert_eq!(total, JankType::NONE);
        let (present, ready, start) = frame.metadata();
        assert_eq!(present, PresentMetadata::OnTime);
        assert_eq!(ready, ReadyMetadata::OnTimeFinish);
        assert_eq!(start, StartMetadata::OnTimeStart);
    }

    #[test]
    fn late_present_late_finish_is_compositor_cpu_deadline() {
        let mut frame = wake_frame(TimelineItem::new(ms(52), ms(56), ms(60)), ms(52));
        frame.set_actual_end_time(ms(59));
        frame.on_present(ms(90));
        assert_eq!(frame.jank_type(), JankType::COMPOSITOR_CPU_DEADLINE_MISSED);
    }

    #[test]
    fn late_present_on_time_finish_aligned_is_display_hal() {
        let mut frame = wake_frame(TimelineItem::new(ms(52), ms(56), ms(60)), ms(52));
        frame.set_actual_end_time(ms(56));
        // 22ms late = exactly two vsyncs: aligned, composition was on time.
        frame.on_present(ms(82));
        assert_eq!(frame.jank_type(), JankType::DISPLAY_HAL);
    }

    #[test]
    fn late_present_on_time_finish_unaligned_is_prediction_error() {
        let mut frame = wake_frame(TimelineItem::new(ms(52), ms(56), ms(60)), ms(52));
        frame.set_actual_end_time(ms(56));
        frame.on_present(ms(65));
        assert_eq!(frame.jank_type(), JankType::PREDICTION_ERROR);
    }

    #[test]
    fn early_present_late_finish_is_compositor_scheduling() {
        let mut frame = wake_frame(TimelineItem::new(ms(52), ms(56), ms(70)), ms(52));
        frame.set_actual_end_time(ms(60));
        frame.on_present(ms(60));
        assert_eq!(frame.jank_type(), JankType::COMPOSITOR_SCHEDULING);
    }

    #[test]
    fn late_start_is_recorded_in_metadata() {
        let mut frame = wake_frame(TimelineItem::new(ms(52), ms(56), ms(60)), ms(55));
        frame.set_actual_end_time(ms(56));
        frame.on_present(ms(60));
        assert_eq!(frame.metadata().2, StartMetadata::LateStart);
    }

    #[test]
    fn on_present_propagates_jank_into_surfaces_and_aggregates() {
        let mut frame = wake_frame(TimelineItem::new(ms(52), ms(56), ms(60)), ms(52));
        frame.set_actual_end_time(ms(59));

        let surface_frame = surface(TimelineItem::new(ms(10), ms(20), ms(60)));
        surface_frame.set_acquire_fence_time(ms(45));
        surface_frame.set_present_state(PresentState::Presented, 0);
        frame.attach_surface_frame(surface_frame.clone());

        let total = frame.on_present(ms(90));
        // Display itself missed its CPU deadline; the surface inherits it.
        assert_eq!(frame.jank_type(), JankType::COMPOSITOR_CPU_DEADLINE_MISSED);
        assert_eq!(
            surface_frame.jank_type(),
            Some(JankType::COMPOSITOR_CPU_DEADLINE_MISSED)
        );
        assert_eq!(total, JankType::COMPOSITOR_CPU_DEADLINE_MISSED);
        assert_eq!(surface_frame.actuals().present_time, ms(90));
    }

    #[test]
    fn dropped_surfaces_do_not_contribute_jank() {
        let mut frame = wake_frame(TimelineItem::new(ms(22), ms(26), ms(30)), ms(22));
        frame.set_actual_end_time(ms(26));

        let surface_frame = surface(TimelineItem::new(ms(10), ms(20), ms(30)));
        surface_frame.set_present_state(PresentState::Dropped, 0);
        frame.attach_surface_frame(surface_frame.clone());

        let total = frame.on_present(ms(31));
        assert_eq!(total, JankType::NONE);
        assert!(!frame.is_janky());
        assert_eq!(surface_frame.actuals().present_time, 0);
    }

    #[test]
    fn base_time_folds_surfaces() {
        let mut frame = wake_frame(TimelineItem::new(ms(22), ms(26), ms(30)), ms(22));
        frame.attach_surface_frame(surface(TimelineItem::new(ms(10), ms(20), ms(30))));
        assert_eq!(frame.base_time(), Some(ms(10)));
    }

    #[test]
    fn trace_skips_invalid_display_token_entirely() {
        let recorder = JsonlTraceRecorder::new();
        let mut frame = DisplayFrame::new(JankThresholds::default());
        frame.attach_surface_frame(surface(TimelineItem::new(ms(10), ms(20), ms(30))));
        frame.emit_trace(1, &recorder);
        assert!(recorder.is_empty());
    }

    #[test]
    fn trace_emits_display_then_surfaces() {
        let recorder = JsonlTraceRecorder::new();
        let mut frame = wake_frame(TimelineItem::new(ms(22), ms(26), ms(30)), ms(22));
        frame.set_actual_end_time(ms(26));
        let surface_frame = surface(TimelineItem::new(ms(10), ms(20), ms(30)));
        surface_frame.set_present_state(PresentState::Presented, 0);
        frame.attach_surface_frame(surface_frame);
        frame.on_present(ms(31));
        frame.emit_trace(42, &recorder);

        let entries = recorder.entries();
        assert_eq!(entries.len(), 2);
        match &entries[0].event {
            TimelineTraceEvent::Display(e) => {
                assert_eq!(e.token.raw(), 7);
                assert_eq!(e.pid, 42);
            }
            TimelineTraceEvent::Surface(_) => panic!("display event must come first"),
        }
        match &entries[1].event {
            TimelineTraceEvent::Surface(e) => assert_eq!(e.display_frame_token.raw(), 7),
            TimelineTraceEvent::Display(_) => panic!("surface event expected"),
        }
    }

    #[test]
    fn dump_contains_cycle_summary() {
        let mut frame = wake_frame(TimelineItem::new(ms(52), ms(56), ms(60)), ms(52));
        frame.set_actual_end_time(ms(59));
        frame.on_present(ms(90));

        let mut out = String::new();
        frame.dump(&mut out, frame.base_time().unwrap_or(0));
        assert!(out.contains("[*]"));
        assert!(out.contains("Compositor CPU Deadline Missed"));
        assert!(out.contains("Vsync Period"));
    }
}
