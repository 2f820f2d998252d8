#![forbid(unsafe_code)]

//! Jank root causes and frame timing metadata.
//!
//! A frame that missed its predicted presentation deadline carries a
//! [`JankType`] bitmask naming every cause that contributed. The mask is a
//! bitwise-OR accumulator: display-level jank propagates into surface-level
//! masks, and one frame can legitimately carry several causes at once
//! (e.g. `BUFFER_STUFFING | APP_DEADLINE_MISSED`).
//!
//! The metadata enums record where the actual timestamps landed relative to
//! the predictions; they feed both the jank decision and the dump output.

use bitflags::bitflags;

use crate::item::{NANOS_PER_MS, Nanos};

bitflags! {
    /// Root causes for a missed presentation deadline.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct JankType: u32 {
        /// Frame presented on time.
        const NONE = 0;
        /// Miss attributable to the display hardware pipeline.
        const DISPLAY_HAL = 1 << 0;
        /// Compositor scheduled the frame for the wrong vsync.
        const COMPOSITOR_SCHEDULING = 1 << 1;
        /// Compositor missed its CPU deadline.
        const COMPOSITOR_CPU_DEADLINE_MISSED = 1 << 2;
        /// Compositor missed its GPU deadline.
        const COMPOSITOR_GPU_DEADLINE_MISSED = 1 << 3;
        /// Application finished its frame past the deadline.
        const APP_DEADLINE_MISSED = 1 << 4;
        /// Predicted timeline did not line up with any vsync.
        const PREDICTION_ERROR = 1 << 5;
        /// Buffer sat queued past its own prediction before latch.
        const BUFFER_STUFFING = 1 << 6;
        /// Cause could not be determined.
        const UNKNOWN = 1 << 7;
    }
}

impl Default for JankType {
    fn default() -> Self {
        Self::NONE
    }
}

impl JankType {
    /// Comma-separated list of the causes set in this mask.
    #[must_use]
    pub fn describe(self) -> String {
        if self.is_empty() {
            return "None".to_string();
        }
        let mut parts = Vec::new();
        if self.contains(Self::DISPLAY_HAL) {
            parts.push("Display HAL");
        }
        if self.contains(Self::COMPOSITOR_SCHEDULING) {
            parts.push("Compositor Scheduling");
        }
        if self.contains(Self::COMPOSITOR_CPU_DEADLINE_MISSED) {
            parts.push("Compositor CPU Deadline Missed");
        }
        if self.contains(Self::COMPOSITOR_GPU_DEADLINE_MISSED) {
            parts.push("Compositor GPU Deadline Missed");
        }
        if self.contains(Self::APP_DEADLINE_MISSED) {
            parts.push("App Deadline Missed");
        }
        if self.contains(Self::PREDICTION_ERROR) {
            parts.push("Prediction Error");
        }
        if self.contains(Self::BUFFER_STUFFING) {
            parts.push("Buffer Stuffing");
        }
        if self.contains(Self::UNKNOWN) {
            parts.push("Unknown jank");
        }
        parts.join(", ")
    }
}

/// Where the actual present landed relative to the prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PresentMetadata {
    /// Not yet classified (or unclassifiable).
    #[default]
    Unknown,
    /// Within the present threshold of the prediction.
    OnTime,
    /// More than the threshold before the prediction.
    Early,
    /// More than the threshold after the prediction.
    Late,
}

impl PresentMetadata {
    /// Human-readable name for dumps.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "Unknown Present",
            Self::OnTime => "On Time Present",
            Self::Early => "Early Present",
            Self::Late => "Late Present",
        }
    }
}

/// Whether the frame's work finished within its deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadyMetadata {
    /// Not yet classified (or unclassifiable).
    #[default]
    Unknown,
    /// Finished within the deadline threshold.
    OnTimeFinish,
    /// Finished past the deadline threshold.
    LateFinish,
}

impl ReadyMetadata {
    /// Human-readable name for dumps.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "Unknown Finish",
            Self::OnTimeFinish => "On Time Finish",
            Self::LateFinish => "Late Finish",
        }
    }
}

/// Where the compositor's wake-up landed relative to the prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StartMetadata {
    /// Not yet classified.
    #[default]
    Unknown,
    /// Within the start threshold of the prediction.
    OnTimeStart,
    /// More than the threshold before the prediction.
    EarlyStart,
    /// More than the threshold after the prediction.
    LateStart,
}

impl StartMetadata {
    /// Human-readable name for dumps.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "Unknown Start",
            Self::OnTimeStart => "On Time Start",
            Self::EarlyStart => "Early Start",
            Self::LateStart => "Late Start",
        }
    }
}

/// Tolerances applied before a timing delta counts as jank.
///
/// An actual timestamp within the threshold of its prediction is treated as
/// on time. Defaults match a 60-120Hz pipeline: 2ms for present and
/// deadline, 1ms for the compositor wake-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JankThresholds {
    /// Tolerance on the present time delta.
    pub present: Nanos,
    /// Tolerance on the finish (end time) delta.
    pub deadline: Nanos,
    /// Tolerance on the compositor start delta.
    pub start: Nanos,
}

impl Default for JankThresholds {
    fn default() -> Self {
        Self {
            present: 2 * NANOS_PER_MS,
            deadline: 2 * NANOS_PER_MS,
            start: NANOS_PER_MS,
        }
    }
}

impl JankThresholds {
    /// Whether a present delta is a whole number of vsyncs, within the
    /// present threshold on either side.
    ///
    /// Example: with an 11ms period and a 2ms threshold, residues in
    /// 0-2ms and 9-11ms both count as aligned. A non-positive period can
    /// never align (and must not divide).
    #[must_use]
    pub fn vsync_aligned(&self, present_delta: Nanos, vsync_period: Nanos) -> bool {
        if vsync_period <= 0 {
            return false;
        }
        let delta_to_vsync = present_delta.abs() % vsync_period;
        delta_to_vsync < self.present || delta_to_vsync >= vsync_period - self.present
    }
}
