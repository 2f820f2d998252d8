#![forbid(unsafe_code)]

//! Jankline public facade crate.
//!
//! This crate provides the stable, ergonomic surface area for users. It
//! re-exports the engine types from `jankline-core` and offers a
//! lightweight prelude for day-to-day usage.

// --- Engine re-exports -----------------------------------------------------

pub use jankline_core::display::DisplayFrame;
pub use jankline_core::fence::{FenceSignal, PresentFence};
pub use jankline_core::item::{NANOS_PER_MS, Nanos, PredictionState, TimelineItem};
pub use jankline_core::jank::{
    JankThresholds, JankType, PresentMetadata, ReadyMetadata, StartMetadata,
};
pub use jankline_core::stats::{CountingJankStats, JankStats, JankStatsSnapshot, NoopJankStats};
pub use jankline_core::surface::{PresentState, SurfaceFrame};
pub use jankline_core::timeline::{
    DEFAULT_MAX_HISTORY, DisplayFrameSnapshot, FrameTimeline, SurfaceFrameSnapshot, TimelineConfig,
};
pub use jankline_core::token::{DEFAULT_TOKEN_RETENTION, FrameToken, PredictionRegistry};
pub use jankline_core::trace::{
    DisplayFrameEvent, JsonlTraceRecorder, NoopTraceSink, SurfaceFrameEvent, TimelineTraceEvent,
    TracePresentType, TraceSink, TraceSummary,
};

// --- Prelude --------------------------------------------------------------

pub mod prelude {
    pub use crate::{
        FenceSignal, FrameTimeline, FrameToken, JankThresholds, JankType, PresentFence,
        PresentState, PredictionState, SurfaceFrame, TimelineConfig, TimelineItem,
    };

    pub use crate::core;
}

pub use jankline_core as core;
