#![forbid(unsafe_code)]

//! Frame timeline tracking and jank classification.
//!
//! Every frame an application submits and a compositor presents accumulates
//! a timeline record: the schedule that was *predicted* for it, and the
//! times that *actually* happened. Once the presentation fence for a cycle
//! resolves, each record is classified (did the frame miss its deadline,
//! and whose fault was it?) and exported to a trace sink.
//!
//! # Pipeline
//!
//! 1. A producer registers a predicted schedule with the
//!    [`PredictionRegistry`](token::PredictionRegistry) and gets back a
//!    [`FrameToken`](token::FrameToken).
//! 2. At buffer submission the token becomes a
//!    [`SurfaceFrame`](surface::SurfaceFrame), which producer threads fill
//!    in as the buffer moves through the pipeline.
//! 3. The compositor attaches latched frames to the current
//!    [`DisplayFrame`](display::DisplayFrame), reports its own wake-up, and
//!    submits a present fence.
//! 4. The [`FrameTimeline`](timeline::FrameTimeline) coordinator polls
//!    pending fences on every submission, classifies resolved cycles, and
//!    retains a bounded history for dumps.

pub mod clock;
pub mod display;
mod dump;
pub mod fence;
pub mod item;
pub mod jank;
pub mod stats;
pub mod surface;
pub mod timeline;
pub mod token;
pub mod trace;

pub use display::DisplayFrame;
pub use fence::{FenceSignal, PresentFence};
pub use item::{NANOS_PER_MS, Nanos, PredictionState, TimelineItem};
pub use jank::{JankThresholds, JankType, PresentMetadata, ReadyMetadata, StartMetadata};
pub use stats::{CountingJankStats, JankStats, JankStatsSnapshot, NoopJankStats};
pub use surface::{PresentState, SurfaceFrame};
pub use timeline::{
    DEFAULT_MAX_HISTORY, DisplayFrameSnapshot, FrameTimeline, SurfaceFrameSnapshot, TimelineConfig,
};
pub use token::{DEFAULT_TOKEN_RETENTION, FrameToken, PredictionRegistry};
pub use trace::{
    DisplayFrameEvent, JsonlTraceRecorder, NoopTraceSink, SurfaceFrameEvent, TimelineTraceEvent,
    TracePresentType, TraceSink, TraceSummary,
};
