#![forbid(unsafe_code)]

//! Structured trace events for classified frames.
//!
//! Every display frame whose present fence resolves is exported as one
//! [`DisplayFrameEvent`] plus one [`SurfaceFrameEvent`] per attached
//! surface. The wire format of a real trace backend is out of scope here;
//! [`TraceSink`] is the seam, and [`JsonlTraceRecorder`] is a bounded
//! in-process sink that renders JSONL and hashes the stream for golden
//! comparisons.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::item::Nanos;
use crate::jank::JankType;
use crate::token::FrameToken;

// =============================================================================
// Event Types
// =============================================================================

/// Present outcome reported in trace events.
///
/// Unlike [`PresentMetadata`](crate::jank::PresentMetadata) this also covers
/// buffers the compositor never showed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracePresentType {
    /// Outcome not determined (unknown present state or no classification).
    Unspecified,
    /// Presented within threshold of the prediction.
    OnTime,
    /// Presented early.
    Early,
    /// Presented late.
    Late,
    /// Buffer was dropped, never presented.
    Dropped,
}

impl TracePresentType {
    /// Stable lowercase name used in the JSONL rendering.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unspecified => "unspecified",
            Self::OnTime => "on_time",
            Self::Early => "early",
            Self::Late => "late",
            Self::Dropped => "dropped",
        }
    }

    fn discriminant(self) -> u8 {
        match self {
            Self::Unspecified => 0,
            Self::OnTime => 1,
            Self::Early => 2,
            Self::Late => 3,
            Self::Dropped => 4,
        }
    }
}

/// Trace record for one classified display frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayFrameEvent {
    /// Token of the compositor's prediction for this cycle.
    pub token: FrameToken,
    /// Present outcome.
    pub present_type: TracePresentType,
    /// Whether composition finished within its deadline.
    pub on_time_finish: bool,
    /// Whether the cycle fell back to GPU composition.
    pub gpu_composition: bool,
    /// Final jank mask for the display frame itself.
    pub jank: JankType,
    /// Predicted start time.
    pub expected_start: Nanos,
    /// Predicted end time.
    pub expected_end: Nanos,
    /// Actual start time.
    pub actual_start: Nanos,
    /// Actual end time.
    pub actual_end: Nanos,
    /// Compositor process id.
    pub pid: u32,
}

/// Trace record for one surface frame within a display frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceFrameEvent {
    /// Token of the app's prediction for this frame.
    pub token: FrameToken,
    /// Token of the owning display frame (the parent record).
    pub display_frame_token: FrameToken,
    /// Present outcome, including dropped buffers.
    pub present_type: TracePresentType,
    /// Whether the app finished within its deadline.
    pub on_time_finish: bool,
    /// Whether the owning cycle fell back to GPU composition.
    pub gpu_composition: bool,
    /// Final jank mask for this surface frame.
    pub jank: JankType,
    /// Predicted start time.
    pub expected_start: Nanos,
    /// Predicted end time.
    pub expected_end: Nanos,
    /// Actual start time.
    pub actual_start: Nanos,
    /// Actual end time.
    pub actual_end: Nanos,
    /// Layer the buffer belongs to.
    pub layer_name: String,
    /// Owning process id.
    pub pid: u32,
}

/// A recorded event of either kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimelineTraceEvent {
    /// Display-frame record.
    Display(DisplayFrameEvent),
    /// Surface-frame record.
    Surface(SurfaceFrameEvent),
}

/// Receiver for classified-frame trace records.
pub trait TraceSink: Send + Sync + std::fmt::Debug {
    /// Export one display-frame record.
    fn record_display_frame(&self, event: DisplayFrameEvent);

    /// Export one surface-frame record.
    fn record_surface_frame(&self, event: SurfaceFrameEvent);
}

/// Discards everything.
#[derive(Debug, Default)]
pub struct NoopTraceSink;

impl TraceSink for NoopTraceSink {
    fn record_display_frame(&self, _event: DisplayFrameEvent) {}
    fn record_surface_frame(&self, _event: SurfaceFrameEvent) {}
}

// =============================================================================
// JSONL Recorder
// =============================================================================

/// A sequenced entry retained by the recorder.
#[derive(Debug, Clone)]
pub struct TraceEntry {
    /// Monotonic sequence number within this recorder.
    pub seq: u64,
    /// The event itself.
    pub event: TimelineTraceEvent,
}

impl TraceEntry {
    /// Serialize to a single JSONL line.
    #[must_use]
    pub fn to_jsonl(&self) -> String {
        match &self.event {
            TimelineTraceEvent::Display(e) => format!(
                "{{\"seq\":{},\"event\":\"display_frame\",\"token\":{},\"present\":\"{}\",\
                 \"on_time_finish\":{},\"gpu_composition\":{},\"jank\":{},\
                 \"expected_start\":{},\"expected_end\":{},\"actual_start\":{},\"actual_end\":{},\
                 \"pid\":{}}}",
                self.seq,
                e.token.raw(),
                e.present_type.as_str(),
                e.on_time_finish,
                e.gpu_composition,
                e.jank.bits(),
                e.expected_start,
                e.expected_end,
                e.actual_start,
                e.actual_end,
                e.pid,
            ),
            TimelineTraceEvent::Surface(e) => format!(
                "{{\"seq\":{},\"event\":\"surface_frame\",\"token\":{},\"display_frame_token\":{},\
                 \"present\":\"{}\",\"on_time_finish\":{},\"gpu_composition\":{},\"jank\":{},\
                 \"expected_start\":{},\"expected_end\":{},\"actual_start\":{},\"actual_end\":{},\
                 \"layer\":\"{}\",\"pid\":{}}}",
                self.seq,
                e.token.raw(),
                e.display_frame_token.raw(),
                e.present_type.as_str(),
                e.on_time_finish,
                e.gpu_composition,
                e.jank.bits(),
                e.expected_start,
                e.expected_end,
                e.actual_start,
                e.actual_end,
                escape_json(&e.layer_name),
                e.pid,
            ),
        }
    }
}

fn escape_json(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out
}

/// Summary statistics for a recorded stream.
#[derive(Debug, Clone, Default)]
pub struct TraceSummary {
    /// Total retained events.
    pub total_events: usize,
    /// Display-frame events.
    pub display_events: usize,
    /// Surface-frame events.
    pub surface_events: usize,
    /// Events carrying a non-empty jank mask.
    pub janky_events: usize,
    /// Checksum of the retained stream.
    pub checksum: u64,
}

/// Bounded in-process trace sink with a JSONL rendering.
///
/// Retains the most recent `max_entries` events (oldest evicted first) and
/// hashes the stream with FNV-1a so tests can compare against goldens.
#[derive(Debug)]
pub struct JsonlTraceRecorder {
    state: Mutex<RecorderState>,
    max_entries: usize,
}

#[derive(Debug)]
struct RecorderState {
    entries: VecDeque<TraceEntry>,
    seq: u64,
}

/// Default retained-event bound for [`JsonlTraceRecorder`].
pub const DEFAULT_TRACE_CAPACITY: usize = 4096;

impl JsonlTraceRecorder {
    /// Create a recorder with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_TRACE_CAPACITY)
    }

    /// Create a recorder retaining at most `max_entries` events.
    #[must_use]
    pub fn with_capacity(max_entries: usize) -> Self {
        Self {
            state: Mutex::new(RecorderState {
                entries: VecDeque::with_capacity(max_entries.min(DEFAULT_TRACE_CAPACITY)),
                seq: 0,
            }),
            max_entries,
        }
    }

    fn record(&self, event: TimelineTraceEvent) {
        let mut state = self.state.lock().unwrap();
        let entry = TraceEntry {
            seq: state.seq,
            event,
        };
        state.seq += 1;
        if self.max_entries > 0 && state.entries.len() >= self.max_entries {
            state.entries.pop_front();
        }
        state.entries.push_back(entry);
    }

    /// Number of retained events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().unwrap().entries.len()
    }

    /// Whether nothing has been retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the retained entries, oldest first.
    #[must_use]
    pub fn entries(&self) -> Vec<TraceEntry> {
        self.state.lock().unwrap().entries.iter().cloned().collect()
    }

    /// Render the retained stream as JSONL.
    #[must_use]
    pub fn to_jsonl(&self) -> String {
        self.state
            .lock()
            .unwrap()
            .entries
            .iter()
            .map(TraceEntry::to_jsonl)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// FNV-1a checksum of the retained stream.
    ///
    /// Stable across platforms; suitable for golden comparisons.
    #[must_use]
    pub fn checksum(&self) -> u64 {
        const FNV_OFFSET: u64 = 0xcbf29ce484222325;
        const FNV_PRIME: u64 = 0x100000001b3;

        let state = self.state.lock().unwrap();
        let mut hash = FNV_OFFSET;
        let mut mix = |bytes: &[u8]| {
            for &byte in bytes {
                hash ^= u64::from(byte);
                hash = hash.wrapping_mul(FNV_PRIME);
            }
        };

        for entry in &state.entries {
            mix(&entry.seq.to_le_bytes());
            match &entry.event {
                TimelineTraceEvent::Display(e) => {
                    mix(&[0x01, e.present_type.discriminant()]);
                    mix(&e.token.raw().to_le_bytes());
                    mix(&e.jank.bits().to_le_bytes());
                    mix(&e.expected_start.to_le_bytes());
                    mix(&e.expected_end.to_le_bytes());
                    mix(&e.actual_start.to_le_bytes());
                    mix(&e.actual_end.to_le_bytes());
                }
                TimelineTraceEvent::Surface(e) => {
                    mix(&[0x02, e.present_type.discriminant()]);
                    mix(&e.token.raw().to_le_bytes());
                    mix(&e.display_frame_token.raw().to_le_bytes());
                    mix(&e.jank.bits().to_le_bytes());
                    mix(&e.expected_start.to_le_bytes());
                    mix(&e.expected_end.to_le_bytes());
                    mix(&e.actual_start.to_le_bytes());
                    mix(&e.actual_end.to_le_bytes());
                    mix(e.layer_name.as_bytes());
                }
            }
        }
        hash
    }

    /// Checksum rendered as a fixed-width hex string.
    #[must_use]
    pub fn checksum_hex(&self) -> String {
        format!("{:016x}", self.checksum())
    }

    /// Summary statistics over the retained stream.
    #[must_use]
    pub fn summary(&self) -> TraceSummary {
        let mut summary = TraceSummary {
            checksum: self.checksum(),
            ..Default::default()
        };
        let state = self.state.lock().unwrap();
        summary.total_events = state.entries.len();
        for entry in &state.entries {
            let jank = match &entry.event {
                TimelineTraceEvent::Display(e) => {
                    summary.display_events += 1;
                    e.jank
                }
                TimelineTraceEvent::Surface(e) => {
                    summary.surface_events += 1;
                    e.jank
                }
            };
            if !jank.is_empty() {
                summary.janky_events += 1;
            }
        }
        summary
    }

    /// Drop all retained events and reset the sequence counter.
    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap();
        state.entries.clear();
        state.seq = 0;
    }
}

impl Default for JsonlTraceRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl TraceSink for JsonlTraceRecorder {
    fn record_display_frame(&self, event: DisplayFrameEvent) {
        self.record(TimelineTraceEvent::Display(event));
    }

    fn record_surface_frame(&self, event: SurfaceFrameEvent) {
        self.record(TimelineTraceEvent::Surface(event));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn display_event(token: i64) -> DisplayFrameEvent {
        DisplayFrameEvent {
            token: FrameToken::from_raw(token),
            present_type: TracePresentType::OnTime,
            on_time_finish: true,
            gpu_composition: false,
            jank: JankType::NONE,
            expected_start: 10,
            expected_end: 20,
            actual_start: 11,
            actual_end: 21,
            pid: 42,
        }
    }

    fn surface_event(token: i64, layer: &str) -> SurfaceFrameEvent {
        SurfaceFrameEvent {
            token: FrameToken::from_raw(token),
            display_frame_token: FrameToken::from_raw(99),
            present_type: TracePresentType::Late,
            on_time_finish: false,
            gpu_composition: false,
            jank: JankType::APP_DEADLINE_MISSED,
            expected_start: 10,
            expected_end: 20,
            actual_start: 11,
            actual_end: 45,
            layer_name: layer.to_string(),
            pid: 7,
        }
    }

    #[test]
    fn jsonl_contains_key_fields() {
        let recorder = JsonlTraceRecorder::new();
        recorder.record_display_frame(display_event(3));
        recorder.record_surface_frame(surface_event(4, "status_bar"));

        let jsonl = recorder.to_jsonl();
        assert!(jsonl.contains("\"event\":\"display_frame\""));
        assert!(jsonl.contains("\"event\":\"surface_frame\""));
        assert!(jsonl.contains("\"token\":3"));
        assert!(jsonl.contains("\"display_frame_token\":99"));
        assert!(jsonl.contains("\"layer\":\"status_bar\""));
        assert!(jsonl.contains("\"present\":\"late\""));
    }

    #[test]
    fn checksum_stable_for_identical_streams() {
        let a = JsonlTraceRecorder::new();
        let b = JsonlTraceRecorder::new();
        for recorder in [&a, &b] {
            recorder.record_display_frame(display_event(1));
            recorder.record_surface_frame(surface_event(2, "layer1"));
        }
        assert_eq!(a.checksum(), b.checksum());
        assert_eq!(a.checksum_hex(), b.checksum_hex());
    }

    #[test]
    fn checksum_differs_on_reorder() {
        let a = JsonlTraceRecorder::new();
        a.record_display_frame(display_event(1));
        a.record_surface_frame(surface_event(2, "layer1"));

        let b = JsonlTraceRecorder::new();
        b.record_surface_frame(surface_event(2, "layer1"));
        b.record_display_frame(display_event(1));

        assert_ne!(a.checksum(), b.checksum());
    }

    #[test]
    fn capacity_bound_evicts_oldest() {
        let recorder = JsonlTraceRecorder::with_capacity(2);
        recorder.record_display_frame(display_event(1));
        recorder.record_display_frame(display_event(2));
        recorder.record_display_frame(display_event(3));
        assert_eq!(recorder.len(), 2);
        let entries = recorder.entries();
        match &entries[0].event {
            TimelineTraceEvent::Display(e) => assert_eq!(e.token.raw(), 2),
            TimelineTraceEvent::Surface(_) => panic!("expected display event"),
        }
    }

    #[test]
    fn summary_counts_by_kind_and_jank() {
        let recorder = JsonlTraceRecorder::new();
        recorder.record_display_frame(display_event(1));
        recorder.record_surface_frame(surface_event(2, "layer1"));
        recorder.record_surface_frame(surface_event(3, "layer2"));

        let summary = recorder.summary();
        assert_eq!(summary.total_events, 3);
        assert_eq!(summary.display_events, 1);
        assert_eq!(summary.surface_events, 2);
        assert_eq!(summary.janky_events, 2);
    }

    #[test]
    fn layer_names_are_escaped() {
        let recorder = JsonlTraceRecorder::new();
        recorder.record_surface_frame(surface_event(1, "weird\"layer\\name"));
        let jsonl = recorder.to_jsonl();
        assert!(jsonl.contains("weird\\\"layer\\\\name"));
    }
}
