//! Property-based invariant tests for jank classification.
//!
//! These verify structural invariants that must hold for any inputs:
//!
//! 1. Classification never panics, for arbitrary predictions, actuals,
//!    vsync periods (including zero and negative), and propagated jank.
//! 2. The jank mask only ever contains defined bits.
//! 3. Dropped frames never gain a present time, whatever is recorded.
//! 4. The actual end time is always max(queue time, acquire fence time).
//! 5. Tokens are strictly increasing regardless of issue timing.
//! 6. An on-time present always classifies as `NONE` jank.
//! 7. Dump rendering never panics on arbitrary frame state.

use std::sync::Arc;

use jankline_core::item::{Nanos, PredictionState, TimelineItem};
use jankline_core::jank::{JankThresholds, JankType};
use jankline_core::stats::NoopJankStats;
use jankline_core::surface::{PresentState, SurfaceFrame};
use jankline_core::token::{FrameToken, PredictionRegistry};
use proptest::prelude::*;

// ── Strategies ────────────────────────────────────────────────────────────

fn timeline_item_strategy() -> impl Strategy<Value = TimelineItem> {
    // Deliberately unordered: actuals may violate start <= end <= present.
    (
        -1_000_000_000i64..=1_000_000_000,
        -1_000_000_000i64..=1_000_000_000,
        -1_000_000_000i64..=1_000_000_000,
    )
        .prop_map(|(start, end, present)| TimelineItem::new(start, end, present))
}

fn prediction_state_strategy() -> impl Strategy<Value = PredictionState> {
    prop_oneof![
        Just(PredictionState::Valid),
        Just(PredictionState::Expired),
        Just(PredictionState::None),
    ]
}

fn jank_strategy() -> impl Strategy<Value = JankType> {
    (0u32..=0xFF).prop_map(JankType::from_bits_truncate)
}

fn surface_frame(
    prediction_state: PredictionState,
    predictions: TimelineItem,
) -> SurfaceFrame {
    SurfaceFrame::new(
        FrameToken::from_raw(1),
        10,
        0,
        "layer1".to_string(),
        "layer1".to_string(),
        prediction_state,
        predictions,
        JankThresholds::default(),
        Arc::new(NoopJankStats),
    )
}

// ── Classification robustness ─────────────────────────────────────────────

proptest! {
    #[test]
    fn classification_never_panics(
        prediction_state in prediction_state_strategy(),
        predictions in timeline_item_strategy(),
        queue_time in -1_000_000_000i64..=1_000_000_000,
        acquire_time in -1_000_000_000i64..=1_000_000_000,
        latch_time in -1_000_000_000i64..=1_000_000_000,
        present_time in -1_000_000_000i64..=1_000_000_000,
        display_jank in jank_strategy(),
        vsync_period in -100_000_000i64..=100_000_000,
    ) {
        let frame = surface_frame(prediction_state, predictions);
        frame.set_actual_queue_time(queue_time);
        frame.set_acquire_fence_time(acquire_time);
        frame.set_present_state(PresentState::Presented, latch_time);
        frame.record_present(present_time, display_jank, vsync_period);

        // 2. Only defined bits ever appear.
        if let Some(jank) = frame.jank_type() {
            prop_assert_eq!(JankType::from_bits_truncate(jank.bits()), jank);
        }
    }

    #[test]
    fn dropped_frames_never_gain_a_present_time(
        predictions in timeline_item_strategy(),
        present_time in 1i64..=1_000_000_000,
        display_jank in jank_strategy(),
        vsync_period in 1i64..=100_000_000,
    ) {
        let frame = surface_frame(PredictionState::Valid, predictions);
        frame.set_present_state(PresentState::Dropped, 0);
        frame.record_present(present_time, display_jank, vsync_period);
        prop_assert_eq!(frame.actuals().present_time, 0);
        prop_assert_eq!(frame.jank_type(), None);
    }

    #[test]
    fn end_time_is_always_the_max_of_queue_and_acquire(
        queue_time in 0i64..=1_000_000_000,
        acquire_time in 0i64..=1_000_000_000,
    ) {
        let frame = surface_frame(PredictionState::None, TimelineItem::zeroed());
        frame.set_actual_queue_time(queue_time);
        frame.set_acquire_fence_time(acquire_time);
        prop_assert_eq!(frame.actuals().end_time, queue_time.max(acquire_time));
    }

    #[test]
    fn on_time_present_is_always_clean(
        start in 0i64..=1_000_000,
        work in 0i64..=1_000_000,
        jitter in -2_000_000i64..=2_000_000, // within the 2ms threshold
        display_jank in jank_strategy(),
        vsync_period in 1i64..=100_000_000,
    ) {
        let end = start + work;
        let predictions = TimelineItem::new(start, end, end + 16_000_000);
        let frame = surface_frame(PredictionState::Valid, predictions);
        frame.set_acquire_fence_time(end);
        frame.set_present_state(PresentState::Presented, 0);
        frame.record_present(predictions.present_time + jitter, display_jank, vsync_period);
        prop_assert_eq!(frame.jank_type(), Some(JankType::NONE));
    }

    #[test]
    fn tokens_strictly_increase(
        times in proptest::collection::vec(0i64..=1_000_000_000, 1..50),
    ) {
        let registry = PredictionRegistry::default();
        let mut last: Option<i64> = None;
        for now in times {
            let token = registry.issue_at(TimelineItem::zeroed(), now);
            if let Some(prev) = last {
                prop_assert!(token.raw() > prev);
            }
            last = Some(token.raw());
        }
    }

    #[test]
    fn dump_never_panics(
        prediction_state in prediction_state_strategy(),
        predictions in timeline_item_strategy(),
        actual_end in -1_000_000_000i64..=1_000_000_000,
        present_time in -1_000_000_000i64..=1_000_000_000,
        base_time in -1_000_000_000i64..=1_000_000_000,
        vsync_period in 0i64..=100_000_000,
    ) {
        let frame = surface_frame(prediction_state, predictions);
        frame.set_acquire_fence_time(actual_end);
        frame.set_present_state(PresentState::Presented, 0);
        frame.record_present(present_time, JankType::NONE, vsync_period);

        let mut out = String::new();
        frame.dump(&mut out, "  ", base_time);
        prop_assert!(!out.is_empty());
    }
}

// ── Deterministic edge cases worth pinning ────────────────────────────────

#[test]
fn negative_vsync_period_is_tolerated() {
    let frame = surface_frame(PredictionState::Valid, TimelineItem::new(10, 20, 30));
    frame.set_acquire_fence_time(20);
    frame.set_present_state(PresentState::Presented, 0);
    frame.record_present(Nanos::MAX, JankType::NONE, -1);
    assert!(frame.jank_type().is_some());
}
