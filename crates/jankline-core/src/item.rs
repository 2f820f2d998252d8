#![forbid(unsafe_code)]

//! Timeline timestamps shared between predictions and actuals.
//!
//! Every frame carries two [`TimelineItem`]s: the predicted schedule handed
//! out by the prediction registry, and the actual times observed while the
//! frame moved through the pipeline. Timestamps are raw monotonic
//! nanoseconds; `0` (or a negative sentinel for end times) means "not yet
//! known" and is excluded from base-time folding.

/// Monotonic nanosecond timestamp.
pub type Nanos = i64;

/// Nanoseconds per millisecond, for thresholds and dump formatting.
pub const NANOS_PER_MS: Nanos = 1_000_000;

/// Start, end, and present timestamps for one frame.
///
/// Used for both predictions and actuals. Predictions are expected to be
/// ordered (`start <= end <= present`); actuals may violate that ordering
/// and consumers must tolerate it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimelineItem {
    /// Time work on the frame begins.
    pub start_time: Nanos,
    /// Time the frame is ready (queued/composited).
    pub end_time: Nanos,
    /// Time the frame is presented on screen.
    pub present_time: Nanos,
}

impl TimelineItem {
    /// Create a timeline item from explicit timestamps.
    #[inline]
    pub const fn new(start_time: Nanos, end_time: Nanos, present_time: Nanos) -> Self {
        Self {
            start_time,
            end_time,
            present_time,
        }
    }

    /// All timestamps unknown.
    #[inline]
    pub const fn zeroed() -> Self {
        Self::new(0, 0, 0)
    }
}

/// Whether a frame's predictions were resolved from the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PredictionState {
    /// Predictions were obtained from the registry.
    Valid,
    /// A token was supplied but the registry had already evicted it.
    Expired,
    /// No token was supplied; the submission is untracked.
    #[default]
    None,
}

impl PredictionState {
    /// Human-readable name for dumps.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Valid => "Valid",
            Self::Expired => "Expired",
            Self::None => "None",
        }
    }
}

/// Smallest known timestamp across a frame's predictions and actuals.
///
/// Predictions contribute only when valid, and only their start time
/// (predictions are ordered, so start is the minimum). Actuals are checked
/// field by field because any of them may still be unset.
#[must_use]
pub fn min_timestamp(
    prediction_state: PredictionState,
    predictions: TimelineItem,
    actuals: TimelineItem,
) -> Option<Nanos> {
    let mut min: Option<Nanos> = None;
    let mut fold = |t: Nanos| {
        if t > 0 {
            min = Some(match min {
                Some(m) => m.min(t),
                None => t,
            });
        }
    };
    if prediction_state == PredictionState::Valid {
        fold(predictions.start_time);
    }
    fold(actuals.start_time);
    fold(actuals.end_time);
    fold(actuals.present_time);
    min
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zeroed_item_is_default() {
        assert_eq!(TimelineItem::zeroed(), TimelineItem::default());
    }

    #[test]
    fn min_timestamp_skips_invalid_predictions() {
        let predictions = TimelineItem::new(10, 20, 30);
        let actuals = TimelineItem::new(0, 26, 42);
        assert_eq!(
            min_timestamp(PredictionState::Expired, predictions, actuals),
            Some(26)
        );
        assert_eq!(
            min_timestamp(PredictionState::Valid, predictions, actuals),
            Some(10)
        );
    }

    #[test]
    fn min_timestamp_ignores_unset_actuals() {
        let actuals = TimelineItem::new(0, -1, 0);
        assert_eq!(
            min_timestamp(PredictionState::None, TimelineItem::zeroed(), actuals),
            None
        );
    }

    #[test]
    fn min_timestamp_uses_actual_present() {
        let actuals = TimelineItem::new(0, 0, 5);
        assert_eq!(
            min_timestamp(PredictionState::None, TimelineItem::zeroed(), actuals),
            Some(5)
        );
    }
}
