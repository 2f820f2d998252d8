#![forbid(unsafe_code)]

//! Human-readable dump rendering.
//!
//! All timestamps are printed in milliseconds relative to a base time (the
//! smallest known timestamp of the dumped window) so the output reads as a
//! small relative timeline instead of raw monotonic nanoseconds. Values not
//! yet known print as `N/A`.

use std::fmt::Write as _;

use crate::item::{NANOS_PER_MS, Nanos, PredictionState, TimelineItem};

/// Render a nanosecond value as milliseconds with two decimals.
#[must_use]
pub(crate) fn fmt_ms(nanos: Nanos) -> String {
    format!("{:.2}", nanos as f64 / NANOS_PER_MS as f64)
}

fn cell(value: Nanos, base_time: Nanos, known: bool) -> String {
    if known {
        format!("{:>10} ms", fmt_ms((value - base_time).max(0)))
    } else {
        format!("{:>13}", "N/A")
    }
}

/// Append the expected/actual timing table for one frame.
///
/// Predictions are printed only when valid. Unset actuals (zero start or
/// present, non-positive end) print as `N/A`.
pub(crate) fn dump_table(
    out: &mut String,
    predictions: TimelineItem,
    actuals: TimelineItem,
    indent: &str,
    prediction_state: PredictionState,
    base_time: Nanos,
) {
    let _ = writeln!(
        out,
        "{indent}          | {:>13} | {:>13} | {:>13}",
        "Start time", "End time", "Present time"
    );
    if prediction_state == PredictionState::Valid {
        let _ = writeln!(
            out,
            "{indent}Expected  | {} | {} | {}",
            cell(predictions.start_time, base_time, true),
            cell(predictions.end_time, base_time, true),
            cell(predictions.present_time, base_time, true),
        );
    }
    let _ = writeln!(
        out,
        "{indent}Actual    | {} | {} | {}",
        cell(actuals.start_time, base_time, actuals.start_time != 0),
        // Animation leashes can report the end time as -1.
        cell(actuals.end_time, base_time, actuals.end_time > 0),
        cell(actuals.present_time, base_time, actuals.present_time != 0),
    );
    let _ = writeln!(out, "{indent}{}", "-".repeat(58));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_prints_predictions_only_when_valid() {
        let predictions = TimelineItem::new(10 * NANOS_PER_MS, 20 * NANOS_PER_MS, 30 * NANOS_PER_MS);
        let actuals = TimelineItem::new(12 * NANOS_PER_MS, 0, 31 * NANOS_PER_MS);

        let mut valid = String::new();
        dump_table(&mut valid, predictions, actuals, "", PredictionState::Valid, 0);
        assert!(valid.contains("Expected"));
        assert!(valid.contains("10.00"));

        let mut expired = String::new();
        dump_table(
            &mut expired,
            predictions,
            actuals,
            "",
            PredictionState::Expired,
            0,
        );
        assert!(!expired.contains("Expected"));
        assert!(expired.contains("Actual"));
    }

    #[test]
    fn unset_actuals_render_as_na() {
        let mut out = String::new();
        dump_table(
            &mut out,
            TimelineItem::zeroed(),
            TimelineItem::new(0, -1, 0),
            "",
            PredictionState::None,
            0,
        );
        let actual_line = out.lines().find(|l| l.contains("Actual")).unwrap();
        assert_eq!(actual_line.matches("N/A").count(), 3);
    }

    #[test]
    fn timestamps_are_relative_to_base() {
        let mut out = String::new();
        dump_table(
            &mut out,
            TimelineItem::zeroed(),
            TimelineItem::new(50 * NANOS_PER_MS, 60 * NANOS_PER_MS, 70 * NANOS_PER_MS),
            "",
            PredictionState::None,
            50 * NANOS_PER_MS,
        );
        assert!(out.contains("0.00"));
        assert!(out.contains("10.00"));
        assert!(out.contains("20.00"));
    }
}
