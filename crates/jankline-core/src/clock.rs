#![forbid(unsafe_code)]

//! Process-relative monotonic clock.
//!
//! The engine works entirely on caller-supplied nanosecond timestamps; the
//! only place a clock is read internally is the prediction registry's
//! retention stamping. Timestamps are relative to an anchor captured on
//! first use, so they are comparable within a process but carry no meaning
//! across processes.

use std::sync::LazyLock;
use std::time::Instant;

use crate::item::Nanos;

static ANCHOR: LazyLock<Instant> = LazyLock::new(Instant::now);

/// Nanoseconds elapsed since the process-local anchor.
#[must_use]
pub fn monotonic_nanos() -> Nanos {
    let elapsed = ANCHOR.elapsed();
    Nanos::try_from(elapsed.as_nanos()).unwrap_or(Nanos::MAX)
}
