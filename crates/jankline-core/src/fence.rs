#![forbid(unsafe_code)]

//! Present fences: polled, never awaited.
//!
//! A fence stands in for an external synchronization primitive that signals
//! once the display has actually shown a frame. The timeline coordinator
//! only ever polls ([`PresentFence::poll`] is non-blocking); unsignaled
//! fences are retried on the next present submission.

use std::sync::Mutex;

use crate::item::Nanos;

/// Result of polling a fence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceSignal {
    /// Not signaled yet; try again later.
    Pending,
    /// The fence can never signal (e.g. the backing handle was bad).
    Invalid,
    /// Signaled at the given timestamp.
    SignaledAt(Nanos),
}

/// A one-shot presentation fence.
///
/// Transitions once from pending to signaled or invalid; later transitions
/// are ignored so the first observed outcome is authoritative.
#[derive(Debug)]
pub struct PresentFence {
    state: Mutex<FenceSignal>,
}

impl PresentFence {
    /// A fence that has not signaled yet.
    #[must_use]
    pub fn unsignaled() -> Self {
        Self {
            state: Mutex::new(FenceSignal::Pending),
        }
    }

    /// A fence that already signaled at `time`.
    #[must_use]
    pub fn signaled(time: Nanos) -> Self {
        Self {
            state: Mutex::new(FenceSignal::SignaledAt(time)),
        }
    }

    /// A fence that can never signal.
    #[must_use]
    pub fn invalid() -> Self {
        Self {
            state: Mutex::new(FenceSignal::Invalid),
        }
    }

    /// Mark the fence signaled at `time`. No-op unless pending.
    pub fn signal(&self, time: Nanos) {
        let mut state = self.state.lock().unwrap();
        if *state == FenceSignal::Pending {
            *state = FenceSignal::SignaledAt(time);
        }
    }

    /// Mark the fence as unable to ever signal. No-op unless pending.
    pub fn invalidate(&self) {
        let mut state = self.state.lock().unwrap();
        if *state == FenceSignal::Pending {
            *state = FenceSignal::Invalid;
        }
    }

    /// Current fence state; never blocks.
    #[must_use]
    pub fn poll(&self) -> FenceSignal {
        *self.state.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fence_transitions_once() {
        let fence = PresentFence::unsignaled();
        assert_eq!(fence.poll(), FenceSignal::Pending);
        fence.signal(42);
        assert_eq!(fence.poll(), FenceSignal::SignaledAt(42));
        // Later transitions are ignored.
        fence.signal(99);
        fence.invalidate();
        assert_eq!(fence.poll(), FenceSignal::SignaledAt(42));
    }

    #[test]
    fn invalid_fence_stays_invalid() {
        let fence = PresentFence::invalid();
        fence.signal(42);
        assert_eq!(fence.poll(), FenceSignal::Invalid);
    }

    #[test]
    fn presignaled_fence_reports_time() {
        let fence = PresentFence::signaled(7);
        assert_eq!(fence.poll(), FenceSignal::SignaledAt(7));
    }
}
