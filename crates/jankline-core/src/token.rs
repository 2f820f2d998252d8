#![forbid(unsafe_code)]

//! Prediction registry: opaque tokens for predicted frame timelines.
//!
//! Producers ask the vsync predictor for a schedule, register it here, and
//! pass the returned token along with the buffer. When the frame record is
//! created later, the token is resolved back into the stored predictions.
//! Entries are retained only briefly (a frame that takes longer than the
//! retention window to come back is already hopeless for classification),
//! so an absent token is a normal outcome, not an error.
//!
//! Tokens increase strictly monotonically, which makes insertion order
//! equal creation-time order: eviction walks from the oldest entry and
//! stops at the first fresh one, costing O(stale) rather than O(n).

use std::collections::BTreeMap;
use std::sync::Mutex;

use tracing::trace;

use crate::clock::monotonic_nanos;
use crate::item::{NANOS_PER_MS, Nanos, TimelineItem};

/// How long issued predictions are retained before eviction.
pub const DEFAULT_TOKEN_RETENTION: Nanos = 120 * NANOS_PER_MS;

/// Opaque correlation id linking a prediction to a later frame record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameToken(i64);

impl FrameToken {
    /// Reserved sentinel for "no token".
    pub const INVALID: Self = Self(-1);

    /// Construct from a raw value (e.g. received over IPC).
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: i64) -> Self {
        Self(raw)
    }

    /// The raw wire value.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> i64 {
        self.0
    }

    /// Whether this is a real token (not the invalid sentinel).
    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 >= 0
    }
}

#[derive(Debug, Clone, Copy)]
struct PredictionEntry {
    predictions: TimelineItem,
    created_at: Nanos,
}

#[derive(Debug)]
struct RegistryState {
    // Keyed by token; tokens are monotonic, so iteration order is age order.
    entries: BTreeMap<i64, PredictionEntry>,
    next_token: i64,
}

/// Issues tokens for predicted timelines and resolves them while fresh.
///
/// Thread-safe behind its own lock, independent of the timeline
/// coordinator's lock: producers issuing tokens never contend with
/// compositor-thread work.
#[derive(Debug)]
pub struct PredictionRegistry {
    state: Mutex<RegistryState>,
    retention: Nanos,
}

impl PredictionRegistry {
    /// Create a registry with the given retention window.
    #[must_use]
    pub fn new(retention: Nanos) -> Self {
        Self {
            state: Mutex::new(RegistryState {
                entries: BTreeMap::new(),
                next_token: 0,
            }),
            retention,
        }
    }

    /// Store predictions under a fresh token, evicting stale entries.
    pub fn issue(&self, predictions: TimelineItem) -> FrameToken {
        self.issue_at(predictions, monotonic_nanos())
    }

    /// Deterministic variant of [`issue`](Self::issue) for tests.
    pub fn issue_at(&self, predictions: TimelineItem, now: Nanos) -> FrameToken {
        let mut state = self.state.lock().unwrap();
        let token = state.next_token;
        state.next_token += 1;
        state.entries.insert(
            token,
            PredictionEntry {
                predictions,
                created_at: now,
            },
        );
        Self::flush_stale(&mut state, self.retention, now);
        FrameToken(token)
    }

    /// Resolve a token to its stored predictions, if still retained.
    ///
    /// Never evicts; absence means the token expired (or was never issued
    /// by this registry).
    #[must_use]
    pub fn lookup(&self, token: FrameToken) -> Option<TimelineItem> {
        if !token.is_valid() {
            return None;
        }
        let state = self.state.lock().unwrap();
        state.entries.get(&token.raw()).map(|e| e.predictions)
    }

    /// Number of retained predictions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().unwrap().entries.len()
    }

    /// Whether no predictions are retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Evict all entries older than the retention window as of `now`.
    pub fn flush_stale_at(&self, now: Nanos) {
        let mut state = self.state.lock().unwrap();
        Self::flush_stale(&mut state, self.retention, now);
    }

    fn flush_stale(state: &mut RegistryState, retention: Nanos, now: Nanos) {
        // Entries are age-ordered: stop at the first one still fresh.
        let stale: Vec<i64> = state
            .entries
            .iter()
            .take_while(|(_, entry)| now - entry.created_at >= retention)
            .map(|(token, _)| *token)
            .collect();
        if stale.is_empty() {
            return;
        }
        for token in &stale {
            state.entries.remove(token);
        }
        trace!(evicted = stale.len(), "evicted stale predictions");
    }
}

impl Default for PredictionRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_TOKEN_RETENTION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_increase_strictly() {
        let registry = PredictionRegistry::default();
        let a = registry.issue_at(TimelineItem::zeroed(), 0);
        let b = registry.issue_at(TimelineItem::zeroed(), 0);
        let c = registry.issue_at(TimelineItem::zeroed(), 0);
        assert!(a.raw() < b.raw());
        assert!(b.raw() < c.raw());
    }

    #[test]
    fn lookup_returns_stored_predictions() {
        let registry = PredictionRegistry::default();
        let token = registry.issue_at(TimelineItem::new(10, 20, 30), 0);
        assert_eq!(registry.lookup(token), Some(TimelineItem::new(10, 20, 30)));
    }

    #[test]
    fn stale_predictions_are_evicted_on_issue() {
        let registry = PredictionRegistry::default();
        let token1 = registry.issue_at(TimelineItem::zeroed(), 0);
        // Issued one full retention window later: token1 must go.
        let token2 = registry.issue_at(TimelineItem::new(10, 20, 30), DEFAULT_TOKEN_RETENTION);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.lookup(token1), None);
        assert_eq!(registry.lookup(token2), Some(TimelineItem::new(10, 20, 30)));
    }

    #[test]
    fn eviction_stops_at_first_fresh_entry() {
        let registry = PredictionRegistry::new(100);
        let old = registry.issue_at(TimelineItem::zeroed(), 0);
        let fresh = registry.issue_at(TimelineItem::zeroed(), 90);
        registry.flush_stale_at(110);
        assert_eq!(registry.lookup(old), None);
        assert!(registry.lookup(fresh).is_some());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn lookup_never_evicts() {
        let registry = PredictionRegistry::new(100);
        let token = registry.issue_at(TimelineItem::zeroed(), 0);
        // Well past retention, but no issue() since: still resolvable.
        assert!(registry.lookup(token).is_some());
    }

    #[test]
    fn invalid_token_never_resolves() {
        let registry = PredictionRegistry::default();
        registry.issue_at(TimelineItem::zeroed(), 0);
        assert_eq!(registry.lookup(FrameToken::INVALID), None);
    }
}
