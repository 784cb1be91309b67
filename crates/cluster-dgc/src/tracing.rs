//! GC tracing support.
//!
//! When the `tracing` feature is enabled, this module provides structured
//! tracing spans and events for collection cycles and for the ports the
//! collector drives. Without the feature every helper compiles to a no-op,
//! so call sites never need `cfg` attributes.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Stable identifier for one collection cycle.
///
/// Correlates the spans, metrics and listener callbacks of a single cycle.
/// Monotonically increasing, starting at 1.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GcId(pub u64);

impl fmt::Display for GcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gc#{}", self.0)
    }
}

/// Generator of [`GcId`]s for one collector.
#[derive(Debug)]
pub struct GcIdCounter(AtomicU64);

impl Default for GcIdCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl GcIdCounter {
    /// Start counting at 1.
    #[must_use]
    pub const fn new() -> Self {
        Self(AtomicU64::new(1))
    }

    /// Allocate the next id.
    pub fn next_id(&self) -> GcId {
        GcId(self.0.fetch_add(1, Ordering::Relaxed))
    }

    /// Number of ids handed out so far.
    #[must_use]
    pub fn issued(&self) -> u64 {
        self.0.load(Ordering::Relaxed) - 1
    }
}

/// Phases of one collection cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcPhase {
    /// Waiting for the transaction pipeline to drain.
    Pause,
    /// Gathering roots, pins and candidates.
    Assemble,
    /// Tracing the reference graph.
    Mark,
    /// Handing the garbage set back to the store.
    Delete,
}

#[cfg(feature = "tracing")]
pub(crate) mod internal {
    use ::tracing::{span, Level};

    use super::{GcId, GcPhase};
    use crate::id::{ClientId, ObjectId};

    /// Create a span for an entire collection cycle.
    pub fn trace_gc_collection(collection_type: &str, gc_id: GcId) -> span::EnteredSpan {
        span!(
            Level::DEBUG,
            "gc_collect",
            collection_type = collection_type,
            gc_id = gc_id.0
        )
        .entered()
    }

    /// Create a span for one phase of a cycle.
    pub fn trace_phase(phase: GcPhase) -> span::EnteredSpan {
        span!(Level::DEBUG, "gc_phase", phase = ?phase).entered()
    }

    /// Log the start of a phase.
    pub fn log_phase_start(phase: GcPhase, items: usize) {
        ::tracing::debug!(phase = ?phase, items, "phase_start");
    }

    /// Log the end of a phase.
    pub fn log_phase_end(phase: GcPhase, items: usize) {
        ::tracing::debug!(phase = ?phase, items, "phase_end");
    }

    /// A traced identifier was already gone from the store.
    pub fn log_lookup_missing(id: ObjectId) {
        ::tracing::debug!(object = %id, "lookup_missing");
    }

    /// Lookups and releases of a cycle did not balance.
    pub fn log_lookup_imbalance(lookups: usize, releases: usize) {
        ::tracing::error!(lookups, releases, "lookup_release_imbalance");
    }

    /// The store received a release for an object it never handed out.
    pub fn log_unmatched_release(id: ObjectId) {
        ::tracing::error!(object = %id, "unmatched_release");
    }

    /// A pin arrived for a client that is not connected.
    pub fn log_pin_for_unknown_client(client: ClientId, id: ObjectId) {
        ::tracing::debug!(client = %client, object = %id, "pin_for_unknown_client");
    }

    /// A client and its pins were removed.
    pub fn log_client_removed(client: ClientId, reason: &str, pins: usize) {
        ::tracing::debug!(client = %client, reason, pins, "client_removed");
    }
}

#[cfg(not(feature = "tracing"))]
#[allow(clippy::missing_const_for_fn)]
pub(crate) mod internal {
    use super::{GcId, GcPhase};
    use crate::id::{ClientId, ObjectId};

    pub fn trace_gc_collection(_collection_type: &str, _gc_id: GcId) {}

    pub fn trace_phase(_phase: GcPhase) {}

    pub fn log_phase_start(_phase: GcPhase, _items: usize) {}

    pub fn log_phase_end(_phase: GcPhase, _items: usize) {}

    pub fn log_lookup_missing(_id: ObjectId) {}

    pub fn log_lookup_imbalance(_lookups: usize, _releases: usize) {}

    pub fn log_unmatched_release(_id: ObjectId) {}

    pub fn log_pin_for_unknown_client(_client: ClientId, _id: ObjectId) {}

    pub fn log_client_removed(_client: ClientId, _reason: &str, _pins: usize) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gc_ids_are_monotonic() {
        let counter = GcIdCounter::new();
        assert_eq!(counter.issued(), 0);
        let first = counter.next_id();
        let second = counter.next_id();
        assert_eq!(first, GcId(1));
        assert!(second > first);
        assert_eq!(counter.issued(), 2);
        assert_eq!(second.to_string(), "gc#2");
    }
}
