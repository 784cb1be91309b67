//! Cycle-level log events.
//!
//! Unlike the span helpers in [`crate::tracing`], these are always present and
//! compile to nothing without the `tracing` feature.

#![cfg_attr(not(feature = "tracing"), allow(unused_variables, clippy::missing_const_for_fn))]

use std::time::Duration;

use crate::error::GcError;
use crate::gc::state::GcState;
use crate::id::ShardId;
use crate::metrics::{CollectionType, GcMetrics};
use crate::tracing::GcId;

/// Log the start of a cycle.
pub fn log_cycle_start(gc_id: GcId, collection_type: CollectionType) {
    #[cfg(feature = "tracing")]
    ::tracing::debug!(gc_id = gc_id.0, collection_type = collection_type.as_str(), "gc_start");
}

/// Log the pipeline drain.
pub fn log_paused(gc_id: GcId, waited: Duration) {
    #[cfg(feature = "tracing")]
    ::tracing::debug!(gc_id = gc_id.0, waited_us = waited.as_micros(), "paused");
}

/// Log a pause that was not reached in time.
pub fn log_pause_timeout(gc_id: GcId, waited: Duration) {
    #[cfg(feature = "tracing")]
    ::tracing::warn!(gc_id = gc_id.0, waited_ms = waited.as_millis(), "pause_timeout");
}

/// Log a cycle that was skipped before tracing.
pub fn log_cycle_skipped(gc_id: GcId, reason: &GcError) {
    #[cfg(feature = "tracing")]
    ::tracing::info!(gc_id = gc_id.0, reason = %reason, "gc_skipped");
}

/// Log a cycle that failed after the pause was reached.
pub fn log_cycle_failed(gc_id: GcId, error: &GcError) {
    #[cfg(feature = "tracing")]
    ::tracing::error!(gc_id = gc_id.0, error = %error, "gc_failed");
}

/// Log a completed cycle.
pub fn log_cycle_complete(metrics: &GcMetrics) {
    #[cfg(feature = "tracing")]
    ::tracing::info!(
        gc_id = metrics.gc_id.0,
        collection_type = metrics.collection_type.as_str(),
        garbage = metrics.objects_reclaimed,
        visited = metrics.objects_visited,
        candidates = metrics.candidates,
        bounded = metrics.bounded,
        duration_us = metrics.duration.as_micros(),
        "gc_complete"
    );
}

/// Log a trace that the filter bounded.
pub fn log_bounded_trace(pruned: usize) {
    #[cfg(feature = "tracing")]
    ::tracing::debug!(pruned, "bounded_trace");
}

/// Log a shard that failed to answer.
pub fn log_shard_failure(shard: ShardId, error: &GcError) {
    #[cfg(feature = "tracing")]
    ::tracing::warn!(shard = shard.0, error = %error, "shard_failure");
}

/// Log a state-machine call that was ignored.
pub fn log_invalid_transition(operation: &str, state: GcState) {
    #[cfg(feature = "tracing")]
    ::tracing::warn!(operation, state = %state, "invalid_transition");
}

/// Log a failure to age out the young generation after a full cycle.
pub fn log_young_clear_failed(error: &GcError) {
    #[cfg(feature = "tracing")]
    ::tracing::warn!(error = %error, "young_clear_failed");
}

/// Log a scheduler lifecycle event.
pub fn log_scheduler(event: &str) {
    #[cfg(feature = "tracing")]
    ::tracing::debug!(event, "scheduler");
}

/// Log a scheduled cycle that panicked. The scheduler keeps running.
pub fn log_scheduled_cycle_panicked(collection_type: CollectionType) {
    #[cfg(feature = "tracing")]
    ::tracing::error!(
        collection_type = collection_type.as_str(),
        "scheduled_cycle_panicked"
    );
}
