//! Error taxonomy for collection cycles.

use std::time::Duration;

use thiserror::Error;

use crate::gc::state::GcState;
use crate::id::{ObjectId, ShardId};

/// Errors raised by the collector and by the ports it consumes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GcError {
    /// The identifier is unknown to the store. During tracing this is a
    /// transient miss (the object was already collected), not a failure.
    #[error("{0} not found")]
    NotFound(ObjectId),

    /// The backing store could not serve the request.
    #[error("object store unavailable: {0}")]
    StoreUnavailable(String),

    /// One shard of an active-active topology failed to answer.
    #[error("{shard} unavailable: {reason}")]
    ShardUnavailable {
        /// The failing shard.
        shard: ShardId,
        /// Underlying failure.
        reason: String,
    },

    /// The transaction pipeline did not drain within the configured bound.
    #[error("pause not reached within {waited:?}")]
    PauseTimeout {
        /// How long the collector waited.
        waited: Duration,
    },

    /// The pause was abandoned while a cycle was waiting for it.
    #[error("pause cancelled before the collector reached PAUSED")]
    PauseCancelled,

    /// Another cycle already owns the pause.
    #[error("a collection cycle is already in progress")]
    CycleInProgress,

    /// Collection has been disabled administratively.
    #[error("garbage collection is disabled")]
    Disabled,

    /// `do_gc` was called before `start`.
    #[error("garbage collector has not been started")]
    NotStarted,

    /// A young-generation cycle was requested but young-gen collection is off.
    #[error("young generation collection is disabled")]
    YoungGenerationDisabled,

    /// An operation was attempted in the wrong state.
    #[error("invalid collector state: expected {expected}, found {found}")]
    InvalidState {
        /// State the operation requires.
        expected: GcState,
        /// State the collector was actually in.
        found: GcState,
    },

    /// The cycle unwound out of the trace or the deletion. The pause was
    /// still released.
    #[error("collection cycle panicked")]
    CyclePanicked,

    /// Lookups and releases did not balance for a cycle.
    #[error("lookup/release imbalance: {lookups} lookups, {releases} releases")]
    LookupImbalance {
        /// Successful lookups performed.
        lookups: usize,
        /// Releases performed.
        releases: usize,
    },

    /// A configuration value was rejected.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The periodic scheduler thread could not be spawned.
    #[error("failed to spawn scheduler thread: {0}")]
    SchedulerSpawn(String),
}

impl GcError {
    /// Returns `true` for the transient [`GcError::NotFound`] miss.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
