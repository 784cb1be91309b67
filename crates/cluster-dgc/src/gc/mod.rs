//! Garbage collection coordination.
//!
//! This module provides the collection machinery proper:
//! - the pause state machine and the transaction gate it drives
//! - the mark-and-sweep engine
//! - collection hooks for a single store and for a sharded topology
//! - the [`GarbageCollector`] facade and its scheduler

pub mod active_active;
pub mod collector;
pub mod gate;
pub mod hook;
pub mod mark_sweep;
pub mod state;
pub(crate) mod tracing;

pub use active_active::{ActiveActiveGcHook, PartitionFilter, ShardRouter};
pub use collector::{GarbageCollector, GcResult};
pub use gate::{ImmediateDrain, InFlightGate, Transaction, TransactionGate};
pub use hook::{CandidateSet, CollectionHook, FullGcHook};
pub use mark_sweep::{MarkAndSweep, MarkResult};
pub use state::{GcState, GcStateMachine, ReadyNotifier};
