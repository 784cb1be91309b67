//! A distributed mark-and-sweep garbage collector for a clustered object server.
//!
//! `cluster-dgc` traces a reference graph whose nodes live in an external
//! object store. Objects are faulted in one at a time through an
//! [`ObjectAccessPort`] and handed straight back, so the collector never holds
//! more than one object. Before tracing, the collector drives the cluster to
//! a safe point through an explicit pause state machine, and afterwards it
//! hands the garbage set back to the store for deletion.
//!
//! # Features
//!
//! - **Balanced lookups**: every lookup is released by a scoped guard, even on
//!   error paths, and each cycle verifies the count
//! - **Young and full cycles**: young cycles restrict only the sweep, never the
//!   trace, so old-to-young references stay sound
//! - **Bounded pauses**: waiting for the transaction pipeline to drain has a
//!   deadline; a timed-out cycle is skipped and transactions resume
//! - **Active-active**: a [`ShardRouter`] federates several stores behind one
//!   port so tracing follows cross-shard references transparently
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use cluster_dgc::{
//!     ClientPinRegistry, FullGcHook, GarbageCollector, GcConfig, ImmediateDrain,
//!     InMemoryObjectStore, ObjectAccessPort, ObjectId,
//! };
//!
//! let store = Arc::new(InMemoryObjectStore::new());
//! store.insert(ObjectId::new(1), vec![ObjectId::new(2)]);
//! store.insert(ObjectId::new(2), Vec::new());
//! store.insert(ObjectId::new(3), Vec::new());
//! store.create_root("app", ObjectId::new(1)).unwrap();
//!
//! let hook = FullGcHook::new(store.clone(), Arc::new(ClientPinRegistry::new()));
//! let gc = Arc::new(
//!     GarbageCollector::new(hook, Arc::new(ImmediateDrain), GcConfig::default()).unwrap(),
//! );
//! gc.start().unwrap();
//!
//! let result = gc.gc().unwrap();
//! assert_eq!(result.garbage_count(), 1);
//! assert!(!store.contains(ObjectId::new(3)));
//! ```
//!
//! # Pause protocol
//!
//! ```text
//! IDLE ─request_pause─▶ PAUSE_REQUESTED ─notify_ready_to_gc─▶ PAUSED ─collect─▶ COLLECTING
//!  ▲                                                                                │
//!  └─────────────────────────── cycle ends, panics included ───────────────────────┘
//! ```
//!
//! The transaction pipeline takes part through [`TransactionGate`]: it is told
//! when a pause is requested, reports back through a [`ReadyNotifier`] once
//! drained, and is told when to resume.
//!
//! # Feature flags
//!
//! - `tracing` (default): structured spans and events via the `tracing` crate
//! - `tokio`: [`tokio::spawn_periodic`] for scheduling cycles on a runtime

#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
mod error;
pub mod events;
pub mod filter;
pub mod gc;
pub mod generation;
mod id;
pub mod memory;
pub mod metrics;
pub mod pins;
pub mod port;
pub mod tracing;

#[cfg(feature = "tokio")]
pub mod tokio;

// Re-export public API
pub use config::GcConfig;
pub use error::GcError;
#[cfg(feature = "tracing")]
pub use events::LoggingListener;
pub use events::{EventPublisher, GcEventListener};
pub use filter::{AcceptAll, ExcludeFilter, SelectiveFilter, TraversalFilter};
pub use gc::{
    ActiveActiveGcHook, CandidateSet, CollectionHook, FullGcHook, GarbageCollector, GcResult,
    GcState, ImmediateDrain, InFlightGate, MarkAndSweep, MarkResult, PartitionFilter,
    ReadyNotifier, ShardRouter, Transaction, TransactionGate,
};
pub use generation::{Epoch, GenerationLog, GenerationMark};
pub use id::{ClientId, ObjectId, ObjectIdSet, ShardId};
pub use memory::InMemoryObjectStore;
pub use metrics::{CollectionType, CollectorStats, GcHistory, GcMetrics};
pub use pins::ClientPinRegistry;
pub use port::{LookupGuard, LookupLedger, ObjectAccessPort};
pub use tracing::{GcId, GcPhase};
