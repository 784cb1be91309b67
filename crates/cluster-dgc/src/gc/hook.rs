//! Strategy objects that parameterize one collection cycle.
//!
//! A hook supplies the root and candidate sets, receives the final garbage
//! set, and ages out the young generation after a full cycle. The pause
//! protocol itself lives in [`GarbageCollector`](crate::GarbageCollector);
//! hooks are only consulted once the cluster is PAUSED.

use std::sync::Arc;

use crate::error::GcError;
use crate::filter::TraversalFilter;
use crate::generation::GenerationMark;
use crate::id::ObjectIdSet;
use crate::metrics::CollectionType;
use crate::pins::ClientPinRegistry;
use crate::port::ObjectAccessPort;

/// Candidates of one cycle, plus the generation position they were read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateSet {
    /// Young or full.
    pub collection_type: CollectionType,
    /// Identifiers eligible for deletion.
    pub ids: ObjectIdSet,
    /// Generation position captured before the ids were read.
    pub mark: GenerationMark,
}

/// Supplies the inputs of a cycle and consumes its output.
pub trait CollectionHook: Send + Sync {
    /// Short name used in logs.
    fn description(&self) -> &str;

    /// Port the mark phase traces through.
    fn port(&self) -> &dyn ObjectAccessPort;

    /// Roots plus every client pin, as one snapshot.
    ///
    /// # Errors
    ///
    /// Fails if any part of the root set cannot be read.
    fn root_ids(&self) -> Result<ObjectIdSet, GcError>;

    /// Candidates for `collection_type`.
    ///
    /// # Errors
    ///
    /// Fails if any part of the candidate set cannot be read.
    fn candidates(&self, collection_type: CollectionType) -> Result<CandidateSet, GcError>;

    /// The hook's own partitioning rule, if it only sees part of the graph.
    ///
    /// A partitioned cycle never deletes anything: references into the
    /// partition from outside it are invisible.
    fn partition_filter(&self) -> Option<&dyn TraversalFilter> {
        None
    }

    /// Delete the garbage of a completed trace.
    ///
    /// # Errors
    ///
    /// Fails if the store rejects the deletion.
    fn delete_garbage(&self, garbage: &ObjectIdSet) -> Result<(), GcError> {
        self.port().delete_all(garbage)
    }

    /// Age out the young generation up to the candidates' mark.
    ///
    /// # Errors
    ///
    /// Fails if the store rejects the mark.
    fn clear_young_generation(&self, candidates: &CandidateSet) -> Result<(), GcError> {
        self.port().clear_young_generation(&candidates.mark)
    }
}

pub(crate) fn read_candidates(
    port: &dyn ObjectAccessPort,
    collection_type: CollectionType,
) -> Result<CandidateSet, GcError> {
    let mark = port.generation_mark()?;
    let ids = match collection_type {
        CollectionType::Young => port.young_ids()?,
        CollectionType::Full => port.all_ids()?,
    };
    Ok(CandidateSet {
        collection_type,
        ids,
        mark,
    })
}

/// Hook over a single object store.
pub struct FullGcHook {
    port: Arc<dyn ObjectAccessPort>,
    pins: Arc<ClientPinRegistry>,
}

impl FullGcHook {
    /// Collect over `port`, treating every pin in `pins` as a root.
    #[must_use]
    pub fn new(port: Arc<dyn ObjectAccessPort>, pins: Arc<ClientPinRegistry>) -> Self {
        Self { port, pins }
    }

    /// The client pin registry contributing roots.
    #[must_use]
    pub const fn pins(&self) -> &Arc<ClientPinRegistry> {
        &self.pins
    }
}

impl CollectionHook for FullGcHook {
    fn description(&self) -> &str {
        "full"
    }

    fn port(&self) -> &dyn ObjectAccessPort {
        self.port.as_ref()
    }

    fn root_ids(&self) -> Result<ObjectIdSet, GcError> {
        let mut roots = self.port.root_ids()?;
        self.pins.add_referenced_ids_to(&mut roots);
        Ok(roots)
    }

    fn candidates(&self, collection_type: CollectionType) -> Result<CandidateSet, GcError> {
        read_candidates(self.port.as_ref(), collection_type)
    }
}
