//! The tracing algorithm.
//!
//! One call to [`MarkAndSweep::collect`] is one deterministic breadth-first
//! trace from a root set through an [`ObjectAccessPort`], followed by the
//! sweep difference `candidates - visited`.
//!
//! Objects are never held across iterations: each one is faulted in through
//! a [`LookupGuard`], its references are queued, and the guard is dropped
//! before the next identifier is popped. At most one object is checked out
//! at any time, and every lookup is paired with exactly one release even if
//! the filter panics.

use std::collections::VecDeque;

use rustc_hash::FxHashSet;

use crate::error::GcError;
use crate::filter::TraversalFilter;
use crate::gc::tracing::log_bounded_trace;
use crate::id::{ObjectId, ObjectIdSet};
use crate::port::{LookupGuard, LookupLedger, ObjectAccessPort};
use crate::tracing::internal::{log_lookup_missing, log_phase_end, log_phase_start};
use crate::tracing::GcPhase;

/// Result of one trace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarkResult {
    /// Candidates found unreachable. Empty for a bounded trace.
    pub garbage: ObjectIdSet,
    /// Every identifier the trace reached, including missing ones.
    pub visited: ObjectIdSet,
    /// Reached identifiers the store no longer knows.
    pub missing: ObjectIdSet,
    /// Referenced identifiers the filter rejected and the trace never reached.
    pub pruned: ObjectIdSet,
    /// Successful lookups (equal to releases).
    pub lookups: usize,
}

impl MarkResult {
    /// A bounded trace pruned part of the graph, so unvisited candidates may
    /// still be live. It must not be used to delete anything.
    #[must_use]
    pub fn is_bounded(&self) -> bool {
        !self.pruned.is_empty()
    }
}

/// Mark-and-sweep over one port with one filter.
pub struct MarkAndSweep<'a> {
    port: &'a dyn ObjectAccessPort,
    filter: &'a dyn TraversalFilter,
}

impl<'a> MarkAndSweep<'a> {
    /// Trace through `port`, following only references `filter` accepts.
    #[must_use]
    pub const fn new(port: &'a dyn ObjectAccessPort, filter: &'a dyn TraversalFilter) -> Self {
        Self { port, filter }
    }

    /// Trace from `roots` and return the unreachable members of `candidates`.
    ///
    /// Roots are always traced; the filter only applies to references.
    /// A `NotFound` lookup marks the identifier missing: it stays visited, so
    /// it is never reported as garbage twice.
    ///
    /// # Errors
    ///
    /// Any lookup error other than `NotFound` aborts the trace after the
    /// current object has been released. [`GcError::LookupImbalance`] if the
    /// lookups and releases of the trace do not match.
    pub fn collect(
        &self,
        roots: &ObjectIdSet,
        candidates: &ObjectIdSet,
    ) -> Result<MarkResult, GcError> {
        log_phase_start(GcPhase::Mark, roots.len());

        let ledger = LookupLedger::new();
        let mut visited: FxHashSet<ObjectId> = FxHashSet::default();
        let mut missing = ObjectIdSet::new();
        let mut pruned = ObjectIdSet::new();
        let mut queue: VecDeque<ObjectId> = roots.iter().copied().collect();

        while let Some(id) = queue.pop_front() {
            if id.is_null() || !visited.insert(id) {
                continue;
            }

            let guard = match LookupGuard::acquire(self.port, &ledger, id) {
                Ok(guard) => guard,
                Err(GcError::NotFound(_)) => {
                    log_lookup_missing(id);
                    missing.insert(id);
                    continue;
                }
                Err(err) => return Err(err),
            };

            for &reference in guard.references() {
                if reference.is_null() || visited.contains(&reference) {
                    continue;
                }
                if self.filter.should_visit(reference) {
                    queue.push_back(reference);
                } else {
                    pruned.insert(reference);
                }
            }
            drop(guard);
        }

        ledger.verify()?;

        pruned.retain(|id| !visited.contains(id));
        let visited: ObjectIdSet = visited.into_iter().collect();
        let garbage = if pruned.is_empty() {
            candidates.difference(&visited).copied().collect()
        } else {
            log_bounded_trace(pruned.len());
            ObjectIdSet::new()
        };

        log_phase_end(GcPhase::Mark, visited.len());
        Ok(MarkResult {
            garbage,
            visited,
            missing,
            pruned,
            lookups: ledger.lookups(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{AcceptAll, ExcludeFilter};
    use crate::memory::InMemoryObjectStore;

    fn id(raw: u64) -> ObjectId {
        ObjectId::new(raw)
    }

    fn set(ids: &[u64]) -> ObjectIdSet {
        ids.iter().copied().map(ObjectId::new).collect()
    }

    #[test]
    fn test_unreferenced_objects_are_garbage() {
        let store = InMemoryObjectStore::new();
        store.insert(id(1), vec![id(2)]);
        store.insert(id(2), Vec::new());
        store.insert(id(3), Vec::new());

        let result = MarkAndSweep::new(&store, &AcceptAll)
            .collect(&set(&[1]), &set(&[1, 2, 3]))
            .unwrap();
        assert_eq!(result.garbage, set(&[3]));
        assert_eq!(result.visited, set(&[1, 2]));
        assert_eq!(result.lookups, 2);
        assert!(!result.is_bounded());
    }

    #[test]
    fn test_duplicate_references_are_looked_up_once() {
        let store = InMemoryObjectStore::new().recording();
        store.insert(id(1), vec![id(2), id(2), ObjectId::NULL, id(1)]);
        store.insert(id(2), vec![id(1)]);

        let result = MarkAndSweep::new(&store, &AcceptAll)
            .collect(&set(&[1]), &set(&[1, 2]))
            .unwrap();
        assert!(result.garbage.is_empty());
        assert_eq!(store.lookups(), vec![id(1), id(2)]);
        assert_eq!(store.outstanding_lookups(), 0);
    }

    #[test]
    fn test_missing_objects_are_not_garbage() {
        let store = InMemoryObjectStore::new();
        store.insert(id(1), vec![id(7)]);

        let result = MarkAndSweep::new(&store, &AcceptAll)
            .collect(&set(&[1]), &set(&[1, 7]))
            .unwrap();
        assert!(result.garbage.is_empty());
        assert_eq!(result.missing, set(&[7]));
    }

    #[test]
    fn test_store_failure_aborts_after_release() {
        let store = InMemoryObjectStore::new();
        store.insert(id(1), Vec::new());
        store.set_available(false);

        let err = MarkAndSweep::new(&store, &AcceptAll)
            .collect(&set(&[1]), &set(&[1]))
            .unwrap_err();
        assert!(matches!(err, GcError::StoreUnavailable(_)));
        assert_eq!(store.outstanding_lookups(), 0);
    }

    #[test]
    fn test_pruned_trace_is_bounded() {
        let store = InMemoryObjectStore::new();
        store.insert(id(1), vec![id(2)]);
        store.insert(id(2), vec![id(3)]);
        store.insert(id(3), Vec::new());
        store.insert(id(4), Vec::new());

        let filter = ExcludeFilter::new(set(&[2]));
        let result = MarkAndSweep::new(&store, &filter)
            .collect(&set(&[1]), &set(&[1, 2, 3, 4]))
            .unwrap();
        assert!(result.is_bounded());
        assert!(result.garbage.is_empty());
        assert_eq!(result.visited, set(&[1]));
        assert_eq!(result.pruned, set(&[2]));
    }

    #[test]
    fn test_pruned_but_otherwise_reached_is_not_bounded() {
        let store = InMemoryObjectStore::new();
        store.insert(id(1), vec![id(2)]);
        store.insert(id(2), Vec::new());
        store.insert(id(3), Vec::new());

        let filter = ExcludeFilter::new(set(&[2]));
        let result = MarkAndSweep::new(&store, &filter)
            .collect(&set(&[1, 2]), &set(&[1, 2, 3]))
            .unwrap();
        assert!(!result.is_bounded());
        assert_eq!(result.garbage, set(&[3]));
    }
}
