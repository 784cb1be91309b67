//! Predicates deciding which references a trace follows.

use crate::id::{ObjectId, ObjectIdSet};

/// Decides whether a referenced object is traced.
///
/// Returning `false` prunes that identifier and everything reachable only
/// through it, for the current cycle only.
pub trait TraversalFilter: Send + Sync {
    /// Should the trace follow a reference to `id`?
    fn should_visit(&self, id: ObjectId) -> bool;
}

/// Follows every reference.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl TraversalFilter for AcceptAll {
    fn should_visit(&self, _id: ObjectId) -> bool {
        true
    }
}

/// Follows every reference except those in a fixed set.
#[derive(Debug, Clone, Default)]
pub struct ExcludeFilter {
    excluded: ObjectIdSet,
}

impl ExcludeFilter {
    /// Prune references to any identifier in `excluded`.
    #[must_use]
    pub const fn new(excluded: ObjectIdSet) -> Self {
        Self { excluded }
    }
}

impl TraversalFilter for ExcludeFilter {
    fn should_visit(&self, id: ObjectId) -> bool {
        !self.excluded.contains(&id)
    }
}

/// Follows only references to identifiers in a fixed set.
#[derive(Debug, Clone, Default)]
pub struct SelectiveFilter {
    selected: ObjectIdSet,
}

impl SelectiveFilter {
    /// Follow only references into `selected`.
    #[must_use]
    pub const fn new(selected: ObjectIdSet) -> Self {
        Self { selected }
    }
}

impl TraversalFilter for SelectiveFilter {
    fn should_visit(&self, id: ObjectId) -> bool {
        self.selected.contains(&id)
    }
}

impl<F> TraversalFilter for F
where
    F: Fn(ObjectId) -> bool + Send + Sync,
{
    fn should_visit(&self, id: ObjectId) -> bool {
        self(id)
    }
}
