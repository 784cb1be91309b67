//! The narrow fault-in/release interface the collector consumes.
//!
//! The object store owns every managed object. The collector only ever asks
//! for an object's outbound references and hands the object straight back.
//! [`LookupGuard`] makes that hand-back structural: the release happens in
//! `Drop`, so it runs on every path, including early returns and unwinding.

use std::cell::Cell;

use crate::error::GcError;
use crate::generation::GenerationMark;
use crate::id::{ObjectId, ObjectIdSet};

/// Access to the externally owned object store.
///
/// Implementations must be safe to call from the collector thread while
/// client connections and transactions run on other threads. Blocking I/O is
/// allowed; bounding it is the implementation's responsibility.
pub trait ObjectAccessPort: Send + Sync {
    /// Fault the object in and return its outbound references.
    ///
    /// # Errors
    ///
    /// [`GcError::NotFound`] if the identifier is unknown. Any other error is
    /// treated as a store failure and aborts the cycle.
    fn lookup_references(&self, id: ObjectId) -> Result<Vec<ObjectId>, GcError>;

    /// Hand back an object obtained from [`lookup_references`].
    ///
    /// Called exactly once per successful lookup. Must not fail.
    ///
    /// [`lookup_references`]: ObjectAccessPort::lookup_references
    fn release(&self, id: ObjectId);

    /// Identifiers of every named root.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn root_ids(&self) -> Result<ObjectIdSet, GcError>;

    /// Every identifier known to the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn all_ids(&self) -> Result<ObjectIdSet, GcError>;

    /// Identifiers created or mutated since the last full collection.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn young_ids(&self) -> Result<ObjectIdSet, GcError>;

    /// Capture the current generation position.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn generation_mark(&self) -> Result<GenerationMark, GcError>;

    /// Age out every young record up to `mark`.
    ///
    /// # Errors
    ///
    /// Returns an error if the mark does not belong to this port or the
    /// store cannot be written.
    fn clear_young_generation(&self, mark: &GenerationMark) -> Result<(), GcError>;

    /// Bind `name` to `id` in the root set.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    fn create_root(&self, name: &str, id: ObjectId) -> Result<(), GcError>;

    /// Create a managed object with the given outbound references.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    fn create_object(&self, id: ObjectId, references: Vec<ObjectId>) -> Result<(), GcError>;

    /// Evict the object from the store's cache.
    fn evict(&self, id: ObjectId);

    /// Delete every object in `garbage`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    fn delete_all(&self, garbage: &ObjectIdSet) -> Result<(), GcError>;
}

/// Per-cycle count of lookups and releases.
///
/// Owned by one trace on one thread.
#[derive(Debug, Default)]
pub struct LookupLedger {
    lookups: Cell<usize>,
    releases: Cell<usize>,
}

impl LookupLedger {
    /// Create an empty ledger.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            lookups: Cell::new(0),
            releases: Cell::new(0),
        }
    }

    /// Successful lookups so far.
    #[must_use]
    pub fn lookups(&self) -> usize {
        self.lookups.get()
    }

    /// Releases so far.
    #[must_use]
    pub fn releases(&self) -> usize {
        self.releases.get()
    }

    /// Check that every lookup has been released.
    ///
    /// # Errors
    ///
    /// [`GcError::LookupImbalance`] if the counts differ.
    pub fn verify(&self) -> Result<(), GcError> {
        let (lookups, releases) = (self.lookups(), self.releases());
        if lookups == releases {
            Ok(())
        } else {
            crate::tracing::internal::log_lookup_imbalance(lookups, releases);
            Err(GcError::LookupImbalance { lookups, releases })
        }
    }
}

/// A faulted-in object. Releases the object when dropped.
#[must_use = "dropping the guard releases the object immediately"]
pub struct LookupGuard<'a> {
    port: &'a dyn ObjectAccessPort,
    ledger: &'a LookupLedger,
    id: ObjectId,
    references: Vec<ObjectId>,
}

impl<'a> LookupGuard<'a> {
    /// Fault `id` in through `port`.
    ///
    /// # Errors
    ///
    /// Whatever [`ObjectAccessPort::lookup_references`] returns. No release
    /// is owed for a failed lookup.
    pub fn acquire(
        port: &'a dyn ObjectAccessPort,
        ledger: &'a LookupLedger,
        id: ObjectId,
    ) -> Result<Self, GcError> {
        let references = port.lookup_references(id)?;
        ledger.lookups.set(ledger.lookups.get() + 1);
        Ok(Self {
            port,
            ledger,
            id,
            references,
        })
    }

    /// The object this guard holds.
    #[must_use]
    pub const fn id(&self) -> ObjectId {
        self.id
    }

    /// Outbound references of the object.
    #[must_use]
    pub fn references(&self) -> &[ObjectId] {
        &self.references
    }
}

impl Drop for LookupGuard<'_> {
    fn drop(&mut self) {
        self.port.release(self.id);
        self.ledger.releases.set(self.ledger.releases.get() + 1);
    }
}
