//! An in-process [`ObjectAccessPort`] backed by ordered maps.
//!
//! Serves as the store for single-process deployments and tests, and as the
//! per-shard store when wiring an active-active topology in one process.
//! Outstanding lookups are always counted so callers can verify that a
//! cycle kept lookups and releases balanced. The full call history is kept
//! only by stores built with [`InMemoryObjectStore::recording`].

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;

use crate::error::GcError;
use crate::generation::{GenerationLog, GenerationMark};
use crate::id::{ObjectId, ObjectIdSet};
use crate::port::ObjectAccessPort;

#[derive(Debug, Default)]
struct StoreState {
    objects: BTreeMap<ObjectId, Vec<ObjectId>>,
    roots: BTreeMap<String, ObjectId>,
}

#[derive(Debug, Default)]
struct CallLog {
    lookups: Vec<ObjectId>,
    releases: Vec<ObjectId>,
    checked_out: FxHashMap<ObjectId, usize>,
    unmatched_releases: usize,
}

/// Ordered in-memory object store.
#[derive(Debug)]
pub struct InMemoryObjectStore {
    label: String,
    state: RwLock<StoreState>,
    generation: GenerationLog,
    calls: Mutex<CallLog>,
    record_calls: bool,
    available: AtomicBool,
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryObjectStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::with_label("memory")
    }

    /// Create an empty store whose failures mention `label`.
    #[must_use]
    pub fn with_label(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            state: RwLock::new(StoreState::default()),
            generation: GenerationLog::new(),
            calls: Mutex::new(CallLog::default()),
            record_calls: false,
            available: AtomicBool::new(true),
        }
    }

    /// Keep every lookup and release in call order, for
    /// [`lookups`](Self::lookups) and [`releases`](Self::releases).
    ///
    /// The history grows with every traced object until
    /// [`clear_call_log`](Self::clear_call_log) is called.
    #[must_use]
    pub fn recording(mut self) -> Self {
        self.record_calls = true;
        self
    }

    /// Insert (or overwrite) an object. Recorded as young.
    pub fn insert(&self, id: ObjectId, references: Vec<ObjectId>) {
        self.state.write().objects.insert(id, references);
        self.generation.record(id);
    }

    /// Replace the references of an existing object. Recorded as young.
    ///
    /// # Errors
    ///
    /// [`GcError::NotFound`] if the object does not exist.
    pub fn set_references(&self, id: ObjectId, references: Vec<ObjectId>) -> Result<(), GcError> {
        let mut state = self.state.write();
        let slot = state.objects.get_mut(&id).ok_or(GcError::NotFound(id))?;
        *slot = references;
        drop(state);
        self.generation.record(id);
        Ok(())
    }

    /// Append one reference to an existing object. Recorded as young.
    ///
    /// # Errors
    ///
    /// [`GcError::NotFound`] if the object does not exist.
    pub fn add_reference(&self, id: ObjectId, target: ObjectId) -> Result<(), GcError> {
        let mut state = self.state.write();
        state
            .objects
            .get_mut(&id)
            .ok_or(GcError::NotFound(id))?
            .push(target);
        drop(state);
        self.generation.record(id);
        Ok(())
    }

    /// Remove a named root. Returns the identifier it pointed at.
    pub fn remove_root(&self, name: &str) -> Option<ObjectId> {
        self.state.write().roots.remove(name)
    }

    /// Returns `true` if the object exists.
    #[must_use]
    pub fn contains(&self, id: ObjectId) -> bool {
        self.state.read().objects.contains_key(&id)
    }

    /// Number of stored objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().objects.len()
    }

    /// Returns `true` if the store holds no objects.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.read().objects.is_empty()
    }

    /// Returns `true` if the object is in the young generation.
    #[must_use]
    pub fn is_young(&self, id: ObjectId) -> bool {
        self.generation.is_young(id)
    }

    /// Simulate the store becoming (un)reachable.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Release);
    }

    /// Every successful lookup, in call order. Empty unless recording.
    #[must_use]
    pub fn lookups(&self) -> Vec<ObjectId> {
        self.calls.lock().lookups.clone()
    }

    /// Every release, in call order. Empty unless recording.
    #[must_use]
    pub fn releases(&self) -> Vec<ObjectId> {
        self.calls.lock().releases.clone()
    }

    /// Lookups not yet released.
    #[must_use]
    pub fn outstanding_lookups(&self) -> usize {
        self.calls.lock().checked_out.values().sum()
    }

    /// Releases that had no matching lookup.
    #[must_use]
    pub fn unmatched_releases(&self) -> usize {
        self.calls.lock().unmatched_releases
    }

    /// Forget the recorded lookup and release history.
    pub fn clear_call_log(&self) {
        let mut calls = self.calls.lock();
        calls.lookups.clear();
        calls.releases.clear();
    }

    fn ensure_available(&self) -> Result<(), GcError> {
        if self.available.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(GcError::StoreUnavailable(self.label.clone()))
        }
    }
}

impl ObjectAccessPort for InMemoryObjectStore {
    fn lookup_references(&self, id: ObjectId) -> Result<Vec<ObjectId>, GcError> {
        self.ensure_available()?;
        let references = self
            .state
            .read()
            .objects
            .get(&id)
            .cloned()
            .ok_or(GcError::NotFound(id))?;

        let mut calls = self.calls.lock();
        if self.record_calls {
            calls.lookups.push(id);
        }
        *calls.checked_out.entry(id).or_insert(0) += 1;
        Ok(references)
    }

    fn release(&self, id: ObjectId) {
        let mut calls = self.calls.lock();
        if self.record_calls {
            calls.releases.push(id);
        }
        match calls.checked_out.get_mut(&id) {
            Some(count) if *count > 1 => *count -= 1,
            Some(_) => {
                calls.checked_out.remove(&id);
            }
            None => {
                calls.unmatched_releases += 1;
                crate::tracing::internal::log_unmatched_release(id);
            }
        }
    }

    fn root_ids(&self) -> Result<ObjectIdSet, GcError> {
        self.ensure_available()?;
        Ok(self.state.read().roots.values().copied().collect())
    }

    fn all_ids(&self) -> Result<ObjectIdSet, GcError> {
        self.ensure_available()?;
        Ok(self.state.read().objects.keys().copied().collect())
    }

    fn young_ids(&self) -> Result<ObjectIdSet, GcError> {
        self.ensure_available()?;
        let young = self.generation.young_ids();
        let state = self.state.read();
        Ok(young
            .into_iter()
            .filter(|id| state.objects.contains_key(id))
            .collect())
    }

    fn generation_mark(&self) -> Result<GenerationMark, GcError> {
        self.ensure_available()?;
        Ok(GenerationMark::single(self.generation.current_epoch()))
    }

    fn clear_young_generation(&self, mark: &GenerationMark) -> Result<(), GcError> {
        self.ensure_available()?;
        let epoch = mark.as_single().ok_or_else(|| {
            GcError::InvalidConfig(format!(
                "{}: expected a single-port generation mark, got {} epochs",
                self.label,
                mark.epochs().len()
            ))
        })?;
        self.generation.clear_through(epoch);
        Ok(())
    }

    fn create_root(&self, name: &str, id: ObjectId) -> Result<(), GcError> {
        self.ensure_available()?;
        self.state.write().roots.insert(name.to_string(), id);
        Ok(())
    }

    fn create_object(&self, id: ObjectId, references: Vec<ObjectId>) -> Result<(), GcError> {
        self.ensure_available()?;
        self.insert(id, references);
        Ok(())
    }

    /// An evicted object is flushed out of memory and leaves the young
    /// generation; only a full cycle can reclaim it afterwards.
    fn evict(&self, id: ObjectId) {
        self.generation.forget(&[id]);
    }

    fn delete_all(&self, garbage: &ObjectIdSet) -> Result<(), GcError> {
        self.ensure_available()?;
        let mut state = self.state.write();
        for id in garbage {
            state.objects.remove(id);
        }
        drop(state);
        self.generation.forget(garbage);
        Ok(())
    }
}
