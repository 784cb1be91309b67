//! Young-generation tracking as an append-only mutation log.
//!
//! Transactions append `(epoch, id)` records when they create or mutate an
//! object. The young generation is every identifier recorded after the
//! current watermark. A full collection captures the epoch before it traces
//! and, once its sweep succeeds, advances the watermark to that epoch, so a
//! mutation that races with the collector is never silently aged out.

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_queue::SegQueue;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::id::{ObjectId, ObjectIdSet};

/// Position in a generation log. Epoch 0 precedes every record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Epoch(pub u64);

/// Snapshot of the generation epochs of one or more ports.
///
/// A single store produces a one-element mark; a sharded router produces
/// one epoch per shard, in routing-table order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationMark {
    epochs: Vec<Epoch>,
}

impl GenerationMark {
    /// Mark for a single port.
    #[must_use]
    pub fn single(epoch: Epoch) -> Self {
        Self {
            epochs: vec![epoch],
        }
    }

    /// Mark composed from per-shard epochs.
    #[must_use]
    pub const fn from_epochs(epochs: Vec<Epoch>) -> Self {
        Self { epochs }
    }

    /// The per-port epochs.
    #[must_use]
    pub fn epochs(&self) -> &[Epoch] {
        &self.epochs
    }

    /// Epoch for the only port of a single-port mark.
    #[must_use]
    pub fn as_single(&self) -> Option<Epoch> {
        match self.epochs.as_slice() {
            [epoch] => Some(*epoch),
            _ => None,
        }
    }
}

/// Append-only log of created or mutated identifiers.
///
/// Writers only push onto a lock-free queue; the settled view is folded
/// lazily by readers.
#[derive(Debug)]
pub struct GenerationLog {
    next_epoch: AtomicU64,
    pending: SegQueue<(Epoch, ObjectId)>,
    settled: Mutex<Settled>,
}

#[derive(Debug, Default)]
struct Settled {
    latest: FxHashMap<ObjectId, Epoch>,
    watermark: Epoch,
}

impl Default for GenerationLog {
    fn default() -> Self {
        Self::new()
    }
}

impl GenerationLog {
    /// Create an empty log at epoch 0.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_epoch: AtomicU64::new(0),
            pending: SegQueue::new(),
            settled: Mutex::new(Settled::default()),
        }
    }

    /// Record that `id` was created or mutated. Returns the assigned epoch.
    pub fn record(&self, id: ObjectId) -> Epoch {
        let epoch = Epoch(self.next_epoch.fetch_add(1, Ordering::AcqRel) + 1);
        self.pending.push((epoch, id));
        epoch
    }

    /// The most recently assigned epoch.
    #[must_use]
    pub fn current_epoch(&self) -> Epoch {
        Epoch(self.next_epoch.load(Ordering::Acquire))
    }

    /// The epoch everything at or below has been aged out through.
    #[must_use]
    pub fn watermark(&self) -> Epoch {
        self.settled.lock().watermark
    }

    /// Identifiers recorded after the watermark.
    #[must_use]
    pub fn young_ids(&self) -> ObjectIdSet {
        let mut settled = self.settled.lock();
        self.fold_pending(&mut settled);
        let watermark = settled.watermark;
        settled
            .latest
            .iter()
            .filter(|(_, &epoch)| epoch > watermark)
            .map(|(&id, _)| id)
            .collect()
    }

    /// Returns `true` if `id` is currently in the young generation.
    #[must_use]
    pub fn is_young(&self, id: ObjectId) -> bool {
        let mut settled = self.settled.lock();
        self.fold_pending(&mut settled);
        settled
            .latest
            .get(&id)
            .is_some_and(|&epoch| epoch > settled.watermark)
    }

    /// Age out every record at or below `through`.
    ///
    /// The watermark never moves backwards.
    pub fn clear_through(&self, through: Epoch) {
        let mut settled = self.settled.lock();
        self.fold_pending(&mut settled);
        if through > settled.watermark {
            settled.watermark = through;
        }
        let watermark = settled.watermark;
        settled.latest.retain(|_, epoch| *epoch > watermark);
    }

    /// Drop every record for the given identifiers (deleted or evicted).
    pub fn forget<'a>(&self, ids: impl IntoIterator<Item = &'a ObjectId>) {
        let mut settled = self.settled.lock();
        self.fold_pending(&mut settled);
        for id in ids {
            settled.latest.remove(id);
        }
    }

    fn fold_pending(&self, settled: &mut Settled) {
        while let Some((epoch, id)) = self.pending.pop() {
            let entry = settled.latest.entry(id).or_insert(epoch);
            if epoch > *entry {
                *entry = epoch;
            }
        }
    }
}
