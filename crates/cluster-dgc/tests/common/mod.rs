//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use cluster_dgc::{
    ClientPinRegistry, CollectionType, FullGcHook, GarbageCollector, GcConfig, GcError,
    GcEventListener, GcId, GcMetrics, InMemoryObjectStore, MarkResult, ObjectId, ObjectIdSet,
    ReadyNotifier, TransactionGate,
};

pub fn id(raw: u64) -> ObjectId {
    ObjectId::new(raw)
}

pub fn set(ids: &[u64]) -> ObjectIdSet {
    ids.iter().copied().map(ObjectId::new).collect()
}

/// Store plus pin registry wired into a started collector.
pub struct Fixture {
    pub store: Arc<InMemoryObjectStore>,
    pub pins: Arc<ClientPinRegistry>,
    pub gc: Arc<GarbageCollector>,
}

impl Fixture {
    pub fn new(gate: Arc<dyn TransactionGate>, config: GcConfig) -> Self {
        let store = Arc::new(InMemoryObjectStore::new().recording());
        let pins = Arc::new(ClientPinRegistry::new());
        let hook = FullGcHook::new(store.clone(), pins.clone());
        let gc = Arc::new(GarbageCollector::new(hook, gate, config).unwrap());
        gc.start().unwrap();
        Self { store, pins, gc }
    }

    pub fn immediate() -> Self {
        Self::new(Arc::new(cluster_dgc::ImmediateDrain), GcConfig::default())
    }
}

/// A gate that never reports drained.
#[derive(Default)]
pub struct StuckGate {
    pub requested: Mutex<usize>,
    pub resumed: Mutex<usize>,
}

impl TransactionGate for StuckGate {
    fn on_pause_requested(&self, _notifier: ReadyNotifier) {
        *self.requested.lock() += 1;
    }

    fn on_resume(&self) {
        *self.resumed.lock() += 1;
    }
}

/// A gate that drains at once and counts pauses and resumes.
#[derive(Default)]
pub struct CountingDrain {
    pub requested: Mutex<usize>,
    pub resumed: Mutex<usize>,
}

impl TransactionGate for CountingDrain {
    fn on_pause_requested(&self, notifier: ReadyNotifier) {
        *self.requested.lock() += 1;
        notifier.notify_ready_to_gc();
    }

    fn on_resume(&self) {
        *self.resumed.lock() += 1;
    }
}

/// A gate that drains on another thread after a delay.
pub struct DelayedGate(pub Duration);

impl TransactionGate for DelayedGate {
    fn on_pause_requested(&self, notifier: ReadyNotifier) {
        let delay = self.0;
        std::thread::spawn(move || {
            std::thread::sleep(delay);
            notifier.notify_ready_to_gc();
        });
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Start(GcId, CollectionType),
    Paused(GcId),
    MarkComplete(GcId, usize),
    Complete(GcId, usize),
    Skipped(GcId, GcError),
    Failed(GcId, GcError),
}

/// Records every event it receives.
#[derive(Default)]
pub struct RecordingListener {
    pub events: Mutex<Vec<Event>>,
    pub metrics: Mutex<Vec<GcMetrics>>,
}

impl RecordingListener {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }
}

impl GcEventListener for RecordingListener {
    fn on_cycle_start(&self, gc_id: GcId, collection_type: CollectionType) {
        self.events.lock().push(Event::Start(gc_id, collection_type));
    }

    fn on_paused(&self, gc_id: GcId, _waited: Duration) {
        self.events.lock().push(Event::Paused(gc_id));
    }

    fn on_mark_complete(&self, gc_id: GcId, result: &MarkResult) {
        self.events
            .lock()
            .push(Event::MarkComplete(gc_id, result.visited.len()));
    }

    fn on_cycle_complete(&self, metrics: &GcMetrics) {
        self.events
            .lock()
            .push(Event::Complete(metrics.gc_id, metrics.objects_reclaimed));
        self.metrics.lock().push(*metrics);
    }

    fn on_cycle_skipped(&self, gc_id: GcId, _collection_type: CollectionType, reason: &GcError) {
        self.events.lock().push(Event::Skipped(gc_id, reason.clone()));
    }

    fn on_cycle_failed(&self, gc_id: GcId, _collection_type: CollectionType, error: &GcError) {
        self.events.lock().push(Event::Failed(gc_id, error.clone()));
    }
}
