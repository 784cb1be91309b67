//! Listener feed for collection cycles.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use crate::error::GcError;
use crate::gc::mark_sweep::MarkResult;
use crate::metrics::{CollectionType, GcMetrics};
use crate::tracing::GcId;

/// Receives collector events. Every callback defaults to a no-op.
///
/// Callbacks run on the collecting thread while the cluster is paused, so
/// they should be quick.
#[allow(unused_variables)]
pub trait GcEventListener: Send + Sync {
    /// A cycle has been assigned an id and is about to request the pause.
    fn on_cycle_start(&self, gc_id: GcId, collection_type: CollectionType) {}

    /// The transaction pipeline drained.
    fn on_paused(&self, gc_id: GcId, waited: Duration) {}

    /// The trace finished, before anything was deleted.
    fn on_mark_complete(&self, gc_id: GcId, result: &MarkResult) {}

    /// The cycle completed and transactions resumed.
    fn on_cycle_complete(&self, metrics: &GcMetrics) {}

    /// The cycle was abandoned before tracing.
    fn on_cycle_skipped(&self, gc_id: GcId, collection_type: CollectionType, reason: &GcError) {}

    /// The cycle failed after the pause was reached. Nothing was deleted
    /// unless the failure happened during deletion itself.
    fn on_cycle_failed(&self, gc_id: GcId, collection_type: CollectionType, error: &GcError) {}
}

/// Fans events out to every registered listener, in registration order.
#[derive(Default)]
pub struct EventPublisher {
    listeners: RwLock<Vec<Arc<dyn GcEventListener>>>,
}

impl std::fmt::Debug for EventPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventPublisher")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl EventPublisher {
    /// A publisher with no listeners.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a listener.
    pub fn add_listener(&self, listener: Arc<dyn GcEventListener>) {
        self.listeners.write().push(listener);
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    fn each(&self, f: impl Fn(&dyn GcEventListener)) {
        let listeners = self.listeners.read().clone();
        for listener in &listeners {
            f(listener.as_ref());
        }
    }
}

impl GcEventListener for EventPublisher {
    fn on_cycle_start(&self, gc_id: GcId, collection_type: CollectionType) {
        self.each(|l| l.on_cycle_start(gc_id, collection_type));
    }

    fn on_paused(&self, gc_id: GcId, waited: Duration) {
        self.each(|l| l.on_paused(gc_id, waited));
    }

    fn on_mark_complete(&self, gc_id: GcId, result: &MarkResult) {
        self.each(|l| l.on_mark_complete(gc_id, result));
    }

    fn on_cycle_complete(&self, metrics: &GcMetrics) {
        self.each(|l| l.on_cycle_complete(metrics));
    }

    fn on_cycle_skipped(&self, gc_id: GcId, collection_type: CollectionType, reason: &GcError) {
        self.each(|l| l.on_cycle_skipped(gc_id, collection_type, reason));
    }

    fn on_cycle_failed(&self, gc_id: GcId, collection_type: CollectionType, error: &GcError) {
        self.each(|l| l.on_cycle_failed(gc_id, collection_type, error));
    }
}

/// Writes a one-line summary of every cycle to the `tracing` subscriber.
///
/// Installed automatically when [`GcConfig::verbose`](crate::GcConfig) is set.
#[cfg(feature = "tracing")]
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingListener;

#[cfg(feature = "tracing")]
impl GcEventListener for LoggingListener {
    fn on_cycle_start(&self, gc_id: GcId, collection_type: CollectionType) {
        ::tracing::info!("{gc_id}: {collection_type} collection requested");
    }

    fn on_paused(&self, gc_id: GcId, waited: Duration) {
        ::tracing::info!("{gc_id}: paused after {waited:?}");
    }

    fn on_mark_complete(&self, gc_id: GcId, result: &MarkResult) {
        ::tracing::info!(
            "{gc_id}: mark complete, {} visited, {} garbage, {} missing{}",
            result.visited.len(),
            result.garbage.len(),
            result.missing.len(),
            if result.is_bounded() { " (bounded)" } else { "" }
        );
    }

    fn on_cycle_complete(&self, metrics: &GcMetrics) {
        ::tracing::info!(
            "{}: {} collection complete in {:?} (pause wait {:?}, mark {:?}, delete {:?}), {} of {} candidates reclaimed",
            metrics.gc_id,
            metrics.collection_type,
            metrics.duration,
            metrics.pause_wait,
            metrics.mark_duration,
            metrics.delete_duration,
            metrics.objects_reclaimed,
            metrics.candidates
        );
    }

    fn on_cycle_skipped(&self, gc_id: GcId, collection_type: CollectionType, reason: &GcError) {
        ::tracing::info!("{gc_id}: {collection_type} collection skipped: {reason}");
    }

    fn on_cycle_failed(&self, gc_id: GcId, collection_type: CollectionType, error: &GcError) {
        ::tracing::warn!("{gc_id}: {collection_type} collection failed: {error}");
    }
}
