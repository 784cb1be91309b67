//! Periodic collection on a tokio runtime.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::gc::tracing::log_scheduled_cycle_panicked;
use crate::gc::GarbageCollector;
use crate::metrics::CollectionType;

/// Run `collection_type` cycles every `period` until `token` is cancelled.
///
/// Each cycle runs on the blocking pool, since waiting for the pause and
/// faulting objects in both block. Ticks missed while a cycle is running are
/// delayed, never bunched up. The first cycle runs one `period` after the call.
///
/// # Panics
///
/// Panics if called outside a tokio runtime, or if `period` is zero.
pub fn spawn_periodic(
    collector: Arc<GarbageCollector>,
    collection_type: CollectionType,
    period: Duration,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                () = token.cancelled() => break,
                _ = ticker.tick() => {
                    let collector = Arc::clone(&collector);
                    // Failures are already counted and logged by the collector.
                    let cycle = tokio::task::spawn_blocking(move || collector.do_gc(collection_type)).await;
                    if cycle.is_err_and(|e| e.is_panic()) {
                        log_scheduled_cycle_panicked(collection_type);
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GcConfig;
    use crate::gc::{FullGcHook, ImmediateDrain};
    use crate::id::ObjectId;
    use crate::memory::InMemoryObjectStore;
    use crate::pins::ClientPinRegistry;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_spawn_periodic_collects_until_cancelled() {
        let store = Arc::new(InMemoryObjectStore::new());
        store.insert(ObjectId::new(1), Vec::new());
        let hook = FullGcHook::new(store.clone(), Arc::new(ClientPinRegistry::new()));
        let collector = Arc::new(
            GarbageCollector::new(hook, Arc::new(ImmediateDrain), GcConfig::default()).unwrap(),
        );
        collector.start().unwrap();

        let token = CancellationToken::new();
        let handle = spawn_periodic(
            Arc::clone(&collector),
            CollectionType::Full,
            Duration::from_millis(10),
            token.clone(),
        );

        for _ in 0..200 {
            if collector.stats().completed() > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        token.cancel();
        handle.await.unwrap();

        assert!(collector.stats().completed() >= 1);
        assert!(store.is_empty());
    }
}
