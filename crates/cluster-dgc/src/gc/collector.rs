//! The public face of the collector.
//!
//! [`GarbageCollector::do_gc`] runs one cycle end to end:
//!
//! 1. request the pause and hand the transaction gate a [`ReadyNotifier`],
//! 2. wait for PAUSED, bounded by [`GcConfig::pause_timeout`],
//! 3. assemble roots and candidates through the hook,
//! 4. trace, delete the garbage, and age out the young generation after a
//!    full cycle,
//! 5. return to IDLE and resume the gate.
//!
//! Step 5 runs on every path once the pause has been requested, including
//! a panic that unwinds out of the filter or the store.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;

use crate::config::GcConfig;
use crate::error::GcError;
use crate::events::{EventPublisher, GcEventListener};
use crate::filter::{AcceptAll, TraversalFilter};
use crate::gc::gate::TransactionGate;
use crate::gc::hook::CollectionHook;
use crate::gc::mark_sweep::{MarkAndSweep, MarkResult};
use crate::gc::state::{GcState, GcStateMachine, ReadyNotifier};
use crate::gc::tracing::{
    log_cycle_complete, log_cycle_failed, log_cycle_skipped, log_cycle_start, log_pause_timeout,
    log_paused, log_scheduled_cycle_panicked, log_scheduler, log_young_clear_failed,
};
use crate::id::{ObjectId, ObjectIdSet};
use crate::metrics::{CollectionType, CollectorStats, GcHistory, GcMetrics, PhaseTimer};
use crate::tracing::internal::{log_phase_end, log_phase_start, trace_gc_collection, trace_phase};
use crate::tracing::{GcId, GcIdCounter, GcPhase};

/// Outcome of one completed cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcResult {
    /// Cycle identifier.
    pub gc_id: GcId,
    /// Young or full.
    pub collection_type: CollectionType,
    /// Identifiers handed to the store for deletion.
    pub garbage: ObjectIdSet,
    /// Timings and counts of the cycle.
    pub metrics: GcMetrics,
}

impl GcResult {
    /// Number of objects deleted.
    #[must_use]
    pub fn garbage_count(&self) -> usize {
        self.garbage.len()
    }
}

/// Holds COLLECTING for one cycle and gives it back on drop.
///
/// On unwind the cycle is also recorded as failed with
/// [`GcError::CyclePanicked`].
struct CollectingGuard<'a> {
    collector: &'a GarbageCollector,
    gc_id: GcId,
    collection_type: CollectionType,
}

impl Drop for CollectingGuard<'_> {
    fn drop(&mut self) {
        let collector = self.collector;
        if collector.state.finish_collecting(self.gc_id) {
            collector.gate.on_resume();
        }
        if thread::panicking() {
            let error = GcError::CyclePanicked;
            collector.stats.record_failed();
            log_cycle_failed(self.gc_id, &error);
            collector
                .events
                .on_cycle_failed(self.gc_id, self.collection_type, &error);
        }
    }
}

struct Scheduler {
    stop: Sender<()>,
    thread: JoinHandle<()>,
}

/// Distributed mark-and-sweep collector over one [`CollectionHook`].
pub struct GarbageCollector {
    hook: Box<dyn CollectionHook>,
    gate: Arc<dyn TransactionGate>,
    config: GcConfig,
    state: Arc<GcStateMachine>,
    started: AtomicBool,
    ids: GcIdCounter,
    stats: CollectorStats,
    history: GcHistory,
    events: EventPublisher,
    scheduler: Mutex<Option<Scheduler>>,
}

impl std::fmt::Debug for GarbageCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GarbageCollector")
            .field("hook", &self.hook.description())
            .field("state", &self.state.state())
            .field("started", &self.is_started())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl GarbageCollector {
    /// Build a collector. Nothing runs until [`start`](Self::start).
    ///
    /// # Errors
    ///
    /// [`GcError::InvalidConfig`] if `config` fails validation.
    pub fn new(
        hook: impl CollectionHook + 'static,
        gate: Arc<dyn TransactionGate>,
        config: GcConfig,
    ) -> Result<Self, GcError> {
        config.validate()?;
        let events = EventPublisher::new();
        #[cfg(feature = "tracing")]
        if config.verbose {
            events.add_listener(Arc::new(crate::events::LoggingListener));
        }
        Ok(Self {
            hook: Box::new(hook),
            gate,
            config,
            state: Arc::new(GcStateMachine::new()),
            started: AtomicBool::new(false),
            ids: GcIdCounter::new(),
            stats: CollectorStats::new(),
            history: GcHistory::new(),
            events,
            scheduler: Mutex::new(None),
        })
    }

    /// The configuration the collector was built with.
    #[must_use]
    pub const fn config(&self) -> &GcConfig {
        &self.config
    }

    /// The hook supplying roots and candidates.
    #[must_use]
    pub fn hook(&self) -> &dyn CollectionHook {
        self.hook.as_ref()
    }

    /// Cumulative counters, skipped and failed cycles included.
    #[must_use]
    pub const fn stats(&self) -> &CollectorStats {
        &self.stats
    }

    /// Metrics of the most recent completed cycles.
    #[must_use]
    pub const fn history(&self) -> &GcHistory {
        &self.history
    }

    /// Register a listener for cycle events.
    pub fn add_listener(&self, listener: Arc<dyn GcEventListener>) {
        self.events.add_listener(listener);
    }

    /// Current pause state.
    #[must_use]
    pub fn state(&self) -> GcState {
        self.state.state()
    }

    /// Handle the transaction pipeline uses to report that it drained.
    #[must_use]
    pub fn ready_notifier(&self) -> ReadyNotifier {
        ReadyNotifier::new(Arc::clone(&self.state))
    }

    // ----- lifecycle -----

    /// Allow cycles to run, and spawn the scheduler thread if any periodic
    /// interval is configured. Calling it again is a no-op.
    ///
    /// # Errors
    ///
    /// [`GcError::SchedulerSpawn`] if the thread cannot be created.
    pub fn start(self: &Arc<Self>) -> Result<(), GcError> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        if !self.config.is_scheduled() {
            return Ok(());
        }

        let young = match (self.config.young_gen_enabled, self.config.young_gen_interval) {
            (true, Some(interval)) => channel::tick(interval),
            _ => channel::never(),
        };
        let full = self
            .config
            .full_interval
            .map_or_else(channel::never, channel::tick);
        let (stop, stopped) = channel::bounded::<()>(0);
        let collector = Arc::downgrade(self);

        let thread = thread::Builder::new()
            .name("cluster-dgc-scheduler".to_string())
            .spawn(move || run_scheduler(&collector, &young, &full, &stopped))
            .map_err(|e| {
                self.started.store(false, Ordering::Release);
                GcError::SchedulerSpawn(e.to_string())
            })?;
        *self.scheduler.lock() = Some(Scheduler { stop, thread });
        log_scheduler("started");
        Ok(())
    }

    /// Stop the scheduler and refuse further [`do_gc`](Self::do_gc) calls.
    /// A cycle already running completes.
    pub fn stop(&self) {
        self.started.store(false, Ordering::Release);
        let scheduler = self.scheduler.lock().take();
        if let Some(Scheduler { stop, thread }) = scheduler {
            drop(stop);
            if thread.thread().id() != thread::current().id() {
                let _ = thread.join();
            }
            log_scheduler("stopped");
        }
    }

    /// Returns `true` between [`start`](Self::start) and [`stop`](Self::stop).
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Administratively allow collection again.
    pub fn enable_gc(&self) -> bool {
        self.state.enable()
    }

    /// Administratively forbid collection. Only succeeds while IDLE.
    pub fn disable_gc(&self) -> bool {
        self.state.disable()
    }

    /// Returns `true` while collection is administratively disabled.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.state.is_disabled()
    }

    // ----- pause protocol -----

    /// IDLE → `PAUSE_REQUESTED`, and tell the gate to drain.
    ///
    /// Returns `Ok(false)` without touching the gate if a pause is already
    /// in effect.
    ///
    /// # Errors
    ///
    /// [`GcError::Disabled`] while collection is disabled.
    pub fn request_pause(&self) -> Result<bool, GcError> {
        let requested = self.state.request_pause()?;
        if requested {
            self.gate.on_pause_requested(self.ready_notifier());
        }
        Ok(requested)
    }

    /// `PAUSE_REQUESTED` → PAUSED.
    pub fn notify_ready_to_gc(&self) -> bool {
        self.state.notify_ready_to_gc()
    }

    /// True in `PAUSE_REQUESTED`, `PAUSED` or `COLLECTING`.
    #[must_use]
    pub fn is_pausing_or_paused(&self) -> bool {
        self.state.is_pausing_or_paused()
    }

    /// True only in `PAUSED`.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.state.is_paused()
    }

    /// `PAUSE_REQUESTED` or PAUSED → IDLE, resuming the gate.
    ///
    /// Releases a pause that no cycle is using. A cycle in COLLECTING
    /// returns to IDLE by itself; this call then returns `false`.
    pub fn notify_gc_complete(&self) -> bool {
        let completed = self.state.notify_gc_complete();
        if completed {
            self.gate.on_resume();
        }
        completed
    }

    // ----- cycles -----

    /// Run a full cycle.
    ///
    /// # Errors
    ///
    /// See [`do_gc`](Self::do_gc).
    pub fn gc(&self) -> Result<GcResult, GcError> {
        self.do_gc(CollectionType::Full)
    }

    /// Run a young-generation cycle.
    ///
    /// # Errors
    ///
    /// See [`do_gc`](Self::do_gc).
    pub fn gc_young(&self) -> Result<GcResult, GcError> {
        self.do_gc(CollectionType::Young)
    }

    /// Pause, collect, resume.
    ///
    /// # Errors
    ///
    /// - [`GcError::NotStarted`] before [`start`](Self::start).
    /// - [`GcError::YoungGenerationDisabled`] for a young cycle when
    ///   young-generation collection is off.
    /// - [`GcError::CycleInProgress`] or [`GcError::Disabled`] if the pause
    ///   cannot be requested.
    /// - [`GcError::PauseTimeout`] if the pipeline does not drain in time.
    /// - Any assembly, trace or deletion error.
    pub fn do_gc(&self, collection_type: CollectionType) -> Result<GcResult, GcError> {
        self.do_gc_with_filter(collection_type, &AcceptAll)
    }

    /// [`do_gc`](Self::do_gc) with a caller-supplied traversal filter.
    ///
    /// # Errors
    ///
    /// See [`do_gc`](Self::do_gc).
    pub fn do_gc_with_filter(
        &self,
        collection_type: CollectionType,
        filter: &dyn TraversalFilter,
    ) -> Result<GcResult, GcError> {
        if !self.is_started() {
            return Err(GcError::NotStarted);
        }
        if collection_type == CollectionType::Young && !self.config.young_gen_enabled {
            return Err(GcError::YoungGenerationDisabled);
        }

        let gc_id = self.ids.next_id();
        let _span = trace_gc_collection(collection_type.as_str(), gc_id);
        log_cycle_start(gc_id, collection_type);
        self.events.on_cycle_start(gc_id, collection_type);
        let started_at = Instant::now();

        match self.request_pause() {
            Ok(true) => {}
            Ok(false) => return Err(self.skip(gc_id, collection_type, GcError::CycleInProgress)),
            Err(e) => return Err(self.skip(gc_id, collection_type, e)),
        }

        let pause_wait = match self.state.wait_until_paused(self.config.pause_timeout) {
            Ok(waited) => waited,
            Err(e) => {
                if let GcError::PauseTimeout { waited } = e {
                    log_pause_timeout(gc_id, waited);
                }
                if self.state.cancel_pause() {
                    self.gate.on_resume();
                }
                return Err(self.skip(gc_id, collection_type, e));
            }
        };
        log_paused(gc_id, pause_wait);
        self.events.on_paused(gc_id, pause_wait);

        self.collect_paused(gc_id, collection_type, filter, started_at, pause_wait)
    }

    /// Run one cycle on a cluster that is already PAUSED, then return to
    /// IDLE.
    ///
    /// # Errors
    ///
    /// [`GcError::InvalidState`] unless PAUSED, otherwise any assembly, trace
    /// or deletion error.
    pub fn collect(
        &self,
        collection_type: CollectionType,
        filter: &dyn TraversalFilter,
    ) -> Result<GcResult, GcError> {
        let gc_id = self.ids.next_id();
        let _span = trace_gc_collection(collection_type.as_str(), gc_id);
        self.collect_paused(gc_id, collection_type, filter, Instant::now(), Duration::ZERO)
    }

    fn collect_paused(
        &self,
        gc_id: GcId,
        collection_type: CollectionType,
        filter: &dyn TraversalFilter,
        started_at: Instant,
        pause_wait: Duration,
    ) -> Result<GcResult, GcError> {
        self.state.begin_collecting(gc_id)?;
        let outcome = {
            let _collecting = CollectingGuard {
                collector: self,
                gc_id,
                collection_type,
            };
            self.run_cycle(gc_id, collection_type, filter)
        };

        match outcome {
            Ok((garbage, mut metrics)) => {
                metrics.pause_wait = pause_wait;
                metrics.duration = started_at.elapsed();
                self.stats.record_completed(&metrics);
                self.history.push(metrics);
                log_cycle_complete(&metrics);
                self.events.on_cycle_complete(&metrics);
                Ok(GcResult {
                    gc_id,
                    collection_type,
                    garbage,
                    metrics,
                })
            }
            Err(e) => {
                self.stats.record_failed();
                log_cycle_failed(gc_id, &e);
                self.events.on_cycle_failed(gc_id, collection_type, &e);
                Err(e)
            }
        }
    }

    fn run_cycle(
        &self,
        gc_id: GcId,
        collection_type: CollectionType,
        filter: &dyn TraversalFilter,
    ) -> Result<(ObjectIdSet, GcMetrics), GcError> {
        let hook = self.hook.as_ref();
        let mut timer = PhaseTimer::new();

        timer.start();
        let (roots, candidates) = {
            let _span = trace_phase(GcPhase::Assemble);
            log_phase_start(GcPhase::Assemble, 0);
            let roots = hook.root_ids()?;
            let candidates = hook.candidates(collection_type)?;
            log_phase_end(GcPhase::Assemble, roots.len() + candidates.ids.len());
            (roots, candidates)
        };
        timer.end_assemble();

        timer.start();
        let partition = hook.partition_filter();
        let result = {
            let _span = trace_phase(GcPhase::Mark);
            match partition {
                Some(partition) => {
                    let both =
                        |id: ObjectId| partition.should_visit(id) && filter.should_visit(id);
                    MarkAndSweep::new(hook.port(), &both).collect(&roots, &candidates.ids)?
                }
                None => MarkAndSweep::new(hook.port(), filter).collect(&roots, &candidates.ids)?,
            }
        };
        timer.end_mark();
        self.events.on_mark_complete(gc_id, &result);

        let bounded = result.is_bounded() || partition.is_some();
        let MarkResult {
            garbage,
            visited,
            missing,
            pruned,
            lookups,
        } = result;
        let garbage = if bounded { ObjectIdSet::new() } else { garbage };

        timer.start();
        if !garbage.is_empty() {
            let _span = trace_phase(GcPhase::Delete);
            log_phase_start(GcPhase::Delete, garbage.len());
            hook.delete_garbage(&garbage)?;
            log_phase_end(GcPhase::Delete, garbage.len());
        }
        if collection_type == CollectionType::Full && !bounded {
            if let Err(e) = hook.clear_young_generation(&candidates) {
                log_young_clear_failed(&e);
            }
        }
        timer.end_delete();

        let metrics = GcMetrics {
            gc_id,
            collection_type,
            assemble_duration: timer.assemble,
            mark_duration: timer.mark,
            delete_duration: timer.delete,
            roots: roots.len(),
            candidates: candidates.ids.len(),
            objects_visited: visited.len(),
            lookups,
            missing: missing.len(),
            pruned: pruned.len(),
            objects_reclaimed: garbage.len(),
            bounded,
            ..GcMetrics::new()
        };
        Ok((garbage, metrics))
    }

    fn skip(&self, gc_id: GcId, collection_type: CollectionType, reason: GcError) -> GcError {
        self.stats.record_skipped();
        log_cycle_skipped(gc_id, &reason);
        self.events.on_cycle_skipped(gc_id, collection_type, &reason);
        reason
    }
}

impl Drop for GarbageCollector {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_scheduler(
    collector: &Weak<GarbageCollector>,
    young: &Receiver<Instant>,
    full: &Receiver<Instant>,
    stopped: &Receiver<()>,
) {
    loop {
        let next = channel::select! {
            recv(stopped) -> _ => None,
            recv(full) -> _ => Some(CollectionType::Full),
            recv(young) -> _ => Some(CollectionType::Young),
        };
        let Some(collection_type) = next else {
            break;
        };
        let Some(collector) = collector.upgrade() else {
            break;
        };
        if !collector.is_started() {
            break;
        }
        // Failures are already counted and logged by the collector.
        let cycle = panic::catch_unwind(AssertUnwindSafe(|| collector.do_gc(collection_type)));
        if cycle.is_err() {
            log_scheduled_cycle_panicked(collection_type);
        }
    }
    log_scheduler("exited");
}
