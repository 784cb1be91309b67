//! GC metrics and statistics.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::tracing::GcId;

/// Statistics from one collection cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GcMetrics {
    /// Cycle identifier.
    pub gc_id: GcId,
    /// Type of collection (Young or Full).
    pub collection_type: CollectionType,
    /// Time from the pause request until transactions resumed.
    pub duration: Duration,
    /// Time spent waiting for the transaction pipeline to drain.
    pub pause_wait: Duration,
    /// Duration of root and candidate assembly.
    pub assemble_duration: Duration,
    /// Duration of the mark phase.
    pub mark_duration: Duration,
    /// Duration of the delete phase.
    pub delete_duration: Duration,
    /// Size of the root set, pins included.
    pub roots: usize,
    /// Size of the candidate set.
    pub candidates: usize,
    /// Number of objects the trace visited.
    pub objects_visited: usize,
    /// Number of successful lookups (always equal to releases).
    pub lookups: usize,
    /// Identifiers that were already gone from the store.
    pub missing: usize,
    /// References rejected by the traversal filter.
    pub pruned: usize,
    /// Number of objects reclaimed.
    pub objects_reclaimed: usize,
    /// Whether the filter bounded the trace, suppressing deletion.
    pub bounded: bool,
}

impl Default for GcMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl GcMetrics {
    /// Create a new `GcMetrics` for a full cycle with every count and
    /// duration zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            gc_id: GcId(0),
            collection_type: CollectionType::Full,
            duration: Duration::ZERO,
            pause_wait: Duration::ZERO,
            assemble_duration: Duration::ZERO,
            mark_duration: Duration::ZERO,
            delete_duration: Duration::ZERO,
            roots: 0,
            candidates: 0,
            objects_visited: 0,
            lookups: 0,
            missing: 0,
            pruned: 0,
            objects_reclaimed: 0,
            bounded: false,
        }
    }
}

/// Type of GC collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CollectionType {
    /// Candidates restricted to the young generation.
    Young = 1,
    /// Every known identifier is a candidate.
    Full = 2,
}

impl CollectionType {
    /// Lowercase name used in logs and spans.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Young => "young",
            Self::Full => "full",
        }
    }
}

impl fmt::Display for CollectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Helper for capturing phase durations.
///
/// ```
/// use cluster_dgc::metrics::PhaseTimer;
///
/// let mut timer = PhaseTimer::new();
/// timer.start();
/// // ... gather roots and candidates ...
/// timer.end_assemble();
///
/// timer.start();
/// // ... trace ...
/// timer.end_mark();
///
/// timer.start();
/// // ... delete garbage ...
/// timer.end_delete();
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct PhaseTimer {
    /// Assemble phase time.
    pub assemble: Duration,
    /// Mark phase time.
    pub mark: Duration,
    /// Delete phase time.
    pub delete: Duration,
    current_start: Option<Instant>,
}

impl PhaseTimer {
    /// Create a new `PhaseTimer` with all durations set to zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            assemble: Duration::ZERO,
            mark: Duration::ZERO,
            delete: Duration::ZERO,
            current_start: None,
        }
    }

    /// Start timing a phase.
    pub fn start(&mut self) {
        self.current_start = Some(Instant::now());
    }

    /// End the assemble phase and record its duration.
    pub fn end_assemble(&mut self) {
        if let Some(start) = self.current_start.take() {
            self.assemble = start.elapsed();
        }
    }

    /// End the mark phase and record its duration.
    pub fn end_mark(&mut self) {
        if let Some(start) = self.current_start.take() {
            self.mark = start.elapsed();
        }
    }

    /// End the delete phase and record its duration.
    pub fn end_delete(&mut self) {
        if let Some(start) = self.current_start.take() {
            self.delete = start.elapsed();
        }
    }
}

/// Cumulative counters for one collector.
///
/// Skipped and failed cycles are counted here so operators can see them;
/// they never appear in [`GcHistory`].
#[derive(Debug, Default)]
pub struct CollectorStats {
    completed: AtomicUsize,
    young: AtomicUsize,
    full: AtomicUsize,
    bounded: AtomicUsize,
    skipped: AtomicUsize,
    failed: AtomicUsize,
    objects_reclaimed: AtomicUsize,
    pause_wait_ns: AtomicU64,
    duration_ns: AtomicU64,
}

impl CollectorStats {
    /// Create a new `CollectorStats` with all counters initialized to zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            completed: AtomicUsize::new(0),
            young: AtomicUsize::new(0),
            full: AtomicUsize::new(0),
            bounded: AtomicUsize::new(0),
            skipped: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            objects_reclaimed: AtomicUsize::new(0),
            pause_wait_ns: AtomicU64::new(0),
            duration_ns: AtomicU64::new(0),
        }
    }

    /// Cycles that ran to completion.
    #[inline]
    #[must_use]
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Relaxed)
    }

    /// Completed young-generation cycles.
    #[inline]
    #[must_use]
    pub fn young_collections(&self) -> usize {
        self.young.load(Ordering::Relaxed)
    }

    /// Completed full cycles.
    #[inline]
    #[must_use]
    pub fn full_collections(&self) -> usize {
        self.full.load(Ordering::Relaxed)
    }

    /// Completed cycles whose trace was bounded by a filter.
    #[inline]
    #[must_use]
    pub fn bounded_collections(&self) -> usize {
        self.bounded.load(Ordering::Relaxed)
    }

    /// Cycles abandoned before tracing (pause timeout, already running, disabled).
    #[inline]
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.skipped.load(Ordering::Relaxed)
    }

    /// Cycles that failed after the pause was reached.
    #[inline]
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::Relaxed)
    }

    /// Objects handed to the store for deletion.
    #[inline]
    #[must_use]
    pub fn objects_reclaimed(&self) -> usize {
        self.objects_reclaimed.load(Ordering::Relaxed)
    }

    /// Total time spent waiting for pauses.
    #[inline]
    #[must_use]
    pub fn total_pause_wait(&self) -> Duration {
        Duration::from_nanos(self.pause_wait_ns.load(Ordering::Relaxed))
    }

    /// Total duration of completed cycles.
    #[inline]
    #[must_use]
    pub fn total_duration(&self) -> Duration {
        Duration::from_nanos(self.duration_ns.load(Ordering::Relaxed))
    }

    pub(crate) fn record_completed(&self, metrics: &GcMetrics) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        match metrics.collection_type {
            CollectionType::Young => {
                self.young.fetch_add(1, Ordering::Relaxed);
            }
            CollectionType::Full => {
                self.full.fetch_add(1, Ordering::Relaxed);
            }
        }
        if metrics.bounded {
            self.bounded.fetch_add(1, Ordering::Relaxed);
        }
        self.objects_reclaimed
            .fetch_add(metrics.objects_reclaimed, Ordering::Relaxed);
        self.pause_wait_ns
            .fetch_add(saturating_nanos(metrics.pause_wait), Ordering::Relaxed);
        self.duration_ns
            .fetch_add(saturating_nanos(metrics.duration), Ordering::Relaxed);
    }

    pub(crate) fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }
}

fn saturating_nanos(duration: Duration) -> u64 {
    duration.as_nanos().try_into().unwrap_or(u64::MAX)
}

/// Ring buffer size for GC history.
pub const HISTORY_SIZE: usize = 64;

#[derive(Debug)]
struct HistoryRing {
    buffer: [GcMetrics; HISTORY_SIZE],
    write_idx: usize,
}

/// Fixed-size ring buffer of recent `GcMetrics` snapshots.
///
/// Stores the most recent 64 completed cycles for trend analysis.
#[derive(Debug)]
pub struct GcHistory {
    ring: Mutex<HistoryRing>,
}

impl Default for GcHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl GcHistory {
    /// Create a new `GcHistory` with an empty buffer.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring: Mutex::new(HistoryRing {
                buffer: [GcMetrics::new(); HISTORY_SIZE],
                write_idx: 0,
            }),
        }
    }

    /// Push a new metrics snapshot. When full, the oldest entry is overwritten.
    pub(crate) fn push(&self, metrics: GcMetrics) {
        let mut ring = self.ring.lock();
        let idx = ring.write_idx;
        ring.buffer[idx % HISTORY_SIZE] = metrics;
        ring.write_idx += 1;
    }

    /// Get the total number of metrics recorded.
    ///
    /// This may exceed `HISTORY_SIZE`.
    #[inline]
    #[must_use]
    pub fn total_recorded(&self) -> usize {
        self.ring.lock().write_idx
    }

    /// The most recent `n` snapshots, oldest first.
    #[must_use]
    pub fn recent(&self, n: usize) -> Vec<GcMetrics> {
        let ring = self.ring.lock();
        let total = ring.write_idx;
        let n = n.min(HISTORY_SIZE).min(total);
        (total - n..total)
            .map(|i| ring.buffer[i % HISTORY_SIZE])
            .collect()
    }

    /// The latest snapshot, if any cycle completed.
    #[must_use]
    pub fn last(&self) -> Option<GcMetrics> {
        self.recent(1).pop()
    }

    /// Average pause over the most recent `n` cycles.
    ///
    /// Returns `Duration::ZERO` if no collections have been recorded.
    #[must_use]
    pub fn average_pause_time(&self, n: usize) -> Duration {
        let recent = self.recent(n);
        if recent.is_empty() {
            return Duration::ZERO;
        }

        let total_ns: u128 = recent.iter().map(|m| m.duration.as_nanos()).sum();
        Duration::from_nanos(
            (total_ns / recent.len() as u128)
                .try_into()
                .unwrap_or(u64::MAX),
        )
    }

    /// Longest pause over the most recent `n` cycles.
    #[must_use]
    pub fn max_pause_time(&self, n: usize) -> Duration {
        self.recent(n)
            .iter()
            .map(|m| m.duration)
            .max()
            .unwrap_or(Duration::ZERO)
    }

    /// Longest drain wait over the most recent `n` cycles.
    #[must_use]
    pub fn max_pause_wait(&self, n: usize) -> Duration {
        self.recent(n)
            .iter()
            .map(|m| m.pause_wait)
            .max()
            .unwrap_or(Duration::ZERO)
    }
}
