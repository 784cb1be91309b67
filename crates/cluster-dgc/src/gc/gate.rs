//! The collector's view of the transaction pipeline.
//!
//! On a pause request the pipeline stops admitting mutating transactions and
//! lets in-flight ones finish; once drained it reports back through the
//! [`ReadyNotifier`] it was handed. [`InFlightGate`] is a complete
//! in-process implementation of that contract.

use parking_lot::Mutex;

use crate::gc::state::ReadyNotifier;

/// Callbacks the collector makes into the transaction pipeline.
pub trait TransactionGate: Send + Sync {
    /// Stop admitting mutating transactions and call
    /// [`ReadyNotifier::notify_ready_to_gc`] once in-flight ones are done.
    ///
    /// May notify synchronously from inside this call.
    fn on_pause_requested(&self, notifier: ReadyNotifier);

    /// Resume admitting transactions. Called after every cycle, including
    /// skipped and failed ones.
    fn on_resume(&self) {}
}

/// Gate for deployments with no transaction pipeline: always drained.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImmediateDrain;

impl TransactionGate for ImmediateDrain {
    fn on_pause_requested(&self, notifier: ReadyNotifier) {
        notifier.notify_ready_to_gc();
    }
}

#[derive(Debug)]
struct GateState {
    admitting: bool,
    in_flight: usize,
    waiting: Option<ReadyNotifier>,
}

/// Counts in-flight transactions and drains them for the collector.
#[derive(Debug)]
pub struct InFlightGate {
    state: Mutex<GateState>,
}

impl Default for InFlightGate {
    fn default() -> Self {
        Self::new()
    }
}

impl InFlightGate {
    /// A gate admitting transactions, none in flight.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(GateState {
                admitting: true,
                in_flight: 0,
                waiting: None,
            }),
        }
    }

    /// Admit a transaction, or `None` while a pause is in effect.
    pub fn begin(&self) -> Option<Transaction<'_>> {
        let mut state = self.state.lock();
        if !state.admitting {
            return None;
        }
        state.in_flight += 1;
        Some(Transaction { gate: self })
    }

    /// Transactions admitted and not yet finished.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.state.lock().in_flight
    }

    /// Returns `true` unless a pause is in effect.
    #[must_use]
    pub fn is_admitting(&self) -> bool {
        self.state.lock().admitting
    }

    fn finish(&self) {
        let mut state = self.state.lock();
        state.in_flight -= 1;
        let drained = if state.in_flight == 0 {
            state.waiting.take()
        } else {
            None
        };
        drop(state);
        if let Some(notifier) = drained {
            notifier.notify_ready_to_gc();
        }
    }
}

impl TransactionGate for InFlightGate {
    fn on_pause_requested(&self, notifier: ReadyNotifier) {
        let mut state = self.state.lock();
        state.admitting = false;
        if state.in_flight == 0 {
            drop(state);
            notifier.notify_ready_to_gc();
        } else {
            state.waiting = Some(notifier);
        }
    }

    fn on_resume(&self) {
        let mut state = self.state.lock();
        state.admitting = true;
        state.waiting = None;
    }
}

/// An admitted transaction. Finishing is dropping.
#[must_use = "dropping the transaction finishes it immediately"]
#[derive(Debug)]
pub struct Transaction<'a> {
    gate: &'a InFlightGate,
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        self.gate.finish();
    }
}
