//! Pause state machine shared by the collector and the transaction pipeline.
//!
//! ```text
//!            request_pause            notify_ready_to_gc          begin_collecting
//!   IDLE ──────────────────▶ PAUSE_REQUESTED ──────────▶ PAUSED ─────────────▶ COLLECTING
//!    ▲ ▲                          │                        │                       │
//!    │ └── cancel_pause / notify_gc_complete ──────────────┘                       │
//!    └──────────────────────────── finish_collecting ──────────────────────────────┘
//!
//!   IDLE ◀──── enable / disable ────▶ DISABLED
//! ```
//!
//! Waiting for PAUSED is a condvar rendezvous with a deadline, so the
//! collector can always bound how long mutators stay blocked.
//!
//! COLLECTING is owned by the cycle that entered it. Only that cycle's
//! [`finish_collecting`](GcStateMachine::finish_collecting) leaves it, so
//! an outside completion call cannot release the pause under a running
//! trace.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::GcError;
use crate::gc::tracing::log_invalid_transition;
use crate::tracing::GcId;

/// State of the collector's pause protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GcState {
    /// Collection switched off administratively.
    Disabled,
    /// No cycle in progress; transactions flow freely.
    Idle,
    /// No new mutating transactions are admitted; in-flight ones drain.
    PauseRequested,
    /// The pipeline has drained; a cycle may start.
    Paused,
    /// A cycle is tracing or deleting.
    Collecting,
}

impl GcState {
    /// Returns `true` while a pause is requested, reached, or in use.
    #[must_use]
    pub const fn is_pausing_or_paused(self) -> bool {
        matches!(self, Self::PauseRequested | Self::Paused | Self::Collecting)
    }

    const fn is_valid_transition(from: Self, to: Self) -> bool {
        matches!(
            (from, to),
            (Self::Idle, Self::PauseRequested | Self::Disabled)
                | (Self::PauseRequested, Self::Paused)
                | (Self::Paused, Self::Collecting)
                | (
                    Self::PauseRequested | Self::Paused | Self::Collecting | Self::Disabled,
                    Self::Idle
                )
        )
    }
}

impl fmt::Display for GcState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Disabled => "DISABLED",
            Self::Idle => "IDLE",
            Self::PauseRequested => "PAUSE_REQUESTED",
            Self::Paused => "PAUSED",
            Self::Collecting => "COLLECTING",
        })
    }
}

#[derive(Debug)]
struct Inner {
    state: GcState,
    owner: Option<GcId>,
}

/// The pause state plus a condition variable signalled on every change.
#[derive(Debug)]
pub struct GcStateMachine {
    inner: Mutex<Inner>,
    changed: Condvar,
}

impl Default for GcStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl GcStateMachine {
    /// Start in [`GcState::Idle`].
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: GcState::Idle,
                owner: None,
            }),
            changed: Condvar::new(),
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> GcState {
        self.inner.lock().state
    }

    /// The cycle that currently owns COLLECTING.
    #[must_use]
    pub fn collecting_owner(&self) -> Option<GcId> {
        self.inner.lock().owner
    }

    /// True in `PAUSE_REQUESTED`, `PAUSED` or `COLLECTING`.
    #[must_use]
    pub fn is_pausing_or_paused(&self) -> bool {
        self.state().is_pausing_or_paused()
    }

    /// True only in `PAUSED`.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.state() == GcState::Paused
    }

    /// True in `DISABLED`.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.state() == GcState::Disabled
    }

    /// IDLE → `PAUSE_REQUESTED`.
    ///
    /// Returns `Ok(true)` if this call requested the pause and `Ok(false)` if
    /// a pause was already requested, reached, or in use.
    ///
    /// # Errors
    ///
    /// [`GcError::Disabled`] while collection is disabled.
    pub fn request_pause(&self) -> Result<bool, GcError> {
        let mut inner = self.inner.lock();
        match inner.state {
            GcState::Idle => {
                self.transition(&mut inner.state, GcState::PauseRequested);
                Ok(true)
            }
            GcState::PauseRequested | GcState::Paused | GcState::Collecting => Ok(false),
            GcState::Disabled => Err(GcError::Disabled),
        }
    }

    /// `PAUSE_REQUESTED` → PAUSED. Called once the pipeline has drained.
    ///
    /// Ignored (and logged) in any other state.
    pub fn notify_ready_to_gc(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state == GcState::PauseRequested {
            self.transition(&mut inner.state, GcState::Paused);
            true
        } else {
            let found = inner.state;
            drop(inner);
            log_invalid_transition("notify_ready_to_gc", found);
            false
        }
    }

    /// Block until PAUSED, at most `timeout`.
    ///
    /// Returns how long the wait took.
    ///
    /// # Errors
    ///
    /// [`GcError::PauseTimeout`] if the deadline passes first, or
    /// [`GcError::PauseCancelled`] if the pause is abandoned meanwhile.
    pub fn wait_until_paused(&self, timeout: Duration) -> Result<Duration, GcError> {
        let start = Instant::now();
        let deadline = start + timeout;
        let mut inner = self.inner.lock();
        loop {
            match inner.state {
                GcState::Paused => return Ok(start.elapsed()),
                GcState::PauseRequested => {}
                GcState::Idle | GcState::Disabled | GcState::Collecting => {
                    return Err(GcError::PauseCancelled)
                }
            }
            if self.changed.wait_until(&mut inner, deadline).timed_out() {
                return if inner.state == GcState::Paused {
                    Ok(start.elapsed())
                } else {
                    Err(GcError::PauseTimeout {
                        waited: start.elapsed(),
                    })
                };
            }
        }
    }

    /// PAUSED → COLLECTING, owned by `owner` until it calls
    /// [`finish_collecting`](Self::finish_collecting).
    ///
    /// # Errors
    ///
    /// [`GcError::InvalidState`] unless the state is PAUSED.
    pub fn begin_collecting(&self, owner: GcId) -> Result<(), GcError> {
        let mut inner = self.inner.lock();
        if inner.state == GcState::Paused {
            self.transition(&mut inner.state, GcState::Collecting);
            inner.owner = Some(owner);
            Ok(())
        } else {
            Err(GcError::InvalidState {
                expected: GcState::Paused,
                found: inner.state,
            })
        }
    }

    /// COLLECTING → IDLE, only for the cycle that began collecting.
    ///
    /// Returns `false` (and logs) if `owner` does not hold COLLECTING.
    pub fn finish_collecting(&self, owner: GcId) -> bool {
        let mut inner = self.inner.lock();
        if inner.state == GcState::Collecting && inner.owner == Some(owner) {
            self.transition(&mut inner.state, GcState::Idle);
            inner.owner = None;
            true
        } else {
            let found = inner.state;
            drop(inner);
            log_invalid_transition("finish_collecting", found);
            false
        }
    }

    /// `PAUSE_REQUESTED` or PAUSED → IDLE. Resumes transaction admission.
    ///
    /// A running cycle is never interrupted: in COLLECTING this returns
    /// `false` (and logs), as it does when there is nothing to complete.
    pub fn notify_gc_complete(&self) -> bool {
        let mut inner = self.inner.lock();
        if matches!(inner.state, GcState::PauseRequested | GcState::Paused) {
            self.transition(&mut inner.state, GcState::Idle);
            true
        } else {
            let found = inner.state;
            drop(inner);
            log_invalid_transition("notify_gc_complete", found);
            false
        }
    }

    /// Abandon a pause that has not started collecting.
    pub fn cancel_pause(&self) -> bool {
        let mut inner = self.inner.lock();
        if matches!(inner.state, GcState::PauseRequested | GcState::Paused) {
            self.transition(&mut inner.state, GcState::Idle);
            true
        } else {
            false
        }
    }

    /// IDLE → DISABLED. Fails while a cycle is in progress.
    pub fn disable(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state == GcState::Idle {
            self.transition(&mut inner.state, GcState::Disabled)
        } else {
            false
        }
    }

    /// DISABLED → IDLE.
    pub fn enable(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state == GcState::Disabled {
            self.transition(&mut inner.state, GcState::Idle)
        } else {
            let found = inner.state;
            drop(inner);
            log_invalid_transition("enable", found);
            false
        }
    }

    fn transition(&self, state: &mut GcState, to: GcState) -> bool {
        debug_assert!(
            GcState::is_valid_transition(*state, to),
            "invalid GC state transition {} -> {}",
            *state,
            to
        );
        if !GcState::is_valid_transition(*state, to) {
            return false;
        }
        *state = to;
        self.changed.notify_all();
        true
    }
}

/// Handle given to the transaction pipeline when a pause is requested.
///
/// The pipeline calls [`notify_ready_to_gc`] once in-flight transactions
/// have drained.
///
/// [`notify_ready_to_gc`]: ReadyNotifier::notify_ready_to_gc
#[derive(Debug, Clone)]
pub struct ReadyNotifier {
    state: Arc<GcStateMachine>,
}

impl ReadyNotifier {
    pub(crate) const fn new(state: Arc<GcStateMachine>) -> Self {
        Self { state }
    }

    /// Report that the pipeline has drained.
    pub fn notify_ready_to_gc(&self) -> bool {
        self.state.notify_ready_to_gc()
    }

    /// Returns `true` while the collector is still waiting for the drain.
    #[must_use]
    pub fn is_pause_requested(&self) -> bool {
        self.state.state() == GcState::PauseRequested
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_full_pause_sequence() {
        let sm = GcStateMachine::new();
        assert!(!sm.is_pausing_or_paused());

        assert_eq!(sm.request_pause(), Ok(true));
        assert!(sm.is_pausing_or_paused());
        assert_eq!(sm.request_pause(), Ok(false));

        assert!(sm.notify_ready_to_gc());
        assert!(sm.is_paused());

        sm.begin_collecting(GcId(1)).unwrap();
        assert_eq!(sm.state(), GcState::Collecting);
        assert_eq!(sm.collecting_owner(), Some(GcId(1)));
        assert!(sm.is_pausing_or_paused());

        assert!(sm.finish_collecting(GcId(1)));
        assert_eq!(sm.state(), GcState::Idle);
        assert_eq!(sm.collecting_owner(), None);
    }

    #[test]
    fn test_only_owner_finishes_collecting() {
        let sm = GcStateMachine::new();
        sm.request_pause().unwrap();
        sm.notify_ready_to_gc();
        sm.begin_collecting(GcId(4)).unwrap();

        assert!(!sm.notify_gc_complete());
        assert!(!sm.cancel_pause());
        assert!(!sm.finish_collecting(GcId(3)));
        assert_eq!(sm.state(), GcState::Collecting);
        assert_eq!(sm.request_pause(), Ok(false));

        assert!(sm.finish_collecting(GcId(4)));
        assert_eq!(sm.state(), GcState::Idle);
        assert!(!sm.finish_collecting(GcId(4)));
    }

    #[test]
    fn test_ready_while_idle_is_ignored() {
        let sm = GcStateMachine::new();
        assert!(!sm.notify_ready_to_gc());
        assert_eq!(sm.state(), GcState::Idle);
    }

    #[test]
    fn test_begin_collecting_requires_paused() {
        let sm = GcStateMachine::new();
        assert_eq!(
            sm.begin_collecting(GcId(1)),
            Err(GcError::InvalidState {
                expected: GcState::Paused,
                found: GcState::Idle
            })
        );
    }

    #[test]
    fn test_wait_times_out() {
        let sm = GcStateMachine::new();
        sm.request_pause().unwrap();
        let err = sm.wait_until_paused(Duration::from_millis(20)).unwrap_err();
        assert!(matches!(err, GcError::PauseTimeout { .. }));
        assert_eq!(sm.state(), GcState::PauseRequested);
        assert!(sm.cancel_pause());
        assert_eq!(sm.state(), GcState::Idle);
    }

    #[test]
    fn test_wait_wakes_on_ready() {
        let sm = Arc::new(GcStateMachine::new());
        sm.request_pause().unwrap();

        let notifier = ReadyNotifier::new(Arc::clone(&sm));
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            notifier.notify_ready_to_gc()
        });

        assert!(sm.wait_until_paused(Duration::from_secs(5)).is_ok());
        assert!(handle.join().unwrap());
    }

    #[test]
    fn test_wait_reports_cancellation() {
        let sm = Arc::new(GcStateMachine::new());
        sm.request_pause().unwrap();

        let canceller = Arc::clone(&sm);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            canceller.cancel_pause()
        });

        assert_eq!(
            sm.wait_until_paused(Duration::from_secs(5)),
            Err(GcError::PauseCancelled)
        );
        assert!(handle.join().unwrap());
    }

    #[test]
    fn test_disable_and_enable() {
        let sm = GcStateMachine::new();
        assert!(sm.disable());
        assert!(sm.is_disabled());
        assert_eq!(sm.request_pause(), Err(GcError::Disabled));
        assert!(sm.enable());
        assert!(!sm.enable());
        assert_eq!(sm.request_pause(), Ok(true));
        assert!(!sm.disable());
    }
}
