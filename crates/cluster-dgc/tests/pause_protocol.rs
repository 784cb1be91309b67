//! Pause protocol tests.
//!
//! Every path out of a cycle must leave the collector IDLE with the
//! transaction pipeline resumed.

mod common;

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use cluster_dgc::{
    ClientPinRegistry, CollectionType, FullGcHook, GarbageCollector, GcConfig, GcError, GcId,
    GcState, ImmediateDrain, InFlightGate, InMemoryObjectStore, ObjectAccessPort, ObjectId,
};

use common::{id, set, CountingDrain, DelayedGate, Event, Fixture, RecordingListener, StuckGate};

/// Test that the manual transitions follow the documented state machine.
#[test]
fn test_manual_transitions() {
    let fx = Fixture::new(Arc::new(StuckGate::default()), GcConfig::default());
    assert_eq!(fx.gc.state(), GcState::Idle);
    assert!(!fx.gc.is_pausing_or_paused());

    assert_eq!(fx.gc.request_pause(), Ok(true));
    assert_eq!(fx.gc.state(), GcState::PauseRequested);
    assert!(fx.gc.is_pausing_or_paused());
    assert!(!fx.gc.is_paused());

    // A second request is a no-op.
    assert_eq!(fx.gc.request_pause(), Ok(false));

    assert!(fx.gc.notify_ready_to_gc());
    assert!(fx.gc.is_paused());
    assert!(!fx.gc.notify_ready_to_gc());

    assert!(fx.gc.notify_gc_complete());
    assert_eq!(fx.gc.state(), GcState::Idle);
    assert!(!fx.gc.notify_gc_complete());
}

/// Test that the ready notification is ignored unless a pause was requested.
#[test]
fn test_ready_without_request_ignored() {
    let fx = Fixture::immediate();
    assert!(!fx.gc.notify_ready_to_gc());
    assert!(!fx.gc.ready_notifier().is_pause_requested());
    assert_eq!(fx.gc.state(), GcState::Idle);
}

/// Test that a pipeline that never drains times the cycle out.
#[test]
fn test_pause_timeout_skips_cycle() {
    let gate = Arc::new(StuckGate::default());
    let fx = Fixture::new(
        gate.clone(),
        GcConfig::default().with_pause_timeout(Duration::from_millis(50)),
    );
    fx.store.insert(id(1), Vec::new());

    let err = fx.gc.gc().unwrap_err();

    assert!(matches!(
        err,
        GcError::PauseTimeout { waited } if waited >= Duration::from_millis(50)
    ));
    assert_eq!(fx.gc.state(), GcState::Idle);
    assert_eq!(*gate.requested.lock(), 1);
    assert_eq!(*gate.resumed.lock(), 1);
    assert_eq!(fx.gc.stats().skipped(), 1);
    assert_eq!(fx.gc.stats().completed(), 0);
    assert!(fx.store.contains(id(1)));
}

/// Test that a pipeline draining on another thread lets the cycle proceed.
#[test]
fn test_delayed_drain_completes() {
    let delay = Duration::from_millis(20);
    let fx = Fixture::new(Arc::new(DelayedGate(delay)), GcConfig::default());
    fx.store.insert(id(1), Vec::new());

    let result = fx.gc.gc().unwrap();

    assert_eq!(result.garbage, set(&[1]));
    assert!(result.metrics.pause_wait >= delay);
    assert!(fx.gc.stats().total_pause_wait() >= delay);
    assert_eq!(fx.gc.state(), GcState::Idle);
}

/// Test that the in-flight gate holds the pause until transactions finish.
#[test]
fn test_in_flight_gate_drains_before_collecting() {
    let gate = Arc::new(InFlightGate::new());
    let fx = Fixture::new(gate.clone(), GcConfig::default());
    fx.store.insert(id(1), Vec::new());

    let txn = gate.begin().unwrap();
    let collector = Arc::clone(&fx.gc);
    let cycle = thread::spawn(move || collector.gc());

    while gate.is_admitting() {
        thread::yield_now();
    }
    assert_eq!(fx.gc.state(), GcState::PauseRequested);
    assert!(gate.begin().is_none());
    assert!(fx.store.contains(id(1)));

    drop(txn);
    let result = cycle.join().unwrap().unwrap();

    assert_eq!(result.garbage, set(&[1]));
    assert!(gate.is_admitting());
    assert_eq!(gate.in_flight(), 0);
    assert_eq!(fx.gc.state(), GcState::Idle);
}

/// Test that a cycle cannot start while another pause is in effect.
#[test]
fn test_cycle_in_progress_rejected() {
    let gate = Arc::new(StuckGate::default());
    let fx = Fixture::new(gate.clone(), GcConfig::default());

    assert_eq!(fx.gc.request_pause(), Ok(true));
    assert_eq!(fx.gc.gc().unwrap_err(), GcError::CycleInProgress);

    // The rejected cycle does not disturb the pause it ran into.
    assert_eq!(fx.gc.state(), GcState::PauseRequested);
    assert_eq!(*gate.requested.lock(), 1);
    assert_eq!(fx.gc.stats().skipped(), 1);

    assert!(fx.gc.notify_gc_complete());
    assert_eq!(*gate.resumed.lock(), 1);
}

/// Test that concurrent cycles are serialized by the pause.
#[test]
fn test_concurrent_cycles_one_wins() {
    let fx = Fixture::new(
        Arc::new(DelayedGate(Duration::from_millis(50))),
        GcConfig::default(),
    );

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let collector = Arc::clone(&fx.gc);
            thread::spawn(move || collector.gc())
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let completed = results.iter().filter(|r| r.is_ok()).count();
    let rejected = results
        .iter()
        .filter(|r| matches!(r, Err(GcError::CycleInProgress)))
        .count();
    assert!(completed >= 1);
    assert_eq!(completed + rejected, 4);
    assert_eq!(fx.gc.state(), GcState::Idle);
}

/// Test that a disabled collector refuses cycles until re-enabled.
#[test]
fn test_disable_and_enable() {
    let fx = Fixture::immediate();
    fx.store.insert(id(1), Vec::new());

    assert!(fx.gc.disable_gc());
    assert!(fx.gc.is_disabled());
    assert_eq!(fx.gc.state(), GcState::Disabled);
    assert_eq!(fx.gc.gc().unwrap_err(), GcError::Disabled);
    assert_eq!(fx.gc.request_pause(), Err(GcError::Disabled));
    assert!(fx.store.contains(id(1)));

    assert!(fx.gc.enable_gc());
    assert!(!fx.gc.enable_gc());
    assert_eq!(fx.gc.gc().unwrap().garbage, set(&[1]));
}

/// Test that collection cannot be disabled in the middle of a pause.
#[test]
fn test_disable_refused_while_pausing() {
    let fx = Fixture::new(Arc::new(StuckGate::default()), GcConfig::default());
    fx.gc.request_pause().unwrap();

    assert!(!fx.gc.disable_gc());
    assert_eq!(fx.gc.state(), GcState::PauseRequested);
    fx.gc.notify_gc_complete();
    assert!(fx.gc.disable_gc());
}

/// Test that a cycle is refused before start and after stop.
#[test]
fn test_lifecycle_gates_cycles() {
    let store = Arc::new(InMemoryObjectStore::new());
    let hook = FullGcHook::new(store, Arc::new(ClientPinRegistry::new()));
    let gc = Arc::new(
        GarbageCollector::new(hook, Arc::new(ImmediateDrain), GcConfig::default()).unwrap(),
    );

    assert!(!gc.is_started());
    assert_eq!(gc.gc().unwrap_err(), GcError::NotStarted);
    gc.start().unwrap();
    gc.start().unwrap();
    assert!(gc.is_started());
    assert!(gc.gc().is_ok());
    gc.stop();
    assert!(!gc.is_started());
    assert_eq!(gc.gc().unwrap_err(), GcError::NotStarted);
    assert_eq!(gc.stats().skipped(), 0);
}

/// Root `1 -> 2`, detached `3`.
fn populate(fx: &Fixture) {
    fx.store.insert(id(1), vec![id(2)]);
    fx.store.insert(id(2), Vec::new());
    fx.store.insert(id(3), Vec::new());
    fx.store.create_root("app", id(1)).unwrap();
}

/// Test that a cycle unwinding out of its filter still returns to IDLE and
/// resumes the pipeline.
#[test]
fn test_panicking_filter_releases_pause() {
    let gate = Arc::new(CountingDrain::default());
    let fx = Fixture::new(gate.clone(), GcConfig::default());
    let listener = Arc::new(RecordingListener::default());
    fx.gc.add_listener(listener.clone());
    populate(&fx);

    let exploding = |_: ObjectId| -> bool { panic!("filter failure") };
    let unwound = panic::catch_unwind(AssertUnwindSafe(|| {
        fx.gc.do_gc_with_filter(CollectionType::Full, &exploding)
    }));

    assert!(unwound.is_err());
    assert_eq!(fx.gc.state(), GcState::Idle);
    assert_eq!(*gate.requested.lock(), 1);
    assert_eq!(*gate.resumed.lock(), 1);
    assert_eq!(fx.store.outstanding_lookups(), 0);
    assert!(fx.store.contains(id(3)));
    assert_eq!(fx.gc.stats().failed(), 1);
    assert_eq!(
        listener.events().last(),
        Some(&Event::Failed(GcId(1), GcError::CyclePanicked))
    );

    // The collector is usable again.
    assert_eq!(fx.gc.gc().unwrap().garbage, set(&[3]));
    assert_eq!(*gate.resumed.lock(), 2);
}

/// Test that an outside completion call cannot end the pause of a running
/// cycle.
#[test]
fn test_completion_call_does_not_end_running_cycle() {
    let gate = Arc::new(CountingDrain::default());
    let fx = Fixture::new(gate.clone(), GcConfig::default());
    populate(&fx);

    let entered = Arc::new(Barrier::new(2));
    let proceed = Arc::new(Barrier::new(2));
    let cycle = {
        let collector = Arc::clone(&fx.gc);
        let entered = Arc::clone(&entered);
        let proceed = Arc::clone(&proceed);
        thread::spawn(move || {
            let hold = move |_: ObjectId| {
                entered.wait();
                proceed.wait();
                true
            };
            collector.do_gc_with_filter(CollectionType::Full, &hold)
        })
    };

    entered.wait();
    assert_eq!(fx.gc.state(), GcState::Collecting);
    assert!(!fx.gc.notify_gc_complete());
    assert_eq!(fx.gc.state(), GcState::Collecting);
    assert_eq!(fx.gc.gc().unwrap_err(), GcError::CycleInProgress);
    assert_eq!(*gate.resumed.lock(), 0);

    proceed.wait();
    let result = cycle.join().unwrap().unwrap();
    assert_eq!(result.garbage, set(&[3]));
    assert_eq!(fx.gc.state(), GcState::Idle);
    assert_eq!(*gate.requested.lock(), 1);
    assert_eq!(*gate.resumed.lock(), 1);
}
