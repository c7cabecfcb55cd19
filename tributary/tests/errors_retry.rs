mod common;

use common::{Probe, WAIT, init_tracing};
use tributary::{Flux, FluxError, Scheduler};

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Emits `1, 2`, then fails on the first `failures` subscriptions and
/// completes afterwards.
fn flaky(failures: usize, subscriptions: Arc<AtomicUsize>) -> Flux<i32> {
    Flux::defer(move || {
        let attempt = subscriptions.fetch_add(1, Ordering::SeqCst);

        let tail = if attempt < failures {
            Flux::error(FluxError::msg(format!("attempt {attempt} failed")))
        } else {
            Flux::empty()
        };

        Flux::from_vec(vec![1, 2]).concat_with(tail)
    })
}

#[test]
fn on_error_return_emits_the_fallback_value() {
    let probe = Probe::unbounded();
    Flux::from_vec(vec![1, 2])
        .concat_with(Flux::error(FluxError::msg("boom")))
        .on_error_return(-1)
        .subscribe_with(probe.subscriber());

    assert_eq!(probe.values(), vec![1, 2, -1]);
    assert!(probe.is_complete());
    probe.assert_well_behaved();
}

#[test]
fn on_error_return_waits_for_demand() {
    let probe = Probe::new(1);
    Flux::<i32>::error(FluxError::msg("boom"))
        .on_error_return(7)
        .subscribe_with(probe.subscriber());

    assert_eq!(probe.values(), vec![7]);
    assert!(probe.is_complete());
}

#[test]
fn on_error_resume_switches_to_the_fallback() {
    let probe = Probe::new(0);
    Flux::range(1, 2)
        .concat_with(Flux::error(FluxError::msg("boom")))
        .on_error_resume(|error| {
            assert_eq!(error.to_string(), "boom");
            Flux::range(10, 3)
        })
        .subscribe_with(probe.subscriber());

    probe.request(3);
    assert_eq!(probe.values(), vec![1, 2, 10]);

    probe.request(10);
    assert_eq!(probe.values(), vec![1, 2, 10, 11, 12]);
    assert!(probe.is_complete());
    probe.assert_well_behaved();
}

#[test]
fn fallback_errors_pass_through() {
    let error = Flux::<i32>::error(FluxError::msg("first"))
        .on_error_resume(|_| Flux::error(FluxError::msg("second")))
        .block_last()
        .unwrap_err();

    assert_eq!(error.to_string(), "second");
}

#[test]
fn protocol_violations_are_not_recovered() {
    init_tracing();

    let probe = Probe::new(0);
    Flux::range(1, 3)
        .on_error_return(0)
        .retry(3)
        .subscribe_with(probe.subscriber());

    probe.request(0);

    let error = probe.error().expect("protocol error");
    assert!(!error.is_recoverable());
    assert!(probe.values().is_empty());
}

#[test]
fn retry_succeeds_within_budget() {
    let subscriptions = Arc::new(AtomicUsize::new(0));

    let values = flaky(2, subscriptions.clone())
        .retry(2)
        .collect_list()
        .block_last()
        .unwrap();

    assert_eq!(values, Some(vec![1, 2, 1, 2, 1, 2]));
    assert_eq!(subscriptions.load(Ordering::SeqCst), 3);
}

#[test]
fn retry_exhaustion_delivers_the_last_error() {
    let subscriptions = Arc::new(AtomicUsize::new(0));

    let probe = Probe::unbounded();
    flaky(5, subscriptions.clone())
        .retry(2)
        .subscribe_with(probe.subscriber());

    assert_eq!(subscriptions.load(Ordering::SeqCst), 3);
    assert_eq!(probe.values(), vec![1, 2, 1, 2, 1, 2]);
    assert_eq!(probe.error().unwrap().to_string(), "attempt 2 failed");
    probe.assert_well_behaved();
}

#[test]
fn retry_zero_is_a_passthrough() {
    let subscriptions = Arc::new(AtomicUsize::new(0));

    let error = flaky(1, subscriptions.clone())
        .retry(0)
        .block_last()
        .unwrap_err();

    assert_eq!(error.to_string(), "attempt 0 failed");
    assert_eq!(subscriptions.load(Ordering::SeqCst), 1);
}

#[test]
fn retry_budget_belongs_to_each_subscription() {
    let subscriptions = Arc::new(AtomicUsize::new(0));
    let failing = Flux::defer({
        let subscriptions = subscriptions.clone();
        move || {
            subscriptions.fetch_add(1, Ordering::SeqCst);
            Flux::<i32>::error(FluxError::msg("always"))
        }
    })
    .retry(1);

    assert!(failing.block_last().is_err());
    assert!(failing.block_last().is_err());
    assert_eq!(subscriptions.load(Ordering::SeqCst), 4);
}

#[test]
fn retry_carries_outstanding_demand_over() {
    let subscriptions = Arc::new(AtomicUsize::new(0));

    let probe = Probe::new(0);
    flaky(1, subscriptions)
        .retry(1)
        .subscribe_with(probe.subscriber());

    probe.request(3);
    assert_eq!(probe.values(), vec![1, 2, 1]);

    probe.request(1);
    assert_eq!(probe.values(), vec![1, 2, 1, 2]);
    assert!(probe.is_complete());
    probe.assert_well_behaved();
}

#[test]
fn pending_retry_fails_when_its_scheduler_is_disposed() {
    let scheduler = Scheduler::single();
    let subscriptions = Arc::new(AtomicUsize::new(0));
    let probe = Probe::unbounded();

    flaky(5, subscriptions.clone())
        .retry_with_interval(3, Duration::from_secs(3600), &scheduler)
        .subscribe_with(probe.subscriber());

    assert_eq!(probe.values(), vec![1, 2]);
    scheduler.dispose();

    assert!(probe.await_terminal(WAIT));
    assert!(matches!(probe.error(), Some(FluxError::SchedulerShutdown { .. })));
    assert_eq!(subscriptions.load(Ordering::SeqCst), 1);
}

#[test]
fn retry_with_interval_waits_between_attempts() {
    let scheduler = Scheduler::single();
    let subscriptions = Arc::new(AtomicUsize::new(0));
    let started = Instant::now();

    let values = flaky(2, subscriptions.clone())
        .retry_with_interval(3, Duration::from_millis(20), &scheduler)
        .collect_list()
        .block_last()
        .unwrap();

    assert_eq!(values, Some(vec![1, 2, 1, 2, 1, 2]));
    assert!(started.elapsed() >= Duration::from_millis(40));
    assert_eq!(subscriptions.load(Ordering::SeqCst), 3);
    scheduler.dispose();
}
