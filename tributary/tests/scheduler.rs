mod common;

use common::{WAIT, wait_until};
use tributary::runtime::{default_scheduler, set_default_scheduler, shutdown_default_scheduler};
use tributary::{FluxError, Scheduler};

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn schedule_runs_on_a_named_worker() {
    let scheduler = Scheduler::builder().name("cpu").worker_threads(2).build();
    let name = Arc::new(Mutex::new(None));
    let slot = name.clone();

    let handle = scheduler
        .schedule(move || {
            *slot.lock().unwrap() = thread::current().name().map(str::to_owned);
        })
        .unwrap();

    assert!(wait_until(WAIT, || handle.is_finished()));

    let name = name.lock().unwrap().clone().unwrap();
    assert!(name == "cpu-0" || name == "cpu-1", "unexpected worker {name}");
    assert_eq!(scheduler.name(), "cpu");
    scheduler.dispose();
}

#[test]
fn schedule_after_waits() {
    let scheduler = Scheduler::single();
    let fired = Arc::new(Mutex::new(None));
    let slot = fired.clone();
    let started = Instant::now();

    scheduler
        .schedule_after(Duration::from_millis(30), move || {
            *slot.lock().unwrap() = Some(Instant::now());
        })
        .unwrap();

    assert!(wait_until(WAIT, || fired.lock().unwrap().is_some()));

    let fired_at = fired.lock().unwrap().unwrap();
    assert!(fired_at.duration_since(started) >= Duration::from_millis(30));
    scheduler.dispose();
}

#[test]
fn periodic_tasks_repeat_until_cancelled() {
    let scheduler = Scheduler::single();
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = runs.clone();

    let handle = scheduler
        .schedule_periodic(Duration::ZERO, Duration::from_millis(5), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    assert!(wait_until(WAIT, || runs.load(Ordering::SeqCst) >= 3));

    assert!(handle.cancel());
    assert!(handle.is_cancelled());

    // A run already in flight may still land.
    thread::sleep(Duration::from_millis(20));
    let settled = runs.load(Ordering::SeqCst);
    thread::sleep(Duration::from_millis(30));
    assert_eq!(runs.load(Ordering::SeqCst), settled);

    scheduler.dispose();
}

#[test]
fn cancelled_delayed_task_never_runs() {
    let scheduler = Scheduler::single();
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = runs.clone();

    let handle = scheduler
        .schedule_after(Duration::from_millis(30), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    assert!(handle.cancel());
    assert!(!handle.cancel());

    thread::sleep(Duration::from_millis(60));
    assert_eq!(runs.load(Ordering::SeqCst), 0);
    assert!(handle.is_finished());
    scheduler.dispose();
}

#[test]
fn zero_period_is_rejected() {
    let scheduler = Scheduler::single();

    let error = scheduler
        .schedule_periodic(Duration::ZERO, Duration::ZERO, || {})
        .unwrap_err();

    assert!(matches!(error, FluxError::SchedulerRejected { .. }));
    scheduler.dispose();
}

#[test]
fn disposed_scheduler_refuses_work() {
    let scheduler = Scheduler::parallel();
    scheduler.dispose();
    scheduler.dispose();

    assert!(scheduler.is_disposed());
    assert!(matches!(
        scheduler.schedule(|| {}),
        Err(FluxError::SchedulerShutdown { .. })
    ));
    assert!(matches!(
        scheduler.schedule_after(Duration::from_millis(1), || {}),
        Err(FluxError::SchedulerShutdown { .. })
    ));
}

#[test]
fn dispose_finishes_pending_timers_and_queued_tasks() {
    let scheduler = Scheduler::single();
    let (release, blocked) = mpsc::channel::<()>();
    let (started, running) = mpsc::channel::<()>();

    let busy = scheduler
        .schedule(move || {
            let _ = started.send(());
            let _ = blocked.recv();
        })
        .unwrap();
    running.recv_timeout(WAIT).unwrap();

    let queued = scheduler.schedule(|| {}).unwrap();
    let timer = scheduler
        .schedule_after(Duration::from_secs(3600), || {})
        .unwrap();

    let disposer = {
        let scheduler = scheduler.clone();
        thread::spawn(move || scheduler.dispose())
    };

    assert!(wait_until(WAIT, || queued.is_cancelled() && timer.is_cancelled()));
    assert!(!busy.is_finished());

    release.send(()).unwrap();
    disposer.join().unwrap();
    assert!(busy.is_finished());
    assert!(!busy.is_cancelled());
}

#[test]
fn cancelled_timers_release_their_closures() {
    let scheduler = Scheduler::single();
    let token = Arc::new(());

    for _ in 0..1000 {
        let held = token.clone();
        let handle = scheduler
            .schedule_after(Duration::from_secs(3600), move || drop(held))
            .unwrap();
        handle.cancel();
    }

    assert!(wait_until(WAIT, || Arc::strong_count(&token) < 200));

    let fired = Arc::new(AtomicUsize::new(0));
    let counter = fired.clone();
    scheduler
        .schedule_after(Duration::from_millis(5), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    assert!(wait_until(WAIT, || fired.load(Ordering::SeqCst) == 1));
    scheduler.dispose();
    assert_eq!(Arc::strong_count(&token), 1);
}

#[test]
fn immediate_scheduler_runs_inline_and_rejects_timers() {
    let scheduler = Scheduler::immediate();
    let caller = thread::current().id();
    let ran_on = Arc::new(Mutex::new(None));
    let slot = ran_on.clone();

    let handle = scheduler
        .schedule(move || *slot.lock().unwrap() = Some(thread::current().id()))
        .unwrap();

    assert!(handle.is_finished());
    assert_eq!(*ran_on.lock().unwrap(), Some(caller));

    assert!(matches!(
        scheduler.schedule_after(Duration::from_millis(1), || {}),
        Err(FluxError::SchedulerRejected { .. })
    ));
}

#[test]
fn panicking_task_does_not_kill_the_worker() {
    let scheduler = Scheduler::single();

    scheduler.schedule(|| panic!("task failed")).unwrap();

    let runs = Arc::new(AtomicUsize::new(0));
    let counter = runs.clone();
    scheduler
        .schedule(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    assert!(wait_until(WAIT, || runs.load(Ordering::SeqCst) == 1));
    scheduler.dispose();
}

#[test]
fn default_scheduler_can_be_replaced() {
    let first = default_scheduler();
    assert!(!first.is_disposed());

    let custom = Scheduler::builder().name("custom").worker_threads(1).build();
    set_default_scheduler(custom);
    assert_eq!(default_scheduler().name(), "custom");

    shutdown_default_scheduler();
    first.dispose();

    let fresh = default_scheduler();
    assert!(!fresh.is_disposed());
    shutdown_default_scheduler();
}
