mod common;

use common::{Probe, WAIT, init_tracing};
use tributary::{DemandPolicy, Flux, FluxError, FluxSink, PublishConfig, Scheduler};

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A hot-ish source whose sink the test drives by hand.
fn manual() -> (Flux<i32>, Arc<Mutex<Option<FluxSink<i32>>>>) {
    let slot = Arc::new(Mutex::new(None));
    let producer_slot = slot.clone();

    let flux = Flux::create(move |sink| {
        *producer_slot.lock().unwrap() = Some(sink);
    });

    (flux, slot)
}

fn sink(slot: &Arc<Mutex<Option<FluxSink<i32>>>>) -> FluxSink<i32> {
    slot.lock().unwrap().clone().expect("connected")
}

#[test]
fn nothing_flows_before_connect() {
    init_tracing();

    let subscriptions = Arc::new(AtomicUsize::new(0));
    let counter = subscriptions.clone();

    let hot = Flux::defer(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Flux::range(1, 3)
    })
    .publish();

    let probe = Probe::unbounded();
    hot.flux().subscribe_with(probe.subscriber());

    assert!(probe.is_subscribed());
    assert!(probe.signals().is_empty());
    assert_eq!(subscriptions.load(Ordering::SeqCst), 0);

    hot.connect();

    assert_eq!(probe.values(), vec![1, 2, 3]);
    assert!(probe.is_complete());
    assert_eq!(subscriptions.load(Ordering::SeqCst), 1);
}

#[test]
fn late_subscribers_only_see_future_values() {
    let (source, slot) = manual();
    let hot = source.publish();

    let early = Probe::unbounded();
    hot.flux().subscribe_with(early.subscriber());
    hot.connect();

    let sink = sink(&slot);
    sink.next(1);
    sink.next(2);

    let late = Probe::unbounded();
    hot.flux().subscribe_with(late.subscriber());

    sink.next(3);
    sink.next(4);
    sink.complete();

    assert_eq!(early.values(), vec![1, 2, 3, 4]);
    assert_eq!(late.values(), vec![3, 4]);
    assert!(early.is_complete());
    assert!(late.is_complete());
    early.assert_well_behaved();
    late.assert_well_behaved();
}

#[test]
fn hot_interval_late_subscriber_sees_only_future_ticks() {
    init_tracing();

    let scheduler = Scheduler::single();
    let hot = Flux::interval(Duration::from_millis(100), &scheduler)
        .take(5)
        .publish();

    let first = Probe::unbounded();
    hot.flux().subscribe_with(first.subscriber());
    hot.connect();

    assert!(first.await_values(3, WAIT));

    let late = Probe::unbounded();
    hot.flux().subscribe_with(late.subscriber());

    assert!(first.await_terminal(WAIT));
    assert!(late.await_terminal(WAIT));
    assert_eq!(first.values(), vec![0, 1, 2, 3, 4]);
    assert_eq!(late.values(), vec![3, 4]);
    assert!(late.is_complete());
    first.assert_well_behaved();
    late.assert_well_behaved();

    scheduler.dispose();
}

#[test]
fn repeated_cancel_does_not_evict_a_newer_subscriber() {
    let (source, slot) = manual();
    let hot = source.publish();
    hot.connect();

    let first = Probe::unbounded();
    hot.flux().subscribe_with(first.subscriber());
    first.cancel();

    // The second subscriber takes over the slot the first one vacated.
    let second = Probe::unbounded();
    hot.flux().subscribe_with(second.subscriber());
    first.cancel();
    assert_eq!(hot.subscriber_count(), 1);

    let sink = sink(&slot);
    sink.next(1);
    sink.next(2);
    sink.complete();

    assert!(first.values().is_empty());
    assert_eq!(second.values(), vec![1, 2]);
    assert!(second.is_complete());
    second.assert_well_behaved();
}

#[test]
fn connect_subscribes_upstream_once() {
    let subscriptions = Arc::new(AtomicUsize::new(0));
    let counter = subscriptions.clone();

    let hot = Flux::defer(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Flux::<i32>::never()
    })
    .publish();

    let first = hot.connect();
    let second = hot.connect();

    assert_eq!(subscriptions.load(Ordering::SeqCst), 1);
    assert!(hot.is_connected());

    second.dispose();
    assert!(first.is_disposed());
}

#[test]
fn values_without_subscribers_are_dropped() {
    let (source, slot) = manual();
    let hot = source.publish();
    hot.connect();

    let sink = sink(&slot);
    sink.next(1);
    sink.next(2);

    let probe = Probe::unbounded();
    hot.flux().subscribe_with(probe.subscriber());
    sink.next(3);

    assert_eq!(probe.values(), vec![3]);
}

#[test]
fn terminal_is_replayed_to_late_subscribers() {
    let hot = Flux::<i32>::error(FluxError::msg("gone")).publish();
    hot.connect();

    let late = Probe::unbounded();
    hot.flux().subscribe_with(late.subscriber());

    assert_eq!(late.error().unwrap().to_string(), "gone");
    assert!(late.values().is_empty());
    late.assert_well_behaved();
}

#[test]
fn min_policy_is_paced_by_the_slowest_subscriber() {
    let (source, slot) = manual();
    let hot = source.publish();

    let fast = Probe::unbounded();
    let slow = Probe::new(1);
    hot.flux().subscribe_with(fast.subscriber());
    hot.flux().subscribe_with(slow.subscriber());
    hot.connect();

    let sink = sink(&slot);
    for i in 0..4 {
        sink.next(i);
    }

    assert_eq!(fast.values(), vec![0]);
    assert_eq!(slow.values(), vec![0]);

    slow.request(2);
    assert_eq!(fast.values(), vec![0, 1, 2]);
    assert_eq!(slow.values(), vec![0, 1, 2]);

    fast.assert_well_behaved();
    slow.assert_well_behaved();
}

#[test]
fn max_policy_lets_the_fastest_subscriber_run_ahead() {
    let (source, slot) = manual();
    let hot = source.publish_with(PublishConfig::new().demand_policy(DemandPolicy::Max));

    let fast = Probe::unbounded();
    let slow = Probe::new(1);
    hot.flux().subscribe_with(fast.subscriber());
    hot.flux().subscribe_with(slow.subscriber());
    hot.connect();

    let sink = sink(&slot);
    for i in 0..4 {
        sink.next(i);
    }

    assert_eq!(fast.values(), vec![0, 1, 2, 3]);
    assert_eq!(slow.values(), vec![0]);

    slow.request(10);
    assert_eq!(slow.values(), vec![0, 1, 2, 3]);
    slow.assert_well_behaved();
}

#[test]
fn cancelled_subscriber_stops_gating_the_others() {
    let (source, slot) = manual();
    let hot = source.publish();

    let fast = Probe::unbounded();
    let stalled = Probe::new(0);
    hot.flux().subscribe_with(fast.subscriber());
    hot.flux().subscribe_with(stalled.subscriber());
    hot.connect();

    let sink = sink(&slot);
    sink.next(1);
    assert!(fast.values().is_empty());

    stalled.cancel();
    assert_eq!(fast.values(), vec![1]);
    assert_eq!(hot.subscriber_count(), 1);
}

#[test]
fn upstream_demand_is_prefetched_and_replenished() {
    let (source, slot) = manual();
    let hot = source.publish_with(PublishConfig::new().prefetch(4));
    hot.connect();

    let sink = sink(&slot);
    assert_eq!(sink.requested(), 4);

    sink.next(1);
    sink.next(2);
    assert_eq!(sink.requested(), 2);

    // Three of four consumed: the used demand is requested again.
    sink.next(3);
    assert_eq!(sink.requested(), 4);
}

#[test]
fn disconnect_stops_delivery_without_a_terminal() {
    let (source, slot) = manual();
    let hot = source.publish();

    let probe = Probe::unbounded();
    hot.flux().subscribe_with(probe.subscriber());
    let connection = hot.connect();

    let sink = sink(&slot);
    sink.next(1);

    connection.dispose();
    connection.dispose();

    assert!(sink.is_cancelled());
    assert!(!sink.next(2));
    assert_eq!(probe.values(), vec![1]);
    assert_eq!(probe.terminal_count(), 0);
}

#[test]
fn auto_connect_waits_for_enough_subscribers() {
    let subscriptions = Arc::new(AtomicUsize::new(0));
    let counter = subscriptions.clone();

    let shared = Flux::defer(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Flux::range(1, 2)
    })
    .publish()
    .auto_connect(2);

    let first = Probe::unbounded();
    shared.subscribe_with(first.subscriber());
    assert_eq!(subscriptions.load(Ordering::SeqCst), 0);

    let second = Probe::unbounded();
    shared.subscribe_with(second.subscriber());
    assert_eq!(subscriptions.load(Ordering::SeqCst), 1);

    assert_eq!(first.values(), vec![1, 2]);
    assert_eq!(second.values(), vec![1, 2]);
}
