mod common;

use common::{Probe, WAIT, init_tracing};
use tributary::{Flux, FluxError, ProtocolViolation};

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[test]
fn nothing_flows_before_request() {
    init_tracing();

    let probe = Probe::new(0);
    Flux::range(1, 10).subscribe_with(probe.subscriber());

    assert!(probe.is_subscribed());
    assert!(probe.signals().is_empty());
}

#[test]
fn values_never_exceed_demand() {
    let probe = Probe::new(0);
    Flux::range(1, 10).map(|x| x * 2).subscribe_with(probe.subscriber());

    probe.request(3);
    assert_eq!(probe.values(), vec![2, 4, 6]);

    probe.request(2);
    assert_eq!(probe.values(), vec![2, 4, 6, 8, 10]);
    assert!(!probe.is_complete());

    probe.request(100);
    assert_eq!(probe.values().len(), 10);
    assert!(probe.is_complete());

    probe.assert_well_behaved();
}

#[test]
fn demand_saturates_at_unbounded() {
    let probe = Probe::new(u64::MAX);
    Flux::range(0, 5).subscribe_with(probe.subscriber());

    assert_eq!(probe.values(), vec![0, 1, 2, 3, 4]);
    assert!(probe.is_complete());
    probe.assert_well_behaved();
}

#[test]
fn request_zero_is_a_protocol_error() {
    init_tracing();

    let probe = Probe::new(0);
    Flux::range(1, 3).subscribe_with(probe.subscriber());

    probe.request(0);

    match probe.error() {
        Some(FluxError::Protocol(ProtocolViolation::NonPositiveRequest)) => {}
        other => panic!("unexpected terminal: {other:?}"),
    }

    probe.assert_well_behaved();
}

#[test]
fn request_zero_through_an_outlet_is_a_protocol_error() {
    let probe = Probe::new(0);
    Flux::concat(vec![Flux::range(1, 3), Flux::range(4, 3)]).subscribe_with(probe.subscriber());

    probe.request(0);

    let error = probe.error().expect("error terminal");
    assert!(!error.is_recoverable());
    assert_eq!(probe.terminal_count(), 1);
}

#[test]
fn single_terminal_on_error() {
    let probe = Probe::new(u64::MAX);

    Flux::<i32>::create(|sink| {
        sink.next(1);
        sink.error(FluxError::msg("boom"));
        sink.error(FluxError::msg("again"));
        sink.complete();
        sink.next(2);
    })
    .subscribe_with(probe.subscriber());

    assert_eq!(probe.values(), vec![1]);
    assert_eq!(probe.terminal_count(), 1);
    assert_eq!(probe.error().map(|e| e.to_string()), Some("boom".to_string()));
    probe.assert_well_behaved();
}

#[test]
fn cancel_is_idempotent_and_stops_delivery() {
    let probe = Probe::new(0);
    Flux::range(1, 100).subscribe_with(probe.subscriber());

    probe.request(2);
    probe.cancel();
    probe.cancel();
    probe.request(5);

    assert_eq!(probe.values(), vec![1, 2]);
    assert_eq!(probe.terminal_count(), 0);
}

#[test]
fn cancel_from_a_pushing_thread_stops_delivery() {
    let probe = Probe::new(u64::MAX);
    let sink_slot = Arc::new(std::sync::Mutex::new(None));
    let slot = sink_slot.clone();

    Flux::<u32>::create(move |sink| {
        *slot.lock().unwrap() = Some(sink);
    })
    .subscribe_with(probe.subscriber());

    let sink = sink_slot.lock().unwrap().take().unwrap();

    let producer = std::thread::spawn(move || {
        for i in 0..1000 {
            if !sink.next(i) && sink.is_cancelled() {
                return i;
            }
        }
        1000
    });

    probe.await_values(1, WAIT);
    probe.cancel();

    let stopped_at = producer.join().unwrap();
    let seen = probe.values().len();

    assert!(seen as u32 <= stopped_at.max(1));
    assert_eq!(probe.terminal_count(), 0);
}

#[test]
fn cold_publishers_restart_per_subscriber() {
    let subscriptions = Arc::new(AtomicUsize::new(0));
    let counter = subscriptions.clone();

    let flux = Flux::defer(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Flux::range(1, 3)
    });

    let first = Probe::new(u64::MAX);
    let second = Probe::new(0);

    flux.subscribe_with(first.subscriber());
    flux.subscribe_with(second.subscriber());

    assert_eq!(first.values(), vec![1, 2, 3]);
    assert!(second.values().is_empty());

    second.request(1);
    assert_eq!(second.values(), vec![1]);

    assert_eq!(subscriptions.load(Ordering::SeqCst), 2);
}

#[test]
fn reentrant_request_does_not_recurse() {
    use tributary::{Subscriber, Subscription};

    struct OneByOne {
        subscription: Option<Arc<dyn Subscription>>,
        seen: Arc<AtomicUsize>,
    }

    impl Subscriber<i64> for OneByOne {
        fn on_subscribe(&mut self, subscription: Arc<dyn Subscription>) {
            subscription.request(1);
            self.subscription = Some(subscription);
        }

        fn on_next(&mut self, _value: i64) {
            self.seen.fetch_add(1, Ordering::SeqCst);
            if let Some(subscription) = &self.subscription {
                subscription.request(1);
            }
        }

        fn on_error(&mut self, error: FluxError) {
            panic!("unexpected error: {error}");
        }

        fn on_complete(&mut self) {}
    }

    let seen = Arc::new(AtomicUsize::new(0));

    Flux::range(0, 200_000)
        .map(|x| x + 1)
        .subscribe_with(Box::new(OneByOne {
            subscription: None,
            seen: seen.clone(),
        }));

    assert_eq!(seen.load(Ordering::SeqCst), 200_000);
}
