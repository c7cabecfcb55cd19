mod common;

use common::{Probe, init_tracing};
use tributary::{Flux, FluxError};

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// A range that counts how much demand it was asked for.
fn metered_range(count: u64, requested: Arc<AtomicU64>) -> Flux<i64> {
    Flux::create(move |sink| {
        let requested = requested.clone();
        let mut next = 0;

        while next < count as i64 && !sink.is_cancelled() {
            sink.next(next);
            next += 1;
        }
        sink.complete();

        requested.store(sink.requested(), Ordering::SeqCst);
    })
}

#[test]
fn map_transforms_each_value() {
    let probe = Probe::unbounded();
    Flux::range(1, 3)
        .map(|x| format!("#{x}"))
        .subscribe_with(probe.subscriber());

    assert_eq!(probe.values(), vec!["#1", "#2", "#3"]);
    assert!(probe.is_complete());
}

#[test]
fn map_panic_becomes_an_error_and_cancels_upstream() {
    init_tracing();

    let pulled = Arc::new(AtomicUsize::new(0));
    let counter = pulled.clone();

    let probe = Probe::unbounded();
    Flux::range(1, 10)
        .do_on_next(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .map(|x| if x == 3 { panic!("three") } else { x })
        .subscribe_with(probe.subscriber());

    assert_eq!(probe.values(), vec![1, 2]);
    assert!(matches!(probe.error(), Some(FluxError::Panicked { .. })));
    assert_eq!(pulled.load(Ordering::SeqCst), 3);
    probe.assert_well_behaved();
}

#[test]
fn try_map_error_terminates() {
    let probe = Probe::unbounded();
    Flux::range(1, 5)
        .try_map(|x| {
            if x < 3 {
                Ok(x)
            } else {
                Err(FluxError::msg("too big"))
            }
        })
        .subscribe_with(probe.subscriber());

    assert_eq!(probe.values(), vec![1, 2]);
    assert_eq!(probe.error().unwrap().to_string(), "too big");
}

#[test]
fn filter_replenishes_dropped_values() {
    let probe = Probe::new(0);
    Flux::range(1, 10)
        .filter(|x| x % 3 == 0)
        .subscribe_with(probe.subscriber());

    probe.request(2);
    assert_eq!(probe.values(), vec![3, 6]);

    probe.request(5);
    assert_eq!(probe.values(), vec![3, 6, 9]);
    assert!(probe.is_complete());
    probe.assert_well_behaved();
}

#[test]
fn take_caps_upstream_demand_and_cancels() {
    let requested = Arc::new(AtomicU64::new(0));
    let probe = Probe::unbounded();

    metered_range(100, requested.clone())
        .take(3)
        .subscribe_with(probe.subscriber());

    assert_eq!(probe.values(), vec![0, 1, 2]);
    assert!(probe.is_complete());
    assert_eq!(probe.terminal_count(), 1);
    assert_eq!(requested.load(Ordering::SeqCst), 0);
}

#[test]
fn take_more_than_available_completes_with_upstream() {
    let probe = Probe::unbounded();
    Flux::range(0, 2).take(10).subscribe_with(probe.subscriber());

    assert_eq!(probe.values(), vec![0, 1]);
    assert!(probe.is_complete());
}

#[test]
fn take_zero_completes_without_values() {
    let emitted = Arc::new(AtomicUsize::new(0));
    let counter = emitted.clone();

    let probe = Probe::unbounded();
    Flux::range(0, 5)
        .do_on_next(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .take(0)
        .subscribe_with(probe.subscriber());

    assert!(probe.values().is_empty());
    assert!(probe.is_complete());
    assert_eq!(emitted.load(Ordering::SeqCst), 0);
}

#[test]
fn skip_drops_the_first_values() {
    let probe = Probe::new(0);
    Flux::range(1, 6).skip(4).subscribe_with(probe.subscriber());

    probe.request(1);
    assert_eq!(probe.values(), vec![5]);

    probe.request(1);
    assert_eq!(probe.values(), vec![5, 6]);
    assert!(probe.is_complete());
}

#[test]
fn distinct_suppresses_repeats() {
    let probe = Probe::unbounded();
    Flux::from_vec(vec![1, 2, 1, 3, 2, 4])
        .distinct()
        .subscribe_with(probe.subscriber());

    assert_eq!(probe.values(), vec![1, 2, 3, 4]);
}

#[test]
fn distinct_state_is_per_subscription() {
    let flux = Flux::from_vec(vec!["x", "y", "x"]).distinct();

    assert_eq!(flux.collect_list().block_last().unwrap(), Some(vec!["x", "y"]));
    assert_eq!(flux.collect_list().block_last().unwrap(), Some(vec!["x", "y"]));
}

#[test]
fn peeks_observe_without_changing_the_stream() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let (on_next, on_complete) = (log.clone(), log.clone());

    let probe = Probe::unbounded();
    Flux::range(1, 2)
        .do_on_next(move |x| on_next.lock().unwrap().push(format!("next {x}")))
        .do_on_complete(move || on_complete.lock().unwrap().push("complete".into()))
        .subscribe_with(probe.subscriber());

    assert_eq!(probe.values(), vec![1, 2]);
    assert_eq!(
        *log.lock().unwrap(),
        vec!["next 1".to_string(), "next 2".into(), "complete".into()]
    );
}

#[test]
fn do_on_error_sees_the_error() {
    let seen = Arc::new(Mutex::new(None));
    let slot = seen.clone();

    let result = Flux::<u8>::error(FluxError::msg("bad"))
        .do_on_error(move |e| *slot.lock().unwrap() = Some(e.to_string()))
        .block_last();

    assert!(result.is_err());
    assert_eq!(seen.lock().unwrap().as_deref(), Some("bad"));
}

#[test]
fn operators_are_reusable_descriptions() {
    let doubled = Flux::range(1, 3).map(|x| x * 2);

    assert_eq!(doubled.collect_list().block_last().unwrap(), Some(vec![2, 4, 6]));
    assert_eq!(doubled.count().block_last().unwrap(), Some(3));
}
