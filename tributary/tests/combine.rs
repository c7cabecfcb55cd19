mod common;

use common::{Probe, WAIT};
use tributary::{Flux, FluxError, Scheduler};

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

fn cancel_counter(counter: &Arc<AtomicUsize>) -> Flux<i64> {
    let counter = counter.clone();

    Flux::create(move |sink| {
        let counter = counter.clone();
        sink.on_dispose(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
    })
}

#[test]
fn zip_pairs_positionally() {
    let probe = Probe::unbounded();
    Flux::zip(Flux::range(1, 3), Flux::from_vec(vec!["a", "b", "c", "d"]))
        .subscribe_with(probe.subscriber());

    assert_eq!(probe.values(), vec![(1, "a"), (2, "b"), (3, "c")]);
    assert!(probe.is_complete());
    probe.assert_well_behaved();
}

#[test]
fn zip_completes_and_cancels_the_others_once_a_source_is_exhausted() {
    let cancelled = Arc::new(AtomicUsize::new(0));

    let probe = Probe::unbounded();
    Flux::zip_all(vec![cancel_counter(&cancelled), Flux::empty()])
        .subscribe_with(probe.subscriber());

    assert!(probe.is_complete());
    assert!(probe.values().is_empty());
    assert_eq!(cancelled.load(Ordering::SeqCst), 1);
}

#[test]
fn zip_respects_demand() {
    let probe = Probe::new(0);
    Flux::zip_all(vec![Flux::range(0, 10), Flux::range(100, 10)])
        .subscribe_with(probe.subscriber());

    probe.request(2);
    assert_eq!(probe.values(), vec![vec![0, 100], vec![1, 101]]);

    probe.request(u64::MAX);
    assert_eq!(probe.values().len(), 10);
    assert!(probe.is_complete());
    probe.assert_well_behaved();
}

#[test]
fn zip_with_combines() {
    let sums = Flux::range(1, 3)
        .zip_with(Flux::range(10, 3), |a, b| a + b)
        .collect_list()
        .block_last()
        .unwrap();

    assert_eq!(sums, Some(vec![11, 13, 15]));
}

#[test]
fn zip_error_cancels_the_others() {
    let cancelled = Arc::new(AtomicUsize::new(0));

    let probe = Probe::unbounded();
    Flux::zip_all(vec![
        cancel_counter(&cancelled),
        Flux::error(FluxError::msg("zip source failed")),
    ])
    .subscribe_with(probe.subscriber());

    assert_eq!(probe.error().unwrap().to_string(), "zip source failed");
    assert_eq!(cancelled.load(Ordering::SeqCst), 1);
}

#[test]
fn zip_of_nothing_completes() {
    let probe = Probe::<Vec<i64>>::unbounded();
    Flux::zip_all(Vec::new()).subscribe_with(probe.subscriber());

    assert!(probe.is_complete());
}

#[test]
fn zip_across_threads() {
    let scheduler = Scheduler::parallel();

    let rows = Flux::zip(
        Flux::range(0, 5).delay_elements(Duration::from_millis(3), &scheduler),
        Flux::range(0, 5).subscribe_on(&scheduler),
    )
    .collect_list()
    .block_last_timeout(WAIT)
    .unwrap()
    .unwrap();

    assert_eq!(rows, (0..5).map(|i| (i, i)).collect::<Vec<_>>());
    scheduler.dispose();
}

#[test]
fn merge_interleaves_all_sources() {
    let mut values = Flux::merge(vec![Flux::range(0, 3), Flux::range(10, 3), Flux::range(20, 3)])
        .collect_list()
        .block_last()
        .unwrap()
        .unwrap();

    values.sort_unstable();
    assert_eq!(values, vec![0, 1, 2, 10, 11, 12, 20, 21, 22]);
}

#[test]
fn merge_completes_after_all_sources() {
    let scheduler = Scheduler::parallel();

    let probe = Probe::unbounded();
    Flux::range(0, 2)
        .merge_with(Flux::range(5, 2).delay_elements(Duration::from_millis(10), &scheduler))
        .subscribe_with(probe.subscriber());

    assert_eq!(probe.values(), vec![0, 1]);
    assert!(!probe.is_complete());

    assert!(probe.await_terminal(WAIT));
    assert_eq!(probe.values(), vec![0, 1, 5, 6]);
    assert!(probe.is_complete());
    scheduler.dispose();
}

#[test]
fn merge_first_error_cancels_the_rest() {
    let cancelled = Arc::new(AtomicUsize::new(0));

    let probe = Probe::unbounded();
    Flux::merge(vec![
        cancel_counter(&cancelled),
        Flux::error(FluxError::msg("merge failed")),
        cancel_counter(&cancelled),
    ])
    .subscribe_with(probe.subscriber());

    assert_eq!(probe.error().unwrap().to_string(), "merge failed");
    // The third source is never subscribed.
    assert_eq!(cancelled.load(Ordering::SeqCst), 1);
    probe.assert_well_behaved();
}

#[test]
fn merge_of_nothing_completes() {
    let probe = Probe::<u8>::unbounded();
    Flux::merge(Vec::new()).subscribe_with(probe.subscriber());

    assert!(probe.is_complete());
}

#[test]
fn merge_respects_demand() {
    let probe = Probe::new(3);
    Flux::merge(vec![Flux::range(0, 10), Flux::range(10, 10)]).subscribe_with(probe.subscriber());

    assert_eq!(probe.values().len(), 3);
    probe.assert_well_behaved();
}

#[test]
fn concat_runs_sources_in_sequence() {
    let probe = Probe::new(0);
    Flux::concat(vec![Flux::range(1, 2), Flux::empty(), Flux::range(3, 2)])
        .subscribe_with(probe.subscriber());

    probe.request(3);
    assert_eq!(probe.values(), vec![1, 2, 3]);

    probe.request(1);
    assert_eq!(probe.values(), vec![1, 2, 3, 4]);
    assert!(probe.is_complete());
    probe.assert_well_behaved();
}

#[test]
fn concat_error_skips_later_sources() {
    let subscribed = Arc::new(AtomicUsize::new(0));
    let counter = subscribed.clone();

    let probe = Probe::unbounded();
    Flux::range(1, 2)
        .concat_with(Flux::error(FluxError::msg("stop")))
        .concat_with(Flux::defer(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Flux::range(9, 1)
        }))
        .subscribe_with(probe.subscriber());

    assert_eq!(probe.values(), vec![1, 2]);
    assert_eq!(probe.error().unwrap().to_string(), "stop");
    assert_eq!(subscribed.load(Ordering::SeqCst), 0);
}

#[test]
fn long_synchronous_concat_does_not_overflow_the_stack() {
    let sources = (0..10_000).map(Flux::just).collect::<Vec<_>>();

    let count = Flux::concat(sources).count().block_last().unwrap();
    assert_eq!(count, Some(10_000));
}
