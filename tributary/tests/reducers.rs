mod common;

use common::Probe;
use tributary::{Flux, FluxError};

use std::cmp::Reverse;

#[test]
fn reduce_sums_a_range() {
    let sum = Flux::range(1, 5)
        .reduce(0, |acc, x| acc + x)
        .block_last()
        .unwrap();

    assert_eq!(sum, Some(15));
}

#[test]
fn reduce_of_empty_emits_the_seed() {
    let sum = Flux::<i64>::empty()
        .reduce(42, |acc, x| acc + x)
        .block_last()
        .unwrap();

    assert_eq!(sum, Some(42));
}

#[test]
fn reduce_emits_nothing_but_the_error_on_failure() {
    let probe = Probe::unbounded();

    Flux::range(1, 3)
        .concat_with(Flux::error(FluxError::msg("upstream failed")))
        .reduce(0, |acc, x| acc + x)
        .subscribe_with(probe.subscriber());

    assert!(probe.values().is_empty());
    assert_eq!(probe.error().unwrap().to_string(), "upstream failed");
    probe.assert_well_behaved();
}

#[test]
fn reduce_waits_for_downstream_demand() {
    let probe = Probe::new(0);
    Flux::range(1, 4)
        .reduce(1, |acc, x| acc * x)
        .subscribe_with(probe.subscriber());

    assert!(probe.signals().is_empty());

    probe.request(1);
    assert_eq!(probe.values(), vec![24]);
    assert!(probe.is_complete());
}

#[test]
fn reduce_panic_becomes_an_error() {
    let error = Flux::range(1, 3)
        .reduce(0, |acc, x| if x == 2 { panic!("fold exploded") } else { acc + x })
        .block_last()
        .unwrap_err();

    assert!(matches!(error, FluxError::Panicked { .. }));
}

#[test]
fn collect_list_keeps_every_value() {
    let list = Flux::from_vec(vec!['a', 'b', 'c'])
        .collect_list()
        .block_last()
        .unwrap();

    assert_eq!(list, Some(vec!['a', 'b', 'c']));
}

#[test]
fn collect_list_of_empty_is_an_empty_list() {
    let list = Flux::<u8>::empty().collect_list().block_last().unwrap();
    assert_eq!(list, Some(Vec::new()));
}

#[test]
fn count_counts() {
    assert_eq!(Flux::range(0, 1_000).count().block_last().unwrap(), Some(1_000));
    assert_eq!(Flux::<u8>::never().take(0).count().block_last().unwrap(), Some(0));
}

#[test]
fn sort_buffers_then_emits_in_order() {
    let probe = Probe::new(0);
    Flux::from_vec(vec![3, 1, 2])
        .sort()
        .subscribe_with(probe.subscriber());

    probe.request(2);
    assert_eq!(probe.values(), vec![1, 2]);

    probe.request(1);
    assert_eq!(probe.values(), vec![1, 2, 3]);
    assert!(probe.is_complete());
    probe.assert_well_behaved();
}

#[test]
fn sort_by_uses_the_comparator() {
    let sorted = Flux::from_vec(vec![1, 3, 2])
        .sort_by(|a, b| Reverse(a).cmp(&Reverse(b)))
        .collect_list()
        .block_last()
        .unwrap();

    assert_eq!(sorted, Some(vec![3, 2, 1]));
}

#[test]
fn block_first_takes_the_head() {
    assert_eq!(Flux::range(5, 100).block_first().unwrap(), Some(5));
    assert_eq!(Flux::<u8>::empty().block_first().unwrap(), None);
}
