//! Example: Composing operators

use tributary::{Flux, FluxError, Scheduler};

use std::time::Duration;

fn main() {
    let scheduler = Scheduler::parallel();
    let s = scheduler.clone();

    let squares = Flux::range(1, 10)
        .filter(|x| x % 2 == 1)
        .map(|x| x * x)
        .collect_list()
        .block_last();
    println!("odd squares: {squares:?}");

    // Inner streams run concurrently, output keeps the outer order.
    let ordered = Flux::from_vec(vec![3u64, 2, 1])
        .flat_map_sequential(
            move |x| Flux::just(x).delay_elements(Duration::from_millis(x * 20), &s),
            usize::MAX,
        )
        .collect_list()
        .block_last();
    println!("in order: {ordered:?}");

    let pairs = Flux::zip(Flux::range(1, 3), Flux::from_vec(vec!["one", "two", "three"]))
        .collect_list()
        .block_last();
    println!("zipped: {pairs:?}");

    let recovered = Flux::range(1, 2)
        .concat_with(Flux::error(FluxError::msg("sensor offline")))
        .on_error_return(-1)
        .collect_list()
        .block_last();
    println!("recovered: {recovered:?}");

    scheduler.dispose();
}
