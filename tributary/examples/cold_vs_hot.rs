//! Example: Cold replay versus a shared hot publisher

use tributary::{Flux, Scheduler};

use std::thread;
use std::time::Duration;

fn main() {
    let scheduler = Scheduler::single();

    // Cold: every subscriber gets its own run from the first value.
    let cold = Flux::interval(Duration::from_millis(50), &scheduler).take(4);
    println!("cold first:  {:?}", cold.collect_list().block_last());
    println!("cold second: {:?}", cold.collect_list().block_last());

    // Hot: one upstream run, shared; late subscribers miss earlier ticks.
    let hot = Flux::interval(Duration::from_millis(50), &scheduler)
        .take(6)
        .publish();

    let early = hot.flux();
    let early = thread::spawn(move || early.collect_list().block_last());

    thread::sleep(Duration::from_millis(20));
    let connection = hot.connect();

    thread::sleep(Duration::from_millis(160));
    println!("late:        {:?}", hot.flux().collect_list().block_last());
    println!("early:       {:?}", early.join().unwrap());

    connection.dispose();
    scheduler.dispose();
}
