//! Example: Driving demand by hand

use tributary::{Flux, FluxError, Subscriber, Subscription};

use std::sync::{Arc, Mutex};

struct Printer {
    subscription: Arc<Mutex<Option<Arc<dyn Subscription>>>>,
}

impl Subscriber<i64> for Printer {
    fn on_subscribe(&mut self, subscription: Arc<dyn Subscription>) {
        println!("subscribed, requesting 2");
        subscription.request(2);
        *self.subscription.lock().unwrap() = Some(subscription);
    }

    fn on_next(&mut self, value: i64) {
        println!("received {value}");
    }

    fn on_error(&mut self, error: FluxError) {
        println!("failed: {error}");
    }

    fn on_complete(&mut self) {
        println!("completed");
    }
}

fn main() {
    let slot = Arc::new(Mutex::new(None));

    Flux::range(1, 5).subscribe_with(Box::new(Printer {
        subscription: slot.clone(),
    }));

    // Nothing more arrives until we ask for it.
    let subscription = slot.lock().unwrap().clone().unwrap();
    println!("requesting 3 more");
    subscription.request(3);
}
