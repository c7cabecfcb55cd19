#![allow(dead_code)]

use tributary::{FluxError, Signal, Subscriber, Subscription, UNBOUNDED};

use tracing_subscriber::EnvFilter;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

pub const WAIT: Duration = Duration::from_secs(5);

/// Installs a test-friendly `tracing` subscriber, once per test binary.
///
/// Filter with `RUST_LOG`, e.g. `RUST_LOG=tributary=trace`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Polls `condition` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;

    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }

    condition()
}

struct ProbeState<T> {
    signals: Mutex<Vec<Signal<T>>>,
    changed: Condvar,
    subscription: Mutex<Option<Arc<dyn Subscription>>>,
    subscribe_calls: AtomicU64,
    granted: AtomicU64,
    received: AtomicU64,
    overrun: AtomicBool,
    after_terminal: AtomicBool,
}

/// Recording subscriber whose demand is driven by the test.
pub struct Probe<T> {
    state: Arc<ProbeState<T>>,
    initial: u64,
}

impl<T> Clone for Probe<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            initial: self.initial,
        }
    }
}

impl<T: Clone + Send + 'static> Probe<T> {
    /// A probe that requests `initial` on subscription (nothing if 0).
    pub fn new(initial: u64) -> Self {
        Self {
            state: Arc::new(ProbeState {
                signals: Mutex::new(Vec::new()),
                changed: Condvar::new(),
                subscription: Mutex::new(None),
                subscribe_calls: AtomicU64::new(0),
                granted: AtomicU64::new(0),
                received: AtomicU64::new(0),
                overrun: AtomicBool::new(false),
                after_terminal: AtomicBool::new(false),
            }),
            initial,
        }
    }

    /// A probe requesting everything.
    pub fn unbounded() -> Self {
        Self::new(UNBOUNDED)
    }

    pub fn subscriber(&self) -> Box<dyn Subscriber<T>> {
        Box::new(self.clone())
    }

    pub fn request(&self, n: u64) {
        self.grant(n);

        let subscription = self.state.subscription.lock().unwrap().clone();
        subscription.expect("not subscribed").request(n);
    }

    pub fn cancel(&self) {
        let subscription = self.state.subscription.lock().unwrap().clone();
        subscription.expect("not subscribed").cancel();
    }

    pub fn is_subscribed(&self) -> bool {
        self.state.subscribe_calls.load(Ordering::Acquire) > 0
    }

    pub fn signals(&self) -> Vec<Signal<T>> {
        self.state.signals.lock().unwrap().clone()
    }

    pub fn values(&self) -> Vec<T> {
        self.signals()
            .into_iter()
            .filter_map(Signal::into_next)
            .collect()
    }

    pub fn terminal_count(&self) -> usize {
        self.signals().iter().filter(|s| s.is_terminal()).count()
    }

    pub fn is_complete(&self) -> bool {
        self.signals()
            .iter()
            .any(|s| matches!(s, Signal::Complete))
    }

    pub fn error(&self) -> Option<FluxError> {
        self.signals().into_iter().find_map(|s| match s {
            Signal::Error(e) => Some(e),
            _ => None,
        })
    }

    /// Blocks until a terminal signal was recorded.
    pub fn await_terminal(&self, timeout: Duration) -> bool {
        self.await_signals(timeout, |signals| signals.iter().any(Signal::is_terminal))
    }

    /// Blocks until at least `n` values were recorded.
    pub fn await_values(&self, n: usize, timeout: Duration) -> bool {
        self.await_signals(timeout, |signals| {
            signals.iter().filter(|s| !s.is_terminal()).count() >= n
        })
    }

    /// Asserts the protocol was respected: one `on_subscribe`, no value
    /// beyond granted demand, nothing after a terminal, at most one terminal.
    pub fn assert_well_behaved(&self) {
        assert_eq!(self.state.subscribe_calls.load(Ordering::Acquire), 1);
        assert!(!self.state.overrun.load(Ordering::Acquire), "demand overrun");
        assert!(
            !self.state.after_terminal.load(Ordering::Acquire),
            "signal after terminal"
        );
        assert!(self.terminal_count() <= 1, "more than one terminal");
    }

    fn await_signals(&self, timeout: Duration, done: impl Fn(&[Signal<T>]) -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        let mut signals = self.state.signals.lock().unwrap();

        while !done(&signals) {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }

            signals = self
                .state
                .changed
                .wait_timeout(signals, deadline - now)
                .unwrap()
                .0;
        }

        true
    }

    fn grant(&self, n: u64) {
        let _ = self
            .state
            .granted
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |g| {
                (g != UNBOUNDED).then(|| g.saturating_add(n))
            });
    }

    fn record(&self, signal: Signal<T>) {
        let mut signals = self.state.signals.lock().unwrap();

        if signals.iter().any(Signal::is_terminal) {
            self.state.after_terminal.store(true, Ordering::Release);
        }

        signals.push(signal);
        self.state.changed.notify_all();
    }
}

impl<T: Clone + Send + 'static> Subscriber<T> for Probe<T> {
    fn on_subscribe(&mut self, subscription: Arc<dyn Subscription>) {
        self.state.subscribe_calls.fetch_add(1, Ordering::AcqRel);
        *self.state.subscription.lock().unwrap() = Some(subscription.clone());

        if self.initial > 0 {
            self.grant(self.initial);
            subscription.request(self.initial);
        }
    }

    fn on_next(&mut self, value: T) {
        let received = self.state.received.fetch_add(1, Ordering::AcqRel) + 1;
        let granted = self.state.granted.load(Ordering::Acquire);

        if granted != UNBOUNDED && received > granted {
            self.state.overrun.store(true, Ordering::Release);
        }

        self.record(Signal::Next(value));
    }

    fn on_error(&mut self, error: FluxError) {
        self.record(Signal::Error(error));
    }

    fn on_complete(&mut self) {
        self.record(Signal::Complete);
    }
}
