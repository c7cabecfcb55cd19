use crate::core::signal::Terminal;
use crate::core::{Flux, Publisher, Subscriber, Subscription, UNBOUNDED};
use crate::error::FluxError;
use crate::flow::{Outlet, Trampoline, lock};
use crate::utils::Slab;

use tracing::{debug, trace};

use std::collections::VecDeque;
use std::fmt;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};

/// Upstream demand batch used by [`Flux::publish`].
pub const DEFAULT_PREFETCH: u64 = 256;

/// Which subscriber paces a connectable publisher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DemandPolicy {
    /// Values leave the shared buffer only when every subscriber can take
    /// them. The slowest subscriber gates everyone.
    #[default]
    Min,

    /// Values leave the shared buffer as soon as one subscriber can take
    /// them. Slower subscribers queue the surplus in their own buffer.
    Max,
}

/// Configuration of [`Flux::publish_with`].
#[derive(Debug, Clone, Copy)]
pub struct PublishConfig {
    /// Upstream demand batch. Replenished once three quarters of it have
    /// been consumed.
    pub prefetch: u64,

    /// Pacing of the shared buffer.
    pub demand_policy: DemandPolicy,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            prefetch: DEFAULT_PREFETCH,
            demand_policy: DemandPolicy::default(),
        }
    }
}

impl PublishConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the upstream demand batch. Zero is raised to one.
    pub fn prefetch(mut self, prefetch: u64) -> Self {
        self.prefetch = prefetch.max(1);
        self
    }

    /// Sets which subscriber paces the shared upstream.
    pub fn demand_policy(mut self, policy: DemandPolicy) -> Self {
        self.demand_policy = policy;
        self
    }
}

/// Handle on the single upstream subscription of a connectable publisher.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

struct ConnectionInner {
    upstream: Mutex<Option<Arc<dyn Subscription>>>,
    disposed: AtomicBool,
}

impl Connection {
    fn new() -> Self {
        Self {
            inner: Arc::new(ConnectionInner {
                upstream: Mutex::new(None),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    fn attach(&self, upstream: Arc<dyn Subscription>) {
        {
            let mut slot = lock(&self.inner.upstream);

            if !self.is_disposed() {
                *slot = Some(upstream);
                return;
            }
        }

        upstream.cancel();
    }

    /// Cancels the upstream subscription. Idempotent.
    ///
    /// Subscribers stay registered but receive nothing more, not even a
    /// terminal signal.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }

        debug!("connectable publisher disconnected");

        if let Some(upstream) = lock(&self.inner.upstream).take() {
            upstream.cancel();
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// A hot publisher sharing one upstream subscription among all of its
/// subscribers.
///
/// Subscribing only registers a subscriber; nothing flows until
/// [`connect`](Self::connect). Values are not replayed: a subscriber sees the
/// values emitted after it registered. The upstream terminal is delivered to
/// every registered subscriber and to any subscriber arriving later.
pub struct ConnectableFlux<T> {
    core: Arc<PublishCore<T>>,
}

impl<T> Clone for ConnectableFlux<T> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
        }
    }
}

impl<T> fmt::Debug for ConnectableFlux<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectableFlux")
            .field("config", &self.core.config)
            .field("connected", &self.core.connection.get().is_some())
            .finish()
    }
}

impl<T: Clone + Send + 'static> ConnectableFlux<T> {
    fn new(source: Flux<T>, config: PublishConfig) -> Self {
        Self {
            core: Arc::new(PublishCore {
                source,
                config,
                state: Mutex::new(PublishState {
                    subscribers: Slab::default(),
                    buffer: VecDeque::new(),
                    upstream: None,
                    pending: None,
                    terminal: None,
                    consumed: 0,
                }),
                connection: OnceLock::new(),
                trampoline: Trampoline::new(),
            }),
        }
    }

    /// Subscribes to the upstream, once.
    ///
    /// Later calls return the existing connection, even after it was
    /// disposed.
    pub fn connect(&self) -> Connection {
        let mut fresh = false;

        let connection = self
            .core
            .connection
            .get_or_init(|| {
                fresh = true;
                Connection::new()
            })
            .clone();

        if fresh {
            debug!(
                prefetch = self.core.config.prefetch,
                policy = ?self.core.config.demand_policy,
                "connecting"
            );

            self.core.source.subscribe_with(Box::new(PublishUpstream {
                core: self.core.clone(),
                connection: connection.clone(),
            }));
        }

        connection
    }

    /// Returns `true` once [`connect`](Self::connect) was called.
    pub fn is_connected(&self) -> bool {
        self.core.connection.get().is_some()
    }

    /// Number of subscribers currently registered.
    pub fn subscriber_count(&self) -> usize {
        lock(&self.core.state).subscribers.len()
    }

    /// Returns this publisher as a plain `Flux`.
    pub fn flux(&self) -> Flux<T> {
        Flux::from_publisher(self.clone())
    }

    /// Returns a `Flux` that connects this publisher when its `threshold`-th
    /// subscriber registers. With a threshold of 0 it connects right away.
    pub fn auto_connect(&self, threshold: usize) -> Flux<T> {
        if threshold == 0 {
            self.connect();
        }

        Flux::from_publisher(AutoConnect {
            connectable: self.clone(),
            threshold,
            registered: AtomicUsize::new(0),
        })
    }
}

impl<T: Clone + Send + 'static> Publisher<T> for ConnectableFlux<T> {
    fn subscribe(&self, downstream: Box<dyn Subscriber<T>>) {
        let inner = Arc::new(PublishInner {
            outlet: Outlet::new(),
            core: Arc::downgrade(&self.core),
            key: Mutex::new(None),
        });

        let recorded = {
            let mut state = lock(&self.core.state);

            match &state.terminal {
                Some(terminal) => Some(terminal.clone()),
                None => {
                    let key = state.subscribers.insert(inner.clone());
                    *lock(&inner.key) = Some(key);
                    None
                }
            }
        };

        inner.outlet.start(downstream, inner.clone());

        match recorded {
            Some(terminal) => inner.terminate(terminal),
            None => self.core.drain(),
        }
    }
}

struct PublishState<T> {
    subscribers: Slab<Arc<PublishInner<T>>>,

    /// Values received from the upstream and not yet handed to subscribers.
    buffer: VecDeque<T>,

    upstream: Option<Arc<dyn Subscription>>,

    /// Upstream terminal not yet delivered.
    pending: Option<Terminal>,

    /// Upstream terminal already delivered, replayed to late subscribers.
    terminal: Option<Terminal>,

    /// Values taken out of the buffer since the last replenishment.
    consumed: u64,
}

enum Work<T> {
    Deliver(Vec<Arc<PublishInner<T>>>, Vec<T>),
    Terminate(Vec<Arc<PublishInner<T>>>, Terminal),
    Idle,
}

struct PublishCore<T> {
    source: Flux<T>,
    config: PublishConfig,
    state: Mutex<PublishState<T>>,
    connection: OnceLock<Connection>,
    trampoline: Trampoline,
}

impl<T: Clone + Send + 'static> PublishCore<T> {
    fn drain(&self) {
        self.trampoline.run(|| self.drain_once());
    }

    fn drain_once(&self) {
        loop {
            let (work, replenish) = {
                let mut state = lock(&self.state);
                let work = self.next_work(&mut state);
                (work, self.replenish(&mut state))
            };

            if let Some((upstream, n)) = replenish {
                trace!(n, "replenishing shared upstream");
                upstream.request(n);
            }

            match work {
                Work::Deliver(subscribers, values) => {
                    for value in values {
                        for subscriber in &subscribers {
                            subscriber.outlet.push(value.clone());
                        }
                    }
                }
                Work::Terminate(subscribers, terminal) => {
                    debug!(
                        subscribers = subscribers.len(),
                        error = terminal.is_error(),
                        "shared upstream terminated"
                    );

                    for subscriber in subscribers {
                        subscriber.terminate(terminal.clone());
                    }
                    return;
                }
                Work::Idle => return,
            }
        }
    }

    fn next_work(&self, state: &mut PublishState<T>) -> Work<T> {
        let terminate = match &state.pending {
            Some(Terminal::Error(_)) => true,
            Some(Terminal::Complete) => state.buffer.is_empty(),
            None => false,
        };

        if terminate && let Some(terminal) = state.pending.take() {
            state.buffer.clear();
            state.upstream = None;
            state.terminal = Some(terminal.clone());

            let subscribers = state.subscribers.drain();
            for subscriber in &subscribers {
                lock(&subscriber.key).take();
            }

            return Work::Terminate(subscribers, terminal);
        }

        if state.buffer.is_empty() {
            return Work::Idle;
        }

        if state.subscribers.is_empty() {
            let dropped = state.buffer.len();
            trace!(dropped, "no subscribers, dropping values");

            state.buffer.clear();
            state.consumed += dropped as u64;

            // Dropping may make room for a pending completion.
            return if state.pending.is_some() {
                self.next_work(state)
            } else {
                Work::Idle
            };
        }

        let capacities = state.subscribers.iter().map(|s| s.outlet.unfulfilled());

        let gate = match self.config.demand_policy {
            DemandPolicy::Min => capacities.min(),
            DemandPolicy::Max => capacities.max(),
        }
        .unwrap_or(0);

        let batch = gate.min(state.buffer.len() as u64) as usize;

        if batch == 0 {
            return Work::Idle;
        }

        state.consumed += batch as u64;

        Work::Deliver(
            state.subscribers.iter().cloned().collect(),
            state.buffer.drain(..batch).collect(),
        )
    }

    /// Upstream demand to add, once enough of the previous batch was used.
    fn replenish(&self, state: &mut PublishState<T>) -> Option<(Arc<dyn Subscription>, u64)> {
        let prefetch = self.config.prefetch;

        if prefetch == UNBOUNDED || state.pending.is_some() {
            return None;
        }

        let limit = prefetch - (prefetch >> 2);

        if state.consumed < limit {
            return None;
        }

        let upstream = state.upstream.clone()?;
        let n = std::mem::take(&mut state.consumed);

        Some((upstream, n))
    }

    /// Unregisters `inner`, unless its slot was already freed and reused.
    fn remove(&self, key: usize, inner: &PublishInner<T>) {
        let mut state = lock(&self.state);

        let registered = state
            .subscribers
            .get_mut(key)
            .is_some_and(|entry| ptr::eq(Arc::as_ptr(entry), inner));

        if registered {
            state.subscribers.remove(key);
        }
    }
}

/// One registered subscriber of a connectable publisher.
struct PublishInner<T> {
    outlet: Outlet<T>,
    core: Weak<PublishCore<T>>,

    /// Slot in the subscriber slab; taken on the first departure.
    key: Mutex<Option<usize>>,
}

impl<T: Clone + Send + 'static> PublishInner<T> {
    fn terminate(&self, terminal: Terminal) {
        match terminal {
            Terminal::Complete => self.outlet.complete(),
            Terminal::Error(error) => self.outlet.error(error),
        };
    }

    fn leave(&self) {
        let Some(key) = lock(&self.key).take() else {
            return;
        };

        if let Some(core) = self.core.upgrade() {
            core.remove(key, self);
            core.drain();
        }
    }
}

impl<T: Clone + Send + 'static> Subscription for PublishInner<T> {
    fn request(&self, n: u64) {
        if self.outlet.request(n) {
            if let Some(core) = self.core.upgrade() {
                core.drain();
            }
        } else {
            self.leave();
        }
    }

    fn cancel(&self) {
        self.outlet.cancel();
        self.leave();
    }
}

/// The single subscriber attached to the upstream on `connect`.
struct PublishUpstream<T> {
    core: Arc<PublishCore<T>>,
    connection: Connection,
}

impl<T: Clone + Send + 'static> Subscriber<T> for PublishUpstream<T> {
    fn on_subscribe(&mut self, subscription: Arc<dyn Subscription>) {
        lock(&self.core.state).upstream = Some(subscription.clone());
        self.connection.attach(subscription.clone());

        if !self.connection.is_disposed() {
            subscription.request(self.core.config.prefetch);
        }
    }

    fn on_next(&mut self, value: T) {
        if self.connection.is_disposed() {
            return;
        }

        lock(&self.core.state).buffer.push_back(value);
        self.core.drain();
    }

    fn on_error(&mut self, error: FluxError) {
        if self.connection.is_disposed() {
            return;
        }

        lock(&self.core.state).pending = Some(Terminal::Error(error));
        self.core.drain();
    }

    fn on_complete(&mut self) {
        if self.connection.is_disposed() {
            return;
        }

        lock(&self.core.state).pending = Some(Terminal::Complete);
        self.core.drain();
    }
}

struct AutoConnect<T> {
    connectable: ConnectableFlux<T>,
    threshold: usize,
    registered: AtomicUsize,
}

impl<T: Clone + Send + 'static> Publisher<T> for AutoConnect<T> {
    fn subscribe(&self, downstream: Box<dyn Subscriber<T>>) {
        self.connectable.subscribe(downstream);

        if self.registered.fetch_add(1, Ordering::AcqRel) + 1 == self.threshold {
            self.connectable.connect();
        }
    }
}

impl<T: Clone + Send + 'static> Flux<T> {
    /// Turns this cold publisher into a hot one with the default
    /// [`PublishConfig`].
    pub fn publish(&self) -> ConnectableFlux<T> {
        self.publish_with(PublishConfig::default())
    }

    /// Turns this cold publisher into a hot one.
    pub fn publish_with(&self, config: PublishConfig) -> ConnectableFlux<T> {
        ConnectableFlux::new(self.clone(), config)
    }
}
