//! Synchronous, demand-driven sources.
//!
//! `from_iter`, `range`, `generate` and `from_callable` share one publisher:
//! each subscription owns a [`Pull`] state machine that produces exactly one
//! signal per call, and a delivery loop calls it once per unit of demand.

use crate::core::signal::Terminal;
use crate::core::subscription::{Demand, is_valid_request};
use crate::core::{Flux, Publisher, Subscriber, Subscription};
use crate::error::{FluxError, ProtocolViolation};
use crate::flow::{Trampoline, lock};

use tracing::{error, trace, warn};

use std::iter::Peekable;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// One step of a pull source.
pub(crate) enum Pulled<T> {
    Next(T),
    /// A value known to be the last one; completion follows without demand.
    Last(T),
    Complete,
    Error(FluxError),
}

/// Per-subscription producer of a pull source.
pub(crate) trait Pull<T>: Send {
    fn pull(&mut self) -> Pulled<T>;
}

/// Publisher creating a fresh [`Pull`] for every subscription.
pub(crate) struct PullSource<F> {
    factory: F,
}

impl<F> PullSource<F> {
    pub(crate) fn new(factory: F) -> Self {
        Self { factory }
    }
}

impl<T, P, F> Publisher<T> for PullSource<F>
where
    T: Send + 'static,
    P: Pull<T> + 'static,
    F: Fn() -> P + Send + Sync,
{
    fn subscribe(&self, mut subscriber: Box<dyn Subscriber<T>>) {
        let subscription = Arc::new(PullSubscription {
            state: Mutex::new(PullState {
                puller: Some(Box::new((self.factory)())),
                downstream: None,
            }),
            demand: Demand::new(),
            cancelled: AtomicBool::new(false),
            violated: AtomicBool::new(false),
            trampoline: Trampoline::held(),
        });

        trace!("pull source subscribed");

        subscriber.on_subscribe(subscription.clone());
        lock(&subscription.state).downstream = Some(subscriber);

        subscription.trampoline.release(|| subscription.drain_once());
    }
}

struct PullState<T> {
    puller: Option<Box<dyn Pull<T>>>,
    downstream: Option<Box<dyn Subscriber<T>>>,
}

struct PullSubscription<T> {
    state: Mutex<PullState<T>>,
    demand: Demand,
    cancelled: AtomicBool,
    violated: AtomicBool,
    trampoline: Trampoline,
}

impl<T: Send + 'static> PullSubscription<T> {
    fn drain_once(&self) {
        let mut state = lock(&self.state);

        loop {
            if self.cancelled.load(Ordering::Acquire) {
                let released = (state.puller.take(), state.downstream.take());
                drop(state);
                drop(released);
                return;
            }

            if self.violated.load(Ordering::Acquire) {
                state.puller = None;
                if let Some(mut downstream) = state.downstream.take() {
                    downstream.on_error(ProtocolViolation::NonPositiveRequest.into());
                }
                return;
            }

            if state.downstream.is_none() || self.demand.get() == 0 {
                return;
            }

            let Some(puller) = state.puller.as_mut() else {
                return;
            };

            let (value, terminal) = match puller.pull() {
                Pulled::Next(value) => (Some(value), None),
                Pulled::Last(value) => (Some(value), Some(Terminal::Complete)),
                Pulled::Complete => (None, Some(Terminal::Complete)),
                Pulled::Error(error) => (None, Some(Terminal::Error(error))),
            };

            if let Some(value) = value {
                self.demand.consume(1);

                if let Some(downstream) = state.downstream.as_mut() {
                    downstream.on_next(value);
                }
            }

            if let Some(terminal) = terminal {
                state.puller = None;

                if self.cancelled.load(Ordering::Acquire) {
                    continue;
                }

                if let Some(mut downstream) = state.downstream.take() {
                    terminal.deliver::<T, _>(downstream.as_mut());
                }
                return;
            }
        }
    }
}

impl<T: Send + 'static> Subscription for PullSubscription<T> {
    fn request(&self, n: u64) {
        if is_valid_request(n) {
            self.demand.add(n);
        } else {
            self.violated.store(true, Ordering::Release);
        }

        self.trampoline.run(|| self.drain_once());
    }

    fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }

        self.trampoline.run(|| self.drain_once());
    }
}

struct IterPull<I: Iterator> {
    iter: Peekable<I>,
}

impl<T, I> Pull<T> for IterPull<I>
where
    T: Send,
    I: Iterator<Item = T> + Send,
{
    fn pull(&mut self) -> Pulled<T> {
        let iter = &mut self.iter;

        let step = FluxError::catch("from_iter", || {
            let value = iter.next();
            let last = iter.peek().is_none();
            (value, last)
        });

        match step {
            Ok((Some(value), false)) => Pulled::Next(value),
            Ok((Some(value), true)) => Pulled::Last(value),
            Ok((None, _)) => Pulled::Complete,
            Err(e) => Pulled::Error(e),
        }
    }
}

struct CallablePull<T> {
    callable: Option<Arc<dyn Fn() -> Result<T, FluxError> + Send + Sync>>,
}

impl<T: Send> Pull<T> for CallablePull<T> {
    fn pull(&mut self) -> Pulled<T> {
        let Some(callable) = self.callable.take() else {
            return Pulled::Complete;
        };

        match FluxError::catch("from_callable", || callable()).and_then(|r| r) {
            Ok(value) => Pulled::Last(value),
            Err(e) => Pulled::Error(e),
        }
    }
}

/// Sink handed to each step of [`Flux::generate`].
///
/// A step may call [`next`](Self::next) at most once, optionally followed by
/// [`complete`](Self::complete) or [`error`](Self::error).
pub struct GenerateSink<T> {
    value: Option<T>,
    terminal: Option<Terminal>,
    emitted_twice: bool,
}

impl<T> GenerateSink<T> {
    fn new() -> Self {
        Self {
            value: None,
            terminal: None,
            emitted_twice: false,
        }
    }

    /// Emits the value of this step.
    pub fn next(&mut self, value: T) {
        if self.terminal.is_some() {
            warn!("generate: value emitted after a terminal signal ignored");
            return;
        }

        if self.value.is_some() {
            self.emitted_twice = true;
            return;
        }

        self.value = Some(value);
    }

    /// Ends the sequence after this step.
    pub fn complete(&mut self) {
        self.terminal.get_or_insert(Terminal::Complete);
    }

    /// Fails the sequence after this step.
    pub fn error(&mut self, error: FluxError) {
        self.terminal.get_or_insert(Terminal::Error(error));
    }
}

type Init<S> = Arc<dyn Fn() -> S + Send + Sync>;
type Step<S, T> = Arc<dyn Fn(S, &mut GenerateSink<T>) -> S + Send + Sync>;

struct GeneratePull<S, T> {
    init: Option<Init<S>>,
    state: Option<S>,
    step: Step<S, T>,
    pending_error: Option<FluxError>,
}

impl<S: Send, T: Send> Pull<T> for GeneratePull<S, T> {
    fn pull(&mut self) -> Pulled<T> {
        if let Some(error) = self.pending_error.take() {
            return Pulled::Error(error);
        }

        if let Some(init) = self.init.take() {
            match FluxError::catch("generate", || init()) {
                Ok(state) => self.state = Some(state),
                Err(e) => return Pulled::Error(e),
            }
        }

        let Some(state) = self.state.take() else {
            return Pulled::Complete;
        };

        let mut sink = GenerateSink::new();
        let step = &self.step;

        let next_state = match FluxError::catch("generate", || step(state, &mut sink)) {
            Ok(next_state) => next_state,
            Err(e) => return Pulled::Error(e),
        };

        if sink.emitted_twice {
            error!(
                violation = "generate_emitted_twice",
                "generate step called next more than once"
            );
            return Pulled::Error(ProtocolViolation::GenerateEmittedTwice.into());
        }

        match (sink.value, sink.terminal) {
            (Some(value), None) => {
                self.state = Some(next_state);
                Pulled::Next(value)
            }
            (Some(value), Some(Terminal::Complete)) => Pulled::Last(value),
            (Some(value), Some(Terminal::Error(e))) => {
                self.pending_error = Some(e);
                Pulled::Next(value)
            }
            (None, Some(Terminal::Complete)) => Pulled::Complete,
            (None, Some(Terminal::Error(e))) => Pulled::Error(e),
            (None, None) => Pulled::Error(FluxError::Operator {
                operator: "generate",
                message: "step emitted no signal".to_string(),
            }),
        }
    }
}

impl<T: Send + 'static> Flux<T> {
    /// Emits the items of a replayable collection, then completes.
    ///
    /// The collection is cloned for every subscription and iterated lazily:
    /// items are produced only as downstream demand allows.
    #[allow(clippy::should_implement_trait)]
    pub fn from_iter<I>(iterable: I) -> Self
    where
        I: IntoIterator<Item = T> + Clone + Send + Sync + 'static,
        I::IntoIter: Send + 'static,
    {
        Flux::from_publisher(PullSource::new(move || IterPull {
            iter: iterable.clone().into_iter().peekable(),
        }))
    }

    /// Emits the values of `values` in order, then completes.
    pub fn from_vec(values: Vec<T>) -> Self
    where
        T: Clone + Sync,
    {
        Flux::from_iter(values)
    }

    /// Emits `value`, then completes.
    pub fn just(value: T) -> Self
    where
        T: Clone + Sync,
    {
        Flux::from_iter([value])
    }

    /// Emits the value computed by `callable` once it is requested.
    ///
    /// An `Err` (or a panic) becomes the error terminal.
    pub fn from_callable<F>(callable: F) -> Self
    where
        F: Fn() -> Result<T, FluxError> + Send + Sync + 'static,
    {
        let callable: Arc<dyn Fn() -> Result<T, FluxError> + Send + Sync> = Arc::new(callable);

        Flux::from_publisher(PullSource::new(move || CallablePull {
            callable: Some(callable.clone()),
        }))
    }

    /// Generates values from a state, one `step` per requested item.
    ///
    /// `init` creates the state of each subscription. Each step receives the
    /// state and a [`GenerateSink`], emits at most one value and returns the
    /// next state. Calling `next` twice within one step fails the stream with
    /// a protocol error; a panicking step fails it with
    /// [`FluxError::Panicked`].
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let powers = Flux::generate(|| 1u64, |n, sink| {
    ///     sink.next(n);
    ///     if n >= 1024 {
    ///         sink.complete();
    ///     }
    ///     n * 2
    /// });
    /// ```
    pub fn generate<S, I, F>(init: I, step: F) -> Self
    where
        S: Send + 'static,
        I: Fn() -> S + Send + Sync + 'static,
        F: Fn(S, &mut GenerateSink<T>) -> S + Send + Sync + 'static,
    {
        let init: Init<S> = Arc::new(init);
        let step: Step<S, T> = Arc::new(step);

        Flux::from_publisher(PullSource::new(move || GeneratePull {
            init: Some(init.clone()),
            state: None,
            step: step.clone(),
            pending_error: None,
        }))
    }
}

impl Flux<i64> {
    /// Emits `count` consecutive integers starting at `start`, then completes.
    pub fn range(start: i64, count: u64) -> Self {
        let end = i64::try_from(count).map_or(i64::MAX, |count| start.saturating_add(count));

        Flux::from_iter(start..end)
    }
}
