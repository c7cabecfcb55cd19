//! Push sources bridging callback-style producers into a stream.

use crate::core::{Flux, Publisher, Subscriber, Subscription};
use crate::error::FluxError;
use crate::flow::{Outlet, lock};

use tracing::{debug, trace};

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// What a push source does with a value that arrives while the downstream
/// has no outstanding demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowStrategy {
    /// Queue the value until demand arrives. The queue is unbounded unless
    /// [`CreateOptions::capacity`] is set; overflowing a bounded queue fails
    /// the stream with [`FluxError::Overflow`].
    #[default]
    Buffer,

    /// Discard the incoming value.
    DropLatest,

    /// Fail the stream with [`FluxError::Overflow`].
    Error,
}

/// Configuration of [`Flux::create_with`].
#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    /// Overflow policy. Defaults to [`OverflowStrategy::Buffer`].
    pub overflow: OverflowStrategy,

    /// Bound of the [`OverflowStrategy::Buffer`] queue. `None` means
    /// unbounded.
    pub capacity: Option<usize>,
}

impl CreateOptions {
    /// Creates the default options: unbounded buffering.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the overflow policy.
    pub fn overflow(mut self, overflow: OverflowStrategy) -> Self {
        self.overflow = overflow;
        self
    }

    /// Bounds the buffer used by [`OverflowStrategy::Buffer`].
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }
}

type Producer<T> = Arc<dyn Fn(FluxSink<T>) + Send + Sync>;

struct CreateSource<T> {
    producer: Producer<T>,
    options: CreateOptions,
}

impl<T: Send + 'static> Publisher<T> for CreateSource<T> {
    fn subscribe(&self, subscriber: Box<dyn Subscriber<T>>) {
        let shared = Arc::new(SinkShared {
            outlet: Outlet::new(),
            options: self.options.clone(),
            disposers: Mutex::new(Vec::new()),
            disposed: AtomicBool::new(false),
        });

        trace!(overflow = ?self.options.overflow, "push source subscribed");

        shared.outlet.start(subscriber, shared.clone());

        let sink = FluxSink {
            shared: shared.clone(),
        };
        let producer = &self.producer;

        if let Err(e) = FluxError::catch("create", || producer(sink)) {
            shared.fail(e);
        }
    }
}

struct SinkShared<T> {
    outlet: Outlet<T>,
    options: CreateOptions,
    disposers: Mutex<Vec<Box<dyn FnOnce() + Send>>>,
    disposed: AtomicBool,
}

impl<T: Send + 'static> SinkShared<T> {
    fn fail(&self, error: FluxError) {
        self.outlet.error(error);
        self.dispose();
    }

    /// Runs the dispose hooks, once.
    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }

        let hooks = std::mem::take(&mut *lock(&self.disposers));

        for hook in hooks {
            if let Err(e) = FluxError::catch("on_dispose", hook) {
                debug!(error = %e, "dispose hook failed");
            }
        }
    }
}

impl<T: Send + 'static> Subscription for SinkShared<T> {
    fn request(&self, n: u64) {
        if !self.outlet.request(n) {
            self.dispose();
        }
    }

    fn cancel(&self) {
        self.outlet.cancel();
        self.dispose();
    }
}

/// Producer side of [`Flux::create`].
///
/// The sink is cloneable and may be used from any thread; deliveries are
/// serialized and never exceed downstream demand.
pub struct FluxSink<T> {
    shared: Arc<SinkShared<T>>,
}

impl<T> Clone for FluxSink<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T> fmt::Debug for FluxSink<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FluxSink")
            .field("options", &self.shared.options)
            .finish_non_exhaustive()
    }
}

impl<T: Send + 'static> FluxSink<T> {
    /// Emits a value.
    ///
    /// Returns `false` if the value was not accepted: the stream is
    /// cancelled or terminated, or the overflow policy refused it.
    pub fn next(&self, value: T) -> bool {
        let shared = &self.shared;

        if shared.outlet.is_terminated() {
            return false;
        }

        if shared.outlet.unfulfilled() == 0 {
            match shared.options.overflow {
                OverflowStrategy::Buffer => {
                    if let Some(capacity) = shared.options.capacity
                        && shared.outlet.queued() >= capacity
                    {
                        shared.fail(FluxError::Overflow {
                            context: format!("create buffer full ({capacity} values)"),
                        });
                        return false;
                    }
                }
                OverflowStrategy::DropLatest => {
                    debug!("create: value dropped, no outstanding demand");
                    return false;
                }
                OverflowStrategy::Error => {
                    shared.fail(FluxError::Overflow {
                        context: "create: value emitted without outstanding demand".to_string(),
                    });
                    return false;
                }
            }
        }

        shared.outlet.push(value)
    }

    /// Fails the stream. Queued values are discarded.
    pub fn error(&self, error: FluxError) {
        self.shared.fail(error);
    }

    /// Completes the stream once queued values have been delivered.
    pub fn complete(&self) {
        self.shared.outlet.complete();
        self.shared.dispose();
    }

    /// Returns `true` once the downstream cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.shared.outlet.is_cancelled()
    }

    /// Demand not yet covered by queued values.
    pub fn requested(&self) -> u64 {
        self.shared.outlet.unfulfilled()
    }

    /// Registers a hook run once when the stream is cancelled or terminated.
    ///
    /// If that already happened the hook runs immediately.
    pub fn on_dispose<F>(&self, hook: F)
    where
        F: FnOnce() + Send + 'static,
    {
        {
            let mut disposers = lock(&self.shared.disposers);

            if !self.shared.disposed.load(Ordering::Acquire) {
                disposers.push(Box::new(hook));
                return;
            }
        }

        if let Err(e) = FluxError::catch("on_dispose", hook) {
            debug!(error = %e, "dispose hook failed");
        }
    }
}

impl<T: Send + 'static> Flux<T> {
    /// Bridges a push-style producer into a stream, buffering values that
    /// arrive without demand.
    ///
    /// `producer` runs once per subscription, right after `on_subscribe`,
    /// with a [`FluxSink`] it may keep and use from any thread.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let flux = Flux::create(|sink| {
    ///     for word in ["a", "b", "c"] {
    ///         sink.next(word.to_string());
    ///     }
    ///     sink.complete();
    /// });
    /// ```
    pub fn create<F>(producer: F) -> Self
    where
        F: Fn(FluxSink<T>) + Send + Sync + 'static,
    {
        Flux::create_with(producer, CreateOptions::default())
    }

    /// Like [`create`](Self::create) with an explicit overflow configuration.
    pub fn create_with<F>(producer: F, options: CreateOptions) -> Self
    where
        F: Fn(FluxSink<T>) + Send + Sync + 'static,
    {
        Flux::from_publisher(CreateSource {
            producer: Arc::new(producer),
            options,
        })
    }
}
