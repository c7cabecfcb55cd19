use crate::core::signal::Terminal;
use crate::core::subscription::{Demand, UNBOUNDED, is_valid_request};
use crate::core::{Subscriber, Subscription};
use crate::error::{FluxError, ProtocolViolation};
use crate::flow::{Trampoline, lock};

use tracing::{trace, warn};

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// A value waiting for demand, with the subscription to replenish once it
/// has been delivered.
struct Pending<T> {
    value: T,
    credit: Option<Arc<dyn Subscription>>,
}

/// Serialized, demand-gated emitter toward one downstream subscriber.
///
/// Any number of producers, on any threads, hand values and terminals to the
/// outlet. The outlet queues them and delivers them one at a time, never more
/// values than the downstream requested, never concurrently, and never
/// anything after a terminal or a cancellation.
///
/// Rules:
/// - an error discards queued values and is delivered as soon as possible,
/// - a completion is delivered once the queue has drained,
/// - the first terminal wins; later ones are ignored,
/// - on terminal or cancellation the downstream is dropped, releasing
///   whatever it holds.
pub(crate) struct Outlet<T> {
    /// The subscriber; only touched by the thread running the drain loop.
    downstream: Mutex<Option<Box<dyn Subscriber<T>>>>,

    /// Values accepted but not yet delivered.
    queue: Mutex<VecDeque<Pending<T>>>,

    /// Terminal accepted but not yet delivered.
    terminal: Mutex<Option<Terminal>>,

    /// Demand granted by the downstream and not yet consumed.
    demand: Demand,

    trampoline: Trampoline,

    /// Set by the downstream cancelling.
    cancelled: AtomicBool,

    /// Set when a terminal has been accepted.
    done: AtomicBool,
}

impl<T: Send + 'static> Outlet<T> {
    /// Creates an outlet whose deliveries are held until [`start`](Self::start).
    pub(crate) fn new() -> Self {
        Self {
            downstream: Mutex::new(None),
            queue: Mutex::new(VecDeque::new()),
            terminal: Mutex::new(None),
            demand: Demand::new(),
            trampoline: Trampoline::held(),
            cancelled: AtomicBool::new(false),
            done: AtomicBool::new(false),
        }
    }

    /// Hands `subscription` to `downstream` and starts delivering.
    ///
    /// Values and terminals accepted before this call are delivered after
    /// `on_subscribe` returns. Must be called exactly once.
    pub(crate) fn start(
        &self,
        mut downstream: Box<dyn Subscriber<T>>,
        subscription: Arc<dyn Subscription>,
    ) {
        downstream.on_subscribe(subscription);
        *lock(&self.downstream) = Some(downstream);

        self.trampoline.release(|| self.drain_once());
    }

    /// Adds downstream demand.
    ///
    /// Returns `false` when `n == 0`; the outlet then fails with a protocol
    /// error and the caller should cancel its upstream.
    pub(crate) fn request(&self, n: u64) -> bool {
        if !is_valid_request(n) {
            self.error(ProtocolViolation::NonPositiveRequest.into());
            return false;
        }

        self.demand.add(n);
        self.drain();
        true
    }

    /// Queues a value for delivery.
    ///
    /// Returns `false` if the value was dropped because the outlet is
    /// terminated or cancelled.
    pub(crate) fn push(&self, value: T) -> bool {
        self.enqueue(Pending {
            value,
            credit: None,
        })
    }

    /// Queues a value and requests one more item from `credit` once the
    /// value has been delivered downstream.
    pub(crate) fn push_with_credit(&self, value: T, credit: Arc<dyn Subscription>) -> bool {
        self.enqueue(Pending {
            value,
            credit: Some(credit),
        })
    }

    /// Fails the downstream, discarding queued values.
    ///
    /// Returns `false` if a terminal was already accepted.
    pub(crate) fn error(&self, error: FluxError) -> bool {
        if self.done.swap(true, Ordering::AcqRel) {
            trace!(error = %error, "error dropped after terminal");
            return false;
        }

        lock(&self.queue).clear();
        *lock(&self.terminal) = Some(Terminal::Error(error));

        self.drain();
        true
    }

    /// Completes the downstream once every queued value has been delivered.
    ///
    /// Returns `false` if a terminal was already accepted.
    pub(crate) fn complete(&self) -> bool {
        if self.done.swap(true, Ordering::AcqRel) {
            return false;
        }

        *lock(&self.terminal) = Some(Terminal::Complete);

        self.drain();
        true
    }

    /// Cancels on behalf of the downstream. Idempotent.
    pub(crate) fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }

        self.drain();
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Returns `true` once a terminal was accepted or the downstream cancelled.
    pub(crate) fn is_terminated(&self) -> bool {
        self.done.load(Ordering::Acquire) || self.is_cancelled()
    }

    /// Number of values queued and not yet delivered.
    pub(crate) fn queued(&self) -> usize {
        lock(&self.queue).len()
    }

    /// Demand not yet covered by queued values.
    pub(crate) fn unfulfilled(&self) -> u64 {
        let demand = self.demand.get();

        if demand == UNBOUNDED {
            return UNBOUNDED;
        }

        demand.saturating_sub(self.queued() as u64)
    }

    fn enqueue(&self, pending: Pending<T>) -> bool {
        if self.is_cancelled() {
            return false;
        }

        if self.done.load(Ordering::Acquire) {
            warn!("value dropped: emitted after a terminal signal");
            return false;
        }

        lock(&self.queue).push_back(pending);

        self.drain();
        true
    }

    fn drain(&self) {
        self.trampoline.run(|| self.drain_once());
    }

    fn drain_once(&self) {
        loop {
            if self.is_cancelled() {
                self.release();
                return;
            }

            if lock(&self.terminal).as_ref().is_some_and(Terminal::is_error) {
                self.finish();
                return;
            }

            let next = if self.demand.get() > 0 {
                lock(&self.queue).pop_front()
            } else {
                None
            };

            let Some(Pending { value, credit }) = next else {
                let finished = lock(&self.queue).is_empty() && lock(&self.terminal).is_some();
                if finished {
                    self.finish();
                }
                return;
            };

            self.demand.consume(1);

            {
                let mut downstream = lock(&self.downstream);

                if self.is_cancelled() {
                    continue;
                }

                if let Some(subscriber) = downstream.as_mut() {
                    subscriber.on_next(value);
                }
            }

            if let Some(credit) = credit {
                credit.request(1);
            }
        }
    }

    /// Delivers the pending terminal and drops the downstream.
    fn finish(&self) {
        let terminal = lock(&self.terminal).take();
        let downstream = lock(&self.downstream).take();
        lock(&self.queue).clear();

        if let (Some(terminal), Some(mut subscriber)) = (terminal, downstream) {
            terminal.deliver::<T, _>(subscriber.as_mut());
        }
    }

    /// Drops everything held for the downstream after a cancellation.
    fn release(&self) {
        let downstream = lock(&self.downstream).take();
        lock(&self.queue).clear();
        lock(&self.terminal).take();

        drop(downstream);
    }
}
