use tracing::error;

use std::sync::atomic::{AtomicU64, Ordering};

/// Demand value meaning "no limit".
///
/// Once a demand counter reaches this value it stays there: further
/// requests do not change it and deliveries do not decrement it.
pub const UNBOUNDED: u64 = u64::MAX;

/// The link between one subscriber and one publisher.
///
/// A subscription is handed to the subscriber in `on_subscribe`. Through it
/// the subscriber grants demand with [`request`](Self::request) and stops the
/// flow with [`cancel`](Self::cancel).
///
/// Both methods may be called from any thread, at any time, including
/// reentrantly from inside `on_next`. Implementations never deliver signals
/// from within `request` when a delivery loop is already running for this
/// subscription: the running loop picks up the new demand instead.
pub trait Subscription: Send + Sync {
    /// Grants `n` more items of demand.
    ///
    /// Demand accumulates and saturates at [`UNBOUNDED`]. `n == 0` is a
    /// protocol violation and terminates the subscription with an error.
    fn request(&self, n: u64);

    /// Stops the flow of signals and releases the subscription's resources.
    ///
    /// Idempotent. After `cancel` returns no further signal is delivered,
    /// except one that was already being delivered concurrently.
    fn cancel(&self);
}

/// A subscription that does nothing.
///
/// Used by sources that terminate right away (`empty`, `error`).
pub(crate) struct EmptySubscription;

impl Subscription for EmptySubscription {
    fn request(&self, _n: u64) {}

    fn cancel(&self) {}
}

/// Outstanding demand of one subscription.
///
/// An atomic counter with saturating semantics: additions clamp at
/// [`UNBOUNDED`], and an unbounded counter ignores both additions and
/// consumption.
#[derive(Debug, Default)]
pub struct Demand {
    value: AtomicU64,
}

impl Demand {
    /// Creates a counter with no outstanding demand.
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    /// Adds `n` to the counter and returns the previous value.
    pub fn add(&self, n: u64) -> u64 {
        match self
            .value
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current != UNBOUNDED).then(|| current.saturating_add(n))
            }) {
            Ok(previous) | Err(previous) => previous,
        }
    }

    /// Records that `n` items were delivered.
    pub fn consume(&self, n: u64) {
        let _ = self
            .value
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current != UNBOUNDED).then(|| current.saturating_sub(n))
            });
    }

    /// Returns the current outstanding demand.
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Acquire)
    }

    /// Returns `true` once the counter has reached [`UNBOUNDED`].
    pub fn is_unbounded(&self) -> bool {
        self.get() == UNBOUNDED
    }
}

/// Checks a `request(n)` argument, logging a violation when `n == 0`.
pub(crate) fn is_valid_request(n: u64) -> bool {
    if n == 0 {
        error!(
            violation = "non_positive_request",
            "request(0) is a protocol violation"
        );
        return false;
    }

    true
}
