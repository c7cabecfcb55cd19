use crate::core::subscriber::Subscriber;

use std::fmt;
use std::sync::Arc;

/// A description of a stream of values.
///
/// A publisher does nothing until [`subscribe`](Self::subscribe) is called.
/// Each call creates an independent flow of signals toward the given
/// subscriber: cold publishers restart their computation per subscriber.
///
/// `subscribe` calls `on_subscribe` on the subscriber before returning.
pub trait Publisher<T>: Send + Sync {
    /// Attaches `subscriber` and starts a new subscription.
    fn subscribe(&self, subscriber: Box<dyn Subscriber<T>>);
}

/// Composable handle over a [`Publisher`].
///
/// `Flux` is the entry point of the library: sources are created with its
/// associated functions (`Flux::range`, `Flux::interval`, ...), operators are
/// methods returning a new `Flux`, and consumption happens through
/// `subscribe*` or the blocking `block_*` methods.
///
/// A `Flux` is an immutable description. Cloning it is cheap and clones
/// share the same pipeline description, never state.
///
/// # Examples
///
/// ```rust,ignore
/// let total = Flux::range(1, 5)
///     .filter(|n| n % 2 == 1)
///     .reduce(0, |acc, n| acc + n)
///     .block_last()?;
/// assert_eq!(total, Some(9));
/// ```
pub struct Flux<T> {
    publisher: Arc<dyn Publisher<T>>,
}

impl<T> Clone for Flux<T> {
    fn clone(&self) -> Self {
        Self {
            publisher: self.publisher.clone(),
        }
    }
}

impl<T> fmt::Debug for Flux<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Flux").finish_non_exhaustive()
    }
}

impl<T: Send + 'static> Flux<T> {
    /// Wraps a custom publisher.
    pub fn from_publisher<P>(publisher: P) -> Self
    where
        P: Publisher<T> + 'static,
    {
        Self {
            publisher: Arc::new(publisher),
        }
    }

    /// Subscribes a custom subscriber that manages its own demand.
    pub fn subscribe_with(&self, subscriber: Box<dyn Subscriber<T>>) {
        self.publisher.subscribe(subscriber);
    }
}

impl<T> Publisher<T> for Flux<T> {
    fn subscribe(&self, subscriber: Box<dyn Subscriber<T>>) {
        self.publisher.subscribe(subscriber);
    }
}
