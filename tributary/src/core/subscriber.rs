use crate::core::subscription::{EmptySubscription, Subscription};
use crate::error::FluxError;

use std::sync::Arc;

/// Receiver of the signals emitted by a publisher.
///
/// The engine calls these methods in protocol order: exactly one
/// `on_subscribe`, then zero or more `on_next` (never more than the demand
/// requested through the subscription), then at most one of `on_error` or
/// `on_complete`. Calls are serialized: no two methods of the same subscriber
/// run concurrently.
///
/// A subscriber that wants values must call
/// [`Subscription::request`] on the subscription it receives.
pub trait Subscriber<T>: Send {
    /// Receives the subscription. Called once, before any other signal.
    fn on_subscribe(&mut self, subscription: Arc<dyn Subscription>);

    /// Receives one value.
    fn on_next(&mut self, value: T);

    /// Receives the error terminal. Nothing follows.
    fn on_error(&mut self, error: FluxError);

    /// Receives the completion terminal. Nothing follows.
    fn on_complete(&mut self);
}

impl<T, S> Subscriber<T> for Box<S>
where
    S: Subscriber<T> + ?Sized,
{
    fn on_subscribe(&mut self, subscription: Arc<dyn Subscription>) {
        (**self).on_subscribe(subscription);
    }

    fn on_next(&mut self, value: T) {
        (**self).on_next(value);
    }

    fn on_error(&mut self, error: FluxError) {
        (**self).on_error(error);
    }

    fn on_complete(&mut self) {
        (**self).on_complete();
    }
}

/// Subscribes `subscriber` to nothing and completes it right away.
pub(crate) fn complete_now<T>(mut subscriber: Box<dyn Subscriber<T>>) {
    subscriber.on_subscribe(Arc::new(EmptySubscription));
    subscriber.on_complete();
}

/// Subscribes `subscriber` to nothing and fails it right away.
pub(crate) fn error_now<T>(mut subscriber: Box<dyn Subscriber<T>>, error: FluxError) {
    subscriber.on_subscribe(Arc::new(EmptySubscription));
    subscriber.on_error(error);
}
