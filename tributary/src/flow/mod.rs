//! Delivery machinery shared by sources and operators.
//!
//! - [`Trampoline`]: work-in-progress drain loop,
//! - [`Outlet`]: serialized, demand-gated emitter toward one subscriber,
//! - [`Arbiter`] and [`Relay`]: forwarding across a sequence of upstream
//!   subscriptions with demand carried over.

pub(crate) mod arbiter;
pub(crate) mod outlet;
pub(crate) mod trampoline;

pub(crate) use arbiter::{Arbiter, Relay, RelayHooks, RelaySubscriber};
pub(crate) use outlet::Outlet;
pub(crate) use trampoline::Trampoline;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Locks `mutex`, recovering the data if a panicking user callback poisoned it.
pub(crate) fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
