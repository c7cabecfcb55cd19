//! Schedulers.
//!
//! This module contains the execution resources used by time-based and
//! thread-hopping operators.
//!
//! It is responsible for:
//! - running immediate tasks on a pool of named worker threads,
//! - dispatching delayed and periodic tasks from a dedicated timer thread,
//! - tracking which threads belong to a scheduler, so blocking consumers can
//!   refuse to block them,
//! - holding an overridable process-wide default scheduler.
//!
//! Schedulers are always passed explicitly to the operators that need one;
//! the default is only a convenience for callers.

mod builder;
mod core;
mod executor;
mod injector;
mod timer;

pub(crate) mod context;

pub mod task;

pub use self::builder::SchedulerBuilder;
pub use self::core::Scheduler;
pub use self::task::TaskHandle;

use tracing::debug;

use std::sync::{PoisonError, RwLock};

static DEFAULT_SCHEDULER: RwLock<Option<Scheduler>> = RwLock::new(None);

/// Returns the process-wide default scheduler, creating a
/// [`Scheduler::parallel`] on first use.
pub fn default_scheduler() -> Scheduler {
    if let Some(scheduler) = DEFAULT_SCHEDULER
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .as_ref()
    {
        return scheduler.clone();
    }

    DEFAULT_SCHEDULER
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .get_or_insert_with(|| {
            debug!("creating default scheduler");
            Scheduler::parallel()
        })
        .clone()
}

/// Replaces the process-wide default scheduler, returning the previous one.
///
/// The previous scheduler is not disposed.
pub fn set_default_scheduler(scheduler: Scheduler) -> Option<Scheduler> {
    DEFAULT_SCHEDULER
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .replace(scheduler)
}

/// Disposes and clears the process-wide default scheduler.
///
/// The next call to [`default_scheduler`] creates a fresh one.
pub fn shutdown_default_scheduler() {
    let previous = DEFAULT_SCHEDULER
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .take();

    if let Some(scheduler) = previous {
        scheduler.dispose();
    }
}
