//! Error types carried by the stream engine.
//!
//! Every failure that reaches a subscriber travels as a [`FluxError`] inside
//! the `Error` terminal signal. The enum covers the four kinds of failure the
//! engine distinguishes:
//!
//! - **upstream production errors**: raised by a source's own computation
//!   ([`FluxError::Custom`], [`FluxError::Message`]),
//! - **operator transformation errors**: raised by a user function inside a
//!   stage ([`FluxError::Operator`], [`FluxError::Panicked`]),
//! - **protocol violations**: a broken operator or subscriber
//!   ([`FluxError::Protocol`]),
//! - **scheduler errors**: work submitted to a scheduler that cannot accept it
//!   ([`FluxError::SchedulerShutdown`], [`FluxError::SchedulerRejected`]).
//!
//! `FluxError` is `Clone` so a single terminal can be multicast to every
//! subscriber of a connectable publisher.

use thiserror::Error;

use std::any::Any;
use std::error::Error as StdError;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

/// Convenient result alias for fallible user functions handed to operators.
pub type FluxResult<T> = Result<T, FluxError>;

/// Breaches of the Publisher/Subscriber/Subscription contract.
///
/// These indicate a programming error in an operator or a hand-written
/// subscriber. They are logged at `error` level when detected and are never
/// intercepted by recovery operators.
#[non_exhaustive]
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolViolation {
    /// `request(0)` was called on a subscription.
    #[error("request(n) called with n == 0")]
    NonPositiveRequest,

    /// A generator step called `next` more than once in a single invocation.
    #[error("generator emitted more than one value in a single step")]
    GenerateEmittedTwice,
}

/// Error delivered through the `Error` terminal signal.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum FluxError {
    /// An arbitrary error raised by a source or user function.
    #[error("{0}")]
    Custom(Arc<dyn StdError + Send + Sync>),

    /// A plain message error.
    #[error("{0}")]
    Message(String),

    /// A stage's user function reported a failure.
    #[error("operator `{operator}` failed: {message}")]
    Operator {
        /// Name of the failing operator.
        operator: &'static str,
        /// Description of the failure.
        message: String,
    },

    /// A user function panicked while being invoked by a stage.
    #[error("`{operator}` panicked: {message}")]
    Panicked {
        /// Name of the operator that invoked the function.
        operator: &'static str,
        /// Panic payload rendered as text.
        message: String,
    },

    /// The reactive protocol was violated.
    #[error("protocol violation: {0}")]
    Protocol(#[from] ProtocolViolation),

    /// Work was submitted to a scheduler that has been disposed.
    #[error("scheduler `{scheduler}` is shut down")]
    SchedulerShutdown {
        /// Name of the scheduler.
        scheduler: String,
    },

    /// The scheduler cannot run this kind of task.
    #[error("scheduler `{scheduler}` rejected task: {reason}")]
    SchedulerRejected {
        /// Name of the scheduler.
        scheduler: String,
        /// Why the task was refused.
        reason: &'static str,
    },

    /// A producer outpaced downstream demand and its overflow policy refused
    /// to buffer.
    #[error("overflow: {context}")]
    Overflow {
        /// What overflowed.
        context: String,
    },

    /// A blocking consumer gave up waiting.
    #[error("no terminal signal within {after:?}")]
    Timeout {
        /// The configured wait.
        after: Duration,
    },

    /// A blocking call was made from a scheduler worker thread.
    #[error("blocking call on scheduler thread `{thread}` would deadlock")]
    BlockingDeadlock {
        /// Name of the worker thread.
        thread: String,
    },

    /// The subscription was cancelled before any terminal signal arrived.
    #[error("stream cancelled before a terminal signal")]
    Cancelled,
}

impl FluxError {
    /// Wraps any error type.
    pub fn custom<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        FluxError::Custom(Arc::new(error))
    }

    /// Builds an error from a message.
    pub fn msg(message: impl Into<String>) -> Self {
        FluxError::Message(message.into())
    }

    /// Returns `false` for errors that recovery operators must not intercept.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, FluxError::Protocol(_))
    }

    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            FluxError::Custom(_) | FluxError::Message(_) => "flux_upstream",
            FluxError::Operator { .. } => "flux_operator",
            FluxError::Panicked { .. } => "flux_panicked",
            FluxError::Protocol(_) => "flux_protocol",
            FluxError::SchedulerShutdown { .. } => "flux_scheduler_shutdown",
            FluxError::SchedulerRejected { .. } => "flux_scheduler_rejected",
            FluxError::Overflow { .. } => "flux_overflow",
            FluxError::Timeout { .. } => "flux_timeout",
            FluxError::BlockingDeadlock { .. } => "flux_blocking_deadlock",
            FluxError::Cancelled => "flux_cancelled",
        }
    }

    /// Runs a user function, turning a panic into [`FluxError::Panicked`].
    pub(crate) fn catch<R>(operator: &'static str, f: impl FnOnce() -> R) -> Result<R, FluxError> {
        panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| FluxError::Panicked {
            operator,
            message: panic_message(payload.as_ref()),
        })
    }
}

/// Renders a panic payload as text.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
