//! Ways to consume a stream.
//!
//! - `lambda`: `subscribe` with closures, returning a [`Disposable`],
//! - `block`: `block_first` / `block_last`, parking the calling thread.
//!
//! Custom subscribers that manage their own demand use
//! [`Flux::subscribe_with`](crate::Flux::subscribe_with) instead.

pub(crate) mod block;
pub(crate) mod lambda;

pub use lambda::Disposable;
