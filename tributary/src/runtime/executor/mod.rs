//! Worker pool of a scheduler.
//!
//! - [`core`]: thread spawning and lifecycle,
//! - [`worker`]: the loop each worker thread runs.

pub(crate) mod core;
pub(crate) mod worker;
