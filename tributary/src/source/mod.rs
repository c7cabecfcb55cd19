//! Cold sources.
//!
//! Every source here restarts its computation for each subscriber:
//! - `pull`: `from_iter`, `from_vec`, `just`, `range`, `generate`,
//!   `from_callable`,
//! - `create`: push-style producers with an overflow policy,
//! - `interval`: scheduler-driven `interval` and `delay`,
//! - `basic`: `empty`, `error`, `never`, `defer`.

pub(crate) mod basic;
pub(crate) mod create;
pub(crate) mod interval;
pub(crate) mod pull;

pub use create::{CreateOptions, FluxSink, OverflowStrategy};
pub use pull::GenerateSink;
