//! Operators.
//!
//! Each operator is a small publisher struct wrapping its upstream `Flux`,
//! exposed as a method on [`Flux`](crate::Flux). Subscribing to the result
//! subscribes a stage subscriber to the upstream, so demand flows up and
//! signals flow down through one stage per operator.
//!
//! Stateless one-to-one stages (`map`, `filter`, `take`, ...) forward the
//! upstream subscription as is. Stages that join several upstreams (`merge`,
//! `zip`, `flat_map`, ...) or switch between them (`concat`, `retry`,
//! `on_error_resume`) serialize their output through a shared outlet.

mod concat;
mod delay;
mod filter;
mod flat_map;
mod map;
mod merge;
mod peek;
mod recover;
mod reduce;
mod retry;
mod sequential;
mod subscribe_on;
mod take;
mod zip;

use crate::core::UNBOUNDED;

/// Values requested up front from each inner publisher of `merge`, `zip`,
/// `flat_map` and `flat_map_sequential`, and then replenished one for one as
/// they are delivered.
pub const INNER_PREFETCH: u64 = 32;

/// Outer demand for a stage running at most `concurrency` inner publishers.
fn outer_request(concurrency: usize) -> u64 {
    if concurrency == usize::MAX {
        UNBOUNDED
    } else {
        concurrency as u64
    }
}
