//! Hot publishers.
//!
//! [`Flux::publish`](crate::Flux::publish) turns any cold publisher into a
//! [`ConnectableFlux`]: one upstream subscription, made on
//! [`connect`](ConnectableFlux::connect), shared by every subscriber.

pub(crate) mod connectable;

pub use connectable::{ConnectableFlux, Connection, DEFAULT_PREFETCH, DemandPolicy, PublishConfig};
