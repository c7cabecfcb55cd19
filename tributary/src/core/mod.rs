//! The reactive protocol.
//!
//! This module defines the three roles of the protocol and the handle used
//! to compose them:
//! - [`Publisher`]: a lazy description of a stream,
//! - [`Subscriber`]: the receiver of signals,
//! - [`Subscription`]: the demand and cancellation channel between the two,
//! - [`Flux`]: a cheap, cloneable handle over a publisher on which every
//!   operator is defined.
//!
//! Demand is a `u64` that saturates at [`UNBOUNDED`].

pub(crate) mod publisher;
pub(crate) mod signal;
pub(crate) mod subscriber;
pub(crate) mod subscription;

pub use publisher::{Flux, Publisher};
pub use signal::Signal;
pub use subscriber::Subscriber;
pub use subscription::{Demand, Subscription, UNBOUNDED};
