//! # Tributary
//!
//! **Tributary** is a reactive stream engine for Rust: lazy publishers,
//! subscribers with explicit demand, and a set of composable operators that
//! move values from one to the other without ever outrunning the consumer.
//!
//! A stream is described once, as a [`Flux`], and runs once per subscriber.
//! Nothing happens until something subscribes, and nothing is emitted beyond
//! what the subscriber requested. Delivery is synchronous by default; work
//! moves to other threads only at stages that take a [`Scheduler`].
//!
//! Tributary offers:
//!
//! - The **Publisher / Subscriber / Subscription protocol** with saturating
//!   `u64` demand and idempotent cancellation
//! - **Cold sources**: iterators, ranges, generators, push sinks with an
//!   overflow policy, timers
//! - **Operators**: `map`, `filter`, `take`, `skip`, `distinct`, `flat_map`,
//!   `concat_map`, `zip`, `merge`, `concat`, `reduce`, `retry`, ...
//! - **Schedulers**: named worker pools with a timer thread
//! - **Hot publishers**: `publish()` / `connect()` multicast with a shared
//!   demand policy
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tributary::Flux;
//!
//! let sum = Flux::range(1, 5)
//!     .map(|x| x * 10)
//!     .filter(|x| x % 20 == 0)
//!     .reduce(0, |acc, x| acc + x)
//!     .block_last()?;
//!
//! assert_eq!(sum, Some(60));
//! ```
//!
//! ## Modules
//!
//! - [`runtime`] - Schedulers and the process-wide default scheduler
//! - [`source`] - Cold sources and their configuration
//! - [`hot`] - Connectable publishers
//! - [`operator`] - Operator constants
//! - [`consume`] - Callback and blocking consumers
//! - [`error`] - The error signal payload
//!
//! ## Getting Started
//!
//! Add Tributary to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! tributary = { git = "https://github.com/Nebula-ecosystem/tributary", package = "tributary" }
//! ```

mod core;
mod flow;
mod utils;

pub mod consume;
pub mod error;
pub mod hot;
pub mod operator;
pub mod runtime;
pub mod source;

pub use self::core::{Demand, Flux, Publisher, Signal, Subscriber, Subscription, UNBOUNDED};
pub use consume::Disposable;
pub use error::{FluxError, FluxResult, ProtocolViolation};
pub use hot::{ConnectableFlux, Connection, DEFAULT_PREFETCH, DemandPolicy, PublishConfig};
pub use operator::INNER_PREFETCH;
pub use runtime::{Scheduler, SchedulerBuilder, TaskHandle};
pub use source::{CreateOptions, FluxSink, GenerateSink, OverflowStrategy};
