//! Debounced dispatch of collated notebook diffs.
//!
//! One [`Dispatcher`] per monitored document wraps a
//! [`ChangeCollator`](nbwatch_collator::ChangeCollator), decides when its
//! diffs are released, reads current cell content from the host, and hands
//! the result to a [`DiffConsumer`]. A [`SessionRegistry`] owns the
//! dispatchers for every open document.

/// Timing configuration.
pub mod config;
/// Delivery payloads and the consumer trait.
pub mod consumer;
/// The per-document debounce state machine.
pub mod dispatcher;
/// Per-document session ownership.
pub mod registry;

pub use config::{ConfigError, DispatchConfig};
pub use consumer::{Delivery, DiffConsumer};
pub use dispatcher::{DispatchPhase, Dispatcher, FlushOutcome};
pub use registry::SessionRegistry;
