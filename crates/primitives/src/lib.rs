//! Core notebook types shared by the collator and the dispatcher.

/// Cell indices, kinds, and content snapshots.
pub mod cell;
/// Diff values emitted to consumers.
pub mod diff;
/// Identifier types for monitored documents.
pub mod ids;

pub use cell::{CellIdx, CellKind, CellSnapshot};
pub use diff::{AddedBlock, Diff, RemovedRange};
pub use ids::DocumentId;
