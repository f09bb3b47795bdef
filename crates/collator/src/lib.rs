//! Notebook change collation.
//!
//! Turns a noisy stream of cell-level notifications (edits, metadata writes,
//! output replacements, execution transitions, insertions, removals) into
//! minimal [`Diff`](nbwatch_primitives::Diff)s, emitted only once every
//! execution in flight has finished.

/// The collator state machine.
pub mod collator;
/// Validation errors for incoming events.
pub mod error;
/// Tagged change events.
pub mod event;
/// Read access to the host notebook.
pub mod host;
mod ingest;
/// Compact event notation for logs and scripted tests.
pub mod notation;
/// Per-cell change summaries.
pub mod summary;

pub use collator::{ChangeCollator, CollatorSnapshot};
pub use error::CollatorError;
pub use event::CellEvent;
pub use host::{MemoryNotebook, NotebookHost};
pub use notation::{NotationError, parse_script, render_script};
pub use summary::{ChangeSummary, ExecutionRecord, SettleReason};
