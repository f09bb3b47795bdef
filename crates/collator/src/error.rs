//! Error types for event validation.

use nbwatch_primitives::CellIdx;
use thiserror::Error;

/// Reasons an incoming event is rejected.
///
/// These never escape the tolerant ingestion entry points; they are logged
/// and the event is dropped without touching collator state.
#[derive(Debug, Error)]
pub enum CollatorError {
	/// The caller passed no event at all.
	#[error("null event")]
	NullEvent,
	/// A raw payload did not match any event shape.
	#[error("malformed event: {0}")]
	Malformed(#[from] serde_json::Error),
	/// A removal range ended before it started.
	#[error("invalid removal range [{start}, {end})")]
	InvalidRange {
		/// Range start.
		start: CellIdx,
		/// Range end.
		end: CellIdx,
	},
	/// An insertion named no cells.
	#[error("cell insertion at {start} names no cells")]
	EmptyInsertion {
		/// Insertion index.
		start: CellIdx,
	},
	/// A removal without an explicit count removed more cells than tracked.
	#[error("removal of {removed} cells exceeds tracked cell count {cell_count}")]
	CountUnderflow {
		/// Number of cells in the removal range.
		removed: usize,
		/// Tracked cell count at the time of removal.
		cell_count: usize,
	},
}
