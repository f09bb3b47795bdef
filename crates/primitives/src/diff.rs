use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::cell::CellIdx;

/// A contiguous block of inserted cells.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddedBlock {
	/// Index at which the block was inserted.
	pub start: CellIdx,
	/// Post-insertion indices of the new cells.
	pub cell_indexes: Vec<CellIdx>,
}

/// A half-open range `[start, end)` of removed cells, in pre-removal indexing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovedRange {
	/// First removed index (inclusive).
	pub start: CellIdx,
	/// One past the last removed index.
	pub end: CellIdx,
}

impl RemovedRange {
	/// Creates a removed range.
	pub const fn new(start: CellIdx, end: CellIdx) -> Self {
		Self { start, end }
	}

	/// Number of cells covered by the range.
	pub const fn len(&self) -> usize {
		self.end.saturating_sub(self.start)
	}

	/// Returns `true` if the range covers no cells.
	pub const fn is_empty(&self) -> bool {
		self.end <= self.start
	}

	/// Returns `true` if `index` falls inside the range.
	pub const fn contains(&self, index: CellIdx) -> bool {
		index >= self.start && index < self.end
	}

	/// The covered indices as a std range.
	pub const fn indices(&self) -> Range<CellIdx> {
		self.start..self.end
	}
}

/// A minimal batch describing what changed in a notebook.
///
/// `changed` is interpreted against the indexing after every structural
/// change in `added` and `removed` has been applied; `cell_count` is the
/// resulting total.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Diff {
	/// Cells whose content changed, in settle order.
	pub changed: Vec<CellIdx>,
	/// Inserted cell blocks, in the order they were recorded.
	pub added: Vec<AddedBlock>,
	/// Removed ranges, in the order they were recorded.
	pub removed: Vec<RemovedRange>,
	/// Total cell count after this diff.
	pub cell_count: usize,
}

impl Diff {
	/// Full-state diff naming every cell as changed.
	///
	/// Sent once at attach time so the consumer starts from a known baseline.
	pub fn full(cell_count: usize) -> Self {
		Self {
			changed: (0..cell_count).collect(),
			added: Vec::new(),
			removed: Vec::new(),
			cell_count,
		}
	}

	/// Returns `true` if the diff names no changed, added, or removed cells.
	pub fn is_empty(&self) -> bool {
		self.changed.is_empty() && self.added.is_empty() && self.removed.is_empty()
	}

	/// Flattens the removed ranges into individual indices.
	pub fn removed_indices(&self) -> Vec<CellIdx> {
		self.removed.iter().flat_map(RemovedRange::indices).collect()
	}

	/// Flattens the added blocks into individual indices.
	pub fn added_indices(&self) -> Vec<CellIdx> {
		self.added.iter().flat_map(|block| block.cell_indexes.iter().copied()).collect()
	}
}
