//! Insert/remove bookkeeping.
//!
//! Structural events queue in FIFO order until the next diff. Index-keyed
//! per-cell state elsewhere in the collator is never renumbered, only purged
//! in affected ranges, so a removal followed by an insertion at the same index
//! within one cycle reads as two unrelated events.

use nbwatch_primitives::{AddedBlock, CellIdx, RemovedRange};

/// FIFO queues of structural changes awaiting the next diff.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct StructuralTracker {
	added: Vec<AddedBlock>,
	removed: Vec<RemovedRange>,
}

impl StructuralTracker {
	pub fn push_added(&mut self, start: CellIdx, cell_indexes: Vec<CellIdx>) {
		self.added.push(AddedBlock { start, cell_indexes });
	}

	pub fn push_removed(&mut self, range: RemovedRange) {
		self.removed.push(range);
	}

	pub fn is_empty(&self) -> bool {
		self.added.is_empty() && self.removed.is_empty()
	}

	pub fn added(&self) -> &[AddedBlock] {
		&self.added
	}

	pub fn removed(&self) -> &[RemovedRange] {
		&self.removed
	}

	/// Takes both queues, leaving them empty.
	pub fn drain(&mut self) -> (Vec<AddedBlock>, Vec<RemovedRange>) {
		(std::mem::take(&mut self.added), std::mem::take(&mut self.removed))
	}

	pub fn clear(&mut self) {
		self.added.clear();
		self.removed.clear();
	}
}
