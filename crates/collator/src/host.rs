//! Boundary to the host document.

use nbwatch_primitives::{CellIdx, CellSnapshot};

/// Read access to the live notebook the collator is attached to.
///
/// The collator only records *that* cells changed; whenever content is
/// needed (materializing a diff, deciding whether a cell is abandoned) it is
/// read from the host at that moment.
pub trait NotebookHost {
	/// Authoritative current number of cells.
	fn cell_count(&self) -> usize;

	/// Current content of the cell at `index`, or `None` if it does not exist.
	fn cell(&self, index: CellIdx) -> Option<CellSnapshot>;
}

impl<T: NotebookHost + ?Sized> NotebookHost for &T {
	fn cell_count(&self) -> usize {
		(**self).cell_count()
	}

	fn cell(&self, index: CellIdx) -> Option<CellSnapshot> {
		(**self).cell(index)
	}
}

impl<T: NotebookHost + ?Sized> NotebookHost for std::sync::Arc<T> {
	fn cell_count(&self) -> usize {
		(**self).cell_count()
	}

	fn cell(&self, index: CellIdx) -> Option<CellSnapshot> {
		(**self).cell(index)
	}
}

/// In-memory notebook keeping snapshot indices in sync with positions.
///
/// Useful for hosts that mirror the document locally and for tests.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryNotebook {
	cells: Vec<CellSnapshot>,
}

impl MemoryNotebook {
	/// Creates a notebook of `count` code cells with distinct sources.
	pub fn with_code_cells(count: usize) -> Self {
		Self {
			cells: (0..count).map(|i| CellSnapshot::code(i, format!("cell_{i}()"))).collect(),
		}
	}

	/// Creates a notebook from existing snapshots, renumbering them.
	pub fn from_cells(cells: Vec<CellSnapshot>) -> Self {
		let mut notebook = Self { cells };
		notebook.reindex();
		notebook
	}

	/// Inserts cells at `start`, returning their new indices.
	pub fn insert(&mut self, start: CellIdx, cells: Vec<CellSnapshot>) -> Vec<CellIdx> {
		let start = start.min(self.cells.len());
		let count = cells.len();
		self.cells.splice(start..start, cells);
		self.reindex();
		(start..start + count).collect()
	}

	/// Removes cells in `[start, end)`, returning them.
	pub fn remove(&mut self, start: CellIdx, end: CellIdx) -> Vec<CellSnapshot> {
		let end = end.min(self.cells.len());
		let start = start.min(end);
		let removed = self.cells.drain(start..end).collect();
		self.reindex();
		removed
	}

	/// Mutable access to one cell.
	pub fn cell_mut(&mut self, index: CellIdx) -> Option<&mut CellSnapshot> {
		self.cells.get_mut(index)
	}

	fn reindex(&mut self) {
		for (index, cell) in self.cells.iter_mut().enumerate() {
			cell.index = index;
		}
	}
}

impl NotebookHost for MemoryNotebook {
	fn cell_count(&self) -> usize {
		self.cells.len()
	}

	fn cell(&self, index: CellIdx) -> Option<CellSnapshot> {
		self.cells.get(index).cloned()
	}
}
