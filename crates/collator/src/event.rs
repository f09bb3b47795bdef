//! Tagged change vocabulary accepted by the collator.

use nbwatch_primitives::CellIdx;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One change notification from the host, tagged by kind.
///
/// Each variant carries only the fields relevant to it. On the wire the
/// variant is selected by a `kind` field:
///
/// ```json
/// {"kind": "execution_update", "cell": 1, "execution_order": 4, "success": true}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CellEvent {
	/// Source text of a cell was edited.
	DocumentEdit {
		/// Edited cell.
		cell: CellIdx,
	},
	/// Cell metadata changed, optionally carrying an execution counter.
	MetadataChange {
		/// Changed cell.
		cell: CellIdx,
		/// Execution counter found in the new metadata.
		#[serde(default, skip_serializing_if = "Option::is_none")]
		execution_count: Option<i64>,
	},
	/// Cell outputs were replaced.
	OutputsUpdate {
		/// Changed cell.
		cell: CellIdx,
		/// Number of outputs after the replacement.
		output_count: usize,
		/// Whether the outputs are now empty.
		is_empty: bool,
	},
	/// Execution state of a cell transitioned.
	ExecutionUpdate {
		/// Executing cell.
		cell: CellIdx,
		/// Execution counter, once the kernel assigned one.
		#[serde(default, skip_serializing_if = "Option::is_none")]
		execution_order: Option<i64>,
		/// Completion flag, once the execution finished.
		#[serde(default, skip_serializing_if = "Option::is_none")]
		success: Option<bool>,
	},
	/// Cells were inserted.
	CellsAdded {
		/// Insertion index.
		start: CellIdx,
		/// Post-insertion indices of the new cells.
		cell_indexes: Vec<CellIdx>,
		/// Cell count after the insertion. Derived from the tracked count
		/// when absent.
		#[serde(default, skip_serializing_if = "Option::is_none")]
		cell_count: Option<usize>,
	},
	/// Cells in `[start, end)` were removed.
	CellsRemoved {
		/// First removed index.
		start: CellIdx,
		/// One past the last removed index.
		end: CellIdx,
		/// Cell count after the removal. Derived from the tracked count
		/// when absent.
		#[serde(default, skip_serializing_if = "Option::is_none")]
		cell_count: Option<usize>,
	},
	/// Notebook-level metadata changed.
	NotebookMetadata {
		/// The new metadata object.
		metadata: Value,
	},
}

impl CellEvent {
	/// The cell a cell-level event refers to.
	pub const fn cell(&self) -> Option<CellIdx> {
		match self {
			Self::DocumentEdit { cell }
			| Self::MetadataChange { cell, .. }
			| Self::OutputsUpdate { cell, .. }
			| Self::ExecutionUpdate { cell, .. } => Some(*cell),
			Self::CellsAdded { .. } | Self::CellsRemoved { .. } | Self::NotebookMetadata { .. } => None,
		}
	}

	/// Returns `true` for insert/remove events.
	pub const fn is_structural(&self) -> bool {
		matches!(self, Self::CellsAdded { .. } | Self::CellsRemoved { .. })
	}

	/// Output replacement event derived from an output count.
	pub const fn outputs(cell: CellIdx, output_count: usize) -> Self {
		Self::OutputsUpdate {
			cell,
			output_count,
			is_empty: output_count == 0,
		}
	}
}
