use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A position in the current cell ordering.
///
/// This is not a stable identity: inserting or removing cells shifts the
/// index of every later cell.
pub type CellIdx = usize;

/// Cell flavour as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellKind {
	/// Executable code cell.
	#[default]
	Code,
	/// Rendered markdown cell.
	Markdown,
	/// Raw, unrendered cell.
	Raw,
}

/// Point-in-time content of a single cell, read from the host on demand.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CellSnapshot {
	/// Index of the cell at the time the snapshot was taken.
	pub index: CellIdx,
	/// Cell flavour.
	pub kind: CellKind,
	/// Source text.
	pub source: String,
	/// Cell metadata as an arbitrary JSON object.
	#[serde(default)]
	pub metadata: Value,
	/// Execution counter, when the cell has been executed.
	#[serde(default)]
	pub execution_count: Option<i64>,
	/// Output items, opaque to the engine.
	#[serde(default)]
	pub outputs: Vec<Value>,
}

impl CellSnapshot {
	/// Creates a code cell snapshot with the given source and nothing else.
	pub fn code(index: CellIdx, source: impl Into<String>) -> Self {
		Self {
			index,
			kind: CellKind::Code,
			source: source.into(),
			..Self::default()
		}
	}

	/// Returns `true` when the cell carries no outputs, no execution counter,
	/// and only whitespace source.
	pub fn is_blank(&self) -> bool {
		self.outputs.is_empty() && self.execution_count.is_none() && self.source.trim().is_empty()
	}
}
