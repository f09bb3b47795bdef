//! Host-agnostic change collation.
//!
//! [`ChangeCollator`] owns all unresolved per-cell state for one document:
//! - Live [`ChangeSummary`] entries, created lazily on a cell's first event
//! - The settled (`full`) set awaiting the next diff
//! - Cells with an execution in flight (`pending`)
//! - Deferred typing and plain metadata edits, promoted only when a diff is
//!   extracted
//! - Queued structural changes and computed diffs
//!
//! # Backpressure
//!
//! No diff is extracted while any cell is pending, so a half-finished
//! execution is never reported. Pending cells leave that state only by
//! settling, by structural removal, by [`ChangeCollator::cleanup`], or by
//! [`ChangeCollator::reset`].
//!
//! # Dangling signals
//!
//! A metadata execution counter or a completion signal for a cell the
//! collator has never seen cannot be attributed to anything and is dropped.

mod cleanup;
mod structural;

use std::collections::VecDeque;

use indexmap::{IndexMap, IndexSet};
use nbwatch_primitives::{CellIdx, Diff, RemovedRange};
use rustc_hash::{FxBuildHasher, FxHashMap, FxHashSet};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, trace};

use self::structural::StructuralTracker;
use crate::summary::{ChangeSummary, ExecutionRecord, SettleReason};

/// Reduces cell change notifications into minimal diffs.
#[derive(Debug, Clone, Default)]
pub struct ChangeCollator {
	live: FxHashMap<CellIdx, ChangeSummary>,
	full: IndexMap<CellIdx, ChangeSummary, FxBuildHasher>,
	pending: FxHashSet<CellIdx>,
	document_changes: IndexSet<CellIdx, FxBuildHasher>,
	structural: StructuralTracker,
	cell_count: usize,
	diffs: VecDeque<Diff>,
	notebook_metadata: Option<Value>,
}

/// Cloned view of the whole collator state, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollatorSnapshot {
	/// Unresolved summaries, sorted by index.
	pub live: Vec<(CellIdx, ChangeSummary)>,
	/// Settled summaries, in settle order.
	pub full: Vec<(CellIdx, ChangeSummary)>,
	/// Cells with an execution in flight, sorted.
	pub pending: Vec<CellIdx>,
	/// Deferred typing edits, in recording order.
	pub document_changes: Vec<CellIdx>,
	/// Queued insertions.
	pub added: Vec<nbwatch_primitives::AddedBlock>,
	/// Queued removals.
	pub removed: Vec<RemovedRange>,
	/// Tracked cell count.
	pub cell_count: usize,
	/// Diffs computed but not yet drained.
	pub queued_diffs: Vec<Diff>,
}

impl ChangeCollator {
	/// Creates an empty collator for a document with `cell_count` cells.
	pub fn new(cell_count: usize) -> Self {
		Self {
			cell_count,
			..Self::default()
		}
	}

	/// Records a source-text edit.
	///
	/// The edit is deferred: rapid keystroke-level edits coalesce until the
	/// next diff extraction promotes them.
	pub fn record_document_edit(&mut self, cell: CellIdx) {
		if self.is_settled(cell, "document_edit") {
			return;
		}
		let summary = self.live.entry(cell).or_default();
		if !summary.record_document_edit() {
			trace!(cell, "collator.duplicate_document_edit");
			return;
		}
		self.document_changes.insert(cell);
		trace!(cell, "collator.document_edit");
	}

	/// Records a cell metadata change, optionally carrying an execution counter.
	///
	/// Without a counter the edit is deferred like a typing edit.
	pub fn record_cell_metadata_change(&mut self, cell: CellIdx, execution_count: Option<i64>) {
		if self.is_settled(cell, "metadata_change") {
			return;
		}
		if execution_count.is_some() && !self.live.contains_key(&cell) {
			trace!(cell, ?execution_count, "collator.dangling_metadata");
			return;
		}
		let summary = self.live.entry(cell).or_default();
		summary.record_metadata(execution_count);
		trace!(cell, ?execution_count, "collator.metadata_change");
		if let Some(reason) = summary.settle_on_metadata() {
			self.settle(cell, reason);
		} else if execution_count.is_none() {
			self.document_changes.insert(cell);
		}
	}

	/// Records an execution-state transition.
	pub fn record_execution_update(&mut self, cell: CellIdx, execution_order: Option<i64>, success: Option<bool>) {
		if self.is_settled(cell, "execution_update") {
			return;
		}
		if !self.live.contains_key(&cell) && (execution_order.is_none() || success.is_some()) {
			trace!(cell, ?execution_order, ?success, "collator.dangling_execution");
			return;
		}
		let summary = self.live.entry(cell).or_default();
		if summary.record_execution(execution_order, success) == ExecutionRecord::Duplicate {
			trace!(cell, ?execution_order, ?success, "collator.duplicate_execution");
			return;
		}
		trace!(cell, ?execution_order, ?success, "collator.execution_update");
		let settle = summary.settle_on_execution();
		if execution_order.is_some() {
			self.pending.insert(cell);
		}
		match settle {
			Some(reason) => self.settle(cell, reason),
			None if success.is_some() => {
				trace!(cell, ?execution_order, "collator.completion_uncorroborated");
			}
			None => {}
		}
	}

	/// Records an output replacement.
	pub fn record_outputs_update(&mut self, cell: CellIdx, output_count: usize, is_empty: bool) {
		if self.is_settled(cell, "outputs_update") {
			return;
		}
		let summary = self.live.entry(cell).or_default();
		summary.record_outputs();
		trace!(cell, output_count, is_empty, "collator.outputs_update");
		if let Some(reason) = summary.settle_on_outputs(is_empty) {
			self.settle(cell, reason);
		}
	}

	/// Records an insertion of cells at `start`.
	///
	/// Live state at the new indices is discarded; the new cells are
	/// reported through the added block itself.
	pub fn record_cell_addition(&mut self, start: CellIdx, cell_indexes: Vec<CellIdx>, cell_count: usize) {
		for &cell in &cell_indexes {
			self.discard(cell);
		}
		debug!(start, added = cell_indexes.len(), cell_count, "collator.cells_added");
		self.structural.push_added(start, cell_indexes);
		self.cell_count = cell_count;
		self.add_diff();
	}

	/// Records removal of the cells in `[start, end)`.
	///
	/// Every piece of per-cell state inside the range is purged.
	pub fn record_cell_removal(&mut self, start: CellIdx, end: CellIdx, cell_count: usize) {
		let range = RemovedRange::new(start, end);
		self.purge_range(range);
		debug!(start, end, removed = range.len(), cell_count, "collator.cells_removed");
		self.structural.push_removed(range);
		self.cell_count = cell_count;
		self.add_diff();
	}

	/// Records a notebook-level metadata change.
	///
	/// The metadata is handed out once through [`Self::take_notebook_metadata`].
	pub fn record_notebook_metadata_change(&mut self, metadata: Value) {
		debug!("collator.notebook_metadata");
		self.notebook_metadata = Some(metadata);
		self.add_diff();
	}

	/// Bulk-records deferred typing edits, e.g. once focus left a cell.
	pub fn set_document_changes(&mut self, cells: impl IntoIterator<Item = CellIdx>) {
		for cell in cells {
			self.record_document_edit(cell);
		}
	}

	/// Extracts a diff if one is available and queues it.
	///
	/// Returns `true` if a diff was queued.
	pub fn add_diff(&mut self) -> bool {
		let Some(diff) = self.extract_diff() else {
			return false;
		};
		debug!(
			changed = diff.changed.len(),
			added = diff.added.len(),
			removed = diff.removed.len(),
			cell_count = diff.cell_count,
			"collator.diff"
		);
		self.diffs.push_back(diff);
		true
	}

	/// Runs a final extraction and drains every queued diff in FIFO order.
	pub fn get_diffs(&mut self) -> Vec<Diff> {
		self.add_diff();
		self.diffs.drain(..).collect()
	}

	/// Takes the last notebook-level metadata change, if any.
	pub fn take_notebook_metadata(&mut self) -> Option<Value> {
		self.notebook_metadata.take()
	}

	/// Drops all state, e.g. after a kernel restart.
	pub fn reset(&mut self, cell_count: usize) {
		debug!(cell_count, "collator.reset");
		self.live.clear();
		self.full.clear();
		self.pending.clear();
		self.document_changes.clear();
		self.structural.clear();
		self.diffs.clear();
		self.notebook_metadata = None;
		self.cell_count = cell_count;
	}

	/// No unresolved, settled, pending, structural, or queued state remains.
	pub fn is_empty(&self) -> bool {
		self.live.is_empty()
			&& self.full.is_empty()
			&& self.pending.is_empty()
			&& self.structural.is_empty()
			&& self.diffs.is_empty()
	}

	/// Returns `true` while any execution is in flight.
	pub fn has_pending(&self) -> bool {
		!self.pending.is_empty()
	}

	/// Returns `true` while deferred typing edits exist.
	pub fn has_document_changes(&self) -> bool {
		!self.document_changes.is_empty()
	}

	/// Returns `true` if a diff is queued or could be extracted now.
	pub fn has_diffs(&self) -> bool {
		self.can_extract() || !self.diffs.is_empty()
	}

	/// Tracked cell count.
	pub const fn cell_count(&self) -> usize {
		self.cell_count
	}

	/// Clone of the unresolved or settled summary for `cell`.
	pub fn summary(&self, cell: CellIdx) -> Option<ChangeSummary> {
		self.live.get(&cell).or_else(|| self.full.get(&cell)).cloned()
	}

	/// Returns `true` if `cell` is waiting on an execution to complete.
	pub fn is_pending(&self, cell: CellIdx) -> bool {
		self.pending.contains(&cell)
	}

	/// Cloned view of the whole state.
	pub fn snapshot(&self) -> CollatorSnapshot {
		let mut live: Vec<_> = self.live.iter().map(|(cell, summary)| (*cell, summary.clone())).collect();
		live.sort_by_key(|(cell, _)| *cell);
		let mut pending: Vec<_> = self.pending.iter().copied().collect();
		pending.sort_unstable();
		CollatorSnapshot {
			live,
			full: self.full.iter().map(|(cell, summary)| (*cell, summary.clone())).collect(),
			pending,
			document_changes: self.document_changes.iter().copied().collect(),
			added: self.structural.added().to_vec(),
			removed: self.structural.removed().to_vec(),
			cell_count: self.cell_count,
			queued_diffs: self.diffs.iter().cloned().collect(),
		}
	}

	/// Cells already queued for the next diff ignore further cell-level
	/// events; the consumer re-reads their content anyway.
	fn is_settled(&self, cell: CellIdx, event: &'static str) -> bool {
		let settled = self.full.contains_key(&cell);
		if settled {
			trace!(cell, event, "collator.already_settled");
		}
		settled
	}

	/// Moves a live summary into the settled set.
	fn settle(&mut self, cell: CellIdx, reason: SettleReason) {
		let Some(summary) = self.live.remove(&cell) else {
			return;
		};
		trace!(cell, reason = reason.as_str(), "collator.settle");
		self.full.insert(cell, summary);
		self.pending.remove(&cell);
		self.document_changes.shift_remove(&cell);
	}

	/// Drops unresolved state for one cell.
	fn discard(&mut self, cell: CellIdx) {
		self.live.remove(&cell);
		self.pending.remove(&cell);
		self.document_changes.shift_remove(&cell);
	}

	fn purge_range(&mut self, range: RemovedRange) {
		self.live.retain(|cell, _| !range.contains(*cell));
		self.full.retain(|cell, _| !range.contains(*cell));
		self.pending.retain(|cell| !range.contains(*cell));
		self.document_changes.retain(|cell| !range.contains(*cell));
	}

	fn can_extract(&self) -> bool {
		self.pending.is_empty() && (!self.document_changes.is_empty() || !self.full.is_empty() || !self.structural.is_empty())
	}

	fn extract_diff(&mut self) -> Option<Diff> {
		if !self.can_extract() {
			return None;
		}

		let deferred = std::mem::take(&mut self.document_changes);
		for cell in deferred {
			self.settle(cell, SettleReason::DeferredEdit);
		}

		let (added, removed) = self.structural.drain();
		for cell in added.iter().flat_map(|block| block.cell_indexes.iter().copied()) {
			self.live.remove(&cell);
			self.document_changes.shift_remove(&cell);
		}
		for range in &removed {
			self.purge_range(*range);
		}
		let changed = self.full.drain(..).map(|(cell, _)| cell).collect();

		Some(Diff {
			changed,
			added,
			removed,
			cell_count: self.cell_count,
		})
	}
}
