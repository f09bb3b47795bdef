//! Per-cell change accumulator.
//!
//! A [`ChangeSummary`] records *that* a dimension of a cell changed, plus the
//! two execution counters that must be cross-referenced before an execution
//! can be reported as finished:
//!
//! - `execution_order`, observed on the execution-state channel
//! - `metadata_execution_count`, observed on the metadata channel
//!
//! The two arrive independently and in either order. A summary settles when
//! they agree, see [`ChangeSummary::settle_on_metadata`] and
//! [`ChangeSummary::settle_on_execution`].

use serde::Serialize;

/// Why a summary moved from the live map into the settled set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleReason {
	/// Metadata counter matched an already-observed execution order.
	Metadata,
	/// Completion signal arrived with a matching metadata counter.
	Execution,
	/// First event for the cell was an output replacement.
	Outputs,
	/// Deferred typing edit promoted at diff time.
	DeferredEdit,
}

impl SettleReason {
	pub(crate) const fn as_str(self) -> &'static str {
		match self {
			Self::Metadata => "metadata",
			Self::Execution => "execution",
			Self::Outputs => "outputs",
			Self::DeferredEdit => "deferred_edit",
		}
	}
}

/// Outcome of recording an execution-state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionRecord {
	/// The transition carried new information.
	Recorded,
	/// The `(order, success)` pair repeated the previous one.
	Duplicate,
}

/// Unresolved changes for one cell.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeSummary {
	/// A source-text edit was seen.
	pub document_changed: bool,
	/// A non-execution-counter metadata edit was seen.
	pub metadata_changed: bool,
	/// Output content was replaced.
	pub outputs_changed: bool,
	/// An execution-state transition was seen.
	pub execution_changed: bool,
	/// Last execution counter observed via metadata.
	pub metadata_execution_count: Option<i64>,
	/// Last execution counter observed via the execution-state channel.
	pub execution_order: Option<i64>,
	/// Completion flag observed via the execution-state channel.
	pub execution_success: Option<bool>,
	/// Number of events folded into this summary.
	pub event_count: u32,
	#[serde(skip)]
	last_execution: Option<(Option<i64>, Option<bool>)>,
}

impl ChangeSummary {
	/// Returns `true` while only one event has been folded in.
	pub const fn is_first_event(&self) -> bool {
		self.event_count == 1
	}

	/// Returns `true` once either execution channel has reported anything.
	pub const fn has_execution_signal(&self) -> bool {
		self.execution_order.is_some() || self.metadata_execution_count.is_some()
	}

	/// Both counters are known and equal.
	pub fn counters_match(&self) -> bool {
		self.execution_order.is_some() && self.execution_order == self.metadata_execution_count
	}

	/// Flags a source edit. Returns `false` if one was already flagged.
	pub fn record_document_edit(&mut self) -> bool {
		if self.document_changed {
			return false;
		}
		self.event_count += 1;
		self.document_changed = true;
		true
	}

	/// Folds a metadata change in.
	///
	/// A defined counter updates `metadata_execution_count`; anything else is
	/// a plain metadata edit.
	pub fn record_metadata(&mut self, execution_count: Option<i64>) {
		self.event_count += 1;
		match execution_count {
			Some(count) => self.metadata_execution_count = Some(count),
			None => self.metadata_changed = true,
		}
	}

	/// Folds an execution-state transition in.
	///
	/// An undefined order keeps the previously observed one, so a cell that
	/// entered `pending` keeps the order it is waiting on.
	pub fn record_execution(&mut self, execution_order: Option<i64>, success: Option<bool>) -> ExecutionRecord {
		let pair = (execution_order, success);
		if self.last_execution == Some(pair) {
			return ExecutionRecord::Duplicate;
		}
		self.last_execution = Some(pair);
		self.event_count += 1;
		self.execution_changed = true;
		if execution_order.is_some() {
			self.execution_order = execution_order;
		}
		self.execution_success = success;
		ExecutionRecord::Recorded
	}

	/// Flags an output replacement.
	pub fn record_outputs(&mut self) {
		self.event_count += 1;
		self.outputs_changed = true;
	}

	/// Settle trigger after a metadata counter arrives.
	pub fn settle_on_metadata(&self) -> Option<SettleReason> {
		self.counters_match().then_some(SettleReason::Metadata)
	}

	/// Settle trigger after an execution transition arrives.
	///
	/// A completion whose counter disagrees with metadata stays pending.
	pub fn settle_on_execution(&self) -> Option<SettleReason> {
		(self.execution_success.is_some() && self.counters_match()).then_some(SettleReason::Execution)
	}

	/// Settle trigger after an output replacement arrives.
	///
	/// Only a cell's first event can settle this way: clearing outputs, or a
	/// display update with no associated execution.
	pub fn settle_on_outputs(&self, is_empty: bool) -> Option<SettleReason> {
		(self.is_first_event() && (is_empty || !self.has_execution_signal())).then_some(SettleReason::Outputs)
	}

	/// Execution started but never completed.
	///
	/// Such a summary is a cleanup candidate when the underlying cell turns
	/// out to be blank.
	pub const fn looks_dangling(&self) -> bool {
		self.execution_changed && self.execution_order.is_some() && self.execution_success.is_none()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn repeated_execution_pair_is_duplicate() {
		let mut summary = ChangeSummary::default();
		assert_eq!(summary.record_execution(Some(1), None), ExecutionRecord::Recorded);
		assert_eq!(summary.record_execution(Some(1), None), ExecutionRecord::Duplicate);
		assert_eq!(summary.record_execution(Some(1), Some(true)), ExecutionRecord::Recorded);
		assert_eq!(summary.record_execution(Some(1), Some(true)), ExecutionRecord::Duplicate);
		assert_eq!(summary.event_count, 2);
	}

	#[test]
	fn undefined_order_keeps_previous_order() {
		let mut summary = ChangeSummary::default();
		summary.record_execution(Some(4), None);
		summary.record_execution(None, Some(false));
		assert_eq!(summary.execution_order, Some(4));
		assert_eq!(summary.execution_success, Some(false));
	}

	#[test]
	fn execution_settles_only_with_matching_counters() {
		let mut summary = ChangeSummary::default();
		summary.record_execution(Some(2), None);
		assert_eq!(summary.settle_on_execution(), None);

		summary.record_metadata(Some(1));
		summary.record_execution(Some(2), Some(true));
		assert_eq!(summary.settle_on_execution(), None);

		summary.record_metadata(Some(2));
		assert_eq!(summary.settle_on_metadata(), Some(SettleReason::Metadata));
		assert_eq!(summary.settle_on_execution(), Some(SettleReason::Execution));
	}

	#[test]
	fn metadata_without_counter_is_plain_edit() {
		let mut summary = ChangeSummary::default();
		summary.record_metadata(None);
		assert!(summary.metadata_changed);
		assert_eq!(summary.metadata_execution_count, None);
		assert_eq!(summary.settle_on_metadata(), None);
	}

	#[test]
	fn outputs_settle_only_as_first_event() {
		let mut summary = ChangeSummary::default();
		summary.record_outputs();
		assert_eq!(summary.settle_on_outputs(false), Some(SettleReason::Outputs));

		let mut summary = ChangeSummary::default();
		summary.record_execution(Some(3), None);
		summary.record_outputs();
		assert_eq!(summary.settle_on_outputs(true), None);
	}

	#[test]
	fn document_edit_flags_once() {
		let mut summary = ChangeSummary::default();
		assert!(summary.record_document_edit());
		assert!(!summary.record_document_edit());
		assert_eq!(summary.event_count, 1);
	}

	#[test]
	fn started_execution_looks_dangling_until_completed() {
		let mut summary = ChangeSummary::default();
		assert!(!summary.looks_dangling());
		summary.record_execution(Some(1), None);
		assert!(summary.looks_dangling());
		summary.record_execution(Some(1), Some(true));
		assert!(!summary.looks_dangling());
	}
}
