//! Tagged-event entry points.
//!
//! [`ChangeCollator::ingest`] validates an event and routes it to the
//! matching recording primitive. The `_value` and `_batch` variants are the
//! tolerant host-facing forms: rejected events are logged and dropped, and
//! never reach collator state.

use serde_json::Value;
use tracing::{trace, warn};

use crate::collator::ChangeCollator;
use crate::error::CollatorError;
use crate::event::CellEvent;
use crate::host::NotebookHost;

impl ChangeCollator {
	/// Validates `event` and records it.
	///
	/// Structural events without an explicit `cell_count` derive it from the
	/// tracked count.
	pub fn ingest(&mut self, event: CellEvent) -> Result<(), CollatorError> {
		trace!(event = %event, "collator.ingest");
		match event {
			CellEvent::DocumentEdit { cell } => self.record_document_edit(cell),
			CellEvent::MetadataChange { cell, execution_count } => self.record_cell_metadata_change(cell, execution_count),
			CellEvent::OutputsUpdate {
				cell,
				output_count,
				is_empty,
			} => self.record_outputs_update(cell, output_count, is_empty),
			CellEvent::ExecutionUpdate {
				cell,
				execution_order,
				success,
			} => self.record_execution_update(cell, execution_order, success),
			CellEvent::CellsAdded {
				start,
				cell_indexes,
				cell_count,
			} => {
				if cell_indexes.is_empty() {
					return Err(CollatorError::EmptyInsertion { start });
				}
				let cell_count = cell_count.unwrap_or(self.cell_count() + cell_indexes.len());
				self.record_cell_addition(start, cell_indexes, cell_count);
			}
			CellEvent::CellsRemoved { start, end, cell_count } => {
				if end < start {
					return Err(CollatorError::InvalidRange { start, end });
				}
				let cell_count = match cell_count {
					Some(count) => count,
					None => {
						let removed = end - start;
						self.cell_count().checked_sub(removed).ok_or(CollatorError::CountUnderflow {
							removed,
							cell_count: self.cell_count(),
						})?
					}
				};
				self.record_cell_removal(start, end, cell_count);
			}
			CellEvent::NotebookMetadata { metadata } => self.record_notebook_metadata_change(metadata),
		}
		Ok(())
	}

	/// Records a raw host payload, logging and ignoring anything unusable.
	///
	/// Returns `true` if the payload was recorded.
	pub fn ingest_value(&mut self, payload: &Value) -> bool {
		let result = if payload.is_null() {
			Err(CollatorError::NullEvent)
		} else {
			serde_json::from_value::<CellEvent>(payload.clone())
				.map_err(CollatorError::from)
				.and_then(|event| self.ingest(event))
		};
		match result {
			Ok(()) => true,
			Err(error) => {
				warn!(%error, "collator.rejected_event");
				false
			}
		}
	}

	/// Records a burst of events, then checks the tracked cell count against
	/// the host.
	///
	/// On drift a diff check is forced so the consumer resynchronises from
	/// whatever is already settled. Returns the number of events recorded.
	pub fn ingest_batch<H: NotebookHost + ?Sized>(&mut self, events: impl IntoIterator<Item = CellEvent>, host: &H) -> usize {
		let mut recorded = 0;
		for event in events {
			match self.ingest(event) {
				Ok(()) => recorded += 1,
				Err(error) => warn!(%error, "collator.rejected_event"),
			}
		}

		let host_count = host.cell_count();
		if host_count != self.cell_count() {
			warn!(tracked = self.cell_count(), host = host_count, "collator.cell_count_drift");
			self.add_diff();
		}
		recorded
	}
}
