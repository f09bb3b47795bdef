//! Reclaims state for executions that will never complete.
//!
//! A cell that was created, run for an instant, and abandoned (accidental
//! insertion, interrupted empty cell) can leave a summary with an execution
//! order but no completion. If the host now shows that cell as blank, the
//! summary is dropped.

use nbwatch_primitives::CellIdx;
use tracing::debug;

use super::ChangeCollator;
use crate::host::NotebookHost;

impl ChangeCollator {
	/// Removes dangling execution summaries for blank or vanished cells.
	///
	/// Returns the number of cells reclaimed.
	pub fn cleanup<H: NotebookHost + ?Sized>(&mut self, host: &H) -> usize {
		let candidates: Vec<CellIdx> = self
			.live
			.iter()
			.chain(self.full.iter())
			.filter(|(_, summary)| summary.looks_dangling())
			.map(|(cell, _)| *cell)
			.collect();

		let mut reclaimed = 0;
		for cell in candidates {
			let abandoned = match host.cell(cell) {
				Some(snapshot) => snapshot.is_blank(),
				None => true,
			};
			if !abandoned {
				continue;
			}
			debug!(cell, "collator.cleanup_dangling");
			self.discard(cell);
			self.full.shift_remove(&cell);
			reclaimed += 1;
		}

		if reclaimed > 0 {
			debug!(reclaimed, "collator.cleanup");
		}
		reclaimed
	}
}
