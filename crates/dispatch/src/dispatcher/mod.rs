//! Debounced per-document diff dispatch.
//!
//! # Purpose
//!
//! - Own one [`ChangeCollator`] per monitored notebook and decide *when* its diffs leave.
//! - Materialize diffs through the [`NotebookHost`] and hand them to a [`DiffConsumer`].
//! - Exclude the collation rules themselves; see the `nbwatch_collator` crate docs.
//!
//! # Mental model
//!
//! - Every recorded event re-arms a trailing debounce timer. A burst of notifications produces one flush.
//! - A flush that finds an execution in flight does nothing except re-arm with the poll interval. The
//!   dispatcher polls until the collator releases its diffs; it never blocks.
//! - An on-demand state request swaps in a short one-shot delay for a while, then the debounce is restored.
//! - The first delivery after attach, and after any state request, is a baseline carrying every cell.
//!
//! # Key types
//!
//! | Type | Meaning | Constraints | Constructed / mutated in |
//! |---|---|---|---|
//! | [`Dispatcher`] | Cloneable handle to one document's dispatch state | MUST be used inside a tokio runtime | `Dispatcher::attach` |
//! | [`DispatchPhase`] | Timer state machine | `Idle` -> `Accumulating` -> `Flushing` -> `Idle` or `Accumulating` | `Shared::arm`, `Shared::flush_locked` |
//! | [`FlushOutcome`] | Result of one flush attempt | `Deferred` iff an execution was in flight | `Shared::flush_locked` |
//!
//! # Invariants
//!
//! 1. A timer MUST only act if its generation is still current.
//!    - Enforced in: `Shared::on_timer`, `Shared::restore_delay`
//!    - Tested by: `dispatcher::tests::burst_coalesces_into_one_delivery`, `dispatcher::tests::closed_dispatcher_never_fires`
//!    - Failure symptom: a superseded timer flushes early and splits a burst across two deliveries.
//!
//! 2. No diff MUST be delivered while any cell is pending.
//!    - Enforced in: `Shared::flush_locked`
//!    - Tested by: `dispatcher::tests::pending_execution_polls_until_complete`
//!    - Failure symptom: the consumer sees an execution with stale outputs.
//!
//! 3. The consumer MUST be invoked with the state lock released.
//!    - Enforced in: `Shared::on_timer`, `Dispatcher::flush_now`
//!    - Tested by: `dispatcher::tests::consumer_may_call_back_into_dispatcher`
//!    - Failure symptom: deadlock when a consumer requests state from inside `deliver`.

use std::sync::Arc;
use std::time::Duration;

use nbwatch_collator::{CellEvent, ChangeCollator, CollatorError, CollatorSnapshot, NotebookHost};
use nbwatch_primitives::{CellIdx, CellSnapshot, Diff, DocumentId};
use parking_lot::Mutex;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::config::DispatchConfig;
use crate::consumer::{Delivery, DiffConsumer};

/// Current phase of a document's dispatch timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchPhase {
	/// Nothing recorded since the last flush.
	Idle,
	/// Events recorded, waiting for the timer to elapse.
	Accumulating,
	/// A flush is running.
	Flushing,
}

/// Result of a flush attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
	/// Deliveries were handed to the consumer.
	Delivered(usize),
	/// Deliveries were buffered because watch mode is off.
	Buffered(usize),
	/// An execution is in flight; a poll was scheduled.
	Deferred,
	/// There was nothing to deliver.
	Nothing,
	/// The dispatcher is closed.
	Closed,
}

/// Handle to one document's dispatch state.
pub struct Dispatcher<H, C> {
	shared: Arc<Shared<H, C>>,
}

impl<H, C> Clone for Dispatcher<H, C> {
	fn clone(&self) -> Self {
		Self {
			shared: Arc::clone(&self.shared),
		}
	}
}

impl<H, C> std::fmt::Debug for Dispatcher<H, C> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Dispatcher")
			.field("document", &self.shared.document)
			.field("state", &*self.shared.state.lock())
			.finish()
	}
}

struct Shared<H, C> {
	document: DocumentId,
	host: H,
	consumer: C,
	config: DispatchConfig,
	state: Mutex<DispatchState>,
}

#[derive(Debug)]
struct DispatchState {
	collator: ChangeCollator,
	phase: DispatchPhase,
	/// Delay used when the next event arms the timer.
	delay: Duration,
	timer: Option<CancellationToken>,
	generation: u64,
	restore: Option<CancellationToken>,
	restore_generation: u64,
	/// Next delivery is a baseline.
	needs_full: bool,
	watch: bool,
	buffered: Vec<Delivery>,
	closed: bool,
}

impl<H, C> Dispatcher<H, C>
where
	H: NotebookHost + Send + Sync + 'static,
	C: DiffConsumer,
{
	/// Starts dispatching for `document` and schedules its baseline delivery.
	///
	/// # Panics
	///
	/// Panics if called outside a tokio runtime.
	pub fn attach(document: DocumentId, host: H, consumer: C, config: DispatchConfig) -> Self {
		let cell_count = host.cell_count();
		debug!(document = %document, cell_count, "dispatch.attach");
		let state = DispatchState {
			collator: ChangeCollator::new(cell_count),
			phase: DispatchPhase::Idle,
			delay: config.debounce,
			timer: None,
			generation: 0,
			restore: None,
			restore_generation: 0,
			needs_full: true,
			watch: config.watch,
			buffered: Vec::new(),
			closed: false,
		};
		let dispatcher = Self {
			shared: Arc::new(Shared {
				document,
				host,
				consumer,
				config,
				state: Mutex::new(state),
			}),
		};
		dispatcher.request_state();
		dispatcher
	}

	/// Records a validated event and re-arms the debounce.
	pub fn record(&self, event: CellEvent) -> Result<(), CollatorError> {
		let mut state = self.shared.state.lock();
		if state.closed {
			trace!(document = %self.shared.document, "dispatch.record_after_close");
			return Ok(());
		}
		state.collator.ingest(event)?;
		let delay = state.delay;
		self.shared.arm(&mut state, delay);
		Ok(())
	}

	/// Records a raw host payload; unusable payloads are logged and ignored.
	pub fn ingest_value(&self, payload: &Value) -> bool {
		let mut state = self.shared.state.lock();
		if state.closed || !state.collator.ingest_value(payload) {
			return false;
		}
		let delay = state.delay;
		self.shared.arm(&mut state, delay);
		true
	}

	/// Records a burst of events and checks for structural drift.
	pub fn ingest_batch(&self, events: impl IntoIterator<Item = CellEvent>) -> usize {
		let mut state = self.shared.state.lock();
		if state.closed {
			return 0;
		}
		let recorded = state.collator.ingest_batch(events, &self.shared.host);
		let delay = state.delay;
		self.shared.arm(&mut state, delay);
		recorded
	}

	/// Bulk-records deferred typing edits, e.g. when focus leaves a cell.
	pub fn set_document_changes(&self, cells: impl IntoIterator<Item = CellIdx>) {
		let mut state = self.shared.state.lock();
		if state.closed {
			return;
		}
		state.collator.set_document_changes(cells);
		let delay = state.delay;
		self.shared.arm(&mut state, delay);
	}

	/// Requests a full-state delivery on the short one-shot delay.
	pub fn request_state(&self) {
		let mut state = self.shared.state.lock();
		if state.closed {
			return;
		}
		state.needs_full = true;
		state.delay = self.shared.config.one_shot;
		self.shared.schedule_restore(&mut state);
		let delay = state.delay;
		self.shared.arm(&mut state, delay);
		debug!(document = %self.shared.document, ?delay, "dispatch.request_state");
	}

	/// Drops all unflushed state and cancels timers, e.g. after a kernel restart.
	pub fn reset(&self) {
		let mut state = self.shared.state.lock();
		self.shared.reset_locked(&mut state);
	}

	/// Resets and stops the dispatcher for good.
	pub fn close(&self) {
		let mut state = self.shared.state.lock();
		self.shared.reset_locked(&mut state);
		state.closed = true;
		debug!(document = %self.shared.document, "dispatch.close");
	}

	/// Switches between direct delivery and buffering.
	pub fn set_watch(&self, watch: bool) {
		let mut state = self.shared.state.lock();
		state.watch = watch;
		debug!(document = %self.shared.document, watch, "dispatch.set_watch");
	}

	/// Drains deliveries buffered while watch mode was off.
	pub fn take_buffered(&self) -> Vec<Delivery> {
		std::mem::take(&mut self.shared.state.lock().buffered)
	}

	/// Flushes immediately instead of waiting for the timer.
	pub fn flush_now(&self) -> FlushOutcome {
		let (outcome, deliveries) = {
			let mut state = self.shared.state.lock();
			if state.closed {
				return FlushOutcome::Closed;
			}
			Shared::<H, C>::disarm(&mut state);
			self.shared.flush_locked(&mut state)
		};
		self.shared.deliver(deliveries);
		outcome
	}

	/// Document this dispatcher serves.
	pub fn document(&self) -> &DocumentId {
		&self.shared.document
	}

	/// Current timer phase.
	pub fn phase(&self) -> DispatchPhase {
		self.shared.state.lock().phase
	}

	/// Delay the next recorded event will arm.
	pub fn current_delay(&self) -> Duration {
		self.shared.state.lock().delay
	}

	/// Returns `true` once [`Self::close`] has run.
	pub fn is_closed(&self) -> bool {
		self.shared.state.lock().closed
	}

	/// Returns `true` while deliveries go straight to the consumer.
	pub fn is_watching(&self) -> bool {
		self.shared.state.lock().watch
	}

	/// Number of buffered deliveries.
	pub fn buffered_len(&self) -> usize {
		self.shared.state.lock().buffered.len()
	}

	/// Returns `true` while any execution is in flight.
	pub fn has_pending(&self) -> bool {
		self.shared.state.lock().collator.has_pending()
	}

	/// Diagnostic view of the collator.
	pub fn snapshot(&self) -> CollatorSnapshot {
		self.shared.state.lock().collator.snapshot()
	}
}

impl<H, C> Shared<H, C>
where
	H: NotebookHost + Send + Sync + 'static,
	C: DiffConsumer,
{
	/// Cancels the current timer and re-arms it with `delay`.
	fn arm(self: &Arc<Self>, state: &mut DispatchState, delay: Duration) {
		Self::disarm(state);
		let generation = state.generation;
		let token = CancellationToken::new();
		state.timer = Some(token.clone());
		state.phase = DispatchPhase::Accumulating;

		let shared = Arc::clone(self);
		tokio::spawn(async move {
			tokio::select! {
				() = token.cancelled() => {}
				() = tokio::time::sleep(delay) => shared.on_timer(generation),
			}
		});
	}

	fn disarm(state: &mut DispatchState) {
		if let Some(timer) = state.timer.take() {
			timer.cancel();
		}
		state.generation += 1;
	}

	fn schedule_restore(self: &Arc<Self>, state: &mut DispatchState) {
		if let Some(restore) = state.restore.take() {
			restore.cancel();
		}
		state.restore_generation += 1;
		let generation = state.restore_generation;
		let token = CancellationToken::new();
		state.restore = Some(token.clone());

		let shared = Arc::clone(self);
		let delay = self.config.restore_after;
		tokio::spawn(async move {
			tokio::select! {
				() = token.cancelled() => {}
				() = tokio::time::sleep(delay) => shared.restore_delay(generation),
			}
		});
	}

	fn restore_delay(&self, generation: u64) {
		let mut state = self.state.lock();
		if state.closed || state.restore_generation != generation {
			return;
		}
		state.restore = None;
		state.delay = self.config.debounce;
		trace!(document = %self.document, "dispatch.delay_restored");
	}

	fn on_timer(self: &Arc<Self>, generation: u64) {
		let deliveries = {
			let mut state = self.state.lock();
			if state.closed || state.generation != generation {
				return;
			}
			state.timer = None;
			self.flush_locked(&mut state).1
		};
		self.deliver(deliveries);
	}

	/// Runs one flush under the lock. Deliveries for the consumer are
	/// returned rather than sent.
	fn flush_locked(self: &Arc<Self>, state: &mut DispatchState) -> (FlushOutcome, Vec<Delivery>) {
		state.phase = DispatchPhase::Flushing;
		if state.collator.has_pending() {
			self.cleanup(state);
		}
		if state.collator.has_pending() {
			trace!(document = %self.document, "dispatch.flush_deferred");
			self.arm(state, self.config.poll_interval);
			return (FlushOutcome::Deferred, Vec::new());
		}

		let deliveries = if state.needs_full {
			state.needs_full = false;
			vec![self.baseline(state)]
		} else {
			self.incremental(state)
		};

		if !state.collator.is_empty() {
			self.cleanup(state);
		}
		state.phase = DispatchPhase::Idle;

		let count = deliveries.len();
		if count == 0 {
			return (FlushOutcome::Nothing, Vec::new());
		}
		debug!(document = %self.document, deliveries = count, watch = state.watch, "dispatch.flush");
		if state.watch {
			return (FlushOutcome::Delivered(count), deliveries);
		}
		for delivery in deliveries {
			self.buffer(state, delivery);
		}
		(FlushOutcome::Buffered(count), Vec::new())
	}

	/// Reclaims executions abandoned in blank cells, which would otherwise
	/// hold every later diff back.
	fn cleanup(&self, state: &mut DispatchState) {
		let reclaimed = state.collator.cleanup(&self.host);
		if reclaimed > 0 {
			debug!(document = %self.document, reclaimed, "dispatch.cleanup");
		}
	}

	fn baseline(&self, state: &mut DispatchState) -> Delivery {
		let cell_count = self.host.cell_count();
		let notebook_metadata = state.collator.take_notebook_metadata();
		state.collator.reset(cell_count);
		debug!(document = %self.document, cell_count, "dispatch.baseline");
		Delivery {
			document: self.document.clone(),
			diff: Diff::full(cell_count),
			changed: (0..cell_count).filter_map(|index| self.resolve(index)).collect(),
			added: Vec::new(),
			removed: Vec::new(),
			cell_count,
			notebook_metadata,
			baseline: true,
		}
	}

	fn incremental(&self, state: &mut DispatchState) -> Vec<Delivery> {
		let diffs = state.collator.get_diffs();
		let mut notebook_metadata = state.collator.take_notebook_metadata();
		if diffs.is_empty() {
			let Some(metadata) = notebook_metadata else {
				return Vec::new();
			};
			let diff = Diff {
				cell_count: state.collator.cell_count(),
				..Diff::default()
			};
			return vec![self.materialize(diff, Some(metadata))];
		}
		diffs.into_iter().map(|diff| self.materialize(diff, notebook_metadata.take())).collect()
	}

	fn materialize(&self, diff: Diff, notebook_metadata: Option<Value>) -> Delivery {
		let changed = diff.changed.iter().filter_map(|&index| self.resolve(index)).collect();
		let added = diff.added_indices().into_iter().filter_map(|index| self.resolve(index)).collect();
		Delivery {
			document: self.document.clone(),
			removed: diff.removed_indices(),
			cell_count: diff.cell_count,
			changed,
			added,
			diff,
			notebook_metadata,
			baseline: false,
		}
	}

	fn resolve(&self, index: CellIdx) -> Option<CellSnapshot> {
		let snapshot = self.host.cell(index);
		if snapshot.is_none() {
			warn!(document = %self.document, cell = index, "dispatch.unresolved_cell");
		}
		snapshot
	}

	/// Keeps at most a quarter of the cell count buffered. Past that the
	/// buffer is dropped and a baseline is scheduled in its place.
	fn buffer(self: &Arc<Self>, state: &mut DispatchState, delivery: Delivery) {
		let limit = (state.collator.cell_count() / 4).max(1);
		if state.buffered.len() > limit {
			debug!(document = %self.document, dropped = state.buffered.len(), "dispatch.buffer_overflow");
			state.buffered.clear();
			state.needs_full = true;
			self.arm(state, self.config.one_shot);
			return;
		}
		state.buffered.push(delivery);
	}

	fn deliver(&self, deliveries: Vec<Delivery>) {
		for delivery in deliveries {
			self.consumer.deliver(delivery);
		}
	}

	fn reset_locked(&self, state: &mut DispatchState) {
		Self::disarm(state);
		if let Some(restore) = state.restore.take() {
			restore.cancel();
		}
		state.restore_generation += 1;
		state.collator.reset(self.host.cell_count());
		state.buffered.clear();
		state.delay = self.config.debounce;
		state.phase = DispatchPhase::Idle;
		debug!(document = %self.document, "dispatch.reset");
	}
}

#[cfg(test)]
mod tests;
