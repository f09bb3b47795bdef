use std::sync::{Arc, OnceLock};
use std::time::Duration;

use nbwatch_collator::MemoryNotebook;
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::sync::mpsc;

use super::*;

#[derive(Clone)]
struct SharedNotebook(Arc<Mutex<MemoryNotebook>>);

impl SharedNotebook {
	fn new(cells: usize) -> Self {
		Self(Arc::new(Mutex::new(MemoryNotebook::with_code_cells(cells))))
	}

	fn edit<R>(&self, f: impl FnOnce(&mut MemoryNotebook) -> R) -> R {
		f(&mut *self.0.lock())
	}
}

impl NotebookHost for SharedNotebook {
	fn cell_count(&self) -> usize {
		self.0.lock().cell_count()
	}

	fn cell(&self, index: CellIdx) -> Option<CellSnapshot> {
		self.0.lock().cell(index)
	}
}

type TestDispatcher = Dispatcher<SharedNotebook, mpsc::UnboundedSender<Delivery>>;

struct Harness {
	dispatcher: TestDispatcher,
	host: SharedNotebook,
	rx: mpsc::UnboundedReceiver<Delivery>,
}

impl Harness {
	fn attach(cells: usize, config: DispatchConfig) -> Self {
		let host = SharedNotebook::new(cells);
		let (tx, rx) = mpsc::unbounded_channel();
		let dispatcher = Dispatcher::attach(DocumentId::new("file:///demo.ipynb"), host.clone(), tx, config);
		Self { dispatcher, host, rx }
	}

	/// Attaches, lets the baseline go out, and waits for the debounce to be
	/// restored.
	async fn settled(cells: usize) -> Self {
		let mut harness = Self::attach(cells, DispatchConfig::default());
		elapse(1001).await;
		let baseline = harness.drain();
		assert_eq!(baseline.len(), 1);
		assert!(baseline[0].baseline);
		harness
	}

	fn record(&self, script: &str) {
		for event in nbwatch_collator::parse_script(script).unwrap() {
			self.dispatcher.record(event).unwrap();
		}
	}

	fn drain(&mut self) -> Vec<Delivery> {
		let mut out = Vec::new();
		while let Ok(delivery) = self.rx.try_recv() {
			out.push(delivery);
		}
		out
	}
}

async fn elapse(ms: u64) {
	tokio::time::sleep(Duration::from_millis(ms)).await;
}

fn indices(cells: &[CellSnapshot]) -> Vec<CellIdx> {
	cells.iter().map(|cell| cell.index).collect()
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn baseline_follows_attach() {
	let mut harness = Harness::attach(3, DispatchConfig::default());
	assert_eq!(harness.dispatcher.phase(), DispatchPhase::Accumulating);

	elapse(149).await;
	assert!(harness.drain().is_empty());

	elapse(2).await;
	let deliveries = harness.drain();
	assert_eq!(deliveries.len(), 1);
	let baseline = &deliveries[0];
	assert!(baseline.baseline);
	assert_eq!(baseline.diff, Diff::full(3));
	assert_eq!(indices(&baseline.changed), vec![0, 1, 2]);
	assert_eq!(baseline.changed[2].source, "cell_2()");
	assert_eq!(harness.dispatcher.phase(), DispatchPhase::Idle);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn burst_coalesces_into_one_delivery() {
	let mut harness = Harness::settled(4).await;
	assert_eq!(harness.dispatcher.current_delay(), Duration::from_millis(500));

	harness.record("ch_0_o_1");
	elapse(300).await;
	harness.record("ch_3_o");
	elapse(300).await;
	assert!(harness.drain().is_empty());
	assert_eq!(harness.dispatcher.phase(), DispatchPhase::Accumulating);

	elapse(250).await;
	let deliveries = harness.drain();
	assert_eq!(deliveries.len(), 1);
	assert!(!deliveries[0].baseline);
	assert_eq!(deliveries[0].diff.changed, vec![0, 3]);
	assert_eq!(indices(&deliveries[0].changed), vec![0, 3]);
	assert_eq!(harness.dispatcher.phase(), DispatchPhase::Idle);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn pending_execution_polls_until_complete() {
	let mut harness = Harness::settled(3).await;
	harness.record("ch_2_x_1 ch_0_o");

	elapse(600).await;
	assert!(harness.drain().is_empty());
	assert!(harness.dispatcher.has_pending());
	assert_eq!(harness.dispatcher.phase(), DispatchPhase::Accumulating);

	// Complete the execution without re-arming, so only the poll can flush.
	harness.dispatcher.shared.state.lock().collator.record_cell_metadata_change(2, Some(1));
	elapse(250).await;

	let deliveries = harness.drain();
	assert_eq!(deliveries.len(), 1);
	assert_eq!(deliveries[0].diff.changed, vec![0, 2]);
	assert!(!harness.dispatcher.has_pending());
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn abandoned_execution_in_blank_cell_is_reclaimed() {
	let mut harness = Harness::settled(3).await;
	harness.host.edit(|notebook| {
		if let Some(cell) = notebook.cell_mut(1) {
			cell.source.clear();
		}
	});
	harness.record("ch_1_x_7 ch_0_d");

	elapse(501).await;
	let deliveries = harness.drain();
	assert_eq!(deliveries.len(), 1);
	assert_eq!(deliveries[0].diff.changed, vec![0]);
	assert!(harness.dispatcher.snapshot().live.is_empty());
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn one_shot_delay_applies_until_restored() {
	let mut harness = Harness::attach(2, DispatchConfig::default());
	assert_eq!(harness.dispatcher.current_delay(), Duration::from_millis(150));
	elapse(1001).await;
	assert_eq!(harness.dispatcher.current_delay(), Duration::from_millis(500));
	harness.drain();

	harness.dispatcher.request_state();
	assert_eq!(harness.dispatcher.current_delay(), Duration::from_millis(150));
	elapse(151).await;
	let deliveries = harness.drain();
	assert_eq!(deliveries.len(), 1);
	assert!(deliveries[0].baseline);

	// A second request pushes the restore deadline out.
	elapse(500).await;
	harness.dispatcher.request_state();
	elapse(600).await;
	assert_eq!(harness.dispatcher.current_delay(), Duration::from_millis(150));
	elapse(401).await;
	assert_eq!(harness.dispatcher.current_delay(), Duration::from_millis(500));
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn reset_cancels_timers_and_state() {
	let mut harness = Harness::settled(3).await;
	harness.record("ch_0_o ch_1_x_4");
	harness.dispatcher.reset();

	assert_eq!(harness.dispatcher.phase(), DispatchPhase::Idle);
	assert!(!harness.dispatcher.has_pending());
	elapse(2000).await;
	assert!(harness.drain().is_empty());

	harness.record("ch_2_o");
	elapse(501).await;
	assert_eq!(harness.drain()[0].diff.changed, vec![2]);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn closed_dispatcher_never_fires() {
	let mut harness = Harness::attach(2, DispatchConfig::default());
	harness.dispatcher.close();
	assert!(harness.dispatcher.is_closed());

	harness.record("ch_0_o");
	harness.dispatcher.request_state();
	elapse(5000).await;
	assert!(harness.drain().is_empty());
	assert_eq!(harness.dispatcher.flush_now(), FlushOutcome::Closed);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn watch_off_buffers_and_overflow_forces_baseline() {
	let config = DispatchConfig {
		watch: false,
		..DispatchConfig::default()
	};
	let mut harness = Harness::attach(8, config);
	elapse(200).await;
	assert!(harness.drain().is_empty());
	assert_eq!(harness.dispatcher.buffered_len(), 1);
	assert!(harness.dispatcher.take_buffered()[0].baseline);

	for cell in 0..3 {
		harness.record(&format!("ch_{cell}_o"));
		assert_eq!(harness.dispatcher.flush_now(), FlushOutcome::Buffered(1));
	}
	assert_eq!(harness.dispatcher.buffered_len(), 3);

	harness.record("ch_3_o");
	harness.dispatcher.flush_now();
	assert_eq!(harness.dispatcher.buffered_len(), 0);

	harness.record("ch_4_o");
	harness.dispatcher.flush_now();
	let buffered = harness.dispatcher.take_buffered();
	assert_eq!(buffered.len(), 1);
	assert!(buffered[0].baseline);

	harness.dispatcher.set_watch(true);
	harness.record("ch_5_o");
	assert_eq!(harness.dispatcher.flush_now(), FlushOutcome::Delivered(1));
	assert_eq!(harness.drain()[0].diff.changed, vec![5]);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn buffer_overflow_schedules_baseline_without_further_events() {
	let config = DispatchConfig {
		watch: false,
		..DispatchConfig::default()
	};
	let harness = Harness::attach(4, config);
	elapse(200).await;
	assert_eq!(harness.dispatcher.take_buffered().len(), 1);

	for cell in 0..3 {
		harness.record(&format!("ch_{cell}_o"));
		harness.dispatcher.flush_now();
	}
	assert_eq!(harness.dispatcher.buffered_len(), 0);
	assert_eq!(harness.dispatcher.phase(), DispatchPhase::Accumulating);

	elapse(151).await;
	let buffered = harness.dispatcher.take_buffered();
	assert_eq!(buffered.len(), 1);
	assert!(buffered[0].baseline);
	assert_eq!(buffered[0].cell_count, 4);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn structural_changes_materialize_from_host() {
	let mut harness = Harness::settled(3).await;

	harness.host.edit(|notebook| notebook.insert(1, vec![CellSnapshot::code(0, "inserted()")]));
	harness.record("cn_a_1");
	assert_eq!(harness.dispatcher.flush_now(), FlushOutcome::Delivered(1));
	let added = harness.drain().remove(0);
	assert_eq!(added.cell_count, 4);
	assert_eq!(indices(&added.added), vec![1]);
	assert_eq!(added.added[0].source, "inserted()");

	harness.host.edit(|notebook| notebook.remove(0, 2));
	harness.record("cn_r_0,2");
	harness.dispatcher.flush_now();
	let removed = harness.drain().remove(0);
	assert_eq!(removed.removed, vec![0, 1]);
	assert_eq!(removed.cell_count, 2);
	assert!(removed.changed.is_empty());
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn unresolved_cells_are_skipped() {
	let mut harness = Harness::settled(2).await;
	harness.record("ch_7_o ch_1_o");
	harness.dispatcher.flush_now();
	let delivery = harness.drain().remove(0);
	assert_eq!(delivery.diff.changed, vec![7, 1]);
	assert_eq!(indices(&delivery.changed), vec![1]);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn notebook_metadata_rides_on_next_delivery() {
	let mut harness = Harness::settled(2).await;
	assert!(harness.dispatcher.ingest_value(&json!({"kind": "notebook_metadata", "metadata": {"kernelspec": {"name": "python3"}}})));
	assert!(!harness.dispatcher.ingest_value(&json!(null)));

	assert_eq!(harness.dispatcher.flush_now(), FlushOutcome::Delivered(1));
	let delivery = harness.drain().remove(0);
	assert!(delivery.diff.is_empty());
	assert_eq!(delivery.cell_count, 2);
	assert_eq!(delivery.notebook_metadata, Some(json!({"kernelspec": {"name": "python3"}})));
	assert_eq!(harness.dispatcher.flush_now(), FlushOutcome::Nothing);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn batch_drift_flushes_settled_edits() {
	let mut harness = Harness::settled(2).await;
	harness.host.edit(|notebook| notebook.insert(2, vec![CellSnapshot::code(0, "x = 1")]));

	let events = nbwatch_collator::parse_script("ch_0_d").unwrap();
	assert_eq!(harness.dispatcher.ingest_batch(events), 1);
	assert_eq!(harness.dispatcher.snapshot().queued_diffs.len(), 1);

	elapse(501).await;
	assert_eq!(harness.drain()[0].diff.changed, vec![0]);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn focus_change_promotes_typing() {
	let mut harness = Harness::settled(3).await;
	harness.record("ch_1_d ch_1_d ch_1_d");
	harness.dispatcher.set_document_changes([1]);
	elapse(501).await;
	let deliveries = harness.drain();
	assert_eq!(deliveries.len(), 1);
	assert_eq!(deliveries[0].diff.changed, vec![1]);
}

struct CallbackConsumer {
	dispatcher: Arc<OnceLock<Dispatcher<SharedNotebook, CallbackConsumer>>>,
	pending_seen: Arc<Mutex<Vec<bool>>>,
}

impl DiffConsumer for CallbackConsumer {
	fn deliver(&self, _delivery: Delivery) {
		if let Some(dispatcher) = self.dispatcher.get() {
			self.pending_seen.lock().push(dispatcher.has_pending());
			dispatcher.set_watch(true);
		}
	}
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn consumer_may_call_back_into_dispatcher() {
	let slot = Arc::new(OnceLock::new());
	let pending_seen = Arc::new(Mutex::new(Vec::new()));
	let consumer = CallbackConsumer {
		dispatcher: Arc::clone(&slot),
		pending_seen: Arc::clone(&pending_seen),
	};
	let dispatcher = Dispatcher::attach(DocumentId::new("file:///cb.ipynb"), SharedNotebook::new(2), consumer, DispatchConfig::default());
	assert!(slot.set(dispatcher.clone()).is_ok());

	elapse(200).await;
	dispatcher.record(CellEvent::outputs(0, 0)).unwrap();
	assert_eq!(dispatcher.flush_now(), FlushOutcome::Delivered(1));
	assert_eq!(*pending_seen.lock(), vec![false, false]);
	dispatcher.close();
}
