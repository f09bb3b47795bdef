//! Delivery payloads and the consumer boundary.

use std::sync::Arc;

use nbwatch_primitives::{CellIdx, CellSnapshot, Diff, DocumentId};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

/// One materialized diff, ready for a consumer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Delivery {
	/// Document the diff belongs to.
	pub document: DocumentId,
	/// The raw index-level diff.
	pub diff: Diff,
	/// Current content of every changed cell the host could resolve.
	pub changed: Vec<CellSnapshot>,
	/// Current content of every added cell the host could resolve.
	pub added: Vec<CellSnapshot>,
	/// Removed indices, flattened from the diff's ranges.
	pub removed: Vec<CellIdx>,
	/// Cell count after the diff.
	pub cell_count: usize,
	/// Notebook-level metadata, when it changed since the last delivery.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub notebook_metadata: Option<Value>,
	/// Full-state delivery rather than an incremental one.
	pub baseline: bool,
}

/// Receives deliveries from a dispatcher.
///
/// Invoked from a timer task after the dispatcher lock is released, so an
/// implementation may call back into the dispatcher.
pub trait DiffConsumer: Send + Sync + 'static {
	/// Hands one delivery to the consumer.
	fn deliver(&self, delivery: Delivery);
}

impl<T: DiffConsumer + ?Sized> DiffConsumer for Arc<T> {
	fn deliver(&self, delivery: Delivery) {
		(**self).deliver(delivery);
	}
}

/// Forwards deliveries into a channel. A closed receiver drops them.
impl DiffConsumer for mpsc::UnboundedSender<Delivery> {
	fn deliver(&self, delivery: Delivery) {
		if self.send(delivery).is_err() {
			tracing::debug!("dispatch.consumer_closed");
		}
	}
}
