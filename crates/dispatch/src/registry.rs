//! Per-document session ownership.

use nbwatch_collator::NotebookHost;
use nbwatch_primitives::DocumentId;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::config::DispatchConfig;
use crate::consumer::DiffConsumer;
use crate::dispatcher::Dispatcher;

/// Owns one [`Dispatcher`] per monitored document.
///
/// Lookup is always by [`DocumentId`]; there is no notion of a current
/// document.
pub struct SessionRegistry<H, C> {
	config: DispatchConfig,
	sessions: FxHashMap<DocumentId, Dispatcher<H, C>>,
}

impl<H, C> SessionRegistry<H, C>
where
	H: NotebookHost + Send + Sync + 'static,
	C: DiffConsumer,
{
	/// Creates an empty registry whose dispatchers share `config`.
	pub fn new(config: DispatchConfig) -> Self {
		Self {
			config,
			sessions: FxHashMap::default(),
		}
	}

	/// Configuration handed to every new dispatcher.
	pub fn config(&self) -> &DispatchConfig {
		&self.config
	}

	/// Starts monitoring `document`, replacing and closing any previous
	/// session for it.
	pub fn attach(&mut self, document: DocumentId, host: H, consumer: C) -> Dispatcher<H, C> {
		if let Some(previous) = self.sessions.remove(&document) {
			debug!(document = %document, "dispatch.registry.replace");
			previous.close();
		}
		let dispatcher = Dispatcher::attach(document.clone(), host, consumer, self.config.clone());
		self.sessions.insert(document, dispatcher.clone());
		dispatcher
	}

	/// Dispatcher for `document`, if attached.
	pub fn get(&self, document: &DocumentId) -> Option<&Dispatcher<H, C>> {
		self.sessions.get(document)
	}

	/// Returns `true` if `document` is attached.
	pub fn contains(&self, document: &DocumentId) -> bool {
		self.sessions.contains_key(document)
	}

	/// Closes and forgets the session for `document`.
	pub fn close(&mut self, document: &DocumentId) -> bool {
		let Some(dispatcher) = self.sessions.remove(document) else {
			return false;
		};
		dispatcher.close();
		debug!(document = %document, remaining = self.sessions.len(), "dispatch.registry.close");
		true
	}

	/// Resets the session for `document`, e.g. after a kernel restart.
	pub fn reset(&self, document: &DocumentId) -> bool {
		let Some(dispatcher) = self.sessions.get(document) else {
			return false;
		};
		dispatcher.reset();
		true
	}

	/// Number of attached documents.
	pub fn len(&self) -> usize {
		self.sessions.len()
	}

	/// Returns `true` if no document is attached.
	pub fn is_empty(&self) -> bool {
		self.sessions.is_empty()
	}

	/// Attached documents, in no particular order.
	pub fn documents(&self) -> impl Iterator<Item = &DocumentId> {
		self.sessions.keys()
	}

	/// Closes every session.
	pub fn close_all(&mut self) {
		for (_, dispatcher) in self.sessions.drain() {
			dispatcher.close();
		}
	}
}
