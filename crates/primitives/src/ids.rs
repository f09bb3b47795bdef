use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Identity of a monitored notebook document, usually its URI.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(Arc<str>);

impl DocumentId {
	/// Creates a document id from any string-like identity.
	pub fn new(id: impl AsRef<str>) -> Self {
		Self(Arc::from(id.as_ref()))
	}

	/// Returns the id as a string slice.
	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for DocumentId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<&str> for DocumentId {
	fn from(value: &str) -> Self {
		Self::new(value)
	}
}

impl From<String> for DocumentId {
	fn from(value: String) -> Self {
		Self(Arc::from(value))
	}
}
