//! Dispatcher timing configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Timing and delivery settings shared by every dispatcher in a registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchConfig {
	/// Trailing debounce after the last recorded event.
	pub debounce: Duration,
	/// Short delay substituted after an on-demand state request.
	pub one_shot: Duration,
	/// How long the one-shot delay stays in effect.
	pub restore_after: Duration,
	/// Re-check interval while an execution is in flight.
	pub poll_interval: Duration,
	/// Deliver directly; when off, deliveries are buffered.
	pub watch: bool,
}

impl Default for DispatchConfig {
	fn default() -> Self {
		Self {
			debounce: Duration::from_millis(500),
			one_shot: Duration::from_millis(150),
			restore_after: Duration::from_millis(1000),
			poll_interval: Duration::from_millis(200),
			watch: true,
		}
	}
}

/// Errors that can occur when loading a [`DispatchConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error parsing TOML syntax or an unknown key.
	#[error("TOML parse error: {0}")]
	Toml(#[from] toml::de::Error),

	/// Error reading a configuration file.
	#[error("I/O error reading {path}: {error}")]
	Io {
		/// Path to the file that failed to read.
		path: PathBuf,
		/// The underlying I/O error.
		error: std::io::Error,
	},

	/// A delay that must be positive was zero.
	#[error("{key} must be greater than zero")]
	ZeroDuration {
		/// The offending TOML key.
		key: &'static str,
	},
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawConfig {
	debounce_ms: u64,
	one_shot_ms: u64,
	restore_after_ms: u64,
	poll_interval_ms: u64,
	watch: bool,
}

impl Default for RawConfig {
	fn default() -> Self {
		let defaults = DispatchConfig::default();
		Self {
			debounce_ms: millis(defaults.debounce),
			one_shot_ms: millis(defaults.one_shot),
			restore_after_ms: millis(defaults.restore_after),
			poll_interval_ms: millis(defaults.poll_interval),
			watch: defaults.watch,
		}
	}
}

fn millis(duration: Duration) -> u64 {
	u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl DispatchConfig {
	/// Parses a TOML document. Missing keys keep their defaults.
	///
	/// ```toml
	/// debounce_ms = 400
	/// one_shot_ms = 100
	/// watch = false
	/// ```
	pub fn from_toml(source: &str) -> Result<Self, ConfigError> {
		let raw: RawConfig = toml::from_str(source)?;
		let config = Self {
			debounce: Duration::from_millis(raw.debounce_ms),
			one_shot: Duration::from_millis(raw.one_shot_ms),
			restore_after: Duration::from_millis(raw.restore_after_ms),
			poll_interval: Duration::from_millis(raw.poll_interval_ms),
			watch: raw.watch,
		};
		config.validate()?;
		Ok(config)
	}

	/// Reads and parses a TOML file.
	pub fn load(path: &Path) -> Result<Self, ConfigError> {
		let source = std::fs::read_to_string(path).map_err(|error| ConfigError::Io {
			path: path.to_path_buf(),
			error,
		})?;
		Self::from_toml(&source)
	}

	/// Rejects delays that would make the dispatcher spin.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.debounce.is_zero() {
			return Err(ConfigError::ZeroDuration { key: "debounce_ms" });
		}
		if self.poll_interval.is_zero() {
			return Err(ConfigError::ZeroDuration { key: "poll_interval_ms" });
		}
		Ok(())
	}
}
