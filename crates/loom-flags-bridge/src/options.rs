// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Options accepted by [`Bootstrapper::initialize`](crate::Bootstrapper::initialize).
//!
//! Keys use camelCase so the same block can be shared with front-end
//! configuration:
//!
//! ```toml
//! mode = "remote"
//! timeout = 2.5
//! bootstrap = "localFlags"
//! streamingFlags = { allExcept = ["checkout.legacy"] }
//!
//! [localFlags]
//! "checkout.new_flow" = false
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use loom_flags_bridge_core::{ClientError, FlagSet, InitStatus, StreamingFlags};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::client::RemoteClientOptions;

/// Default bound on the remote handshake.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Invoked with `(new, previous)` whenever a session's status changes.
pub type StatusChangeCallback = Arc<dyn Fn(InitStatus, InitStatus) + Send + Sync>;

/// Invoked for every runtime error emitted by the remote client.
pub type ErrorCallback = Arc<dyn Fn(&ClientError) + Send + Sync>;

/// Where a session gets its flags from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
	/// Static values only, no network.
	#[default]
	Local,
	/// Backed by a remote flag client.
	Remote,
}

impl Mode {
	/// Parses a configured mode. Unknown values fall back to `Local` with a warning.
	pub fn resolve(raw: Option<&str>) -> Self {
		match raw {
			None | Some("local") => Mode::Local,
			Some("remote") => Mode::Remote,
			Some(other) => {
				warn!(
					mode = %other,
					"\"mode\" must be set to either \"local\" or \"remote\"; defaulting to \"local\""
				);
				Mode::Local
			}
		}
	}

	pub fn as_str(self) -> &'static str {
		match self {
			Mode::Local => "local",
			Mode::Remote => "remote",
		}
	}
}

impl fmt::Display for Mode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Named bootstrap sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BootstrapSource {
	/// Serve `localFlags` until the remote handshake completes.
	#[serde(rename = "localFlags")]
	LocalFlags,
}

/// Flag values the remote client serves before its first network round-trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Bootstrap {
	Source(BootstrapSource),
	/// A literal flag set passed through to the client.
	Flags(FlagSet),
}

impl Bootstrap {
	pub fn local_flags() -> Self {
		Self::Source(BootstrapSource::LocalFlags)
	}
}

/// Status and error callbacks wired into a session.
#[derive(Clone, Default)]
pub struct SessionCallbacks {
	pub on_status_change: Option<StatusChangeCallback>,
	pub on_error: Option<ErrorCallback>,
}

impl fmt::Debug for SessionCallbacks {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("SessionCallbacks")
			.field("on_status_change", &self.on_status_change.is_some())
			.field("on_error", &self.on_error.is_some())
			.finish()
	}
}

/// Options for initializing a flags session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InitializeOptions {
	/// `"local"` or `"remote"`. Kept as written so invalid values can be
	/// reported; see [`Mode::resolve`].
	#[serde(skip_serializing_if = "Option::is_none")]
	pub mode: Option<String>,
	/// Static values for local mode, or bootstrap values in remote mode.
	pub local_flags: FlagSet,
	/// Which flags accept live updates.
	pub streaming_flags: StreamingFlags,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub bootstrap: Option<Bootstrap>,
	pub send_events_only_for_variation: bool,
	/// Handshake timeout, written in seconds.
	#[serde(with = "duration_secs")]
	pub timeout: Duration,
	/// Vendor SDK options passed through to the remote client.
	pub client_options: Map<String, Value>,
	#[serde(skip)]
	pub callbacks: SessionCallbacks,
}

impl Default for InitializeOptions {
	fn default() -> Self {
		Self {
			mode: None,
			local_flags: FlagSet::new(),
			streaming_flags: StreamingFlags::default(),
			bootstrap: None,
			send_events_only_for_variation: true,
			timeout: DEFAULT_TIMEOUT,
			client_options: Map::new(),
			callbacks: SessionCallbacks::default(),
		}
	}
}

impl InitializeOptions {
	/// Local mode serving `flags`.
	pub fn local(flags: FlagSet) -> Self {
		Self {
			mode: Some(Mode::Local.as_str().to_string()),
			local_flags: flags,
			..Default::default()
		}
	}

	/// Remote mode with default settings.
	pub fn remote() -> Self {
		Self {
			mode: Some(Mode::Remote.as_str().to_string()),
			..Default::default()
		}
	}

	pub fn with_local_flags(mut self, flags: FlagSet) -> Self {
		self.local_flags = flags;
		self
	}

	pub fn with_streaming(mut self, streaming: impl Into<StreamingFlags>) -> Self {
		self.streaming_flags = streaming.into();
		self
	}

	pub fn with_bootstrap(mut self, bootstrap: Bootstrap) -> Self {
		self.bootstrap = Some(bootstrap);
		self
	}

	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.timeout = timeout;
		self
	}

	pub fn with_client_option(mut self, key: impl Into<String>, value: Value) -> Self {
		self.client_options.insert(key.into(), value);
		self
	}

	pub fn on_status_change(
		mut self,
		callback: impl Fn(InitStatus, InitStatus) + Send + Sync + 'static,
	) -> Self {
		self.callbacks.on_status_change = Some(Arc::new(callback));
		self
	}

	pub fn on_error(mut self, callback: impl Fn(&ClientError) + Send + Sync + 'static) -> Self {
		self.callbacks.on_error = Some(Arc::new(callback));
		self
	}

	pub fn resolved_mode(&self) -> Mode {
		Mode::resolve(self.mode.as_deref())
	}

	/// Resolves the bootstrap payload: `"localFlags"` becomes `local_flags`.
	pub fn resolved_bootstrap(&self) -> Option<FlagSet> {
		match &self.bootstrap {
			Some(Bootstrap::Source(BootstrapSource::LocalFlags)) => Some(self.local_flags.clone()),
			Some(Bootstrap::Flags(flags)) => Some(flags.clone()),
			None => None,
		}
	}

	/// Builds the options for the remote client: bridge defaults first, then
	/// caller-supplied settings on top.
	pub fn remote_client_options(&self) -> RemoteClientOptions {
		let mut options = RemoteClientOptions {
			send_events_only_for_variation: self.send_events_only_for_variation,
			bootstrap: self.resolved_bootstrap(),
			extra: self.client_options.clone(),
			..Default::default()
		};

		if let Some(name) = options.extra.remove("wrapperName").and_then(into_string) {
			options.wrapper_name = name;
		}
		if let Some(version) = options.extra.remove("wrapperVersion").and_then(into_string) {
			options.wrapper_version = version;
		}
		options
	}
}

fn into_string(value: Value) -> Option<String> {
	match value {
		Value::String(s) => Some(s),
		_ => None,
	}
}

mod duration_secs {
	use std::time::Duration;

	use serde::{de, Deserialize, Deserializer, Serializer};

	pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_f64(duration.as_secs_f64())
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
		let secs = f64::deserialize(deserializer)?;
		Duration::try_from_secs_f64(secs).map_err(de::Error::custom)
	}
}
