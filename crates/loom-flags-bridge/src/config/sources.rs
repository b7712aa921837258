// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources: defaults, a TOML file and `LOOM_FLAGS_*` variables.

use std::path::{Path, PathBuf};

use loom_flags_bridge_core::{FlagSet, StreamingFlags, UserContext};
use serde::de::DeserializeOwned;
use tracing::{debug, trace};

use super::layer::FlagsConfigLayer;
use crate::error::ConfigError;
use crate::options::{Bootstrap, BootstrapSource, Mode};

/// Where the bridge reads its configuration from.
///
/// Later variants override earlier ones: defaults, then the TOML file, then
/// `LOOM_FLAGS_*` variables.
pub enum FlagsConfigSource {
	/// Local mode with `sendEventsOnlyForVariation` on.
	Defaults,
	/// A TOML file with the same camelCase keys as [`InitializeOptions`].
	/// A missing file contributes nothing.
	///
	/// [`InitializeOptions`]: crate::InitializeOptions
	File(PathBuf),
	Environment(EnvSource),
}

impl FlagsConfigSource {
	pub const SYSTEM_FILE: &'static str = "/etc/loom/flags.toml";

	pub fn file(path: impl Into<PathBuf>) -> Self {
		Self::File(path.into())
	}

	pub fn system_file() -> Self {
		Self::file(Self::SYSTEM_FILE)
	}

	pub fn environment() -> Self {
		Self::Environment(EnvSource::new())
	}

	pub fn label(&self) -> &'static str {
		match self {
			Self::Defaults => "defaults",
			Self::File(_) => "toml-config",
			Self::Environment(_) => "environment",
		}
	}

	/// Merge order; higher ranks override lower ones.
	pub(crate) fn rank(&self) -> u8 {
		match self {
			Self::Defaults => 0,
			Self::File(_) => 1,
			Self::Environment(_) => 2,
		}
	}

	pub fn layer(&self) -> Result<FlagsConfigLayer, ConfigError> {
		match self {
			Self::Defaults => Ok(FlagsConfigLayer {
				mode: Some(Mode::Local.to_string()),
				send_events_only_for_variation: Some(true),
				..Default::default()
			}),
			Self::File(path) => read_flags_file(path),
			Self::Environment(env) => env.layer(),
		}
	}
}

fn read_flags_file(path: &Path) -> Result<FlagsConfigLayer, ConfigError> {
	let content = match std::fs::read_to_string(path) {
		Ok(content) => content,
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
			debug!(path = %path.display(), "flags config file not found, skipping");
			return Ok(FlagsConfigLayer::default());
		}
		Err(e) => {
			return Err(ConfigError::FileRead {
				path: path.to_path_buf(),
				source: e,
			})
		}
	};

	let layer = toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
		path: path.to_path_buf(),
		source: e,
	})?;
	trace!(path = %path.display(), "parsed flags config file");
	Ok(layer)
}

type EnvLookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Environment variable source.
///
/// Convention: `LOOM_FLAGS_<FIELD>`. Structured values (`LOOM_FLAGS_STREAMING`,
/// `LOOM_FLAGS_BOOTSTRAP`, `LOOM_FLAGS_LOCAL_FLAGS`, `LOOM_FLAGS_CLIENT_OPTIONS`)
/// are written as JSON.
pub struct EnvSource {
	lookup: EnvLookup,
}

impl EnvSource {
	/// Reads from the process environment.
	pub fn new() -> Self {
		Self::from_lookup(|name| std::env::var(name).ok())
	}

	/// Reads through `lookup` instead of the process environment.
	pub fn from_lookup(lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static) -> Self {
		Self {
			lookup: Box::new(lookup),
		}
	}

	fn var(&self, name: &str) -> Option<String> {
		(self.lookup)(name).filter(|s| !s.is_empty())
	}

	fn boolean(&self, name: &str) -> Option<bool> {
		self.var(name)
			.map(|v| v.eq_ignore_ascii_case("true") || v == "1")
	}

	fn number(&self, name: &str) -> Result<Option<f64>, ConfigError> {
		match self.var(name) {
			Some(v) => v
				.parse()
				.map(Some)
				.map_err(|_| ConfigError::invalid_value(name, format!("invalid number '{v}'"))),
			None => Ok(None),
		}
	}

	fn json<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, ConfigError> {
		match self.var(name) {
			Some(v) => serde_json::from_str(&v)
				.map(Some)
				.map_err(|e| ConfigError::invalid_value(name, format!("invalid JSON: {e}"))),
			None => Ok(None),
		}
	}

	fn streaming(&self) -> Result<Option<StreamingFlags>, ConfigError> {
		const NAME: &str = "LOOM_FLAGS_STREAMING";
		match self.var(NAME) {
			Some(v) if v.eq_ignore_ascii_case("true") || v == "1" => Ok(Some(StreamingFlags::all())),
			Some(v) if v.eq_ignore_ascii_case("false") || v == "0" => Ok(Some(StreamingFlags::none())),
			Some(_) => self.json(NAME),
			None => Ok(None),
		}
	}

	fn bootstrap(&self) -> Result<Option<Bootstrap>, ConfigError> {
		const NAME: &str = "LOOM_FLAGS_BOOTSTRAP";
		match self.var(NAME) {
			Some(v) if v == "localFlags" => Ok(Some(Bootstrap::Source(BootstrapSource::LocalFlags))),
			Some(_) => Ok(self.json::<FlagSet>(NAME)?.map(Bootstrap::Flags)),
			None => Ok(None),
		}
	}
}

impl Default for EnvSource {
	fn default() -> Self {
		Self::new()
	}
}

impl EnvSource {
	fn layer(&self) -> Result<FlagsConfigLayer, ConfigError> {
		Ok(FlagsConfigLayer {
			client_side_id: self.var("LOOM_FLAGS_CLIENT_SIDE_ID"),
			user: self.var("LOOM_FLAGS_USER_KEY").map(UserContext::new),
			mode: self.var("LOOM_FLAGS_MODE"),
			local_flags: self.json("LOOM_FLAGS_LOCAL_FLAGS")?,
			streaming_flags: self.streaming()?,
			bootstrap: self.bootstrap()?,
			send_events_only_for_variation: self.boolean("LOOM_FLAGS_SEND_EVENTS_ONLY_FOR_VARIATION"),
			timeout: self.number("LOOM_FLAGS_TIMEOUT_SECS")?,
			client_options: self.json("LOOM_FLAGS_CLIENT_OPTIONS")?,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;
	use std::collections::HashMap;
	use std::io::Write;
	use tempfile::NamedTempFile;

	fn env(vars: &[(&str, &str)]) -> FlagsConfigSource {
		let vars: HashMap<String, String> = vars
			.iter()
			.map(|(k, v)| (k.to_string(), v.to_string()))
			.collect();
		FlagsConfigSource::Environment(EnvSource::from_lookup(move |name| vars.get(name).cloned()))
	}

	#[test]
	fn environment_outranks_file_outranks_defaults() {
		assert!(FlagsConfigSource::Defaults.rank() < FlagsConfigSource::system_file().rank());
		assert!(FlagsConfigSource::system_file().rank() < env(&[]).rank());
	}

	#[test]
	fn defaults_select_local_mode() {
		let layer = FlagsConfigSource::Defaults.layer().unwrap();
		assert_eq!(layer.mode.as_deref(), Some("local"));
		assert_eq!(layer.send_events_only_for_variation, Some(true));
	}

	#[test]
	fn unreadable_path_is_a_read_error() {
		let dir = tempfile::tempdir().unwrap();
		let err = FlagsConfigSource::file(dir.path()).layer().unwrap_err();
		assert!(matches!(err, ConfigError::FileRead { .. }));
	}

	#[test]
	fn missing_toml_file_is_empty_layer() {
		let layer = FlagsConfigSource::file("/nonexistent/flags.toml").layer().unwrap();
		assert_eq!(layer, FlagsConfigLayer::default());
	}

	#[test]
	fn toml_file_parses_camel_case_keys() {
		let mut file = NamedTempFile::new().unwrap();
		writeln!(
			file,
			r#"
clientSideId = "abc123"
mode = "remote"
timeout = 2.5
bootstrap = "localFlags"
streamingFlags = {{ allExcept = ["checkout.legacy"] }}

[user]
key = "user123"
plan = "enterprise"

[localFlags]
"checkout.new_flow" = false
"#
		)
		.unwrap();

		let layer = FlagsConfigSource::file(file.path()).layer().unwrap();

		assert_eq!(layer.client_side_id.as_deref(), Some("abc123"));
		assert_eq!(layer.mode.as_deref(), Some("remote"));
		assert_eq!(layer.timeout, Some(2.5));
		assert_eq!(layer.bootstrap, Some(Bootstrap::local_flags()));
		assert_eq!(
			layer.streaming_flags,
			Some(StreamingFlags::all_except(["checkout.legacy"]))
		);
		let user = layer.user.unwrap();
		assert_eq!(user.key(), Some("user123"));
		assert_eq!(user.attributes.get("plan"), Some(&json!("enterprise")));
		assert_eq!(
			layer.local_flags.unwrap().get("checkout.new_flow"),
			Some(&json!(false))
		);
	}

	#[test]
	fn invalid_toml_reports_path() {
		let mut file = NamedTempFile::new().unwrap();
		writeln!(file, "mode = [").unwrap();

		let err = FlagsConfigSource::file(file.path()).layer().unwrap_err();
		assert!(matches!(err, ConfigError::TomlParse { .. }));
	}

	#[test]
	fn empty_environment_contributes_nothing() {
		let layer = env(&[]).layer().unwrap();
		assert_eq!(layer, FlagsConfigLayer::default());
	}

	#[test]
	fn environment_fields() {
		let layer = env(&[
			("LOOM_FLAGS_CLIENT_SIDE_ID", "abc123"),
			("LOOM_FLAGS_MODE", "remote"),
			("LOOM_FLAGS_TIMEOUT_SECS", "1.5"),
			("LOOM_FLAGS_STREAMING", "true"),
			("LOOM_FLAGS_BOOTSTRAP", "localFlags"),
			("LOOM_FLAGS_SEND_EVENTS_ONLY_FOR_VARIATION", "false"),
			("LOOM_FLAGS_USER_KEY", "user123"),
			("LOOM_FLAGS_LOCAL_FLAGS", r#"{"foo": true}"#),
		])
		.layer()
		.unwrap();

		assert_eq!(layer.client_side_id.as_deref(), Some("abc123"));
		assert_eq!(layer.mode.as_deref(), Some("remote"));
		assert_eq!(layer.timeout, Some(1.5));
		assert_eq!(layer.streaming_flags, Some(StreamingFlags::all()));
		assert_eq!(layer.bootstrap, Some(Bootstrap::local_flags()));
		assert_eq!(layer.send_events_only_for_variation, Some(false));
		assert_eq!(layer.user, Some(UserContext::new("user123")));
		assert_eq!(layer.local_flags.unwrap().get("foo"), Some(&json!(true)));
	}

	#[test]
	fn streaming_policy_from_json() {
		let layer = env(&[("LOOM_FLAGS_STREAMING", r#"{"allExcept": ["a", "b"]}"#)])
			.layer()
			.unwrap();
		assert_eq!(layer.streaming_flags, Some(StreamingFlags::all_except(["a", "b"])));
	}

	#[test]
	fn literal_bootstrap_from_json() {
		let layer = env(&[("LOOM_FLAGS_BOOTSTRAP", r#"{"foo": "bar"}"#)])
			.layer()
			.unwrap();
		let expected: FlagSet = [("foo".to_string(), json!("bar"))].into_iter().collect();
		assert_eq!(layer.bootstrap, Some(Bootstrap::Flags(expected)));
	}

	#[test]
	fn invalid_timeout_rejected() {
		let err = env(&[("LOOM_FLAGS_TIMEOUT_SECS", "soon")]).layer().unwrap_err();
		assert!(err.to_string().contains("LOOM_FLAGS_TIMEOUT_SECS"));
	}

	#[test]
	fn invalid_streaming_json_rejected() {
		let err = env(&[("LOOM_FLAGS_STREAMING", "{not json")]).layer().unwrap_err();
		assert!(matches!(err, ConfigError::InvalidValue { .. }));
	}
}
