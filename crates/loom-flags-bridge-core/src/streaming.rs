// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Streaming inclusion policy.
//!
//! Decides which flags accept live updates from the remote client's change
//! feed. The policy is written in configuration either as a plain boolean or
//! as an object:
//!
//! ```toml
//! # stream everything except the listed flags
//! streamingFlags = { allExcept = ["checkout.legacy"] }
//!
//! # stream only the flags set to true
//! streamingFlags = { "ui.theme" = true, "search.v2" = true }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Policy key listing the flags excluded from streaming.
pub const ALL_EXCEPT_KEY: &str = "allExcept";

/// Which flags accept pushed updates.
///
/// The object form is kept as raw JSON so that hand-written configuration is
/// interpreted exactly as written, including malformed `allExcept` values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StreamingFlags {
	/// Stream every flag (`true`) or none (`false`).
	Toggle(bool),
	/// Either `{ allExcept: [...] }` or a per-key boolean map.
	Policy(Map<String, Value>),
}

impl StreamingFlags {
	pub fn all() -> Self {
		Self::Toggle(true)
	}

	pub fn none() -> Self {
		Self::Toggle(false)
	}

	/// Streams every flag except `keys`.
	pub fn all_except<I, S>(keys: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		let excluded = keys.into_iter().map(|k| Value::String(k.into())).collect();
		let mut policy = Map::new();
		policy.insert(ALL_EXCEPT_KEY.to_string(), Value::Array(excluded));
		Self::Policy(policy)
	}

	/// Streams only `keys`.
	pub fn only<I, S>(keys: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		Self::Policy(
			keys.into_iter()
				.map(|k| (k.into(), Value::Bool(true)))
				.collect(),
		)
	}
}

impl Default for StreamingFlags {
	fn default() -> Self {
		Self::none()
	}
}

impl From<bool> for StreamingFlags {
	fn from(enabled: bool) -> Self {
		Self::Toggle(enabled)
	}
}

/// Returns true if a pushed update for `key` should be applied.
///
/// Rules, first match wins:
/// 1. `true` includes everything.
/// 2. A non-null `allExcept` includes `key` iff it is an array not containing
///    `key`. Any other `allExcept` value excludes everything.
/// 3. A per-key entry includes `key` only when it is the boolean `true`.
/// 4. Everything else excludes.
pub fn should_update_flag(key: &str, config: &StreamingFlags) -> bool {
	let policy = match config {
		StreamingFlags::Toggle(enabled) => return *enabled,
		StreamingFlags::Policy(policy) => policy,
	};

	match policy.get(ALL_EXCEPT_KEY) {
		None | Some(Value::Null) => {}
		Some(Value::Array(excluded)) => {
			return !excluded.iter().any(|k| k.as_str() == Some(key));
		}
		Some(_) => return false,
	}

	matches!(policy.get(key), Some(Value::Bool(true)))
}
