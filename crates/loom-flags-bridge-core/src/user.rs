// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The identity a flag client evaluates against.

use serde::{Deserialize, Serialize};

/// Key reported for sessions that run from static values.
pub const LOCAL_MODE_USER_KEY: &str = "local-mode-no-user-specified";

/// User (evaluation context) handed to the remote flag client.
///
/// Only `key` and `anonymous` are interpreted here; every other attribute is
/// carried through untouched for the vendor SDK's targeting rules.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserContext {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub key: Option<String>,
	#[serde(default, skip_serializing_if = "std::ops::Not::not")]
	pub anonymous: bool,
	#[serde(flatten)]
	pub attributes: serde_json::Map<String, serde_json::Value>,
}

impl UserContext {
	/// Creates a user identified by `key`.
	pub fn new(key: impl Into<String>) -> Self {
		Self {
			key: Some(key.into()),
			..Default::default()
		}
	}

	/// Creates an anonymous user with no key.
	pub fn anonymous() -> Self {
		Self {
			anonymous: true,
			..Default::default()
		}
	}

	/// The sentinel identity reported by local sessions.
	pub fn local_mode() -> Self {
		Self::new(LOCAL_MODE_USER_KEY)
	}

	/// Adds a targeting attribute.
	pub fn with_attribute(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
		self.attributes.insert(name.into(), value);
		self
	}

	pub fn key(&self) -> Option<&str> {
		self.key.as_deref()
	}
}
