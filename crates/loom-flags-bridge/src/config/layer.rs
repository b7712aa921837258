// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Partial configuration produced by each source.

use std::time::Duration;

use loom_flags_bridge_core::{FlagSet, StreamingFlags, UserContext};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::FlagsConfig;
use crate::error::ConfigError;
use crate::options::{Bootstrap, InitializeOptions, Mode, DEFAULT_TIMEOUT};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagsConfigLayer {
	pub client_side_id: Option<String>,
	pub user: Option<UserContext>,
	pub mode: Option<String>,
	pub local_flags: Option<FlagSet>,
	pub streaming_flags: Option<StreamingFlags>,
	pub bootstrap: Option<Bootstrap>,
	pub send_events_only_for_variation: Option<bool>,
	/// Handshake timeout in seconds.
	pub timeout: Option<f64>,
	pub client_options: Option<Map<String, Value>>,
}

impl FlagsConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.client_side_id.is_some() {
			self.client_side_id = other.client_side_id;
		}
		if let Some(user) = other.user {
			match &mut self.user {
				// An environment-supplied key should not erase file-supplied attributes.
				Some(existing) => {
					if user.key.is_some() {
						existing.key = user.key;
					}
					existing.anonymous |= user.anonymous;
					existing.attributes.extend(user.attributes);
				}
				None => self.user = Some(user),
			}
		}
		if other.mode.is_some() {
			self.mode = other.mode;
		}
		if other.local_flags.is_some() {
			self.local_flags = other.local_flags;
		}
		if other.streaming_flags.is_some() {
			self.streaming_flags = other.streaming_flags;
		}
		if other.bootstrap.is_some() {
			self.bootstrap = other.bootstrap;
		}
		if other.send_events_only_for_variation.is_some() {
			self.send_events_only_for_variation = other.send_events_only_for_variation;
		}
		if other.timeout.is_some() {
			self.timeout = other.timeout;
		}
		if let Some(client_options) = other.client_options {
			self.client_options
				.get_or_insert_with(Map::new)
				.extend(client_options);
		}
	}

	pub fn finalize(self) -> Result<FlagsConfig, ConfigError> {
		let timeout = match self.timeout {
			Some(secs) => Duration::try_from_secs_f64(secs)
				.map_err(|e| ConfigError::invalid_value("timeout", e.to_string()))?,
			None => DEFAULT_TIMEOUT,
		};

		let mode = Mode::resolve(self.mode.as_deref());
		let client_side_id = self.client_side_id.unwrap_or_default();
		if mode == Mode::Remote && client_side_id.trim().is_empty() {
			return Err(ConfigError::invalid_value(
				"clientSideId",
				"a client-side id is required when mode is \"remote\"",
			));
		}

		let user = match (self.user, mode) {
			(Some(user), _) => user,
			(None, Mode::Local) => UserContext::local_mode(),
			(None, Mode::Remote) => UserContext::anonymous(),
		};

		let options = InitializeOptions {
			mode: self.mode,
			local_flags: self.local_flags.unwrap_or_default(),
			streaming_flags: self.streaming_flags.unwrap_or_default(),
			bootstrap: self.bootstrap,
			send_events_only_for_variation: self.send_events_only_for_variation.unwrap_or(true),
			timeout,
			client_options: self.client_options.unwrap_or_default(),
			..Default::default()
		};

		Ok(FlagsConfig {
			client_side_id,
			user,
			options,
		})
	}
}
