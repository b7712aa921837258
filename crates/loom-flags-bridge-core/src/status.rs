// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Initialization status of a flags session.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Describes how initialization completed (or recovered).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InitStatus {
	/// Running from statically supplied flag values. No remote client.
	Local,
	/// The remote client finished its handshake and flags are live.
	Initialized,
	/// The remote handshake failed or timed out. Flags come from bootstrap
	/// values (or nothing) until the client recovers.
	Failed,
}

impl InitStatus {
	/// Returns true for `Local` and `Initialized`.
	pub fn is_success(self) -> bool {
		matches!(self, Self::Local | Self::Initialized)
	}

	pub fn as_str(self) -> &'static str {
		match self {
			Self::Local => "local",
			Self::Initialized => "initialized",
			Self::Failed => "failed",
		}
	}
}

impl fmt::Display for InitStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}
