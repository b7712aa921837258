// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Registry-level flag operations for application code.

use loom_flags_bridge_core::{FlagValue, UserContext};
use tracing::warn;

use crate::error::FlagsError;
use crate::registry::SessionRegistry;

/// Outcome of [`identify`].
#[derive(Debug)]
pub struct IdentifyResult {
	pub is_ok: bool,
	pub error: Option<FlagsError>,
}

impl IdentifyResult {
	pub fn ok() -> Self {
		Self {
			is_ok: true,
			error: None,
		}
	}

	pub fn failure(error: FlagsError) -> Self {
		Self {
			is_ok: false,
			error: Some(error),
		}
	}
}

/// Re-identifies the current session's user.
///
/// Local sessions succeed without doing anything. Remote sessions replace
/// every flag with the client's evaluation for `user`; if the client fails,
/// the flags are left as they were and the error is returned in the result.
pub async fn identify(
	registry: &SessionRegistry,
	user: UserContext,
	hash: Option<String>,
) -> IdentifyResult {
	let Some(session) = registry.current() else {
		return IdentifyResult::failure(FlagsError::not_initialized("identify"));
	};

	match session.identify(user, hash).await {
		Ok(()) => IdentifyResult::ok(),
		Err(error) => {
			warn!(error = %error, "identify failed; flags left unchanged");
			IdentifyResult::failure(error)
		}
	}
}

/// Reads a flag from the current session.
///
/// Remote sessions also report the evaluation to the client. Before any
/// session exists this logs a warning and returns `default`.
pub fn variation(
	registry: &SessionRegistry,
	key: &str,
	default: Option<FlagValue>,
) -> Option<FlagValue> {
	match registry.current() {
		Some(session) => session.variation(key, default),
		None => {
			warn!(key = %key, "flags bridge has not been initialized; returning default value");
			default
		}
	}
}
