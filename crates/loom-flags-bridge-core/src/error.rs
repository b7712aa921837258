// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Errors surfaced by a remote flag client.

use std::time::Duration;

use thiserror::Error;

/// Errors reported by the remote flag client, either as the outcome of an
/// async call or through its `error` event.
///
/// The type is `Clone` because a single failure is stored on the session
/// (as the init error or last runtime error) and handed to callbacks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
	/// The initialization handshake did not finish in time.
	#[error("flag client did not initialize within {0:?}")]
	Timeout(Duration),

	/// The client could not reach the flag service.
	#[error("network error: {0}")]
	Network(String),

	/// The flag service rejected the client-side ID.
	#[error("invalid client-side ID: {0}")]
	InvalidClientId(String),

	/// The client was used after it had been closed.
	#[error("flag client has been closed")]
	Closed,

	/// Any other failure reported by the vendor SDK.
	#[error("{0}")]
	Other(String),
}

impl ClientError {
	/// Create a network error
	pub fn network(msg: impl Into<String>) -> Self {
		Self::Network(msg.into())
	}

	/// Create an opaque SDK error
	pub fn other(msg: impl Into<String>) -> Self {
		Self::Other(msg.into())
	}

	/// Returns true if this error is a handshake timeout.
	pub fn is_timeout(&self) -> bool {
		matches!(self, Self::Timeout(_))
	}
}
