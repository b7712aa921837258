// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Initialization status tracking for a session.

use loom_flags_bridge_core::{ClientError, InitStatus};
use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::debug;

use crate::options::StatusChangeCallback;

/// Holds a session's [`InitStatus`] and the error behind the last failure.
///
/// Transitions to the current status are ignored. Real transitions update the
/// stored error, publish the new status to watchers and invoke the
/// status-change callback with `(new, previous)`.
pub struct StatusTracker {
	state: RwLock<StatusState>,
	sender: watch::Sender<InitStatus>,
	on_change: Option<StatusChangeCallback>,
}

struct StatusState {
	status: InitStatus,
	error: Option<ClientError>,
}

impl StatusTracker {
	pub fn new(
		status: InitStatus,
		error: Option<ClientError>,
		on_change: Option<StatusChangeCallback>,
	) -> Self {
		let (sender, _) = watch::channel(status);
		Self {
			state: RwLock::new(StatusState { status, error }),
			sender,
			on_change,
		}
	}

	pub fn status(&self) -> InitStatus {
		self.state.read().status
	}

	pub fn error(&self) -> Option<ClientError> {
		self.state.read().error.clone()
	}

	/// Moves to `new`. Returns false, leaving the error untouched, when the
	/// status is already `new`.
	pub fn transition(&self, new: InitStatus, error: Option<ClientError>) -> bool {
		let previous = {
			let mut state = self.state.write();
			if state.status == new {
				return false;
			}
			let previous = state.status;
			state.status = new;
			state.error = error;
			previous
		};

		debug!(status = %new, previous = %previous, "init status changed");
		self.sender.send_replace(new);

		// Called outside the lock so the callback may read the session.
		if let Some(on_change) = &self.on_change {
			on_change(new, previous);
		}
		true
	}

	pub fn watch(&self) -> watch::Receiver<InitStatus> {
		self.sender.subscribe()
	}
}

impl std::fmt::Debug for StatusTracker {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let state = self.state.read();
		f.debug_struct("StatusTracker")
			.field("status", &state.status)
			.field("error", &state.error)
			.finish()
	}
}
