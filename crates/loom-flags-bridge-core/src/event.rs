// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Events pushed by the remote flag client.
//!
//! The vendor SDK delivers two kinds of events after initialization:
//!
//! - `change` - a changeset mapping each changed flag key to its previous and
//!   current value
//! - `error` - a runtime failure such as a dropped streaming connection

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{ClientError, FlagSet, FlagValue};

/// Previous and current value of one changed flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlagChange {
	#[serde(default)]
	pub current: Option<FlagValue>,
	#[serde(default)]
	pub previous: Option<FlagValue>,
}

impl FlagChange {
	pub fn new(current: Option<FlagValue>, previous: Option<FlagValue>) -> Self {
		Self { current, previous }
	}
}

/// A change notification keyed by flag key.
pub type FlagChangeset = BTreeMap<String, FlagChange>;

/// An event emitted by the remote flag client.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
	/// One or more flags changed.
	Change(FlagChangeset),
	/// The client hit a runtime error.
	Error(ClientError),
}

impl ClientEvent {
	/// Returns the event name used by the vendor SDK.
	pub fn event_type(&self) -> &'static str {
		match self {
			ClientEvent::Change(_) => "change",
			ClientEvent::Error(_) => "error",
		}
	}

	/// Builds a change event that moves every flag in `flags` to its new value.
	pub fn changed(flags: FlagSet) -> Self {
		ClientEvent::Change(
			flags
				.into_iter()
				.map(|(key, value)| (key, FlagChange::new(Some(value), None)))
				.collect(),
		)
	}
}
