// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Observable flag store.

use std::sync::Arc;

use loom_flags_bridge_core::{FlagSet, FlagValue};
use parking_lot::RwLock;
use tokio::sync::broadcast;

/// Capacity of the change broadcast channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// A mutation applied to a [`FlagStore`].
#[derive(Debug, Clone, PartialEq)]
pub enum FlagStoreEvent {
	/// A flag was written.
	Set { key: String, value: FlagValue },
	/// Every flag was removed ahead of a full replacement.
	Cleared,
}

/// Key/value store of flag states that notifies subscribers on every write.
///
/// Cloning the store yields another handle to the same flags.
#[derive(Clone)]
pub struct FlagStore {
	inner: Arc<FlagStoreInner>,
}

struct FlagStoreInner {
	flags: RwLock<FlagSet>,
	sender: broadcast::Sender<FlagStoreEvent>,
}

impl FlagStore {
	pub fn new() -> Self {
		let (sender, _) = broadcast::channel(DEFAULT_CHANNEL_CAPACITY);
		Self {
			inner: Arc::new(FlagStoreInner {
				flags: RwLock::new(FlagSet::new()),
				sender,
			}),
		}
	}

	/// Creates a store holding `flags`.
	pub fn with_flags(flags: &FlagSet) -> Self {
		let store = Self::new();
		store.update_flags(flags);
		store
	}

	/// Merges `flags` into the store. Keys not in `flags` are left untouched.
	pub fn update_flags(&self, flags: &FlagSet) {
		let mut current = self.inner.flags.write();
		self.insert_all(&mut current, flags);
	}

	/// Clears the store, then merges `flags`, as one write. Readers see
	/// either the old set or the new one.
	pub fn replace_flags(&self, flags: &FlagSet) {
		let mut current = self.inner.flags.write();
		current.clear();
		self.notify(FlagStoreEvent::Cleared);
		self.insert_all(&mut current, flags);
	}

	pub fn set(&self, key: impl Into<String>, value: FlagValue) {
		let key = key.into();
		let mut current = self.inner.flags.write();
		current.insert(key.clone(), value.clone());
		self.notify(FlagStoreEvent::Set { key, value });
	}

	// Events are sent under the write lock so their order matches the
	// order of writes.
	fn insert_all(&self, current: &mut FlagSet, flags: &FlagSet) {
		for (key, value) in flags {
			current.insert(key.clone(), value.clone());
			self.notify(FlagStoreEvent::Set {
				key: key.clone(),
				value: value.clone(),
			});
		}
	}

	pub fn enable(&self, key: impl Into<String>) {
		self.set(key, FlagValue::Bool(true));
	}

	pub fn disable(&self, key: impl Into<String>) {
		self.set(key, FlagValue::Bool(false));
	}

	/// Reads a flag.
	///
	/// An absent flag yields `default` when it is present and not JSON `null`;
	/// otherwise the stored value (or `None`) is returned as-is.
	pub fn get(&self, key: &str, default: Option<FlagValue>) -> Option<FlagValue> {
		let flags = self.inner.flags.read();
		match (flags.get(key), default) {
			(Some(value), _) => Some(value.clone()),
			(None, Some(default)) if !default.is_null() => Some(default),
			(None, _) => None,
		}
	}

	pub fn contains(&self, key: &str) -> bool {
		self.inner.flags.read().contains_key(key)
	}

	/// Returns a copy of every flag. Mutating the copy does not touch the store.
	pub fn all_flags(&self) -> FlagSet {
		self.inner.flags.read().clone()
	}

	pub fn len(&self) -> usize {
		self.inner.flags.read().len()
	}

	pub fn is_empty(&self) -> bool {
		self.inner.flags.read().is_empty()
	}

	/// Subscribe to store mutations.
	///
	/// Subscribers that fall more than [`DEFAULT_CHANNEL_CAPACITY`] events
	/// behind see `RecvError::Lagged` and should re-read [`all_flags`](Self::all_flags).
	pub fn subscribe(&self) -> broadcast::Receiver<FlagStoreEvent> {
		self.inner.sender.subscribe()
	}

	fn notify(&self, event: FlagStoreEvent) {
		// No subscribers is fine.
		let _ = self.inner.sender.send(event);
	}
}

impl Default for FlagStore {
	fn default() -> Self {
		Self::new()
	}
}

impl std::fmt::Debug for FlagStore {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("FlagStore")
			.field("flags", &*self.inner.flags.read())
			.finish()
	}
}
