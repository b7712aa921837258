// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The "current session" slot.
//!
//! A [`SessionRegistry`] holds at most one session. Applications normally
//! create one registry at startup and pass it to everything that reads flags;
//! [`SessionRegistry::global`] provides a process-wide instance for code that
//! cannot thread a handle through.
//!
//! Lifecycle: the slot starts empty, is filled by
//! [`Bootstrapper::initialize`](crate::Bootstrapper::initialize) and is
//! vacated by [`Session::destroy`] or [`SessionRegistry::clear_current`].
//! Closing a session does not vacate it.

use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::session::Session;
use crate::storage::{FlagStorage, MemoryStorage};

static GLOBAL: OnceLock<SessionRegistry> = OnceLock::new();

/// Single-slot registry of the current [`Session`].
///
/// Cloning the registry yields another handle to the same slot.
#[derive(Clone)]
pub struct SessionRegistry {
	inner: Arc<RegistryInner>,
}

pub(crate) struct RegistryInner {
	slot: RwLock<Option<Arc<Session>>>,
	storage: Arc<dyn FlagStorage>,
}

impl RegistryInner {
	/// Empties the slot if it holds `session`.
	pub(crate) fn clear_if_current(&self, session: &Session) -> bool {
		let mut slot = self.slot.write();
		let is_current = slot
			.as_ref()
			.is_some_and(|current| std::ptr::eq(Arc::as_ptr(current), session));
		if is_current {
			*slot = None;
		}
		is_current
	}
}

impl SessionRegistry {
	/// Creates a registry whose sessions persist flags to `storage`.
	pub fn new(storage: Arc<dyn FlagStorage>) -> Self {
		Self {
			inner: Arc::new(RegistryInner {
				slot: RwLock::new(None),
				storage,
			}),
		}
	}

	pub fn in_memory() -> Self {
		Self::new(Arc::new(MemoryStorage::new()))
	}

	/// The process-wide registry, created with in-memory storage on first use
	/// unless [`install_global`](Self::install_global) ran earlier.
	pub fn global() -> &'static SessionRegistry {
		GLOBAL.get_or_init(SessionRegistry::in_memory)
	}

	/// Makes `registry` the process-wide registry. Fails, handing the
	/// registry back, if the global one already exists.
	pub fn install_global(registry: SessionRegistry) -> Result<(), SessionRegistry> {
		GLOBAL.set(registry)
	}

	/// The persistence backend handed to sessions created for this registry.
	pub fn storage(&self) -> Arc<dyn FlagStorage> {
		Arc::clone(&self.inner.storage)
	}

	/// Makes `session` current.
	///
	/// Persisted flag overrides are applied to the session before it is
	/// published, so anyone who can see the session sees the overrides.
	pub fn set_current(&self, session: Arc<Session>) {
		session.apply_persisted();
		session.attach_registry(Arc::downgrade(&self.inner));

		let replaced = self.inner.slot.write().replace(session).is_some();
		if replaced {
			debug!("replaced current flags session");
		}
		info!("flags session registered");
	}

	/// Makes `session` current only if the slot is empty. Check and insert
	/// happen under one write, so of two racing callers exactly one wins;
	/// the loser gets back the session that holds the slot.
	pub fn try_set_current(&self, session: Arc<Session>) -> Result<(), Arc<Session>> {
		session.apply_persisted();

		let mut slot = self.inner.slot.write();
		if let Some(existing) = slot.as_ref() {
			return Err(Arc::clone(existing));
		}
		session.attach_registry(Arc::downgrade(&self.inner));
		*slot = Some(session);
		drop(slot);

		info!("flags session registered");
		Ok(())
	}

	/// The current session, if any.
	pub fn current(&self) -> Option<Arc<Session>> {
		self.inner.slot.read().clone()
	}

	pub fn has_current(&self) -> bool {
		self.inner.slot.read().is_some()
	}

	/// Vacates the slot, returning the session that was current.
	pub fn clear_current(&self) -> Option<Arc<Session>> {
		let previous = self.inner.slot.write().take();
		if previous.is_some() {
			debug!("cleared current flags session");
		}
		previous
	}
}

impl std::fmt::Debug for SessionRegistry {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SessionRegistry")
			.field("has_current", &self.has_current())
			.finish()
	}
}
