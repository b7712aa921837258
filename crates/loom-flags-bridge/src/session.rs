// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The flags session: flag state, mode, status and errors for one logical
//! flags connection.

use std::sync::{Arc, Weak};

use loom_flags_bridge_core::{
	ClientError, EvaluationDetail, FlagSet, FlagValue, InitStatus, UserContext,
};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::client::{RemoteFlagClient, SubscriptionId};
use crate::error::{FlagsError, Result};
use crate::options::{ErrorCallback, SessionCallbacks};
use crate::registry::RegistryInner;
use crate::status::StatusTracker;
use crate::storage::{FlagStorage, MemoryStorage, STORAGE_KEY};
use crate::store::{FlagStore, FlagStoreEvent};

/// Options for constructing a [`Session`].
///
/// Every field is optional; `SessionOptions::default()` produces a valid
/// local session with no flags.
#[derive(Default)]
pub struct SessionOptions {
	pub flags: FlagSet,
	pub client: Option<Arc<dyn RemoteFlagClient>>,
	/// Overrides the inferred status (`Initialized` with a client, else `Local`).
	pub init_status: Option<InitStatus>,
	pub init_error: Option<ClientError>,
	pub callbacks: SessionCallbacks,
	/// Persistence backend; defaults to in-memory storage.
	pub storage: Option<Arc<dyn FlagStorage>>,
}

/// Options for [`Session::close`] and [`Session::destroy`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CloseOptions {
	/// Request the client shutdown without waiting for its final event flush.
	pub force: bool,
}

impl CloseOptions {
	pub fn force() -> Self {
		Self { force: true }
	}
}

/// Flag state plus the optional remote client behind it.
///
/// A session without a client runs in local mode: variation calls read the
/// static values, analytics calls are no-ops and the reported user is the
/// local-mode sentinel. With a client, reads still come from the session's
/// [`FlagStore`] (kept current by the change listener) while analytics and
/// detailed evaluation go to the client.
pub struct Session {
	flags: FlagStore,
	client: Option<Arc<dyn RemoteFlagClient>>,
	status: StatusTracker,
	last_error: RwLock<Option<ClientError>>,
	on_error: Option<ErrorCallback>,
	storage: Arc<dyn FlagStorage>,
	subscriptions: Mutex<Vec<SubscriptionId>>,
	registry: RwLock<Weak<RegistryInner>>,
}

impl Session {
	pub fn new(options: SessionOptions) -> Self {
		let SessionOptions {
			flags,
			client,
			init_status,
			init_error,
			callbacks,
			storage,
		} = options;

		let status = init_status.unwrap_or(if client.is_some() {
			InitStatus::Initialized
		} else {
			InitStatus::Local
		});

		Self {
			flags: FlagStore::with_flags(&flags),
			client,
			status: StatusTracker::new(status, init_error, callbacks.on_status_change),
			last_error: RwLock::new(None),
			on_error: callbacks.on_error,
			storage: storage.unwrap_or_else(|| Arc::new(MemoryStorage::new())),
			subscriptions: Mutex::new(Vec::new()),
			registry: RwLock::new(Weak::new()),
		}
	}

	/// A local session serving `flags`.
	pub fn local(flags: FlagSet) -> Self {
		Self::new(SessionOptions {
			flags,
			..Default::default()
		})
	}

	/// A remote session seeded with `flags`.
	pub fn with_client(flags: FlagSet, client: Arc<dyn RemoteFlagClient>) -> Self {
		Self::new(SessionOptions {
			flags,
			client: Some(client),
			..Default::default()
		})
	}

	// Flag store

	pub fn update_flags(&self, flags: &FlagSet) {
		self.flags.update_flags(flags);
	}

	pub fn replace_flags(&self, flags: &FlagSet) {
		self.flags.replace_flags(flags);
	}

	pub fn enable(&self, key: impl Into<String>) {
		self.flags.enable(key);
	}

	pub fn disable(&self, key: impl Into<String>) {
		self.flags.disable(key);
	}

	pub fn set(&self, key: impl Into<String>, value: FlagValue) {
		self.flags.set(key, value);
	}

	/// See [`FlagStore::get`].
	pub fn get(&self, key: &str, default: Option<FlagValue>) -> Option<FlagValue> {
		self.flags.get(key, default)
	}

	pub fn all_flags(&self) -> FlagSet {
		self.flags.all_flags()
	}

	pub fn flags(&self) -> &FlagStore {
		&self.flags
	}

	pub fn subscribe(&self) -> broadcast::Receiver<FlagStoreEvent> {
		self.flags.subscribe()
	}

	/// Reads a flag, reporting the evaluation to the remote client first so
	/// it is attributed in analytics.
	pub fn variation(&self, key: &str, default: Option<FlagValue>) -> Option<FlagValue> {
		if let Some(client) = &self.client {
			client.variation(key, default.clone());
		}
		self.flags.get(key, default)
	}

	// Status

	pub fn is_local(&self) -> bool {
		self.client.is_none()
	}

	pub fn init_status(&self) -> InitStatus {
		self.status.status()
	}

	/// True when the status is `Local` or `Initialized`.
	pub fn init_succeeded(&self) -> bool {
		self.status.status().is_success()
	}

	/// The handshake error if initialization failed.
	pub fn init_error(&self) -> Option<ClientError> {
		self.status.error()
	}

	/// Moves to `status`. A no-op when the status is unchanged; otherwise the
	/// status-change callback fires with `(status, previous)`.
	pub fn transition_status(&self, status: InitStatus, error: Option<ClientError>) -> bool {
		self.status.transition(status, error)
	}

	pub fn status_watch(&self) -> watch::Receiver<InitStatus> {
		self.status.watch()
	}

	/// The most recent runtime error from the remote client.
	pub fn last_error(&self) -> Option<ClientError> {
		self.last_error.read().clone()
	}

	/// Records a runtime error and forwards it to the error callback, or
	/// logs it when no callback is registered. Does not change the status.
	pub fn handle_error(&self, error: ClientError) {
		*self.last_error.write() = Some(error.clone());

		match &self.on_error {
			Some(on_error) => on_error(&error),
			None => warn!(error = %error, "flag client error"),
		}
	}

	// Client passthroughs

	pub fn client(&self) -> Option<&Arc<dyn RemoteFlagClient>> {
		self.client.as_ref()
	}

	/// Like [`variation`](Self::variation) but with the variation index and
	/// reason. Local sessions carry only the value.
	pub fn variation_detail(&self, key: &str, default: Option<FlagValue>) -> EvaluationDetail {
		match &self.client {
			Some(client) => client.variation_detail(key, default),
			None => EvaluationDetail::value_only(self.flags.get(key, default)),
		}
	}

	/// Sends a custom analytics event. No-op in local mode.
	pub fn track(&self, event: &str, data: Option<Value>, metric_value: Option<f64>) {
		if let Some(client) = &self.client {
			client.track(event, data, metric_value);
		}
	}

	/// Flushes pending analytics events. No-op in local mode.
	pub async fn flush(&self) -> Result<()> {
		if let Some(client) = &self.client {
			client.flush().await?;
		}
		Ok(())
	}

	/// Re-identifies the remote client and replaces every flag with the
	/// client's evaluation for `user`. On failure the flags are untouched.
	/// No-op in local mode.
	pub async fn identify(&self, user: UserContext, hash: Option<String>) -> Result<()> {
		let Some(client) = &self.client else {
			return Ok(());
		};

		let flags = client.identify(user, hash).await?;
		self.flags.replace_flags(&flags);
		debug!(flags = flags.len(), "flags replaced after identify");
		Ok(())
	}

	/// The user flags are evaluated for.
	pub fn user(&self) -> UserContext {
		match &self.client {
			Some(client) => client.context(),
			None => UserContext::local_mode(),
		}
	}

	/// Shuts the remote client down and detaches the session's listeners.
	///
	/// By default this waits for the client's close-and-flush to finish.
	/// With `force`, the close runs as a detached task that is not waited
	/// on and whose outcome is only logged. Forcing outside a Tokio runtime fails with
	/// [`FlagsError::NoRuntime`] and leaves the session untouched.
	pub async fn close(&self, options: CloseOptions) -> Result<()> {
		let Some(client) = &self.client else {
			return Ok(());
		};

		let runtime = if options.force {
			Some(Handle::try_current().map_err(|_| FlagsError::NoRuntime)?)
		} else {
			None
		};

		let subscriptions: Vec<SubscriptionId> = self.subscriptions.lock().drain(..).collect();
		for id in subscriptions {
			client.unsubscribe(id);
		}

		if let Some(runtime) = runtime {
			close_detached(&runtime, Arc::clone(client), "forced flag client close failed");
			debug!("flag client close requested without waiting");
			return Ok(());
		}

		client.close().await?;
		debug!("flag client closed");
		Ok(())
	}

	/// Closes the session and vacates the registry slot it was registered
	/// in, so `initialize` can create a fresh session. A slot that has since
	/// been taken by another session is left alone.
	pub async fn destroy(&self, options: CloseOptions) -> Result<()> {
		self.close(options).await?;

		let registry = self.registry.read().upgrade();
		if let Some(registry) = registry {
			if registry.clear_if_current(self) {
				info!("flags session destroyed");
			}
		}
		Ok(())
	}

	// Persistence

	/// Writes the current flags to storage.
	pub fn persist(&self) -> Result<()> {
		let blob = serde_json::to_string(&self.flags.all_flags())?;
		self.storage.set_item(STORAGE_KEY, &blob)?;
		Ok(())
	}

	/// The persisted flags, if any.
	pub fn persisted(&self) -> Result<Option<FlagSet>> {
		match self.storage.get_item(STORAGE_KEY)? {
			Some(blob) if !blob.is_empty() => Ok(Some(serde_json::from_str(&blob)?)),
			_ => Ok(None),
		}
	}

	pub fn reset_persistence(&self) -> Result<()> {
		self.storage.remove_item(STORAGE_KEY)?;
		Ok(())
	}

	/// Replaces the flags with the persisted set, if one exists. Read
	/// failures are logged and leave the flags untouched.
	pub(crate) fn apply_persisted(&self) {
		match self.persisted() {
			Ok(Some(flags)) => {
				debug!(flags = flags.len(), "applying persisted flags");
				self.flags.replace_flags(&flags);
			}
			Ok(None) => {}
			Err(e) => warn!(error = %e, "ignoring unreadable persisted flags"),
		}
	}

	pub(crate) fn attach_registry(&self, registry: Weak<RegistryInner>) {
		*self.registry.write() = registry;
	}

	pub(crate) fn track_subscription(&self, id: SubscriptionId) {
		self.subscriptions.lock().push(id);
	}
}

/// Closes `client` on `runtime` without waiting, logging a failure as `message`.
pub(crate) fn close_detached(
	runtime: &Handle,
	client: Arc<dyn RemoteFlagClient>,
	message: &'static str,
) {
	runtime.spawn(async move {
		if let Err(e) = client.close().await {
			warn!(error = %e, "{message}");
		}
	});
}

impl std::fmt::Debug for Session {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Session")
			.field("is_local", &self.is_local())
			.field("status", &self.status)
			.field("last_error", &*self.last_error.read())
			.field("flags", &self.flags)
			.finish()
	}
}
