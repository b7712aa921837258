// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Session bootstrap.
//!
//! [`Bootstrapper::initialize`] builds the current session in local or remote
//! mode. Remote initialization never fails outright: a handshake that errors
//! or times out yields a session in the `failed` status serving whatever the
//! client already has (bootstrap values or nothing), and the first change
//! event from the client moves it to `initialized`.

use std::sync::{Arc, Weak};

use loom_flags_bridge_core::{
	should_update_flag, ClientError, ClientEvent, FlagChangeset, FlagSet, FlagValue, InitStatus,
	StreamingFlags, UserContext,
};
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::api::{self, IdentifyResult};
use crate::client::{RemoteClientFactory, RemoteFlagClient};
use crate::config::FlagsConfig;
use crate::options::{InitializeOptions, Mode};
use crate::registry::SessionRegistry;
use crate::session::{close_detached, Session, SessionOptions};

/// Outcome of [`Bootstrapper::initialize`].
#[derive(Debug, Clone)]
pub struct InitializeResult {
	/// True when the status is `local` or `initialized`.
	pub is_ok: bool,
	pub status: InitStatus,
	/// The handshake error when `status` is `failed`.
	pub error: Option<ClientError>,
	pub session: Arc<Session>,
}

impl InitializeResult {
	/// Describes an existing session's current state.
	pub fn from_session(session: Arc<Session>) -> Self {
		Self {
			is_ok: session.init_succeeded(),
			status: session.init_status(),
			error: session.init_error(),
			session,
		}
	}
}

/// Creates sessions and registers them as current.
#[derive(Clone)]
pub struct Bootstrapper {
	registry: SessionRegistry,
	factory: Option<Arc<dyn RemoteClientFactory>>,
}

impl Bootstrapper {
	pub fn new(registry: SessionRegistry, factory: Arc<dyn RemoteClientFactory>) -> Self {
		Self {
			registry,
			factory: Some(factory),
		}
	}

	/// A bootstrapper that can only create local sessions. Remote requests
	/// produce a `failed` session.
	pub fn local_only(registry: SessionRegistry) -> Self {
		Self {
			registry,
			factory: None,
		}
	}

	pub fn registry(&self) -> &SessionRegistry {
		&self.registry
	}

	/// Creates the current session.
	///
	/// If a session is already current it is returned as-is, whatever mode
	/// or options were requested. Destroy it first to re-initialize.
	pub async fn initialize(
		&self,
		client_side_id: &str,
		user: UserContext,
		options: InitializeOptions,
	) -> InitializeResult {
		if let Some(existing) = self.registry.current() {
			debug!(status = %existing.init_status(), "flags session already initialized");
			return InitializeResult::from_session(existing);
		}

		match options.resolved_mode() {
			Mode::Local => self.initialize_local(options),
			Mode::Remote => self.initialize_remote(client_side_id, user, options).await,
		}
	}

	/// Initializes from loaded configuration.
	pub async fn initialize_from_config(&self, config: FlagsConfig) -> InitializeResult {
		self.initialize(&config.client_side_id, config.user, config.options)
			.await
	}

	/// See [`api::identify`].
	pub async fn identify(&self, user: UserContext, hash: Option<String>) -> IdentifyResult {
		api::identify(&self.registry, user, hash).await
	}

	/// See [`api::variation`].
	pub fn variation(&self, key: &str, default: Option<FlagValue>) -> Option<FlagValue> {
		api::variation(&self.registry, key, default)
	}

	fn initialize_local(&self, options: InitializeOptions) -> InitializeResult {
		let session = Arc::new(Session::new(SessionOptions {
			flags: options.local_flags,
			init_status: Some(InitStatus::Local),
			callbacks: options.callbacks,
			storage: Some(self.registry.storage()),
			..Default::default()
		}));
		if let Err(existing) = self.registry.try_set_current(Arc::clone(&session)) {
			debug!("flags session registered concurrently; keeping it");
			return InitializeResult::from_session(existing);
		}
		info!(flags = session.flags().len(), "flags session initialized in local mode");

		InitializeResult {
			is_ok: true,
			status: InitStatus::Local,
			error: None,
			session,
		}
	}

	async fn initialize_remote(
		&self,
		client_side_id: &str,
		user: UserContext,
		options: InitializeOptions,
	) -> InitializeResult {
		let client_options = options.remote_client_options();
		let bootstrap_label = if client_options.bootstrap.is_some() {
			"bootstrap"
		} else {
			"default"
		};

		let created = match &self.factory {
			Some(factory) => factory.create(client_side_id, &user, &client_options),
			None => Err(ClientError::other("no remote flag client factory configured")),
		};

		let client = match created {
			Ok(client) => client,
			Err(error) => {
				warn!(
					error = %error,
					"flag client could not be created; using {bootstrap_label} flag values"
				);
				return self.register_failed_without_client(client_options.bootstrap, error, options);
			}
		};

		let timeout = options.timeout;
		let (status, error) =
			match tokio::time::timeout(timeout, client.wait_for_initialization()).await {
				Ok(Ok(())) => (InitStatus::Initialized, None),
				Ok(Err(error)) => (InitStatus::Failed, Some(error)),
				Err(_) => (InitStatus::Failed, Some(ClientError::Timeout(timeout))),
			};

		if let Some(error) = &error {
			warn!(
				timeout_secs = timeout.as_secs_f64(),
				error = %error,
				"flag client failed to initialize; using {bootstrap_label} flag values"
			);
		}

		// A concurrent initialize may have registered while we waited.
		if let Some(existing) = self.registry.current() {
			return discard_client(client, existing);
		}

		let session = Arc::new(Session::new(SessionOptions {
			flags: client.all_flags(),
			client: Some(Arc::clone(&client)),
			init_status: Some(status),
			init_error: error.clone(),
			callbacks: options.callbacks,
			storage: Some(self.registry.storage()),
		}));

		// Register before subscribing so an event fired during subscription
		// already sees the current session.
		if let Err(existing) = self.registry.try_set_current(Arc::clone(&session)) {
			return discard_client(client, existing);
		}
		attach_listeners(&session, &*client, options.streaming_flags);

		info!(
			status = %status,
			flags = session.flags().len(),
			"flags session initialized in remote mode"
		);

		InitializeResult {
			is_ok: status == InitStatus::Initialized,
			status,
			error,
			session,
		}
	}

	fn register_failed_without_client(
		&self,
		bootstrap: Option<FlagSet>,
		error: ClientError,
		options: InitializeOptions,
	) -> InitializeResult {
		let session = Arc::new(Session::new(SessionOptions {
			flags: bootstrap.unwrap_or_default(),
			init_status: Some(InitStatus::Failed),
			init_error: Some(error.clone()),
			callbacks: options.callbacks,
			storage: Some(self.registry.storage()),
			..Default::default()
		}));
		if let Err(existing) = self.registry.try_set_current(Arc::clone(&session)) {
			debug!("flags session registered concurrently; keeping it");
			return InitializeResult::from_session(existing);
		}

		InitializeResult {
			is_ok: false,
			status: InitStatus::Failed,
			error: Some(error),
			session,
		}
	}
}

impl std::fmt::Debug for Bootstrapper {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Bootstrapper")
			.field("registry", &self.registry)
			.field("has_factory", &self.factory.is_some())
			.finish()
	}
}

/// Closes a client that lost the race to register, and reports the session
/// that won.
fn discard_client(client: Arc<dyn RemoteFlagClient>, existing: Arc<Session>) -> InitializeResult {
	warn!("flags session registered during handshake; discarding new client");
	match Handle::try_current() {
		Ok(runtime) => close_detached(&runtime, client, "discarded flag client close failed"),
		Err(e) => warn!(error = %e, "no runtime to close discarded flag client"),
	}
	InitializeResult::from_session(existing)
}

/// Subscribes the session to the client's error and change events.
///
/// Handlers hold a weak reference so the client does not keep a destroyed
/// session alive.
fn attach_listeners(
	session: &Arc<Session>,
	client: &dyn RemoteFlagClient,
	streaming: StreamingFlags,
) {
	let weak = Arc::downgrade(session);
	let error_id = client.subscribe(Arc::new(move |event: &ClientEvent| {
		if let ClientEvent::Error(error) = event {
			if let Some(session) = weak.upgrade() {
				session.handle_error(error.clone());
			}
		}
	}));
	session.track_subscription(error_id);

	let weak: Weak<Session> = Arc::downgrade(session);
	let change_id = client.subscribe(Arc::new(move |event: &ClientEvent| {
		if let ClientEvent::Change(changes) = event {
			if let Some(session) = weak.upgrade() {
				apply_changes(&session, changes, &streaming);
			}
		}
	}));
	session.track_subscription(change_id);
}

/// Applies a pushed changeset, recovering a failed session first.
fn apply_changes(session: &Session, changes: &FlagChangeset, streaming: &StreamingFlags) {
	if session.init_status() == InitStatus::Failed {
		info!("flag client recovered after failed initialization");
		session.transition_status(InitStatus::Initialized, None);
	}

	let updates: FlagSet = changes
		.iter()
		.filter(|(key, _)| should_update_flag(key, streaming))
		.map(|(key, change)| (key.clone(), change.current.clone().unwrap_or(FlagValue::Null)))
		.collect();

	debug!(
		changed = changes.len(),
		applied = updates.len(),
		"applying streamed flag changes"
	);
	session.update_flags(&updates);
}
