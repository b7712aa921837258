// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Test doubles for code built on the flags bridge.
//!
//! Enabled with the `test-support` feature.
//!
//! - [`FakeRemoteClient`]: an in-process [`RemoteFlagClient`] whose handshake,
//!   identify and close outcomes are scripted, and which records every call.
//! - [`FakeClientFactory`]: hands out a fake client and records what it was
//!   asked to build.
//! - [`FlagsTestHarness`]: registers a local session for a test and tears it
//!   down afterwards.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use loom_flags_bridge_core::{
	ClientError, ClientEvent, EvaluationDetail, EvaluationReason, FlagSet, FlagValue, InitStatus,
	UserContext,
};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::{Barrier, Notify};

use crate::client::{
	ClientEventHandler, EventSubscribers, RemoteClientFactory, RemoteClientOptions,
	RemoteFlagClient, SubscriptionId,
};
use crate::error::{FlagsError, Result};
use crate::options::InitializeOptions;
use crate::registry::SessionRegistry;
use crate::session::{CloseOptions, Session, SessionOptions};

/// A `track` call seen by [`FakeRemoteClient`].
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedEvent {
	pub event: String,
	pub data: Option<Value>,
	pub metric_value: Option<f64>,
}

#[derive(Debug, Clone)]
enum Outcome {
	Ok,
	Fail(ClientError),
	Hang,
}

/// Scriptable in-process flag client.
pub struct FakeRemoteClient {
	flags: RwLock<FlagSet>,
	context: RwLock<UserContext>,
	init: Outcome,
	init_gate: Option<Arc<Barrier>>,
	close: Outcome,
	identify_result: Option<std::result::Result<FlagSet, ClientError>>,
	subscribers: EventSubscribers,
	evaluated: Mutex<Vec<String>>,
	tracked: Mutex<Vec<TrackedEvent>>,
	flush_calls: AtomicUsize,
	close_calls: AtomicUsize,
	closed: Notify,
}

impl FakeRemoteClient {
	/// A client that completes its handshake immediately and serves `flags`.
	pub fn new(flags: FlagSet) -> Self {
		Self {
			flags: RwLock::new(flags),
			context: RwLock::new(UserContext::anonymous()),
			init: Outcome::Ok,
			init_gate: None,
			close: Outcome::Ok,
			identify_result: None,
			subscribers: EventSubscribers::new(),
			evaluated: Mutex::new(Vec::new()),
			tracked: Mutex::new(Vec::new()),
			flush_calls: AtomicUsize::new(0),
			close_calls: AtomicUsize::new(0),
			closed: Notify::new(),
		}
	}

	pub fn with_context(self, user: UserContext) -> Self {
		*self.context.write() = user;
		self
	}

	/// The handshake rejects with `error`.
	pub fn with_failing_init(mut self, error: ClientError) -> Self {
		self.init = Outcome::Fail(error);
		self
	}

	/// The handshake never completes.
	pub fn with_hanging_init(mut self) -> Self {
		self.init = Outcome::Hang;
		self
	}

	/// The handshake waits on `gate` before completing, so several clients
	/// sharing one gate finish their handshakes together.
	pub fn with_init_gate(mut self, gate: Arc<Barrier>) -> Self {
		self.init_gate = Some(gate);
		self
	}

	/// Every `identify` call returns `result`. Without this, `identify`
	/// returns the current flags.
	pub fn with_identify_result(
		mut self,
		result: std::result::Result<FlagSet, ClientError>,
	) -> Self {
		self.identify_result = Some(result);
		self
	}

	pub fn with_close_error(mut self, error: ClientError) -> Self {
		self.close = Outcome::Fail(error);
		self
	}

	/// `close` is recorded but never completes.
	pub fn with_hanging_close(mut self) -> Self {
		self.close = Outcome::Hang;
		self
	}

	/// Replaces the client's flags without notifying subscribers.
	pub fn set_flags(&self, flags: FlagSet) {
		*self.flags.write() = flags;
	}

	pub fn emit(&self, event: ClientEvent) {
		self.subscribers.emit(&event);
	}

	/// Applies `flags` to the client and pushes them as a change event.
	pub fn emit_change(&self, flags: FlagSet) {
		self.flags.write().extend(flags.clone());
		self.emit(ClientEvent::changed(flags));
	}

	pub fn emit_error(&self, error: ClientError) {
		self.emit(ClientEvent::Error(error));
	}

	pub fn subscriber_count(&self) -> usize {
		self.subscribers.len()
	}

	/// Keys passed to `variation`, in call order.
	pub fn evaluated_keys(&self) -> Vec<String> {
		self.evaluated.lock().clone()
	}

	pub fn tracked_events(&self) -> Vec<TrackedEvent> {
		self.tracked.lock().clone()
	}

	pub fn flush_calls(&self) -> usize {
		self.flush_calls.load(Ordering::SeqCst)
	}

	pub fn close_calls(&self) -> usize {
		self.close_calls.load(Ordering::SeqCst)
	}

	/// Resolves once `close` has been called at least once.
	pub async fn wait_for_close_call(&self) {
		if self.close_calls() > 0 {
			return;
		}
		self.closed.notified().await;
	}
}

#[async_trait]
impl RemoteFlagClient for FakeRemoteClient {
	async fn wait_for_initialization(&self) -> std::result::Result<(), ClientError> {
		if let Some(gate) = &self.init_gate {
			gate.wait().await;
		}
		match &self.init {
			Outcome::Ok => Ok(()),
			Outcome::Fail(error) => Err(error.clone()),
			Outcome::Hang => std::future::pending().await,
		}
	}

	fn all_flags(&self) -> FlagSet {
		self.flags.read().clone()
	}

	fn variation(&self, key: &str, default: Option<FlagValue>) -> Option<FlagValue> {
		self.evaluated.lock().push(key.to_string());
		self.flags.read().get(key).cloned().or(default)
	}

	fn variation_detail(&self, key: &str, default: Option<FlagValue>) -> EvaluationDetail {
		match self.flags.read().get(key) {
			Some(value) => EvaluationDetail {
				value: Some(value.clone()),
				variation_index: Some(0),
				reason: Some(EvaluationReason::Fallthrough),
			},
			None => EvaluationDetail {
				value: default,
				variation_index: None,
				reason: Some(EvaluationReason::Error {
					error_kind: "FLAG_NOT_FOUND".to_string(),
				}),
			},
		}
	}

	async fn identify(
		&self,
		user: UserContext,
		_hash: Option<String>,
	) -> std::result::Result<FlagSet, ClientError> {
		let flags = match &self.identify_result {
			Some(Err(error)) => return Err(error.clone()),
			Some(Ok(flags)) => flags.clone(),
			None => self.all_flags(),
		};
		*self.context.write() = user;
		*self.flags.write() = flags.clone();
		Ok(flags)
	}

	fn track(&self, event: &str, data: Option<Value>, metric_value: Option<f64>) {
		self.tracked.lock().push(TrackedEvent {
			event: event.to_string(),
			data,
			metric_value,
		});
	}

	async fn flush(&self) -> std::result::Result<(), ClientError> {
		self.flush_calls.fetch_add(1, Ordering::SeqCst);
		Ok(())
	}

	async fn close(&self) -> std::result::Result<(), ClientError> {
		self.close_calls.fetch_add(1, Ordering::SeqCst);
		self.closed.notify_one();
		match &self.close {
			Outcome::Ok => Ok(()),
			Outcome::Fail(error) => Err(error.clone()),
			Outcome::Hang => std::future::pending().await,
		}
	}

	fn context(&self) -> UserContext {
		self.context.read().clone()
	}

	fn subscribe(&self, handler: ClientEventHandler) -> SubscriptionId {
		self.subscribers.subscribe(handler)
	}

	fn unsubscribe(&self, id: SubscriptionId) {
		self.subscribers.unsubscribe(id);
	}
}

/// A `create` call seen by [`FakeClientFactory`].
#[derive(Debug, Clone)]
pub struct FactoryCall {
	pub client_side_id: String,
	pub user: UserContext,
	pub options: RemoteClientOptions,
}

/// Factory that hands out scripted [`FakeRemoteClient`]s, or fails.
pub struct FakeClientFactory {
	clients: std::result::Result<Vec<Arc<FakeRemoteClient>>, ClientError>,
	calls: Mutex<Vec<FactoryCall>>,
}

impl FakeClientFactory {
	/// Every `create` call returns `client`.
	pub fn new(client: Arc<FakeRemoteClient>) -> Self {
		Self::sequence(vec![client])
	}

	/// The n-th `create` call returns `clients[n]`. Once the list runs out
	/// the last client is returned again.
	pub fn sequence(clients: Vec<Arc<FakeRemoteClient>>) -> Self {
		Self {
			clients: if clients.is_empty() {
				Err(ClientError::other("fake factory has no clients"))
			} else {
				Ok(clients)
			},
			calls: Mutex::new(Vec::new()),
		}
	}

	/// Every `create` call fails with `error`.
	pub fn failing(error: ClientError) -> Self {
		Self {
			clients: Err(error),
			calls: Mutex::new(Vec::new()),
		}
	}

	pub fn calls(&self) -> Vec<FactoryCall> {
		self.calls.lock().clone()
	}

	pub fn last_call(&self) -> Option<FactoryCall> {
		self.calls.lock().last().cloned()
	}
}

impl RemoteClientFactory for FakeClientFactory {
	fn create(
		&self,
		client_side_id: &str,
		user: &UserContext,
		options: &RemoteClientOptions,
	) -> std::result::Result<Arc<dyn RemoteFlagClient>, ClientError> {
		let mut calls = self.calls.lock();
		let index = calls.len();
		calls.push(FactoryCall {
			client_side_id: client_side_id.to_string(),
			user: user.clone(),
			options: options.clone(),
		});
		drop(calls);
		match &self.clients {
			Ok(clients) => {
				let client = &clients[index.min(clients.len() - 1)];
				*client.context.write() = user.clone();
				Ok(Arc::clone(client) as Arc<dyn RemoteFlagClient>)
			}
			Err(error) => Err(error.clone()),
		}
	}
}

/// Registers a local session for the duration of a test.
///
/// Every key in the options' `local_flags` starts out `false`, whatever
/// value the options give it, so tests opt flags in explicitly with
/// [`with_variation`](Self::with_variation).
///
/// ```ignore
/// let harness = FlagsTestHarness::setup(registry.clone(), &options);
/// harness.with_variation("checkout.new_flow", json!(true))?;
/// // exercise code that reads flags from `registry`
/// harness.teardown().await?;
/// ```
#[derive(Debug)]
pub struct FlagsTestHarness {
	registry: SessionRegistry,
}

impl FlagsTestHarness {
	pub fn setup(registry: SessionRegistry, options: &InitializeOptions) -> Self {
		let flags: FlagSet = options
			.local_flags
			.keys()
			.map(|key| (key.clone(), FlagValue::Bool(false)))
			.collect();

		registry.clear_current();
		registry.set_current(Arc::new(Session::new(SessionOptions {
			flags,
			init_status: Some(InitStatus::Local),
			callbacks: options.callbacks.clone(),
			storage: Some(registry.storage()),
			..Default::default()
		})));

		Self { registry }
	}

	pub fn registry(&self) -> &SessionRegistry {
		&self.registry
	}

	pub fn session(&self) -> Result<Arc<Session>> {
		self.registry.current().ok_or(FlagsError::ContextMissing)
	}

	/// Sets a flag on the current session.
	pub fn with_variation(&self, key: impl Into<String>, value: FlagValue) -> Result<()> {
		self.session()?.set(key, value);
		Ok(())
	}

	/// Forces the session's initialization status.
	pub fn with_init_status(&self, status: InitStatus, error: Option<ClientError>) -> Result<()> {
		self.session()?.transition_status(status, error);
		Ok(())
	}

	/// Closes the session and vacates the registry.
	pub async fn teardown(&self) -> Result<()> {
		let session = self.registry.clear_current().ok_or(FlagsError::ContextMissing)?;
		session.close(CloseOptions::default()).await
	}
}
