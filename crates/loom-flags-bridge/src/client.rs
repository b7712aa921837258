// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The remote flag client capability.
//!
//! The bridge never talks to the flag service itself. A vendor SDK is plugged
//! in by implementing [`RemoteFlagClient`] and handing the bootstrapper a
//! [`RemoteClientFactory`] that constructs it.
//!
//! # Events
//!
//! Clients deliver [`ClientEvent`]s to handlers registered with
//! [`RemoteFlagClient::subscribe`]. Handlers run synchronously, one at a time,
//! in the order the client emits events; the bridge applies them as received.
//! [`EventSubscribers`] implements that contract for client authors.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use loom_flags_bridge_core::{
	ClientError, ClientEvent, EvaluationDetail, FlagSet, FlagValue, UserContext,
};
use parking_lot::RwLock;
use serde_json::{Map, Value};

/// Name reported to the flag service for this integration.
pub const WRAPPER_NAME: &str = "loom-flags-bridge";
/// Version reported to the flag service for this integration.
pub const WRAPPER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Handler invoked for each client event.
pub type ClientEventHandler = Arc<dyn Fn(&ClientEvent) + Send + Sync>;

/// Identifies a registered event handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
	pub fn new(raw: u64) -> Self {
		Self(raw)
	}

	pub fn get(self) -> u64 {
		self.0
	}
}

/// A connected feature flag client, typically a vendor SDK.
#[async_trait]
pub trait RemoteFlagClient: Send + Sync {
	/// Resolves once the client has completed its initial handshake, or
	/// rejects on network failure. The bootstrapper bounds this with its own
	/// timeout.
	async fn wait_for_initialization(&self) -> Result<(), ClientError>;

	/// Snapshot of every flag the client currently knows.
	fn all_flags(&self) -> FlagSet;

	/// Evaluates a flag and records the evaluation for analytics.
	fn variation(&self, key: &str, default: Option<FlagValue>) -> Option<FlagValue>;

	/// Evaluates a flag and returns the variation index and reason.
	fn variation_detail(&self, key: &str, default: Option<FlagValue>) -> EvaluationDetail;

	/// Switches to `user` and returns the full flag set evaluated for them.
	async fn identify(
		&self,
		user: UserContext,
		hash: Option<String>,
	) -> Result<FlagSet, ClientError>;

	/// Records a custom analytics event. Fire-and-forget.
	fn track(&self, event: &str, data: Option<Value>, metric_value: Option<f64>);

	/// Sends pending analytics events.
	async fn flush(&self) -> Result<(), ClientError>;

	/// Flushes pending events and shuts the client down.
	async fn close(&self) -> Result<(), ClientError>;

	/// The user the client currently evaluates against.
	fn context(&self) -> UserContext;

	fn subscribe(&self, handler: ClientEventHandler) -> SubscriptionId;

	fn unsubscribe(&self, id: SubscriptionId);
}

/// Constructs remote clients, the equivalent of the vendor SDK's `initialize`.
pub trait RemoteClientFactory: Send + Sync {
	fn create(
		&self,
		client_side_id: &str,
		user: &UserContext,
		options: &RemoteClientOptions,
	) -> Result<Arc<dyn RemoteFlagClient>, ClientError>;
}

/// Options handed to a [`RemoteClientFactory`].
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteClientOptions {
	/// Only send analytics events for flags evaluated through `variation`.
	pub send_events_only_for_variation: bool,
	pub wrapper_name: String,
	pub wrapper_version: String,
	/// Flag values to serve before the handshake completes.
	pub bootstrap: Option<FlagSet>,
	/// Vendor-specific options passed through untouched.
	pub extra: Map<String, Value>,
}

impl Default for RemoteClientOptions {
	fn default() -> Self {
		Self {
			send_events_only_for_variation: true,
			wrapper_name: WRAPPER_NAME.to_string(),
			wrapper_version: WRAPPER_VERSION.to_string(),
			bootstrap: None,
			extra: Map::new(),
		}
	}
}

/// Handler registry for [`RemoteFlagClient`] implementations.
///
/// `emit` calls handlers on the calling thread in registration order. The
/// handler list is copied before dispatch, so a handler may subscribe or
/// unsubscribe without deadlocking.
#[derive(Default)]
pub struct EventSubscribers {
	next_id: AtomicU64,
	handlers: RwLock<Vec<(SubscriptionId, ClientEventHandler)>>,
}

impl EventSubscribers {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn subscribe(&self, handler: ClientEventHandler) -> SubscriptionId {
		let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
		self.handlers.write().push((id, handler));
		id
	}

	pub fn unsubscribe(&self, id: SubscriptionId) {
		self.handlers.write().retain(|(existing, _)| *existing != id);
	}

	pub fn emit(&self, event: &ClientEvent) {
		let handlers: Vec<ClientEventHandler> = self
			.handlers
			.read()
			.iter()
			.map(|(_, handler)| Arc::clone(handler))
			.collect();

		for handler in handlers {
			handler(event);
		}
	}

	pub fn len(&self) -> usize {
		self.handlers.read().len()
	}

	pub fn is_empty(&self) -> bool {
		self.handlers.read().is_empty()
	}
}

impl std::fmt::Debug for EventSubscribers {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("EventSubscribers")
			.field("handlers", &self.len())
			.finish()
	}
}
