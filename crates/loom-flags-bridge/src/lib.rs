// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Reactive feature flag sessions for Loom applications.
//!
//! This crate sits between application code and a vendor feature flag client.
//! It keeps an observable copy of every flag, tracks whether the remote client
//! came up, and keeps serving values when it did not.
//!
//! # Features
//!
//! - **Local mode**: static flag values with no network, for development and tests
//! - **Remote mode**: flags evaluated by a [`RemoteFlagClient`], with a bounded
//!   handshake that degrades to a `failed` session instead of an error
//! - **Live updates**: pushed changes filtered by a [`StreamingFlags`] policy
//! - **Observable state**: flag changes over `broadcast`, status over `watch`
//! - **Layered configuration**: defaults, `/etc/loom/flags.toml`, `LOOM_FLAGS_*`
//!
//! # Example
//!
//! ```ignore
//! use loom_flags_bridge::{Bootstrapper, InitializeOptions, SessionRegistry, UserContext};
//! use serde_json::json;
//!
//! let registry = SessionRegistry::in_memory();
//! let bootstrapper = Bootstrapper::new(registry.clone(), Arc::new(MyVendorFactory));
//!
//! let result = bootstrapper
//!     .initialize(
//!         "client-side-id",
//!         UserContext::new("user123"),
//!         InitializeOptions::remote().with_streaming(true),
//!     )
//!     .await;
//! if !result.is_ok {
//!     tracing::warn!(error = ?result.error, "serving cached flags");
//! }
//!
//! let theme = bootstrapper.variation("ui.theme", Some(json!("light")));
//! ```

pub mod api;
mod bootstrap;
mod client;
pub mod config;
mod error;
mod options;
mod registry;
mod session;
mod status;
mod storage;
mod store;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use api::{identify, variation, IdentifyResult};
pub use bootstrap::{Bootstrapper, InitializeResult};
pub use client::{
	ClientEventHandler, EventSubscribers, RemoteClientFactory, RemoteClientOptions,
	RemoteFlagClient, SubscriptionId, WRAPPER_NAME, WRAPPER_VERSION,
};
pub use config::{load_config, load_config_with_file, FlagsConfig};
pub use error::{ConfigError, FlagsError, Result, StorageError};
pub use options::{
	Bootstrap, BootstrapSource, ErrorCallback, InitializeOptions, Mode, SessionCallbacks,
	StatusChangeCallback, DEFAULT_TIMEOUT,
};
pub use registry::SessionRegistry;
pub use session::{CloseOptions, Session, SessionOptions};
pub use status::StatusTracker;
pub use storage::{FileStorage, FlagStorage, MemoryStorage, STORAGE_KEY};
pub use store::{FlagStore, FlagStoreEvent, DEFAULT_CHANNEL_CAPACITY};

// Re-export core types for convenience
pub use loom_flags_bridge_core::{
	should_update_flag, ClientError, ClientEvent, EvaluationDetail, EvaluationReason, FlagChange,
	FlagChangeset, FlagSet, FlagValue, InitStatus, StreamingFlags, UserContext,
};
