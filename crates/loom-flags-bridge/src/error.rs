// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for the flag bridge.

use std::path::PathBuf;

use loom_flags_bridge_core::ClientError;
use thiserror::Error;

/// Result type alias for bridge operations.
pub type Result<T> = std::result::Result<T, FlagsError>;

/// Errors that can occur in the flag bridge.
#[derive(Debug, Error)]
pub enum FlagsError {
	/// No session has been registered yet.
	#[error("flags bridge has not been initialized; call initialize() before {operation}()")]
	NotInitialized {
		/// The operation that was attempted.
		operation: &'static str,
	},

	/// A test harness was used after its session was torn down.
	#[error("flags context is missing; was the harness already torn down?")]
	ContextMissing,

	/// A detached client close was requested outside a Tokio runtime.
	#[error("forced close requires a Tokio runtime")]
	NoRuntime,

	/// The remote flag client reported a failure.
	#[error("flag client error: {0}")]
	Client(#[from] ClientError),

	/// The persistence collaborator failed.
	#[error("flag storage error: {0}")]
	Storage(#[from] StorageError),

	/// Persisted flags could not be encoded or decoded.
	#[error("serialization error: {0}")]
	Serialization(#[from] serde_json::Error),
}

impl FlagsError {
	pub fn not_initialized(operation: &'static str) -> Self {
		Self::NotInitialized { operation }
	}

	/// Returns the client error if this failure came from the remote client.
	pub fn as_client_error(&self) -> Option<&ClientError> {
		match self {
			Self::Client(e) => Some(e),
			_ => None,
		}
	}
}

/// Errors raised by a [`FlagStorage`](crate::FlagStorage) backend.
#[derive(Debug, Error)]
pub enum StorageError {
	/// I/O error reading or writing a stored blob.
	#[error("I/O error on {path}: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	/// The backend is not usable.
	#[error("storage unavailable: {0}")]
	Unavailable(String),
}

/// Errors that can occur while loading bridge configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Config file could not be read.
	#[error("failed to read config file {path}: {source}")]
	FileRead {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	/// TOML parsing error.
	#[error("TOML parse error in {path}: {source}")]
	TomlParse {
		path: PathBuf,
		#[source]
		source: toml::de::Error,
	},

	/// Invalid value in an environment variable or config field.
	#[error("invalid value for {key}: {message}")]
	InvalidValue { key: String, message: String },
}

impl ConfigError {
	pub fn invalid_value(key: impl Into<String>, message: impl Into<String>) -> Self {
		Self::InvalidValue {
			key: key.into(),
			message: message.into(),
		}
	}
}
