// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Key/value persistence for flag overrides.
//!
//! A session can write its current flag set under [`STORAGE_KEY`] and a
//! registry re-applies that blob whenever a session becomes current. The
//! contract is the one of browser local storage: read, write and remove a
//! named string.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tracing::debug;

use crate::error::StorageError;

/// Name under which the whole flag set is persisted.
pub const STORAGE_KEY: &str = "loom-flags-bridge";

/// A named-blob store.
#[cfg_attr(test, mockall::automock)]
pub trait FlagStorage: Send + Sync {
	/// Returns the stored blob, or `None` if nothing is stored under `name`.
	fn get_item(&self, name: &str) -> Result<Option<String>, StorageError>;

	fn set_item(&self, name: &str, value: &str) -> Result<(), StorageError>;

	/// Removes the blob. Removing a missing name is not an error.
	fn remove_item(&self, name: &str) -> Result<(), StorageError>;
}

/// In-process storage, lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStorage {
	items: RwLock<HashMap<String, String>>,
}

impl MemoryStorage {
	pub fn new() -> Self {
		Self::default()
	}
}

impl FlagStorage for MemoryStorage {
	fn get_item(&self, name: &str) -> Result<Option<String>, StorageError> {
		Ok(self.items.read().get(name).cloned())
	}

	fn set_item(&self, name: &str, value: &str) -> Result<(), StorageError> {
		self.items.write().insert(name.to_string(), value.to_string());
		Ok(())
	}

	fn remove_item(&self, name: &str) -> Result<(), StorageError> {
		self.items.write().remove(name);
		Ok(())
	}
}

/// Stores each blob as `<dir>/<name>.json`.
#[derive(Debug, Clone)]
pub struct FileStorage {
	dir: PathBuf,
}

impl FileStorage {
	pub fn new(dir: impl Into<PathBuf>) -> Self {
		Self { dir: dir.into() }
	}

	pub fn dir(&self) -> &Path {
		&self.dir
	}

	fn path_for(&self, name: &str) -> PathBuf {
		self.dir.join(format!("{name}.json"))
	}
}

impl FlagStorage for FileStorage {
	fn get_item(&self, name: &str) -> Result<Option<String>, StorageError> {
		let path = self.path_for(name);
		match std::fs::read_to_string(&path) {
			Ok(content) => Ok(Some(content)),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
			Err(source) => Err(StorageError::Io { path, source }),
		}
	}

	fn set_item(&self, name: &str, value: &str) -> Result<(), StorageError> {
		std::fs::create_dir_all(&self.dir).map_err(|source| StorageError::Io {
			path: self.dir.clone(),
			source,
		})?;

		let path = self.path_for(name);
		std::fs::write(&path, value).map_err(|source| StorageError::Io {
			path: path.clone(),
			source,
		})?;
		debug!(path = %path.display(), "persisted flags");
		Ok(())
	}

	fn remove_item(&self, name: &str) -> Result<(), StorageError> {
		let path = self.path_for(name);
		match std::fs::remove_file(&path) {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(source) => Err(StorageError::Io { path, source }),
		}
	}
}
