// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Layered configuration for the flags bridge.
//!
//! Precedence (highest to lowest):
//! 1. Environment variables (`LOOM_FLAGS_*`)
//! 2. Config file (`/etc/loom/flags.toml`)
//! 3. Built-in defaults
//!
//! ```ignore
//! use loom_flags_bridge::{config::load_config, Bootstrapper, SessionRegistry};
//!
//! let config = load_config()?;
//! let result = Bootstrapper::local_only(SessionRegistry::global().clone())
//!     .initialize_from_config(config)
//!     .await;
//! ```

mod layer;
mod sources;

pub use layer::FlagsConfigLayer;
pub use sources::{EnvSource, FlagsConfigSource};

use std::path::PathBuf;

use loom_flags_bridge_core::UserContext;
use tracing::{debug, info};

use crate::error::ConfigError;
use crate::options::InitializeOptions;

/// Fully resolved bridge configuration.
#[derive(Debug, Clone)]
pub struct FlagsConfig {
	/// Empty in local mode.
	pub client_side_id: String,
	pub user: UserContext,
	pub options: InitializeOptions,
}

/// Load configuration from all sources with standard precedence.
pub fn load_config() -> Result<FlagsConfig, ConfigError> {
	load_config_from_sources(vec![
		FlagsConfigSource::Defaults,
		FlagsConfigSource::system_file(),
		FlagsConfigSource::environment(),
	])
}

/// Load configuration with a custom config file path.
pub fn load_config_with_file(config_path: impl Into<PathBuf>) -> Result<FlagsConfig, ConfigError> {
	load_config_from_sources(vec![
		FlagsConfigSource::Defaults,
		FlagsConfigSource::file(config_path),
		FlagsConfigSource::environment(),
	])
}

/// Merge `sources` from lowest to highest rank and resolve the result.
pub fn load_config_from_sources(
	mut sources: Vec<FlagsConfigSource>,
) -> Result<FlagsConfig, ConfigError> {
	sources.sort_by_key(FlagsConfigSource::rank);

	let mut merged = FlagsConfigLayer::default();
	for source in &sources {
		debug!(source = source.label(), "loading flags configuration source");
		merged.merge(source.layer()?);
	}

	let config = merged.finalize()?;
	info!(
		mode = %config.options.resolved_mode(),
		timeout_secs = config.options.timeout.as_secs_f64(),
		local_flags = config.options.local_flags.len(),
		"flags configuration loaded"
	);
	Ok(config)
}
