// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core types for the Loom feature flag bridge.
//!
//! This crate holds the vocabulary shared between the bridge runtime
//! (`loom-flags-bridge`) and the vendor flag client that sits behind it:
//!
//! - Flag values and snapshots ([`FlagValue`], [`FlagSet`])
//! - Evaluation details returned by detailed variation calls
//! - The user identity a client evaluates against ([`UserContext`])
//! - Initialization status ([`InitStatus`])
//! - Change-feed payloads pushed by the remote client ([`ClientEvent`])
//! - The streaming inclusion policy ([`StreamingFlags`], [`should_update_flag`])
//!
//! # Example
//!
//! ```
//! use loom_flags_bridge_core::{should_update_flag, StreamingFlags};
//!
//! let policy = StreamingFlags::all_except(["checkout.legacy"]);
//!
//! assert!(should_update_flag("checkout.new_flow", &policy));
//! assert!(!should_update_flag("checkout.legacy", &policy));
//! ```

pub mod error;
pub mod event;
pub mod flag;
pub mod status;
pub mod streaming;
pub mod user;

pub use error::ClientError;
pub use event::{ClientEvent, FlagChange, FlagChangeset};
pub use flag::{EvaluationDetail, EvaluationReason, FlagSet, FlagValue};
pub use status::InitStatus;
pub use streaming::{should_update_flag, StreamingFlags};
pub use user::UserContext;
