// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Flag values, snapshots and evaluation details.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A single flag value.
///
/// Flags may be booleans, strings, numbers or arbitrary JSON, so the value is
/// kept as a JSON value rather than narrowed to one type.
pub type FlagValue = serde_json::Value;

/// A snapshot of flag values keyed by flag key.
pub type FlagSet = BTreeMap<String, FlagValue>;

/// Why the flag client returned a particular value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EvaluationReason {
	/// The flag is switched off and served its off variation.
	Off,
	/// No targeting matched; the fallthrough rule applied.
	Fallthrough,
	/// The user was individually targeted.
	TargetMatch,
	/// A targeting rule matched.
	#[serde(rename_all = "camelCase")]
	RuleMatch {
		rule_index: u32,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		rule_id: Option<String>,
	},
	/// A prerequisite flag did not return the required variation.
	#[serde(rename_all = "camelCase")]
	PrerequisiteFailed { prerequisite_key: String },
	/// Evaluation failed and the default value was served.
	#[serde(rename_all = "camelCase")]
	Error { error_kind: String },
}

/// Result of a detailed variation call.
///
/// Sessions running from static values synthesize a detail carrying only the
/// value, because no evaluation took place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationDetail {
	/// The flag value, or `None` when the flag is unknown and no default was given.
	pub value: Option<FlagValue>,
	/// Index of the served variation.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub variation_index: Option<u32>,
	/// Why this value was served.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub reason: Option<EvaluationReason>,
}

impl EvaluationDetail {
	/// Creates a detail that carries only a value.
	pub fn value_only(value: Option<FlagValue>) -> Self {
		Self {
			value,
			variation_index: None,
			reason: None,
		}
	}
}
