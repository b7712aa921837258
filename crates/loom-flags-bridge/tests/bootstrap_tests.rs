// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Integration tests for session bootstrap.
//!
//! This suite covers:
//! - Local and remote initialization outcomes
//! - Handshake failure, timeout and later recovery
//! - Streamed change filtering and runtime error handling
//! - Registry lifecycle (idempotent initialize, destroy, re-initialize)
//! - `identify` and `variation` before and after initialization

use std::sync::Arc;
use std::time::Duration;

use loom_flags_bridge::test_support::{FakeClientFactory, FakeRemoteClient};
use loom_flags_bridge::{
	Bootstrap, Bootstrapper, ClientError, CloseOptions, FlagSet, FlagValue, FlagsError,
	InitStatus, InitializeOptions, RemoteFlagClient, SessionRegistry, StreamingFlags, UserContext,
	WRAPPER_NAME,
};
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::Barrier;

fn flags(pairs: &[(&str, FlagValue)]) -> FlagSet {
	pairs
		.iter()
		.map(|(k, v)| (k.to_string(), v.clone()))
		.collect()
}

fn remote(client: FakeRemoteClient) -> (Bootstrapper, Arc<FakeRemoteClient>, Arc<FakeClientFactory>) {
	let client = Arc::new(client);
	let factory = Arc::new(FakeClientFactory::new(Arc::clone(&client)));
	let bootstrapper = Bootstrapper::new(SessionRegistry::in_memory(), factory.clone());
	(bootstrapper, client, factory)
}

#[tokio::test]
async fn test_local_initialize() {
	let bootstrapper = Bootstrapper::local_only(SessionRegistry::in_memory());
	let options = InitializeOptions::local(flags(&[("foo", json!(true)), ("bar", json!("baz"))]));

	let result = bootstrapper
		.initialize("", UserContext::anonymous(), options)
		.await;

	assert!(result.is_ok);
	assert_eq!(result.status, InitStatus::Local);
	assert!(result.error.is_none());
	assert_eq!(result.session.get("foo", None), Some(json!(true)));
	assert_eq!(result.session.get("bar", None), Some(json!("baz")));
	assert!(result.session.is_local());
	assert!(bootstrapper.registry().has_current());
}

#[tokio::test]
async fn test_invalid_mode_falls_back_to_local() {
	let (bootstrapper, _client, factory) = remote(FakeRemoteClient::new(FlagSet::new()));
	let options = InitializeOptions {
		mode: Some("foo".to_string()),
		local_flags: flags(&[("foo", json!(true))]),
		..Default::default()
	};

	let result = bootstrapper
		.initialize("abc123", UserContext::anonymous(), options)
		.await;

	assert!(result.is_ok);
	assert_eq!(result.status, InitStatus::Local);
	assert!(factory.calls().is_empty());
}

#[tokio::test]
async fn test_remote_initialize_success() {
	let (bootstrapper, client, factory) =
		remote(FakeRemoteClient::new(flags(&[("foo", json!("on"))])));

	let result = bootstrapper
		.initialize("abc123", UserContext::new("user123"), InitializeOptions::remote())
		.await;

	assert!(result.is_ok);
	assert_eq!(result.status, InitStatus::Initialized);
	assert_eq!(result.session.all_flags(), flags(&[("foo", json!("on"))]));
	assert_eq!(result.session.user().key(), Some("user123"));
	assert_eq!(client.subscriber_count(), 2);

	let call = factory.last_call().unwrap();
	assert_eq!(call.client_side_id, "abc123");
	assert!(call.options.send_events_only_for_variation);
	assert_eq!(call.options.wrapper_name, WRAPPER_NAME);
	assert_eq!(call.options.bootstrap, None);
}

#[tokio::test]
async fn test_remote_handshake_failure_keeps_cached_flags() {
	let (bootstrapper, _client, _factory) = remote(
		FakeRemoteClient::new(flags(&[("foo", json!(true))]))
			.with_failing_init(ClientError::network("offline")),
	);

	let result = bootstrapper
		.initialize("abc123", UserContext::anonymous(), InitializeOptions::remote())
		.await;

	assert!(!result.is_ok);
	assert_eq!(result.status, InitStatus::Failed);
	assert_eq!(result.error, Some(ClientError::network("offline")));
	assert_eq!(result.session.all_flags(), flags(&[("foo", json!(true))]));
	assert_eq!(result.session.init_error(), Some(ClientError::network("offline")));
}

#[tokio::test(start_paused = true)]
async fn test_remote_handshake_timeout() {
	let (bootstrapper, _client, _factory) = remote(FakeRemoteClient::new(FlagSet::new()).with_hanging_init());
	let options = InitializeOptions::remote().with_timeout(Duration::from_millis(250));

	let result = bootstrapper
		.initialize("abc123", UserContext::anonymous(), options)
		.await;

	assert!(!result.is_ok);
	assert_eq!(result.status, InitStatus::Failed);
	assert_eq!(
		result.error,
		Some(ClientError::Timeout(Duration::from_millis(250)))
	);
	assert!(result.error.unwrap().is_timeout());
}

#[tokio::test]
async fn test_factory_failure_registers_failed_session() {
	let factory = Arc::new(FakeClientFactory::failing(ClientError::InvalidClientId(
		"nope".to_string(),
	)));
	let bootstrapper = Bootstrapper::new(SessionRegistry::in_memory(), factory);
	let options = InitializeOptions::remote()
		.with_local_flags(flags(&[("foo", json!(true))]))
		.with_bootstrap(Bootstrap::local_flags());

	let result = bootstrapper
		.initialize("nope", UserContext::anonymous(), options)
		.await;

	assert!(!result.is_ok);
	assert_eq!(result.status, InitStatus::Failed);
	assert!(result.session.client().is_none());
	assert_eq!(result.session.all_flags(), flags(&[("foo", json!(true))]));
}

#[tokio::test]
async fn test_local_only_bootstrapper_fails_remote_mode() {
	let bootstrapper = Bootstrapper::local_only(SessionRegistry::in_memory());

	let result = bootstrapper
		.initialize("abc123", UserContext::anonymous(), InitializeOptions::remote())
		.await;

	assert!(!result.is_ok);
	assert_eq!(result.status, InitStatus::Failed);
	assert!(result.session.all_flags().is_empty());
}

#[tokio::test]
async fn test_bootstrap_local_flags_passed_to_client() {
	let (bootstrapper, _client, factory) = remote(FakeRemoteClient::new(FlagSet::new()));
	let options = InitializeOptions::remote()
		.with_local_flags(flags(&[("foo", json!(false))]))
		.with_bootstrap(Bootstrap::local_flags())
		.with_client_option("wrapperName", json!("custom-wrapper"))
		.with_client_option("hash", json!("h"));

	bootstrapper
		.initialize("abc123", UserContext::anonymous(), options)
		.await;

	let call = factory.last_call().unwrap();
	assert_eq!(call.options.bootstrap, Some(flags(&[("foo", json!(false))])));
	assert_eq!(call.options.wrapper_name, "custom-wrapper");
	assert_eq!(call.options.extra.get("hash"), Some(&json!("h")));
	assert!(call.options.extra.get("wrapperName").is_none());
}

#[tokio::test]
async fn test_failed_session_recovers_on_change() {
	let transitions = Arc::new(Mutex::new(Vec::new()));
	let recorded = Arc::clone(&transitions);
	let (bootstrapper, client, _factory) = remote(
		FakeRemoteClient::new(FlagSet::new()).with_failing_init(ClientError::network("offline")),
	);
	let options = InitializeOptions::remote()
		.with_streaming(true)
		.on_status_change(move |new, previous| recorded.lock().push((new, previous)));

	let result = bootstrapper
		.initialize("abc123", UserContext::anonymous(), options)
		.await;
	assert_eq!(result.status, InitStatus::Failed);
	let mut status = result.session.status_watch();

	client.emit_change(flags(&[("foo", json!(true))]));

	assert_eq!(result.session.init_status(), InitStatus::Initialized);
	assert!(result.session.init_succeeded());
	assert_eq!(result.session.init_error(), None);
	assert_eq!(result.session.get("foo", None), Some(json!(true)));
	assert_eq!(
		*transitions.lock(),
		vec![(InitStatus::Initialized, InitStatus::Failed)]
	);
	assert!(status.has_changed().unwrap());
	assert_eq!(*status.borrow_and_update(), InitStatus::Initialized);

	client.emit_change(flags(&[("foo", json!(false))]));
	assert_eq!(transitions.lock().len(), 1);
}

#[tokio::test]
async fn test_change_recovers_even_when_filtered() {
	let (bootstrapper, client, _factory) = remote(
		FakeRemoteClient::new(FlagSet::new()).with_failing_init(ClientError::network("offline")),
	);

	let result = bootstrapper
		.initialize("abc123", UserContext::anonymous(), InitializeOptions::remote())
		.await;
	client.emit_change(flags(&[("foo", json!(true))]));

	assert_eq!(result.session.init_status(), InitStatus::Initialized);
	assert_eq!(result.session.get("foo", None), None);
}

#[tokio::test]
async fn test_streaming_policy_filters_changes() {
	let (bootstrapper, client, _factory) = remote(FakeRemoteClient::new(flags(&[
		("a", json!(0)),
		("b", json!(0)),
	])));
	let options = InitializeOptions::remote().with_streaming(StreamingFlags::all_except(["b"]));

	let result = bootstrapper
		.initialize("abc123", UserContext::anonymous(), options)
		.await;
	let mut changes = result.session.subscribe();

	client.emit_change(flags(&[("a", json!(1)), ("b", json!(1)), ("c", json!(1))]));

	let session = &result.session;
	assert_eq!(session.get("a", None), Some(json!(1)));
	assert_eq!(session.get("b", None), Some(json!(0)));
	assert_eq!(session.get("c", None), Some(json!(1)));
	assert!(changes.try_recv().is_ok());
}

#[tokio::test]
async fn test_streaming_disabled_by_default() {
	let (bootstrapper, client, _factory) =
		remote(FakeRemoteClient::new(flags(&[("a", json!(0))])));

	let result = bootstrapper
		.initialize("abc123", UserContext::anonymous(), InitializeOptions::remote())
		.await;
	client.emit_change(flags(&[("a", json!(1))]));

	assert_eq!(result.session.get("a", None), Some(json!(0)));
}

#[tokio::test]
async fn test_runtime_errors_reach_callback() {
	let errors = Arc::new(Mutex::new(Vec::new()));
	let recorded = Arc::clone(&errors);
	let (bootstrapper, client, _factory) = remote(FakeRemoteClient::new(FlagSet::new()));
	let options =
		InitializeOptions::remote().on_error(move |e: &ClientError| recorded.lock().push(e.clone()));

	let result = bootstrapper
		.initialize("abc123", UserContext::anonymous(), options)
		.await;
	client.emit_error(ClientError::network("stream dropped"));

	assert_eq!(*errors.lock(), vec![ClientError::network("stream dropped")]);
	assert_eq!(
		result.session.last_error(),
		Some(ClientError::network("stream dropped"))
	);
	assert_eq!(result.session.init_status(), InitStatus::Initialized);
}

#[tokio::test]
async fn test_initialize_is_idempotent() {
	let (bootstrapper, _client, factory) = remote(FakeRemoteClient::new(FlagSet::new()));

	let first = bootstrapper
		.initialize("abc123", UserContext::anonymous(), InitializeOptions::remote())
		.await;
	let second = bootstrapper
		.initialize(
			"other",
			UserContext::anonymous(),
			InitializeOptions::local(flags(&[("foo", json!(true))])),
		)
		.await;

	assert!(Arc::ptr_eq(&first.session, &second.session));
	assert_eq!(second.status, InitStatus::Initialized);
	assert_eq!(factory.calls().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_initialize_registers_one_session() {
	let gate = Arc::new(Barrier::new(2));
	let first_client = Arc::new(FakeRemoteClient::new(FlagSet::new()).with_init_gate(gate.clone()));
	let second_client = Arc::new(FakeRemoteClient::new(FlagSet::new()).with_init_gate(gate));
	let factory = Arc::new(FakeClientFactory::sequence(vec![
		Arc::clone(&first_client),
		Arc::clone(&second_client),
	]));
	let bootstrapper = Bootstrapper::new(SessionRegistry::in_memory(), factory.clone());

	let spawn_initialize = |bootstrapper: Bootstrapper| {
		tokio::spawn(async move {
			bootstrapper
				.initialize("abc123", UserContext::anonymous(), InitializeOptions::remote())
				.await
		})
	};
	let a = spawn_initialize(bootstrapper.clone());
	let b = spawn_initialize(bootstrapper.clone());
	let a = a.await.unwrap();
	let b = b.await.unwrap();

	assert_eq!(factory.calls().len(), 2);
	assert!(Arc::ptr_eq(&a.session, &b.session));
	let current = bootstrapper.registry().current().unwrap();
	assert!(Arc::ptr_eq(&current, &a.session));

	let attached = first_client.subscriber_count() + second_client.subscriber_count();
	assert_eq!(attached, 2, "only the registered session listens to its client");

	tokio::time::timeout(Duration::from_secs(5), async {
		while first_client.close_calls() + second_client.close_calls() == 0 {
			tokio::task::yield_now().await;
		}
	})
	.await
	.expect("discarded client was never closed");
	assert_eq!(first_client.close_calls() + second_client.close_calls(), 1);
}

#[tokio::test]
async fn test_idempotent_initialize_reports_failure() {
	let (bootstrapper, _client, _factory) = remote(
		FakeRemoteClient::new(FlagSet::new()).with_failing_init(ClientError::network("offline")),
	);

	bootstrapper
		.initialize("abc123", UserContext::anonymous(), InitializeOptions::remote())
		.await;
	let again = bootstrapper
		.initialize("abc123", UserContext::anonymous(), InitializeOptions::remote())
		.await;

	assert!(!again.is_ok);
	assert_eq!(again.status, InitStatus::Failed);
	assert_eq!(again.error, Some(ClientError::network("offline")));
}

#[tokio::test]
async fn test_destroy_then_reinitialize() {
	let (bootstrapper, client, factory) = remote(FakeRemoteClient::new(FlagSet::new()));

	let first = bootstrapper
		.initialize("abc123", UserContext::anonymous(), InitializeOptions::remote())
		.await;
	first.session.destroy(CloseOptions::default()).await.unwrap();

	assert!(!bootstrapper.registry().has_current());
	assert_eq!(client.close_calls(), 1);
	assert_eq!(client.subscriber_count(), 0);

	let second = bootstrapper
		.initialize("abc123", UserContext::anonymous(), InitializeOptions::remote())
		.await;
	assert!(!Arc::ptr_eq(&first.session, &second.session));
	assert_eq!(factory.calls().len(), 2);
}

#[tokio::test]
async fn test_close_keeps_registry_slot() {
	let (bootstrapper, client, _factory) = remote(FakeRemoteClient::new(FlagSet::new()));

	let result = bootstrapper
		.initialize("abc123", UserContext::anonymous(), InitializeOptions::remote())
		.await;
	result.session.close(CloseOptions::default()).await.unwrap();

	assert!(bootstrapper.registry().has_current());
	assert_eq!(client.subscriber_count(), 0);
}

#[tokio::test]
async fn test_destroy_leaves_newer_session() {
	let registry = SessionRegistry::in_memory();
	let bootstrapper = Bootstrapper::local_only(registry.clone());

	let stale = bootstrapper
		.initialize("", UserContext::anonymous(), InitializeOptions::default())
		.await;
	registry.clear_current();
	let fresh = bootstrapper
		.initialize("", UserContext::anonymous(), InitializeOptions::default())
		.await;

	stale.session.destroy(CloseOptions::default()).await.unwrap();

	assert!(Arc::ptr_eq(&registry.current().unwrap(), &fresh.session));
}

#[tokio::test]
async fn test_identify_before_initialize() {
	let bootstrapper = Bootstrapper::local_only(SessionRegistry::in_memory());

	let result = bootstrapper.identify(UserContext::new("user123"), None).await;

	assert!(!result.is_ok);
	let error = result.error.unwrap();
	assert!(matches!(error, FlagsError::NotInitialized { .. }));
	assert!(error.to_string().contains("not been initialized"));
}

#[tokio::test]
async fn test_identify_after_remote_initialize() {
	let (bootstrapper, client, _factory) = remote(
		FakeRemoteClient::new(flags(&[("foo", json!(true))]))
			.with_identify_result(Ok(flags(&[("foo", json!(false)), ("bar", json!(1))]))),
	);

	let result = bootstrapper
		.initialize("abc123", UserContext::new("user123"), InitializeOptions::remote())
		.await;
	let identified = bootstrapper
		.identify(UserContext::new("user456"), Some("hash".to_string()))
		.await;

	assert!(identified.is_ok);
	assert_eq!(
		result.session.all_flags(),
		flags(&[("foo", json!(false)), ("bar", json!(1))])
	);
	assert_eq!(client.context().key(), Some("user456"));
}

#[tokio::test]
async fn test_variation_before_and_after_initialize() {
	let (bootstrapper, client, _factory) =
		remote(FakeRemoteClient::new(flags(&[("foo", json!("on"))])));

	assert_eq!(bootstrapper.variation("foo", Some(json!("off"))), Some(json!("off")));

	bootstrapper
		.initialize("abc123", UserContext::anonymous(), InitializeOptions::remote())
		.await;

	assert_eq!(bootstrapper.variation("foo", Some(json!("off"))), Some(json!("on")));
	assert_eq!(client.evaluated_keys(), vec!["foo".to_string()]);
}

#[tokio::test]
async fn test_forced_destroy_returns_without_waiting() {
	let (bootstrapper, client, _factory) =
		remote(FakeRemoteClient::new(FlagSet::new()).with_hanging_close());

	let result = bootstrapper
		.initialize("abc123", UserContext::anonymous(), InitializeOptions::remote())
		.await;
	tokio::time::timeout(
		Duration::from_secs(1),
		result.session.destroy(CloseOptions::force()),
	)
	.await
	.expect("forced destroy should not wait for the client")
	.unwrap();

	assert!(!bootstrapper.registry().has_current());
	tokio::time::timeout(Duration::from_secs(1), client.wait_for_close_call())
		.await
		.expect("client close should have been requested");
}
