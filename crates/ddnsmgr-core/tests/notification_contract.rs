//! Contract Test: Notification Policy
//!
//! This test verifies how the outcome of a run drives webhooks and the
//! templated message.
//!
//! Constraints verified:
//! - Webhooks fire after every run when configured
//! - The message is gated by the notify mode
//! - Both channels see the same snapshot of the run
//! - Delivery failures never change the result of the run
//!
//! If this test fails, users get spammed, or miss the alerts they asked for.

mod common;

use common::*;
use ddnsmgr_core::config::{Config, NotifyMode, WebhookConfig};
use ddnsmgr_core::registry::UpdaterRegistry;
use ddnsmgr_core::traits::CachedAddrs;
use ddnsmgr_core::RunContext;
use std::sync::Arc;

/// Run once against a provider that either succeeds or fails without retry
async fn run_once(mode: NotifyMode, failing: bool, notifier: Arc<RecordingNotifier>) -> (Config, bool) {
    let mut config = ipv4_config(vec![ipv4_service("alpha", &["a.example.com"])]);
    config.engine.retry.max_retries = 0;
    config.notify_mode = mode;
    config.notify_template = "{{ipv4_addr}} changed={{ipv4_changed}} error={{error}}".to_string();
    let (mut domains, _store) = domain_registry(&config, cached_ipv4("1.2.3.4")).await;

    let alpha = if failing {
        UpdaterProbe::always_failing()
    } else {
        UpdaterProbe::new()
    };
    let mut registry = UpdaterRegistry::new();
    registry.register("alpha", alpha.factory());

    let harness = Harness::with_notifier(
        registry,
        Arc::new(ScriptedDetector::ipv4("1.2.3.5")),
        Arc::new(ScriptedResolver::new().publish("a.example.com", "1.2.3.4")),
        notifier,
        &config.engine,
    );

    let result = harness
        .engine
        .update(&RunContext::background(), &config, &mut domains, false, &[])
        .await;
    (config, result.is_err())
}

#[tokio::test]
async fn disabled_mode_never_sends_a_message() {
    for failing in [false, true] {
        let notifier = RecordingNotifier::new();
        let (_, errored) = run_once(NotifyMode::Disabled, failing, notifier.clone()).await;
        assert_eq!(errored, failing);
        assert!(notifier.messages().is_empty());
    }
}

#[tokio::test]
async fn if_error_mode_sends_only_on_error() {
    let notifier = RecordingNotifier::new();
    run_once(NotifyMode::IfError, false, notifier.clone()).await;
    assert!(notifier.messages().is_empty());

    let notifier = RecordingNotifier::new();
    run_once(NotifyMode::IfError, true, notifier.clone()).await;
    let messages = notifier.messages();
    assert_eq!(messages.len(), 1);
    // The failed version keeps the old address in the snapshot
    assert!(messages[0].1.starts_with("1.2.3.4 changed=false error=[alpha] 1.2.3.5"));
}

#[tokio::test]
async fn all_mode_always_sends() {
    for failing in [false, true] {
        let notifier = RecordingNotifier::new();
        run_once(NotifyMode::All, failing, notifier.clone()).await;
        assert_eq!(notifier.messages().len(), 1);
    }

    let notifier = RecordingNotifier::new();
    run_once(NotifyMode::All, false, notifier.clone()).await;
    assert_eq!(notifier.messages()[0].1, "1.2.3.5 changed=true error=");
}

#[tokio::test]
async fn webhooks_fire_regardless_of_mode_and_share_the_snapshot() {
    let mut config = ipv4_config(vec![ipv4_service("alpha", &["a.example.com"])]);
    config.webhooks = vec![WebhookConfig::new("https://hooks.example.com/ddns")];
    config.notify_mode = NotifyMode::All;
    let (mut domains, _store) = domain_registry(&config, CachedAddrs::default()).await;

    let alpha = UpdaterProbe::new();
    let mut registry = UpdaterRegistry::new();
    registry.register("alpha", alpha.factory());

    let harness = Harness::new(
        registry,
        Arc::new(ScriptedDetector::ipv4("1.2.3.5")),
        Arc::new(ScriptedResolver::new().publish("a.example.com", "1.2.3.4")),
        &config.engine,
    );

    harness
        .engine
        .update(&RunContext::background(), &config, &mut domains, false, &[])
        .await
        .expect("run succeeds");

    let webhooks = harness.notifier.webhooks();
    let messages = harness.notifier.messages();
    assert_eq!(webhooks.len(), 1);
    assert_eq!(messages.len(), 1);
    assert_eq!(webhooks[0], messages[0].0);

    let tags = &webhooks[0];
    assert_eq!(tags.ipv4_addr, Some("1.2.3.5".parse().unwrap()));
    assert_eq!(tags.ipv4_domains, vec!["a.example.com"]);
    assert!(tags.ipv4_changed);
    assert!(!tags.ipv6_changed);
    assert_eq!(tags.error, None);
}

#[tokio::test]
async fn webhook_fires_with_disabled_messages() {
    let notifier = RecordingNotifier::new();
    let mut config = ipv4_config(vec![ipv4_service("alpha", &["a.example.com"])]);
    config.webhooks = vec![WebhookConfig::new("https://hooks.example.com/ddns")];
    let (mut domains, _store) = domain_registry(&config, CachedAddrs::default()).await;

    let harness = Harness::with_notifier(
        UpdaterRegistry::new(),
        Arc::new(ScriptedDetector::ipv4("1.2.3.5")),
        Arc::new(ScriptedResolver::new()),
        notifier.clone(),
        &config.engine,
    );

    harness
        .engine
        .update(&RunContext::background(), &config, &mut domains, false, &[])
        .await
        .expect("run succeeds");

    assert_eq!(notifier.webhooks().len(), 1);
    assert!(notifier.messages().is_empty());
}

#[tokio::test]
async fn delivery_failures_do_not_change_the_result() {
    let notifier = RecordingNotifier::failing();
    let mut config = ipv4_config(vec![ipv4_service("alpha", &["a.example.com"])]);
    config.webhooks = vec![WebhookConfig::new("https://hooks.example.com/ddns")];
    config.notify_mode = NotifyMode::All;
    let (mut domains, _store) = domain_registry(&config, CachedAddrs::default()).await;

    let alpha = UpdaterProbe::new();
    let mut registry = UpdaterRegistry::new();
    registry.register("alpha", alpha.factory());

    let harness = Harness::with_notifier(
        registry,
        Arc::new(ScriptedDetector::ipv4("1.2.3.5")),
        Arc::new(ScriptedResolver::new().publish("a.example.com", "1.2.3.4")),
        notifier.clone(),
        &config.engine,
    );

    let result = harness
        .engine
        .update(&RunContext::background(), &config, &mut domains, false, &[])
        .await;

    tokio_test::assert_ok!(result);
    assert_eq!(notifier.webhooks().len(), 1);
    assert_eq!(notifier.messages().len(), 1);
}
