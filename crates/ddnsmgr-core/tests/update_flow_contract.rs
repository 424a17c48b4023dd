//! Contract Test: Update Flow
//!
//! This test verifies the detect → decide → update flow of a single run.
//!
//! Constraints verified:
//! - Stale domains are batched and pushed with one init and one update call
//! - The cached address advances after a clean run
//! - The "address unchanged" fast path touches no provider unless forced
//! - IPv6 runs read the IPv6 mapping and push AAAA records
//! - Detection and resolution failures stay in their scope
//! - A provider requested twice runs once
//!
//! If this test fails, the orchestrator no longer drives providers correctly.

mod common;

use common::*;
use ddnsmgr_core::config::VersionConfig;
use ddnsmgr_core::domains::UpdateStatus;
use ddnsmgr_core::engine::EngineEvent;
use ddnsmgr_core::registry::UpdaterRegistry;
use ddnsmgr_core::traits::{CachedAddrs, IpVersion, RecordType};
use ddnsmgr_core::RunContext;
use std::sync::Arc;

#[tokio::test]
async fn changed_address_updates_both_stale_domains_once() {
    let config = ipv4_config(vec![ipv4_service(
        "alpha",
        &["a.example.com", "b.example.com"],
    )]);
    let (mut domains, store) = domain_registry(&config, cached_ipv4("1.2.3.4")).await;

    let alpha = UpdaterProbe::new();
    let mut registry = UpdaterRegistry::new();
    registry.register("alpha", alpha.factory());

    let resolver = Arc::new(
        ScriptedResolver::new()
            .publish("a.example.com", "1.2.3.4")
            .publish("b.example.com", "1.2.3.4"),
    );
    let mut harness = Harness::new(
        registry,
        Arc::new(ScriptedDetector::ipv4("1.2.3.5")),
        resolver,
        &config.engine,
    );

    let result = harness
        .engine
        .update(&RunContext::background(), &config, &mut domains, false, &[])
        .await;

    tokio_test::assert_ok!(result);
    assert_eq!(
        alpha.init_calls(),
        vec![vec!["a.example.com".to_string(), "b.example.com".to_string()]]
    );
    assert_eq!(alpha.update_calls(), vec![(RecordType::A, ip("1.2.3.5"))]);
    assert_eq!(domains.addr(IpVersion::V4), Some(ip("1.2.3.5")));
    assert_eq!(store.snapshot().await.get(IpVersion::V4), Some(ip("1.2.3.5")));
    assert!(domains.domains(IpVersion::V4)["alpha"]
        .iter()
        .all(|d| d.status() == UpdateStatus::Updated));

    let events = harness.drain_events();
    assert!(events.contains(&EngineEvent::AddressCached {
        version: IpVersion::V4,
        addr: ip("1.2.3.5"),
    }));
    assert_eq!(events.last(), Some(&EngineEvent::RunFinished { errors: 0 }));
}

#[tokio::test]
async fn unchanged_address_skips_every_provider() {
    let config = ipv4_config(vec![ipv4_service("alpha", &["a.example.com"])]);
    let (mut domains, _store) = domain_registry(&config, cached_ipv4("1.2.3.4")).await;

    let alpha = UpdaterProbe::new();
    let mut registry = UpdaterRegistry::new();
    registry.register("alpha", alpha.factory());

    let resolver = Arc::new(ScriptedResolver::new().publish("a.example.com", "9.9.9.9"));
    let mut harness = Harness::new(
        registry,
        Arc::new(ScriptedDetector::ipv4("1.2.3.4")),
        resolver.clone(),
        &config.engine,
    );

    harness
        .engine
        .update(&RunContext::background(), &config, &mut domains, false, &[])
        .await
        .expect("fast path succeeds");

    assert!(resolver.lookups().is_empty(), "fast path must not resolve");
    assert!(alpha.init_calls().is_empty());
    assert!(harness.drain_events().contains(&EngineEvent::AddressUnchanged {
        version: IpVersion::V4,
        addr: ip("1.2.3.4"),
    }));
}

#[tokio::test]
async fn force_bypasses_the_fast_path() {
    let config = ipv4_config(vec![ipv4_service("alpha", &["a.example.com"])]);
    let (mut domains, _store) = domain_registry(&config, cached_ipv4("1.2.3.4")).await;

    let alpha = UpdaterProbe::new();
    let mut registry = UpdaterRegistry::new();
    registry.register("alpha", alpha.factory());

    // The record drifted although the cached address did not change
    let resolver = Arc::new(ScriptedResolver::new().publish("a.example.com", "9.9.9.9"));
    let harness = Harness::new(
        registry,
        Arc::new(ScriptedDetector::ipv4("1.2.3.4")),
        resolver,
        &config.engine,
    );

    harness
        .engine
        .update(&RunContext::background(), &config, &mut domains, true, &[])
        .await
        .expect("forced run succeeds");

    assert_eq!(alpha.update_calls(), vec![(RecordType::A, ip("1.2.3.4"))]);
}

#[tokio::test]
async fn ipv6_reads_the_ipv6_mapping() {
    let mut config = ipv4_config(vec![
        ipv4_service("alpha", &["v4only.example.com"])
            .with_domain(IpVersion::V6, "v6.example.com"),
    ]);
    config.ipv4 = VersionConfig::default();
    config.ipv6 = VersionConfig::enabled();
    let (mut domains, store) = domain_registry(&config, CachedAddrs::default()).await;

    let alpha = UpdaterProbe::new();
    let mut registry = UpdaterRegistry::new();
    registry.register("alpha", alpha.factory());

    let resolver = Arc::new(ScriptedResolver::new().publish("v6.example.com", "2001:db8::1"));
    let harness = Harness::new(
        registry,
        Arc::new(ScriptedDetector::default().with_ipv6("2001:db8::2")),
        resolver.clone(),
        &config.engine,
    );

    harness
        .engine
        .update(&RunContext::background(), &config, &mut domains, false, &[])
        .await
        .expect("IPv6 run succeeds");

    assert_eq!(
        resolver.lookups(),
        vec![("v6.example.com".to_string(), IpVersion::V6)]
    );
    assert_eq!(alpha.init_calls(), vec![vec!["v6.example.com".to_string()]]);
    assert_eq!(alpha.update_calls(), vec![(RecordType::Aaaa, ip("2001:db8::2"))]);
    assert_eq!(store.snapshot().await.get(IpVersion::V6), Some(ip("2001:db8::2")));
    assert_eq!(domains.addr(IpVersion::V4), None);
}

#[tokio::test]
async fn each_version_defaults_to_its_own_providers() {
    let mut config = ipv4_config(vec![
        ipv4_service("alpha", &["a.example.com"]),
        ipv6_service("beta", &["b6.example.com"]),
    ]);
    config.ipv6 = VersionConfig::enabled();
    let (mut domains, _store) = domain_registry(&config, CachedAddrs::default()).await;

    let alpha = UpdaterProbe::new();
    let beta = UpdaterProbe::new();
    let mut registry = UpdaterRegistry::new();
    registry.register("alpha", alpha.factory());
    registry.register("beta", beta.factory());

    let resolver = Arc::new(
        ScriptedResolver::new()
            .publish("a.example.com", "1.1.1.1")
            .publish("b6.example.com", "2001:db8::1"),
    );
    let harness = Harness::new(
        registry,
        Arc::new(ScriptedDetector::ipv4("1.2.3.5").with_ipv6("2001:db8::2")),
        resolver,
        &config.engine,
    );

    harness
        .engine
        .update(&RunContext::background(), &config, &mut domains, false, &[])
        .await
        .expect("dual stack run succeeds");

    assert_eq!(alpha.update_calls(), vec![(RecordType::A, ip("1.2.3.5"))]);
    assert_eq!(beta.update_calls(), vec![(RecordType::Aaaa, ip("2001:db8::2"))]);
}

#[tokio::test]
async fn provider_subset_restricts_the_run() {
    let config = ipv4_config(vec![
        ipv4_service("alpha", &["a.example.com"]),
        ipv4_service("beta", &["b.example.com"]),
    ]);
    let (mut domains, _store) = domain_registry(&config, CachedAddrs::default()).await;

    let alpha = UpdaterProbe::new();
    let beta = UpdaterProbe::new();
    let mut registry = UpdaterRegistry::new();
    registry.register("alpha", alpha.factory());
    registry.register("beta", beta.factory());

    let resolver = Arc::new(
        ScriptedResolver::new()
            .publish("a.example.com", "1.1.1.1")
            .publish("b.example.com", "1.1.1.1"),
    );
    let harness = Harness::new(
        registry,
        Arc::new(ScriptedDetector::ipv4("1.2.3.5")),
        resolver,
        &config.engine,
    );

    harness
        .engine
        .update(
            &RunContext::background(),
            &config,
            &mut domains,
            false,
            &["beta".to_string()],
        )
        .await
        .expect("subset run succeeds");

    assert!(alpha.update_calls().is_empty());
    assert_eq!(beta.update_calls().len(), 1);
}

#[tokio::test]
async fn repeated_provider_name_runs_once() {
    let config = ipv4_config(vec![ipv4_service("alpha", &["a.example.com"])]);
    let (mut domains, _store) = domain_registry(&config, cached_ipv4("1.2.3.4")).await;

    let alpha = UpdaterProbe::failing(1);
    let mut registry = UpdaterRegistry::new();
    registry.register("alpha", alpha.factory());

    let mut harness = Harness::new(
        registry,
        Arc::new(ScriptedDetector::ipv4("1.2.3.5")),
        Arc::new(ScriptedResolver::new().publish("a.example.com", "1.2.3.4")),
        &config.engine,
    );

    harness
        .engine
        .update(
            &RunContext::background(),
            &config,
            &mut domains,
            false,
            &["alpha".to_string(), "alpha".to_string()],
        )
        .await
        .expect("run succeeds after one retry");

    // One batch: the immediate call plus the single retry that succeeds
    assert_eq!(alpha.init_calls().len(), 1);
    assert_eq!(alpha.update_calls().len(), 2);
    assert_eq!(retry_attempts(&harness.drain_events(), "alpha"), 1);
    assert_eq!(domains.domains(IpVersion::V4)["alpha"][0].status(), UpdateStatus::Updated);
    assert_eq!(domains.addr(IpVersion::V4), Some(ip("1.2.3.5")));
}

#[tokio::test]
async fn unresolvable_domain_is_left_out_of_the_batch() {
    let config = ipv4_config(vec![ipv4_service(
        "alpha",
        &["a.example.com", "missing.example.com"],
    )]);
    let (mut domains, _store) = domain_registry(&config, CachedAddrs::default()).await;

    let alpha = UpdaterProbe::new();
    let mut registry = UpdaterRegistry::new();
    registry.register("alpha", alpha.factory());

    let resolver = Arc::new(ScriptedResolver::new().publish("a.example.com", "1.1.1.1"));
    let harness = Harness::new(
        registry,
        Arc::new(ScriptedDetector::ipv4("1.2.3.5")),
        resolver,
        &config.engine,
    );

    let result = harness
        .engine
        .update(&RunContext::background(), &config, &mut domains, false, &[])
        .await;

    tokio_test::assert_ok!(result);
    assert_eq!(alpha.init_calls(), vec![vec!["a.example.com".to_string()]]);

    let list = &domains.domains(IpVersion::V4)["alpha"];
    assert_eq!(list[0].status(), UpdateStatus::Updated);
    assert_eq!(list[1].status(), UpdateStatus::Idle);
}

#[tokio::test]
async fn detection_failure_skips_the_version_without_error() {
    let config = ipv4_config(vec![ipv4_service("alpha", &["a.example.com"])]);
    let (mut domains, _store) = domain_registry(&config, cached_ipv4("1.2.3.4")).await;

    let alpha = UpdaterProbe::new();
    let mut registry = UpdaterRegistry::new();
    registry.register("alpha", alpha.factory());

    let mut harness = Harness::new(
        registry,
        Arc::new(ScriptedDetector::default()),
        Arc::new(ScriptedResolver::new()),
        &config.engine,
    );

    harness
        .engine
        .update(&RunContext::background(), &config, &mut domains, false, &[])
        .await
        .expect("detection failure is not fatal");

    assert!(alpha.init_calls().is_empty());
    assert_eq!(domains.addr(IpVersion::V4), Some(ip("1.2.3.4")));
    assert!(harness
        .drain_events()
        .iter()
        .any(|e| matches!(e, EngineEvent::DetectionFailed { version: IpVersion::V4, .. })));
}

#[tokio::test]
async fn disabled_versions_do_nothing() {
    let mut config = ipv4_config(vec![ipv4_service("alpha", &["a.example.com"])]);
    config.ipv4 = VersionConfig::default();
    config.notify_mode = ddnsmgr_core::NotifyMode::All;
    let (mut domains, _store) = domain_registry(&config, CachedAddrs::default()).await;

    let detector = Arc::new(ScriptedDetector::ipv4("1.2.3.5"));
    let mut harness = Harness::new(
        UpdaterRegistry::new(),
        detector.clone(),
        Arc::new(ScriptedResolver::new()),
        &config.engine,
    );

    harness
        .engine
        .update(&RunContext::background(), &config, &mut domains, false, &[])
        .await
        .expect("nothing to do");

    assert_eq!(detector.call_count(), 0);
    assert!(harness.notifier.messages().is_empty());
    assert!(harness.drain_events().is_empty());
}
