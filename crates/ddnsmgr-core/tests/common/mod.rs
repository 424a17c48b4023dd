//! Test doubles and common utilities for contract tests
//!
//! The doubles are scripted (answers fixed up front) and record every call,
//! so tests can assert on what the engine asked its collaborators to do.

#![allow(dead_code)]

use async_trait::async_trait;
use ddnsmgr_core::config::{Config, DetectionConfig, EngineConfig, RetryConfig, ServiceConfig, VersionConfig, WebhookConfig};
use ddnsmgr_core::context::RunContext;
use ddnsmgr_core::domains::{Domain, DomainRegistry};
use ddnsmgr_core::engine::{DdnsEngine, EngineEvent};
use ddnsmgr_core::error::{Error, Result};
use ddnsmgr_core::notify::TagValues;
use ddnsmgr_core::registry::UpdaterRegistry;
use ddnsmgr_core::state::MemoryAddrStore;
use ddnsmgr_core::traits::{CachedAddrs, Detector, IpVersion, Notifier, RecordType, Resolver, Updater};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Parse an address literal
pub fn ip(s: &str) -> IpAddr {
    s.parse().expect("valid address literal")
}

/// A detector returning fixed addresses (`None` = detection fails)
#[derive(Default)]
pub struct ScriptedDetector {
    ipv4: Option<Ipv4Addr>,
    ipv6: Option<Ipv6Addr>,
    calls: AtomicUsize,
}

impl ScriptedDetector {
    pub fn ipv4(addr: &str) -> Self {
        Self {
            ipv4: Some(addr.parse().expect("valid IPv4 literal")),
            ..Self::default()
        }
    }

    pub fn with_ipv6(mut self, addr: &str) -> Self {
        self.ipv6 = Some(addr.parse().expect("valid IPv6 literal"));
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Detector for ScriptedDetector {
    async fn detect_ipv4(&self, _config: &DetectionConfig) -> Result<Ipv4Addr> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.ipv4
            .ok_or_else(|| Error::detection("no IPv4 address scripted"))
    }

    async fn detect_ipv6(&self, _config: &DetectionConfig) -> Result<Ipv6Addr> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.ipv6
            .ok_or_else(|| Error::detection("no IPv6 address scripted"))
    }
}

/// A resolver answering from a fixed table; unknown domains fail to resolve
#[derive(Default)]
pub struct ScriptedResolver {
    published: HashMap<(String, IpVersion), IpAddr>,
    lookups: Mutex<Vec<(String, IpVersion)>>,
}

impl ScriptedResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the address a domain publishes (version taken from the address)
    pub fn publish(mut self, domain: &str, addr: &str) -> Self {
        let addr = ip(addr);
        self.published
            .insert((domain.to_string(), IpVersion::of(&addr)), addr);
        self
    }

    pub fn lookups(&self) -> Vec<(String, IpVersion)> {
        self.lookups.lock().unwrap().clone()
    }
}

#[async_trait]
impl Resolver for ScriptedResolver {
    async fn resolve(&self, domain: &str, _strategy: Option<&str>, version: IpVersion) -> Result<IpAddr> {
        self.lookups
            .lock()
            .unwrap()
            .push((domain.to_string(), version));
        self.published
            .get(&(domain.to_string(), version))
            .copied()
            .ok_or_else(|| Error::resolution(domain, "no such record"))
    }
}

/// Shared view of every updater created from one factory
#[derive(Default)]
pub struct UpdaterProbe {
    inits: Mutex<Vec<Vec<String>>>,
    updates: Mutex<Vec<(RecordType, IpAddr)>>,
    failures_left: AtomicUsize,
    fail_init: AtomicBool,
}

impl UpdaterProbe {
    /// Updaters that always succeed
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Updaters whose first `n` update calls fail
    pub fn failing(n: usize) -> Arc<Self> {
        let probe = Self::default();
        probe.failures_left.store(n, Ordering::SeqCst);
        Arc::new(probe)
    }

    /// Updaters whose every update call fails
    pub fn always_failing() -> Arc<Self> {
        Self::failing(usize::MAX)
    }

    /// Updaters rejecting their settings
    pub fn failing_init() -> Arc<Self> {
        let probe = Self::default();
        probe.fail_init.store(true, Ordering::SeqCst);
        Arc::new(probe)
    }

    /// Domain names of every init call
    pub fn init_calls(&self) -> Vec<Vec<String>> {
        self.inits.lock().unwrap().clone()
    }

    /// Arguments of every update call
    pub fn update_calls(&self) -> Vec<(RecordType, IpAddr)> {
        self.updates.lock().unwrap().clone()
    }

    /// Factory creating updaters that report to this probe
    pub fn factory(self: &Arc<Self>) -> impl Fn() -> Box<dyn Updater> + Send + Sync + 'static {
        let probe = Arc::clone(self);
        move || {
            Box::new(ProbeUpdater {
                probe: Arc::clone(&probe),
            }) as Box<dyn Updater>
        }
    }
}

struct ProbeUpdater {
    probe: Arc<UpdaterProbe>,
}

#[async_trait]
impl Updater for ProbeUpdater {
    fn init(&mut self, _settings: &serde_json::Value, domains: &[Domain]) -> Result<()> {
        self.probe
            .inits
            .lock()
            .unwrap()
            .push(domains.iter().map(|d| d.name().to_string()).collect());
        if self.probe.fail_init.load(Ordering::SeqCst) {
            return Err(Error::config("missing api token"));
        }
        Ok(())
    }

    async fn update(&self, _ctx: &RunContext, record_type: RecordType, addr: IpAddr) -> Result<()> {
        self.probe.updates.lock().unwrap().push((record_type, addr));
        let failing = self
            .probe
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(Error::http("503 Service Unavailable"));
        }
        Ok(())
    }
}

/// A notifier recording what it was asked to deliver
#[derive(Default)]
pub struct RecordingNotifier {
    webhooks: Mutex<Vec<TagValues>>,
    messages: Mutex<Vec<(TagValues, String)>>,
    fail: AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        let notifier = Self::default();
        notifier.fail.store(true, Ordering::SeqCst);
        Arc::new(notifier)
    }

    pub fn webhooks(&self) -> Vec<TagValues> {
        self.webhooks.lock().unwrap().clone()
    }

    pub fn messages(&self) -> Vec<(TagValues, String)> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn dispatch_webhooks(&self, _webhooks: &[WebhookConfig], payload: &TagValues) -> Result<()> {
        self.webhooks.lock().unwrap().push(payload.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::notify("webhook endpoint unreachable"));
        }
        Ok(())
    }

    async fn send_message(&self, payload: &TagValues, template: &str) -> Result<()> {
        self.messages
            .lock()
            .unwrap()
            .push((payload.clone(), payload.render(template)));
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::notify("message endpoint unreachable"));
        }
        Ok(())
    }
}

/// Engine settings with instant retries, so tests never sleep
pub fn fast_engine_config() -> EngineConfig {
    EngineConfig {
        retry: RetryConfig {
            max_retries: 3,
            initial_delay_ms: 0,
            max_delay_ms: 0,
            ..RetryConfig::default()
        },
        event_channel_capacity: 100,
        ..EngineConfig::default()
    }
}

/// Configuration with only IPv4 enabled
pub fn ipv4_config(services: Vec<ServiceConfig>) -> Config {
    Config {
        ipv4: VersionConfig::enabled(),
        dns_services: services,
        engine: fast_engine_config(),
        ..Config::default()
    }
}

/// A service owning the given IPv4 domains
pub fn ipv4_service(provider: &str, domains: &[&str]) -> ServiceConfig {
    domains.iter().fold(ServiceConfig::new(provider), |service, d| {
        service.with_domain(IpVersion::V4, *d)
    })
}

/// A service owning the given IPv6 domains
pub fn ipv6_service(provider: &str, domains: &[&str]) -> ServiceConfig {
    domains.iter().fold(ServiceConfig::new(provider), |service, d| {
        service.with_domain(IpVersion::V6, *d)
    })
}

/// Build a domain registry from `config`, seeded with cached addresses
pub async fn domain_registry(config: &Config, cached: CachedAddrs) -> (DomainRegistry, MemoryAddrStore) {
    let store = MemoryAddrStore::with_addrs(cached);
    let registry = DomainRegistry::from_config(config, Arc::new(store.clone()))
        .await
        .expect("domain registry builds");
    (registry, store)
}

/// Cached addresses with only IPv4 set
pub fn cached_ipv4(addr: &str) -> CachedAddrs {
    CachedAddrs {
        ipv4_addr: Some(addr.parse().expect("valid IPv4 literal")),
        ..CachedAddrs::default()
    }
}

/// Engine wired to scripted collaborators
pub struct Harness {
    pub engine: DdnsEngine,
    pub events: mpsc::Receiver<EngineEvent>,
    pub notifier: Arc<RecordingNotifier>,
}

impl Harness {
    pub fn new(
        registry: UpdaterRegistry,
        detector: Arc<ScriptedDetector>,
        resolver: Arc<ScriptedResolver>,
        engine_config: &EngineConfig,
    ) -> Self {
        Self::with_notifier(registry, detector, resolver, RecordingNotifier::new(), engine_config)
    }

    pub fn with_notifier(
        registry: UpdaterRegistry,
        detector: Arc<ScriptedDetector>,
        resolver: Arc<ScriptedResolver>,
        notifier: Arc<RecordingNotifier>,
        engine_config: &EngineConfig,
    ) -> Self {
        let (engine, events) = DdnsEngine::new(
            Arc::new(registry),
            detector,
            resolver,
            notifier.clone(),
            engine_config,
        )
        .expect("engine construction succeeds");

        Self {
            engine,
            events,
            notifier,
        }
    }

    /// Every event emitted so far
    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

/// Number of retry attempts among `events`
pub fn retry_attempts(events: &[EngineEvent], provider: &str) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, EngineEvent::RetryAttempt { provider: p, .. } if p == provider))
        .count()
}
