//! Minimal embedding example for ddnsmgr-core
//!
//! Wires a `DdnsEngine` with custom collaborators and an `UpdaterRegistry`,
//! then runs two updates: the first pushes the new address, the second hits
//! the "address unchanged" fast path. No network access is needed.

use async_trait::async_trait;
use ddnsmgr_core::config::{DetectionConfig, VersionConfig, WebhookConfig};
use ddnsmgr_core::traits::CachedAddrs;
use ddnsmgr_core::{
    Config, DdnsEngine, Detector, Domain, DomainRegistry, IpVersion, MemoryAddrStore, Notifier,
    RecordType, Resolver, Result, RunContext, ServiceConfig, TagValues, Updater, UpdaterRegistry,
};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

/// Detector reporting a fixed public address
struct FixedDetector(Ipv4Addr);

#[async_trait]
impl Detector for FixedDetector {
    async fn detect_ipv4(&self, _config: &DetectionConfig) -> Result<Ipv4Addr> {
        Ok(self.0)
    }

    async fn detect_ipv6(&self, _config: &DetectionConfig) -> Result<Ipv6Addr> {
        Err(ddnsmgr_core::Error::detection("IPv6 not available"))
    }
}

/// Resolver claiming every record still holds the old address
struct StaleResolver(IpAddr);

#[async_trait]
impl Resolver for StaleResolver {
    async fn resolve(&self, _domain: &str, _strategy: Option<&str>, _version: IpVersion) -> Result<IpAddr> {
        Ok(self.0)
    }
}

/// Updater printing what it would push
#[derive(Default)]
struct PrintingUpdater {
    domains: Vec<String>,
}

#[async_trait]
impl Updater for PrintingUpdater {
    fn init(&mut self, _settings: &serde_json::Value, domains: &[Domain]) -> Result<()> {
        self.domains = domains.iter().map(|d| d.name().to_string()).collect();
        Ok(())
    }

    async fn update(&self, _ctx: &RunContext, record_type: RecordType, addr: IpAddr) -> Result<()> {
        for domain in &self.domains {
            println!("[Embedded] {} {} -> {}", record_type, domain, addr);
        }
        Ok(())
    }
}

/// Notifier writing to stdout
struct StdoutNotifier;

#[async_trait]
impl Notifier for StdoutNotifier {
    async fn dispatch_webhooks(&self, webhooks: &[WebhookConfig], payload: &TagValues) -> Result<()> {
        for webhook in webhooks {
            println!("[Webhook] {} <- {}", webhook.url, serde_json::to_string(payload)?);
        }
        Ok(())
    }

    async fn send_message(&self, payload: &TagValues, template: &str) -> Result<()> {
        println!("[Message] {}", payload.render(template));
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    println!("=== Embedded ddnsmgr-core Example ===\n");

    let config = Config {
        ipv4: VersionConfig::enabled(),
        dns_services: vec![
            ServiceConfig::new("embedded")
                .with_domain(IpVersion::V4, "home.example.com")
                .with_domain(IpVersion::V4, "nas.example.com"),
        ],
        notify_mode: ddnsmgr_core::NotifyMode::All,
        notify_template: "IPv4 {{ipv4_addr}} changed={{ipv4_changed}}".to_string(),
        ..Config::default()
    };
    config.validate()?;

    // Updaters are created per run from a registered factory
    let mut registry = UpdaterRegistry::new();
    registry.register("embedded", || Box::new(PrintingUpdater::default()) as Box<dyn Updater>);

    let store = MemoryAddrStore::with_addrs(CachedAddrs {
        ipv4_addr: Some(Ipv4Addr::new(198, 51, 100, 1)),
        ..CachedAddrs::default()
    });
    let mut domains = DomainRegistry::from_config(&config, Arc::new(store.clone())).await?;

    println!("1. Creating engine...");
    let (engine, mut events) = DdnsEngine::new(
        Arc::new(registry),
        Arc::new(FixedDetector(Ipv4Addr::new(203, 0, 113, 9))),
        Arc::new(StaleResolver(IpAddr::from([198, 51, 100, 1]))),
        Arc::new(StdoutNotifier),
        &config.engine,
    )?;

    let listener = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            println!("[Event] {:?}", event);
        }
    });

    // The application owns cancellation; nothing cancels in this example
    let (ctx, _cancel) = RunContext::new();

    println!("2. First run (address changed)...");
    engine.update(&ctx, &config, &mut domains, false, &[]).await?;

    println!("\n3. Second run (fast path)...");
    engine.update(&ctx, &config, &mut domains, false, &[]).await?;

    drop(engine);
    let _ = listener.await;

    println!("\n4. Cached address: {:?}", store.snapshot().await.ipv4_addr);
    println!("\n=== Embedding Successful ===");

    Ok(())
}
