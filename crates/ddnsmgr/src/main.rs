// # ddnsmgr - one-shot DDNS update runner
//
// Thin integration layer: reads the environment and the JSON configuration,
// wires the HTTP detector, DNS resolver, HTTP notifier and registered
// updaters into a `DdnsEngine`, runs exactly one update and exits. Scheduling
// is left to cron or a systemd timer.
//
// ## Environment
//
// - `DDNS_CONFIG`: Path to the JSON configuration (required)
// - `DDNS_STATE_PATH`: Address cache file (default `/var/lib/ddnsmgr/state.json`)
// - `DDNS_FORCE`: Bypass the "address unchanged" fast path (`1`, `true`, `yes`)
// - `DDNS_PROVIDERS`: Comma-separated providers to run (default: all)
// - `DDNS_TIMEOUT_SECS`: Deadline for the whole run; cancels it when reached
// - `DDNS_LOG_LEVEL`: trace, debug, info, warn or error (default info)
// - `DDNS_MODE`: `dry-run` keeps provider plugins from changing records
//
// ## Example
//
// ```bash
// export DDNS_CONFIG=/etc/ddnsmgr/config.json
// export DDNS_STATE_PATH=/var/lib/ddnsmgr/state.json
// export DDNS_TIMEOUT_SECS=120
//
// ddnsmgr
// ```
//
// ## Exit codes
//
// - 0: Every enabled IP version was skipped or updated
// - 1: Configuration or startup error
// - 2: The run finished with errors (or was cancelled)

mod resolver;

use anyhow::{Context, Result};
use ddnsmgr_core::{DdnsEngine, DomainRegistry, FileAddrStore, RunContext, UpdaterRegistry};
use ddnsmgr_ip_http::HttpDetector;
use ddnsmgr_notify_http::HttpNotifier;
use resolver::DnsResolver;
use std::env;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Default location of the address cache
const DEFAULT_STATE_PATH: &str = "/var/lib/ddnsmgr/state.json";

/// Exit codes for different termination scenarios
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DdnsExitCode {
    /// The run finished without errors
    Success = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// The run returned errors
    RuntimeError = 2,
}

impl From<DdnsExitCode> for ExitCode {
    fn from(code: DdnsExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Runner settings taken from the environment
#[derive(Debug, Clone, PartialEq, Eq)]
struct Settings {
    config_path: PathBuf,
    state_path: PathBuf,
    force: bool,
    providers: Vec<String>,
    timeout: Option<Duration>,
    log_level: Level,
}

impl Settings {
    /// Load settings from environment variables
    fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load settings from any variable lookup
    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let config_path = var("DDNS_CONFIG")
            .filter(|p| !p.trim().is_empty())
            .context("DDNS_CONFIG is required. Set it via: export DDNS_CONFIG=/etc/ddnsmgr/config.json")?;

        let timeout = match var("DDNS_TIMEOUT_SECS") {
            Some(secs) => {
                let secs: u64 = secs
                    .trim()
                    .parse()
                    .with_context(|| format!("DDNS_TIMEOUT_SECS must be a number of seconds. Got: {}", secs))?;
                if secs == 0 {
                    anyhow::bail!("DDNS_TIMEOUT_SECS must be greater than zero");
                }
                Some(Duration::from_secs(secs))
            }
            None => None,
        };

        let log_level = var("DDNS_LOG_LEVEL").unwrap_or_else(|| "info".to_string());
        let log_level = match log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => anyhow::bail!(
                "DDNS_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                log_level
            ),
        };

        Ok(Self {
            config_path: PathBuf::from(config_path),
            state_path: var("DDNS_STATE_PATH")
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_PATH)),
            force: var("DDNS_FORCE").is_some_and(|v| {
                matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes")
            }),
            providers: var("DDNS_PROVIDERS")
                .unwrap_or_default()
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            timeout,
            log_level,
        })
    }
}

/// Read, parse and validate the JSON configuration
fn load_config(path: &Path) -> Result<ddnsmgr_core::Config> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read configuration {}", path.display()))?;
    let config: ddnsmgr_core::Config = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse configuration {}", path.display()))?;

    config.validate()?;
    resolver::parse_strategy(config.dns_resolver.as_deref())
        .map_err(anyhow::Error::msg)
        .context("Invalid dns_resolver")?;
    for service in &config.dns_services {
        for domain in service.ipv4_domains.iter().chain(&service.ipv6_domains) {
            validate_domain_name(domain)
                .with_context(|| format!("Invalid domain for provider {}", service.provider))?;
        }
    }

    Ok(config)
}

/// Validate that a string is a valid domain name
///
/// Basic RFC 1035 checks; catches common typos, not every invalid name.
fn validate_domain_name(domain: &str) -> Result<()> {
    let domain = domain.trim_end_matches('.');
    if domain.is_empty() {
        anyhow::bail!("Domain name cannot be empty");
    }

    if domain.len() > 253 {
        anyhow::bail!(
            "Domain name too long: {} chars (max 253). Got: {}",
            domain.len(),
            domain
        );
    }

    for label in domain.split('.') {
        if label.is_empty() {
            anyhow::bail!("Domain name has empty label: '{}'", domain);
        }

        if label.len() > 63 {
            anyhow::bail!(
                "Domain label too long: {} chars (max 63). Label: '{}'",
                label.len(),
                label
            );
        }

        // '*' is allowed for wildcard records, '_' for service labels
        if !label
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '*')
        {
            anyhow::bail!(
                "Domain label contains invalid characters. Label: '{}'. \
                Valid: alphanumeric, hyphen, underscore and wildcard only.",
                label
            );
        }

        if label.starts_with('-') || label.ends_with('-') {
            anyhow::bail!(
                "Domain label cannot start or end with hyphen. Label: '{}'",
                label
            );
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return DdnsExitCode::ConfigError.into();
        }
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(settings.log_level)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return DdnsExitCode::ConfigError.into();
    }

    let config = match load_config(&settings.config_path) {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {:#}", e);
            return DdnsExitCode::ConfigError.into();
        }
    };

    info!(
        "Loaded {} service(s) from {}",
        config.dns_services.len(),
        settings.config_path.display()
    );

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return DdnsExitCode::ConfigError.into();
        }
    };

    rt.block_on(async {
        match run(settings, config).await {
            Ok(code) => code,
            Err(e) => {
                error!("Startup error: {:#}", e);
                DdnsExitCode::ConfigError
            }
        }
    })
    .into()
}

/// Wire the engine and run exactly one update
///
/// Errors returned here are startup failures; the outcome of the update
/// itself is reported through the exit code.
async fn run(settings: Settings, config: ddnsmgr_core::Config) -> Result<DdnsExitCode> {
    #[allow(unused_mut)]
    let mut registry = UpdaterRegistry::new();

    #[cfg(feature = "cloudflare")]
    {
        info!("Registering Cloudflare updater");
        ddnsmgr_provider_cloudflare::register(&mut registry);
    }

    for service in &config.dns_services {
        if !registry.has(&service.provider) {
            warn!("No updater registered for provider {}", service.provider);
        }
    }

    let store = FileAddrStore::new(&settings.state_path)
        .await
        .with_context(|| format!("Failed to open state file {}", settings.state_path.display()))?;
    let mut domains = DomainRegistry::from_config(&config, Arc::new(store)).await?;

    let (engine, mut events) = DdnsEngine::new(
        Arc::new(registry),
        Arc::new(HttpDetector::new()),
        Arc::new(DnsResolver::new()),
        Arc::new(HttpNotifier::new(config.notify_url.clone())),
        &config.engine,
    )?;

    let event_log = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            debug!(?event, "engine event");
        }
    });

    let (ctx, handle) = RunContext::new();
    let timeout = settings.timeout;
    let watcher = tokio::spawn(async move {
        let reason = tokio::select! {
            reason = shutdown_signal() => reason,
            reason = deadline(timeout) => reason,
        };
        warn!("{} received, cancelling the update run", reason);
        handle.cancel();
    });

    let result = engine
        .update(&ctx, &config, &mut domains, settings.force, &settings.providers)
        .await;

    watcher.abort();
    drop(engine);
    let _ = event_log.await;

    match result {
        Ok(()) => {
            info!("Update run finished");
            Ok(DdnsExitCode::Success)
        }
        Err(e) => {
            error!("Update run finished with errors:\n{}", e);
            Ok(DdnsExitCode::RuntimeError)
        }
    }
}

/// Resolve when the run deadline passes; never without a deadline
async fn deadline(timeout: Option<Duration>) -> &'static str {
    match timeout {
        Some(duration) => {
            tokio::time::sleep(duration).await;
            "Deadline"
        }
        None => std::future::pending().await,
    }
}

/// Wait for SIGTERM or SIGINT
#[cfg(unix)]
async fn shutdown_signal() -> &'static str {
    let (mut sigterm, mut sigint) = match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
        (Err(e), _) | (_, Err(e)) => {
            warn!("Failed to setup signal handlers: {}", e);
            return std::future::pending().await;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    }
}

/// Wait for CTRL-C
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn shutdown_signal() -> &'static str {
    match tokio::signal::ctrl_c().await {
        Ok(()) => "SIGINT",
        Err(e) => {
            warn!("Failed to wait for CTRL-C: {}", e);
            std::future::pending().await
        }
    }
}
