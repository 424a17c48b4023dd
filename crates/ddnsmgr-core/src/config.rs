//! Configuration types for the DDNS manager
//!
//! The configuration is owned by the caller (loaded from external storage)
//! and passed by reference into every run. This module only defines the
//! schema, defaults and validation.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

use crate::traits::IpVersion;

/// Main DDNS manager configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// IPv4 settings
    #[serde(default)]
    pub ipv4: VersionConfig,

    /// IPv6 settings
    #[serde(default)]
    pub ipv6: VersionConfig,

    /// Resolver strategy selector (`None` = system resolver, otherwise a nameserver)
    #[serde(default)]
    pub dns_resolver: Option<String>,

    /// DNS services, one per provider, in configuration order
    #[serde(default)]
    pub dns_services: Vec<ServiceConfig>,

    /// Webhooks fired after every run
    #[serde(default)]
    pub webhooks: Vec<WebhookConfig>,

    /// When to send the templated notification message
    #[serde(default)]
    pub notify_mode: NotifyMode,

    /// Template of the notification message
    #[serde(default)]
    pub notify_template: String,

    /// Endpoint messages are delivered to (notifier specific)
    #[serde(default)]
    pub notify_url: Option<String>,

    /// Engine behaviour
    #[serde(default)]
    pub engine: EngineConfig,
}

impl Config {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Settings for one IP version
    pub fn version(&self, version: IpVersion) -> &VersionConfig {
        match version {
            IpVersion::V4 => &self.ipv4,
            IpVersion::V6 => &self.ipv6,
        }
    }

    /// Find the service configuration of a provider
    pub fn find_service(&self, provider: &str) -> Option<&ServiceConfig> {
        self.dns_services.iter().find(|s| s.provider == provider)
    }

    /// Whether any webhook is configured
    pub fn has_webhook(&self) -> bool {
        !self.webhooks.is_empty()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        let mut providers = HashSet::new();
        let mut owners: HashMap<(IpVersion, &str), &str> = HashMap::new();

        for service in &self.dns_services {
            if service.provider.trim().is_empty() {
                return Err(crate::Error::config("DNS service provider name cannot be empty"));
            }
            if !providers.insert(service.provider.as_str()) {
                return Err(crate::Error::config(format!(
                    "DNS service configured twice: {}",
                    service.provider
                )));
            }

            for version in IpVersion::ALL {
                for domain in service.domains(version) {
                    if domain.trim().is_empty() {
                        return Err(crate::Error::config(format!(
                            "Empty {} domain configured for {}",
                            version, service.provider
                        )));
                    }
                    if let Some(owner) = owners.insert((version, domain.as_str()), &service.provider) {
                        return Err(crate::Error::config(format!(
                            "{} domain {} is claimed by both {} and {}",
                            version, domain, owner, service.provider
                        )));
                    }
                }
            }
        }

        for webhook in &self.webhooks {
            webhook.validate()?;
        }

        self.engine.validate()
    }
}

/// Per IP version settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VersionConfig {
    /// Whether this IP version is synchronised
    #[serde(default)]
    pub enabled: bool,

    /// How the public address is detected
    #[serde(default)]
    pub detection: DetectionConfig,
}

impl VersionConfig {
    /// An enabled version with default detection
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            detection: DetectionConfig::default(),
        }
    }
}

/// Public address detection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Endpoints queried in order; empty means detector defaults
    #[serde(default)]
    pub urls: Vec<String>,

    /// Per request timeout (in seconds)
    #[serde(default = "default_detection_timeout_secs")]
    pub timeout_secs: u64,
}

impl DetectionConfig {
    /// Request timeout as a duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            urls: Vec::new(),
            timeout_secs: default_detection_timeout_secs(),
        }
    }
}

fn default_detection_timeout_secs() -> u64 {
    10
}

/// One DNS service (provider) and the records it owns
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Provider name, used to look up the updater
    pub provider: String,

    /// Opaque provider settings handed to `Updater::init`
    #[serde(default)]
    pub settings: serde_json::Value,

    /// A records managed by this provider
    #[serde(default)]
    pub ipv4_domains: Vec<String>,

    /// AAAA records managed by this provider
    #[serde(default)]
    pub ipv6_domains: Vec<String>,
}

impl ServiceConfig {
    /// Create a service without settings or domains
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            settings: serde_json::Value::Null,
            ipv4_domains: Vec::new(),
            ipv6_domains: Vec::new(),
        }
    }

    /// Set the provider settings
    pub fn with_settings(mut self, settings: serde_json::Value) -> Self {
        self.settings = settings;
        self
    }

    /// Add a domain for an IP version
    pub fn with_domain(mut self, version: IpVersion, domain: impl Into<String>) -> Self {
        match version {
            IpVersion::V4 => self.ipv4_domains.push(domain.into()),
            IpVersion::V6 => self.ipv6_domains.push(domain.into()),
        }
        self
    }

    /// Domains configured for an IP version
    pub fn domains(&self, version: IpVersion) -> &[String] {
        match version {
            IpVersion::V4 => &self.ipv4_domains,
            IpVersion::V6 => &self.ipv6_domains,
        }
    }
}

/// Webhook target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Display name (for logs)
    #[serde(default)]
    pub name: String,

    /// Target URL; may contain `{{tag}}` placeholders
    pub url: String,

    /// HTTP method
    #[serde(default = "default_webhook_method")]
    pub method: String,

    /// Extra request headers
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Body template; `None` sends the tag values as JSON
    #[serde(default)]
    pub body: Option<String>,
}

impl WebhookConfig {
    /// Create a POST webhook with the default JSON body
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            name: String::new(),
            url: url.into(),
            method: default_webhook_method(),
            headers: BTreeMap::new(),
            body: None,
        }
    }

    /// Validate the webhook configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.url.trim().is_empty() {
            return Err(crate::Error::config("Webhook URL cannot be empty"));
        }
        if self.method.trim().is_empty() {
            return Err(crate::Error::config(format!(
                "Webhook method cannot be empty ({})",
                self.url
            )));
        }
        Ok(())
    }
}

fn default_webhook_method() -> String {
    "POST".to_string()
}

/// When the templated notification message is sent
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyMode {
    /// Never send
    #[default]
    Disabled,
    /// Send only when the run returned an error
    IfError,
    /// Send after every run
    All,
}

impl NotifyMode {
    /// Whether a message goes out given the run outcome
    pub fn should_send(self, has_error: bool) -> bool {
        match self {
            NotifyMode::Disabled => false,
            NotifyMode::IfError => has_error,
            NotifyMode::All => true,
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Retry policy for failed record updates
    #[serde(default)]
    pub retry: RetryConfig,

    /// Capacity of the engine event channel
    ///
    /// When full, new events are dropped (with a warning log).
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// What makes a version count as changed (and advance the cached address)
    #[serde(default)]
    pub change_policy: ChangePolicy,

    /// What to do with a provider that has no registered updater
    #[serde(default)]
    pub unknown_provider: UnknownProviderPolicy,
}

impl EngineConfig {
    /// Validate the engine configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        self.retry.validate()
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            event_channel_capacity: default_event_channel_capacity(),
            change_policy: ChangePolicy::default(),
            unknown_provider: UnknownProviderPolicy::default(),
        }
    }
}

fn default_event_channel_capacity() -> usize {
    1000
}

/// Interpretation of "the version changed"
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangePolicy {
    /// Changed when no error was recorded, even if nothing needed an update
    #[default]
    NoFailures,
    /// Changed only when no error was recorded and at least one provider updated
    AnyUpdate,
    /// Changed only when no error was recorded and every domain could be
    /// resolved, so unresolved domains are looked at again on the next run
    AllResolved,
}

/// Handling of providers without a registered updater
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownProviderPolicy {
    /// Log a warning and treat the provider as having nothing to do
    #[default]
    Skip,
    /// Record a configuration error for the provider
    Fail,
}

/// Retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retries after the immediate attempt (0 disables retrying)
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// Delay before the first retry (in milliseconds)
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Upper bound for any single delay (in milliseconds)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// How delays grow between retries
    #[serde(default)]
    pub backoff: Backoff,
}

impl RetryConfig {
    /// Validate the retry configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.max_retries > 10 {
            return Err(crate::Error::config(format!(
                "max_retries must be between 0 and 10. Got: {}",
                self.max_retries
            )));
        }
        if self.max_delay_ms < self.initial_delay_ms {
            return Err(crate::Error::config(format!(
                "max_delay_ms ({}) cannot be smaller than initial_delay_ms ({})",
                self.max_delay_ms, self.initial_delay_ms
            )));
        }
        Ok(())
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff: Backoff::default(),
        }
    }
}

/// Delay growth between retries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    /// Same delay before every retry
    Fixed,
    /// Delay doubles before every retry
    #[default]
    Exponential,
}

fn default_max_retries() -> usize {
    3
}

fn default_initial_delay_ms() -> u64 {
    5_000
}

fn default_max_delay_ms() -> u64 {
    60_000
}
