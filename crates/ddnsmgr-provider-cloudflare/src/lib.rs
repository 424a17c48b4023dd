// # Cloudflare Updater
//
// This crate provides the Cloudflare updater plugin for the DDNS manager.
//
// ## Behaviour
//
// - One updater instance per provider batch: `init` validates the settings
//   and records the batch, `update` points every record at the new address
// - Records are updated one by one; a failing record does not stop the rest,
//   the errors are combined into one
// - Dry-run mode (`DDNS_MODE=dry-run`) performs the lookups but skips the PUT
// - No retries and no backoff: failures go back to the engine, which owns
//   the retry policy
//
// ## Settings
//
// ```json
// { "api_token": "…", "zone_id": "optional", "ttl": 300, "proxied": false }
// ```
//
// Without `zone_id` the zone is discovered by walking up the record name
// (`home.example.com`, then `example.com`). Without `ttl` or `proxied` the
// values already on the record are kept.
//
// ## Security
//
// The API token never appears in logs, errors or `Debug` output.
//
// ## API Reference
//
// - Cloudflare API v4: https://developers.cloudflare.com/api/
// - List Zones: GET `/zones?name=...`
// - List DNS Records: GET `/zones/:zone_id/dns_records?name=...&type=...`
// - Update DNS Record: PUT `/zones/:zone_id/dns_records/:record_id`

use async_trait::async_trait;
use ddnsmgr_core::domains::Domain;
use ddnsmgr_core::registry::UpdaterRegistry;
use ddnsmgr_core::traits::{RecordType, Updater};
use ddnsmgr_core::{Error, Result, RunContext};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Provider name the updater is registered under
pub const PROVIDER_NAME: &str = "cloudflare";

/// Cloudflare API base URL
const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings blob of a Cloudflare service
#[derive(Clone, Deserialize)]
pub struct CloudflareSettings {
    /// API token with Zone:DNS:Edit permission
    pub api_token: String,

    /// Zone of every record in the batch; discovered per record when absent
    #[serde(default)]
    pub zone_id: Option<String>,

    /// Record TTL in seconds (1 = automatic)
    #[serde(default)]
    pub ttl: Option<u32>,

    /// Whether records are proxied through Cloudflare
    #[serde(default)]
    pub proxied: Option<bool>,
}

impl fmt::Debug for CloudflareSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudflareSettings")
            .field("api_token", &"<REDACTED>")
            .field("zone_id", &self.zone_id)
            .field("ttl", &self.ttl)
            .field("proxied", &self.proxied)
            .finish()
    }
}

impl CloudflareSettings {
    /// Parse and validate a settings blob
    pub fn from_value(value: &serde_json::Value) -> Result<Self> {
        let settings: Self = serde_json::from_value(value.clone())
            .map_err(|e| Error::config(format!("invalid cloudflare settings: {}", e)))?;

        if settings.api_token.trim().is_empty() {
            return Err(Error::config("Cloudflare API token is required"));
        }
        if settings.zone_id.as_deref().is_some_and(|z| z.trim().is_empty()) {
            return Err(Error::config("Cloudflare zone_id cannot be empty"));
        }
        Ok(settings)
    }
}

/// Envelope of every Cloudflare API response
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct Zone {
    id: String,
}

#[derive(Debug, Deserialize)]
struct DnsRecord {
    id: String,
    content: String,
    #[serde(default)]
    ttl: Option<u32>,
    #[serde(default)]
    proxied: Option<bool>,
}

#[derive(Debug, Serialize)]
struct RecordUpdate<'a> {
    #[serde(rename = "type")]
    record_type: &'a str,
    name: &'a str,
    content: String,
    ttl: u32,
    proxied: bool,
}

/// Cloudflare updater
///
/// Created uninitialised by the registry; [`Updater::init`] must succeed
/// before [`Updater::update`] does anything.
pub struct CloudflareUpdater {
    client: reqwest::Client,
    api_base: String,
    dry_run: bool,
    settings: Option<CloudflareSettings>,
    domains: Vec<String>,
}

impl fmt::Debug for CloudflareUpdater {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudflareUpdater")
            .field("api_base", &self.api_base)
            .field("dry_run", &self.dry_run)
            .field("settings", &self.settings)
            .field("domains", &self.domains)
            .finish()
    }
}

impl CloudflareUpdater {
    /// Create an updater talking to the public API
    pub fn new(dry_run: bool) -> Self {
        Self::with_api_base(CLOUDFLARE_API_BASE, dry_run)
    }

    /// Create an updater talking to another API base (proxies, tests)
    pub fn with_api_base(api_base: impl Into<String>, dry_run: bool) -> Self {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            dry_run,
            settings: None,
            domains: Vec::new(),
        }
    }

    /// Create an updater, in dry-run mode when `DDNS_MODE=dry-run`
    pub fn from_env() -> Self {
        Self::new(dry_run_from_env())
    }

    /// Whether PUT requests are skipped
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Point one record at `addr`
    async fn update_domain(
        &self,
        settings: &CloudflareSettings,
        domain: &str,
        record_type: RecordType,
        addr: IpAddr,
    ) -> Result<()> {
        let zone_id = match settings.zone_id.as_deref() {
            Some(zone_id) => zone_id.to_string(),
            None => self.find_zone(settings, domain).await?,
        };

        let url = format!("{}/zones/{}/dns_records", self.api_base, zone_id);
        let records: Vec<DnsRecord> = self
            .call(
                settings,
                self.client
                    .get(&url)
                    .query(&[("name", domain), ("type", record_type.as_str())]),
            )
            .await?;

        let record = records.into_iter().next().ok_or_else(|| {
            Error::provider(
                PROVIDER_NAME,
                format!("{} record not found: {}", record_type, domain),
            )
        })?;

        if record.content.parse::<IpAddr>().ok() == Some(addr) {
            info!("[{}] {} already points to {}", PROVIDER_NAME, domain, addr);
            return Ok(());
        }

        let payload = RecordUpdate {
            record_type: record_type.as_str(),
            name: domain,
            content: addr.to_string(),
            ttl: settings.ttl.or(record.ttl).unwrap_or(1),
            proxied: settings.proxied.or(record.proxied).unwrap_or(false),
        };
        let record_url = format!("{}/{}", url, record.id);

        if self.dry_run {
            info!(
                "[{}] [DRY-RUN] would PUT {} -> {} (was: {})",
                PROVIDER_NAME, domain, addr, record.content
            );
            debug!("[DRY-RUN] {} payload: {:?}", record_url, payload);
            return Ok(());
        }

        let _: serde_json::Value = self
            .call(settings, self.client.put(&record_url).json(&payload))
            .await?;

        info!(
            "[{}] {} updated: {} -> {}",
            PROVIDER_NAME, domain, record.content, addr
        );
        Ok(())
    }

    /// Find the zone of a record by walking up its name
    async fn find_zone(&self, settings: &CloudflareSettings, domain: &str) -> Result<String> {
        let url = format!("{}/zones", self.api_base);

        for zone_name in zone_candidates(domain) {
            debug!("[{}] looking up zone {}", PROVIDER_NAME, zone_name);
            let zones: Vec<Zone> = self
                .call(settings, self.client.get(&url).query(&[("name", zone_name)]))
                .await?;
            if let Some(zone) = zones.into_iter().next() {
                return Ok(zone.id);
            }
        }

        Err(Error::provider(
            PROVIDER_NAME,
            format!("no zone found for {}", domain),
        ))
    }

    /// Send an authenticated request and unwrap the API envelope
    async fn call<T: DeserializeOwned>(
        &self,
        settings: &CloudflareSettings,
        request: reqwest::RequestBuilder,
    ) -> Result<T> {
        let response = request
            .bearer_auth(&settings.api_token)
            .send()
            .await
            .map_err(|e| Error::provider(PROVIDER_NAME, format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(status_error(status, &text));
        }

        let body: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| Error::provider(PROVIDER_NAME, format!("Failed to parse response: {}", e)))?;

        if !body.success {
            let messages = body
                .errors
                .iter()
                .map(|e| format!("{} ({})", e.message, e.code))
                .collect::<Vec<_>>()
                .join(", ");
            return Err(Error::provider(PROVIDER_NAME, format!("API error: {}", messages)));
        }

        body.result
            .ok_or_else(|| Error::provider(PROVIDER_NAME, "Invalid response format: missing result"))
    }
}

#[async_trait]
impl Updater for CloudflareUpdater {
    fn init(&mut self, settings: &serde_json::Value, domains: &[Domain]) -> Result<()> {
        self.settings = Some(CloudflareSettings::from_value(settings)?);
        self.domains = domains.iter().map(|d| d.name().to_string()).collect();

        if self.dry_run {
            warn!("[{}] running in DRY-RUN mode - no changes will be made", PROVIDER_NAME);
        }
        Ok(())
    }

    async fn update(&self, ctx: &RunContext, record_type: RecordType, addr: IpAddr) -> Result<()> {
        let settings = self
            .settings
            .as_ref()
            .ok_or_else(|| Error::provider(PROVIDER_NAME, "updater used before init"))?;

        let mut failures = Vec::new();
        for domain in &self.domains {
            let result = tokio::select! {
                biased;
                _ = ctx.cancelled() => return Err(Error::Cancelled),
                r = self.update_domain(settings, domain, record_type, addr) => r,
            };

            if let Err(e) = result {
                warn!("[{}] {} - {}", PROVIDER_NAME, domain, e);
                let message = match e {
                    Error::Provider { message, .. } => message,
                    other => other.to_string(),
                };
                failures.push(format!("{}: {}", domain, message));
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::provider(PROVIDER_NAME, failures.join("; ")))
        }
    }
}

/// Map a non-2xx status to an error
fn status_error(status: reqwest::StatusCode, text: &str) -> Error {
    let message = match status.as_u16() {
        401 | 403 => format!(
            "Authentication failed: Invalid API token or insufficient permissions. Status: {}",
            status
        ),
        404 => format!("Not found. Status: {}", status),
        409 => format!("Conflict: Record is being updated by another process. Status: {}", status),
        429 => format!("Rate limit exceeded. Status: {}", status),
        500..=599 => format!("Cloudflare server error (transient): {} - {}", status, text),
        _ => format!("Request failed: {} - {}", status, text),
    };
    Error::provider(PROVIDER_NAME, message)
}

/// Zone names a record may belong to, longest first, at least two labels
fn zone_candidates(domain: &str) -> Vec<&str> {
    let domain = domain.trim_end_matches('.');

    std::iter::once(domain)
        .chain(domain.match_indices('.').map(|(i, _)| &domain[i + 1..]))
        .filter(|name| name.contains('.'))
        .collect()
}

fn dry_run_from_env() -> bool {
    std::env::var("DDNS_MODE")
        .map(|mode| mode.eq_ignore_ascii_case("dry-run"))
        .unwrap_or(false)
}

/// Register the Cloudflare updater with a registry
///
/// # Example
///
/// ```rust
/// use ddnsmgr_core::registry::UpdaterRegistry;
///
/// let mut registry = UpdaterRegistry::new();
/// ddnsmgr_provider_cloudflare::register(&mut registry);
/// assert!(registry.has("cloudflare"));
/// ```
pub fn register(registry: &mut UpdaterRegistry) {
    registry.register(PROVIDER_NAME, || {
        Box::new(CloudflareUpdater::from_env()) as Box<dyn Updater>
    });
}
