// # HTTP Detector
//
// This crate provides the HTTP-based public address detector for the DDNS
// manager.
//
// ## Architecture
//
// Asks "what is my IP" services for the caller's address. Endpoints are tried
// in order; the first one answering with an address of the requested family
// wins. Without configured endpoints the built-in lists below are used.
//
// The detector only observes: it never caches and never decides whether
// records need an update. Cancellation is handled by the engine, which races
// detection against the run context.

use async_trait::async_trait;
use ddnsmgr_core::config::DetectionConfig;
use ddnsmgr_core::traits::{Detector, IpVersion};
use ddnsmgr_core::{Error, Result};

use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use tracing::{debug, warn};

/// Default IPv4 endpoints, tried in order
pub const DEFAULT_IPV4_URLS: &[&str] = &[
    "https://api.ipify.org",
    "https://ipv4.icanhazip.com",
    "https://v4.ident.me",
];

/// Default IPv6 endpoints, tried in order
pub const DEFAULT_IPV6_URLS: &[&str] = &[
    "https://api6.ipify.org",
    "https://ipv6.icanhazip.com",
    "https://v6.ident.me",
];

/// HTTP-based public address detector
#[derive(Debug, Clone, Default)]
pub struct HttpDetector {
    client: reqwest::Client,
}

impl HttpDetector {
    /// Create a detector with a default HTTP client
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a detector sharing an existing HTTP client
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Try every endpoint in order until one yields an address of type `A`
    async fn detect_from<A>(&self, version: IpVersion, config: &DetectionConfig) -> Result<A>
    where
        A: FromStr + std::fmt::Display,
    {
        let defaults = match version {
            IpVersion::V4 => DEFAULT_IPV4_URLS,
            IpVersion::V6 => DEFAULT_IPV6_URLS,
        };
        let urls: Vec<&str> = if config.urls.is_empty() {
            defaults.to_vec()
        } else {
            config.urls.iter().map(String::as_str).collect()
        };

        let mut last_error = None;
        for url in &urls {
            match self.fetch(url, config).await {
                Ok(body) => match parse_addr::<A>(&body) {
                    Some(addr) => {
                        debug!("{} address {} detected via {}", version, addr, url);
                        return Ok(addr);
                    }
                    None => {
                        warn!("{} - no {} address in response", url, version);
                        last_error = Some(format!("{}: no {} address in response", url, version));
                    }
                },
                Err(e) => {
                    warn!("{} - {}", url, e);
                    last_error = Some(format!("{}: {}", url, e));
                }
            }
        }

        Err(Error::detection(format!(
            "no {} address from {} endpoint(s), last error: {}",
            version,
            urls.len(),
            last_error.unwrap_or_else(|| "no endpoint configured".to_string())
        )))
    }

    /// Fetch the body of one endpoint
    async fn fetch(&self, url: &str, config: &DetectionConfig) -> Result<String> {
        let response = self
            .client
            .get(url)
            .timeout(config.timeout())
            .send()
            .await
            .map_err(|e| Error::http(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::http(format!("status {}", response.status())));
        }

        response
            .text()
            .await
            .map_err(|e| Error::http(format!("Failed to read response: {}", e)))
    }
}

#[async_trait]
impl Detector for HttpDetector {
    async fn detect_ipv4(&self, config: &DetectionConfig) -> Result<Ipv4Addr> {
        self.detect_from(IpVersion::V4, config).await
    }

    async fn detect_ipv6(&self, config: &DetectionConfig) -> Result<Ipv6Addr> {
        self.detect_from(IpVersion::V6, config).await
    }
}

/// Find the first address of type `A` in a response body
///
/// Bodies are plain text (`1.2.3.4\n`), HTML or JSON depending on the
/// service, so the body is split into address-like tokens and each one is
/// tried in turn.
fn parse_addr<A: FromStr>(body: &str) -> Option<A> {
    body.split(|c: char| !(c.is_ascii_hexdigit() || c == '.' || c == ':'))
        .filter(|token| !token.is_empty())
        .find_map(|token| {
            token
                .parse()
                .ok()
                .or_else(|| token.trim_matches(':').parse().ok())
        })
}
