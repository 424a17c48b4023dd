// # DNS Resolver
//
// Looks up the address a domain currently publishes. The resolver strategy
// from the configuration picks where the question goes:
//
// - unset or `system`: the operating system's resolver (`getaddrinfo` via
//   `tokio::net::lookup_host`)
// - `IP` or `IP:PORT` (IPv6 in brackets with a port): that nameserver,
//   queried directly over UDP/TCP with hickory-resolver, without caching

use async_trait::async_trait;
use ddnsmgr_core::traits::{IpVersion, Resolver};
use ddnsmgr_core::{Error, Result};
use hickory_resolver::TokioAsyncResolver;
use hickory_resolver::config::{LookupIpStrategy, NameServerConfigGroup, ResolverConfig, ResolverOpts};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

/// Port used when a nameserver is given without one
const DNS_PORT: u16 = 53;

/// Per-query timeout against a configured nameserver
const QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Strategy value selecting the operating system's resolver
const SYSTEM: &str = "system";

/// Parse a resolver strategy
///
/// Returns `None` for the system resolver and the nameserver address
/// otherwise.
pub fn parse_strategy(strategy: Option<&str>) -> std::result::Result<Option<SocketAddr>, String> {
    let Some(value) = strategy.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    if value.eq_ignore_ascii_case(SYSTEM) {
        return Ok(None);
    }

    if let Ok(addr) = value.parse::<SocketAddr>() {
        return Ok(Some(addr));
    }
    value
        .parse::<IpAddr>()
        .map(|ip| Some(SocketAddr::new(ip, DNS_PORT)))
        .map_err(|_| format!("invalid nameserver {:?}, expected IP or IP:PORT", value))
}

/// Resolver answering through the system resolver or a configured nameserver
#[derive(Default)]
pub struct DnsResolver {
    resolvers: Mutex<HashMap<(SocketAddr, IpVersion), TokioAsyncResolver>>,
}

impl DnsResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolver querying `nameserver` for one address family, built once
    fn nameserver(&self, nameserver: SocketAddr, version: IpVersion) -> TokioAsyncResolver {
        let mut resolvers = self
            .resolvers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        resolvers
            .entry((nameserver, version))
            .or_insert_with(|| {
                debug!("[DDNS] querying nameserver {} for {} records", nameserver, version.record_type());
                let group = NameServerConfigGroup::from_ips_clear(&[nameserver.ip()], nameserver.port(), true);
                let config = ResolverConfig::from_parts(None, Vec::new(), group);

                let mut opts = ResolverOpts::default();
                opts.timeout = QUERY_TIMEOUT;
                opts.attempts = 1;
                opts.cache_size = 0;
                opts.ip_strategy = match version {
                    IpVersion::V4 => LookupIpStrategy::Ipv4Only,
                    IpVersion::V6 => LookupIpStrategy::Ipv6Only,
                };

                TokioAsyncResolver::tokio(config, opts)
            })
            .clone()
    }

    async fn lookup_system(domain: &str, version: IpVersion) -> Result<IpAddr> {
        let addrs = tokio::net::lookup_host((domain, 0))
            .await
            .map_err(|e| Error::resolution(domain, e.to_string()))?;

        addrs
            .map(|socket| socket.ip())
            .find(|ip| version.matches(ip))
            .ok_or_else(|| Error::resolution(domain, format!("no {} record", version.record_type())))
    }

    async fn lookup_nameserver(&self, domain: &str, nameserver: SocketAddr, version: IpVersion) -> Result<IpAddr> {
        // Fully qualified, so no search domain is appended
        let name = format!("{}.", domain.trim_end_matches('.'));
        let lookup = self
            .nameserver(nameserver, version)
            .lookup_ip(name.as_str())
            .await
            .map_err(|e| Error::resolution(domain, format!("{} via {}", e, nameserver)))?;

        lookup
            .iter()
            .find(|ip| version.matches(ip))
            .ok_or_else(|| {
                Error::resolution(
                    domain,
                    format!("no {} record via {}", version.record_type(), nameserver),
                )
            })
    }
}

#[async_trait]
impl Resolver for DnsResolver {
    async fn resolve(&self, domain: &str, strategy: Option<&str>, version: IpVersion) -> Result<IpAddr> {
        match parse_strategy(strategy).map_err(|e| Error::resolution(domain, e))? {
            None => Self::lookup_system(domain, version).await,
            Some(nameserver) => self.lookup_nameserver(domain, nameserver, version).await,
        }
    }
}
