//! Managed domains and the cached addresses they were last synced to
//!
//! The [`DomainRegistry`] owns two provider-partitioned domain lists (one per
//! IP version) and the cached "last known good" addresses. Domain statuses
//! are transient and recomputed by the engine on every run; the cached
//! addresses persist across runs through an [`AddrStore`].

use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::notify::TagValues;
use crate::traits::{AddrStore, CachedAddrs, IpVersion};

/// Outcome of the last evaluation of a domain
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UpdateStatus {
    /// Needs evaluation, or will be updated
    #[default]
    Idle,
    /// Already published the target address; skipped
    Nothing,
    /// The provider accepted the new address
    Updated,
    /// The provider rejected the new address
    Failed,
}

/// A managed DNS record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Domain {
    name: String,
    status: UpdateStatus,
}

impl Domain {
    /// Create an idle domain
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: UpdateStatus::Idle,
        }
    }

    /// Fully qualified record name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Status from the most recent run
    pub fn status(&self) -> UpdateStatus {
        self.status
    }

    pub(crate) fn set_status(&mut self, status: UpdateStatus) {
        self.status = status;
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Provider name → ordered domains
pub type DomainMap = BTreeMap<String, Vec<Domain>>;

/// Domains per provider and version, plus the cached addresses
pub struct DomainRegistry {
    cached: CachedAddrs,
    ipv4_domains: DomainMap,
    ipv6_domains: DomainMap,
    store: Arc<dyn AddrStore>,
}

impl fmt::Debug for DomainRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DomainRegistry")
            .field("cached", &self.cached)
            .field("ipv4_domains", &self.ipv4_domains)
            .field("ipv6_domains", &self.ipv6_domains)
            .finish_non_exhaustive()
    }
}

impl DomainRegistry {
    /// Create an empty registry seeded with already loaded addresses
    pub fn new(cached: CachedAddrs, store: Arc<dyn AddrStore>) -> Self {
        Self {
            cached,
            ipv4_domains: DomainMap::new(),
            ipv6_domains: DomainMap::new(),
            store,
        }
    }

    /// Build the registry from the configured services
    ///
    /// Cached addresses are loaded from `store`.
    pub async fn from_config(config: &Config, store: Arc<dyn AddrStore>) -> Result<Self> {
        let cached = store.load().await?;
        let mut registry = Self::new(cached, store);

        for service in &config.dns_services {
            for version in IpVersion::ALL {
                for name in service.domains(version) {
                    registry.insert(version, &service.provider, name.trim())?;
                }
            }
        }

        tracing::debug!(
            "Domain registry loaded: {} IPv4 provider(s), {} IPv6 provider(s)",
            registry.ipv4_domains.len(),
            registry.ipv6_domains.len()
        );
        Ok(registry)
    }

    /// Add a domain under a provider
    ///
    /// Fails if another provider already owns the name for this version.
    /// Adding the same name twice to the same provider is a no-op.
    pub fn insert(&mut self, version: IpVersion, provider: &str, name: &str) -> Result<()> {
        let map = self.domains_mut(version);

        if let Some((owner, _)) = map
            .iter()
            .find(|(_, domains)| domains.iter().any(|d| d.name == name))
        {
            if owner == provider {
                return Ok(());
            }
            return Err(Error::config(format!(
                "{} domain {} is already managed by {}",
                version, name, owner
            )));
        }

        map.entry(provider.to_string())
            .or_default()
            .push(Domain::new(name));
        Ok(())
    }

    /// Cached address of a version
    pub fn addr(&self, version: IpVersion) -> Option<IpAddr> {
        self.cached.get(version)
    }

    /// Cached IPv4 address
    pub fn ipv4_addr(&self) -> Option<std::net::Ipv4Addr> {
        self.cached.ipv4_addr
    }

    /// Cached IPv6 address
    pub fn ipv6_addr(&self) -> Option<std::net::Ipv6Addr> {
        self.cached.ipv6_addr
    }

    /// Overwrite the cached address of a version and persist it
    ///
    /// The in-memory value is updated even if persisting fails.
    pub async fn set_addr(&mut self, version: IpVersion, addr: IpAddr) -> Result<()> {
        if !version.matches(&addr) {
            return Err(Error::config(format!(
                "cannot cache {} as the {} address",
                addr, version
            )));
        }
        self.cached.set(addr);
        self.store.save(addr).await
    }

    /// Domains of a version, partitioned by provider
    pub fn domains(&self, version: IpVersion) -> &DomainMap {
        match version {
            IpVersion::V4 => &self.ipv4_domains,
            IpVersion::V6 => &self.ipv6_domains,
        }
    }

    pub(crate) fn domains_mut(&mut self, version: IpVersion) -> &mut DomainMap {
        match version {
            IpVersion::V4 => &mut self.ipv4_domains,
            IpVersion::V6 => &mut self.ipv6_domains,
        }
    }

    /// Providers owning at least one domain for a version, in name order
    pub fn providers(&self, version: IpVersion) -> Vec<String> {
        self.domains(version)
            .iter()
            .filter(|(_, domains)| !domains.is_empty())
            .map(|(provider, _)| provider.clone())
            .collect()
    }

    /// Snapshot of the registry for notifications
    pub fn tag_values(&self, ipv4_changed: bool, ipv6_changed: bool, error: Option<String>) -> TagValues {
        let names = |map: &DomainMap| {
            map.values()
                .flatten()
                .map(|d| d.name.clone())
                .collect::<Vec<_>>()
        };

        TagValues {
            ipv4_addr: self.cached.ipv4_addr,
            ipv6_addr: self.cached.ipv6_addr,
            ipv4_domains: names(&self.ipv4_domains),
            ipv6_domains: names(&self.ipv6_domains),
            ipv4_changed,
            ipv6_changed,
            error,
            timestamp: chrono::Utc::now(),
        }
    }
}
