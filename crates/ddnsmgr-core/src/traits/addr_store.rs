// # Address Store Trait
//
// Persistence for the two cached "last synced" addresses.
//
// ## Purpose
//
// The cached address is the baseline of the "address unchanged" fast path.
// Persisting it lets a fresh process skip providers when nothing changed
// since the previous run.
//
// ## Implementations
//
// - In-memory: `state::MemoryAddrStore`
// - JSON file with backup recovery: `state::FileAddrStore`

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::traits::IpVersion;

/// Cached addresses as persisted by an [`AddrStore`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedAddrs {
    /// Last IPv4 address records were synced to
    pub ipv4_addr: Option<Ipv4Addr>,
    /// Last IPv6 address records were synced to
    pub ipv6_addr: Option<Ipv6Addr>,
    /// When either address was last written
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl CachedAddrs {
    /// Cached address of a version
    pub fn get(&self, version: IpVersion) -> Option<IpAddr> {
        match version {
            IpVersion::V4 => self.ipv4_addr.map(IpAddr::V4),
            IpVersion::V6 => self.ipv6_addr.map(IpAddr::V6),
        }
    }

    /// Overwrite the address of the address's own version
    pub fn set(&mut self, addr: IpAddr) {
        match addr {
            IpAddr::V4(v4) => self.ipv4_addr = Some(v4),
            IpAddr::V6(v6) => self.ipv6_addr = Some(v6),
        }
        self.updated_at = Some(chrono::Utc::now());
    }
}

/// Trait for address store implementations
///
/// # Trust Level: Trusted (Core Component)
///
/// Stores perform I/O for persistence only and hold no business logic.
/// All methods must be safe to call concurrently.
#[async_trait]
pub trait AddrStore: Send + Sync {
    /// Load the persisted addresses (empty when nothing was stored yet)
    async fn load(&self) -> Result<CachedAddrs, crate::Error>;

    /// Persist the address of one version
    async fn save(&self, addr: IpAddr) -> Result<(), crate::Error>;
}
