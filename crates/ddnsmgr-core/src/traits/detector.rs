// # Detector Trait
//
// Defines the interface for obtaining the host's current public address.
//
// ## Implementations
//
// - HTTP "what is my IP" services: `ddnsmgr-ip-http` crate
// - Future: network interface enumeration, custom commands
//
// ## Usage
//
// ```rust,ignore
// use ddnsmgr_core::traits::Detector;
//
// let ipv4 = detector.detect_ipv4(&config.ipv4.detection).await?;
// ```

use async_trait::async_trait;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::config::DetectionConfig;
use crate::traits::RecordType;

/// IP version (v4 or v6)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IpVersion {
    V4,
    V6,
}

impl IpVersion {
    /// Both versions, in the order a run processes them
    pub const ALL: [IpVersion; 2] = [IpVersion::V4, IpVersion::V6];

    /// Record type carrying addresses of this version
    pub fn record_type(self) -> RecordType {
        match self {
            IpVersion::V4 => RecordType::A,
            IpVersion::V6 => RecordType::Aaaa,
        }
    }

    /// Whether an address belongs to this version
    pub fn matches(self, addr: &IpAddr) -> bool {
        match self {
            IpVersion::V4 => addr.is_ipv4(),
            IpVersion::V6 => addr.is_ipv6(),
        }
    }

    /// Version of an address
    pub fn of(addr: &IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => IpVersion::V4,
            IpAddr::V6(_) => IpVersion::V6,
        }
    }
}

impl fmt::Display for IpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpVersion::V4 => f.write_str("IPv4"),
            IpVersion::V6 => f.write_str("IPv6"),
        }
    }
}

/// Trait for public address detection
///
/// Detectors are observers only: they answer "what is the public address
/// right now" and never decide whether records need an update.
///
/// Implementations must be thread-safe and usable across async tasks.
#[async_trait]
pub trait Detector: Send + Sync {
    /// Detect the current public IPv4 address
    async fn detect_ipv4(&self, config: &DetectionConfig) -> Result<Ipv4Addr, crate::Error>;

    /// Detect the current public IPv6 address
    async fn detect_ipv6(&self, config: &DetectionConfig) -> Result<Ipv6Addr, crate::Error>;

    /// Detect the address of the given version
    async fn detect(
        &self,
        version: IpVersion,
        config: &DetectionConfig,
    ) -> Result<IpAddr, crate::Error> {
        match version {
            IpVersion::V4 => self.detect_ipv4(config).await.map(IpAddr::V4),
            IpVersion::V6 => self.detect_ipv6(config).await.map(IpAddr::V6),
        }
    }
}
