// # Resolver Trait
//
// Defines the interface for looking up the address a domain currently
// publishes. The engine compares that address with the detected one to decide
// whether a record needs to change.

use async_trait::async_trait;
use std::net::IpAddr;

use crate::traits::IpVersion;

/// Trait for DNS resolution
///
/// # Parameters
///
/// - `domain`: Fully qualified domain name
/// - `strategy`: Resolver strategy selector from the configuration
///   (`None` = system resolver)
/// - `version`: Which address family to resolve (A or AAAA lookup)
///
/// Implementations must return an address of the requested version, or an
/// error. A failure only defers that single domain.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Resolve the published address of a domain
    async fn resolve(
        &self,
        domain: &str,
        strategy: Option<&str>,
        version: IpVersion,
    ) -> Result<IpAddr, crate::Error>;
}
