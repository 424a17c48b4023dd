// # Updater Trait
//
// Defines the capability every DNS provider plugin exposes.
//
// ## Implementations
//
// - Cloudflare: `ddnsmgr-provider-cloudflare` crate
// - Future: Route53, DNSPod, AliDNS, etc.
//
// ## Lifecycle
//
// A fresh updater is created from the registry for every provider batch:
//
// ```rust,ignore
// let mut updater = registry.open("cloudflare").unwrap();
// updater.init(&service.settings, &batch)?;
// updater.update(&ctx, RecordType::A, "1.2.3.4".parse()?).await?;
// ```

use async_trait::async_trait;
use std::fmt;
use std::net::IpAddr;

use crate::context::RunContext;
use crate::domains::Domain;

/// DNS record type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    /// A record (IPv4)
    A,
    /// AAAA record (IPv6)
    Aaaa,
}

impl RecordType {
    /// Wire name of the record type
    pub fn as_str(self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::Aaaa => "AAAA",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trait for DNS provider updaters
///
/// # Trust Level: Untrusted
///
/// Updaters talk to a provider API and nothing else:
/// - They must not retry or sleep; failures are returned and the engine
///   schedules retries.
/// - They must not decide whether an update is needed; the engine only hands
///   them records whose published address differs from the target.
/// - They must not touch the domain registry or cached addresses.
///
/// `update` may be called again on the same instance by a retry task, so it
/// has to be repeatable.
#[async_trait]
pub trait Updater: Send + Sync {
    /// Prepare the updater for a batch
    ///
    /// # Parameters
    ///
    /// - `settings`: The provider's opaque settings blob from the configuration
    /// - `domains`: The records that need to change in this run
    fn init(&mut self, settings: &serde_json::Value, domains: &[Domain]) -> Result<(), crate::Error>;

    /// Point every record of the batch at `addr`
    async fn update(
        &self,
        ctx: &RunContext,
        record_type: RecordType,
        addr: IpAddr,
    ) -> Result<(), crate::Error>;
}

/// Constructor for updaters, registered by provider name
pub trait UpdaterFactory: Send + Sync {
    /// Create a fresh, uninitialised updater
    fn create(&self) -> Box<dyn Updater>;
}

impl<F> UpdaterFactory for F
where
    F: Fn() -> Box<dyn Updater> + Send + Sync,
{
    fn create(&self) -> Box<dyn Updater> {
        self()
    }
}
