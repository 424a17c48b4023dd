// # Memory Address Store
//
// In-memory implementation of AddrStore.
//
// ## Crash Behavior
//
// - Cached addresses are lost on restart
// - The first run after a restart takes the slow path for every provider
//   (records that already match are still skipped by resolution)

use async_trait::async_trait;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::Error;
use crate::traits::addr_store::{AddrStore, CachedAddrs};

/// In-memory address store
///
/// Clones share the same storage, so a test can keep a handle and inspect
/// what the engine persisted.
#[derive(Debug, Clone, Default)]
pub struct MemoryAddrStore {
    inner: Arc<RwLock<CachedAddrs>>,
}

impl MemoryAddrStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-seeded with addresses
    pub fn with_addrs(addrs: CachedAddrs) -> Self {
        Self {
            inner: Arc::new(RwLock::new(addrs)),
        }
    }

    /// Snapshot of the stored addresses
    pub async fn snapshot(&self) -> CachedAddrs {
        self.inner.read().await.clone()
    }
}

#[async_trait]
impl AddrStore for MemoryAddrStore {
    async fn load(&self) -> Result<CachedAddrs, Error> {
        Ok(self.inner.read().await.clone())
    }

    async fn save(&self, addr: IpAddr) -> Result<(), Error> {
        self.inner.write().await.set(addr);
        Ok(())
    }
}
