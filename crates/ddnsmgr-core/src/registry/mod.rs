//! Plugin-based updater registry
//!
//! Updaters are registered by provider name at start-up, so the engine never
//! hard-codes an if-else chain over providers.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ddnsmgr_core::registry::UpdaterRegistry;
//!
//! let mut registry = UpdaterRegistry::new();
//! ddnsmgr_provider_cloudflare::register(&mut registry);
//!
//! // Shared read-only from here on
//! let registry = std::sync::Arc::new(registry);
//! let updater = registry.open("cloudflare");
//! ```
//!
//! ## Registration
//!
//! Plugin crates expose a `register` function:
//!
//! ```rust,ignore
//! pub fn register(registry: &mut UpdaterRegistry) {
//!     registry.register("cloudflare", || Box::new(CloudflareUpdater::new()) as Box<dyn Updater>);
//! }
//! ```

use std::collections::HashMap;
use std::fmt;

use crate::traits::{Updater, UpdaterFactory};

/// Provider name → updater factory
#[derive(Default)]
pub struct UpdaterRegistry {
    factories: HashMap<String, Box<dyn UpdaterFactory>>,
}

impl fmt::Debug for UpdaterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdaterRegistry")
            .field("providers", &self.list())
            .finish()
    }
}

impl UpdaterRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an updater factory under a provider name
    ///
    /// Registering a name twice replaces the earlier factory.
    pub fn register(&mut self, name: impl Into<String>, factory: impl UpdaterFactory + 'static) {
        let name = name.into();
        if self.factories.insert(name.clone(), Box::new(factory)).is_some() {
            tracing::warn!("Updater factory for {} replaced", name);
        }
    }

    /// Create a fresh updater for a provider
    ///
    /// Returns `None` if no factory is registered under `name`.
    pub fn open(&self, name: &str) -> Option<Box<dyn Updater>> {
        self.factories.get(name).map(|factory| factory.create())
    }

    /// Check if a provider is registered
    pub fn has(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered provider names, sorted
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }
}
