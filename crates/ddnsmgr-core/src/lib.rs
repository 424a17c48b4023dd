// # ddnsmgr-core
//
// Core library of the multi-provider DDNS manager.
//
// ## Architecture Overview
//
// This library keeps DNS records at any number of providers in sync with the
// host's public address:
// - **Detector**: Trait for obtaining the current public address
// - **Resolver**: Trait for looking up what a domain currently publishes
// - **Updater**: Trait implemented by DNS provider plugins
// - **Notifier**: Trait for webhook and message delivery
// - **AddrStore**: Trait for persisting the last synced addresses
// - **DomainRegistry**: Managed domains per provider and IP version
// - **DdnsEngine**: Orchestrates detect → decide → update → retry → notify
// - **UpdaterRegistry**: Plugin-based registry of provider updaters
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Core logic is separate from implementations
// 2. **One-Shot Runs**: An external scheduler calls `DdnsEngine::update`
// 3. **Plugin-Based**: Updaters are registered by name, no hard-coded if-else
// 4. **Failure Isolation**: A failing domain or provider never aborts the run
// 5. **Idempotency**: Records already pointing at the address are left alone

pub mod config;
pub mod context;
pub mod domains;
pub mod engine;
pub mod error;
pub mod notify;
pub mod registry;
pub mod retry;
pub mod state;
pub mod traits;

// Re-export core types for convenience
pub use config::{Config, NotifyMode, ServiceConfig, WebhookConfig};
pub use context::{CancelHandle, RunContext};
pub use domains::{Domain, DomainRegistry, UpdateStatus};
pub use engine::{DdnsEngine, EngineEvent, ProviderOutcome};
pub use error::{Error, Result};
pub use notify::TagValues;
pub use registry::UpdaterRegistry;
pub use state::{FileAddrStore, MemoryAddrStore};
pub use traits::{AddrStore, Detector, IpVersion, Notifier, RecordType, Resolver, Updater};
