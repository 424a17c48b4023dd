//! Contracts between the engine and its collaborators
//!
//! - [`Detector`]: Obtain the host's public address
//! - [`Resolver`]: Look up the address a domain currently publishes
//! - [`Updater`]: Change records at a DNS provider
//! - [`Notifier`]: Deliver webhooks and messages
//! - [`AddrStore`]: Persist the cached addresses

pub mod addr_store;
pub mod detector;
pub mod notifier;
pub mod resolver;
pub mod updater;

pub use addr_store::{AddrStore, CachedAddrs};
pub use detector::{Detector, IpVersion};
pub use notifier::Notifier;
pub use resolver::Resolver;
pub use updater::{RecordType, Updater, UpdaterFactory};
