//! Update orchestrator
//!
//! The DdnsEngine is responsible for:
//! - Detecting the public address of every enabled IP version
//! - Deciding, per provider and domain, whether a record needs changing
//! - Dispatching updates with isolated per-provider failure handling
//! - Retrying failed updates in the background and joining them per version
//! - Advancing the cached addresses and driving notifications
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐
//! │  Detector   │─── public address ───┐
//! └─────────────┘                      │
//!                                      ▼
//!                             ┌──────────────┐
//!                             │  DdnsEngine  │
//!                             └──────────────┘
//!                                      │
//!        ┌──────────────┬──────────────┼──────────────┬──────────────┐
//!        ▼              ▼              ▼              ▼              ▼
//! ┌────────────┐ ┌────────────┐ ┌────────────┐ ┌────────────┐ ┌────────────┐
//! │  Resolver  │ │  Updater   │ │  JoinSet   │ │  Domain    │ │  Notifier  │
//! │  (decide)  │ │  (update)  │ │  (retries) │ │  Registry  │ │  (notify)  │
//! └────────────┘ └────────────┘ └────────────┘ └────────────┘ └────────────┘
//! ```
//!
//! ## Run Flow
//!
//! For IPv4, then IPv6 (when enabled):
//!
//! 1. Detect the public address; on failure skip the version
//! 2. Skip every provider if the address equals the cached one (unless forced)
//! 3. Per provider, sequentially: resolve each domain, batch the stale ones,
//!    init the updater and push the address once
//! 4. A failed push is retried in a background task; all retry tasks of the
//!    version are joined before its errors are counted
//! 5. Without errors the version counts as changed and the cached address
//!    advances ([`ChangePolicy`] can additionally require an update, or that
//!    every domain resolved)
//!
//! Errors of both versions are merged into one [`Error::Aggregate`]; the
//! notification pipeline runs once at the end.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::{ChangePolicy, Config, EngineConfig, UnknownProviderPolicy};
use crate::context::RunContext;
use crate::domains::{Domain, DomainRegistry, UpdateStatus};
use crate::error::{Error, Result};
use crate::notify;
use crate::registry::UpdaterRegistry;
use crate::retry::{self, RetryPolicy};
use crate::traits::{Detector, IpVersion, Notifier, Resolver, Updater};

/// Events emitted by the DdnsEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A run started for the enabled versions
    RunStarted { versions: Vec<IpVersion>, force: bool },

    /// Address detection failed; the version is skipped
    DetectionFailed { version: IpVersion, error: String },

    /// Detected address equals the cached one; no provider was touched
    AddressUnchanged { version: IpVersion, addr: IpAddr },

    /// A domain's published address could not be resolved; it is left out
    DomainUnresolved {
        version: IpVersion,
        provider: String,
        domain: String,
    },

    /// Provider had nothing to do (empty batch or unregistered)
    ProviderSkipped { version: IpVersion, provider: String },

    /// Provider accepted the new address
    ProviderUpdated {
        version: IpVersion,
        provider: String,
        addr: IpAddr,
        domains: Vec<String>,
    },

    /// Provider ended with an error
    ProviderFailed {
        version: IpVersion,
        provider: String,
        error: String,
    },

    /// The immediate update failed and a retry task was spawned
    RetryScheduled { version: IpVersion, provider: String },

    /// A retry task is about to call the updater again
    RetryAttempt {
        version: IpVersion,
        provider: String,
        attempt: usize,
    },

    /// The cached address of a version advanced
    AddressCached { version: IpVersion, addr: IpAddr },

    /// The run finished with this many errors
    RunFinished { errors: usize },
}

/// Result of one provider's decision-and-update step
#[derive(Debug)]
pub enum ProviderOutcome {
    /// Nothing to do: empty batch, or no updater registered
    Skipped,
    /// The immediate update succeeded
    Succeeded,
    /// The provider failed without a retry
    Failed(Error),
    /// The immediate update failed; the result arrives from the retry task
    Retrying,
}

/// Result of one IP version
#[derive(Debug, Default)]
struct VersionRun {
    changed: bool,
    errors: Vec<Error>,
}

/// Retry tasks of one version, each yielding its provider and final result
type RetryTasks = JoinSet<(String, Result<()>)>;

/// Core DDNS engine
///
/// The engine holds no per-run state: configuration and the domain registry
/// are passed into every [`DdnsEngine::update`] call, so one engine can serve
/// any number of runs.
///
/// ## Concurrency
///
/// Providers are processed one after another. Only recovery is concurrent:
/// each provider whose immediate update fails gets one retry task, and the
/// version waits for all of them before counting errors. Domain statuses and
/// cached addresses are only written by the engine itself, after the join.
///
/// ## Events
///
/// Events go to a bounded channel. When it is full, new events are dropped
/// with a warning; the run itself is never blocked by a slow consumer.
pub struct DdnsEngine {
    /// Updater factories by provider name
    registry: Arc<UpdaterRegistry>,

    /// Public address detection
    detector: Arc<dyn Detector>,

    /// Lookup of the currently published addresses
    resolver: Arc<dyn Resolver>,

    /// Webhook and message delivery
    notifier: Arc<dyn Notifier>,

    /// Retry schedule for failed updates
    retry_policy: RetryPolicy,

    /// What counts as a changed version
    change_policy: ChangePolicy,

    /// Handling of providers without an updater
    unknown_provider: UnknownProviderPolicy,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<EngineEvent>,
}

impl DdnsEngine {
    /// Create a new DDNS engine
    ///
    /// # Parameters
    ///
    /// - `registry`: Updater factories, shared read-only
    /// - `detector`: Detector implementation
    /// - `resolver`: Resolver implementation
    /// - `notifier`: Notifier implementation
    /// - `config`: Engine settings (retry, change and unknown provider policy)
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    pub fn new(
        registry: Arc<UpdaterRegistry>,
        detector: Arc<dyn Detector>,
        resolver: Arc<dyn Resolver>,
        notifier: Arc<dyn Notifier>,
        config: &EngineConfig,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.event_channel_capacity);

        let engine = Self {
            registry,
            detector,
            resolver,
            notifier,
            retry_policy: RetryPolicy::from(&config.retry),
            change_policy: config.change_policy,
            unknown_provider: config.unknown_provider,
            event_tx: tx,
        };

        Ok((engine, rx))
    }

    /// Synchronise every enabled IP version once
    ///
    /// # Parameters
    ///
    /// - `ctx`: Cancellation context threaded through every collaborator call
    /// - `config`: Versions, services, resolver strategy and notification settings
    ///   (`config.engine` is read by [`DdnsEngine::new`], not here)
    /// - `domains`: Domain registry; statuses and cached addresses are updated
    /// - `force`: Bypass the "address unchanged" fast path
    /// - `providers`: Restrict the run to these providers; empty means every
    ///   provider owning a domain of the version
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Every enabled version was skipped or succeeded
    /// - `Err(Error::Aggregate)`: Every error recorded during the run
    pub async fn update(
        &self,
        ctx: &RunContext,
        config: &Config,
        domains: &mut DomainRegistry,
        force: bool,
        providers: &[String],
    ) -> Result<()> {
        let versions: Vec<IpVersion> = IpVersion::ALL
            .into_iter()
            .filter(|v| config.version(*v).enabled)
            .collect();

        if versions.is_empty() {
            debug!("Neither IPv4 nor IPv6 is enabled, nothing to update");
            return Ok(());
        }

        self.emit_event(EngineEvent::RunStarted {
            versions: versions.clone(),
            force,
        });

        let mut errors = Vec::new();
        let mut ipv4_changed = false;
        let mut ipv6_changed = false;

        for version in versions {
            let run = self
                .update_version(ctx, config, domains, version, force, providers)
                .await;
            match version {
                IpVersion::V4 => ipv4_changed = run.changed,
                IpVersion::V6 => ipv6_changed = run.changed,
            }
            errors.extend(run.errors);
        }

        let error_count = errors.len();
        let error = Error::aggregate(errors);
        let message = error.as_ref().map(ToString::to_string);

        notify::dispatch(self.notifier.as_ref(), config, error.is_some(), || {
            domains.tag_values(ipv4_changed, ipv6_changed, message)
        })
        .await;

        self.emit_event(EngineEvent::RunFinished {
            errors: error_count,
        });

        match error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Run one IP version
    async fn update_version(
        &self,
        ctx: &RunContext,
        config: &Config,
        domains: &mut DomainRegistry,
        version: IpVersion,
        force: bool,
        providers: &[String],
    ) -> VersionRun {
        let detected = tokio::select! {
            biased;
            _ = ctx.cancelled() => Err(Error::Cancelled),
            r = self.detector.detect(version, &config.version(version).detection) => r,
        };

        let addr = match detected {
            Ok(addr) => addr,
            Err(e) => {
                error!("[DDNS] {} detection failed: {}", version, e);
                self.emit_event(EngineEvent::DetectionFailed {
                    version,
                    error: e.to_string(),
                });
                // Detection failure only skips the version; cancellation is reported
                let errors = if e.is_cancelled() { vec![e] } else { Vec::new() };
                return VersionRun {
                    changed: false,
                    errors,
                };
            }
        };

        let cached = domains.addr(version);
        if !force && cached == Some(addr) {
            debug!("[DDNS] {} address unchanged: {}", version, addr);
            self.emit_event(EngineEvent::AddressUnchanged { version, addr });
            return self.finish_version(domains, version, addr, Vec::new(), 0, 0).await;
        }

        match cached {
            Some(old) => debug!("[DDNS] {} changed: {} => {}", version, old, addr),
            None => debug!("[DDNS] {} detected: {}", version, addr),
        }

        let targets = if providers.is_empty() {
            domains.providers(version)
        } else {
            dedup(providers)
        };

        let mut errors = Vec::new();
        let mut updated = 0;
        let mut unresolved = 0;
        let mut retries = RetryTasks::new();
        let mut pending: HashMap<String, Vec<usize>> = HashMap::new();

        for provider in &targets {
            let Some(list) = domains.domains_mut(version).get_mut(provider) else {
                debug!("[{}] no {} domains", provider, version);
                self.emit_event(EngineEvent::ProviderSkipped {
                    version,
                    provider: provider.clone(),
                });
                continue;
            };

            let (outcome, batch, skipped) = self
                .update_provider(ctx, config, version, addr, provider, list, &mut retries)
                .await;
            unresolved += skipped;

            match outcome {
                ProviderOutcome::Skipped => {
                    self.emit_event(EngineEvent::ProviderSkipped {
                        version,
                        provider: provider.clone(),
                    });
                }
                ProviderOutcome::Succeeded => {
                    updated += 1;
                    info!("[{}] {} - record(s) updated", provider, addr);
                    let names = mark(list, &batch, UpdateStatus::Updated);
                    self.emit_event(EngineEvent::ProviderUpdated {
                        version,
                        provider: provider.clone(),
                        addr,
                        domains: names,
                    });
                }
                ProviderOutcome::Failed(e) => {
                    error!("{}", e);
                    mark(list, &batch, UpdateStatus::Failed);
                    self.emit_event(EngineEvent::ProviderFailed {
                        version,
                        provider: provider.clone(),
                        error: e.to_string(),
                    });
                    errors.push(e);
                }
                ProviderOutcome::Retrying => {
                    self.emit_event(EngineEvent::RetryScheduled {
                        version,
                        provider: provider.clone(),
                    });
                    pending.insert(provider.clone(), batch);
                }
            }
        }

        while let Some(joined) = retries.join_next().await {
            let (provider, result) = match joined {
                Ok(done) => done,
                Err(e) => {
                    error!("[DDNS] {} retry task aborted: {}", version, e);
                    errors.push(Error::Other(format!("retry task aborted: {}", e)));
                    continue;
                }
            };

            let batch = pending.remove(&provider).unwrap_or_default();
            let list = domains.domains_mut(version).get_mut(&provider);

            match result {
                Ok(()) => {
                    updated += 1;
                    info!("[{}] {} - record(s) updated after retry", provider, addr);
                    let names = list.map(|l| mark(l, &batch, UpdateStatus::Updated)).unwrap_or_default();
                    self.emit_event(EngineEvent::ProviderUpdated {
                        version,
                        provider,
                        addr,
                        domains: names,
                    });
                }
                Err(e) => {
                    error!("{}", e);
                    if let Some(l) = list {
                        mark(l, &batch, UpdateStatus::Failed);
                    }
                    self.emit_event(EngineEvent::ProviderFailed {
                        version,
                        provider,
                        error: e.to_string(),
                    });
                    errors.push(e);
                }
            }
        }

        self.finish_version(domains, version, addr, errors, updated, unresolved)
            .await
    }

    /// Decide the version's change flag and advance the cached address
    async fn finish_version(
        &self,
        domains: &mut DomainRegistry,
        version: IpVersion,
        addr: IpAddr,
        errors: Vec<Error>,
        updated: usize,
        unresolved: usize,
    ) -> VersionRun {
        let changed = errors.is_empty()
            && match self.change_policy {
                ChangePolicy::NoFailures => true,
                ChangePolicy::AnyUpdate => updated > 0,
                ChangePolicy::AllResolved => unresolved == 0,
            };

        if !changed && errors.is_empty() && unresolved > 0 {
            warn!(
                "[DDNS] {} domain(s) could not be resolved, keeping the cached {} address",
                unresolved, version
            );
        }

        if changed && domains.addr(version) != Some(addr) {
            if let Err(e) = domains.set_addr(version, addr).await {
                error!("[DDNS] failed to persist cached {} address: {}", version, e);
            }
            info!("[DDNS] cached {} address is now {}", version, addr);
            self.emit_event(EngineEvent::AddressCached { version, addr });
        }

        VersionRun { changed, errors }
    }

    /// Decision and update step of one provider
    ///
    /// Returns the outcome, the indices (into `list`) of the batch and the
    /// number of domains left out because they could not be resolved.
    #[allow(clippy::too_many_arguments)]
    async fn update_provider(
        &self,
        ctx: &RunContext,
        config: &Config,
        version: IpVersion,
        addr: IpAddr,
        provider: &str,
        list: &mut [Domain],
        retries: &mut RetryTasks,
    ) -> (ProviderOutcome, Vec<usize>, usize) {
        let (batch, unresolved) =
            match self.resolve_batch(ctx, config, version, addr, provider, list).await {
                Ok(resolved) => resolved,
                Err(e) => return (ProviderOutcome::Failed(e), Vec::new(), 0),
            };

        if batch.is_empty() {
            debug!("[{}] no stale {} record to point at {}", provider, version, addr);
            return (ProviderOutcome::Skipped, batch, unresolved);
        }

        let Some(mut updater) = self.registry.open(provider) else {
            let outcome = match self.unknown_provider {
                UnknownProviderPolicy::Skip => {
                    warn!("[{}] no updater registered, skipping", provider);
                    ProviderOutcome::Skipped
                }
                UnknownProviderPolicy::Fail => {
                    ProviderOutcome::Failed(Error::UnknownProvider(provider.to_string()))
                }
            };
            return (outcome, batch, unresolved);
        };

        let settings = config
            .find_service(provider)
            .map(|s| s.settings.clone())
            .unwrap_or_default();
        let batch_domains: Vec<Domain> = batch.iter().map(|&i| list[i].clone()).collect();

        if let Err(e) = updater.init(&settings, &batch_domains) {
            return (ProviderOutcome::Failed(Error::init(provider, e)), batch, unresolved);
        }

        let updater: Arc<dyn Updater> = Arc::from(updater);
        let record_type = version.record_type();

        info!("[{}] {} - start to update {} record(s)...", provider, addr, batch.len());
        let first = updater.update(ctx, record_type, addr).await;
        let outcome = match first {
            Ok(()) => ProviderOutcome::Succeeded,
            Err(e) if self.retry_policy.max_retries() == 0 => {
                ProviderOutcome::Failed(Error::update(provider, addr, e))
            }
            Err(e) => {
                warn!(
                    "[{}] {} - failed to update record: {} (will retry)",
                    provider, addr, e
                );
                self.spawn_retry(ctx, version, addr, provider, updater, retries);
                ProviderOutcome::Retrying
            }
        };

        (outcome, batch, unresolved)
    }

    /// Resolve every domain of a provider and collect the stale ones
    ///
    /// A resolution failure only leaves that domain out and is counted.
    /// Cancellation fails the whole provider.
    async fn resolve_batch(
        &self,
        ctx: &RunContext,
        config: &Config,
        version: IpVersion,
        addr: IpAddr,
        provider: &str,
        list: &mut [Domain],
    ) -> Result<(Vec<usize>, usize)> {
        let strategy = config.dns_resolver.as_deref();
        let mut batch = Vec::new();
        let mut unresolved = 0;

        for (index, domain) in list.iter_mut().enumerate() {
            let resolved = tokio::select! {
                biased;
                _ = ctx.cancelled() => return Err(Error::Cancelled),
                r = self.resolver.resolve(domain.name(), strategy, version) => r,
            };

            match resolved {
                Err(e) => {
                    error!("[{}] resolve {}: {}", provider, domain, e);
                    domain.set_status(UpdateStatus::Idle);
                    unresolved += 1;
                    self.emit_event(EngineEvent::DomainUnresolved {
                        version,
                        provider: provider.to_string(),
                        domain: domain.name().to_string(),
                    });
                }
                Ok(published) if published != addr => {
                    domain.set_status(UpdateStatus::Idle);
                    batch.push(index);
                }
                Ok(_) => {
                    domain.set_status(UpdateStatus::Nothing);
                    info!("[{}] {} already points to {}, skip update", provider, domain, addr);
                }
            }
        }

        Ok((batch, unresolved))
    }

    /// Retry a failed update in the background
    fn spawn_retry(
        &self,
        ctx: &RunContext,
        version: IpVersion,
        addr: IpAddr,
        provider: &str,
        updater: Arc<dyn Updater>,
        retries: &mut RetryTasks,
    ) {
        let ctx = ctx.clone();
        let policy = self.retry_policy.clone();
        let events = self.event_tx.clone();
        let provider = provider.to_string();
        let record_type = version.record_type();

        retries.spawn(async move {
            let mut attempt = 0;
            let result = retry::retry(&ctx, &policy, |attempt_ctx| {
                attempt += 1;
                info!("[{}] {} - retry attempt {}", provider, addr, attempt);
                send_event(
                    &events,
                    EngineEvent::RetryAttempt {
                        version,
                        provider: provider.clone(),
                        attempt,
                    },
                );

                let updater = updater.clone();
                let provider = provider.clone();
                async move {
                    updater
                        .update(&attempt_ctx, record_type, addr)
                        .await
                        .map_err(|e| Error::update(provider, addr, e))
                }
            })
            .await;

            (provider, result)
        });
    }

    /// Emit an engine event
    fn emit_event(&self, event: EngineEvent) {
        send_event(&self.event_tx, event);
    }
}

/// Send an event, dropping it (with a warning) when the channel is full
fn send_event(tx: &mpsc::Sender<EngineEvent>, event: EngineEvent) {
    if let Err(mpsc::error::TrySendError::Full(_)) = tx.try_send(event) {
        warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
    }
}

/// Set the status of the batch domains, returning their names
fn mark(list: &mut [Domain], batch: &[usize], status: UpdateStatus) -> Vec<String> {
    let mut names = Vec::with_capacity(batch.len());
    for &i in batch {
        if let Some(domain) = list.get_mut(i) {
            domain.set_status(status);
            names.push(domain.name().to_string());
        }
    }
    names
}

/// Requested providers in order, each name once
fn dedup(providers: &[String]) -> Vec<String> {
    let mut targets: Vec<String> = Vec::with_capacity(providers.len());
    for provider in providers {
        if !targets.contains(provider) {
            targets.push(provider.clone());
        }
    }
    targets
}
