//! Background cache agent.
//!
//! The agent is the single writer of the cache store. It drains a command
//! mailbox one envelope at a time, so command handling and the eviction
//! sweep never interleave. Every command gets exactly one reply, routed back
//! by correlation token, and every committed mutation is broadcast as an
//! [`Event`] in commit order.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::cache::{CacheEntry, CacheStore};
use crate::clock::Clock;
use crate::config::AppConfig;
use crate::consent::{ConsentLevel, ConsentPolicy};
use crate::error::CacheFailure;
use crate::protocol::{CacheSummary, Command, DeleteReason, Envelope, Event, OfflineWork, Outcome, Reply, WorkPayload};

/// Tuning knobs for the agent and its channels.
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub max_refreshes: u32,
    pub sweep_interval: Duration,
    pub command_timeout: Duration,
    pub command_buffer: usize,
    pub event_buffer: usize,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for AgentSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_refreshes: config.max_refreshes,
            sweep_interval: config.sweep_interval(),
            command_timeout: config.command_timeout(),
            command_buffer: config.command_buffer,
            event_buffer: config.event_buffer,
        }
    }
}

/// The client-facing side of the agent's channels.
///
/// Cheap to clone; clients connect through it.
#[derive(Clone, Debug)]
pub struct AgentHandle {
    pub(crate) commands: mpsc::Sender<Envelope>,
    pub(crate) events: broadcast::Sender<Event>,
    pub(crate) ready: watch::Receiver<bool>,
    pub(crate) command_timeout: Duration,
}

impl AgentHandle {
    /// Whether the agent has finished starting up and is still running.
    pub fn is_ready(&self) -> bool {
        *self.ready.borrow() && !self.commands.is_closed()
    }

    /// Wait until the agent reports ready. Returns false if it stopped first.
    pub async fn wait_ready(&self) -> bool {
        let mut ready = self.ready.clone();
        ready.wait_for(|r| *r).await.is_ok()
    }
}

/// The agent-facing side of the channels.
#[derive(Debug)]
pub struct Mailbox {
    pub(crate) commands: mpsc::Receiver<Envelope>,
    pub(crate) events: broadcast::Sender<Event>,
    pub(crate) ready: watch::Sender<bool>,
}

/// Create the channel pair joining an agent and its clients.
///
/// The handle can be given to clients before the agent runs; until then
/// their commands fail fast with `AgentUnavailable`.
pub fn channel(settings: &AgentSettings) -> (AgentHandle, Mailbox) {
    let (command_tx, command_rx) = mpsc::channel(settings.command_buffer);
    let (event_tx, _) = broadcast::channel(settings.event_buffer);
    let (ready_tx, ready_rx) = watch::channel(false);

    let handle = AgentHandle {
        commands: command_tx,
        events: event_tx.clone(),
        ready: ready_rx,
        command_timeout: settings.command_timeout,
    };
    let mailbox = Mailbox { commands: command_rx, events: event_tx, ready: ready_tx };
    (handle, mailbox)
}

/// Build an agent over `store` and run it on the tokio runtime.
pub fn spawn_agent<S>(
    store: S, policy: ConsentPolicy, clock: Arc<dyn Clock>, settings: AgentSettings,
) -> (AgentHandle, JoinHandle<()>)
where
    S: CacheStore + 'static,
{
    let (handle, mailbox) = channel(&settings);
    let agent = CacheAgent::new(store, policy, clock, settings, mailbox);
    (handle, tokio::spawn(agent.run()))
}

pub struct CacheAgent<S> {
    store: S,
    policy: ConsentPolicy,
    clock: Arc<dyn Clock>,
    settings: AgentSettings,
    commands: mpsc::Receiver<Envelope>,
    events: broadcast::Sender<Event>,
    ready: watch::Sender<bool>,
}

impl<S: CacheStore> CacheAgent<S> {
    pub fn new(store: S, policy: ConsentPolicy, clock: Arc<dyn Clock>, settings: AgentSettings, mailbox: Mailbox) -> Self {
        let Mailbox { commands, events, ready } = mailbox;
        Self { store, policy, clock, settings, commands, events, ready }
    }

    /// Run until every command sender has been dropped.
    ///
    /// Sweeps once on startup, then on every `sweep_interval` tick.
    #[tracing::instrument(skip(self))]
    pub async fn run(mut self) {
        let swept = self.sweep().await;
        info!(evicted = swept.len(), "cache agent started");
        self.ready.send_replace(true);

        let mut sweep_interval = tokio::time::interval(self.settings.sweep_interval);
        sweep_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; startup already swept.
        sweep_interval.tick().await;

        loop {
            tokio::select! {
                envelope = self.commands.recv() => {
                    match envelope {
                        Some(envelope) => self.handle(envelope).await,
                        None => break,
                    }
                }

                _ = sweep_interval.tick() => {
                    self.sweep().await;
                }
            }
        }

        self.ready.send_replace(false);
        info!("cache agent stopped");
    }

    async fn handle(&self, envelope: Envelope) {
        let Envelope { token, reply_to, command } = envelope;
        let name = command.name();
        debug!(%token, command = name, "handling command");

        let outcome = match command {
            Command::CacheWorkWithConsent { document_id, payload, consent_level } => {
                Outcome::Event { event: self.cache_work(document_id, payload, consent_level).await }
            }
            Command::ClearConsentCache { document_id } => Outcome::Event { event: self.clear_work(document_id).await },
            Command::GetOfflineWorks {} => match self.list_offline_works().await {
                Ok(works) => Outcome::Works { works },
                Err(reason) => Outcome::Failed { reason },
            },
            Command::GetOfflineWork { document_id } => match self.read_work(&document_id).await {
                Ok(work) => Outcome::Work { work },
                Err(reason) => Outcome::Failed { reason },
            },
            Command::RefreshRetention { document_id } => {
                Outcome::Event { event: self.refresh_retention(document_id).await }
            }
            Command::RevokeConsent { document_id } => Outcome::Event { event: self.revoke_consent(document_id).await },
            Command::SweepExpired {} => Outcome::Swept { document_ids: self.sweep().await },
        };

        if reply_to.send(Reply { token, outcome }).is_err() {
            debug!(%token, command = name, "client went away before reply");
        }
    }

    /// Broadcast a committed event and hand it back as the terminal outcome.
    fn publish(&self, event: Event) -> Event {
        let kind = event.kind();
        match self.events.send(event.clone()) {
            Ok(receivers) => debug!(?kind, document_id = event.document_id(), receivers, "broadcast event"),
            Err(_) => debug!(?kind, document_id = event.document_id(), "no receivers for event"),
        }
        event
    }

    fn failed(&self, document_id: String, reason: CacheFailure) -> Event {
        self.publish(Event::WorkCacheFailed { document_id, reason })
    }

    async fn cache_work(&self, document_id: String, payload: WorkPayload, consent_level: ConsentLevel) -> Event {
        let decision = self.policy.evaluate(consent_level);
        if !decision.permitted {
            // A copy made under an earlier consent level must not survive a downgrade.
            match self.withdraw(&document_id).await {
                Ok(true) => {
                    info!(%document_id, "consent withdrawn, removed existing copy");
                    self.publish(Event::WorkDeleted { document_id: document_id.clone(), reason: DeleteReason::Revoked });
                }
                Ok(false) => {}
                Err(reason) => return self.failed(document_id, reason),
            }
            return self.failed(document_id, CacheFailure::ConsentDenied);
        }

        let now = self.clock.now();
        let entry = match CacheEntry::new(document_id.as_str(), consent_level, payload, now, decision.retention) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(%document_id, error = %e, "retention window cannot be represented");
                return self.failed(document_id, CacheFailure::NotCacheable);
            }
        };

        match self.store.put(&entry).await {
            Ok(()) => {
                debug!(document_id = %entry.document_id, %consent_level, expires_at = %entry.expires_at, "cached work");
                self.publish(Event::WorkCachedWithConsent {
                    document_id: entry.document_id,
                    consent_level,
                    expires_at: entry.expires_at,
                })
            }
            Err(e) => {
                warn!(document_id = %entry.document_id, error = %e, "failed to store work");
                self.failed(entry.document_id, CacheFailure::StorageError)
            }
        }
    }

    async fn clear_work(&self, document_id: String) -> Event {
        match self.store.delete(&document_id).await {
            Ok(existed) => {
                debug!(%document_id, existed, "cleared work");
                self.publish(Event::WorkDeleted { document_id, reason: DeleteReason::Manual })
            }
            Err(e) => {
                warn!(%document_id, error = %e, "failed to clear work");
                self.failed(document_id, CacheFailure::StorageError)
            }
        }
    }

    async fn refresh_retention(&self, document_id: String) -> Event {
        let now = self.clock.now();
        let mut entry = match self.store.get(&document_id).await {
            Ok(Some(entry)) if entry.is_readable_at(now) => entry,
            Ok(_) => return self.failed(document_id, CacheFailure::NotCacheable),
            Err(e) => {
                warn!(%document_id, error = %e, "failed to load work for refresh");
                return self.failed(document_id, CacheFailure::StorageError);
            }
        };

        if entry.refresh_count >= self.settings.max_refreshes {
            info!(%document_id, refreshes = entry.refresh_count, "refresh limit reached");
            return self.failed(document_id, CacheFailure::NotCacheable);
        }

        let decision = self.policy.evaluate(entry.consent_level);
        if !decision.permitted {
            return self.failed(document_id, CacheFailure::NotCacheable);
        }

        if let Err(e) = entry.refresh(now, decision.retention) {
            warn!(%document_id, error = %e, "retention window cannot be represented");
            return self.failed(document_id, CacheFailure::NotCacheable);
        }
        match self.store.put(&entry).await {
            Ok(()) => self.publish(Event::WorkCachedWithConsent {
                document_id: entry.document_id,
                consent_level: entry.consent_level,
                expires_at: entry.expires_at,
            }),
            Err(e) => {
                warn!(%document_id, error = %e, "failed to persist refresh");
                self.failed(document_id, CacheFailure::StorageError)
            }
        }
    }

    async fn revoke_consent(&self, document_id: String) -> Event {
        if let Err(reason) = self.withdraw(&document_id).await {
            return self.failed(document_id, reason);
        }

        info!(%document_id, "revoked work");
        self.publish(Event::WorkDeleted { document_id, reason: DeleteReason::Revoked })
    }

    /// Make a copy unreadable because consent is gone; returns whether one existed.
    ///
    /// Falls back to hiding the row when it cannot be deleted. A hidden row is
    /// never served and the next sweep removes it.
    async fn withdraw(&self, document_id: &str) -> Result<bool, CacheFailure> {
        let e = match self.store.delete(document_id).await {
            Ok(existed) => return Ok(existed),
            Err(e) => e,
        };
        warn!(%document_id, error = %e, "failed to delete withdrawn work, hiding it instead");

        self.store.mark_revoked(document_id).await.map_err(|e| {
            warn!(%document_id, error = %e, "failed to hide withdrawn work");
            CacheFailure::StorageError
        })
    }

    async fn list_offline_works(&self) -> Result<Vec<CacheSummary>, CacheFailure> {
        let now = self.clock.now();
        let entries = self.store.list().await.map_err(|e| {
            warn!(error = %e, "failed to list works");
            CacheFailure::StorageError
        })?;

        Ok(entries
            .iter()
            .filter(|entry| entry.is_readable_at(now))
            .map(|entry| entry.summary_at(now))
            .collect())
    }

    async fn read_work(&self, document_id: &str) -> Result<Option<OfflineWork>, CacheFailure> {
        let now = self.clock.now();
        let entry = self.store.get(document_id).await.map_err(|e| {
            warn!(%document_id, error = %e, "failed to read work");
            CacheFailure::StorageError
        })?;

        Ok(entry.filter(|e| e.is_readable_at(now)).map(CacheEntry::into_offline_work))
    }

    /// Evict expired and revoked entries; returns the expired ids.
    async fn sweep(&self) -> Vec<String> {
        let now = self.clock.now();
        let mut expired = Vec::new();

        match self.store.list_expired_as_of(now).await {
            Ok(entries) => {
                for entry in entries {
                    match self.store.delete_if_expired(&entry.document_id, now).await {
                        Ok(true) => {
                            self.publish(Event::WorkExpired { document_id: entry.document_id.clone() });
                            expired.push(entry.document_id);
                        }
                        Ok(false) => {}
                        Err(e) => warn!(document_id = %entry.document_id, error = %e, "failed to evict expired work"),
                    }
                }
            }
            Err(e) => warn!(error = %e, "failed to scan for expired works"),
        }

        match self.store.list_revoked().await {
            Ok(entries) => {
                for entry in entries {
                    match self.store.delete(&entry.document_id).await {
                        Ok(true) => {
                            self.publish(Event::WorkDeleted { document_id: entry.document_id, reason: DeleteReason::Revoked });
                        }
                        Ok(false) => {}
                        Err(e) => warn!(document_id = %entry.document_id, error = %e, "failed to evict revoked work"),
                    }
                }
            }
            Err(e) => warn!(error = %e, "failed to scan for revoked works"),
        }

        match self.store.purge_corrupt().await {
            Ok(purged) if !purged.is_empty() => warn!(?purged, "removed unreadable cache rows"),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "failed to scan for unreadable rows"),
        }

        if !expired.is_empty() {
            info!(evicted = expired.len(), "eviction sweep");
        }
        expired
    }
}
