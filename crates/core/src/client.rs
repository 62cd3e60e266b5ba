//! Foreground cache client.
//!
//! A per-screen facade over the agent. Each outbound command carries a fresh
//! correlation token; replies arrive on this client's own reply channel and
//! a router task hands each one to the caller waiting on that token. Events
//! are fanned out to any number of handlers registered with [`CacheClient::on_event`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::agent::AgentHandle;
use crate::consent::ConsentLevel;
use crate::error::CacheFailure;
use crate::protocol::{
    CacheReceipt, CacheSummary, Command, Envelope, Event, EventKind, OfflineWork, Outcome, Reply, WorkPayload,
};

type Pending = Arc<Mutex<HashMap<Uuid, oneshot::Sender<Outcome>>>>;
type Handler = Arc<dyn Fn(&Event) + Send + Sync>;
type Handlers = Arc<Mutex<HashMap<EventKind, Vec<(SubscriptionId, Handler)>>>>;

/// Identifies one registered event handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

pub struct CacheClient {
    commands: mpsc::Sender<Envelope>,
    replies: mpsc::UnboundedSender<Reply>,
    events: broadcast::Sender<Event>,
    ready: watch::Receiver<bool>,
    pending: Pending,
    handlers: Handlers,
    next_subscription: AtomicU64,
    timeout: Duration,
    router: JoinHandle<()>,
    dispatcher: JoinHandle<()>,
}

impl CacheClient {
    /// Connect to an agent. Must be called inside a tokio runtime.
    ///
    /// Connecting never waits for the agent; commands issued before it is
    /// ready fail with `AgentUnavailable`.
    pub fn connect(handle: &AgentHandle) -> Self {
        let (reply_tx, reply_rx) = mpsc::unbounded_channel();
        let pending: Pending = Arc::default();
        let handlers: Handlers = Arc::default();

        let router = tokio::spawn(route_replies(reply_rx, pending.clone()));
        let dispatcher = tokio::spawn(dispatch_events(handle.events.subscribe(), handlers.clone()));

        Self {
            commands: handle.commands.clone(),
            replies: reply_tx,
            events: handle.events.clone(),
            ready: handle.ready.clone(),
            pending,
            handlers,
            next_subscription: AtomicU64::new(1),
            timeout: handle.command_timeout,
            router,
            dispatcher,
        }
    }

    /// Save a work for offline reading under the owner's consent level.
    pub async fn cache_work(
        &self, document_id: impl Into<String>, payload: WorkPayload, consent_level: ConsentLevel,
    ) -> Result<CacheReceipt, CacheFailure> {
        let command = Command::CacheWorkWithConsent { document_id: document_id.into(), payload, consent_level };
        expect_cached(self.request(command).await?)
    }

    /// Remove a reader's offline copy. Succeeds whether or not a copy existed.
    pub async fn remove_work(&self, document_id: impl Into<String>) -> Result<(), CacheFailure> {
        let command = Command::ClearConsentCache { document_id: document_id.into() };
        expect_deleted(self.request(command).await?)
    }

    pub async fn list_offline_works(&self) -> Result<Vec<CacheSummary>, CacheFailure> {
        match self.request(Command::GetOfflineWorks {}).await? {
            Outcome::Works { works } => Ok(works),
            other => unexpected(other),
        }
    }

    /// Fetch the full offline copy, if one is still readable.
    pub async fn read_work(&self, document_id: impl Into<String>) -> Result<Option<OfflineWork>, CacheFailure> {
        match self.request(Command::GetOfflineWork { document_id: document_id.into() }).await? {
            Outcome::Work { work } => Ok(work),
            other => unexpected(other),
        }
    }

    /// Grant one more retention window starting now.
    pub async fn refresh_retention(&self, document_id: impl Into<String>) -> Result<CacheReceipt, CacheFailure> {
        let command = Command::RefreshRetention { document_id: document_id.into() };
        expect_cached(self.request(command).await?)
    }

    /// Drop a copy because its owner deleted the work or withdrew consent.
    pub async fn revoke_work(&self, document_id: impl Into<String>) -> Result<(), CacheFailure> {
        let command = Command::RevokeConsent { document_id: document_id.into() };
        expect_deleted(self.request(command).await?)
    }

    /// Run an eviction sweep now; returns the ids that expired.
    pub async fn sweep_now(&self) -> Result<Vec<String>, CacheFailure> {
        match self.request(Command::SweepExpired {}).await? {
            Outcome::Swept { document_ids } => Ok(document_ids),
            other => unexpected(other),
        }
    }

    /// Register a handler for one event type.
    ///
    /// Handlers run on the client's dispatcher task, in the order the agent
    /// committed the events. They must not block.
    pub fn on_event<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        lock(&self.handlers).entry(kind).or_default().push((id, Arc::new(handler)));
        id
    }

    /// Remove every handler this client registered for `kind`.
    pub fn off_event(&self, kind: EventKind) {
        lock(&self.handlers).remove(&kind);
    }

    /// Remove a single handler.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        for handlers in lock(&self.handlers).values_mut() {
            handlers.retain(|(sid, _)| *sid != id);
        }
    }

    /// Raw event stream, for async consumers.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// Send one command and wait for its correlated reply.
    ///
    /// Resolves exactly once: with the reply, `AgentUnavailable`, or
    /// `Timeout`. Nothing is retried here.
    async fn request(&self, command: Command) -> Result<Outcome, CacheFailure> {
        if !*self.ready.borrow() || self.commands.is_closed() {
            return Err(CacheFailure::AgentUnavailable);
        }

        let token = Uuid::new_v4();
        let name = command.name();
        let (tx, rx) = oneshot::channel();
        lock(&self.pending).insert(token, tx);

        let envelope = Envelope { token, reply_to: self.replies.clone(), command };
        let exchange = async {
            self.commands
                .send(envelope)
                .await
                .map_err(|_| CacheFailure::AgentUnavailable)?;
            rx.await.map_err(|_| CacheFailure::AgentUnavailable)
        };

        let result = match tokio::time::timeout(self.timeout, exchange).await {
            Ok(result) => result,
            Err(_) => {
                warn!(%token, command = name, timeout_ms = self.timeout.as_millis() as u64, "command timed out");
                Err(CacheFailure::Timeout)
            }
        };

        if result.is_err() {
            lock(&self.pending).remove(&token);
        }
        result
    }
}

impl Drop for CacheClient {
    fn drop(&mut self) {
        self.router.abort();
        self.dispatcher.abort();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn route_replies(mut replies: mpsc::UnboundedReceiver<Reply>, pending: Pending) {
    while let Some(Reply { token, outcome }) = replies.recv().await {
        let waiter = lock(&pending).remove(&token);
        match waiter {
            Some(waiter) => {
                if waiter.send(outcome).is_err() {
                    debug!(%token, "caller stopped waiting for reply");
                }
            }
            None => debug!(%token, "dropping reply with no pending caller"),
        }
    }
}

async fn dispatch_events(mut events: broadcast::Receiver<Event>, handlers: Handlers) {
    loop {
        match events.recv().await {
            Ok(event) => {
                let targets: Vec<Handler> = lock(&handlers)
                    .get(&event.kind())
                    .map(|list| list.iter().map(|(_, handler)| handler.clone()).collect())
                    .unwrap_or_default();
                for handler in targets {
                    handler(&event);
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "event subscriber lagged, some events were dropped");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn expect_cached(outcome: Outcome) -> Result<CacheReceipt, CacheFailure> {
    match outcome {
        Outcome::Event { event: Event::WorkCachedWithConsent { document_id, consent_level, expires_at } } => {
            Ok(CacheReceipt { document_id, consent_level, expires_at })
        }
        Outcome::Event { event: Event::WorkCacheFailed { reason, .. } } | Outcome::Failed { reason } => Err(reason),
        other => unexpected(other),
    }
}

fn expect_deleted(outcome: Outcome) -> Result<(), CacheFailure> {
    match outcome {
        Outcome::Event { event: Event::WorkDeleted { .. } } => Ok(()),
        Outcome::Event { event: Event::WorkCacheFailed { reason, .. } } | Outcome::Failed { reason } => Err(reason),
        other => unexpected(other),
    }
}

fn unexpected<T>(outcome: Outcome) -> Result<T, CacheFailure> {
    match outcome {
        Outcome::Failed { reason } | Outcome::Event { event: Event::WorkCacheFailed { reason, .. } } => Err(reason),
        other => {
            warn!(?other, "unexpected reply from cache agent");
            Err(CacheFailure::NotCacheable)
        }
    }
}
