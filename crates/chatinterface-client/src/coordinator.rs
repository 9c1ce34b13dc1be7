//! Session lifecycle.
//!
//! `SessionCoordinator` wires the connection, dispatcher, correlator and
//! conversation cache together and owns the session phase:
//!
//! ```text
//! Initializing ─connect─▶ Loading ─snapshot─▶ Live ◀──────────┐
//!                                              │ socket lost  │ re-load ok
//!                                              ▼              │
//!                                         Reconnecting ───────┘
//!                                              │ attempts exhausted
//!                                              ▼
//!                                          Terminated
//! ```
//!
//! Inbound frames are only dispatched while the session is Live, so after a
//! reconnect the fresh snapshot always lands before any live update.

use std::sync::{Arc, Weak};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;

use chatinterface_core::error::{ChatError, ChatResult};
use chatinterface_core::messages::{
    ClosedPayload, CompletedPayload, EventType, Frame, ReceivedPayload,
};
use chatinterface_core::transport::Connector;

use crate::api::ChatApi;
use crate::connection::{ConnectionManager, ConnectionState};
use crate::correlator::MessageCorrelator;
use crate::dispatcher::{handler, EventDispatcher, HandlerRegistry};
use crate::render::{Renderer, Severity};
use crate::session::Session;
use crate::state::{SessionState, SharedState};
use crate::store::{run_switch_loop, ActivePeer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Initializing,
    Loading,
    Live,
    Reconnecting,
    Terminated,
}

/// Reconnect schedule: after failed attempt `k` (1-based) wait
/// `base_delay * 2^k`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_secs(4),
        }
    }
}

impl ReconnectPolicy {
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// Messages fetched per peer during a snapshot load.
    pub history_limit: u32,
    pub reconnect: ReconnectPolicy,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            history_limit: 100,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

/// Outcome of a snapshot load that was good enough to go Live.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub loaded: Vec<String>,
    pub failed: Vec<String>,
}

pub struct SessionCoordinator {
    session: Session,
    config: CoordinatorConfig,
    api: Arc<dyn ChatApi>,
    renderer: Arc<dyn Renderer>,
    connection: Arc<ConnectionManager>,
    correlator: Arc<MessageCorrelator>,
    state: SharedState,
    active: ActivePeer,
    switches: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
    phase: watch::Sender<SessionPhase>,
    dispatcher: Mutex<Option<Arc<EventDispatcher>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SessionCoordinator {
    pub fn new(
        session: Session,
        api: Arc<dyn ChatApi>,
        connector: Arc<dyn Connector>,
        renderer: Arc<dyn Renderer>,
        config: CoordinatorConfig,
    ) -> Arc<Self> {
        let connection = Arc::new(ConnectionManager::new(session.socket_url.clone(), connector));
        let state = SessionState::shared();
        let correlator = Arc::new(MessageCorrelator::new(
            state.clone(),
            connection.clone(),
            renderer.clone(),
        ));
        let (active, switches) = ActivePeer::new();
        let (phase, _) = watch::channel(SessionPhase::Initializing);

        Arc::new(Self {
            session,
            config,
            api,
            renderer,
            connection,
            correlator,
            state,
            active,
            switches: Mutex::new(Some(switches)),
            phase,
            dispatcher: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Connect, load the snapshot and go Live.
    ///
    /// Any failure here is blocking: it is reported, the session is torn
    /// down and the error returned.
    pub async fn start(self: &Arc<Self>) -> ChatResult<()> {
        let (inbound, switches) = match (
            self.connection.take_inbound().await,
            self.switches.lock().await.take(),
        ) {
            (Some(inbound), Some(switches)) => (inbound, switches),
            _ => return Err(ChatError::Other("session already started".into())),
        };

        if let Err(e) = self.connection.connect(&self.session.credential).await {
            let title = match e {
                ChatError::AuthFailed(_) => "Authentication failed",
                _ => "Connection failed",
            };
            self.renderer.report(Severity::Critical, title, &e.to_string());
            self.phase.send_replace(SessionPhase::Terminated);
            return Err(e);
        }

        let (lost_tx, lost_rx) = mpsc::unbounded_channel();
        let dispatcher = Arc::new(EventDispatcher::new(self.handlers(lost_tx)));
        *self.dispatcher.lock().await = Some(dispatcher.clone());
        self.tasks.lock().await.push(tokio::spawn(dispatch_loop(
            inbound,
            dispatcher,
            self.phase.subscribe(),
        )));

        self.phase.send_replace(SessionPhase::Loading);
        if let Err(e) = self.load_snapshot().await {
            self.renderer.report(
                Severity::Critical,
                "Could not load conversations",
                &e.to_string(),
            );
            self.shutdown().await;
            return Err(e);
        }

        {
            let mut tasks = self.tasks.lock().await;
            tasks.push(tokio::spawn(run_switch_loop(
                self.state.clone(),
                self.renderer.clone(),
                switches,
            )));
            tasks.push(tokio::spawn(supervise(Arc::downgrade(self), lost_rx)));
        }

        self.phase.send_replace(SessionPhase::Live);
        tracing::info!(server = %self.session.http_origin, "session live");
        Ok(())
    }

    fn handlers(&self, lost: mpsc::UnboundedSender<String>) -> HandlerRegistry {
        let mut registry = HandlerRegistry::default();

        let correlator = self.correlator.clone();
        registry.register(
            EventType::MessageReceived,
            handler(move |data| {
                let correlator = correlator.clone();
                async move {
                    let Some(p) = decode::<ReceivedPayload>(EventType::MessageReceived, data) else {
                        return;
                    };
                    correlator.on_received(&p.sender, &p.data, p.timestamp).await;
                }
            }),
        );

        let correlator = self.correlator.clone();
        registry.register(
            EventType::MessageCompleted,
            handler(move |data| {
                let correlator = correlator.clone();
                async move {
                    let Some(p) = decode::<CompletedPayload>(EventType::MessageCompleted, data)
                    else {
                        return;
                    };
                    match correlator.on_completed(&p.id, &p.recipient).await {
                        Ok(()) => {}
                        Err(ChatError::UnknownCorrelation(id)) => {
                            tracing::debug!(id = %id, "ignoring completion for unknown message");
                        }
                        Err(e) => tracing::warn!("completion failed: {}", e),
                    }
                }
            }),
        );

        registry.register(
            EventType::ErrorClosed,
            handler(move |data| {
                let lost = lost.clone();
                async move {
                    let reason = decode::<ClosedPayload>(EventType::ErrorClosed, data)
                        .map(|p| p.reason)
                        .unwrap_or_default();
                    let _ = lost.send(reason);
                }
            }),
        );

        registry
    }

    /// Fetch identity, contacts and per-peer history, then replace the cache.
    ///
    /// Token info and contacts are required. Per-peer history failures are
    /// tolerated unless every peer fails.
    pub async fn load_snapshot(&self) -> ChatResult<LoadReport> {
        let info = self
            .api
            .show_token_info(&self.session.credential)
            .await
            .map_err(|e| ChatError::SnapshotFailed(format!("token info: {e}")))?;
        let contacts = self
            .api
            .get_contacts()
            .await
            .map_err(|e| ChatError::SnapshotFailed(format!("contacts: {e}")))?;

        let mut histories = Vec::with_capacity(contacts.len());
        let mut failed = Vec::new();
        for peer in &contacts {
            match self.api.get_messages(peer, self.config.history_limit).await {
                Ok(messages) => histories.push((peer.clone(), messages)),
                Err(e) => {
                    tracing::warn!(peer = %peer, "history fetch failed: {}", e);
                    failed.push(peer.clone());
                }
            }
        }
        if histories.is_empty() && !failed.is_empty() {
            return Err(ChatError::SnapshotFailed(
                ChatError::PartialFetch { failed }.to_string(),
            ));
        }

        let mut loaded = Vec::with_capacity(histories.len());
        {
            let mut state = self.state.lock().await;
            let renderer = self.renderer.as_ref();
            state.username = info.username;
            renderer.show_identity(&state.username);

            for (peer, messages) in histories {
                state.conversations.load(&peer, messages);
                state.list(&peer, renderer);
                loaded.push(peer);
            }
            if let Some(peer) = state.rendered.clone() {
                state.render_conversation(&peer, renderer);
            }
        }

        if !failed.is_empty() {
            let e = ChatError::PartialFetch {
                failed: failed.clone(),
            };
            self.renderer.report(
                Severity::Warning,
                "Some conversations could not be loaded",
                &e.to_string(),
            );
        }

        tracing::info!(loaded = loaded.len(), failed = failed.len(), "snapshot loaded");
        Ok(LoadReport { loaded, failed })
    }

    /// Re-establish the link after a loss.
    ///
    /// Each attempt reconnects and re-loads the snapshot; a failed attempt
    /// `k` is followed by a `base_delay * 2^k` sleep. Running out of attempts
    /// terminates the session.
    pub async fn reconnect(&self) -> ChatResult<()> {
        self.phase.send_replace(SessionPhase::Reconnecting);
        let policy = self.config.reconnect;

        for attempt in 1..=policy.max_attempts {
            self.connection.mark_reconnecting().await;
            match self.try_reconnect().await {
                Ok(()) => {
                    self.phase.send_replace(SessionPhase::Live);
                    tracing::info!(attempt, "reconnected");
                    return Ok(());
                }
                Err(e) => {
                    let delay = policy.delay_after(attempt);
                    tracing::warn!(
                        attempt,
                        delay_secs = delay.as_secs(),
                        "reconnect attempt failed: {}",
                        e
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }

        let e = ChatError::ReconnectExhausted {
            attempts: policy.max_attempts,
        };
        tracing::error!("{}", e);
        self.renderer
            .report(Severity::Critical, "Reconnect failed", &e.to_string());
        self.phase.send_replace(SessionPhase::Terminated);
        self.abort_tasks().await;
        if let Some(dispatcher) = self.dispatcher.lock().await.take() {
            dispatcher.shutdown().await;
        }
        if let Err(e) = self.connection.disconnect().await {
            tracing::debug!("disconnect after exhausted reconnect: {}", e);
        }
        Err(e)
    }

    async fn try_reconnect(&self) -> ChatResult<()> {
        self.connection.connect(&self.session.credential).await?;
        if let Err(e) = self.load_snapshot().await {
            // Drop the fresh link so the next attempt dials again.
            let _ = self.connection.disconnect().await;
            return Err(e);
        }
        Ok(())
    }

    /// Send `body` to an explicit recipient. Failures are also reported.
    pub async fn send(&self, recipient: &str, body: &str) -> ChatResult<String> {
        self.correlator.send(recipient, body).await.inspect_err(|e| {
            self.renderer
                .report(Severity::Warning, "Message not sent", &e.to_string());
        })
    }

    /// Send `body` to the active peer.
    pub async fn send_message(&self, body: &str) -> ChatResult<String> {
        let Some(peer) = self.active.get() else {
            let e = ChatError::NoActivePeer;
            self.renderer
                .report(Severity::Warning, "Message not sent", &e.to_string());
            return Err(e);
        };
        self.send(&peer, body).await
    }

    pub fn select_peer(&self, peer: impl Into<String>) {
        self.active.set(peer);
    }

    pub fn active_peer(&self) -> Option<String> {
        self.active.get()
    }

    pub fn phase(&self) -> SessionPhase {
        *self.phase.borrow()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<SessionPhase> {
        self.phase.subscribe()
    }

    pub fn state(&self) -> SharedState {
        self.state.clone()
    }

    pub async fn connection_state(&self) -> ConnectionState {
        self.connection.state().await
    }

    /// Tear everything down. Pending sends are dropped.
    pub async fn shutdown(&self) {
        self.phase.send_replace(SessionPhase::Terminated);
        self.abort_tasks().await;
        if let Some(dispatcher) = self.dispatcher.lock().await.take() {
            dispatcher.shutdown().await;
        }
        if let Err(e) = self.connection.disconnect().await {
            tracing::debug!("disconnect during shutdown: {}", e);
        }
        self.state.lock().await.pending.clear();
        tracing::info!("session shut down");
    }

    /// Abort the background tasks, except the one calling this (the
    /// supervisor, when reconnects run out).
    async fn abort_tasks(&self) {
        let current = tokio::task::try_id();
        for task in self.tasks.lock().await.drain(..) {
            if Some(task.id()) != current {
                task.abort();
            }
        }
    }
}

impl Drop for SessionCoordinator {
    fn drop(&mut self) {
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
    }
}

fn decode<T: DeserializeOwned>(event: EventType, data: Value) -> Option<T> {
    serde_json::from_value(data)
        .inspect_err(|e| tracing::warn!(event = %event, "malformed payload: {}", e))
        .ok()
}

/// Hand inbound frames to the dispatcher, holding them back until Live.
async fn dispatch_loop(
    mut inbound: mpsc::UnboundedReceiver<Frame>,
    dispatcher: Arc<EventDispatcher>,
    mut phase: watch::Receiver<SessionPhase>,
) {
    while let Some(frame) = inbound.recv().await {
        let ready = phase
            .wait_for(|p| matches!(p, SessionPhase::Live | SessionPhase::Terminated))
            .await
            .map(|p| *p);
        if !matches!(ready, Ok(SessionPhase::Live)) {
            break;
        }
        dispatcher.dispatch(frame).await;
    }
    tracing::debug!("dispatch loop ended");
}

/// React to connection losses until the session ends.
async fn supervise(coordinator: Weak<SessionCoordinator>, mut lost: mpsc::UnboundedReceiver<String>) {
    while let Some(reason) = lost.recv().await {
        let Some(coordinator) = coordinator.upgrade() else {
            break;
        };
        if coordinator.phase() == SessionPhase::Terminated {
            break;
        }
        // A link abandoned during a failed reconnect attempt reports its loss
        // late; by then a newer link may be up.
        if coordinator.connection_state().await == ConnectionState::Connected {
            tracing::debug!(reason = %reason, "ignoring loss of a replaced link");
            continue;
        }
        tracing::warn!(reason = %reason, "connection lost, reconnecting");
        coordinator
            .renderer
            .report(Severity::Warning, "Connection lost", &reason);
        if coordinator.reconnect().await.is_err() {
            break;
        }
    }
    tracing::debug!("supervisor ended");
}
