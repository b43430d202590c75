pub mod clients;
mod sse;
pub mod timers;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, RwLock, watch};
use uuid::Uuid;

use crate::{config::AppConfig, dao::quest_store::QuestStore, error::ServiceError};

pub use self::clients::{ClientConnection, ClientHub, NotificationGateway};
pub use self::sse::FeedHub;
pub use self::timers::{ArmedTimer, TimerSet};

/// Shared handle to the central application state.
pub type SharedState = Arc<AppState>;

/// Central application state storing live connections, timers, and storage handles.
pub struct AppState {
    quest_store: RwLock<Option<Arc<dyn QuestStore>>>,
    clients: Arc<ClientHub>,
    gateway: Arc<dyn NotificationGateway>,
    feed: FeedHub,
    timers: TimerSet,
    team_gates: DashMap<Uuid, Arc<Mutex<()>>>,
    degraded: watch::Sender<bool>,
    config: AppConfig,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig) -> SharedState {
        let clients = Arc::new(ClientHub::new());
        Self::assemble(config, clients.clone(), clients)
    }

    /// Construct state with an injected notification gateway; used by tests
    /// that observe fan-outs without live sockets.
    pub fn with_gateway(config: AppConfig, gateway: Arc<dyn NotificationGateway>) -> SharedState {
        Self::assemble(config, Arc::new(ClientHub::new()), gateway)
    }

    fn assemble(
        config: AppConfig,
        clients: Arc<ClientHub>,
        gateway: Arc<dyn NotificationGateway>,
    ) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            quest_store: RwLock::new(None),
            clients,
            gateway,
            feed: FeedHub::new(config.feed_capacity()),
            timers: TimerSet::new(),
            team_gates: DashMap::new(),
            degraded: degraded_tx,
            config,
        })
    }

    /// Immutable runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Obtain a handle to the current quest store, if one is installed.
    pub async fn quest_store(&self) -> Option<Arc<dyn QuestStore>> {
        let guard = self.quest_store.read().await;
        guard.as_ref().cloned()
    }

    /// Obtain the quest store or fail with the degraded-mode error.
    pub async fn require_quest_store(&self) -> Result<Arc<dyn QuestStore>, ServiceError> {
        self.quest_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new quest store implementation and leave degraded mode.
    pub async fn install_quest_store(&self, store: Arc<dyn QuestStore>) {
        {
            let mut guard = self.quest_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false).await;
    }

    /// Current degraded flag.
    pub async fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Update the degraded flag when the value changes.
    pub async fn update_degraded(&self, value: bool) {
        if self.is_degraded().await == value {
            return;
        }

        // send_replace keeps the flag current even with no subscribers.
        self.degraded.send_replace(value);
    }

    /// Registry of live client sockets.
    pub fn clients(&self) -> &Arc<ClientHub> {
        &self.clients
    }

    /// Gateway through which lifecycle transitions reach connected clients.
    pub fn notifications(&self) -> &Arc<dyn NotificationGateway> {
        &self.gateway
    }

    /// Broadcast hub used for the public SSE event feed.
    pub fn feed(&self) -> &FeedHub {
        &self.feed
    }

    /// Pending expiration timers keyed by active-quest record id.
    pub fn timers(&self) -> &TimerSet {
        &self.timers
    }

    /// Per-team mutex serializing assignment against the one-running-record check.
    pub fn team_gate(&self, team_id: Uuid) -> Arc<Mutex<()>> {
        self.team_gates
            .entry(team_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
