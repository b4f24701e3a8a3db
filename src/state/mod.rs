//! Central application state shared by every relay subsystem.

pub mod breaker;
pub mod session;
pub mod voting;

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use dashmap::DashMap;
use tokio::{sync::RwLock, time::Instant};

use crate::{
    config::AppConfig,
    services::{chat::ChatSurface, overlay::OverlayHub},
    state::{session::GameRegistry, voting::VotePoll},
    supervisor::{BackoffPolicy, Supervisor},
};

/// Shared handle to [`AppState`]; cloning bumps an `Arc`.
pub type SharedState = Arc<AppState>;

/// Capacity of the overlay fan-out channel.
const OVERLAY_CHANNEL_CAPACITY: usize = 16;

/// Central application state: configuration snapshot, supervisor handle,
/// the single game-connection slot, the vote round, the overlay hub, the
/// optional chat surface, and the per-user cooldown ledgers.
pub struct AppState {
    config: Arc<AppConfig>,
    supervisor: Arc<Supervisor>,
    game: GameRegistry,
    poll: RwLock<VotePoll>,
    overlay: OverlayHub,
    chat: RwLock<Option<Arc<dyn ChatSurface>>>,
    shop_open: AtomicBool,
    email_cooldowns: DashMap<String, Instant>,
    shop_cooldowns: DashMap<String, Instant>,
    hint_cooldowns: DashMap<String, Instant>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    pub fn new(config: AppConfig) -> SharedState {
        let probe_timeout = config.game_link.probe_timeout();
        Arc::new(Self {
            config: Arc::new(config),
            supervisor: Supervisor::new(BackoffPolicy::default()),
            game: GameRegistry::new(probe_timeout),
            poll: RwLock::new(VotePoll::new()),
            overlay: OverlayHub::new(OVERLAY_CHANNEL_CAPACITY),
            chat: RwLock::new(None),
            shop_open: AtomicBool::new(false),
            email_cooldowns: DashMap::new(),
            shop_cooldowns: DashMap::new(),
            hint_cooldowns: DashMap::new(),
        })
    }

    /// Immutable configuration snapshot.
    pub fn config(&self) -> &Arc<AppConfig> {
        &self.config
    }

    /// Supervisor running the relay's long-lived tasks.
    pub fn supervisor(&self) -> &Arc<Supervisor> {
        &self.supervisor
    }

    /// Single-slot broker for the game connection.
    pub fn game(&self) -> &GameRegistry {
        &self.game
    }

    /// The (at most one) audience vote round.
    pub fn vote_poll(&self) -> &RwLock<VotePoll> {
        &self.poll
    }

    /// Fan-out hub feeding spectator overlay clients.
    pub fn overlay(&self) -> &OverlayHub {
        &self.overlay
    }

    /// Install the chat surface used for replies and announcements.
    pub async fn attach_chat(&self, surface: Arc<dyn ChatSurface>) {
        let mut guard = self.chat.write().await;
        *guard = Some(surface);
    }

    /// Current chat surface, if one is attached.
    pub async fn chat_surface(&self) -> Option<Arc<dyn ChatSurface>> {
        self.chat.read().await.as_ref().cloned()
    }

    /// Whether the in-game shop is currently open.
    pub fn shop_is_open(&self) -> bool {
        self.shop_open.load(Ordering::SeqCst)
    }

    /// Record the shop state, returning the previous value so callers can
    /// act on the closed-to-open edge exactly once.
    pub fn swap_shop_open(&self, open: bool) -> bool {
        self.shop_open.swap(open, Ordering::SeqCst)
    }

    /// Per-user email cooldown ledger.
    pub fn email_cooldowns(&self) -> &DashMap<String, Instant> {
        &self.email_cooldowns
    }

    /// Per-user shop cooldown ledger.
    pub fn shop_cooldowns(&self) -> &DashMap<String, Instant> {
        &self.shop_cooldowns
    }

    /// Per-user hint cooldown ledger.
    pub fn hint_cooldowns(&self) -> &DashMap<String, Instant> {
        &self.hint_cooldowns
    }
}
