//! Application-level configuration loading for every relay subsystem.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the relay looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/chaos-relay.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "CHAOS_RELAY_CONFIG_PATH";

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
///
/// Loaded once at startup and swapped as a whole; nothing mutates a config
/// section while a supervised task holds a reference to it.
pub struct AppConfig {
    /// Game link listener settings.
    pub game_link: GameLinkConfig,
    /// Spectator overlay listener settings.
    pub overlay: OverlayConfig,
    /// Email relay settings.
    pub emails: EmailConfig,
    /// Chat shop settings.
    pub shop: ShopConfig,
    /// Hint relay settings.
    pub hints: HintConfig,
    /// External control-panel session settings.
    pub panel: PanelConfig,
}

#[derive(Debug, Clone)]
/// Settings for the inbound game WebSocket listener.
pub struct GameLinkConfig {
    /// TCP port the game process connects to.
    pub port: u16,
    /// Seconds to wait for a pong before declaring the admitted session dead.
    pub probe_timeout_secs: u64,
}

impl GameLinkConfig {
    /// Liveness probe timeout as a [`Duration`].
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

#[derive(Debug, Clone)]
/// Settings for the spectator overlay listener.
pub struct OverlayConfig {
    /// TCP port overlay pages connect to.
    pub port: u16,
}

#[derive(Debug, Clone)]
/// Settings for audience email submissions.
pub struct EmailConfig {
    /// Whether chat users may send emails at all.
    pub enabled: bool,
    /// Per-user cooldown between emails, in seconds.
    pub user_cooldown_secs: u64,
}

#[derive(Debug, Clone)]
/// Settings for the chat shop.
pub struct ShopConfig {
    /// Whether shop requests are processed at all.
    pub enabled: bool,
    /// Per-user cooldown between purchases, in seconds.
    pub user_cooldown_secs: u64,
    /// How long the game keeps the shop open, in seconds (announcement text only).
    pub open_duration_secs: u64,
    /// Chat announcement template; `{duration}` expands to the open duration.
    pub announcement_message: String,
}

#[derive(Debug, Clone)]
/// Settings for audience hint submissions.
pub struct HintConfig {
    /// Per-user cooldown between hints, in seconds.
    pub user_cooldown_secs: u64,
}

#[derive(Debug, Clone)]
/// Settings for the outbound control-panel session.
pub struct PanelConfig {
    /// Whether the panel session task is started at all.
    pub enabled: bool,
    /// WebSocket endpoint of the panel service.
    pub url: String,
    /// Base URL of the human-facing panel pages (captcha, control panel).
    pub page_url: String,
    /// Username shown on the panel.
    pub username: String,
    /// Whether the periodic screenshot push is active.
    pub panel_photos: bool,
    /// File holding the base64-encoded panel screenshot.
    pub photo_path: PathBuf,
    /// File persisting the circuit-breaker deadline across restarts.
    pub breaker_path: PathBuf,
    /// Connection attempts tolerated before the circuit breaker trips.
    pub max_attempts: u32,
    /// Cooldown between individual connection attempts, in seconds.
    pub attempt_cooldown_secs: u64,
    /// Suppression window once the breaker has tripped, in seconds.
    pub down_window_secs: u64,
    /// Cadence of the screenshot push, in seconds.
    pub image_interval_secs: u64,
}

impl PanelConfig {
    /// Screenshot push cadence as a [`Duration`].
    pub fn image_interval(&self) -> Duration {
        Duration::from_secs(self.image_interval_secs)
    }
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(path = %path.display(), "loaded configuration");
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        RawConfig::default().into()
    }
}

#[derive(Debug, Default, Deserialize)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    #[serde(default)]
    game_link: RawGameLink,
    #[serde(default)]
    overlay: RawOverlay,
    #[serde(default)]
    emails: RawEmails,
    #[serde(default)]
    shop: RawShop,
    #[serde(default)]
    hints: RawHints,
    #[serde(default)]
    panel: RawPanel,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        Self {
            game_link: GameLinkConfig {
                port: value.game_link.port,
                probe_timeout_secs: value.game_link.probe_timeout_secs,
            },
            overlay: OverlayConfig {
                port: value.overlay.port,
            },
            emails: EmailConfig {
                enabled: value.emails.enabled,
                user_cooldown_secs: value.emails.user_cooldown_secs,
            },
            shop: ShopConfig {
                enabled: value.shop.enabled,
                user_cooldown_secs: value.shop.user_cooldown_secs,
                open_duration_secs: value.shop.open_duration_secs,
                announcement_message: value.shop.announcement_message,
            },
            hints: HintConfig {
                user_cooldown_secs: value.hints.user_cooldown_secs,
            },
            panel: PanelConfig {
                enabled: value.panel.enabled,
                url: value.panel.url,
                page_url: value.panel.page_url,
                username: value.panel.username,
                panel_photos: value.panel.panel_photos,
                photo_path: value.panel.photo_path,
                breaker_path: value.panel.breaker_path,
                max_attempts: value.panel.max_attempts,
                attempt_cooldown_secs: value.panel.attempt_cooldown_secs,
                down_window_secs: value.panel.down_window_secs,
                image_interval_secs: value.panel.image_interval_secs,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawGameLink {
    #[serde(default = "default_game_port")]
    port: u16,
    #[serde(default = "default_probe_timeout")]
    probe_timeout_secs: u64,
}

impl Default for RawGameLink {
    fn default() -> Self {
        Self {
            port: default_game_port(),
            probe_timeout_secs: default_probe_timeout(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawOverlay {
    #[serde(default = "default_overlay_port")]
    port: u16,
}

impl Default for RawOverlay {
    fn default() -> Self {
        Self {
            port: default_overlay_port(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawEmails {
    #[serde(default = "default_true")]
    enabled: bool,
    #[serde(default = "default_cooldown")]
    user_cooldown_secs: u64,
}

impl Default for RawEmails {
    fn default() -> Self {
        Self {
            enabled: true,
            user_cooldown_secs: default_cooldown(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawShop {
    #[serde(default = "default_true")]
    enabled: bool,
    #[serde(default = "default_cooldown")]
    user_cooldown_secs: u64,
    #[serde(default = "default_open_duration")]
    open_duration_secs: u64,
    #[serde(default = "default_announcement")]
    announcement_message: String,
}

impl Default for RawShop {
    fn default() -> Self {
        Self {
            enabled: true,
            user_cooldown_secs: default_cooldown(),
            open_duration_secs: default_open_duration(),
            announcement_message: default_announcement(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawHints {
    #[serde(default = "default_cooldown")]
    user_cooldown_secs: u64,
}

impl Default for RawHints {
    fn default() -> Self {
        Self {
            user_cooldown_secs: default_cooldown(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawPanel {
    #[serde(default)]
    enabled: bool,
    #[serde(default = "default_panel_url")]
    url: String,
    #[serde(default = "default_panel_page_url")]
    page_url: String,
    #[serde(default)]
    username: String,
    #[serde(default)]
    panel_photos: bool,
    #[serde(default = "default_photo_path")]
    photo_path: PathBuf,
    #[serde(default = "default_breaker_path")]
    breaker_path: PathBuf,
    #[serde(default = "default_max_attempts")]
    max_attempts: u32,
    #[serde(default = "default_attempt_cooldown")]
    attempt_cooldown_secs: u64,
    #[serde(default = "default_down_window")]
    down_window_secs: u64,
    #[serde(default = "default_image_interval")]
    image_interval_secs: u64,
}

impl Default for RawPanel {
    fn default() -> Self {
        Self {
            enabled: false,
            url: default_panel_url(),
            page_url: default_panel_page_url(),
            username: String::new(),
            panel_photos: false,
            photo_path: default_photo_path(),
            breaker_path: default_breaker_path(),
            max_attempts: default_max_attempts(),
            attempt_cooldown_secs: default_attempt_cooldown(),
            down_window_secs: default_down_window(),
            image_interval_secs: default_image_interval(),
        }
    }
}

fn default_game_port() -> u16 {
    3201
}

fn default_probe_timeout() -> u64 {
    3
}

fn default_overlay_port() -> u16 {
    3202
}

fn default_true() -> bool {
    true
}

fn default_cooldown() -> u64 {
    300
}

fn default_open_duration() -> u64 {
    120
}

fn default_announcement() -> String {
    "The shop is now open for {duration} seconds! Order with !shop <item>.".to_string()
}

fn default_panel_url() -> String {
    "wss://votv.moddy.dev/chaos-kawfee/ws".to_string()
}

fn default_panel_page_url() -> String {
    "https://votv.moddy.dev/chaos-kawfee/panel".to_string()
}

fn default_photo_path() -> PathBuf {
    PathBuf::from("png/panelPhoto.txt")
}

fn default_breaker_path() -> PathBuf {
    PathBuf::from("panel_down_until.txt")
}

fn default_max_attempts() -> u32 {
    5
}

fn default_attempt_cooldown() -> u64 {
    30
}

fn default_down_window() -> u64 {
    3600
}

fn default_image_interval() -> u64 {
    6
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
