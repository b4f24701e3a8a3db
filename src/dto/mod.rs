//! Wire-facing data types for the game, overlay, and panel protocols.

use serde::Serialize;
use time::OffsetDateTime;

pub mod commands;
pub mod game;
pub mod overlay;
pub mod panel;
pub mod validation;

/// Seconds since the Unix epoch as a float, matching the game's timestamp
/// convention on relayed envelopes.
pub fn unix_timestamp() -> f64 {
    OffsetDateTime::now_utc().unix_timestamp_nanos() as f64 / 1_000_000_000.0
}

/// Simple health response returned by the `/healthcheck` routes.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Health status, always `"ok"` while the process is serving.
    pub status: String,
    /// Whether a game client is currently admitted.
    pub game_connected: bool,
}

impl HealthResponse {
    /// Build a health response for the given game-link state.
    pub fn new(game_connected: bool) -> Self {
        Self {
            status: "ok".to_string(),
            game_connected,
        }
    }
}
