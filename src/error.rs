//! Error taxonomy shared by the business-facing service layer.

use thiserror::Error;
use validator::ValidationErrors;

/// Errors surfaced by service layer operations.
///
/// Transport-level faults inside the WebSocket handlers use their own local
/// error types; this enum covers the outcomes a human actor (chat user, panel
/// operator) or a supervised task may need to react to.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// No game client is currently admitted.
    #[error("game is not connected")]
    GameUnavailable,
    /// The admitted game connection died while sending; the slot was cleared.
    #[error("game connection lost while sending")]
    GameGone,
    /// The named feature is switched off in the configuration.
    #[error("{0} are currently disabled")]
    Disabled(&'static str),
    /// Shop requests from chat are rejected while the shop is closed.
    #[error("the shop is currently closed")]
    ShopClosed,
    /// The acting user must wait before using this feature again.
    #[error("on cooldown for another {remaining_secs} seconds")]
    Cooldown {
        /// Whole seconds left before the user may retry.
        remaining_secs: u64,
    },
    /// Invalid input provided by the caller.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl From<ValidationErrors> for ServiceError {
    fn from(err: ValidationErrors) -> Self {
        ServiceError::InvalidInput(format!("validation failed: {err}"))
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::InvalidInput(err.to_string())
    }
}
