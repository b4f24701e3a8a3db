//! Push messages sent to spectator overlay clients.

use serde::Serialize;

/// Messages fanned out over the overlay WebSocket.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum OverlayMessage {
    /// Periodic state of the running (or just-closed) vote round.
    #[serde(rename = "voting_update")]
    VotingUpdate(VotingUpdate),
    /// Final outcome of a round; the overlay page dwells on it for a few
    /// seconds before hiding itself.
    #[serde(rename = "voting_result")]
    VotingResult {
        /// Rendered winner or tie announcement.
        winner: String,
    },
}

/// Snapshot of the vote tallies as shown to spectators.
#[derive(Debug, Clone, Serialize)]
pub struct VotingUpdate {
    /// Whether a round is currently accepting votes.
    pub active: bool,
    /// Per-option state, in ballot order.
    pub options: Vec<OverlayOption>,
    /// Sum of all tallies.
    pub total_votes: u32,
}

/// One ballot option as shown to spectators.
#[derive(Debug, Clone, Serialize)]
pub struct OverlayOption {
    /// 1-indexed display number (chat votes with these digits).
    pub index: usize,
    /// Option display name.
    pub name: String,
    /// Current tally.
    pub votes: u32,
}
