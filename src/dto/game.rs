//! Envelopes exchanged with the game process over its WebSocket link.

use serde::{Deserialize, Serialize};

/// Messages accepted from the connected game client.
#[derive(Debug, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum GameInbound {
    /// Connectivity check; answered with [`GameOutbound::ConnectionTestSucc`].
    #[serde(rename = "connection_test")]
    ConnectionTest,
    /// A voting window opened in-game.
    #[serde(rename = "voting_started")]
    VotingStarted {
        /// Number of options on the ballot.
        #[serde(default)]
        num_options: usize,
        /// Display names for the options; padded or truncated to match
        /// `num_options` when the game sends a mismatched list.
        #[serde(default)]
        option_names: Vec<String>,
    },
    /// The voting window closed in-game.
    #[serde(rename = "voting_ended")]
    VotingEnded,
    /// The in-game shop opened.
    #[serde(rename = "shop_open")]
    ShopOpen,
    /// The in-game shop closed.
    #[serde(rename = "shop_close")]
    ShopClose,
    /// Any message type this relay does not understand.
    #[serde(other)]
    Unknown,
}

/// Messages pushed to the connected game client.
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum GameOutbound {
    /// Acknowledgement of a connectivity check.
    #[serde(rename = "connection_test_succ")]
    ConnectionTestSucc,
    /// Live tally of the active vote round, indexed by option.
    #[serde(rename = "vote_update")]
    VoteUpdate {
        /// Vote counts per option, 0-indexed.
        votes: Vec<u32>,
    },
    /// Arbitrary chaos directive relayed from a control surface.
    #[serde(rename = "trigger_chaos")]
    TriggerChaos {
        /// Effect identifier understood by the game.
        command: String,
        /// Unix seconds when the directive was relayed.
        timestamp: f64,
    },
    /// Arbitrary event directive relayed from a control surface.
    #[serde(rename = "trigger_event")]
    TriggerEvent {
        /// Event identifier understood by the game.
        command: String,
        /// Unix seconds when the directive was relayed.
        timestamp: f64,
    },
    /// Audience email delivered to the in-game inbox.
    #[serde(rename = "email")]
    Email {
        /// Email payload.
        data: EmailData,
    },
    /// Audience shop purchase.
    #[serde(rename = "shop_request")]
    ShopRequest {
        /// Chat user (or `"direct"` for panel purchases).
        username: String,
        /// Item identifier.
        item: String,
        /// Quantity ordered.
        amount: u32,
        /// Unix seconds when the purchase was relayed.
        timestamp: f64,
    },
    /// Audience hint shown in-game.
    #[serde(rename = "hint")]
    Hint {
        /// Hint payload.
        data: HintData,
    },
}

/// Payload of an [`GameOutbound::Email`] envelope.
#[derive(Debug, Serialize)]
pub struct EmailData {
    /// In-game sender persona.
    pub user: String,
    /// Chat user who submitted the email (or `"direct"`).
    pub twitch_user: String,
    /// Email subject.
    pub subject: String,
    /// Email body.
    pub body: String,
    /// Unix seconds when the email was relayed.
    pub timestamp: f64,
}

/// Payload of a [`GameOutbound::Hint`] envelope.
#[derive(Debug, Serialize)]
pub struct HintData {
    /// Hint category understood by the game.
    #[serde(rename = "type")]
    pub kind: String,
    /// Hint text.
    pub hint: String,
    /// Unix seconds when the hint was relayed.
    pub timestamp: f64,
}
