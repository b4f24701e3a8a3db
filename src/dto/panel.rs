//! Envelopes exchanged with the external control-panel service.
//!
//! The panel protocol tags its messages with an `action` discriminator and
//! camelCases a handful of keys; both quirks are pinned here rather than
//! leaking into the services.

use serde::{Deserialize, Serialize};

/// Messages received from the panel service.
#[derive(Debug, Deserialize)]
#[serde(tag = "action")]
pub enum PanelInbound {
    /// Handshake reply carrying the server-assigned session key.
    #[serde(rename = "session_created")]
    SessionCreated {
        /// Opaque session key; embedded in the captcha and panel URLs.
        key: String,
    },
    /// The operator completed the captcha; remote commands are now accepted.
    #[serde(rename = "captcha_verified")]
    CaptchaVerified,
    /// A command issued from the panel UI.
    #[serde(rename = "command")]
    Command {
        /// Command name (`send_email`, `shop_action`, ...).
        command: String,
        /// Command-specific parameters, decoded per command.
        #[serde(default)]
        params: serde_json::Value,
    },
    /// A previous publish was accepted.
    #[serde(rename = "publish_success")]
    PublishSuccess,
    /// A previous publish was rejected.
    #[serde(rename = "publish_error")]
    PublishError {
        /// Server-provided reason, when present.
        #[serde(default)]
        message: String,
    },
    /// Any action this relay does not understand.
    #[serde(other)]
    Unknown,
}

/// Messages sent to the panel service.
#[derive(Debug, Serialize)]
#[serde(tag = "action")]
pub enum PanelOutbound {
    /// Open a new panel session.
    #[serde(rename = "request_session")]
    RequestSession {
        /// Name shown on the panel UI.
        #[serde(rename = "panelUsername")]
        panel_username: String,
    },
    /// Register the chat feed for this session.
    #[serde(rename = "publish_ariralchat")]
    PublishAriralchat {
        /// Session key returned by the handshake.
        key: String,
    },
    /// Periodic screenshot push.
    #[serde(rename = "update_panel_image")]
    UpdatePanelImage {
        /// Base64-encoded image data.
        image: String,
    },
}

/// Parameters of a `send_email` panel command.
#[derive(Debug, Deserialize)]
pub struct EmailParams {
    /// Email subject.
    pub subject: String,
    /// Email body.
    pub content: String,
    /// Requested sender persona.
    #[serde(rename = "userType")]
    pub user_type: Option<String>,
}

/// Parameters of a `shop_action` panel command.
#[derive(Debug, Deserialize)]
pub struct ShopParams {
    /// Item identifier.
    pub item: String,
    /// Quantity ordered.
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

fn default_quantity() -> u32 {
    1
}

/// Parameters of a `send_hint` panel command.
#[derive(Debug, Deserialize)]
pub struct HintParams {
    /// Hint category.
    #[serde(rename = "type", default = "default_hint_kind")]
    pub kind: String,
    /// Hint text.
    pub text: String,
}

fn default_hint_kind() -> String {
    "hint".to_string()
}

/// Parameters of a `trigger_chaos` panel command.
#[derive(Debug, Deserialize)]
pub struct ChaosParams {
    /// Effect identifier to relay.
    pub command: String,
}

/// Parameters of a `trigger_event` panel command.
#[derive(Debug, Deserialize)]
pub struct EventParams {
    /// Event identifier to relay.
    pub event: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_request_uses_camel_case_key() {
        let json = serde_json::to_value(PanelOutbound::RequestSession {
            panel_username: "streamer".into(),
        })
        .expect("serialize");
        assert_eq!(json["action"], "request_session");
        assert_eq!(json["panelUsername"], "streamer");
    }

    #[test]
    fn session_created_carries_key() {
        let inbound: PanelInbound =
            serde_json::from_str(r#"{"action":"session_created","key":"abc123"}"#).expect("parse");
        match inbound {
            PanelInbound::SessionCreated { key } => assert_eq!(key, "abc123"),
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn command_params_stay_opaque_until_dispatch() {
        let inbound: PanelInbound = serde_json::from_str(
            r#"{"action":"command","command":"shop_action","params":{"item":"soda"}}"#,
        )
        .expect("parse");
        match inbound {
            PanelInbound::Command { command, params } => {
                assert_eq!(command, "shop_action");
                let shop: ShopParams = serde_json::from_value(params).expect("params");
                assert_eq!(shop.item, "soda");
                assert_eq!(shop.quantity, 1);
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn unknown_actions_map_to_unknown() {
        let inbound: PanelInbound =
            serde_json::from_str(r#"{"action":"surprise"}"#).expect("parse");
        assert!(matches!(inbound, PanelInbound::Unknown));
    }
}
