//! Business command handling shared by the chat and panel surfaces: feature
//! gates, per-user cooldowns, and relay of the resulting game envelopes.

use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{info, warn};
use validator::Validate;

use crate::{
    dto::{
        commands::{EmailRequest, HintRequest, ShopRequest},
        game::{EmailData, GameOutbound, HintData},
        panel::{ChaosParams, EmailParams, EventParams, HintParams, ShopParams},
        unix_timestamp,
        validation::is_valid_persona,
    },
    error::ServiceError,
    services::{chat, game_link},
    state::SharedState,
};

/// Default sender persona when none (or an unusable one) was requested.
const DEFAULT_PERSONA: &str = "user";

/// Username stamped on envelopes originating from the panel.
const PANEL_USERNAME: &str = "direct";

/// Who issued a business command.
///
/// Chat users are subject to feature gates and per-user cooldowns; the panel
/// operator is trusted and bypasses both.
pub enum CommandOrigin {
    /// A chat user, identified by login name.
    Chat {
        /// The acting user's login name.
        user: String,
    },
    /// The external control panel.
    Panel,
}

impl CommandOrigin {
    fn chat_user(&self) -> Option<&str> {
        match self {
            CommandOrigin::Chat { user } => Some(user),
            CommandOrigin::Panel => None,
        }
    }

    fn wire_username(&self) -> &str {
        match self {
            CommandOrigin::Chat { user } => user,
            CommandOrigin::Panel => PANEL_USERNAME,
        }
    }
}

/// Kind of directive relayed verbatim to the game.
#[derive(Debug, Clone, Copy)]
pub enum DirectiveKind {
    /// A chaos effect.
    Chaos,
    /// A game event.
    Event,
}

/// Relay an audience email to the in-game inbox.
///
/// Chat origin enforces the enabled flag, persona validity, and the per-user
/// cooldown; the panel bypasses the gates and gets an unknown persona coerced
/// to the default instead of rejected.
pub async fn send_email(
    state: &SharedState,
    origin: &CommandOrigin,
    request: EmailRequest,
) -> Result<(), ServiceError> {
    let config = &state.config().emails;
    if !config.enabled && origin.chat_user().is_some() {
        return Err(ServiceError::Disabled("emails"));
    }

    let persona = match (&request.persona, origin.chat_user()) {
        (Some(persona), _) if is_valid_persona(persona) => persona.clone(),
        (Some(persona), Some(_)) => {
            return Err(ServiceError::InvalidInput(format!(
                "unknown email persona `{persona}`"
            )));
        }
        (Some(persona), None) => {
            warn!(persona, "unknown panel persona; falling back to default");
            DEFAULT_PERSONA.to_string()
        }
        (None, _) => DEFAULT_PERSONA.to_string(),
    };

    request.validate()?;

    if let Some(user) = origin.chat_user() {
        let window = Duration::from_secs(config.user_cooldown_secs);
        check_cooldown(state.email_cooldowns(), user, window)?;
        // The cooldown charges the attempt; a delivery failure does not
        // grant a free immediate retry.
        stamp_cooldown(state.email_cooldowns(), user);
    }

    let envelope = GameOutbound::Email {
        data: EmailData {
            user: persona,
            twitch_user: origin.wire_username().into(),
            subject: request.subject.trim().into(),
            body: request.body.trim().into(),
            timestamp: unix_timestamp(),
        },
    };
    game_link::send_to_game(state, &envelope).await
}

/// Relay an audience shop purchase.
///
/// The enabled flag applies to both origins; the shop-open window and the
/// per-user cooldown apply to chat only.
pub async fn send_shop(
    state: &SharedState,
    origin: &CommandOrigin,
    request: ShopRequest,
) -> Result<(), ServiceError> {
    let config = &state.config().shop;
    if !config.enabled {
        return Err(ServiceError::Disabled("shop orders"));
    }

    request.validate()?;

    if let Some(user) = origin.chat_user() {
        if !state.shop_is_open() {
            return Err(ServiceError::ShopClosed);
        }
        let window = Duration::from_secs(config.user_cooldown_secs);
        check_cooldown(state.shop_cooldowns(), user, window)?;
        stamp_cooldown(state.shop_cooldowns(), user);
    }

    let envelope = GameOutbound::ShopRequest {
        username: origin.wire_username().into(),
        item: request.item,
        amount: request.amount,
        timestamp: unix_timestamp(),
    };
    game_link::send_to_game(state, &envelope).await
}

/// Relay an audience hint. Only the chat cooldown gates this.
pub async fn send_hint(
    state: &SharedState,
    origin: &CommandOrigin,
    request: HintRequest,
) -> Result<(), ServiceError> {
    request.validate()?;

    if let Some(user) = origin.chat_user() {
        let window = Duration::from_secs(state.config().hints.user_cooldown_secs);
        check_cooldown(state.hint_cooldowns(), user, window)?;
        stamp_cooldown(state.hint_cooldowns(), user);
    }

    let envelope = GameOutbound::Hint {
        data: HintData {
            kind: request.kind,
            hint: request.text,
            timestamp: unix_timestamp(),
        },
    };
    game_link::send_to_game(state, &envelope).await
}

/// Relay a chaos or event directive verbatim, stamping the send time.
pub async fn relay_directive(
    state: &SharedState,
    kind: DirectiveKind,
    command: &str,
) -> Result<(), ServiceError> {
    let timestamp = unix_timestamp();
    let envelope = match kind {
        DirectiveKind::Chaos => GameOutbound::TriggerChaos {
            command: command.into(),
            timestamp,
        },
        DirectiveKind::Event => GameOutbound::TriggerEvent {
            command: command.into(),
            timestamp,
        },
    };
    game_link::send_to_game(state, &envelope).await
}

/// Record a shop open/close transition announced by the game.
///
/// Announces in chat on the closed-to-open edge only, so repeated `shop_open`
/// notifications cannot spam the channel.
pub async fn set_shop_open(state: &SharedState, open: bool) {
    let was_open = state.swap_shop_open(open);
    if open == was_open {
        return;
    }
    info!(open, "shop availability changed");

    if open {
        let config = &state.config().shop;
        let announcement = config
            .announcement_message
            .replace("{duration}", &config.open_duration_secs.to_string());
        chat::announce(state, &announcement).await;
    }
}

/// Execute one panel command against the service layer.
///
/// Unknown commands and malformed parameters are logged and dropped; the
/// panel protocol has no error reply for them.
pub async fn dispatch_panel_command(state: &SharedState, command: &str, params: Value) {
    let origin = CommandOrigin::Panel;
    let result = match command {
        "send_email" => match serde_json::from_value::<EmailParams>(params) {
            Ok(email) => {
                send_email(
                    state,
                    &origin,
                    EmailRequest {
                        subject: email.subject,
                        body: email.content,
                        persona: email.user_type,
                    },
                )
                .await
            }
            Err(err) => Err(err.into()),
        },
        "shop_action" => match serde_json::from_value::<ShopParams>(params) {
            Ok(shop) => {
                send_shop(
                    state,
                    &origin,
                    ShopRequest {
                        item: shop.item,
                        amount: shop.quantity,
                    },
                )
                .await
            }
            Err(err) => Err(err.into()),
        },
        "send_hint" => match serde_json::from_value::<HintParams>(params) {
            Ok(hint) => {
                send_hint(
                    state,
                    &origin,
                    HintRequest {
                        kind: hint.kind,
                        text: hint.text,
                    },
                )
                .await
            }
            Err(err) => Err(err.into()),
        },
        "trigger_chaos" => match serde_json::from_value::<ChaosParams>(params) {
            Ok(chaos) => relay_directive(state, DirectiveKind::Chaos, &chaos.command).await,
            Err(err) => Err(err.into()),
        },
        "trigger_event" => match serde_json::from_value::<EventParams>(params) {
            Ok(event) => relay_directive(state, DirectiveKind::Event, &event.event).await,
            Err(err) => Err(err.into()),
        },
        other => {
            warn!(command = %other, "ignoring unknown panel command");
            return;
        }
    };

    match result {
        Ok(()) => info!(command, "panel command relayed"),
        Err(err) => warn!(command, error = %err, "panel command dropped"),
    }
}

fn check_cooldown(
    ledger: &DashMap<String, Instant>,
    user: &str,
    window: Duration,
) -> Result<(), ServiceError> {
    if let Some(stamped) = ledger.get(user) {
        let elapsed = stamped.elapsed();
        if elapsed < window {
            let remaining = window - elapsed;
            return Err(ServiceError::Cooldown {
                remaining_secs: remaining.as_secs().max(1),
            });
        }
    }
    Ok(())
}

fn stamp_cooldown(ledger: &DashMap<String, Instant>, user: &str) {
    ledger.insert(user.to_string(), Instant::now());
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::extract::ws::Message;
    use tokio::sync::mpsc;

    use super::*;
    use crate::{
        config::AppConfig,
        services::chat::testing::RecordingChat,
        state::{AppState, session::GameSession},
    };

    async fn state_with_game() -> (SharedState, mpsc::UnboundedReceiver<Message>) {
        let state = AppState::new(AppConfig::default());
        let (tx, rx) = mpsc::unbounded_channel();
        state.game().admit(GameSession::new(tx)).await;
        (state, rx)
    }

    fn next_json(rx: &mut mpsc::UnboundedReceiver<Message>) -> serde_json::Value {
        match rx.try_recv().expect("frame") {
            Message::Text(text) => serde_json::from_str(&text).expect("json"),
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cooldown_blocks_until_window_elapses() {
        let ledger = DashMap::new();
        let window = Duration::from_secs(300);

        assert!(check_cooldown(&ledger, "alice", window).is_ok());
        stamp_cooldown(&ledger, "alice");

        let err = check_cooldown(&ledger, "alice", window).unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Cooldown { remaining_secs } if remaining_secs <= 300
        ));

        tokio::time::advance(Duration::from_secs(301)).await;
        assert!(check_cooldown(&ledger, "alice", window).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn chat_email_is_rate_limited_per_user() {
        let (state, mut rx) = state_with_game().await;
        let origin = CommandOrigin::Chat {
            user: "alice".into(),
        };
        let request = EmailRequest {
            subject: "hi".into(),
            body: "there".into(),
            persona: None,
        };

        send_email(&state, &origin, request.clone()).await.expect("first send");
        let err = send_email(&state, &origin, request.clone()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Cooldown { .. }));

        // A different user is unaffected.
        let other = CommandOrigin::Chat { user: "bob".into() };
        send_email(&state, &other, request).await.expect("other user");

        let json = next_json(&mut rx);
        assert_eq!(json["type"], "email");
        assert_eq!(json["data"]["user"], "user");
        assert_eq!(json["data"]["twitch_user"], "alice");
    }

    #[tokio::test(start_paused = true)]
    async fn chat_rejects_unknown_persona_without_charging_cooldown() {
        let (state, _rx) = state_with_game().await;
        let origin = CommandOrigin::Chat {
            user: "alice".into(),
        };
        let request = EmailRequest {
            subject: "hi".into(),
            body: "there".into(),
            persona: Some("Nobody".into()),
        };

        let err = send_email(&state, &origin, request).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
        assert!(state.email_cooldowns().get("alice").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn panel_coerces_unknown_persona_and_skips_gates() {
        let (state, mut rx) = state_with_game().await;

        let params = serde_json::json!({
            "subject": "s", "content": "c", "userType": "Nobody"
        });
        dispatch_panel_command(&state, "send_email", params).await;

        let json = next_json(&mut rx);
        assert_eq!(json["data"]["user"], "user");
        assert_eq!(json["data"]["twitch_user"], "direct");

        // No cooldown entry for the panel.
        assert!(state.email_cooldowns().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn panel_shop_bypasses_the_open_window() {
        let (state, mut rx) = state_with_game().await;
        assert!(!state.shop_is_open());

        dispatch_panel_command(&state, "shop_action", serde_json::json!({"item": "soda"})).await;

        let json = next_json(&mut rx);
        assert_eq!(json["type"], "shop_request");
        assert_eq!(json["username"], "direct");
        assert_eq!(json["amount"], 1);
    }

    #[tokio::test(start_paused = true)]
    async fn chat_shop_requires_the_open_window() {
        let (state, _rx) = state_with_game().await;
        let origin = CommandOrigin::Chat {
            user: "alice".into(),
        };
        let request = ShopRequest {
            item: "soda".into(),
            amount: 1,
        };

        let err = send_shop(&state, &origin, request.clone()).await.unwrap_err();
        assert!(matches!(err, ServiceError::ShopClosed));

        state.swap_shop_open(true);
        send_shop(&state, &origin, request).await.expect("open shop");
    }

    #[tokio::test]
    async fn shop_open_edge_announces_exactly_once() {
        let state = AppState::new(AppConfig::default());
        let chat = Arc::new(RecordingChat::default());
        state.attach_chat(chat.clone()).await;

        set_shop_open(&state, true).await;
        set_shop_open(&state, true).await;
        set_shop_open(&state, false).await;
        set_shop_open(&state, true).await;

        let announcements = chat.announcements.lock().expect("lock");
        assert_eq!(announcements.len(), 2);
        assert!(!announcements[0].contains("{duration}"));
    }

    #[tokio::test(start_paused = true)]
    async fn directives_carry_their_command_and_a_timestamp() {
        let (state, mut rx) = state_with_game().await;

        relay_directive(&state, DirectiveKind::Chaos, "spawn_maxwell")
            .await
            .expect("chaos");
        relay_directive(&state, DirectiveKind::Event, "blood_moon")
            .await
            .expect("event");

        let chaos = next_json(&mut rx);
        assert_eq!(chaos["type"], "trigger_chaos");
        assert_eq!(chaos["command"], "spawn_maxwell");
        assert!(chaos["timestamp"].is_number());

        let event = next_json(&mut rx);
        assert_eq!(event["type"], "trigger_event");
        assert_eq!(event["command"], "blood_moon");
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_panel_params_are_dropped() {
        let (state, mut rx) = state_with_game().await;
        dispatch_panel_command(&state, "send_email", serde_json::json!({"bogus": true})).await;
        dispatch_panel_command(&state, "reboot", serde_json::json!({})).await;
        assert!(rx.try_recv().is_err());
    }
}
