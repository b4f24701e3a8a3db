//! Chat-facing surface: the reply/announce seam and the inbound message router.
//!
//! The relay itself never speaks a chat protocol; a platform adapter attaches
//! a [`ChatSurface`] at startup and forwards every chat line and redemption
//! here.

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::{
    dto::commands::{HintRequest, ShopRequest, has_field_markers, parse_email_command},
    error::ServiceError,
    services::{
        commands::{self, CommandOrigin, DirectiveKind},
        voting_service,
    },
    state::SharedState,
};

/// Outbound side of whatever chat platform is attached.
#[async_trait]
pub trait ChatSurface: Send + Sync {
    /// Address `user` directly in chat.
    async fn reply(&self, user: &str, message: &str);

    /// Post `message` to the whole channel.
    async fn announce(&self, message: &str);
}

/// Reply to `user`, or log and drop when no surface is attached.
pub async fn reply(state: &SharedState, user: &str, message: &str) {
    match state.chat_surface().await {
        Some(chat) => chat.reply(user, message).await,
        None => debug!(user, message, "no chat surface attached; dropping reply"),
    }
}

/// Announce to the channel, or log and drop when no surface is attached.
pub async fn announce(state: &SharedState, message: &str) {
    match state.chat_surface().await {
        Some(chat) => chat.announce(message).await,
        None => debug!(message, "no chat surface attached; dropping announcement"),
    }
}

/// Route one chat line: bare numbers are ballots, `!`-prefixed lines are
/// commands, everything else is conversation and ignored.
pub async fn dispatch_message(state: &SharedState, user: &str, text: &str) {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return;
    }

    if trimmed.chars().all(|c| c.is_ascii_digit()) {
        if let Ok(choice) = trimmed.parse::<usize>() {
            voting_service::process_vote(state, user, choice).await;
        }
        return;
    }

    let Some(rest) = trimmed.strip_prefix('!') else {
        return;
    };
    let (command, args) = match rest.split_once(char::is_whitespace) {
        Some((command, args)) => (command, args.trim()),
        None => (rest, ""),
    };

    match command {
        "email" => handle_email(state, user, args).await,
        "shop" => handle_shop(state, user, args).await,
        "hint" => handle_hint(state, user, args).await,
        // Other bots own their own prefixes.
        _ => {}
    }
}

/// Relay a channel-point redemption straight to the game as a chaos directive.
pub async fn dispatch_redemption(state: &SharedState, user: &str, command: &str) {
    info!(user, command, "channel points redemption");
    if let Err(err) = commands::relay_directive(state, DirectiveKind::Chaos, command).await {
        warn!(user, command, error = %err, "could not relay redemption to game");
    }
}

async fn handle_email(state: &SharedState, user: &str, args: &str) {
    // Simple format: a markerless message becomes the body, with the
    // sender's name as the subject.
    let content = if !args.is_empty() && !has_field_markers(args) {
        format!("subject:{user} body:{args}")
    } else {
        args.to_string()
    };

    let Some(request) = parse_email_command(&content) else {
        reply(
            state,
            user,
            "To send emails, use either:\n1. Simple format: !email your message\n2. Detailed format: !email subject:<email subject> body:<email body> user:<username>",
        )
        .await;
        return;
    };

    let origin = CommandOrigin::Chat { user: user.into() };
    match commands::send_email(state, &origin, request).await {
        Ok(()) => {}
        Err(ServiceError::Disabled(_)) => {
            reply(state, user, "Emails are currently disabled.").await;
        }
        Err(ServiceError::InvalidInput(_)) => {
            reply(
                state,
                user,
                "Please use a valid user. e.g Dr_Bao, Dr_Ken...",
            )
            .await;
        }
        Err(ServiceError::Cooldown { remaining_secs }) => {
            let message = format!(
                "You're on cooldown. You can send another email in {remaining_secs} seconds."
            );
            reply(state, user, &message).await;
        }
        Err(err) => debug!(user, error = %err, "email command dropped"),
    }
}

async fn handle_shop(state: &SharedState, user: &str, args: &str) {
    // Item names are single tokens on the game side.
    let Some(item) = args.split_whitespace().next() else {
        let status = if state.shop_is_open() { "open" } else { "closed" };
        let message = format!(
            "You can order items from the shop using !shop <item>. The shop is currently {status}."
        );
        reply(state, user, &message).await;
        return;
    };

    let origin = CommandOrigin::Chat { user: user.into() };
    let request = ShopRequest {
        item: item.into(),
        amount: 1,
    };
    match commands::send_shop(state, &origin, request).await {
        Ok(()) => {}
        Err(ServiceError::ShopClosed) => {
            reply(
                state,
                user,
                "The shop is currently closed. Please wait for it to open.",
            )
            .await;
        }
        Err(ServiceError::Cooldown { remaining_secs }) => {
            let message =
                format!("You're on cooldown. You can use the shop again in {remaining_secs} seconds.");
            reply(state, user, &message).await;
        }
        Err(err) => debug!(user, error = %err, "shop command dropped"),
    }
}

async fn handle_hint(state: &SharedState, user: &str, args: &str) {
    if args.is_empty() {
        reply(state, user, "To send hints, type !hint <your hint>").await;
        return;
    }

    let origin = CommandOrigin::Chat { user: user.into() };
    let request = HintRequest {
        kind: "hint".into(),
        text: args.into(),
    };
    match commands::send_hint(state, &origin, request).await {
        Ok(()) => {}
        Err(ServiceError::Cooldown { remaining_secs }) => {
            let message =
                format!("You're on cooldown. You can send another hint in {remaining_secs} seconds.");
            reply(state, user, &message).await;
        }
        Err(err) => debug!(user, error = %err, "hint command dropped"),
    }
}


#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{testing::RecordingChat, *};
    use crate::{config::AppConfig, state::AppState};

    async fn state_with_chat() -> (SharedState, Arc<RecordingChat>) {
        let state = AppState::new(AppConfig::default());
        let chat = Arc::new(RecordingChat::default());
        state.attach_chat(chat.clone()).await;
        (state, chat)
    }

    #[tokio::test]
    async fn numeric_lines_are_ballots() {
        let (state, _chat) = state_with_chat().await;
        state
            .vote_poll()
            .write()
            .await
            .activate(2, vec!["A".into(), "B".into()]);

        dispatch_message(&state, "alice", " 2 ").await;
        assert_eq!(state.vote_poll().read().await.vote_counts(), vec![0, 1]);
    }

    #[tokio::test]
    async fn zero_ballot_is_ignored() {
        let (state, _chat) = state_with_chat().await;
        state
            .vote_poll()
            .write()
            .await
            .activate(2, vec!["A".into(), "B".into()]);

        dispatch_message(&state, "alice", "0").await;
        assert_eq!(state.vote_poll().read().await.vote_counts(), vec![0, 0]);
    }

    #[tokio::test]
    async fn bare_email_command_gets_usage_reply() {
        let (state, chat) = state_with_chat().await;
        dispatch_message(&state, "alice", "!email").await;
        dispatch_message(&state, "alice", "!email subject: body:x").await;

        let replies = chat.replies.lock().expect("lock");
        assert_eq!(replies.len(), 2);
        assert!(replies[0].1.starts_with("To send emails"));
        assert!(replies[1].1.starts_with("To send emails"));
    }

    #[tokio::test]
    async fn simple_email_format_uses_the_sender_as_subject() {
        use crate::state::session::GameSession;
        use axum::extract::ws::Message;
        use tokio::sync::mpsc;

        let (state, _chat) = state_with_chat().await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        state.game().admit(GameSession::new(tx)).await;

        dispatch_message(&state, "alice", "!email hello there").await;

        let Message::Text(text) = rx.try_recv().expect("frame") else {
            panic!("expected text frame");
        };
        let json: serde_json::Value = serde_json::from_str(&text).expect("json");
        assert_eq!(json["type"], "email");
        assert_eq!(json["data"]["subject"], "alice");
        assert_eq!(json["data"]["body"], "hello there");
    }

    #[tokio::test]
    async fn bare_shop_command_reports_status() {
        let (state, chat) = state_with_chat().await;
        dispatch_message(&state, "alice", "!shop").await;

        let replies = chat.replies.lock().expect("lock");
        assert!(replies[0].1.contains("currently closed"));
    }

    #[tokio::test]
    async fn closed_shop_order_is_refused() {
        let (state, chat) = state_with_chat().await;
        dispatch_message(&state, "alice", "!shop flashlight").await;

        let replies = chat.replies.lock().expect("lock");
        assert_eq!(
            replies[0].1,
            "The shop is currently closed. Please wait for it to open."
        );
    }

    #[tokio::test]
    async fn conversation_and_foreign_commands_are_ignored() {
        let (state, chat) = state_with_chat().await;
        dispatch_message(&state, "alice", "hello everyone").await;
        dispatch_message(&state, "alice", "!songrequest something").await;

        assert!(chat.replies.lock().expect("lock").is_empty());
        assert!(chat.announcements.lock().expect("lock").is_empty());
    }
}
