//! The game-side WebSocket link: listener, per-connection handler, and the
//! single outbound path every service uses to reach the game.

use std::net::SocketAddr;

use anyhow::Context;
use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::{net::TcpListener, sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    dto::game::{GameInbound, GameOutbound},
    error::ServiceError,
    routes,
    services::{commands, voting_service},
    state::{SharedState, session::{Admission, GameSession}},
};

/// Serve the game-side listener until cancellation.
pub async fn run(state: SharedState, token: CancellationToken) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], state.config().game_link.port));
    let listener = TcpListener::bind(addr)
        .await
        .context("binding game listener")?;
    info!(%addr, "game listener started");

    let app = routes::game_router(state);
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(token.cancelled_owned())
        .await
        .context("serving game listener")?;
    Ok(())
}

/// Serialize `message` and deliver it to the admitted game connection.
pub async fn send_to_game(state: &SharedState, message: &GameOutbound) -> Result<(), ServiceError> {
    let payload = serde_json::to_string(message)?;
    state.game().send_text(payload).await
}

/// Handle one game connection from admission to teardown.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();

    // All writes funnel through a dedicated task so concurrent services
    // never contend on the socket sink.
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
    let writer = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let session = GameSession::new(outbound_tx.clone());
    let session_id = session.id;
    let pong = session.pong_slot();

    if state.game().admit(session).await == Admission::Rejected {
        let _ = outbound_tx.send(Message::Close(None));
        finalize(writer, outbound_tx).await;
        return;
    }

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => dispatch_inbound(&state, &outbound_tx, &text).await,
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Ok(Message::Pong(_)) => pong.fulfill(),
            Ok(Message::Close(frame)) => {
                let _ = outbound_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) => {}
            Err(err) => {
                warn!(id = %session_id, error = %err, "game websocket error");
                break;
            }
        }
    }

    state.game().release(session_id).await;

    // A vanished game cannot conclude its own vote round.
    if state.vote_poll().read().await.is_active() {
        warn!(id = %session_id, "game disconnected with a vote round active; closing the round");
        voting_service::deactivate(&state).await;
    }

    finalize(writer, outbound_tx).await;
}

/// Route one text frame from the game to the owning service.
async fn dispatch_inbound(
    state: &SharedState,
    outbound_tx: &mpsc::UnboundedSender<Message>,
    text: &str,
) {
    match serde_json::from_str::<GameInbound>(text) {
        Ok(GameInbound::ConnectionTest) => {
            debug!("game connectivity check");
            queue_message(outbound_tx, &GameOutbound::ConnectionTestSucc);
        }
        Ok(GameInbound::VotingStarted {
            num_options,
            option_names,
        }) => {
            voting_service::activate(state, num_options, option_names).await;
        }
        Ok(GameInbound::VotingEnded) => voting_service::deactivate(state).await,
        Ok(GameInbound::ShopOpen) => commands::set_shop_open(state, true).await,
        Ok(GameInbound::ShopClose) => commands::set_shop_open(state, false).await,
        Ok(GameInbound::Unknown) => warn!(payload = %text, "ignoring unknown game message type"),
        Err(err) => {
            warn!(error = %err, "invalid JSON from game");
            let _ = outbound_tx.send(Message::Text(
                r#"{"error": "Invalid JSON format"}"#.into(),
            ));
        }
    }
}

/// Serialize `message` into the writer channel, logging rather than failing;
/// the connection teardown path handles a closed writer.
fn queue_message<T: Serialize + std::fmt::Debug>(
    tx: &mpsc::UnboundedSender<Message>,
    message: &T,
) {
    match serde_json::to_string(message) {
        Ok(payload) => {
            let _ = tx.send(Message::Text(payload.into()));
        }
        Err(err) => warn!(?message, error = %err, "failed to serialize outbound message"),
    }
}

/// Close the writer channel and wait for the writer task to drain.
async fn finalize(writer: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    if let Err(err) = writer.await {
        warn!(error = %err, "game writer task failed");
    }
}
