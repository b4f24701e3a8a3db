//! Spectator overlay fan-out: a broadcast hub and the per-client WebSocket loop.

use std::net::SocketAddr;

use anyhow::Context;
use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{dto::overlay::OverlayMessage, routes, state::SharedState};

/// Broadcast hub pushing serialized overlay frames to every connected client.
pub struct OverlayHub {
    sender: broadcast::Sender<String>,
}

impl OverlayHub {
    /// Construct a hub backed by a Tokio broadcast channel with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Register a new subscriber that will receive subsequent frames.
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.sender.subscribe()
    }

    /// Serialize `message` once and fan it out, ignoring delivery errors;
    /// a client that cannot keep up simply misses frames.
    pub fn broadcast(&self, message: &OverlayMessage) {
        match serde_json::to_string(message) {
            Ok(payload) => {
                let _ = self.sender.send(payload);
            }
            Err(err) => warn!(error = %err, "failed to serialize overlay message"),
        }
    }
}

/// Serve the overlay listener until cancellation.
pub async fn run(state: SharedState, token: CancellationToken) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], state.config().overlay.port));
    let listener = TcpListener::bind(addr)
        .await
        .context("binding overlay listener")?;
    info!(%addr, "overlay listener started");

    let app = routes::overlay_router(state);
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(token.cancelled_owned())
        .await
        .context("serving overlay listener")?;
    Ok(())
}

/// Handle one overlay client: send the current snapshot on join, then
/// forward hub frames until either side goes away.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();

    // A late-joining overlay must not be blind until the next push.
    let snapshot = OverlayMessage::VotingUpdate(state.vote_poll().read().await.snapshot());
    let Ok(payload) = serde_json::to_string(&snapshot) else {
        return;
    };
    if sender.send(Message::Text(payload.into())).await.is_err() {
        return;
    }

    let mut frames = state.overlay().subscribe();
    debug!("overlay client connected");

    loop {
        tokio::select! {
            frame = frames.recv() => match frame {
                Ok(payload) => {
                    if sender.send(Message::Text(payload.into())).await.is_err() {
                        // Dropped client; it must reconnect on its own.
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "overlay client lagged; skipping frames");
                    continue;
                }
                Err(RecvError::Closed) => break,
            },
            inbound = receiver.next() => match inbound {
                Some(Ok(Message::Ping(payload))) => {
                    if sender.send(Message::Pong(payload)).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(err)) => {
                    debug!(error = %err, "overlay websocket error");
                    break;
                }
                Some(Ok(_)) => {}
            },
        }
    }

    debug!("overlay client disconnected");
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;
    use tokio_tungstenite::{connect_async, tungstenite};

    use super::*;
    use crate::{config::AppConfig, state::AppState};

    #[tokio::test]
    async fn hub_fans_out_serialized_frames() {
        let hub = OverlayHub::new(4);
        let mut first = hub.subscribe();
        let mut second = hub.subscribe();

        hub.broadcast(&OverlayMessage::VotingResult {
            winner: "1. Rain (2 votes)".into(),
        });

        for receiver in [&mut first, &mut second] {
            let payload = receiver.recv().await.expect("frame");
            let json: serde_json::Value = serde_json::from_str(&payload).expect("json");
            assert_eq!(json["type"], "voting_result");
        }
    }

    #[tokio::test]
    async fn joining_client_receives_the_current_snapshot() {
        let state = AppState::new(AppConfig::default());
        {
            let mut poll = state.vote_poll().write().await;
            poll.activate(2, vec!["Rain".into(), "Fog".into()]);
            poll.process_vote("alice", 0);
            poll.process_vote("bob", 0);
        }

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let app = routes::overlay_router(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app.into_make_service()).await.ok();
        });

        let (stream, _) = connect_async(format!("ws://{addr}/ws"))
            .await
            .expect("connect");
        let (_, mut read) = stream.split();

        let frame = read.next().await.expect("frame").expect("ws");
        let tungstenite::Message::Text(text) = frame else {
            panic!("expected text frame, got {frame:?}");
        };
        let json: serde_json::Value = serde_json::from_str(&text).expect("json");
        assert_eq!(json["type"], "voting_update");
        assert_eq!(json["active"], true);
        assert_eq!(json["total_votes"], 2);
        assert_eq!(json["options"][0]["votes"], 2);

        // Subsequent hub broadcasts keep flowing to the same client.
        state.overlay().broadcast(&OverlayMessage::VotingResult {
            winner: "1. Rain (2 votes)".into(),
        });
        let frame = read.next().await.expect("frame").expect("ws");
        let tungstenite::Message::Text(text) = frame else {
            panic!("expected text frame, got {frame:?}");
        };
        let json: serde_json::Value = serde_json::from_str(&text).expect("json");
        assert_eq!(json["type"], "voting_result");
    }
}
