//! Single-slot registry for the one admitted game connection.

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use axum::{body::Bytes, extract::ws::Message};
use tokio::sync::{Mutex, mpsc, oneshot};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::ServiceError;

/// Hand-off point between a liveness probe and the socket reader.
///
/// The prober arms the slot and awaits the receiver; the reader fulfills it
/// when a pong frame arrives. Kept outside the registry lock so the reader
/// never has to take that lock to answer a probe.
#[derive(Clone, Default)]
pub struct PongSlot(Arc<StdMutex<Option<oneshot::Sender<()>>>>);

impl PongSlot {
    fn arm(&self) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        *self.0.lock().expect("pong slot lock poisoned") = Some(tx);
        rx
    }

    /// Signal that a pong frame arrived. No-op when no probe is pending.
    pub fn fulfill(&self) {
        if let Some(tx) = self.0.lock().expect("pong slot lock poisoned").take() {
            let _ = tx.send(());
        }
    }
}

/// Handle to the admitted game connection.
#[derive(Clone)]
pub struct GameSession {
    /// Identifier for log correlation and ownership checks.
    pub id: Uuid,
    /// Writer channel feeding the connection's dedicated send task.
    pub tx: mpsc::UnboundedSender<Message>,
    pong: PongSlot,
}

impl GameSession {
    /// Wrap a writer channel into a session with a fresh identity.
    pub fn new(tx: mpsc::UnboundedSender<Message>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tx,
            pong: PongSlot::default(),
        }
    }

    /// Clone of the pong slot, for the socket reader to fulfill probes.
    pub fn pong_slot(&self) -> PongSlot {
        self.pong.clone()
    }

    /// Ping the connection and wait for a pong within `timeout`.
    async fn probe(&self, timeout: Duration) -> bool {
        let rx = self.pong.arm();
        if self.tx.send(Message::Ping(Bytes::new())).is_err() {
            return false;
        }
        matches!(tokio::time::timeout(timeout, rx).await, Ok(Ok(())))
    }
}

/// Verdict of an admission attempt.
#[derive(Debug, PartialEq, Eq)]
pub enum Admission {
    /// The candidate now owns the slot.
    Admitted,
    /// A live game connection already holds the slot; the candidate must go.
    Rejected,
}

/// Broker for the single authoritative game connection.
///
/// A candidate is admitted when the slot is empty or the current occupant
/// fails a liveness probe; a provably alive occupant causes rejection, since
/// the game is single-instance from this relay's point of view.
pub struct GameRegistry {
    slot: Mutex<Option<GameSession>>,
    probe_timeout: Duration,
}

impl GameRegistry {
    /// Build an empty registry with the given probe timeout.
    pub fn new(probe_timeout: Duration) -> Self {
        Self {
            slot: Mutex::new(None),
            probe_timeout,
        }
    }

    /// Try to admit `candidate` as the game connection.
    pub async fn admit(&self, candidate: GameSession) -> Admission {
        let mut slot = self.slot.lock().await;

        if let Some(current) = slot.as_ref() {
            if current.probe(self.probe_timeout).await {
                warn!(
                    current = %current.id,
                    candidate = %candidate.id,
                    "rejecting additional game connection; current one is alive"
                );
                return Admission::Rejected;
            }
            info!(
                stale = %current.id,
                candidate = %candidate.id,
                "previous game connection is dead; replacing it"
            );
        }

        info!(id = %candidate.id, "game connected");
        *slot = Some(candidate);
        Admission::Admitted
    }

    /// Deliver `payload` to the admitted session.
    ///
    /// On transport failure the slot is cleared so the next inbound
    /// connection is freely admitted; the caller gets the failure and decides
    /// what to tell the actor. No retry: only the game can re-establish the
    /// physical transport.
    pub async fn send_text(&self, payload: String) -> Result<(), ServiceError> {
        let mut slot = self.slot.lock().await;
        let Some(session) = slot.as_ref() else {
            return Err(ServiceError::GameUnavailable);
        };

        if session.tx.send(Message::Text(payload.into())).is_err() {
            warn!(id = %session.id, "game send failed; clearing session slot");
            *slot = None;
            return Err(ServiceError::GameGone);
        }
        Ok(())
    }

    /// Clear the slot when the departing connection still owns it.
    ///
    /// A session replaced during admission must not evict its successor on
    /// the way out, hence the ownership check.
    pub async fn release(&self, id: Uuid) {
        let mut slot = self.slot.lock().await;
        if slot.as_ref().is_some_and(|session| session.id == id) {
            *slot = None;
            info!(%id, "game disconnected");
        }
    }

    /// Whether a game connection currently holds the slot.
    pub async fn connected(&self) -> bool {
        self.slot.lock().await.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROBE: Duration = Duration::from_secs(3);

    fn session() -> (GameSession, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (GameSession::new(tx), rx)
    }

    /// Answer pings on `rx` by fulfilling the session's pong slot, the way
    /// the real socket reader does.
    fn spawn_pong_responder(pong: PongSlot, mut rx: mpsc::UnboundedReceiver<Message>) {
        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                if matches!(message, Message::Ping(_)) {
                    pong.fulfill();
                }
            }
        });
    }

    #[tokio::test(start_paused = true)]
    async fn empty_slot_admits_candidate() {
        let registry = GameRegistry::new(PROBE);
        let (candidate, _rx) = session();
        assert_eq!(registry.admit(candidate).await, Admission::Admitted);
        assert!(registry.connected().await);
    }

    #[tokio::test(start_paused = true)]
    async fn live_session_causes_rejection() {
        let registry = GameRegistry::new(PROBE);
        let (first, first_rx) = session();
        spawn_pong_responder(first.pong_slot(), first_rx);
        registry.admit(first).await;

        let (second, _rx) = session();
        assert_eq!(registry.admit(second).await, Admission::Rejected);
    }

    #[tokio::test(start_paused = true)]
    async fn dead_session_is_replaced() {
        let registry = GameRegistry::new(PROBE);
        let (first, _first_rx) = session();
        let first_id = first.id;
        registry.admit(first).await;

        // Nobody answers the probe for the first session, so the timeout
        // elapses and the candidate takes the slot.
        let (second, _second_rx) = session();
        let second_id = second.id;
        assert_eq!(registry.admit(second).await, Admission::Admitted);

        registry.release(first_id).await;
        assert!(registry.connected().await, "stale release must not evict the successor");
        registry.release(second_id).await;
        assert!(!registry.connected().await);
    }

    #[tokio::test(start_paused = true)]
    async fn closed_writer_is_treated_as_dead() {
        let registry = GameRegistry::new(PROBE);
        let (first, first_rx) = session();
        drop(first_rx);
        registry.admit(first).await;

        let (second, _rx) = session();
        assert_eq!(registry.admit(second).await, Admission::Admitted);
    }

    #[tokio::test(start_paused = true)]
    async fn send_failure_clears_the_slot() {
        let registry = GameRegistry::new(PROBE);
        let (session, rx) = session();
        drop(rx);
        registry.admit(session).await;

        let err = registry.send_text("{}".into()).await.unwrap_err();
        assert!(matches!(err, ServiceError::GameGone));
        assert!(!registry.connected().await);

        let err = registry.send_text("{}".into()).await.unwrap_err();
        assert!(matches!(err, ServiceError::GameUnavailable));
    }
}
