//! Vote round orchestration: opening/closing rounds, the periodic tally
//! push, and ballot intake from chat.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    dto::{game::GameOutbound, overlay::OverlayMessage},
    services::game_link,
    state::SharedState,
    supervisor::RestartPolicy,
};

/// Supervised task name for the periodic tally push.
const TALLY_TASK: &str = "vote-tally";

/// Cadence of tally pushes to the game and the overlay.
const TALLY_INTERVAL: Duration = Duration::from_secs(1);

/// Open a vote round and start the tally push task.
///
/// The task runs under [`RestartPolicy::OnFailure`]: when the round ends the
/// loop exits cleanly and the task retires instead of restarting.
pub async fn activate(state: &SharedState, option_count: usize, names: Vec<String>) {
    state.vote_poll().write().await.activate(option_count, names);
    info!(options = option_count, "vote round opened");

    let task_state = state.clone();
    state
        .supervisor()
        .spawn(TALLY_TASK, RestartPolicy::OnFailure, move |token| {
            let state = task_state.clone();
            async move { tally_loop(state, token).await }
        });
}

/// Close the current round, stop the tally push, and publish the result.
///
/// With at least one vote cast, only a result frame goes out; the overlay
/// dwells on it, and an inactive update now would wipe it. A round with zero
/// votes has no result, so the overlay just gets the inactive snapshot.
pub async fn deactivate(state: &SharedState) {
    let outcome = state.vote_poll().write().await.deactivate();
    state.supervisor().stop(TALLY_TASK).await;

    match outcome {
        Some(outcome) => {
            info!(result = %outcome, "vote round closed");
            state.overlay().broadcast(&OverlayMessage::VotingResult {
                winner: outcome.to_string(),
            });
        }
        None => {
            info!("vote round closed with no votes");
            let snapshot = state.vote_poll().read().await.snapshot();
            state
                .overlay()
                .broadcast(&OverlayMessage::VotingUpdate(snapshot));
        }
    }
}

/// Record a ballot cast in chat using the 1-indexed display numbering.
pub async fn process_vote(state: &SharedState, voter: &str, display_choice: usize) {
    // Display numbering starts at 1; there is no option zero.
    let Some(choice) = display_choice.checked_sub(1) else {
        return;
    };
    let accepted = state.vote_poll().write().await.process_vote(voter, choice);
    if accepted {
        debug!(voter, choice = display_choice, "vote accepted");
    }
}

async fn tally_loop(state: SharedState, token: CancellationToken) -> anyhow::Result<()> {
    let mut ticker = tokio::time::interval(TALLY_INTERVAL);
    loop {
        tokio::select! {
            _ = token.cancelled() => return Ok(()),
            _ = ticker.tick() => {}
        }

        let (active, counts, snapshot) = {
            let poll = state.vote_poll().read().await;
            (poll.is_active(), poll.vote_counts(), poll.snapshot())
        };
        if !active {
            return Ok(());
        }

        // A push that cannot reach the game is not fatal to the round.
        if let Err(err) = game_link::send_to_game(&state, &GameOutbound::VoteUpdate { votes: counts }).await {
            debug!(error = %err, "could not push tally to game");
        }
        state
            .overlay()
            .broadcast(&OverlayMessage::VotingUpdate(snapshot));
    }
}

#[cfg(test)]
mod tests {
    use axum::extract::ws::Message;
    use tokio::sync::mpsc;

    use super::*;
    use crate::{config::AppConfig, state::AppState, state::session::GameSession};

    async fn state_with_game() -> (SharedState, mpsc::UnboundedReceiver<Message>) {
        let state = AppState::new(AppConfig::default());
        let (tx, rx) = mpsc::unbounded_channel();
        state.game().admit(GameSession::new(tx)).await;
        (state, rx)
    }

    fn parse(message: Message) -> serde_json::Value {
        match message {
            Message::Text(text) => serde_json::from_str(&text).expect("json"),
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn tally_task_pushes_updates_while_the_round_lasts() {
        let (state, mut game_rx) = state_with_game().await;
        let mut overlay_rx = state.overlay().subscribe();

        activate(&state, 2, vec!["Rain".into(), "Fog".into()]).await;
        assert!(state.supervisor().is_running(TALLY_TASK));
        process_vote(&state, "alice", 1).await;

        // Let a couple of ticks fire.
        tokio::time::sleep(Duration::from_millis(2100)).await;

        let json = parse(game_rx.recv().await.expect("tally frame"));
        assert_eq!(json["type"], "vote_update");
        let overlay: serde_json::Value =
            serde_json::from_str(&overlay_rx.recv().await.expect("overlay frame")).expect("json");
        assert_eq!(overlay["type"], "voting_update");

        deactivate(&state).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!state.supervisor().is_running(TALLY_TASK));
    }

    #[tokio::test(start_paused = true)]
    async fn closing_a_voted_round_publishes_only_the_result() {
        let (state, _game_rx) = state_with_game().await;

        activate(&state, 2, vec!["Rain".into(), "Fog".into()]).await;
        process_vote(&state, "alice", 1).await;
        process_vote(&state, "bob", 1).await;

        // Subscribe after the round so no tally frames are queued.
        let mut overlay_rx = state.overlay().subscribe();
        deactivate(&state).await;

        let frame: serde_json::Value =
            serde_json::from_str(&overlay_rx.recv().await.expect("frame")).expect("json");
        assert_eq!(frame["type"], "voting_result");
        assert_eq!(frame["winner"], "1. Rain (2 votes)");
        assert!(overlay_rx.try_recv().is_err(), "no trailing inactive frame");
    }

    #[tokio::test(start_paused = true)]
    async fn closing_an_empty_round_publishes_an_inactive_update() {
        let (state, _game_rx) = state_with_game().await;

        activate(&state, 2, vec!["Rain".into(), "Fog".into()]).await;
        let mut overlay_rx = state.overlay().subscribe();
        deactivate(&state).await;

        let frame: serde_json::Value =
            serde_json::from_str(&overlay_rx.recv().await.expect("frame")).expect("json");
        assert_eq!(frame["type"], "voting_update");
        assert_eq!(frame["active"], false);
    }

    #[tokio::test(start_paused = true)]
    async fn display_choices_map_to_zero_indexed_tallies() {
        let (state, _game_rx) = state_with_game().await;
        activate(&state, 2, vec!["Rain".into(), "Fog".into()]).await;

        process_vote(&state, "alice", 1).await;
        process_vote(&state, "bob", 0).await;
        process_vote(&state, "carol", 3).await;

        assert_eq!(state.vote_poll().read().await.vote_counts(), vec![1, 0]);
    }

    #[tokio::test(start_paused = true)]
    async fn reopening_a_round_restarts_the_tally_task() {
        let (state, _game_rx) = state_with_game().await;

        activate(&state, 2, vec!["A".into(), "B".into()]).await;
        deactivate(&state).await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        activate(&state, 3, vec![]).await;
        assert!(state.supervisor().is_running(TALLY_TASK));
        assert_eq!(state.vote_poll().read().await.vote_counts(), vec![0, 0, 0]);
    }
}
