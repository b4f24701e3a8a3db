//! Outbound session to the external control-panel service.
//!
//! The relay dials out, requests a session, and waits for a human operator
//! to pass the captcha before honouring any remote command. Reconnection is
//! governed by a persisted circuit breaker so an unreachable panel server is
//! not hammered forever.

use std::{io::ErrorKind, path::Path, time::Duration};

use anyhow::Context;
use futures::{SinkExt, StreamExt};
use tokio::time::sleep;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    config::PanelConfig,
    dto::{panel::{PanelInbound, PanelOutbound}, unix_timestamp},
    services::commands,
    state::{
        SharedState,
        breaker::{BreakerConfig, FailureOutcome, PanelBreaker},
    },
};

/// How long to wait for the `session_created` handshake reply.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Pause before redialing after a verified session ends.
const RECONNECT_PAUSE: Duration = Duration::from_secs(1);

/// Upper bound on one suppression sleep, so cancellation stays responsive
/// even under an hour-long trip deadline.
const SUPPRESSION_SLICE: Duration = Duration::from_secs(30);

/// How one panel session ended.
enum SessionEnd {
    /// Shutdown was requested.
    Cancelled,
    /// The connection closed; `verified` says whether the operator ever
    /// passed the captcha.
    Closed { verified: bool },
}

/// Maintain the panel session until cancellation.
pub async fn run(state: SharedState, token: CancellationToken) -> anyhow::Result<()> {
    let config = state.config().panel.clone();
    let mut breaker = PanelBreaker::load(
        BreakerConfig {
            path: config.breaker_path.clone(),
            max_attempts: config.max_attempts,
            attempt_cooldown: Duration::from_secs(config.attempt_cooldown_secs),
            down_window: Duration::from_secs(config.down_window_secs),
        },
        unix_timestamp() as i64,
    );
    let mut logged_suppression = false;

    loop {
        if token.is_cancelled() {
            return Ok(());
        }

        let now = unix_timestamp() as i64;
        if let Some(until) = breaker.suppressed_until(now) {
            if !logged_suppression {
                info!(until, "panel connection attempts suppressed");
                logged_suppression = true;
            }
            let wait = Duration::from_secs((until - now).max(1) as u64).min(SUPPRESSION_SLICE);
            tokio::select! {
                _ = sleep(wait) => {}
                _ = token.cancelled() => return Ok(()),
            }
            continue;
        }
        logged_suppression = false;

        match run_session(&state, &config, &token).await {
            Ok(SessionEnd::Cancelled) => return Ok(()),
            Ok(SessionEnd::Closed { verified: true }) => {
                breaker.record_success();
                info!("panel session ended; reconnecting");
                tokio::select! {
                    _ = sleep(RECONNECT_PAUSE) => {}
                    _ = token.cancelled() => return Ok(()),
                }
            }
            Ok(SessionEnd::Closed { verified: false }) => {
                handle_failure(&mut breaker, &token).await;
            }
            Err(err) => {
                warn!(error = %err, "panel connection attempt failed");
                handle_failure(&mut breaker, &token).await;
            }
        }
    }
}

/// Account for a failed attempt and wait out the retry cooldown, if any.
async fn handle_failure(breaker: &mut PanelBreaker, token: &CancellationToken) {
    match breaker.record_failure(unix_timestamp() as i64) {
        FailureOutcome::Retry { after } => {
            debug!(after_secs = after.as_secs(), "panel retry scheduled");
            tokio::select! {
                _ = sleep(after) => {}
                _ = token.cancelled() => {}
            }
        }
        FailureOutcome::Tripped { until } => {
            warn!(until, "panel presumed down; suppressing reconnect attempts");
        }
    }
}

/// Run one panel session from dial to close.
async fn run_session(
    state: &SharedState,
    config: &PanelConfig,
    token: &CancellationToken,
) -> anyhow::Result<SessionEnd> {
    info!(url = %config.url, "connecting to panel service");
    let (stream, _response) = connect_async(config.url.as_str())
        .await
        .context("connecting to panel service")?;
    let (mut write, mut read) = stream.split();

    let handshake = serde_json::to_string(&PanelOutbound::RequestSession {
        panel_username: config.username.clone(),
    })?;
    write
        .send(WsMessage::Text(handshake))
        .await
        .context("sending session request")?;

    let key = match tokio::time::timeout(HANDSHAKE_TIMEOUT, read.next()).await {
        Ok(Some(Ok(WsMessage::Text(text)))) => {
            match serde_json::from_str::<PanelInbound>(&text)
                .context("decoding handshake reply")?
            {
                PanelInbound::SessionCreated { key } => key,
                other => anyhow::bail!("unexpected handshake reply: {other:?}"),
            }
        }
        Ok(Some(Ok(other))) => anyhow::bail!("unexpected handshake frame: {other:?}"),
        Ok(Some(Err(err))) => return Err(err).context("receiving handshake reply"),
        Ok(None) => anyhow::bail!("panel closed the connection during the handshake"),
        Err(_) => anyhow::bail!("panel handshake timed out"),
    };

    info!(
        captcha = %format!("{}/{key}/captcha", config.page_url),
        "panel session created; complete the captcha to unlock it"
    );

    let mut verified = false;
    let mut last_image: Option<String> = None;
    let mut image_timer = tokio::time::interval(config.image_interval());

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                let _ = write.send(WsMessage::Close(None)).await;
                return Ok(SessionEnd::Cancelled);
            }
            _ = image_timer.tick() => {
                if !config.panel_photos || !verified {
                    continue;
                }
                if let Some(image) = read_photo(&config.photo_path, last_image.as_deref()).await {
                    let frame = serde_json::to_string(&PanelOutbound::UpdatePanelImage {
                        image: image.clone(),
                    })?;
                    if write.send(WsMessage::Text(frame)).await.is_err() {
                        return Ok(SessionEnd::Closed { verified });
                    }
                    last_image = Some(image);
                }
            }
            frame = read.next() => {
                let text = match frame {
                    Some(Ok(WsMessage::Text(text))) => text,
                    Some(Ok(WsMessage::Ping(payload))) => {
                        let _ = write.send(WsMessage::Pong(payload)).await;
                        continue;
                    }
                    Some(Ok(WsMessage::Close(_))) | None => {
                        info!("panel connection closed");
                        return Ok(SessionEnd::Closed { verified });
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(err)) => {
                        warn!(error = %err, "panel receive error");
                        return Ok(SessionEnd::Closed { verified });
                    }
                };

                match serde_json::from_str::<PanelInbound>(&text) {
                    Ok(PanelInbound::CaptchaVerified) => {
                        verified = true;
                        info!(
                            panel = %format!("{}/{key}", config.page_url),
                            "captcha verified; control panel unlocked"
                        );
                        let chat_frame = serde_json::to_string(&PanelOutbound::PublishAriralchat {
                            key: key.clone(),
                        })?;
                        if write.send(WsMessage::Text(chat_frame)).await.is_err() {
                            return Ok(SessionEnd::Closed { verified });
                        }
                    }
                    Ok(PanelInbound::Command { command, params }) => {
                        if verified {
                            commands::dispatch_panel_command(state, &command, params).await;
                        } else {
                            warn!(command = %command, "dropping panel command before captcha verification");
                        }
                    }
                    Ok(PanelInbound::PublishSuccess) => debug!("panel publish acknowledged"),
                    Ok(PanelInbound::PublishError { message }) => {
                        warn!(message = %message, "panel publish rejected");
                    }
                    Ok(PanelInbound::SessionCreated { .. }) => {
                        debug!("ignoring duplicate session_created");
                    }
                    Ok(PanelInbound::Unknown) => {
                        warn!(payload = %text, "ignoring unknown panel action");
                    }
                    Err(err) => warn!(error = %err, "malformed panel frame dropped"),
                }
            }
        }
    }
}

/// Read the base64 screenshot from disk, skipping blanks and repeats.
async fn read_photo(path: &Path, last: Option<&str>) -> Option<String> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => {
            let image = contents.trim();
            if image.is_empty() || Some(image) == last {
                None
            } else {
                Some(image.to_string())
            }
        }
        Err(err) if err.kind() == ErrorKind::NotFound => None,
        Err(err) => {
            debug!(path = %path.display(), error = %err, "failed to read panel photo");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn photo_reads_skip_blanks_and_repeats() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("photo.txt");

        assert_eq!(read_photo(&path, None).await, None, "missing file");

        tokio::fs::write(&path, "  \n").await.expect("write");
        assert_eq!(read_photo(&path, None).await, None, "blank file");

        tokio::fs::write(&path, "aGVsbG8=\n").await.expect("write");
        assert_eq!(read_photo(&path, None).await.as_deref(), Some("aGVsbG8="));
        assert_eq!(
            read_photo(&path, Some("aGVsbG8=")).await,
            None,
            "unchanged image"
        );

        tokio::fs::write(&path, "d29ybGQ=").await.expect("write");
        assert_eq!(
            read_photo(&path, Some("aGVsbG8=")).await.as_deref(),
            Some("d29ybGQ=")
        );
    }
}
