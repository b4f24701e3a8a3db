//! Chaos relay binary entrypoint wiring the game link, overlay, and panel tasks.

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chaos_relay::{
    config::AppConfig,
    services::{game_link, overlay, panel},
    state::AppState,
    supervisor::RestartPolicy,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let state = AppState::new(config);
    let supervisor = state.supervisor().clone();

    {
        let state = state.clone();
        supervisor.spawn("game-link", RestartPolicy::Always, move |token| {
            let state = state.clone();
            async move { game_link::run(state, token).await }
        });
    }
    {
        let state = state.clone();
        supervisor.spawn("overlay", RestartPolicy::Always, move |token| {
            let state = state.clone();
            async move { overlay::run(state, token).await }
        });
    }
    if state.config().panel.enabled {
        let state = state.clone();
        supervisor.spawn("panel", RestartPolicy::Always, move |token| {
            let state = state.clone();
            async move { panel::run(state, token).await }
        });
    } else {
        info!("panel session disabled in configuration");
    }

    shutdown_signal().await;
    info!("shutdown signal received; stopping tasks");
    supervisor.stop_all().await;

    Ok(())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
