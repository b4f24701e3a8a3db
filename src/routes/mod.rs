use axum::Router;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::SharedState;

pub mod game_ws;
pub mod health;
pub mod overlay_ws;

/// Compose the game-side route tree, wiring in shared state.
pub fn game_router(state: SharedState) -> Router<()> {
    game_ws::router()
        .merge(health::router())
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Compose the overlay route tree, wiring in shared state.
pub fn overlay_router(state: SharedState) -> Router<()> {
    overlay_ws::router()
        .merge(health::router())
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
