use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    response::{Html, IntoResponse},
    routing::get,
};

use crate::{services::overlay, state::SharedState};

/// The overlay page, embedded so the binary ships self-contained.
const OVERLAY_PAGE: &str = include_str!("../../assets/overlay.html");

/// Serve the overlay page for browser sources.
pub async fn overlay_page() -> Html<&'static str> {
    Html(OVERLAY_PAGE)
}

/// Upgrade the HTTP connection into an overlay WebSocket session.
pub async fn ws_handler(
    State(state): State<SharedState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| overlay::handle_socket(state, socket))
}

/// Configure the overlay endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/", get(overlay_page))
        .route("/ws", get(ws_handler))
}
