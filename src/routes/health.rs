use axum::{Json, Router, extract::State, routing::get};

use crate::{dto::HealthResponse, state::SharedState};

/// Return the relay's health status, including game connectivity.
pub async fn healthcheck(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse::new(state.game().connected().await))
}

/// Configure the health routes subtree.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/healthcheck", get(healthcheck))
}
