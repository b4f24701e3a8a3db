//! Service layer: the relay's long-running tasks and the business logic
//! shared by the chat and panel control surfaces.

/// Chat surface seam and inbound chat message routing.
pub mod chat;
/// Feature gates, cooldowns, and relay of business commands to the game.
pub mod commands;
/// Game-side WebSocket listener and outbound delivery path.
pub mod game_link;
/// Spectator overlay listener and broadcast hub.
pub mod overlay;
/// Outbound session to the external control-panel service.
pub mod panel;
/// Vote round orchestration and the periodic tally push.
pub mod voting_service;
