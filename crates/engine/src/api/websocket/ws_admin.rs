//! Attribute assignment, map data, and server maintenance.

use driftmere_domain::ConnectionId;
use driftmere_shared::ServerMessage;

use crate::api::frames;

use super::{error_response, ws_session, WsState};

const ATTRIBUTES: [&str; 6] = [
    "resonance",
    "fortitude",
    "vigor",
    "finesse",
    "insight",
    "presence",
];

pub(super) async fn handle_assign_attribute_point(
    state: &WsState,
    connection_id: ConnectionId,
    attribute: &str,
) -> Option<ServerMessage> {
    let session = state.registry.get(connection_id).await?;
    let attribute = attribute.trim().to_lowercase();
    if !ATTRIBUTES.contains(&attribute.as_str()) {
        return Some(error_response(&format!("Unknown attribute: {attribute}")));
    }

    let player = match state
        .app
        .repos
        .player
        .get_by_id(session.player_id)
        .await
    {
        Ok(Some(player)) => player,
        _ => return Some(error_response("Attributes are unavailable")),
    };
    if player.unspent_points <= 0 {
        return Some(error_response("You have no attribute points to spend"));
    }

    match state
        .app
        .repos
        .player
        .assign_attribute_point(session.player_id, &attribute)
        .await
    {
        Ok(_) => {
            frames::send_player_stats(state, connection_id).await;
            Some(ServerMessage::Message {
                message: format!("Your {attribute} increases."),
                html: None,
            })
        }
        Err(e) => {
            tracing::error!(error = %e, "Attribute assignment failed");
            Some(error_response("Attributes are unavailable"))
        }
    }
}

pub(super) async fn handle_get_map_data(
    state: &WsState,
    connection_id: ConnectionId,
) -> Option<ServerMessage> {
    let session = state.registry.get(connection_id).await?;
    ws_session::push_map_data(state, connection_id, session.map_id).await;
    None
}

/// Honored only on the maintenance port; anywhere else it is refused.
pub(super) async fn handle_restart_server(
    state: &WsState,
    connection_id: ConnectionId,
) -> Option<ServerMessage> {
    let session = state.registry.get(connection_id).await?;
    if !state.app.config.restart_allowed() {
        tracing::warn!(
            connection_id = %connection_id,
            player = %session.player_name,
            "restartServer refused on non-maintenance port"
        );
        return Some(error_response("Restart is not permitted on this server"));
    }

    tracing::warn!(player = %session.player_name, "Server restart requested");
    state
        .registry
        .to_all(
            ServerMessage::SystemMessage {
                message: "The world shudders; the server is restarting.".to_string(),
            },
            None,
        )
        .await;
    state.app.shutdown.notify_waiters();
    None
}
