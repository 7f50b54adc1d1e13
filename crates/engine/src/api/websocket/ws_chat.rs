//! Player-to-player communication and presence queries.

use driftmere_domain::ConnectionId;
use driftmere_shared::ServerMessage;

use super::{error_response, WsState};

pub(super) async fn handle_resonate(
    state: &WsState,
    connection_id: ConnectionId,
    message: &str,
) -> Option<ServerMessage> {
    let session = state.registry.get(connection_id).await?;
    state
        .registry
        .to_room(
            session.room_id,
            ServerMessage::Resonated {
                player_name: session.player_name.clone(),
                message: message.to_string(),
            },
            None,
        )
        .await;
    None
}

pub(super) async fn handle_telepath(
    state: &WsState,
    connection_id: ConnectionId,
    target: &str,
    message: &str,
) -> Option<ServerMessage> {
    let session = state.registry.get(connection_id).await?;
    let sessions = state.registry.list().await;
    let Some(recipient) = sessions
        .iter()
        .find(|s| s.player_name.eq_ignore_ascii_case(target.trim()))
    else {
        return Some(error_response(&format!("{target} is not in the world")));
    };

    state
        .registry
        .to_player(
            recipient.connection_id,
            ServerMessage::Telepath {
                from: session.player_name.clone(),
                message: message.to_string(),
            },
        )
        .await;
    Some(ServerMessage::TelepathSent {
        to: recipient.player_name.clone(),
        message: message.to_string(),
    })
}

pub(super) async fn handle_who(
    state: &WsState,
    _connection_id: ConnectionId,
) -> Option<ServerMessage> {
    let mut names: Vec<String> = state
        .registry
        .list()
        .await
        .into_iter()
        .map(|s| s.player_name)
        .collect();
    names.sort();
    let count = names.len();
    Some(ServerMessage::Message {
        message: format!("Online ({count}): {}", names.join(", ")),
        html: None,
    })
}

pub(super) async fn handle_save_terminal_message(
    state: &WsState,
    connection_id: ConnectionId,
    message: &str,
) -> Option<ServerMessage> {
    let session = state.registry.get(connection_id).await?;
    if let Err(e) = state
        .app
        .repos
        .history
        .save_terminal_message(session.player_id, message)
        .await
    {
        tracing::warn!(error = %e, "Failed to save terminal message");
    }
    None
}
