//! Session authentication, takeover, and disconnect cleanup.

use tokio::sync::mpsc;

use driftmere_domain::{ConnectionId, MapId, Player, Room, RoomKind};
use driftmere_shared::{MapRoomData, RoomKindColor, ServerMessage};

use crate::api::frames;
use crate::api::session_state::SessionInfo;
use crate::templates::TemplateValue;

use super::{error_response, ws_harvest, ws_lorekeeper, WsState};

const TERMINAL_HISTORY_LIMIT: usize = 100;

/// Handle `authenticateSession`.
///
/// Resolves the stored session and the player, reconciles with any prior
/// live session for that player (reconnect, takeover, or stale discard),
/// then registers the new session and transmits the connect bootstrap.
pub(super) async fn handle_authenticate(
    state: &WsState,
    connection_id: ConnectionId,
    tx: mpsc::Sender<ServerMessage>,
    session_token: String,
    player_name: String,
    window_id: Option<String>,
) -> Option<ServerMessage> {
    let app = &state.app;

    let stored = match app.repos.auth.validate_session(&session_token).await {
        Ok(Some(stored)) => stored,
        Ok(None) => return Some(error_response("Invalid or expired session")),
        Err(e) => {
            tracing::error!(error = %e, "Session validation failed");
            return Some(error_response("Authentication unavailable"));
        }
    };

    let mut player = match app.repos.player.get_by_name(&player_name).await {
        Ok(Some(player)) => player,
        Ok(None) => return Some(error_response("Unknown player")),
        Err(e) => {
            tracing::error!(error = %e, "Player lookup failed");
            return Some(error_response("Authentication unavailable"));
        }
    };

    // Reset rule: always-first-time characters restart at the origin room.
    if player.always_first_time {
        match starting_room(state).await {
            Some(start) => {
                if let Err(e) = app.repos.player.update_room(player.id, start.id).await {
                    tracing::error!(error = %e, "Failed to reset player room");
                } else {
                    player.room_id = start.id;
                }
            }
            None => tracing::warn!("No starting room available for reset"),
        }
    }

    // Reconcile with any existing session for this player.
    if let Some((old, channel_open)) = state.registry.find_by_player(player.id).await {
        let same_window = old.window_id == window_id;
        if !channel_open {
            // Reconnect after a dropped channel, or a stale entry from
            // another window. Either way the entry just goes away.
            state.registry.remove(old.connection_id).await;
            if same_window {
                tracing::info!(
                    old_connection_id = %old.connection_id,
                    player = %player.name,
                    "Reconnect: discarded stale session"
                );
            }
        } else {
            take_over(state, &old, &player).await;
        }
    }

    let room = match app.repos.world.room_by_id(player.room_id).await {
        Ok(Some(room)) => room,
        Ok(None) | Err(_) => return Some(error_response("Your room no longer exists")),
    };

    let info = SessionInfo {
        connection_id,
        player_id: player.id,
        player_name: player.name.clone(),
        account: stored.account,
        window_id,
        room_id: room.id,
        map_id: room.map_id,
        next_move_time: None,
        factory_slots: [None, None],
        glow_codex: None,
        pathing: None,
        auto_navigation: None,
        path_execution: None,
    };
    state.registry.register(info, tx).await;

    tracing::info!(
        connection_id = %connection_id,
        player = %player.name,
        "Player authenticated"
    );

    send_connect_bootstrap(state, connection_id, &player, &room).await;
    None
}

/// Supplant a still-open session for the same player.
async fn take_over(state: &WsState, old: &SessionInfo, player: &Player) {
    tracing::info!(
        old_connection_id = %old.connection_id,
        player = %player.name,
        "Session takeover"
    );

    // (a) End any harvest the old session holds.
    ws_harvest::interrupt_active_harvest(state, old.player_id).await;

    // (b) Spill factory widget contents onto the floor.
    let old_room = state
        .app
        .repos
        .world
        .room_by_id(old.room_id)
        .await
        .ok()
        .flatten();
    if let Some(room) = old_room.as_ref() {
        if room.kind == RoomKind::Factory {
            spill_factory_slots(state, old.connection_id, room).await;
            if state.registry.occupant_count(room.id) <= 1 {
                prune_poofables(state, room.id).await;
            }
        }
    }

    // (c) Tell the old room the character left, and refresh its frame.
    let left_notice = state
        .app
        .templates
        .render(
            "player_left_game",
            "{name} has left the game.",
            &[("name", TemplateValue::scalar(player.name.clone()))],
        )
        .await;
    state
        .registry
        .to_room(
            old.room_id,
            ServerMessage::PlayerLeft {
                player_name: player.name.clone(),
            },
            Some(old.connection_id),
        )
        .await;

    // Hold the old channel so forceClose can still be delivered after the
    // registry entry is gone.
    let old_sender = state.registry.sender_of(old.connection_id).await;

    // (d) Remove the old session; its timers die with it.
    state.registry.remove(old.connection_id).await;

    if let Some(room) = old_room.as_ref() {
        frames::send_room_update_to_occupants(state, room).await;
    }

    // (e) Force the old channel closed.
    if let Some(sender) = old_sender {
        let _ = sender.try_send(ServerMessage::ForceClose);
    }

    // (f) World-level departure notice.
    state
        .registry
        .to_all(
            ServerMessage::SystemMessage {
                message: left_notice,
            },
            None,
        )
        .await;
}

/// Everything a fresh session receives on connect.
async fn send_connect_bootstrap(
    state: &WsState,
    connection_id: ConnectionId,
    player: &Player,
    room: &Room,
) {
    frames::send_room_update(state, connection_id, room, player.always_first_time).await;
    frames::send_player_stats(state, connection_id).await;

    let entered = state
        .app
        .templates
        .render(
            "player_entered_game",
            "{name} has entered the game.",
            &[("name", TemplateValue::scalar(player.name.clone()))],
        )
        .await;
    state
        .registry
        .to_all(
            ServerMessage::PlayerJoined {
                player_name: player.name.clone(),
            },
            Some(connection_id),
        )
        .await;
    state
        .registry
        .to_all(
            ServerMessage::SystemMessage { message: entered },
            Some(connection_id),
        )
        .await;

    push_map_data(state, connection_id, room.map_id).await;

    match state
        .app
        .repos
        .history
        .terminal_history(player.id, TERMINAL_HISTORY_LIMIT)
        .await
    {
        Ok(messages) if !messages.is_empty() => {
            state
                .registry
                .to_player(connection_id, ServerMessage::TerminalHistory { messages })
                .await;
        }
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "Failed to load terminal history"),
    }

    let messages = state.app.templates.all().await;
    if !messages.is_empty() {
        state
            .registry
            .to_player(connection_id, ServerMessage::GameMessages { messages })
            .await;
    }

    ws_lorekeeper::arm_engagements(state, connection_id, room.id).await;
}

/// Transmit the current map's rooms and room-kind colors.
pub(super) async fn push_map_data(state: &WsState, connection_id: ConnectionId, map_id: MapId) {
    let app = &state.app;
    let map_name = match app.repos.world.map_by_id(map_id).await {
        Ok(Some(map)) => map.name,
        _ => String::new(),
    };
    let rooms = match app.repos.world.rooms_by_map(map_id).await {
        Ok(rooms) => rooms
            .into_iter()
            .map(|r| MapRoomData {
                room_id: r.id.to_string(),
                x: r.x,
                y: r.y,
                name: r.name,
                kind: r.kind.label().to_string(),
            })
            .collect(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to load map rooms");
            return;
        }
    };
    let room_kind_colors = match app.repos.world.room_kind_colors().await {
        Ok(colors) => colors
            .into_iter()
            .map(|(kind, color)| RoomKindColor { kind, color })
            .collect(),
        Err(_) => Vec::new(),
    };
    state
        .registry
        .to_player(
            connection_id,
            ServerMessage::MapData {
                map_id: map_id.to_string(),
                map_name,
                rooms,
                room_kind_colors,
            },
        )
        .await;
}

/// Handle connection loss for `connection_id` (§ cleanup path).
pub(crate) async fn handle_disconnect(state: &WsState, connection_id: ConnectionId) {
    // Removing the session aborts its timers and clears volatile state
    // (glow codex, path execution) with it.
    let Some(info) = state.registry.remove(connection_id).await else {
        return;
    };

    ws_harvest::interrupt_active_harvest(state, info.player_id).await;

    let room = state
        .app
        .repos
        .world
        .room_by_id(info.room_id)
        .await
        .ok()
        .flatten();

    if let Some(room) = room.as_ref() {
        if room.kind == RoomKind::Factory && info.has_factory_contents() {
            for stack in info.factory_slots.iter().flatten() {
                if let Err(e) = state
                    .app
                    .repos
                    .item
                    .add_room_item(room.id, &stack.name, stack.quantity)
                    .await
                {
                    tracing::error!(error = %e, "Failed to spill factory slot on disconnect");
                }
            }
        }
        if state.registry.occupant_count(room.id) == 0 {
            prune_poofables(state, room.id).await;
        }

        state
            .registry
            .to_room(
                room.id,
                ServerMessage::PlayerLeft {
                    player_name: info.player_name.clone(),
                },
                None,
            )
            .await;
        frames::send_room_update_to_occupants(state, room).await;
    }
}

/// Drain the session's factory slots onto the room floor.
pub(super) async fn spill_factory_slots(
    state: &WsState,
    connection_id: ConnectionId,
    room: &Room,
) {
    let Some(info) = state.registry.get(connection_id).await else {
        return;
    };
    let stacks: Vec<_> = info.factory_slots.iter().flatten().cloned().collect();
    if stacks.is_empty() {
        return;
    }
    for stack in &stacks {
        if let Err(e) = state
            .app
            .repos
            .item
            .add_room_item(room.id, &stack.name, stack.quantity)
            .await
        {
            tracing::error!(error = %e, item = %stack.name, "Failed to spill factory slot");
        }
    }
    state
        .registry
        .update(connection_id, |info| {
            info.factory_slots = [None, None];
        })
        .await;
}

pub(super) async fn prune_poofables(state: &WsState, room_id: driftmere_domain::RoomId) {
    if let Err(e) = state.app.repos.item.remove_poofable_items(room_id).await {
        tracing::error!(error = %e, "Failed to prune poofable items");
    }
}

/// The canonical starting room: the town square of the first map, falling
/// back to that map's (0, 0).
async fn starting_room(state: &WsState) -> Option<Room> {
    let maps = state.app.repos.world.all_maps().await.ok()?;
    let first = maps.first()?;
    let rooms = state.app.repos.world.rooms_by_map(first.id).await.ok()?;
    rooms
        .iter()
        .find(|r| r.name.to_lowercase().contains("town square"))
        .or_else(|| rooms.iter().find(|r| r.x == 0 && r.y == 0))
        .cloned()
}
