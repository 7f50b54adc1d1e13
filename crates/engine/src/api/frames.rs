//! Canonical outbound frame builders.
//!
//! The room frame and the stat block are assembled here because they need
//! repository access; the registry itself stays free of I/O.

use driftmere_domain::{ConnectionId, Direction, NpcStatus, Room, RoomKind};
use driftmere_shared::{
    FactoryWidgetData, ItemStack, NpcInRoom, PlayerStatsData, RoomFrame, ServerMessage,
    WarehouseWidgetData,
};

use crate::infrastructure::ports::RepoError;

use super::websocket::WsState;

/// Assemble the canonical room frame for one recipient.
pub async fn build_room_frame(
    state: &WsState,
    connection_id: ConnectionId,
    room: &Room,
    first_time: bool,
) -> Result<RoomFrame, RepoError> {
    let app = &state.app;

    let map_name = app
        .repos
        .world
        .map_by_id(room.map_id)
        .await?
        .map(|m| m.name)
        .unwrap_or_default();

    let players = state
        .registry
        .player_names_in_room(room.id, Some(connection_id))
        .await;

    let now_ms = app.now_ms();
    let mut npcs = Vec::new();
    for placement in app.repos.npc.placements_in_room(room.id).await? {
        let Some(npc) = app.repos.npc.scriptable_npc_by_id(placement.npc_id).await? else {
            continue;
        };
        npcs.push(NpcInRoom {
            status: NpcStatus::of(&npc, &placement.state, now_ms)
                .label()
                .to_string(),
            name: npc.name,
        });
    }

    let items: Vec<ItemStack> = app
        .repos
        .item
        .room_items(room.id)
        .await?
        .into_iter()
        .map(|stack| ItemStack {
            name: stack.item_name,
            quantity: stack.quantity,
        })
        .collect();

    let exits = exit_directions(state, room).await?;

    let session = state.registry.get(connection_id).await;
    let factory_widget = if room.kind == RoomKind::Factory {
        session.as_ref().map(|s| FactoryWidgetData {
            slots: s.factory_slots.iter().cloned().collect(),
        })
    } else {
        None
    };

    let warehouse_widget = if room.kind == RoomKind::Warehouse {
        match session.as_ref() {
            Some(s) => build_warehouse_widget(state, s.player_id, room).await?,
            None => None,
        }
    } else {
        None
    };

    Ok(RoomFrame {
        room_id: room.id.to_string(),
        name: room.name.clone(),
        description: room.description.clone(),
        map_name,
        kind: room.kind.label().to_string(),
        players,
        npcs,
        items,
        exits,
        first_time,
        factory_widget,
        warehouse_widget,
    })
}

/// Exit directions: grid neighbors that exist, plus the portal direction.
async fn exit_directions(state: &WsState, room: &Room) -> Result<Vec<String>, RepoError> {
    let mut exits = Vec::new();
    for direction in Direction::ALL {
        if room.portal_for(direction).is_some() {
            exits.push(direction.code().to_string());
            continue;
        }
        let (dx, dy) = direction.delta();
        if state
            .app
            .repos
            .world
            .room_by_coords(room.map_id, room.x + dx, room.y + dy)
            .await?
            .is_some()
        {
            exits.push(direction.code().to_string());
        }
    }
    Ok(exits)
}

/// Warehouse snapshot for a deed holder standing in the warehouse room.
async fn build_warehouse_widget(
    state: &WsState,
    player_id: driftmere_domain::PlayerId,
    room: &Room,
) -> Result<Option<WarehouseWidgetData>, RepoError> {
    let key = room.id.to_string();
    if !state.app.repos.warehouse.has_deed(player_id, &key).await? {
        return Ok(None);
    }
    state.app.repos.warehouse.initialize(player_id, &key).await?;
    let capacity = state.app.repos.warehouse.capacity(player_id, &key).await?;
    let items = state
        .app
        .repos
        .warehouse
        .items(player_id, &key)
        .await?
        .into_iter()
        .map(|(name, quantity)| ItemStack { name, quantity })
        .collect();
    Ok(Some(WarehouseWidgetData {
        warehouse_key: key,
        items,
        max_item_types: capacity.max_item_types,
        max_quantity_per_type: capacity.max_quantity_per_type,
        view_only: false,
    }))
}

/// Build and deliver the room frame to one connection.
pub async fn send_room_update(
    state: &WsState,
    connection_id: ConnectionId,
    room: &Room,
    first_time: bool,
) {
    match build_room_frame(state, connection_id, room, first_time).await {
        Ok(frame) => {
            state
                .registry
                .to_player(connection_id, ServerMessage::RoomUpdate { room: frame })
                .await;
        }
        Err(e) => {
            tracing::error!(connection_id = %connection_id, error = %e, "Failed to build room frame");
        }
    }
}

/// Refresh the room frame for every occupant (each recipient sees its own
/// "also here" list).
pub async fn send_room_update_to_occupants(state: &WsState, room: &Room) {
    for connection_id in state.registry.occupants(room.id) {
        send_room_update(state, connection_id, room, false).await;
    }
}

/// Recompute encumbrance and push the full stat block.
pub async fn send_player_stats(state: &WsState, connection_id: ConnectionId) {
    let Some(session) = state.registry.get(connection_id).await else {
        return;
    };
    let app = &state.app;
    let player = match app.repos.player.get_by_id(session.player_id).await {
        Ok(Some(p)) => p,
        Ok(None) => {
            tracing::warn!(player_id = %session.player_id, "Stats push for unknown player");
            return;
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to load player for stats push");
            return;
        }
    };
    let encumbrance = match app.repos.player.current_encumbrance(player.id).await {
        Ok(e) => e,
        Err(e) => {
            tracing::error!(error = %e, "Failed to compute encumbrance");
            return;
        }
    };
    let stats = PlayerStatsData {
        name: player.name.clone(),
        resonance: player.stats.resonance,
        fortitude: player.stats.fortitude,
        vigor: player.stats.vigor,
        finesse: player.stats.finesse,
        insight: player.stats.insight,
        presence: player.stats.presence,
        vitalis: player.vitalis,
        unspent_points: player.unspent_points,
        encumbrance,
        encumbrance_capacity: player.encumbrance_capacity,
    };
    state
        .registry
        .to_player(connection_id, ServerMessage::PlayerStats { stats })
        .await;
}
