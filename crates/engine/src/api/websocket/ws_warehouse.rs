//! Deed-gated warehouse storage.
//!
//! A warehouse room grants full access to a matching deed holder. The
//! `warehouse` command works anywhere and shows the first warehouse the
//! player holds a deed for, view-only unless standing in it.

use driftmere_domain::{ConnectionId, PlayerId, RoomKind};
use driftmere_shared::{ItemStack, ServerMessage, WarehouseWidgetData};

use crate::api::frames;

use super::{error_response, Quantity, WsState};

pub(super) async fn handle_warehouse(
    state: &WsState,
    connection_id: ConnectionId,
) -> Option<ServerMessage> {
    let session = state.registry.get(connection_id).await?;
    let app = &state.app;

    let deeds = match app.repos.warehouse.player_deeds(session.player_id).await {
        Ok(deeds) => deeds,
        Err(_) => return Some(error_response("The warehouse ledgers are unavailable")),
    };
    let Some(key) = deeds.first().cloned() else {
        return Some(error_response("You hold no warehouse deed"));
    };

    let standing_inside = app
        .repos
        .world
        .room_by_id(session.room_id)
        .await
        .ok()
        .flatten()
        .is_some_and(|room| room.kind == RoomKind::Warehouse && room.id.to_string() == key);

    let widget = match build_widget(state, session.player_id, &key, !standing_inside).await {
        Some(widget) => widget,
        None => return Some(error_response("The warehouse ledgers are unavailable")),
    };
    Some(ServerMessage::WarehouseWidgetState { widget })
}

pub(super) async fn handle_store(
    state: &WsState,
    connection_id: ConnectionId,
    item_name: &str,
    quantity_raw: Option<&str>,
) -> Option<ServerMessage> {
    let session = state.registry.get(connection_id).await?;
    let app = &state.app;

    let Some(key) = current_warehouse_key(state, connection_id).await else {
        return Some(error_response("There is no warehouse here"));
    };
    match app.repos.warehouse.has_deed(session.player_id, &key).await {
        Ok(true) => {}
        Ok(false) => return Some(error_response("You don't hold the deed to this warehouse")),
        Err(_) => return Some(error_response("The warehouse ledgers are unavailable")),
    }
    if app
        .repos
        .warehouse
        .initialize(session.player_id, &key)
        .await
        .is_err()
    {
        return Some(error_response("The warehouse ledgers are unavailable"));
    }

    let quantity = match Quantity::parse(quantity_raw) {
        Ok(q) => q,
        Err(e) => return Some(e),
    };

    let inventory = app
        .repos
        .item
        .player_items(session.player_id)
        .await
        .unwrap_or_default();
    let needle = item_name.trim().to_lowercase();
    let matches: Vec<_> = inventory
        .iter()
        .filter(|i| i.item_name.to_lowercase().contains(&needle))
        .collect();
    let held = match matches.len() {
        0 => return Some(error_response(&format!("You don't have a {item_name}"))),
        1 => matches[0],
        _ => {
            let names: Vec<String> = matches.iter().map(|i| i.item_name.clone()).collect();
            return Some(error_response(&format!(
                "Which do you mean: {}?",
                names.join(", ")
            )));
        }
    };
    let item_name = held.item_name.clone();
    let wanted = quantity.resolve(held.quantity).min(held.quantity);

    // Capacity gating: item-type count and per-type quantity.
    let capacity = match app.repos.warehouse.capacity(session.player_id, &key).await {
        Ok(capacity) => capacity,
        Err(_) => return Some(error_response("The warehouse ledgers are unavailable")),
    };
    let stored = app
        .repos
        .warehouse
        .item_quantity(session.player_id, &key, &item_name)
        .await
        .unwrap_or(0);
    if stored == 0 {
        let types = app
            .repos
            .warehouse
            .item_type_count(session.player_id, &key)
            .await
            .unwrap_or(0);
        if types >= capacity.max_item_types {
            return Some(error_response(&format!(
                "The warehouse already holds {} kinds of goods",
                capacity.max_item_types
            )));
        }
    }
    let room_left = capacity.max_quantity_per_type.saturating_sub(stored);
    let accepted = wanted.min(room_left);
    if accepted == 0 {
        return Some(error_response(&format!(
            "The warehouse cannot hold any more {item_name}"
        )));
    }

    if let Err(e) = app
        .repos
        .item
        .remove_player_item(session.player_id, &item_name, accepted)
        .await
    {
        tracing::error!(error = %e, "Failed to take stored item");
        return Some(error_response("Storing failed"));
    }
    if let Err(e) = app
        .repos
        .warehouse
        .add_item(session.player_id, &key, &item_name, accepted)
        .await
    {
        tracing::error!(error = %e, "Failed to add warehouse item");
        let _ = app
            .repos
            .item
            .add_player_item(session.player_id, &item_name, accepted)
            .await;
        return Some(error_response("Storing failed"));
    }

    frames::send_player_stats(state, connection_id).await;
    if let Some(widget) = build_widget(state, session.player_id, &key, false).await {
        state
            .registry
            .to_player(connection_id, ServerMessage::WarehouseWidgetState { widget })
            .await;
    }
    let note = if accepted < wanted {
        format!("You store {accepted} {item_name} (the warehouse can hold no more).")
    } else {
        format!("You store {accepted} {item_name}.")
    };
    Some(ServerMessage::Message {
        message: note,
        html: None,
    })
}

/// Warehouse half of the `withdraw` command (the dispatcher routes by room
/// kind).
pub(super) async fn handle_withdraw_item(
    state: &WsState,
    connection_id: ConnectionId,
    item_name: &str,
    quantity_raw: Option<&str>,
) -> Option<ServerMessage> {
    let session = state.registry.get(connection_id).await?;
    let app = &state.app;

    let Some(key) = current_warehouse_key(state, connection_id).await else {
        return Some(error_response("There is no warehouse here"));
    };
    match app.repos.warehouse.has_deed(session.player_id, &key).await {
        Ok(true) => {}
        Ok(false) => return Some(error_response("You don't hold the deed to this warehouse")),
        Err(_) => return Some(error_response("The warehouse ledgers are unavailable")),
    }

    let quantity = match Quantity::parse(quantity_raw) {
        Ok(q) => q,
        Err(e) => return Some(e),
    };

    let stored = app
        .repos
        .warehouse
        .items(session.player_id, &key)
        .await
        .unwrap_or_default();
    let needle = item_name.trim().to_lowercase();
    let matches: Vec<_> = stored
        .iter()
        .filter(|(name, _)| name.to_lowercase().contains(&needle))
        .collect();
    let (item_name, held) = match matches.len() {
        0 => {
            return Some(error_response(&format!(
                "The warehouse holds no {item_name}"
            )))
        }
        1 => matches[0].clone(),
        _ => {
            let names: Vec<String> = matches.iter().map(|(name, _)| name.clone()).collect();
            return Some(error_response(&format!(
                "Which do you mean: {}?",
                names.join(", ")
            )));
        }
    };
    let wanted = quantity.resolve(held).min(held);

    // Withdraw clips by remaining carrying capacity.
    let player = app.repos.player.get_by_id(session.player_id).await.ok()??;
    let current = app
        .repos
        .player
        .current_encumbrance(session.player_id)
        .await
        .unwrap_or(0.0);
    let per_unit = app
        .repos
        .item
        .item_encumbrance(&item_name)
        .await
        .unwrap_or(0.0);
    let taken = if per_unit > 0.0 {
        let remaining = (player.encumbrance_capacity - current).max(0.0);
        wanted.min((remaining / per_unit).floor() as u32)
    } else {
        wanted
    };
    if taken == 0 {
        return Some(error_response("You cannot carry any more"));
    }

    if let Err(e) = app
        .repos
        .warehouse
        .remove_item(session.player_id, &key, &item_name, taken)
        .await
    {
        tracing::error!(error = %e, "Failed to remove warehouse item");
        return Some(error_response("Withdrawing failed"));
    }
    if let Err(e) = app
        .repos
        .item
        .add_player_item(session.player_id, &item_name, taken)
        .await
    {
        tracing::error!(error = %e, "Failed to credit withdrawn item");
        let _ = app
            .repos
            .warehouse
            .add_item(session.player_id, &key, &item_name, taken)
            .await;
        return Some(error_response("Withdrawing failed"));
    }

    frames::send_player_stats(state, connection_id).await;
    if let Some(widget) = build_widget(state, session.player_id, &key, false).await {
        state
            .registry
            .to_player(connection_id, ServerMessage::WarehouseWidgetState { widget })
            .await;
    }
    let note = if taken < wanted {
        format!("You withdraw {taken} {item_name} (all you can carry).")
    } else {
        format!("You withdraw {taken} {item_name}.")
    };
    Some(ServerMessage::Message {
        message: note,
        html: None,
    })
}

/// The warehouse key of the current room, when it is a warehouse.
async fn current_warehouse_key(state: &WsState, connection_id: ConnectionId) -> Option<String> {
    let session = state.registry.get(connection_id).await?;
    let room = state
        .app
        .repos
        .world
        .room_by_id(session.room_id)
        .await
        .ok()
        .flatten()?;
    (room.kind == RoomKind::Warehouse).then(|| room.id.to_string())
}

async fn build_widget(
    state: &WsState,
    player_id: PlayerId,
    key: &str,
    view_only: bool,
) -> Option<WarehouseWidgetData> {
    let app = &state.app;
    app.repos.warehouse.initialize(player_id, key).await.ok()?;
    let capacity = app.repos.warehouse.capacity(player_id, key).await.ok()?;
    let items = app
        .repos
        .warehouse
        .items(player_id, key)
        .await
        .ok()?
        .into_iter()
        .map(|(name, quantity)| ItemStack { name, quantity })
        .collect();
    Some(WarehouseWidgetData {
        warehouse_key: key.to_string(),
        items,
        max_item_types: capacity.max_item_types,
        max_quantity_per_type: capacity.max_quantity_per_type,
        view_only,
    })
}
