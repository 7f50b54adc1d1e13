//! Items on the ground, inventory, and the factory widget.

use driftmere_domain::{ConnectionId, RoomKind};
use driftmere_shared::{FactoryWidgetData, ItemStack, ServerMessage};

use crate::api::frames;

use super::{error_response, Quantity, WsState};

pub(super) async fn handle_look(
    state: &WsState,
    connection_id: ConnectionId,
) -> Option<ServerMessage> {
    let session = state.registry.get(connection_id).await?;
    let room = state
        .app
        .repos
        .world
        .room_by_id(session.room_id)
        .await
        .ok()
        .flatten()?;
    frames::send_room_update(state, connection_id, &room, false).await;
    None
}

pub(super) async fn handle_inventory(
    state: &WsState,
    connection_id: ConnectionId,
) -> Option<ServerMessage> {
    let session = state.registry.get(connection_id).await?;
    let app = &state.app;
    let items = match app.repos.item.player_items(session.player_id).await {
        Ok(items) => items,
        Err(e) => {
            tracing::error!(error = %e, "Inventory lookup failed");
            return Some(error_response("Inventory unavailable"));
        }
    };
    let player = app.repos.player.get_by_id(session.player_id).await.ok()??;
    let encumbrance = app
        .repos
        .player
        .current_encumbrance(session.player_id)
        .await
        .unwrap_or(0.0);
    Some(ServerMessage::InventoryList {
        items: items
            .into_iter()
            .map(|i| ItemStack {
                name: i.item_name,
                quantity: i.quantity,
            })
            .collect(),
        encumbrance,
        encumbrance_capacity: player.encumbrance_capacity,
    })
}

pub(super) async fn handle_take(
    state: &WsState,
    connection_id: ConnectionId,
    item_name: &str,
    quantity_raw: Option<&str>,
) -> Option<ServerMessage> {
    let session = state.registry.get(connection_id).await?;
    let app = &state.app;
    let quantity = match Quantity::parse(quantity_raw) {
        Ok(q) => q,
        Err(e) => return Some(e),
    };

    let stacks = match app.repos.item.room_items(session.room_id).await {
        Ok(stacks) => stacks,
        Err(_) => return Some(error_response("Nothing can be taken right now")),
    };
    let needle = item_name.trim().to_lowercase();
    let matches: Vec<_> = stacks
        .iter()
        .filter(|s| s.item_name.to_lowercase().contains(&needle))
        .collect();
    let stack = match matches.len() {
        0 => return Some(error_response(&format!("There is no {item_name} here"))),
        1 => matches[0],
        _ => {
            let names: Vec<String> = matches.iter().map(|s| s.item_name.clone()).collect();
            return Some(error_response(&format!(
                "Which do you mean: {}?",
                names.join(", ")
            )));
        }
    };

    let wanted = quantity.resolve(stack.quantity).min(stack.quantity);

    // Clip to what the character can still carry.
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
        .item_encumbrance(&stack.item_name)
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

    let item_name = stack.item_name.clone();
    if let Err(e) = app
        .repos
        .item
        .remove_room_item(session.room_id, &item_name, taken)
        .await
    {
        tracing::error!(error = %e, "Failed to remove room item");
        return Some(error_response("Taking failed"));
    }
    if let Err(e) = app
        .repos
        .item
        .add_player_item(session.player_id, &item_name, taken)
        .await
    {
        tracing::error!(error = %e, "Failed to add inventory item");
        // Put the stack back so the compound operation nets out.
        let _ = app
            .repos
            .item
            .add_room_item(session.room_id, &item_name, taken)
            .await;
        return Some(error_response("Taking failed"));
    }

    frames::send_player_stats(state, connection_id).await;
    if let Ok(Some(room)) = app.repos.world.room_by_id(session.room_id).await {
        frames::send_room_update_to_occupants(state, &room).await;
    }
    let note = if taken < wanted {
        format!("You take {taken} {item_name} (all you can carry).")
    } else {
        format!("You take {taken} {item_name}.")
    };
    Some(ServerMessage::Message {
        message: note,
        html: None,
    })
}

pub(super) async fn handle_drop(
    state: &WsState,
    connection_id: ConnectionId,
    item_name: &str,
    quantity_raw: Option<&str>,
) -> Option<ServerMessage> {
    let session = state.registry.get(connection_id).await?;
    let app = &state.app;
    let quantity = match Quantity::parse(quantity_raw) {
        Ok(q) => q,
        Err(e) => return Some(e),
    };

    let inventory = match app.repos.item.player_items(session.player_id).await {
        Ok(items) => items,
        Err(_) => return Some(error_response("Dropping unavailable")),
    };
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

    let dropped = quantity.resolve(held.quantity).min(held.quantity);
    let item_name = held.item_name.clone();
    if let Err(e) = app
        .repos
        .item
        .remove_player_item(session.player_id, &item_name, dropped)
        .await
    {
        tracing::error!(error = %e, "Failed to remove inventory item");
        return Some(error_response("Dropping failed"));
    }
    if let Err(e) = app
        .repos
        .item
        .add_room_item(session.room_id, &item_name, dropped)
        .await
    {
        tracing::error!(error = %e, "Failed to add room item");
        let _ = app
            .repos
            .item
            .add_player_item(session.player_id, &item_name, dropped)
            .await;
        return Some(error_response("Dropping failed"));
    }

    frames::send_player_stats(state, connection_id).await;
    if let Ok(Some(room)) = app.repos.world.room_by_id(session.room_id).await {
        frames::send_room_update_to_occupants(state, &room).await;
    }
    Some(ServerMessage::Message {
        message: format!("You drop {dropped} {item_name}."),
        html: None,
    })
}

pub(super) async fn handle_factory_widget_add_item(
    state: &WsState,
    connection_id: ConnectionId,
    slot: u32,
    item_name: &str,
    quantity: u32,
) -> Option<ServerMessage> {
    let session = state.registry.get(connection_id).await?;
    let app = &state.app;

    let room = app.repos.world.room_by_id(session.room_id).await.ok()??;
    if room.kind != RoomKind::Factory {
        return Some(error_response("There is no factory widget here"));
    }
    let slot_index = slot as usize;
    if slot_index >= session.factory_slots.len() {
        return Some(error_response("Invalid widget slot"));
    }
    if quantity == 0 {
        return Some(error_response("Invalid quantity"));
    }

    let inventory = app.repos.item.player_items(session.player_id).await.ok()?;
    let held = inventory
        .iter()
        .find(|i| i.item_name.eq_ignore_ascii_case(item_name));
    let Some(held) = held.filter(|h| h.quantity >= quantity) else {
        return Some(error_response(&format!(
            "You don't have {quantity} {item_name}"
        )));
    };
    let item_name = held.item_name.clone();

    // A slot accepts more of the same item, but not a second item.
    if let Some(existing) = &session.factory_slots[slot_index] {
        if !existing.name.eq_ignore_ascii_case(&item_name) {
            return Some(error_response("That slot already holds something else"));
        }
    }

    if let Err(e) = app
        .repos
        .item
        .remove_player_item(session.player_id, &item_name, quantity)
        .await
    {
        tracing::error!(error = %e, "Failed to move item into widget");
        return Some(error_response("The widget refuses the item"));
    }

    let updated = state
        .registry
        .update(connection_id, |info| {
            let slot = &mut info.factory_slots[slot_index];
            match slot {
                Some(stack) => stack.quantity += quantity,
                None => {
                    *slot = Some(ItemStack {
                        name: item_name.clone(),
                        quantity,
                    })
                }
            }
        })
        .await?;

    frames::send_player_stats(state, connection_id).await;
    Some(ServerMessage::FactoryWidgetState {
        widget: FactoryWidgetData {
            slots: updated.factory_slots.to_vec(),
        },
    })
}

pub(super) async fn handle_get_widget_config(
    state: &WsState,
    connection_id: ConnectionId,
) -> Option<ServerMessage> {
    let session = state.registry.get(connection_id).await?;
    let config = state
        .app
        .repos
        .player
        .get_widget_config(session.player_id)
        .await
        .unwrap_or_default();
    Some(ServerMessage::WidgetConfig { config })
}

pub(super) async fn handle_update_widget_config(
    state: &WsState,
    connection_id: ConnectionId,
    auto_loop_time_ms: Option<i64>,
    auto_navigation_time_ms: Option<i64>,
) -> Option<ServerMessage> {
    let session = state.registry.get(connection_id).await?;
    let app = &state.app;

    if auto_loop_time_ms.is_some_and(|v| v <= 0)
        || auto_navigation_time_ms.is_some_and(|v| v <= 0)
    {
        return Some(error_response("Timing values must be positive"));
    }

    let mut config = app
        .repos
        .player
        .get_widget_config(session.player_id)
        .await
        .unwrap_or_default();
    if let Some(v) = auto_loop_time_ms {
        config.auto_loop_time_ms = v;
    }
    if let Some(v) = auto_navigation_time_ms {
        config.auto_navigation_time_ms = v;
    }
    if let Err(e) = app
        .repos
        .player
        .set_widget_config(session.player_id, config)
        .await
    {
        tracing::error!(error = %e, "Failed to persist widget config");
        return Some(error_response("Could not save configuration"));
    }
    Some(ServerMessage::WidgetConfigUpdated { config })
}
