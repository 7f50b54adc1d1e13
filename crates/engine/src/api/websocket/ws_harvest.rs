//! Harvest state machine (rhythm NPCs).
//!
//! Placement state transitions are serialized by a per-placement mutex held
//! across the read-check-write; the mutex is released before any broadcast.

use driftmere_domain::{ConnectionId, NpcPlacement, PlayerId, ScriptableNpc};
use driftmere_shared::ServerMessage;

use crate::templates::TemplateValue;

use super::{error_response, WsState};

/// Grace window after harvest start during which other commands leave the
/// harvest alone (protects against races with the next client frame).
pub(super) const INTERRUPT_GRACE_MS: i64 = 2_000;

pub(super) async fn handle_harvest(
    state: &WsState,
    connection_id: ConnectionId,
    target: &str,
) -> Option<ServerMessage> {
    let app = &state.app;
    let session = state.registry.get(connection_id).await?;

    // Partial-match the target among NPCs in the room.
    let placements = match app.repos.npc.placements_in_room(session.room_id).await {
        Ok(placements) => placements,
        Err(e) => {
            tracing::error!(error = %e, "Failed to list NPCs for harvest");
            return Some(error_response("Harvesting unavailable"));
        }
    };
    let mut candidates: Vec<(NpcPlacement, ScriptableNpc)> = Vec::new();
    let needle = target.trim().to_lowercase();
    for placement in placements {
        let Ok(Some(npc)) = app.repos.npc.scriptable_npc_by_id(placement.npc_id).await else {
            continue;
        };
        if npc.name.to_lowercase().contains(&needle) {
            candidates.push((placement, npc));
        }
    }

    let (placement, npc) = match candidates.len() {
        0 => return Some(error_response(&format!("You don't see '{target}' here"))),
        1 => candidates.remove(0),
        _ => {
            let names: Vec<String> = candidates.iter().map(|(_, n)| n.name.clone()).collect();
            return Some(error_response(&format!(
                "Which do you mean: {}?",
                names.join(", ")
            )));
        }
    };

    if !npc.is_harvestable() {
        let message = app
            .templates
            .render(
                "harvest_not_harvestable",
                "The {name} cannot be harvested.",
                &[("name", TemplateValue::scalar(npc.name.clone()))],
            )
            .await;
        return Some(error_response(&message));
    }

    // Prerequisite item check.
    let inventory = match app.repos.item.player_items(session.player_id).await {
        Ok(items) => items,
        Err(e) => {
            tracing::error!(error = %e, "Inventory lookup failed");
            return Some(error_response("Harvesting unavailable"));
        }
    };
    if let Some(prerequisite) = npc.harvest_prerequisite_item.as_deref() {
        let holds = inventory
            .iter()
            .any(|i| i.item_name.eq_ignore_ascii_case(prerequisite) && i.quantity > 0);
        if !holds {
            let message = npc
                .prerequisite_message
                .clone()
                .unwrap_or_else(|| format!("You need a {prerequisite} to harvest this."));
            return Some(error_response(&message));
        }
    }

    // Input recipe check: every line at its required quantity.
    for line in &npc.input_items {
        let held = inventory
            .iter()
            .find(|i| i.item_name.eq_ignore_ascii_case(&line.item_name))
            .map_or(0, |i| i.quantity);
        if held < line.quantity {
            return Some(error_response(&format!(
                "You need {} {} to harvest the {}",
                line.quantity, line.item_name, npc.name
            )));
        }
    }

    let player = match app.repos.player.get_by_id(session.player_id).await {
        Ok(Some(player)) => player,
        _ => return Some(error_response("Harvesting unavailable")),
    };

    // Critical section: verify preconditions against fresh state and write
    // the activation in one step.
    let lock = app.placement_lock(placement.id);
    let guard = lock.lock().await;

    let fresh = match app.repos.npc.placement_by_id(placement.id).await {
        Ok(Some(fresh)) => fresh,
        _ => return Some(error_response("Harvesting unavailable")),
    };
    let now_ms = app.now_ms();
    let mut npc_state = fresh.state;

    if npc_state.in_cooldown(now_ms) {
        drop(guard);
        let message = app
            .templates
            .render(
                "harvest_cooldown",
                "The {name} is not currently capable of being harvested.",
                &[("name", TemplateValue::scalar(npc.name.clone()))],
            )
            .await;
        return Some(error_response(&message));
    }
    if npc_state.harvest_active {
        let mine = npc_state.harvesting_player_id == Some(session.player_id);
        drop(guard);
        return Some(error_response(if mine {
            "You are already harvesting that"
        } else {
            "Someone else is already harvesting that"
        }));
    }

    let effective = npc.effective_harvestable_time(player.stats.fortitude);
    npc_state.begin_harvest(
        session.player_id,
        now_ms,
        effective,
        player.stats.resonance,
        player.stats.fortitude,
    );
    if let Err(e) = app.repos.npc.update_npc_state(placement.id, &npc_state).await {
        drop(guard);
        tracing::error!(error = %e, "Failed to write harvest start");
        return Some(error_response("Harvesting unavailable"));
    }
    drop(guard);

    let message = app
        .templates
        .render(
            "harvest_begin",
            "You begin harvesting the {name}.",
            &[("name", TemplateValue::scalar(npc.name.clone()))],
        )
        .await;
    Some(ServerMessage::Message {
        message,
        html: None,
    })
}

/// Dispatcher hook: a non-safe command interrupts the caller's harvest,
/// but only once the 2-second grace window has passed.
pub(super) async fn interrupt_for_command(
    state: &WsState,
    connection_id: ConnectionId,
    player_id: PlayerId,
) {
    let placement = match state.app.repos.npc.active_harvest_for_player(player_id).await {
        Ok(Some(placement)) => placement,
        Ok(None) => return,
        Err(e) => {
            tracing::error!(error = %e, "Active harvest scan failed");
            return;
        }
    };
    let Some(started) = placement.state.harvest_start_time else {
        return;
    };
    if state.app.now_ms() - started < INTERRUPT_GRACE_MS {
        return;
    }
    if interrupt_active_harvest(state, player_id).await.is_some() {
        let message = state
            .app
            .templates
            .render(
                "harvest_interrupted",
                "Your harvesting has been interrupted.",
                &[],
            )
            .await;
        state
            .registry
            .to_player(
                connection_id,
                ServerMessage::Message {
                    message,
                    html: None,
                },
            )
            .await;
    }
}

/// End the player's active harvest, if any, arming the placement cooldown.
/// Idempotent: an already-idle placement is left untouched. Returns the NPC
/// name when a harvest was actually ended.
pub(crate) async fn interrupt_active_harvest(
    state: &WsState,
    player_id: PlayerId,
) -> Option<String> {
    let app = &state.app;
    let placement = app
        .repos
        .npc
        .active_harvest_for_player(player_id)
        .await
        .ok()
        .flatten()?;

    let lock = app.placement_lock(placement.id);
    let _guard = lock.lock().await;

    let fresh = app
        .repos
        .npc
        .placement_by_id(placement.id)
        .await
        .ok()
        .flatten()?;
    let mut npc_state = fresh.state;
    if !npc_state.harvest_active || npc_state.harvesting_player_id != Some(player_id) {
        return None;
    }
    let npc = app
        .repos
        .npc
        .scriptable_npc_by_id(fresh.npc_id)
        .await
        .ok()
        .flatten()?;

    npc_state.end_harvest(app.now_ms(), npc.cooldown_time_ms);
    if let Err(e) = app.repos.npc.update_npc_state(placement.id, &npc_state).await {
        tracing::error!(error = %e, "Failed to write harvest interrupt");
        return None;
    }
    Some(npc.name)
}
