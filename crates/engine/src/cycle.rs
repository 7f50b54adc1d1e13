//! Background NPC cycle worker.
//!
//! Scans running harvests once a second. A harvest whose window has
//! elapsed transitions its placement to cooldown; the harvester is settled
//! with one roll against the NPC's hit rate (output recipe on a hit,
//! vitalis drain either way).

use std::time::Duration;

use driftmere_domain::{PlayerId, ScriptableNpc};
use driftmere_shared::ServerMessage;

use crate::api::frames;
use crate::api::websocket::WsState;
use crate::infrastructure::ports::RepoError;
use crate::templates::TemplateValue;

const CYCLE_INTERVAL: Duration = Duration::from_secs(1);

pub async fn run_npc_cycle_worker(state: WsState) {
    let mut ticker = tokio::time::interval(CYCLE_INTERVAL);
    loop {
        ticker.tick().await;
        if let Err(e) = tick(&state).await {
            tracing::error!(error = %e, "NPC cycle tick failed");
        }
    }
}

/// One sweep over the active harvests.
pub async fn tick(state: &WsState) -> Result<(), RepoError> {
    let app = &state.app;
    let placements = app.repos.npc.active_harvest_placements().await?;
    for placement in placements {
        let lock = app.placement_lock(placement.id);
        let guard = lock.lock().await;

        let Some(fresh) = app.repos.npc.placement_by_id(placement.id).await? else {
            continue;
        };
        let now_ms = app.now_ms();
        let mut npc_state = fresh.state;
        if !npc_state.harvest_elapsed(now_ms) {
            continue;
        }
        let Some(npc) = app.repos.npc.scriptable_npc_by_id(fresh.npc_id).await? else {
            continue;
        };

        let harvester = npc_state.harvesting_player_id;
        npc_state.cycles += 1;
        npc_state.end_harvest(now_ms, npc.cooldown_time_ms);
        app.repos.npc.update_npc_state(placement.id, &npc_state).await?;
        drop(guard);

        if let Some(player_id) = harvester {
            settle_harvest(state, player_id, &npc).await;
        }
    }
    Ok(())
}

/// Pay out (or not) a completed harvest and drain vitalis.
async fn settle_harvest(state: &WsState, player_id: PlayerId, npc: &ScriptableNpc) {
    let app = &state.app;

    // The input recipe is consumed by the completed cycle.
    for line in &npc.input_items {
        if let Err(e) = app
            .repos
            .item
            .remove_player_item(player_id, &line.item_name, line.quantity)
            .await
        {
            tracing::warn!(error = %e, item = %line.item_name, "Failed to consume harvest input");
        }
    }

    let hit = app.random.gen_f64() < npc.hit_rate;
    if hit {
        for line in &npc.output_items {
            if let Err(e) = app
                .repos
                .item
                .add_player_item(player_id, &line.item_name, line.quantity)
                .await
            {
                tracing::error!(error = %e, item = %line.item_name, "Failed to grant harvest output");
            }
        }
    }
    let drain = if hit { npc.hit_vitalis } else { npc.miss_vitalis };
    if drain != 0 {
        if let Err(e) = app.repos.player.adjust_vitalis(player_id, -drain).await {
            tracing::error!(error = %e, "Failed to drain vitalis");
        }
    }

    // Tell the harvester, if they are still connected.
    let Some((session, open)) = state.registry.find_by_player(player_id).await else {
        return;
    };
    if !open {
        return;
    }
    let message = if hit {
        let yields: Vec<String> = npc
            .output_items
            .iter()
            .map(|l| format!("{} {}", l.quantity, l.item_name))
            .collect();
        app.templates
            .render(
                "harvest_complete",
                "The {name} yields [items].",
                &[
                    ("name", TemplateValue::scalar(npc.name.clone())),
                    ("items", TemplateValue::list(yields)),
                ],
            )
            .await
    } else {
        app.templates
            .render(
                "harvest_miss",
                "The {name} yields nothing this time.",
                &[("name", TemplateValue::scalar(npc.name.clone()))],
            )
            .await
    };
    state
        .registry
        .to_player(
            session.connection_id,
            ServerMessage::Message {
                message,
                html: None,
            },
        )
        .await;
    frames::send_player_stats(state, session.connection_id).await;
}
