//! Movement engine.
//!
//! Resolves a compass direction to a target room (grid step or portal),
//! applies encumbrance-based cooldowns, fires departure/arrival side
//! effects, and advances any in-flight path execution or auto-navigation.

use chrono::Duration;

use driftmere_domain::{ConnectionId, Direction, DirectionParseError, RoomKind};
use driftmere_shared::ServerMessage;

use crate::api::frames;
use crate::templates::TemplateValue;

use super::{error_response, ws_harvest, ws_lorekeeper, ws_paths, ws_session, WsState};

/// Who issued a move: the player's own frame or a scheduled step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MoveSource {
    Manual,
    PathStep,
    AutoNav,
}

const HEAVY_COOLDOWN_MS: i64 = 1200;
const LADEN_COOLDOWN_MS: i64 = 700;

pub(super) async fn handle_move(
    state: &WsState,
    connection_id: ConnectionId,
    direction_raw: &str,
) -> Option<ServerMessage> {
    let direction = match direction_raw.parse::<Direction>() {
        Ok(direction) => direction,
        Err(DirectionParseError::Unsupported) => {
            return Some(error_response("Up and down movement is not implemented"));
        }
        Err(DirectionParseError::Unknown(raw)) => {
            return Some(error_response(&format!("Unknown direction: {raw}")));
        }
    };
    perform_move(state, connection_id, direction, MoveSource::Manual).await
}

/// Execute one move. Scheduled path/auto-nav steps come through here too,
/// so every move shares the same gating and side effects.
pub(crate) async fn perform_move(
    state: &WsState,
    connection_id: ConnectionId,
    direction: Direction,
    source: MoveSource,
) -> Option<ServerMessage> {
    let app = &state.app;
    let Some(session) = state.registry.get(connection_id).await else {
        return Some(error_response("Not authenticated"));
    };

    // Path-execution guard: while an unpaused execution is active, a manual
    // move is allowed only when it matches the expected step.
    if source == MoveSource::Manual {
        if let Some(exec) = &session.path_execution {
            if !exec.is_paused && exec.expected_direction() != Some(direction) {
                return Some(error_response(
                    "A path is executing; stop it before moving manually",
                ));
            }
        } else if let Some(nav) = &session.auto_navigation {
            if nav.expected_step().map(|s| s.direction) != Some(direction) {
                return Some(error_response(
                    "Auto-navigation is active; it controls your movement",
                ));
            }
        }
    }

    let player = match app.repos.player.get_by_id(session.player_id).await {
        Ok(Some(player)) => player,
        Ok(None) => return Some(error_response("Unknown player")),
        Err(e) => {
            tracing::error!(error = %e, "Player lookup failed during move");
            return Some(error_response("Movement unavailable"));
        }
    };

    // Movement cooldown from a previous encumbered step.
    let now = app.clock.now();
    if let Some(deadline) = session.next_move_time {
        if now < deadline {
            let seconds = (deadline - now).num_milliseconds() as f64 / 1000.0;
            let message = app
                .templates
                .render(
                    "move_cooldown",
                    "You are still catching your breath. Wait {seconds}s.",
                    &[("seconds", TemplateValue::scalar(format!("{seconds:.1}")))],
                )
                .await;
            return Some(error_response(&message));
        }
    }

    // Encumbrance gating.
    let mut cooldown_ms = 0;
    if !player.god_mode {
        let current = match app.repos.player.current_encumbrance(player.id).await {
            Ok(current) => current,
            Err(e) => {
                tracing::error!(error = %e, "Encumbrance lookup failed");
                return Some(error_response("Movement unavailable"));
            }
        };
        let percent = player.encumbrance_percent(current);
        if percent >= 100.0 {
            let message = app
                .templates
                .render(
                    "move_too_heavy",
                    "You are carrying too much to move.",
                    &[("name", TemplateValue::scalar(player.name.clone()))],
                )
                .await;
            return Some(error_response(&message));
        } else if percent >= 66.6 {
            cooldown_ms = HEAVY_COOLDOWN_MS;
        } else if percent >= 33.3 {
            cooldown_ms = LADEN_COOLDOWN_MS;
        }
    }

    let current_room = match app.repos.world.room_by_id(session.room_id).await {
        Ok(Some(room)) => room,
        Ok(None) | Err(_) => return Some(error_response("Your room no longer exists")),
    };

    // Target resolution: portal first, then grid neighbor.
    let (target, map_transition) = if let Some(portal) = current_room.portal_for(direction) {
        let target = app
            .repos
            .world
            .room_by_coords(portal.to_map, portal.to_x, portal.to_y)
            .await
            .ok()
            .flatten();
        (target, true)
    } else {
        let (dx, dy) = direction.delta();
        let target = app
            .repos
            .world
            .room_by_coords(current_room.map_id, current_room.x + dx, current_room.y + dy)
            .await
            .ok()
            .flatten();
        (target, false)
    };

    let Some(target) = target else {
        abort_active_route(state, connection_id, "You hit a dead end").await;
        let message = app
            .templates
            .render(
                "wall_collision",
                "You walk into a wall.",
                &[("name", TemplateValue::scalar(player.name.clone()))],
            )
            .await;
        return Some(error_response(&message));
    };

    // Commit the move.
    if let Err(e) = app.repos.player.update_room(player.id, target.id).await {
        tracing::error!(error = %e, "Failed to persist move");
        return Some(error_response("Movement unavailable"));
    }

    // Movement always ends a harvest, grace window or not.
    if ws_harvest::interrupt_active_harvest(state, player.id)
        .await
        .is_some()
    {
        let message = app
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

    // Factory departure spills the widget before the room empties.
    if current_room.kind == RoomKind::Factory {
        ws_session::spill_factory_slots(state, connection_id, &current_room).await;
    }

    let next_move_time = (cooldown_ms > 0).then(|| now + Duration::milliseconds(cooldown_ms));
    state
        .registry
        .set_room(connection_id, target.id, target.map_id)
        .await;
    state
        .registry
        .update(connection_id, |info| {
            info.next_move_time = next_move_time;
            // An active glow-codex puzzle does not follow the player out.
            info.glow_codex = None;
        })
        .await;

    // Poofable pruning on the room left behind.
    if current_room.kind == RoomKind::Factory {
        if state.registry.occupant_count(current_room.id) == 0 {
            ws_session::prune_poofables(state, current_room.id).await;
        }
    } else {
        ws_session::prune_poofables(state, current_room.id).await;
    }

    // Departure notice to the old room.
    let left = app
        .templates
        .render(
            "player_left_room",
            "{name} leaves to {direction}.",
            &[
                ("name", TemplateValue::scalar(player.name.clone())),
                ("direction", TemplateValue::scalar(direction.readable())),
            ],
        )
        .await;
    state
        .registry
        .to_room(
            current_room.id,
            ServerMessage::Message {
                message: left,
                html: None,
            },
            None,
        )
        .await;

    // The mover gets an ack and the arrival frame.
    state
        .registry
        .to_player(
            connection_id,
            ServerMessage::Moved {
                direction: direction.code().to_string(),
            },
        )
        .await;
    frames::send_room_update(state, connection_id, &target, false).await;

    if map_transition {
        ws_session::push_map_data(state, connection_id, target.map_id).await;
    } else {
        state
            .registry
            .to_player(
                connection_id,
                ServerMessage::MapUpdate {
                    map_id: target.map_id.to_string(),
                    x: target.x,
                    y: target.y,
                },
            )
            .await;
    }

    // Arrival notice to the new room.
    let entered = app
        .templates
        .render(
            "player_entered_room",
            "{name} enters from {direction}.",
            &[
                ("name", TemplateValue::scalar(player.name.clone())),
                (
                    "direction",
                    TemplateValue::scalar(direction.opposite().readable()),
                ),
            ],
        )
        .await;
    state
        .registry
        .to_room(
            target.id,
            ServerMessage::Message {
                message: entered,
                html: None,
            },
            Some(connection_id),
        )
        .await;

    ws_lorekeeper::arm_engagements(state, connection_id, target.id).await;

    // A step in flight advances its counter and schedules the next one.
    advance_route(state, connection_id, source).await;

    None
}

/// Advance the active path execution or auto-navigation after a successful
/// move. Paused executions never advance.
async fn advance_route(state: &WsState, connection_id: ConnectionId, source: MoveSource) {
    let Some(session) = state.registry.get(connection_id).await else {
        return;
    };

    if let Some(exec) = session.path_execution {
        if exec.is_paused || source == MoveSource::AutoNav {
            return;
        }
        let next = exec.current_step + 1;
        if !exec.is_looping && next >= exec.steps.len() {
            state
                .registry
                .update(connection_id, |info| info.path_execution = None)
                .await;
            state
                .registry
                .with_timers(connection_id, |timers| timers.cancel_step())
                .await;
            state
                .registry
                .to_player(
                    connection_id,
                    ServerMessage::PathExecutionComplete {
                        path_id: exec.path_id.to_string(),
                    },
                )
                .await;
        } else {
            state
                .registry
                .update(connection_id, |info| {
                    if let Some(exec) = info.path_execution.as_mut() {
                        exec.current_step = next;
                    }
                })
                .await;
            let delay = ws_paths::auto_loop_time_ms(state, session.player_id).await;
            ws_paths::schedule_step(state.clone(), connection_id, delay).await;
        }
    } else if let Some(nav) = session.auto_navigation {
        let next = nav.current + 1;
        if next >= nav.steps.len() {
            state
                .registry
                .update(connection_id, |info| info.auto_navigation = None)
                .await;
            state
                .registry
                .with_timers(connection_id, |timers| timers.cancel_step())
                .await;
            state
                .registry
                .to_player(connection_id, ServerMessage::AutoNavigationComplete)
                .await;
            // Handoff: a pending path execution starts immediately.
            if let Some(path_id) = nav.pending_path {
                ws_paths::promote_pending_path(state, connection_id, path_id).await;
            }
        } else {
            state
                .registry
                .update(connection_id, |info| {
                    if let Some(nav) = info.auto_navigation.as_mut() {
                        nav.current = next;
                    }
                })
                .await;
            let delay = ws_paths::auto_navigation_time_ms(state, session.player_id).await;
            ws_paths::schedule_step(state.clone(), connection_id, delay).await;
        }
    }
}

/// Wall collisions abort whichever route is in flight, with a typed notice.
async fn abort_active_route(state: &WsState, connection_id: ConnectionId, reason: &str) {
    let Some(session) = state.registry.get(connection_id).await else {
        return;
    };
    if session.path_execution.is_some() {
        state
            .registry
            .update(connection_id, |info| info.path_execution = None)
            .await;
        state
            .registry
            .with_timers(connection_id, |timers| timers.cancel_step())
            .await;
        state
            .registry
            .to_player(
                connection_id,
                ServerMessage::PathExecutionFailed {
                    reason: reason.to_string(),
                },
            )
            .await;
    } else if session.auto_navigation.is_some() {
        state
            .registry
            .update(connection_id, |info| info.auto_navigation = None)
            .await;
        state
            .registry
            .with_timers(connection_id, |timers| timers.cancel_step())
            .await;
        state
            .registry
            .to_player(
                connection_id,
                ServerMessage::AutoNavigationFailed {
                    reason: reason.to_string(),
                },
            )
            .await;
    }
}
