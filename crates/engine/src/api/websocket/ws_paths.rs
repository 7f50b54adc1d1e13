//! Path recording, path execution, and auto-navigation.
//!
//! Executions move the character through the Movement Engine on a timer;
//! the engine's guard keeps manual input from derailing an unpaused run.

use driftmere_domain::{
    step_direction, ConnectionId, Direction, DomainError, Path, PathId, PathKind, PathStep,
    PlayerId, Room,
};
use driftmere_shared::{
    AutoPathStep, MapRoomData, MapSummary, PathDetails, PathStepData, PathSummary, ServerMessage,
};

use crate::api::scheduler;
use crate::api::session_state::{AutoNavigation, PathExecution, PathingState};
use crate::pathfinder::{self, NavStep};

use super::{error_response, parse_map_id, parse_path_id, parse_room_id, ws_movement, WsState};

// =============================================================================
// Recording
// =============================================================================

pub(super) async fn handle_start_pathing_mode(
    state: &WsState,
    connection_id: ConnectionId,
) -> Option<ServerMessage> {
    let session = state.registry.get(connection_id).await?;
    let origin = session.room_id;
    state
        .registry
        .update(connection_id, |info| {
            info.pathing = Some(PathingState {
                origin_room_id: origin,
                steps: vec![PathStep {
                    room_id: origin,
                    direction: None,
                }],
            });
        })
        .await;
    Some(ServerMessage::PathingModeStarted {
        origin_room_id: origin.to_string(),
    })
}

pub(super) async fn handle_add_path_step(
    state: &WsState,
    connection_id: ConnectionId,
    room_id_raw: &str,
    previous_room_id_raw: Option<&str>,
) -> Option<ServerMessage> {
    let session = state.registry.get(connection_id).await?;
    let Some(pathing) = session.pathing.clone() else {
        return Some(error_response("You are not recording a path"));
    };
    let room_id = match parse_room_id(room_id_raw) {
        Ok(id) => id,
        Err(e) => return Some(e),
    };
    let previous_id = match previous_room_id_raw {
        Some(raw) => match parse_room_id(raw) {
            Ok(id) => id,
            Err(e) => return Some(e),
        },
        None => match pathing.steps.last() {
            Some(last) => last.room_id,
            None => pathing.origin_room_id,
        },
    };

    let app = &state.app;
    let room = app.repos.world.room_by_id(room_id).await.ok().flatten();
    let previous = app.repos.world.room_by_id(previous_id).await.ok().flatten();
    let (Some(room), Some(previous)) = (room, previous) else {
        return Some(error_response("Unknown room"));
    };
    let direction = match step_direction(&previous, &room) {
        Ok(direction) => direction,
        Err(e) => return Some(error_response(&e.to_string())),
    };

    state
        .registry
        .update(connection_id, |info| {
            if let Some(pathing) = info.pathing.as_mut() {
                pathing.steps.push(PathStep {
                    room_id,
                    direction: Some(direction),
                });
            }
        })
        .await;
    Some(ServerMessage::PathStepAdded {
        room_id: room_id.to_string(),
        direction: Some(direction.code().to_string()),
    })
}

pub(super) async fn handle_save_path(
    state: &WsState,
    connection_id: ConnectionId,
    name: &str,
    kind_raw: &str,
    steps: Vec<PathStepData>,
    map_id_raw: &str,
    origin_room_id_raw: &str,
) -> Option<ServerMessage> {
    let session = state.registry.get(connection_id).await?;
    let kind = match kind_raw.trim().to_lowercase().as_str() {
        "path" => PathKind::Path,
        "loop" => PathKind::Loop,
        other => return Some(error_response(&format!("Unknown path kind: {other}"))),
    };
    let map_id = match parse_map_id(map_id_raw) {
        Ok(id) => id,
        Err(e) => return Some(e),
    };
    let origin_room_id = match parse_room_id(origin_room_id_raw) {
        Ok(id) => id,
        Err(e) => return Some(e),
    };

    let mut domain_steps = Vec::with_capacity(steps.len());
    for step in &steps {
        let room_id = match parse_room_id(&step.room_id) {
            Ok(id) => id,
            Err(e) => return Some(e),
        };
        let direction = match step.direction.as_deref() {
            Some(raw) => match raw.parse::<Direction>() {
                Ok(direction) => Some(direction),
                Err(e) => return Some(error_response(&DomainError::from(e).to_string())),
            },
            None => None,
        };
        domain_steps.push(PathStep { room_id, direction });
    }

    let path = Path {
        id: PathId::new(),
        player_id: session.player_id,
        map_id,
        origin_room_id,
        name: name.trim().to_string(),
        kind,
        steps: domain_steps,
    };

    // The recorded-path invariant is the domain's to enforce; a recording
    // that disagrees with the grid never reaches the repository.
    let rooms = state
        .app
        .repos
        .world
        .rooms_by_map(map_id)
        .await
        .unwrap_or_default();
    if let Err(e) = path.validate(&rooms) {
        return Some(error_response(&e.to_string()));
    }

    let path_id = match state.app.repos.path.create_path(&path).await {
        Ok(id) => id,
        Err(e) => {
            tracing::error!(error = %e, "Failed to save path");
            return Some(error_response("Could not save the path"));
        }
    };

    state
        .registry
        .update(connection_id, |info| info.pathing = None)
        .await;
    Some(ServerMessage::PathSaved {
        path_id: path_id.to_string(),
        name: path.name,
    })
}

pub(super) async fn handle_cancel_pathing(
    state: &WsState,
    connection_id: ConnectionId,
) -> Option<ServerMessage> {
    state
        .registry
        .update(connection_id, |info| info.pathing = None)
        .await;
    Some(ServerMessage::PathingCancelled)
}

pub(super) async fn handle_get_pathing_room(
    state: &WsState,
    connection_id: ConnectionId,
) -> Option<ServerMessage> {
    let session = state.registry.get(connection_id).await?;
    let Some(pathing) = session.pathing.as_ref() else {
        return Some(error_response("You are not recording a path"));
    };
    let head = pathing
        .steps
        .last()
        .map_or(pathing.origin_room_id, |s| s.room_id);
    let room = state.app.repos.world.room_by_id(head).await.ok().flatten()?;
    Some(ServerMessage::PathingRoom {
        room: map_room(&room),
    })
}

pub(super) async fn handle_get_all_player_paths(
    state: &WsState,
    connection_id: ConnectionId,
) -> Option<ServerMessage> {
    let session = state.registry.get(connection_id).await?;
    let paths = state
        .app
        .repos
        .path
        .paths_by_player(session.player_id)
        .await
        .unwrap_or_default();
    Some(ServerMessage::AllPlayerPaths {
        paths: paths
            .into_iter()
            .map(|p| PathSummary {
                path_id: p.id.to_string(),
                name: p.name,
                kind: kind_label(p.kind).to_string(),
                map_id: p.map_id.to_string(),
            })
            .collect(),
    })
}

pub(super) async fn handle_get_path_details(
    state: &WsState,
    connection_id: ConnectionId,
    path_id_raw: &str,
) -> Option<ServerMessage> {
    let session = state.registry.get(connection_id).await?;
    let path = match load_owned_path(state, session.player_id, path_id_raw).await {
        Ok(path) => path,
        Err(e) => return Some(e),
    };
    Some(ServerMessage::PathDetails {
        path: PathDetails {
            path_id: path.id.to_string(),
            name: path.name,
            kind: kind_label(path.kind).to_string(),
            map_id: path.map_id.to_string(),
            origin_room_id: path.origin_room_id.to_string(),
            steps: path
                .steps
                .iter()
                .map(|s| PathStepData {
                    room_id: s.room_id.to_string(),
                    direction: s.direction.map(|d| d.code().to_string()),
                })
                .collect(),
        },
    })
}

// =============================================================================
// Execution
// =============================================================================

pub(super) async fn handle_start_path_execution(
    state: &WsState,
    connection_id: ConnectionId,
    path_id_raw: &str,
) -> Option<ServerMessage> {
    let session = state.registry.get(connection_id).await?;
    if session
        .path_execution
        .as_ref()
        .is_some_and(|exec| !exec.is_paused)
    {
        return Some(error_response("A path is already executing"));
    }
    let path = match load_owned_path(state, session.player_id, path_id_raw).await {
        Ok(path) => path,
        Err(e) => return Some(e),
    };

    // Defensive: drop steps with no recorded direction.
    let steps: Vec<NavStep> = path
        .executable_steps()
        .into_iter()
        .filter_map(|s| {
            s.direction.map(|direction| NavStep {
                direction,
                room_id: s.room_id,
            })
        })
        .collect();
    if steps.is_empty() {
        return Some(error_response("That path has no walkable steps"));
    }

    let is_looping = path.is_loop();
    if session.room_id == path.origin_room_id {
        state
            .registry
            .update(connection_id, |info| {
                info.auto_navigation = None;
                info.path_execution = Some(PathExecution {
                    path_id: path.id,
                    steps,
                    current_step: 0,
                    is_looping,
                    is_paused: false,
                });
            })
            .await;
        let delay = auto_loop_time_ms(state, session.player_id).await;
        schedule_step(state.clone(), connection_id, delay).await;
        return Some(ServerMessage::PathExecutionStarted {
            path_id: path.id.to_string(),
        });
    }

    // Not at the origin: walk there first, carrying the execution along.
    let rooms = state
        .app
        .repos
        .world
        .rooms_by_map(session.map_id)
        .await
        .unwrap_or_default();
    let Some(nav_steps) = pathfinder::find_path(&rooms, session.room_id, path.origin_room_id)
    else {
        return Some(ServerMessage::PathExecutionFailed {
            reason: "No route to the path's origin".to_string(),
        });
    };

    state
        .registry
        .to_player(
            connection_id,
            ServerMessage::AutoNavigationStarted {
                destination_room_id: path.origin_room_id.to_string(),
                steps: nav_steps.iter().map(auto_path_step).collect(),
            },
        )
        .await;
    state
        .registry
        .update(connection_id, |info| {
            info.path_execution = None;
            info.auto_navigation = Some(AutoNavigation {
                destination_room_id: path.origin_room_id,
                steps: nav_steps,
                current: 0,
                pending_path: Some(path.id),
            });
        })
        .await;
    let delay = auto_navigation_time_ms(state, session.player_id).await;
    schedule_step(state.clone(), connection_id, delay).await;
    Some(ServerMessage::PathExecutionStarted {
        path_id: path.id.to_string(),
    })
}

pub(super) async fn handle_stop_path_execution(
    state: &WsState,
    connection_id: ConnectionId,
) -> Option<ServerMessage> {
    let session = state.registry.get(connection_id).await?;
    let Some(exec) = session.path_execution.as_ref() else {
        return Some(error_response("No path is executing"));
    };
    let path_id = exec.path_id;
    state
        .registry
        .update(connection_id, |info| {
            if let Some(exec) = info.path_execution.as_mut() {
                exec.is_paused = true;
            }
        })
        .await;
    state
        .registry
        .with_timers(connection_id, |timers| timers.cancel_step())
        .await;
    Some(ServerMessage::PathExecutionStopped {
        path_id: path_id.to_string(),
    })
}

pub(super) async fn handle_continue_path_execution(
    state: &WsState,
    connection_id: ConnectionId,
    path_id_raw: &str,
) -> Option<ServerMessage> {
    let path_id = match parse_path_id(path_id_raw) {
        Ok(id) => id,
        Err(e) => return Some(e),
    };
    let session = state.registry.get(connection_id).await?;
    let Some(exec) = session.path_execution.as_ref() else {
        return Some(error_response("No path is paused"));
    };
    if !exec.is_paused || exec.path_id != path_id {
        return Some(error_response("That path is not paused"));
    }
    state
        .registry
        .update(connection_id, |info| {
            if let Some(exec) = info.path_execution.as_mut() {
                exec.is_paused = false;
            }
        })
        .await;
    let delay = auto_loop_time_ms(state, session.player_id).await;
    schedule_step(state.clone(), connection_id, delay).await;
    Some(ServerMessage::PathExecutionResumed {
        path_id: path_id.to_string(),
    })
}

// =============================================================================
// Auto-navigation
// =============================================================================

pub(super) async fn handle_get_auto_path_maps(
    state: &WsState,
    _connection_id: ConnectionId,
) -> Option<ServerMessage> {
    let maps = state.app.repos.world.all_maps().await.unwrap_or_default();
    Some(ServerMessage::AutoPathMaps {
        maps: maps
            .into_iter()
            .map(|m| MapSummary {
                map_id: m.id.to_string(),
                name: m.name,
            })
            .collect(),
    })
}

pub(super) async fn handle_get_auto_path_rooms(
    state: &WsState,
    _connection_id: ConnectionId,
    map_id_raw: &str,
) -> Option<ServerMessage> {
    let map_id = match parse_map_id(map_id_raw) {
        Ok(id) => id,
        Err(e) => return Some(e),
    };
    let rooms = state
        .app
        .repos
        .world
        .rooms_by_map(map_id)
        .await
        .unwrap_or_default();
    Some(ServerMessage::AutoPathRooms {
        rooms: rooms.iter().map(map_room).collect(),
    })
}

pub(super) async fn handle_calculate_auto_path(
    state: &WsState,
    connection_id: ConnectionId,
    destination_raw: &str,
) -> Option<ServerMessage> {
    let destination = match parse_room_id(destination_raw) {
        Ok(id) => id,
        Err(e) => return Some(e),
    };
    let session = state.registry.get(connection_id).await?;
    let rooms = state
        .app
        .repos
        .world
        .rooms_by_map(session.map_id)
        .await
        .unwrap_or_default();
    match pathfinder::find_path(&rooms, session.room_id, destination) {
        Some(steps) => Some(ServerMessage::AutoPathCalculated {
            steps: steps.iter().map(auto_path_step).collect(),
        }),
        None => Some(error_response("No route to that room")),
    }
}

pub(super) async fn handle_start_auto_navigation(
    state: &WsState,
    connection_id: ConnectionId,
    destination_raw: &str,
) -> Option<ServerMessage> {
    let destination = match parse_room_id(destination_raw) {
        Ok(id) => id,
        Err(e) => return Some(e),
    };
    let session = state.registry.get(connection_id).await?;
    if session.path_execution.as_ref().is_some_and(|e| !e.is_paused) {
        return Some(error_response("A path is already executing"));
    }
    let rooms = state
        .app
        .repos
        .world
        .rooms_by_map(session.map_id)
        .await
        .unwrap_or_default();
    let Some(steps) = pathfinder::find_path(&rooms, session.room_id, destination) else {
        return Some(ServerMessage::AutoNavigationFailed {
            reason: "No route to that room".to_string(),
        });
    };
    if steps.is_empty() {
        return Some(ServerMessage::AutoNavigationComplete);
    }

    let reply = ServerMessage::AutoNavigationStarted {
        destination_room_id: destination.to_string(),
        steps: steps.iter().map(auto_path_step).collect(),
    };
    state
        .registry
        .update(connection_id, |info| {
            info.auto_navigation = Some(AutoNavigation {
                destination_room_id: destination,
                steps,
                current: 0,
                pending_path: None,
            });
        })
        .await;
    let delay = auto_navigation_time_ms(state, session.player_id).await;
    schedule_step(state.clone(), connection_id, delay).await;
    Some(reply)
}

// =============================================================================
// Step scheduling
// =============================================================================

/// Arm the session's step timer. The fired task re-validates that a route
/// is still active (and unpaused) before issuing its move.
pub(super) fn schedule_step(
    state: WsState,
    connection_id: ConnectionId,
    delay_ms: i64,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> {
    Box::pin(async move {
        let task_state = state.clone();
        let handle = scheduler::schedule(delay_ms, async move {
            run_scheduled_step(task_state, connection_id).await;
        });
        state
            .registry
            .with_timers(connection_id, |timers| {
                timers.cancel_step();
                timers.step = Some(handle);
            })
            .await;
    })
}

async fn run_scheduled_step(state: WsState, connection_id: ConnectionId) {
    let Some(session) = state.registry.get(connection_id).await else {
        return;
    };
    let (direction, source, delay) = if let Some(exec) = session.path_execution.as_ref() {
        if exec.is_paused {
            return;
        }
        let Some(direction) = exec.expected_direction() else {
            return;
        };
        let delay = auto_loop_time_ms(&state, session.player_id).await;
        (direction, ws_movement::MoveSource::PathStep, delay)
    } else if let Some(nav) = session.auto_navigation.as_ref() {
        let Some(step) = nav.expected_step() else {
            return;
        };
        let delay = auto_navigation_time_ms(&state, session.player_id).await;
        (step.direction, ws_movement::MoveSource::AutoNav, delay)
    } else {
        return;
    };

    if let Some(reply) = ws_movement::perform_move(&state, connection_id, direction, source).await {
        state.registry.to_player(connection_id, reply).await;
        // A transient rejection (movement cooldown) must not strand the
        // route; wall collisions clear it, so re-check before retrying.
        let still_armed = state
            .registry
            .get(connection_id)
            .await
            .is_some_and(|info| {
                info.path_execution.as_ref().is_some_and(|e| !e.is_paused)
                    || info.auto_navigation.is_some()
            });
        if still_armed {
            schedule_step(state.clone(), connection_id, delay).await;
        }
    }
}

/// Auto-navigation finished with a path execution attached: promote it and
/// take the first step immediately.
pub(super) async fn promote_pending_path(
    state: &WsState,
    connection_id: ConnectionId,
    path_id: PathId,
) {
    let Some(session) = state.registry.get(connection_id).await else {
        return;
    };
    let path = match state.app.repos.path.path_by_id(path_id).await {
        Ok(Some(path)) if path.player_id == session.player_id => path,
        _ => {
            state
                .registry
                .to_player(
                    connection_id,
                    ServerMessage::PathExecutionFailed {
                        reason: "The path vanished before it could start".to_string(),
                    },
                )
                .await;
            return;
        }
    };
    let steps: Vec<NavStep> = path
        .executable_steps()
        .into_iter()
        .filter_map(|s| {
            s.direction.map(|direction| NavStep {
                direction,
                room_id: s.room_id,
            })
        })
        .collect();
    if steps.is_empty() {
        return;
    }
    let is_looping = path.is_loop();
    state
        .registry
        .update(connection_id, |info| {
            info.path_execution = Some(PathExecution {
                path_id,
                steps,
                current_step: 0,
                is_looping,
                is_paused: false,
            });
        })
        .await;
    schedule_step(state.clone(), connection_id, 0).await;
}

pub(super) async fn auto_loop_time_ms(state: &WsState, player_id: PlayerId) -> i64 {
    state
        .app
        .repos
        .player
        .get_widget_config(player_id)
        .await
        .unwrap_or_default()
        .auto_loop_time_ms
}

pub(super) async fn auto_navigation_time_ms(state: &WsState, player_id: PlayerId) -> i64 {
    state
        .app
        .repos
        .player
        .get_widget_config(player_id)
        .await
        .unwrap_or_default()
        .auto_navigation_time_ms
}

// =============================================================================
// Helpers
// =============================================================================

async fn load_owned_path(
    state: &WsState,
    player_id: PlayerId,
    path_id_raw: &str,
) -> Result<Path, ServerMessage> {
    let path_id = parse_path_id(path_id_raw)?;
    match state.app.repos.path.path_by_id(path_id).await {
        Ok(Some(path)) if path.player_id == player_id => Ok(path),
        Ok(Some(_)) => Err(error_response("That path belongs to someone else")),
        Ok(None) => Err(error_response("Unknown path")),
        Err(e) => {
            tracing::error!(error = %e, "Path lookup failed");
            Err(error_response("Paths are unavailable"))
        }
    }
}

fn map_room(room: &Room) -> MapRoomData {
    MapRoomData {
        room_id: room.id.to_string(),
        x: room.x,
        y: room.y,
        name: room.name.clone(),
        kind: room.kind.label().to_string(),
    }
}

fn auto_path_step(step: &NavStep) -> AutoPathStep {
    AutoPathStep {
        direction: step.direction.code().to_string(),
        room_id: step.room_id.to_string(),
    }
}

fn kind_label(kind: PathKind) -> &'static str {
    match kind {
        PathKind::Path => "path",
        PathKind::Loop => "loop",
    }
}
