//! WebSocket handling for client connections.
//!
//! Owns the upgrade path, the per-connection relay task, and the command
//! dispatcher. Every inbound frame carries a `type`; `authenticateSession`
//! is the only type dispatched without a session.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use driftmere_domain::ConnectionId;
use driftmere_shared::{ClientMessage, ServerMessage};

use crate::app::App;

use super::connections::{SessionRegistry, CONNECTION_CHANNEL_BUFFER};

mod ws_admin;
mod ws_chat;
mod ws_economy;
mod ws_harvest;
mod ws_items;
mod ws_lorekeeper;
mod ws_movement;
mod ws_paths;
mod ws_session;
mod ws_warehouse;

#[cfg(test)]
mod ws_integration_tests;

/// Combined state for WebSocket handlers. Cheap to clone into timer tasks.
#[derive(Clone)]
pub struct WsState {
    pub app: Arc<App>,
    pub registry: Arc<SessionRegistry>,
}

/// WebSocket upgrade handler - entry point for new connections.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<WsState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle an individual WebSocket connection.
async fn handle_socket(socket: WebSocket, state: WsState) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let connection_id = ConnectionId::new();
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(CONNECTION_CHANNEL_BUFFER);

    tracing::info!(connection_id = %connection_id, "WebSocket connection established");

    // Forward messages from the channel to the WebSocket.
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Ok(json) = serde_json::to_string(&msg) {
                if ws_sender.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
        }
    });

    while let Some(result) = ws_receiver.next().await {
        match result {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(text.as_str()) {
                Ok(msg) => {
                    if let Some(response) =
                        handle_message(msg, &state, connection_id, &tx).await
                    {
                        if tx.try_send(response).is_err() {
                            tracing::warn!(
                                connection_id = %connection_id,
                                "Failed to send response, channel full or closed"
                            );
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(connection_id = %connection_id, error = %e, "Failed to parse message");
                    let _ = tx.try_send(error_response(&format!("Invalid message format: {e}")));
                }
            },
            Ok(Message::Ping(_)) => {
                let _ = tx.try_send(ServerMessage::Pong);
            }
            Ok(Message::Close(_)) => {
                tracing::info!(connection_id = %connection_id, "WebSocket closed by client");
                break;
            }
            Err(e) => {
                tracing::error!(connection_id = %connection_id, error = %e, "WebSocket error");
                break;
            }
            _ => {}
        }
    }

    // Connection gone: release timers, spill widgets, end harvests, notify.
    ws_session::handle_disconnect(&state, connection_id).await;
    send_task.abort();

    tracing::info!(connection_id = %connection_id, "WebSocket connection terminated");
}

/// Dispatch a parsed client message to the appropriate handler.
pub async fn handle_message(
    msg: ClientMessage,
    state: &WsState,
    connection_id: ConnectionId,
    tx: &mpsc::Sender<ServerMessage>,
) -> Option<ServerMessage> {
    // Connection lifecycle: the only unauthenticated type.
    if let ClientMessage::AuthenticateSession {
        session_token,
        player_name,
        window_id,
    } = &msg
    {
        return ws_session::handle_authenticate(
            state,
            connection_id,
            tx.clone(),
            session_token.clone(),
            player_name.clone(),
            window_id.clone(),
        )
        .await;
    }

    if matches!(msg, ClientMessage::Heartbeat) {
        return Some(ServerMessage::Pong);
    }

    let Some(session) = state.registry.get(connection_id).await else {
        return Some(error_response("Not authenticated"));
    };

    // Harvest-interruption rule: a non-safe, non-harvest command ends an
    // active harvest, unless the harvest started inside the 2 s grace
    // window (protects against races with the harvest-start frame).
    if !is_safe(&msg) && !matches!(msg, ClientMessage::Harvest { .. }) {
        ws_harvest::interrupt_for_command(state, connection_id, session.player_id).await;
    }

    match msg {
        ClientMessage::AuthenticateSession { .. } | ClientMessage::Heartbeat => None,

        // Movement
        ClientMessage::Move { direction } => {
            ws_movement::handle_move(state, connection_id, &direction).await
        }

        // Observation & items
        ClientMessage::Look => ws_items::handle_look(state, connection_id).await,
        ClientMessage::Inventory => ws_items::handle_inventory(state, connection_id).await,
        ClientMessage::Take {
            item_name,
            quantity,
        } => ws_items::handle_take(state, connection_id, &item_name, quantity.as_deref()).await,
        ClientMessage::Drop {
            item_name,
            quantity,
        } => ws_items::handle_drop(state, connection_id, &item_name, quantity.as_deref()).await,
        ClientMessage::FactoryWidgetAddItem {
            slot,
            item_name,
            quantity,
        } => {
            ws_items::handle_factory_widget_add_item(
                state,
                connection_id,
                slot,
                &item_name,
                quantity,
            )
            .await
        }
        ClientMessage::GetWidgetConfig => {
            ws_items::handle_get_widget_config(state, connection_id).await
        }
        ClientMessage::UpdateWidgetConfig {
            auto_loop_time_ms,
            auto_navigation_time_ms,
        } => {
            ws_items::handle_update_widget_config(
                state,
                connection_id,
                auto_loop_time_ms,
                auto_navigation_time_ms,
            )
            .await
        }

        // Harvesting
        ClientMessage::Harvest { target } => {
            ws_harvest::handle_harvest(state, connection_id, &target).await
        }

        // Chat & lore keepers
        ClientMessage::Talk { message } => {
            ws_lorekeeper::handle_talk(state, connection_id, &message).await
        }
        ClientMessage::Ask { target, message } => {
            ws_lorekeeper::handle_ask(state, connection_id, &target, &message).await
        }
        ClientMessage::Solve { target, answer } => {
            ws_lorekeeper::handle_solve(state, connection_id, &target, &answer).await
        }
        ClientMessage::Clue { target } => {
            ws_lorekeeper::handle_clue(state, connection_id, &target).await
        }
        ClientMessage::Greet { target } => {
            ws_lorekeeper::handle_greet(state, connection_id, &target).await
        }
        ClientMessage::Resonate { message } => {
            ws_chat::handle_resonate(state, connection_id, &message).await
        }
        ClientMessage::Telepath { target, message } => {
            ws_chat::handle_telepath(state, connection_id, &target, &message).await
        }
        ClientMessage::Who => ws_chat::handle_who(state, connection_id).await,
        ClientMessage::SaveTerminalMessage { message } => {
            ws_chat::handle_save_terminal_message(state, connection_id, &message).await
        }

        // Economy & storage
        ClientMessage::List => ws_economy::handle_list(state, connection_id).await,
        ClientMessage::Buy {
            item_name,
            quantity,
        } => ws_economy::handle_buy(state, connection_id, &item_name, quantity).await,
        ClientMessage::Sell {
            item_name,
            quantity,
        } => ws_economy::handle_sell(state, connection_id, &item_name, quantity).await,
        ClientMessage::Deposit {
            currency_name,
            quantity,
        } => ws_economy::handle_deposit(state, connection_id, &currency_name, &quantity).await,
        ClientMessage::Balance => ws_economy::handle_balance(state, connection_id).await,
        ClientMessage::Wealth => ws_economy::handle_wealth(state, connection_id).await,
        ClientMessage::Warehouse => ws_warehouse::handle_warehouse(state, connection_id).await,
        ClientMessage::Store {
            item_name,
            quantity,
        } => ws_warehouse::handle_store(state, connection_id, &item_name, quantity.as_deref()).await,
        ClientMessage::Withdraw {
            item_name,
            currency_name,
            quantity,
        } => {
            // One wire type, two meanings: banks withdraw currency,
            // warehouses withdraw items. Room kind decides.
            ws_economy::handle_withdraw(
                state,
                connection_id,
                item_name.as_deref(),
                currency_name.as_deref(),
                quantity.as_deref(),
            )
            .await
        }

        // Paths & auto-navigation
        ClientMessage::StartPathingMode => {
            ws_paths::handle_start_pathing_mode(state, connection_id).await
        }
        ClientMessage::AddPathStep {
            room_id,
            previous_room_id,
        } => {
            ws_paths::handle_add_path_step(
                state,
                connection_id,
                &room_id,
                previous_room_id.as_deref(),
            )
            .await
        }
        ClientMessage::SavePath {
            name,
            kind,
            steps,
            map_id,
            origin_room_id,
        } => {
            ws_paths::handle_save_path(
                state,
                connection_id,
                &name,
                &kind,
                steps,
                &map_id,
                &origin_room_id,
            )
            .await
        }
        ClientMessage::CancelPathing => {
            ws_paths::handle_cancel_pathing(state, connection_id).await
        }
        ClientMessage::GetPathingRoom => {
            ws_paths::handle_get_pathing_room(state, connection_id).await
        }
        ClientMessage::GetAllPlayerPaths => {
            ws_paths::handle_get_all_player_paths(state, connection_id).await
        }
        ClientMessage::GetPathDetails { path_id } => {
            ws_paths::handle_get_path_details(state, connection_id, &path_id).await
        }
        ClientMessage::StartPathExecution { path_id } => {
            ws_paths::handle_start_path_execution(state, connection_id, &path_id).await
        }
        ClientMessage::StopPathExecution => {
            ws_paths::handle_stop_path_execution(state, connection_id).await
        }
        ClientMessage::ContinuePathExecution { path_id } => {
            ws_paths::handle_continue_path_execution(state, connection_id, &path_id).await
        }
        ClientMessage::GetAutoPathMaps => {
            ws_paths::handle_get_auto_path_maps(state, connection_id).await
        }
        ClientMessage::GetAutoPathRooms { map_id } => {
            ws_paths::handle_get_auto_path_rooms(state, connection_id, &map_id).await
        }
        ClientMessage::CalculateAutoPath {
            destination_room_id,
        } => {
            ws_paths::handle_calculate_auto_path(state, connection_id, &destination_room_id).await
        }
        ClientMessage::StartAutoNavigation {
            destination_room_id,
        } => {
            ws_paths::handle_start_auto_navigation(state, connection_id, &destination_room_id)
                .await
        }

        // Administration
        ClientMessage::AssignAttributePoint { attribute } => {
            ws_admin::handle_assign_attribute_point(state, connection_id, &attribute).await
        }
        ClientMessage::GetMapData => ws_admin::handle_get_map_data(state, connection_id).await,
        ClientMessage::RestartServer => {
            ws_admin::handle_restart_server(state, connection_id).await
        }

        // Forward compatibility - return error so the client doesn't hang.
        ClientMessage::Unknown => {
            tracing::warn!(connection_id = %connection_id, "Received unknown message type");
            Some(error_response("Unrecognized message type"))
        }
    }
}

/// Commands that never interrupt an active harvest: queries, configuration
/// reads/writes, and chat.
fn is_safe(msg: &ClientMessage) -> bool {
    matches!(
        msg,
        ClientMessage::Look
            | ClientMessage::Inventory
            | ClientMessage::Who
            | ClientMessage::Wealth
            | ClientMessage::Balance
            | ClientMessage::List
            | ClientMessage::Warehouse
            | ClientMessage::GetMapData
            | ClientMessage::GetWidgetConfig
            | ClientMessage::UpdateWidgetConfig { .. }
            | ClientMessage::Talk { .. }
            | ClientMessage::Ask { .. }
            | ClientMessage::Telepath { .. }
            | ClientMessage::Resonate { .. }
            | ClientMessage::Greet { .. }
            | ClientMessage::Solve { .. }
            | ClientMessage::Clue { .. }
            | ClientMessage::SaveTerminalMessage { .. }
            | ClientMessage::GetAutoPathMaps
            | ClientMessage::GetAutoPathRooms { .. }
            | ClientMessage::CalculateAutoPath { .. }
            | ClientMessage::GetPathingRoom
            | ClientMessage::GetAllPlayerPaths
            | ClientMessage::GetPathDetails { .. }
            | ClientMessage::StartPathingMode
            | ClientMessage::AddPathStep { .. }
            | ClientMessage::SavePath { .. }
            | ClientMessage::CancelPathing
            | ClientMessage::StopPathExecution
            | ClientMessage::Heartbeat
    )
}

// =============================================================================
// Helpers
// =============================================================================

pub(super) fn error_response(message: &str) -> ServerMessage {
    ServerMessage::Error {
        message: message.to_string(),
    }
}

/// Parse a typed ID from its wire string, mapping failure to an error frame.
fn parse_id<T, F>(id_str: &str, from_uuid: F, error_msg: &str) -> Result<T, ServerMessage>
where
    F: FnOnce(uuid::Uuid) -> T,
{
    uuid::Uuid::parse_str(id_str).map(from_uuid).map_err(|e| {
        tracing::warn!(input = %id_str, error = %e, "Invalid ID format");
        error_response(error_msg)
    })
}

fn parse_room_id(id_str: &str) -> Result<driftmere_domain::RoomId, ServerMessage> {
    parse_id(id_str, driftmere_domain::RoomId::from_uuid, "Invalid room ID")
}

fn parse_map_id(id_str: &str) -> Result<driftmere_domain::MapId, ServerMessage> {
    parse_id(id_str, driftmere_domain::MapId::from_uuid, "Invalid map ID")
}

fn parse_path_id(id_str: &str) -> Result<driftmere_domain::PathId, ServerMessage> {
    parse_id(id_str, driftmere_domain::PathId::from_uuid, "Invalid path ID")
}

/// Requested quantity: a number or "all".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Quantity {
    All,
    Count(u32),
}

impl Quantity {
    fn parse(raw: Option<&str>) -> Result<Quantity, ServerMessage> {
        match raw {
            None => Ok(Quantity::Count(1)),
            Some(raw) => {
                let raw = raw.trim();
                if raw.eq_ignore_ascii_case("all") {
                    Ok(Quantity::All)
                } else {
                    match raw.parse::<u32>() {
                        Ok(n) if n > 0 => Ok(Quantity::Count(n)),
                        _ => Err(error_response(&format!("Invalid quantity: {raw}"))),
                    }
                }
            }
        }
    }

    fn resolve(self, available: u32) -> u32 {
        match self {
            Quantity::All => available,
            Quantity::Count(n) => n,
        }
    }
}
