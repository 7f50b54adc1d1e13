//! WebSocket message types for engine-client communication.
//!
//! ## Versioning Policy
//!
//! - New variants can be added at the end (forward compatible)
//! - Removing variants requires major version bump
//! - Renaming variants is a breaking change
//! - Unknown enum variants deserialize to `Unknown` for forward compatibility

use serde::{Deserialize, Serialize};

use crate::types::{
    AutoPathStep, FactoryWidgetData, MapRoomData, MapSummary, MerchantEntry, PathDetails,
    PathStepData, PathSummary, PlayerStatsData, RoomFrame, RoomKindColor, WarehouseWidgetData,
    WidgetConfigData,
};

// =============================================================================
// Client Messages (Client → Engine)
// =============================================================================

/// Messages from client to engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Authenticate a connection against a stored session token.
    AuthenticateSession {
        session_token: String,
        player_name: String,
        #[serde(default)]
        window_id: Option<String>,
    },
    /// Move one room in a compass direction.
    Move { direction: String },
    /// Re-send the current room frame.
    Look,
    /// List carried items.
    Inventory,
    /// Pick an item up off the ground.
    Take {
        item_name: String,
        #[serde(default)]
        quantity: Option<String>,
    },
    /// Drop an item on the ground.
    Drop {
        item_name: String,
        #[serde(default)]
        quantity: Option<String>,
    },
    /// Load an inventory item into a factory widget slot.
    FactoryWidgetAddItem {
        slot: u32,
        item_name: String,
        quantity: u32,
    },
    /// Start harvesting a rhythm NPC in the room.
    Harvest { target: String },
    /// Emote a resonance pulse to the room.
    Resonate { message: String },
    /// Speak to the room (also drives lore-keeper dialogue and puzzles).
    Talk { message: String },
    /// Ask a specific NPC about something.
    Ask { target: String, message: String },
    /// Private message to another player anywhere in the world.
    Telepath { target: String, message: String },
    /// Submit a puzzle answer to a lore keeper.
    Solve { target: String, answer: String },
    /// Request the current clue from a puzzle keeper.
    Clue { target: String },
    /// Greet a lore keeper directly.
    Greet { target: String },
    /// Show the warehouse the player holds a deed for.
    Warehouse,
    /// Store an item in the current warehouse.
    Store {
        item_name: String,
        #[serde(default)]
        quantity: Option<String>,
    },
    /// Withdraw from a warehouse (itemName) or a bank (currencyName),
    /// depending on the room.
    Withdraw {
        #[serde(default)]
        item_name: Option<String>,
        #[serde(default)]
        currency_name: Option<String>,
        #[serde(default)]
        quantity: Option<String>,
    },
    /// Merchant stock catalogue.
    List,
    /// Deposit currency at a bank.
    Deposit {
        currency_name: String,
        quantity: String,
    },
    /// Bank balance.
    Balance,
    /// Buy from a merchant.
    Buy {
        item_name: String,
        #[serde(default)]
        quantity: Option<u32>,
    },
    /// Sell to a merchant.
    Sell {
        item_name: String,
        #[serde(default)]
        quantity: Option<u32>,
    },
    /// Wallet plus bank total.
    Wealth,
    /// Who is online.
    Who,
    /// Persist one line of terminal history.
    SaveTerminalMessage { message: String },
    /// Spend an unspent attribute point.
    AssignAttributePoint { attribute: String },
    /// Maps available for auto-navigation.
    GetAutoPathMaps,
    /// Rooms of one map for auto-navigation.
    GetAutoPathRooms { map_id: String },
    /// Compute a path to a destination without walking it.
    CalculateAutoPath { destination_room_id: String },
    /// Walk to a destination room.
    StartAutoNavigation { destination_room_id: String },
    /// Read the per-player widget timing configuration.
    GetWidgetConfig,
    /// Update the per-player widget timing configuration.
    UpdateWidgetConfig {
        #[serde(default)]
        auto_loop_time_ms: Option<i64>,
        #[serde(default)]
        auto_navigation_time_ms: Option<i64>,
    },
    /// Begin recording a path at the current room.
    StartPathingMode,
    /// Record one step while pathing.
    AddPathStep {
        room_id: String,
        #[serde(default)]
        previous_room_id: Option<String>,
    },
    /// Persist the recorded path.
    SavePath {
        name: String,
        kind: String,
        steps: Vec<PathStepData>,
        map_id: String,
        origin_room_id: String,
    },
    /// Abandon path recording.
    CancelPathing,
    /// Rooms and colors of the current map.
    GetMapData,
    /// The room the pathing recorder currently points at.
    GetPathingRoom,
    /// All saved paths of the player.
    GetAllPlayerPaths,
    /// One saved path with steps.
    GetPathDetails { path_id: String },
    /// Execute a saved path (auto-navigating to its origin first).
    StartPathExecution { path_id: String },
    /// Pause the running path execution.
    StopPathExecution,
    /// Resume a paused path execution.
    ContinuePathExecution { path_id: String },
    /// Restart the server (maintenance port only).
    RestartServer,
    /// Heartbeat ping.
    Heartbeat,
    /// Forward compatibility - unknown message types land here.
    #[serde(other)]
    Unknown,
}

// =============================================================================
// Server Messages (Engine → Client)
// =============================================================================

/// Messages from engine to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// A handler rejected the request.
    Error { message: String },
    /// Plain prose to the terminal; `html` marks pre-rendered markup.
    Message {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        html: Option<bool>,
    },
    /// World-level announcement.
    SystemMessage { message: String },
    /// The canonical room frame.
    RoomUpdate { room: RoomFrame },
    /// Move acknowledgement with the travelled direction.
    Moved { direction: String },
    /// Rooms and colors of one map (sent on connect and map transitions).
    MapData {
        map_id: String,
        map_name: String,
        rooms: Vec<MapRoomData>,
        room_kind_colors: Vec<RoomKindColor>,
    },
    /// Position-only update within the current map.
    MapUpdate { map_id: String, x: i32, y: i32 },
    /// Full stat block.
    PlayerStats { stats: PlayerStatsData },
    /// A player entered the game.
    PlayerJoined { player_name: String },
    /// A player left the game.
    PlayerLeft { player_name: String },
    /// A resonance pulse in the room.
    Resonated { player_name: String, message: String },
    /// Room speech.
    Talked { player_name: String, message: String },
    /// Incoming private message.
    Telepath { from: String, message: String },
    /// Echo of an outgoing private message.
    TelepathSent { to: String, message: String },
    /// Colored lore-keeper speech.
    LoreKeeperMessage {
        npc_name: String,
        npc_color: String,
        message: String,
        message_color: String,
        keyword_color: String,
    },
    /// Inventory listing with encumbrance.
    InventoryList {
        items: Vec<crate::types::ItemStack>,
        encumbrance: f64,
        encumbrance_capacity: f64,
    },
    /// Merchant catalogue.
    MerchantList { items: Vec<MerchantEntry> },
    /// Factory widget snapshot.
    FactoryWidgetState { widget: FactoryWidgetData },
    /// Warehouse widget snapshot.
    WarehouseWidgetState { widget: WarehouseWidgetData },
    /// Current widget timing configuration.
    WidgetConfig { config: WidgetConfigData },
    /// Widget timing configuration after an update.
    WidgetConfigUpdated { config: WidgetConfigData },
    /// Replayed terminal history lines.
    TerminalHistory { messages: Vec<String> },
    /// Pathing recorder started; origin room follows.
    PathingModeStarted { origin_room_id: String },
    /// One step was recorded.
    PathStepAdded {
        room_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        direction: Option<String>,
    },
    /// The recorded path was persisted.
    PathSaved { path_id: String, name: String },
    /// Path recording was abandoned.
    PathingCancelled,
    /// The room the recorder currently points at.
    PathingRoom { room: MapRoomData },
    /// All saved paths of the player.
    AllPlayerPaths { paths: Vec<PathSummary> },
    /// One saved path with steps.
    PathDetails { path: PathDetails },
    PathExecutionStarted { path_id: String },
    PathExecutionComplete { path_id: String },
    PathExecutionStopped { path_id: String },
    PathExecutionResumed { path_id: String },
    PathExecutionFailed { reason: String },
    /// Maps available for auto-navigation.
    AutoPathMaps { maps: Vec<MapSummary> },
    /// Rooms of one map for auto-navigation.
    AutoPathRooms { rooms: Vec<MapRoomData> },
    /// A computed (not walked) path.
    AutoPathCalculated { steps: Vec<AutoPathStep> },
    AutoNavigationStarted {
        destination_room_id: String,
        steps: Vec<AutoPathStep>,
    },
    AutoNavigationComplete,
    AutoNavigationFailed { reason: String },
    /// The connection was superseded by a takeover; the channel closes next.
    ForceClose,
    /// The game message catalogue.
    GameMessages {
        messages: Vec<(String, String)>,
    },
    /// Heartbeat reply.
    Pong,
    /// Forward compatibility.
    #[serde(other)]
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_tags_are_camel_case() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"move","direction":"E"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Move { ref direction } if direction == "E"));

        let msg: ClientMessage = serde_json::from_str(
            r#"{"type":"authenticateSession","sessionToken":"t","playerName":"Wren","windowId":"w1"}"#,
        )
        .unwrap();
        match msg {
            ClientMessage::AuthenticateSession {
                session_token,
                player_name,
                window_id,
            } => {
                assert_eq!(session_token, "t");
                assert_eq!(player_name, "Wren");
                assert_eq!(window_id.as_deref(), Some("w1"));
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn deposit_uses_currency_name_field() {
        let msg: ClientMessage = serde_json::from_str(
            r#"{"type":"deposit","currencyName":"glimmer","quantity":"all"}"#,
        )
        .unwrap();
        assert!(matches!(
            msg,
            ClientMessage::Deposit { ref currency_name, ref quantity }
                if currency_name == "glimmer" && quantity == "all"
        ));
    }

    #[test]
    fn unknown_client_type_falls_back() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"definitelyNotAThing"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Unknown));
    }

    #[test]
    fn server_error_round_trips() {
        let json = serde_json::to_string(&ServerMessage::Error {
            message: "You walked into a wall.".to_string(),
        })
        .unwrap();
        assert!(json.contains(r#""type":"error""#));
        let back: ServerMessage = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, ServerMessage::Error { .. }));
    }

    #[test]
    fn lore_keeper_message_serializes_color_fields() {
        let json = serde_json::to_string(&ServerMessage::LoreKeeperMessage {
            npc_name: "Oracle".to_string(),
            npc_color: "#a0e0ff".to_string(),
            message: "Listen closely.".to_string(),
            message_color: "#ffffff".to_string(),
            keyword_color: "#ffd700".to_string(),
        })
        .unwrap();
        for field in ["npcName", "npcColor", "message", "messageColor", "keywordColor"] {
            assert!(json.contains(field), "missing {field} in {json}");
        }
    }

    #[test]
    fn optional_html_flag_is_omitted_when_none() {
        let json = serde_json::to_string(&ServerMessage::Message {
            message: "hello".to_string(),
            html: None,
        })
        .unwrap();
        assert!(!json.contains("html"));
    }
}
