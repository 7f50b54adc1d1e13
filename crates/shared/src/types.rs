//! Payload structs carried inside protocol messages.

use serde::{Deserialize, Serialize};

/// An NPC as shown in a room frame, decorated with its status label.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NpcInRoom {
    pub name: String,
    /// "idle" | "ready" | "harvesting" | "cooldown"
    pub status: String,
}

/// A quantity of one named item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemStack {
    pub name: String,
    pub quantity: u32,
}

/// Snapshot of the two factory widget slots.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FactoryWidgetData {
    pub slots: Vec<Option<ItemStack>>,
}

/// Snapshot of a warehouse shown in a warehouse room or remote view.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarehouseWidgetData {
    pub warehouse_key: String,
    pub items: Vec<ItemStack>,
    pub max_item_types: u32,
    pub max_quantity_per_type: u32,
    pub view_only: bool,
}

/// The canonical room frame pushed on arrival and on room changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomFrame {
    pub room_id: String,
    pub name: String,
    pub description: String,
    pub map_name: String,
    pub kind: String,
    /// Other players present ("Also here").
    pub players: Vec<String>,
    pub npcs: Vec<NpcInRoom>,
    /// Items on the ground.
    pub items: Vec<ItemStack>,
    /// Exit directions as short codes.
    pub exits: Vec<String>,
    pub first_time: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factory_widget: Option<FactoryWidgetData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warehouse_widget: Option<WarehouseWidgetData>,
}

/// Full stat block for the stats panel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStatsData {
    pub name: String,
    pub resonance: i32,
    pub fortitude: i32,
    pub vigor: i32,
    pub finesse: i32,
    pub insight: i32,
    pub presence: i32,
    pub vitalis: i32,
    pub unspent_points: i32,
    pub encumbrance: f64,
    pub encumbrance_capacity: f64,
}

/// One line of a merchant catalogue.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MerchantEntry {
    pub name: String,
    /// Price in the smallest currency denomination.
    pub price: i64,
    /// Remaining stock; `None` means unlimited.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stock: Option<u32>,
    pub buyable: bool,
    pub sellable: bool,
}

/// A room as listed in map data pushes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapRoomData {
    pub room_id: String,
    pub x: i32,
    pub y: i32,
    pub name: String,
    pub kind: String,
}

/// A map as listed for auto-path selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapSummary {
    pub map_id: String,
    pub name: String,
}

/// Display color for one room kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomKindColor {
    pub kind: String,
    pub color: String,
}

/// One step of a recorded path, as transmitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathStepData {
    pub room_id: String,
    /// Short direction code; absent on the first recorded step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
}

/// A saved path in list form.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathSummary {
    pub path_id: String,
    pub name: String,
    /// "path" | "loop"
    pub kind: String,
    pub map_id: String,
}

/// A saved path with its full step list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathDetails {
    pub path_id: String,
    pub name: String,
    pub kind: String,
    pub map_id: String,
    pub origin_room_id: String,
    pub steps: Vec<PathStepData>,
}

/// One computed auto-navigation step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoPathStep {
    pub direction: String,
    pub room_id: String,
}

/// Per-player widget timing configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetConfigData {
    pub auto_loop_time_ms: i64,
    pub auto_navigation_time_ms: i64,
}

impl Default for WidgetConfigData {
    fn default() -> Self {
        Self {
            auto_loop_time_ms: 2000,
            auto_navigation_time_ms: 1000,
        }
    }
}
