//! Port traits for infrastructure boundaries.
//!
//! These are the ONLY abstractions in the engine. The relational store
//! lives behind these traits; the engine never sees SQL. Clock and random
//! are ports so tests can pin time and dice.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
#[cfg(test)]
use mockall::automock;

use driftmere_domain::{
    ItemDefinition, LoreKeeper, Map, MapId, NpcId, NpcPlacement, NpcState, Path, PathId,
    PlacementId, Player, PlayerId, PlayerItem, Room, RoomId, RoomItem, ScriptableNpc,
};
use driftmere_shared::WidgetConfigData;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("Not found")]
    NotFound,
    #[error("Database error: {0}")]
    Database(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

// =============================================================================
// Authentication
// =============================================================================

/// A stored session resolved from a token. Created by the HTTP login
/// collaborator; the engine only validates.
#[derive(Debug, Clone)]
pub struct StoredSession {
    pub account: String,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait AuthRepo: Send + Sync {
    async fn validate_session(&self, token: &str) -> Result<Option<StoredSession>, RepoError>;
}

// =============================================================================
// Database Ports (one per concern)
// =============================================================================

#[cfg_attr(test, automock)]
#[async_trait]
pub trait PlayerRepo: Send + Sync {
    async fn get_by_name(&self, name: &str) -> Result<Option<Player>, RepoError>;
    async fn get_by_id(&self, id: PlayerId) -> Result<Option<Player>, RepoError>;
    async fn update_room(&self, id: PlayerId, room_id: RoomId) -> Result<(), RepoError>;
    async fn get_widget_config(&self, id: PlayerId) -> Result<WidgetConfigData, RepoError>;
    async fn set_widget_config(
        &self,
        id: PlayerId,
        config: WidgetConfigData,
    ) -> Result<(), RepoError>;
    /// Sum of carried item encumbrance.
    async fn current_encumbrance(&self, id: PlayerId) -> Result<f64, RepoError>;
    /// Spend one unspent point on the named attribute; returns the updated player.
    async fn assign_attribute_point(
        &self,
        id: PlayerId,
        attribute: &str,
    ) -> Result<Player, RepoError>;
    async fn adjust_vitalis(&self, id: PlayerId, delta: i32) -> Result<(), RepoError>;
    async fn list(&self) -> Result<Vec<Player>, RepoError>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait WorldRepo: Send + Sync {
    async fn room_by_id(&self, id: RoomId) -> Result<Option<Room>, RepoError>;
    async fn room_by_coords(
        &self,
        map_id: MapId,
        x: i32,
        y: i32,
    ) -> Result<Option<Room>, RepoError>;
    async fn rooms_by_map(&self, map_id: MapId) -> Result<Vec<Room>, RepoError>;
    async fn map_by_id(&self, id: MapId) -> Result<Option<Map>, RepoError>;
    async fn all_maps(&self) -> Result<Vec<Map>, RepoError>;
    /// (room kind label, display color) pairs.
    async fn room_kind_colors(&self) -> Result<Vec<(String, String)>, RepoError>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait NpcRepo: Send + Sync {
    async fn scriptable_npc_by_id(&self, id: NpcId) -> Result<Option<ScriptableNpc>, RepoError>;
    async fn placements_in_room(&self, room_id: RoomId) -> Result<Vec<NpcPlacement>, RepoError>;
    async fn placement_by_id(&self, id: PlacementId) -> Result<Option<NpcPlacement>, RepoError>;
    async fn update_npc_state(
        &self,
        placement_id: PlacementId,
        state: &NpcState,
    ) -> Result<(), RepoError>;
    /// The placement currently harvested by the player, if any.
    async fn active_harvest_for_player(
        &self,
        player_id: PlayerId,
    ) -> Result<Option<NpcPlacement>, RepoError>;
    /// All placements with a running harvest (cycle tick scan).
    async fn active_harvest_placements(&self) -> Result<Vec<NpcPlacement>, RepoError>;
    /// Flattened lore-keeper decorations for lorekeeper NPCs in the room.
    async fn lore_keepers_in_room(&self, room_id: RoomId) -> Result<Vec<LoreKeeper>, RepoError>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait LoreRepo: Send + Sync {
    async fn has_been_greeted(
        &self,
        player_id: PlayerId,
        npc_id: NpcId,
    ) -> Result<bool, RepoError>;
    async fn mark_greeted(&self, player_id: PlayerId, npc_id: NpcId) -> Result<(), RepoError>;
    async fn last_item_award_time(
        &self,
        player_id: PlayerId,
        npc_id: NpcId,
        item_name: &str,
    ) -> Result<Option<DateTime<Utc>>, RepoError>;
    async fn record_item_award(
        &self,
        player_id: PlayerId,
        npc_id: NpcId,
        item_name: &str,
        at: DateTime<Utc>,
    ) -> Result<(), RepoError>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ItemRepo: Send + Sync {
    async fn all_items(&self) -> Result<Vec<ItemDefinition>, RepoError>;
    async fn item_by_name(&self, name: &str) -> Result<Option<ItemDefinition>, RepoError>;
    async fn item_encumbrance(&self, name: &str) -> Result<f64, RepoError>;
    async fn player_items(&self, player_id: PlayerId) -> Result<Vec<PlayerItem>, RepoError>;
    async fn add_player_item(
        &self,
        player_id: PlayerId,
        item_name: &str,
        quantity: u32,
    ) -> Result<(), RepoError>;
    async fn remove_player_item(
        &self,
        player_id: PlayerId,
        item_name: &str,
        quantity: u32,
    ) -> Result<(), RepoError>;
    async fn room_items(&self, room_id: RoomId) -> Result<Vec<RoomItem>, RepoError>;
    async fn add_room_item(
        &self,
        room_id: RoomId,
        item_name: &str,
        quantity: u32,
    ) -> Result<(), RepoError>;
    async fn remove_room_item(
        &self,
        room_id: RoomId,
        item_name: &str,
        quantity: u32,
    ) -> Result<(), RepoError>;
    /// Remove items flagged poofable from the room floor.
    async fn remove_poofable_items(&self, room_id: RoomId) -> Result<(), RepoError>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait CurrencyRepo: Send + Sync {
    /// Currency stacks in the player's wallet: (item name, quantity).
    async fn player_currency(&self, player_id: PlayerId) -> Result<Vec<(String, u32)>, RepoError>;
    async fn add_player_currency(
        &self,
        player_id: PlayerId,
        item_name: &str,
        quantity: u32,
    ) -> Result<(), RepoError>;
    async fn remove_player_currency(
        &self,
        player_id: PlayerId,
        item_name: &str,
        quantity: u32,
    ) -> Result<(), RepoError>;
    /// Currency stacks held at the bank for the player.
    async fn bank_balance(&self, player_id: PlayerId) -> Result<Vec<(String, u32)>, RepoError>;
    async fn deposit_currency(
        &self,
        player_id: PlayerId,
        item_name: &str,
        quantity: u32,
    ) -> Result<(), RepoError>;
    async fn withdraw_currency(
        &self,
        player_id: PlayerId,
        item_name: &str,
        quantity: u32,
    ) -> Result<(), RepoError>;
}

/// Warehouse capacity limits for one player/warehouse pair.
#[derive(Debug, Clone, Copy)]
pub struct WarehouseCapacity {
    pub max_item_types: u32,
    pub max_quantity_per_type: u32,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait WarehouseRepo: Send + Sync {
    /// Warehouse keys from deeds the player carries, in inventory order.
    async fn player_deeds(&self, player_id: PlayerId) -> Result<Vec<String>, RepoError>;
    async fn has_deed(&self, player_id: PlayerId, warehouse_key: &str)
        -> Result<bool, RepoError>;
    async fn initialize(&self, player_id: PlayerId, warehouse_key: &str)
        -> Result<(), RepoError>;
    async fn capacity(
        &self,
        player_id: PlayerId,
        warehouse_key: &str,
    ) -> Result<WarehouseCapacity, RepoError>;
    async fn items(
        &self,
        player_id: PlayerId,
        warehouse_key: &str,
    ) -> Result<Vec<(String, u32)>, RepoError>;
    async fn add_item(
        &self,
        player_id: PlayerId,
        warehouse_key: &str,
        item_name: &str,
        quantity: u32,
    ) -> Result<(), RepoError>;
    async fn remove_item(
        &self,
        player_id: PlayerId,
        warehouse_key: &str,
        item_name: &str,
        quantity: u32,
    ) -> Result<(), RepoError>;
    async fn item_type_count(
        &self,
        player_id: PlayerId,
        warehouse_key: &str,
    ) -> Result<u32, RepoError>;
    async fn item_quantity(
        &self,
        player_id: PlayerId,
        warehouse_key: &str,
        item_name: &str,
    ) -> Result<u32, RepoError>;
}

/// One line of a merchant's stock.
#[derive(Debug, Clone)]
pub struct MerchantItem {
    pub item_name: String,
    /// Price in the smallest currency denomination.
    pub price: i64,
    /// Remaining stock; `None` means unlimited.
    pub stock: Option<u32>,
    pub buyable: bool,
    pub sellable: bool,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait MerchantRepo: Send + Sync {
    async fn items_for_room(&self, room_id: RoomId) -> Result<Vec<MerchantItem>, RepoError>;
    async fn update_stock(
        &self,
        room_id: RoomId,
        item_name: &str,
        new_stock: u32,
    ) -> Result<(), RepoError>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait PathRepo: Send + Sync {
    async fn create_path(&self, path: &Path) -> Result<PathId, RepoError>;
    async fn paths_by_player(&self, player_id: PlayerId) -> Result<Vec<Path>, RepoError>;
    async fn path_by_id(&self, id: PathId) -> Result<Option<Path>, RepoError>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait HistoryRepo: Send + Sync {
    async fn terminal_history(
        &self,
        player_id: PlayerId,
        limit: usize,
    ) -> Result<Vec<String>, RepoError>;
    async fn save_terminal_message(
        &self,
        player_id: PlayerId,
        message: &str,
    ) -> Result<(), RepoError>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait MessageRepo: Send + Sync {
    /// The full game message template catalogue: (key, template) pairs.
    async fn all_game_messages(&self) -> Result<Vec<(String, String)>, RepoError>;
}

// =============================================================================
// Testability Ports
// =============================================================================

pub trait ClockPort: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Epoch milliseconds, the unit placement state is stored in.
    fn now_ms(&self) -> i64 {
        self.now().timestamp_millis()
    }
}

pub trait RandomPort: Send + Sync {
    fn gen_range(&self, min: i32, max: i32) -> i32;
    /// Uniform in [0, 1).
    fn gen_f64(&self) -> f64;

    /// Uniform index into a non-empty slice length.
    fn gen_index(&self, len: usize) -> usize {
        if len <= 1 {
            0
        } else {
            self.gen_range(0, len as i32 - 1) as usize
        }
    }
}
