//! Item catalogue and quantity stacks.

use serde::{Deserialize, Serialize};

use crate::{ItemId, PlayerId, RoomId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Ingredient,
    Rune,
    Deed,
    Currency,
    Sundries,
}

/// A catalogue entry. Items are referenced by unique name in stacks and
/// recipes; the id exists for editor tooling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemDefinition {
    pub id: ItemId,
    pub name: String,
    pub kind: ItemKind,
    /// Weight contributed per unit carried.
    pub encumbrance: f64,
    /// Removed from a room once the room has no players left in it.
    pub poofable: bool,
    /// For deeds: which warehouse this deed unlocks.
    pub warehouse_key: Option<String>,
    /// For currency: worth in the smallest denomination.
    pub currency_value: Option<i64>,
}

impl ItemDefinition {
    pub fn is_currency(&self) -> bool {
        self.kind == ItemKind::Currency
    }

    pub fn is_deed(&self) -> bool {
        self.kind == ItemKind::Deed
    }
}

/// Quantity of one item lying in a room.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomItem {
    pub room_id: RoomId,
    pub item_name: String,
    pub quantity: u32,
}

/// Quantity of one item in a player's inventory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerItem {
    pub player_id: PlayerId,
    pub item_name: String,
    pub quantity: u32,
}
