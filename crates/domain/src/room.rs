//! Maps, rooms, and portals.

use serde::{Deserialize, Serialize};

use crate::{Direction, MapId, RoomId};

/// A map is a rectangular grid of rooms.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Map {
    pub id: MapId,
    pub name: String,
    pub width: i32,
    pub height: i32,
}

/// What kind of room this is; drives merchant/bank/warehouse/factory
/// behavior. Unrecognized kinds stored by the editor decode as `Normal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomKind {
    Normal,
    Factory,
    Warehouse,
    Merchant,
    Bank,
}

impl RoomKind {
    pub fn from_label(label: &str) -> RoomKind {
        match label.trim().to_ascii_lowercase().as_str() {
            "factory" => RoomKind::Factory,
            "warehouse" => RoomKind::Warehouse,
            "merchant" => RoomKind::Merchant,
            "bank" => RoomKind::Bank,
            _ => RoomKind::Normal,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RoomKind::Normal => "normal",
            RoomKind::Factory => "factory",
            RoomKind::Warehouse => "warehouse",
            RoomKind::Merchant => "merchant",
            RoomKind::Bank => "bank",
        }
    }
}

/// Inter-map link. A portal fires when the player moves in its direction
/// from the room that carries it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Portal {
    pub to_map: MapId,
    pub to_x: i32,
    pub to_y: i32,
    pub direction: Direction,
}

/// A single grid tile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub map_id: MapId,
    pub x: i32,
    pub y: i32,
    pub name: String,
    pub description: String,
    pub kind: RoomKind,
    pub portal: Option<Portal>,
}

impl Room {
    /// Grid coordinate pair.
    pub fn coords(&self) -> (i32, i32) {
        (self.x, self.y)
    }

    /// Two rooms are adjacent iff they share a map and their coordinates
    /// differ by at most one in each axis (8-neighborhood).
    pub fn is_adjacent_to(&self, other: &Room) -> bool {
        if self.map_id != other.map_id || self.id == other.id {
            return false;
        }
        let dx = (self.x - other.x).abs();
        let dy = (self.y - other.y).abs();
        dx <= 1 && dy <= 1
    }

    /// The portal's destination coordinates, if moving `direction` crosses maps.
    pub fn portal_for(&self, direction: Direction) -> Option<&Portal> {
        self.portal
            .as_ref()
            .filter(|p| p.direction == direction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room_at(map_id: MapId, x: i32, y: i32) -> Room {
        Room {
            id: RoomId::new(),
            map_id,
            x,
            y,
            name: format!("Room {x},{y}"),
            description: String::new(),
            kind: RoomKind::Normal,
            portal: None,
        }
    }

    #[test]
    fn diagonal_neighbors_are_adjacent() {
        let map = MapId::new();
        let a = room_at(map, 2, 2);
        for (x, y) in [(1, 1), (2, 1), (3, 1), (1, 2), (3, 2), (1, 3), (2, 3), (3, 3)] {
            assert!(a.is_adjacent_to(&room_at(map, x, y)), "({x},{y})");
        }
        assert!(!a.is_adjacent_to(&room_at(map, 4, 2)));
        assert!(!a.is_adjacent_to(&room_at(MapId::new(), 2, 3)));
    }

    #[test]
    fn unknown_room_kind_decodes_as_normal() {
        assert_eq!(RoomKind::from_label("shrine"), RoomKind::Normal);
        assert_eq!(RoomKind::from_label("Bank"), RoomKind::Bank);
    }

    #[test]
    fn portal_matches_only_its_direction() {
        let map = MapId::new();
        let mut room = room_at(map, 0, 0);
        room.portal = Some(Portal {
            to_map: MapId::new(),
            to_x: 5,
            to_y: 5,
            direction: Direction::East,
        });
        assert!(room.portal_for(Direction::East).is_some());
        assert!(room.portal_for(Direction::West).is_none());
    }
}
