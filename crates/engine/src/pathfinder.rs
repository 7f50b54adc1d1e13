//! Auto-navigation pathfinder.
//!
//! Breadth-first search over the 8-neighborhood of in-map room coordinates.
//! Inter-map portals are out of scope here; callers report failure when no
//! in-map route exists.

use std::collections::{HashMap, VecDeque};

use driftmere_domain::{Direction, Room, RoomId};

/// One computed step: the direction to walk and the room it lands in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavStep {
    pub direction: Direction,
    pub room_id: RoomId,
}

/// Shortest room sequence from `from` to `to` over the rooms of one map.
///
/// Returns `None` when the rooms are on different maps, either endpoint is
/// missing from `rooms`, or no route exists. An empty step list means the
/// endpoints coincide.
pub fn find_path(rooms: &[Room], from: RoomId, to: RoomId) -> Option<Vec<NavStep>> {
    let from_room = rooms.iter().find(|r| r.id == from)?;
    let to_room = rooms.iter().find(|r| r.id == to)?;
    if from_room.map_id != to_room.map_id {
        return None;
    }
    if from == to {
        return Some(Vec::new());
    }

    let by_coords: HashMap<(i32, i32), &Room> = rooms
        .iter()
        .filter(|r| r.map_id == from_room.map_id)
        .map(|r| (r.coords(), r))
        .collect();

    // BFS; predecessor map records how each room was reached.
    let mut visited: HashMap<RoomId, (RoomId, Direction)> = HashMap::new();
    let mut queue = VecDeque::new();
    queue.push_back(from_room);

    while let Some(current) = queue.pop_front() {
        for direction in Direction::ALL {
            let (dx, dy) = direction.delta();
            let next_coords = (current.x + dx, current.y + dy);
            let Some(&next) = by_coords.get(&next_coords) else {
                continue;
            };
            if next.id == from || visited.contains_key(&next.id) {
                continue;
            }
            visited.insert(next.id, (current.id, direction));
            if next.id == to {
                return Some(walk_back(&visited, from, to));
            }
            queue.push_back(next);
        }
    }

    None
}

fn walk_back(
    visited: &HashMap<RoomId, (RoomId, Direction)>,
    from: RoomId,
    to: RoomId,
) -> Vec<NavStep> {
    let mut steps = Vec::new();
    let mut cursor = to;
    while cursor != from {
        let Some(&(prev, direction)) = visited.get(&cursor) else {
            break;
        };
        steps.push(NavStep {
            direction,
            room_id: cursor,
        });
        cursor = prev;
    }
    steps.reverse();
    steps
}
