//! Recorded movement paths.

use serde::{Deserialize, Serialize};

use crate::{Direction, DomainError, MapId, PathId, PlayerId, Room, RoomId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathKind {
    Path,
    Loop,
}

/// One step of a recorded path. `direction` is the direction travelled
/// *into* this step's room; the first recorded step has none.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathStep {
    pub room_id: RoomId,
    pub direction: Option<Direction>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Path {
    pub id: PathId,
    pub player_id: PlayerId,
    pub map_id: MapId,
    pub origin_room_id: RoomId,
    pub name: String,
    pub kind: PathKind,
    pub steps: Vec<PathStep>,
}

impl Path {
    pub fn is_loop(&self) -> bool {
        self.kind == PathKind::Loop
    }

    /// Steps that can actually be executed: those with a recorded direction.
    pub fn executable_steps(&self) -> Vec<PathStep> {
        self.steps
            .iter()
            .filter(|s| s.direction.is_some())
            .cloned()
            .collect()
    }

    /// Check the recorded-path invariant before persisting: the path is
    /// named, has steps, every step room exists in `rooms`, consecutive
    /// rooms are grid-adjacent, and each recorded direction matches the
    /// geometry. The first step carries no direction and is exempt.
    pub fn validate(&self, rooms: &[Room]) -> Result<(), DomainError> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("A path needs a name"));
        }
        if self.steps.is_empty() {
            return Err(DomainError::validation("A path needs at least one step"));
        }
        for pair in self.steps.windows(2) {
            let from = room_in(rooms, pair[0].room_id)?;
            let to = room_in(rooms, pair[1].room_id)?;
            match Direction::between(from.coords(), to.coords()) {
                Some(direction) if pair[1].direction == Some(direction) => {}
                Some(_) => {
                    return Err(DomainError::constraint(format!(
                        "The step into {} records the wrong direction",
                        to.name
                    )))
                }
                None => {
                    return Err(DomainError::constraint(format!(
                        "{} and {} are not adjacent",
                        from.name, to.name
                    )))
                }
            }
        }
        Ok(())
    }
}

/// The direction travelled from one room into an adjacent one, as the
/// path recorder computes it for a new step.
pub fn step_direction(from: &Room, to: &Room) -> Result<Direction, DomainError> {
    if from.map_id != to.map_id {
        return Err(DomainError::constraint("Path steps cannot cross maps"));
    }
    Direction::between(from.coords(), to.coords())
        .ok_or_else(|| DomainError::constraint("Those rooms are not adjacent"))
}

fn room_in(rooms: &[Room], id: RoomId) -> Result<&Room, DomainError> {
    rooms
        .iter()
        .find(|r| r.id == id)
        .ok_or_else(|| DomainError::unknown_entity("room", id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RoomKind;

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

    fn path_over(rooms: &[&Room], directions: &[Option<Direction>]) -> Path {
        Path {
            id: PathId::new(),
            player_id: PlayerId::new(),
            map_id: rooms[0].map_id,
            origin_room_id: rooms[0].id,
            name: "mill run".to_string(),
            kind: PathKind::Loop,
            steps: rooms
                .iter()
                .zip(directions)
                .map(|(room, direction)| PathStep {
                    room_id: room.id,
                    direction: *direction,
                })
                .collect(),
        }
    }

    #[test]
    fn executable_steps_drop_directionless_entries() {
        let path = Path {
            id: PathId::new(),
            player_id: PlayerId::new(),
            map_id: MapId::new(),
            origin_room_id: RoomId::new(),
            name: "mill run".to_string(),
            kind: PathKind::Loop,
            steps: vec![
                PathStep {
                    room_id: RoomId::new(),
                    direction: None,
                },
                PathStep {
                    room_id: RoomId::new(),
                    direction: Some(Direction::North),
                },
                PathStep {
                    room_id: RoomId::new(),
                    direction: Some(Direction::East),
                },
            ],
        };
        let steps = path.executable_steps();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].direction, Some(Direction::North));
    }

    #[test]
    fn valid_recording_passes_validation() {
        let map = MapId::new();
        let a = room_at(map, 1, 1);
        let b = room_at(map, 1, 0);
        let c = room_at(map, 2, 0);
        let rooms = vec![a.clone(), b.clone(), c.clone()];
        let path = path_over(
            &[&a, &b, &c],
            &[None, Some(Direction::North), Some(Direction::East)],
        );
        assert_eq!(path.validate(&rooms), Ok(()));
    }

    #[test]
    fn non_adjacent_steps_fail_validation() {
        let map = MapId::new();
        let a = room_at(map, 1, 1);
        let b = room_at(map, 3, 3);
        let rooms = vec![a.clone(), b.clone()];
        let path = path_over(&[&a, &b], &[None, Some(Direction::SouthEast)]);
        assert!(matches!(
            path.validate(&rooms),
            Err(DomainError::Constraint(_))
        ));
    }

    #[test]
    fn mismatched_recorded_direction_fails_validation() {
        let map = MapId::new();
        let a = room_at(map, 1, 1);
        let b = room_at(map, 1, 0);
        let rooms = vec![a.clone(), b.clone()];
        // Travelling (1,1) -> (1,0) is north; the recording says south.
        let path = path_over(&[&a, &b], &[None, Some(Direction::South)]);
        assert!(matches!(
            path.validate(&rooms),
            Err(DomainError::Constraint(_))
        ));
    }

    #[test]
    fn step_into_unknown_room_fails_validation() {
        let map = MapId::new();
        let a = room_at(map, 1, 1);
        let b = room_at(map, 1, 0);
        // b is recorded but missing from the map's room set.
        let rooms = vec![a.clone()];
        let path = path_over(&[&a, &b], &[None, Some(Direction::North)]);
        assert!(matches!(
            path.validate(&rooms),
            Err(DomainError::UnknownEntity { .. })
        ));
    }

    #[test]
    fn unnamed_or_empty_paths_fail_validation() {
        let map = MapId::new();
        let a = room_at(map, 1, 1);
        let rooms = vec![a.clone()];
        let mut path = path_over(&[&a], &[None]);
        path.name = "  ".to_string();
        assert!(matches!(
            path.validate(&rooms),
            Err(DomainError::Validation(_))
        ));

        let mut path = path_over(&[&a], &[None]);
        path.steps.clear();
        assert!(matches!(
            path.validate(&rooms),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn step_direction_rejects_gaps_and_map_crossings() {
        let map = MapId::new();
        let a = room_at(map, 1, 1);
        assert_eq!(
            step_direction(&a, &room_at(map, 2, 2)),
            Ok(Direction::SouthEast)
        );
        assert!(matches!(
            step_direction(&a, &room_at(map, 3, 1)),
            Err(DomainError::Constraint(_))
        ));
        assert!(matches!(
            step_direction(&a, &room_at(MapId::new(), 1, 0)),
            Err(DomainError::Constraint(_))
        ));
    }
}
