//! Compass directions.
//!
//! Movement is restricted to the eight compass directions; vertical travel
//! ("up"/"down") is recognized by the parser but rejected as unsupported so
//! the caller can produce a distinct error message.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One of the eight compass directions a character can travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    #[serde(rename = "N")]
    North,
    #[serde(rename = "S")]
    South,
    #[serde(rename = "E")]
    East,
    #[serde(rename = "W")]
    West,
    #[serde(rename = "NE")]
    NorthEast,
    #[serde(rename = "NW")]
    NorthWest,
    #[serde(rename = "SE")]
    SouthEast,
    #[serde(rename = "SW")]
    SouthWest,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DirectionParseError {
    /// Vertical travel is recognized but not part of the grid model.
    #[error("Vertical movement is not implemented")]
    Unsupported,
    #[error("Unknown direction: {0}")]
    Unknown(String),
}

impl Direction {
    pub const ALL: [Direction; 8] = [
        Direction::North,
        Direction::South,
        Direction::East,
        Direction::West,
        Direction::NorthEast,
        Direction::NorthWest,
        Direction::SouthEast,
        Direction::SouthWest,
    ];

    /// Unit vector on the room grid. North decreases y, east increases x.
    pub fn delta(self) -> (i32, i32) {
        match self {
            Direction::North => (0, -1),
            Direction::South => (0, 1),
            Direction::East => (1, 0),
            Direction::West => (-1, 0),
            Direction::NorthEast => (1, -1),
            Direction::NorthWest => (-1, -1),
            Direction::SouthEast => (1, 1),
            Direction::SouthWest => (-1, 1),
        }
    }

    pub fn opposite(self) -> Direction {
        match self {
            Direction::North => Direction::South,
            Direction::South => Direction::North,
            Direction::East => Direction::West,
            Direction::West => Direction::East,
            Direction::NorthEast => Direction::SouthWest,
            Direction::NorthWest => Direction::SouthEast,
            Direction::SouthEast => Direction::NorthWest,
            Direction::SouthWest => Direction::NorthEast,
        }
    }

    /// Short wire code ("N", "SW", ...).
    pub fn code(self) -> &'static str {
        match self {
            Direction::North => "N",
            Direction::South => "S",
            Direction::East => "E",
            Direction::West => "W",
            Direction::NorthEast => "NE",
            Direction::NorthWest => "NW",
            Direction::SouthEast => "SE",
            Direction::SouthWest => "SW",
        }
    }

    /// Prose form used in room broadcasts ("the northeast").
    pub fn readable(self) -> &'static str {
        match self {
            Direction::North => "the north",
            Direction::South => "the south",
            Direction::East => "the east",
            Direction::West => "the west",
            Direction::NorthEast => "the northeast",
            Direction::NorthWest => "the northwest",
            Direction::SouthEast => "the southeast",
            Direction::SouthWest => "the southwest",
        }
    }

    /// Direction from one grid coordinate to an adjacent one, if any.
    pub fn between(from: (i32, i32), to: (i32, i32)) -> Option<Direction> {
        let dx = to.0 - from.0;
        let dy = to.1 - from.1;
        Direction::ALL.iter().copied().find(|d| d.delta() == (dx, dy))
    }
}

impl FromStr for Direction {
    type Err = DirectionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "n" | "north" => Ok(Direction::North),
            "s" | "south" => Ok(Direction::South),
            "e" | "east" => Ok(Direction::East),
            "w" | "west" => Ok(Direction::West),
            "ne" | "northeast" => Ok(Direction::NorthEast),
            "nw" | "northwest" => Ok(Direction::NorthWest),
            "se" | "southeast" => Ok(Direction::SouthEast),
            "sw" | "southwest" => Ok(Direction::SouthWest),
            "u" | "up" | "d" | "down" => Err(DirectionParseError::Unsupported),
            other => Err(DirectionParseError::Unknown(other.to_string())),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_short_and_long_forms() {
        assert_eq!("N".parse::<Direction>().unwrap(), Direction::North);
        assert_eq!("southwest".parse::<Direction>().unwrap(), Direction::SouthWest);
        assert_eq!("Ne".parse::<Direction>().unwrap(), Direction::NorthEast);
    }

    #[test]
    fn vertical_travel_is_unsupported() {
        assert_eq!(
            "up".parse::<Direction>(),
            Err(DirectionParseError::Unsupported)
        );
        assert_eq!(
            "d".parse::<Direction>(),
            Err(DirectionParseError::Unsupported)
        );
    }

    #[test]
    fn unknown_direction_is_rejected() {
        assert!(matches!(
            "widdershins".parse::<Direction>(),
            Err(DirectionParseError::Unknown(_))
        ));
    }

    #[test]
    fn opposites_are_involutions() {
        for d in Direction::ALL {
            assert_eq!(d.opposite().opposite(), d);
            let (dx, dy) = d.delta();
            assert_eq!(d.opposite().delta(), (-dx, -dy));
        }
    }

    #[test]
    fn between_finds_adjacent_directions() {
        assert_eq!(Direction::between((2, 3), (3, 3)), Some(Direction::East));
        assert_eq!(Direction::between((2, 3), (1, 2)), Some(Direction::NorthWest));
        assert_eq!(Direction::between((2, 3), (4, 3)), None);
        assert_eq!(Direction::between((2, 3), (2, 3)), None);
    }
}
