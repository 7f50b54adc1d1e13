//! Player characters.

use serde::{Deserialize, Serialize};

use crate::{PlayerId, RoomId};

/// The six trained attributes of a character.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Stats {
    pub resonance: i32,
    pub fortitude: i32,
    pub vigor: i32,
    pub finesse: i32,
    pub insight: i32,
    pub presence: i32,
}

impl Stats {
    /// Look up a stat by its lowercase name. Used by attribute assignment.
    pub fn get(&self, name: &str) -> Option<i32> {
        match name {
            "resonance" => Some(self.resonance),
            "fortitude" => Some(self.fortitude),
            "vigor" => Some(self.vigor),
            "finesse" => Some(self.finesse),
            "insight" => Some(self.insight),
            "presence" => Some(self.presence),
            _ => None,
        }
    }

    pub fn bump(&mut self, name: &str) -> bool {
        match name {
            "resonance" => self.resonance += 1,
            "fortitude" => self.fortitude += 1,
            "vigor" => self.vigor += 1,
            "finesse" => self.finesse += 1,
            "insight" => self.insight += 1,
            "presence" => self.presence += 1,
            _ => return false,
        }
        true
    }
}

/// A player character. Authentication happens outside the engine; within it
/// a player is addressed only by id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub room_id: RoomId,
    pub stats: Stats,
    /// Energy pool drained by harvesting.
    pub vitalis: i32,
    pub unspent_points: i32,
    /// Total encumbrance the character can carry.
    pub encumbrance_capacity: f64,
    pub god_mode: bool,
    /// When set, the character is returned to the starting room on connect.
    pub always_first_time: bool,
}

impl Player {
    /// Encumbrance as a percentage of capacity. A zero capacity counts as
    /// fully encumbered.
    pub fn encumbrance_percent(&self, current: f64) -> f64 {
        if self.encumbrance_capacity <= 0.0 {
            return 100.0;
        }
        current / self.encumbrance_capacity * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encumbrance_percent_handles_zero_capacity() {
        let player = Player {
            id: PlayerId::new(),
            name: "Tess".to_string(),
            room_id: RoomId::new(),
            stats: Stats::default(),
            vitalis: 100,
            unspent_points: 0,
            encumbrance_capacity: 0.0,
            god_mode: false,
            always_first_time: false,
        };
        assert_eq!(player.encumbrance_percent(0.0), 100.0);
    }

    #[test]
    fn stat_bump_rejects_unknown_names() {
        let mut stats = Stats::default();
        assert!(stats.bump("fortitude"));
        assert_eq!(stats.fortitude, 1);
        assert!(!stats.bump("charisma"));
    }
}
