//! Scriptable NPC definitions and per-placement state.

use serde::{Deserialize, Serialize};

use crate::{NpcId, PlacementId, PlayerId, RoomId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NpcKind {
    Rhythm,
    Stability,
    Worker,
    Tending,
    Rotation,
    Economic,
    Farm,
    Patrol,
    Threshold,
    Lorekeeper,
}

/// One line of an input or output recipe: item name plus quantity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipeLine {
    pub item_name: String,
    pub quantity: u32,
}

/// An NPC definition as authored by the editor tools. The engine only
/// reads these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptableNpc {
    pub id: NpcId,
    pub name: String,
    pub kind: NpcKind,
    pub base_cycle_time_ms: i64,
    pub difficulty: i32,
    pub input_items: Vec<RecipeLine>,
    pub output_items: Vec<RecipeLine>,
    /// How long a harvest runs before the cycle tick completes it.
    pub harvestable_time_ms: i64,
    /// How long the placement rests after a harvest ends or is interrupted.
    pub cooldown_time_ms: i64,
    /// Item the player must carry to start a harvest, if any.
    pub harvest_prerequisite_item: Option<String>,
    /// Rejection prose when the prerequisite is missing.
    pub prerequisite_message: Option<String>,
    /// Chance in [0, 1] that a completed harvest yields the output recipe.
    pub hit_rate: f64,
    /// Tuning factor for the fortitude bonus curve.
    pub cycle_reduction: f64,
    pub fortitude_bonus_enabled: bool,
    pub hit_vitalis: i32,
    pub miss_vitalis: i32,
}

impl ScriptableNpc {
    pub fn is_harvestable(&self) -> bool {
        self.kind == NpcKind::Rhythm
    }

    /// Effective harvestable window for a harvester with the given
    /// fortitude. The bonus grows linearly with fortitude, capped at twice
    /// the base window.
    pub fn effective_harvestable_time(&self, fortitude: i32) -> i64 {
        if !self.fortitude_bonus_enabled || fortitude <= 0 {
            return self.harvestable_time_ms;
        }
        let base = self.harvestable_time_ms as f64;
        let bonus = base * fortitude as f64 * self.cycle_reduction / 100.0;
        (base + bonus).min(base * 2.0) as i64
    }
}

/// Typed form of the opaque JSON state stored on a room-NPC placement.
///
/// Legacy placements may carry an empty or partial blob; every field
/// defaults, and an undecodable value decodes as the all-default state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NpcState {
    #[serde(default)]
    pub cycles: u64,
    #[serde(default)]
    pub harvest_active: bool,
    #[serde(default)]
    pub harvesting_player_id: Option<PlayerId>,
    /// Epoch milliseconds.
    #[serde(default)]
    pub harvest_start_time: Option<i64>,
    /// Epoch milliseconds.
    #[serde(default)]
    pub cooldown_until: Option<i64>,
    #[serde(default)]
    pub effective_harvestable_time: Option<i64>,
    #[serde(default)]
    pub harvesting_player_resonance: Option<i32>,
    #[serde(default)]
    pub harvesting_player_fortitude: Option<i32>,
}

impl NpcState {
    /// Decode from the stored JSON value, defaulting wholesale on failure.
    pub fn from_value(value: &serde_json::Value) -> NpcState {
        serde_json::from_value(value.clone()).unwrap_or_default()
    }

    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    pub fn in_cooldown(&self, now_ms: i64) -> bool {
        self.cooldown_until.is_some_and(|until| until > now_ms)
    }

    /// Start a harvest, recording the harvester's identity and cached stats.
    pub fn begin_harvest(
        &mut self,
        player_id: PlayerId,
        now_ms: i64,
        effective_time_ms: i64,
        resonance: i32,
        fortitude: i32,
    ) {
        self.harvest_active = true;
        self.harvesting_player_id = Some(player_id);
        self.harvest_start_time = Some(now_ms);
        self.cooldown_until = None;
        self.effective_harvestable_time = Some(effective_time_ms);
        self.harvesting_player_resonance = Some(resonance);
        self.harvesting_player_fortitude = Some(fortitude);
    }

    /// End a harvest (completion or interruption) and arm the cooldown.
    /// Interrupting an already-idle placement leaves the state unchanged.
    pub fn end_harvest(&mut self, now_ms: i64, cooldown_ms: i64) {
        if !self.harvest_active {
            return;
        }
        self.harvest_active = false;
        self.harvesting_player_id = None;
        self.harvest_start_time = None;
        self.effective_harvestable_time = None;
        self.harvesting_player_resonance = None;
        self.harvesting_player_fortitude = None;
        self.cooldown_until = Some(now_ms + cooldown_ms);
    }

    /// Whether the running harvest has used up its window.
    pub fn harvest_elapsed(&self, now_ms: i64) -> bool {
        match (self.harvest_start_time, self.effective_harvestable_time) {
            (Some(start), Some(window)) => self.harvest_active && start + window <= now_ms,
            _ => false,
        }
    }
}

/// An NPC standing in a room.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NpcPlacement {
    pub id: PlacementId,
    pub npc_id: NpcId,
    pub room_id: RoomId,
    pub slot: u32,
    pub state: NpcState,
}

/// Status label shown next to an NPC in the room frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NpcStatus {
    Idle,
    Ready,
    Harvesting,
    Cooldown,
}

impl NpcStatus {
    /// Chosen by inspecting the placement state against the definition.
    pub fn of(npc: &ScriptableNpc, state: &NpcState, now_ms: i64) -> NpcStatus {
        if state.harvest_active {
            NpcStatus::Harvesting
        } else if state.in_cooldown(now_ms) {
            NpcStatus::Cooldown
        } else if npc.is_harvestable() {
            NpcStatus::Ready
        } else {
            NpcStatus::Idle
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            NpcStatus::Idle => "idle",
            NpcStatus::Ready => "ready",
            NpcStatus::Harvesting => "harvesting",
            NpcStatus::Cooldown => "cooldown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rhythm_npc() -> ScriptableNpc {
        ScriptableNpc {
            id: NpcId::new(),
            name: "Hollow Chimes".to_string(),
            kind: NpcKind::Rhythm,
            base_cycle_time_ms: 10_000,
            difficulty: 1,
            input_items: vec![],
            output_items: vec![RecipeLine {
                item_name: "Resin".to_string(),
                quantity: 1,
            }],
            harvestable_time_ms: 60_000,
            cooldown_time_ms: 120_000,
            harvest_prerequisite_item: None,
            prerequisite_message: None,
            hit_rate: 1.0,
            cycle_reduction: 0.5,
            fortitude_bonus_enabled: true,
            hit_vitalis: 0,
            miss_vitalis: 0,
        }
    }

    #[test]
    fn legacy_empty_state_decodes_as_default() {
        assert_eq!(NpcState::from_value(&json!({})), NpcState::default());
        assert_eq!(NpcState::from_value(&json!(null)), NpcState::default());
        assert_eq!(NpcState::from_value(&json!("garbage")), NpcState::default());
    }

    #[test]
    fn partial_state_fills_missing_fields() {
        let state = NpcState::from_value(&json!({"cycles": 7, "harvest_active": true}));
        assert_eq!(state.cycles, 7);
        assert!(state.harvest_active);
        assert_eq!(state.harvest_start_time, None);
    }

    #[test]
    fn begin_and_end_harvest_round_trip() {
        let player = PlayerId::new();
        let mut state = NpcState::default();
        state.begin_harvest(player, 1_000, 60_000, 5, 3);
        assert!(state.harvest_active);
        assert_eq!(state.harvesting_player_id, Some(player));
        assert_eq!(state.cooldown_until, None);

        state.end_harvest(61_000, 120_000);
        assert!(!state.harvest_active);
        assert_eq!(state.harvesting_player_id, None);
        assert_eq!(state.cooldown_until, Some(181_000));
    }

    #[test]
    fn ending_an_idle_harvest_is_a_no_op() {
        let mut state = NpcState::default();
        state.end_harvest(5_000, 120_000);
        assert_eq!(state, NpcState::default());
    }

    #[test]
    fn harvest_elapsed_respects_window() {
        let mut state = NpcState::default();
        state.begin_harvest(PlayerId::new(), 0, 60_000, 0, 0);
        assert!(!state.harvest_elapsed(59_999));
        assert!(state.harvest_elapsed(60_000));
    }

    #[test]
    fn fortitude_bonus_is_capped_at_double() {
        let npc = rhythm_npc();
        assert_eq!(npc.effective_harvestable_time(0), 60_000);
        // 60000 + 60000 * 10 * 0.5 / 100 = 63000
        assert_eq!(npc.effective_harvestable_time(10), 63_000);
        // Unbounded would exceed 2x; capped.
        assert_eq!(npc.effective_harvestable_time(100_000), 120_000);
    }

    #[test]
    fn status_labels_follow_placement_state() {
        let npc = rhythm_npc();
        let mut state = NpcState::default();
        assert_eq!(NpcStatus::of(&npc, &state, 0), NpcStatus::Ready);

        state.begin_harvest(PlayerId::new(), 0, 60_000, 0, 0);
        assert_eq!(NpcStatus::of(&npc, &state, 10), NpcStatus::Harvesting);

        state.end_harvest(60_000, 120_000);
        assert_eq!(NpcStatus::of(&npc, &state, 61_000), NpcStatus::Cooldown);
        assert_eq!(NpcStatus::of(&npc, &state, 200_000), NpcStatus::Ready);

        let mut keeper = rhythm_npc();
        keeper.kind = NpcKind::Lorekeeper;
        assert_eq!(NpcStatus::of(&keeper, &NpcState::default(), 0), NpcStatus::Idle);
    }
}
