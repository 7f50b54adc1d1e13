//! Volatile per-session state.
//!
//! Everything here dies with the connection; durable state lives behind the
//! repository ports.

use chrono::{DateTime, Utc};
use tokio::task::AbortHandle;

use driftmere_domain::{
    ConnectionId, Direction, MapId, NpcId, PathId, PathStep, PlayerId, RoomId,
};
use driftmere_shared::ItemStack;

use crate::pathfinder::NavStep;

/// An in-progress path recording.
#[derive(Debug, Clone)]
pub struct PathingState {
    pub origin_room_id: RoomId,
    pub steps: Vec<PathStep>,
}

/// An active glow-codex puzzle bound to one keeper.
#[derive(Debug, Clone)]
pub struct GlowCodexState {
    pub npc_id: NpcId,
}

/// Walking to a destination room, optionally carrying a path execution to
/// promote on arrival.
#[derive(Debug, Clone)]
pub struct AutoNavigation {
    pub destination_room_id: RoomId,
    pub steps: Vec<NavStep>,
    pub current: usize,
    pub pending_path: Option<PathId>,
}

impl AutoNavigation {
    pub fn expected_step(&self) -> Option<&NavStep> {
        self.steps.get(self.current)
    }
}

/// A running (or paused) execution of a saved path.
#[derive(Debug, Clone)]
pub struct PathExecution {
    pub path_id: PathId,
    pub steps: Vec<NavStep>,
    pub current_step: usize,
    pub is_looping: bool,
    pub is_paused: bool,
}

impl PathExecution {
    /// The direction the next move must take. Loop indexes wrap so the step
    /// counter never runs out of bounds.
    pub fn expected_direction(&self) -> Option<Direction> {
        if self.steps.is_empty() {
            return None;
        }
        let index = self.current_step % self.steps.len();
        self.steps.get(index).map(|s| s.direction)
    }
}

/// Clonable session data. Mutated only through the registry so writers
/// serialize per connection id.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub connection_id: ConnectionId,
    pub player_id: PlayerId,
    pub player_name: String,
    pub account: String,
    pub window_id: Option<String>,
    pub room_id: RoomId,
    pub map_id: MapId,
    /// Movement cooldown deadline from encumbrance gating.
    pub next_move_time: Option<DateTime<Utc>>,
    /// The two factory widget slots.
    pub factory_slots: [Option<ItemStack>; 2],
    pub glow_codex: Option<GlowCodexState>,
    pub pathing: Option<PathingState>,
    pub auto_navigation: Option<AutoNavigation>,
    pub path_execution: Option<PathExecution>,
}

impl SessionInfo {
    pub fn has_factory_contents(&self) -> bool {
        self.factory_slots.iter().any(Option::is_some)
    }
}

/// Timer handles owned by a session. Abort on cancel; a fired task must
/// re-validate the session before acting.
#[derive(Debug, Default)]
pub struct SessionTimers {
    pub engagement: Vec<AbortHandle>,
    pub clue_burst: Option<AbortHandle>,
    pub step: Option<AbortHandle>,
}

impl SessionTimers {
    pub fn cancel_engagements(&mut self) {
        for handle in self.engagement.drain(..) {
            handle.abort();
        }
        if let Some(handle) = self.clue_burst.take() {
            handle.abort();
        }
    }

    pub fn cancel_step(&mut self) {
        if let Some(handle) = self.step.take() {
            handle.abort();
        }
    }

    pub fn cancel_all(&mut self) {
        self.cancel_engagements();
        self.cancel_step();
    }
}

impl Drop for SessionTimers {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
