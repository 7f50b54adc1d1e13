//! Driftmere domain types.
//!
//! Entities, value objects, and invariants shared by the engine and the
//! wire protocol. No I/O lives here.

mod currency;
mod direction;
mod error;
mod ids;
mod item;
mod lorekeeper;
mod npc;
mod path;
mod player;
mod room;

pub use currency::{CurrencyMatch, CurrencyTable, Denomination};
pub use direction::{Direction, DirectionParseError};
pub use error::DomainError;
pub use ids::{ConnectionId, ItemId, MapId, NpcId, PathId, PlacementId, PlayerId, RoomId};
pub use item::{ItemDefinition, ItemKind, PlayerItem, RoomItem};
pub use lorekeeper::{
    verify_extraction_pattern, KeywordEntry, LoreKeeper, LoreKind, PuzzleConfig, PuzzleMode,
};
pub use npc::{NpcKind, NpcPlacement, NpcState, NpcStatus, RecipeLine, ScriptableNpc};
pub use path::{step_direction, Path, PathKind, PathStep};
pub use player::{Player, Stats};
pub use room::{Map, Portal, Room, RoomKind};
