//! Driftmere wire protocol.
//!
//! Message types exchanged over the WebSocket connection. The engine sends
//! `ServerMessage` and receives `ClientMessage`; clients do the reverse.

mod messages;
mod types;

pub use messages::{ClientMessage, ServerMessage};
pub use types::{
    AutoPathStep, FactoryWidgetData, ItemStack, MapRoomData, MapSummary, MerchantEntry, NpcInRoom,
    PathDetails, PathStepData, PathSummary, PlayerStatsData, RoomFrame, RoomKindColor,
    WarehouseWidgetData, WidgetConfigData,
};
