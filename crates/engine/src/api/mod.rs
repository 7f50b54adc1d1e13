//! API layer: connection registry, frame builders, and WebSocket handlers.

pub mod connections;
pub mod frames;
pub mod scheduler;
pub mod session_state;
pub mod websocket;
