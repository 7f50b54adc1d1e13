//! Session registry and broadcast fabric.
//!
//! Tracks authenticated connections, their volatile session state, and the
//! reverse room index used for room-scoped fan-out. A send to a closed or
//! full channel is a silent no-op; broadcasting must never fail a handler.

use std::collections::{HashMap, HashSet};

use dashmap::DashMap;
use tokio::sync::{mpsc, RwLock};

use driftmere_domain::{ConnectionId, MapId, PlayerId, RoomId};
use driftmere_shared::ServerMessage;

use super::session_state::{SessionInfo, SessionTimers};

/// Buffer size for per-connection message channel.
pub const CONNECTION_CHANNEL_BUFFER: usize = 256;

struct SessionEntry {
    info: SessionInfo,
    sender: mpsc::Sender<ServerMessage>,
    timers: SessionTimers,
}

/// Manages all authenticated sessions.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<ConnectionId, SessionEntry>>,
    /// Reverse index: room -> connections, so room fan-out is
    /// O(|occupants|) rather than O(|world|).
    room_index: DashMap<RoomId, HashSet<ConnectionId>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            room_index: DashMap::new(),
        }
    }

    /// Register a freshly authenticated session.
    pub async fn register(&self, info: SessionInfo, sender: mpsc::Sender<ServerMessage>) {
        let connection_id = info.connection_id;
        let room_id = info.room_id;
        let mut sessions = self.sessions.write().await;
        sessions.insert(
            connection_id,
            SessionEntry {
                info,
                sender,
                timers: SessionTimers::default(),
            },
        );
        drop(sessions);
        self.room_index
            .entry(room_id)
            .or_default()
            .insert(connection_id);
        tracing::debug!(connection_id = %connection_id, "Session registered");
    }

    /// Remove a session, aborting every timer it owns.
    pub async fn remove(&self, connection_id: ConnectionId) -> Option<SessionInfo> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions.remove(&connection_id)?;
        drop(sessions);
        self.unindex(entry.info.room_id, connection_id);
        // SessionTimers aborts its handles on drop.
        tracing::debug!(connection_id = %connection_id, "Session removed");
        Some(entry.info)
    }

    pub async fn get(&self, connection_id: ConnectionId) -> Option<SessionInfo> {
        let sessions = self.sessions.read().await;
        sessions.get(&connection_id).map(|e| e.info.clone())
    }

    /// Whether the connection's outbound channel is still open.
    pub async fn is_open(&self, connection_id: ConnectionId) -> bool {
        let sessions = self.sessions.read().await;
        sessions
            .get(&connection_id)
            .is_some_and(|e| !e.sender.is_closed())
    }

    /// The live session for a player, with its channel-open flag.
    pub async fn find_by_player(
        &self,
        player_id: PlayerId,
    ) -> Option<(SessionInfo, bool)> {
        let sessions = self.sessions.read().await;
        sessions
            .values()
            .find(|e| e.info.player_id == player_id)
            .map(|e| (e.info.clone(), !e.sender.is_closed()))
    }

    /// A clone of the session's sender, for deferred delivery (takeover
    /// forceClose after removal).
    pub async fn sender_of(
        &self,
        connection_id: ConnectionId,
    ) -> Option<mpsc::Sender<ServerMessage>> {
        let sessions = self.sessions.read().await;
        sessions.get(&connection_id).map(|e| e.sender.clone())
    }

    /// Mutate session fields under the registry write lock.
    pub async fn update<F>(&self, connection_id: ConnectionId, mutate: F) -> Option<SessionInfo>
    where
        F: FnOnce(&mut SessionInfo),
    {
        let mut sessions = self.sessions.write().await;
        let entry = sessions.get_mut(&connection_id)?;
        mutate(&mut entry.info);
        Some(entry.info.clone())
    }

    /// Move a session between rooms, keeping the reverse index consistent.
    pub async fn set_room(&self, connection_id: ConnectionId, room_id: RoomId, map_id: MapId) {
        let old_room = {
            let mut sessions = self.sessions.write().await;
            let Some(entry) = sessions.get_mut(&connection_id) else {
                return;
            };
            let old = entry.info.room_id;
            entry.info.room_id = room_id;
            entry.info.map_id = map_id;
            old
        };
        if old_room != room_id {
            self.unindex(old_room, connection_id);
            self.room_index
                .entry(room_id)
                .or_default()
                .insert(connection_id);
        }
    }

    /// Mutate the session's timer table.
    pub async fn with_timers<F>(&self, connection_id: ConnectionId, mutate: F)
    where
        F: FnOnce(&mut SessionTimers),
    {
        let mut sessions = self.sessions.write().await;
        if let Some(entry) = sessions.get_mut(&connection_id) {
            mutate(&mut entry.timers);
        }
    }

    /// Connections currently in a room.
    pub fn occupants(&self, room_id: RoomId) -> Vec<ConnectionId> {
        self.room_index
            .get(&room_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn occupant_count(&self, room_id: RoomId) -> usize {
        self.room_index.get(&room_id).map_or(0, |set| set.len())
    }

    /// Player names present in a room, excluding one connection.
    pub async fn player_names_in_room(
        &self,
        room_id: RoomId,
        except: Option<ConnectionId>,
    ) -> Vec<String> {
        let occupants = self.occupants(room_id);
        let sessions = self.sessions.read().await;
        let mut names: Vec<String> = occupants
            .iter()
            .filter(|id| Some(**id) != except)
            .filter_map(|id| sessions.get(id).map(|e| e.info.player_name.clone()))
            .collect();
        names.sort();
        names
    }

    /// All sessions, for `who` listings.
    pub async fn list(&self) -> Vec<SessionInfo> {
        let sessions = self.sessions.read().await;
        sessions.values().map(|e| e.info.clone()).collect()
    }

    // =========================================================================
    // Broadcast fabric
    // =========================================================================

    /// Send to a single connection. Closed channels are a silent no-op.
    pub async fn to_player(&self, connection_id: ConnectionId, message: ServerMessage) {
        let sessions = self.sessions.read().await;
        if let Some(entry) = sessions.get(&connection_id) {
            deliver(&entry.sender, connection_id, message);
        }
    }

    /// Send to every session whose current room matches.
    pub async fn to_room(
        &self,
        room_id: RoomId,
        message: ServerMessage,
        except: Option<ConnectionId>,
    ) {
        let occupants = self.occupants(room_id);
        if occupants.is_empty() {
            return;
        }
        let sessions = self.sessions.read().await;
        for connection_id in occupants {
            if Some(connection_id) == except {
                continue;
            }
            if let Some(entry) = sessions.get(&connection_id) {
                deliver(&entry.sender, connection_id, message.clone());
            }
        }
    }

    /// Send to every open session.
    pub async fn to_all(&self, message: ServerMessage, except: Option<ConnectionId>) {
        let sessions = self.sessions.read().await;
        for (connection_id, entry) in sessions.iter() {
            if Some(*connection_id) == except {
                continue;
            }
            deliver(&entry.sender, *connection_id, message.clone());
        }
    }

    fn unindex(&self, room_id: RoomId, connection_id: ConnectionId) {
        if let Some(mut set) = self.room_index.get_mut(&room_id) {
            set.remove(&connection_id);
        }
        self.room_index
            .remove_if(&room_id, |_, set| set.is_empty());
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn deliver(
    sender: &mpsc::Sender<ServerMessage>,
    connection_id: ConnectionId,
    message: ServerMessage,
) {
    if let Err(e) = sender.try_send(message) {
        tracing::warn!(
            connection_id = %connection_id,
            error = %e,
            "Dropped message to slow or closed channel"
        );
    }
}
