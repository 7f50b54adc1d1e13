//! Test world seeding.
//!
//! Builds a small village on the in-memory repository: a 3x3 grid with a
//! town square at (1, 1), the item catalogue the tests rely on, and helpers
//! for wiring players and sessions.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;

use driftmere_domain::{
    ConnectionId, ItemDefinition, ItemId, ItemKind, MapId, Player, PlayerId, Room, RoomId,
    RoomKind, Stats,
};
use driftmere_shared::{ClientMessage, ServerMessage};

use crate::api::connections::SessionRegistry;
use crate::api::session_state::SessionInfo;
use crate::api::websocket::{handle_message, WsState};
use crate::app::App;
use crate::config::AppConfig;
use crate::infrastructure::clock::{SystemClock, SystemRandom};
use crate::infrastructure::memory::MemoryWorld;
use crate::infrastructure::ports::{ClockPort, RandomPort};

pub(crate) struct Fixture {
    pub world: Arc<MemoryWorld>,
    pub state: WsState,
    pub map_id: MapId,
    grid: HashMap<(i32, i32), Room>,
}

impl Fixture {
    pub async fn new() -> Fixture {
        Fixture::with_ports(Arc::new(SystemClock::new()), Arc::new(SystemRandom::new())).await
    }

    pub async fn with_ports(
        clock: Arc<dyn ClockPort>,
        random: Arc<dyn RandomPort>,
    ) -> Fixture {
        let world = MemoryWorld::new();
        seed_catalogue(&world);

        let map_id = world.add_map("Hearthmere", 3, 3);
        let mut grid = HashMap::new();
        for x in 0..3 {
            for y in 0..3 {
                let room = Room {
                    id: RoomId::new(),
                    map_id,
                    x,
                    y,
                    name: if (x, y) == (1, 1) {
                        "Town Square".to_string()
                    } else {
                        format!("Lane {x},{y}")
                    },
                    description: "Packed earth and low fences.".to_string(),
                    kind: RoomKind::Normal,
                    portal: None,
                };
                world.add_room(room.clone());
                grid.insert((x, y), room);
            }
        }
        world.add_room_kind_color("normal", "#888888");
        world.add_room_kind_color("bank", "#caa84a");

        let app = Arc::new(
            App::new(
                MemoryWorld::repositories(&world),
                clock,
                random,
                AppConfig::for_tests(),
            )
            .await,
        );
        let state = WsState {
            app,
            registry: Arc::new(SessionRegistry::new()),
        };
        Fixture {
            world,
            state,
            map_id,
            grid,
        }
    }

    pub fn room_at(&self, x: i32, y: i32) -> &Room {
        self.grid.get(&(x, y)).expect("room in seeded grid")
    }

    /// Change a grid room's kind (bank, merchant, warehouse...).
    pub fn make_room_kind(&mut self, x: i32, y: i32, kind: RoomKind) -> Room {
        let mut room = self.grid.get(&(x, y)).expect("room in seeded grid").clone();
        room.kind = kind;
        self.world.add_room(room.clone());
        self.grid.insert((x, y), room.clone());
        room
    }

    /// Add a player standing at (x, y), with a session token "<name>-token".
    pub fn spawn_player(&self, name: &str, x: i32, y: i32) -> Player {
        let player = Player {
            id: PlayerId::new(),
            name: name.to_string(),
            room_id: self.room_at(x, y).id,
            stats: Stats {
                resonance: 4,
                fortitude: 2,
                vigor: 3,
                finesse: 3,
                insight: 3,
                presence: 2,
            },
            vitalis: 100,
            unspent_points: 1,
            encumbrance_capacity: 100.0,
            god_mode: false,
            always_first_time: false,
        };
        self.world.add_player(player.clone());
        self.world
            .add_session(&format!("{}-token", name.to_lowercase()), name);
        player
    }

    /// Register a session directly, skipping the authenticate bootstrap.
    pub async fn connect(&self, player: &Player) -> (ConnectionId, mpsc::Receiver<ServerMessage>) {
        let connection_id = ConnectionId::new();
        let (tx, rx) = mpsc::channel(64);
        let room = self
            .grid
            .values()
            .find(|r| r.id == player.room_id)
            .expect("player room in grid");
        let info = SessionInfo {
            connection_id,
            player_id: player.id,
            player_name: player.name.clone(),
            account: player.name.clone(),
            window_id: None,
            room_id: room.id,
            map_id: room.map_id,
            next_move_time: None,
            factory_slots: [None, None],
            glow_codex: None,
            pathing: None,
            auto_navigation: None,
            path_execution: None,
        };
        self.state.registry.register(info, tx).await;
        (connection_id, rx)
    }

    /// Authenticate through the dispatcher, exercising the full §connect
    /// bootstrap (and takeover when a session already exists).
    pub async fn authenticate(
        &self,
        player_name: &str,
        window_id: Option<&str>,
    ) -> (ConnectionId, mpsc::Receiver<ServerMessage>) {
        let connection_id = ConnectionId::new();
        let (tx, mut rx) = mpsc::channel(64);
        let response = handle_message(
            ClientMessage::AuthenticateSession {
                session_token: format!("{}-token", player_name.to_lowercase()),
                player_name: player_name.to_string(),
                window_id: window_id.map(str::to_string),
            },
            &self.state,
            connection_id,
            &tx,
        )
        .await;
        // Authentication only replies directly on failure.
        if let Some(reply) = response {
            panic!("authentication failed: {reply:?}");
        }
        (connection_id, rx)
    }

    /// Dispatch a frame as the given connection and return the direct reply.
    pub async fn dispatch(
        &self,
        connection_id: ConnectionId,
        msg: ClientMessage,
    ) -> Option<ServerMessage> {
        let (tx, _rx) = mpsc::channel(64);
        handle_message(msg, &self.state, connection_id, &tx).await
    }
}

fn seed_catalogue(world: &Arc<MemoryWorld>) {
    let defs: [(&str, ItemKind, f64, bool, Option<&str>, Option<i64>); 7] = [
        ("Glimmer Crown", ItemKind::Currency, 0.01, false, None, Some(100)),
        ("Glimmer Shard", ItemKind::Currency, 0.01, false, None, Some(1)),
        ("Stone", ItemKind::Sundries, 10.0, false, None, None),
        ("Moss Resin", ItemKind::Ingredient, 0.5, false, None, None),
        ("Tuning Fork", ItemKind::Sundries, 1.0, false, None, None),
        ("Ember Dust", ItemKind::Ingredient, 0.2, true, None, None),
        ("Silver Sigil", ItemKind::Rune, 0.1, false, None, None),
    ];
    for (name, kind, encumbrance, poofable, warehouse_key, currency_value) in defs {
        world.add_item_def(ItemDefinition {
            id: ItemId::new(),
            name: name.to_string(),
            kind,
            encumbrance,
            poofable,
            warehouse_key: warehouse_key.map(str::to_string),
            currency_value,
        });
    }
}

/// Drain everything currently queued on a receiver.
pub(crate) fn drain(rx: &mut mpsc::Receiver<ServerMessage>) -> Vec<ServerMessage> {
    let mut out = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        out.push(msg);
    }
    out
}
