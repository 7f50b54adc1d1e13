//! Volatile repository adapter.
//!
//! Implements the full repository contract over in-process maps. Used by
//! integration tests and by the engine's ephemeral mode; the durable
//! relational adapter is a separate collaborator that implements the same
//! ports.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use driftmere_domain::{
    ItemDefinition, ItemKind, LoreKeeper, Map, MapId, NpcId, NpcPlacement, NpcState, Path, PathId,
    PlacementId, Player, PlayerId, PlayerItem, Room, RoomId, RoomItem, ScriptableNpc,
};
use driftmere_shared::WidgetConfigData;

use super::ports::{
    AuthRepo, CurrencyRepo, HistoryRepo, ItemRepo, LoreRepo, MerchantItem, MerchantRepo,
    MessageRepo, NpcRepo, PathRepo, PlayerRepo, RepoError, StoredSession, WarehouseCapacity,
    WarehouseRepo, WorldRepo,
};
use crate::app::Repositories;

const DEFAULT_WAREHOUSE_CAPACITY: WarehouseCapacity = WarehouseCapacity {
    max_item_types: 16,
    max_quantity_per_type: 100,
};
const HISTORY_CAP: usize = 500;

#[derive(Default)]
struct Inner {
    sessions: HashMap<String, String>,
    players: HashMap<PlayerId, Player>,
    widget_configs: HashMap<PlayerId, WidgetConfigData>,
    maps: Vec<Map>,
    rooms: HashMap<RoomId, Room>,
    room_kind_colors: Vec<(String, String)>,
    npcs: HashMap<NpcId, ScriptableNpc>,
    placements: HashMap<PlacementId, NpcPlacement>,
    keepers: HashMap<RoomId, Vec<LoreKeeper>>,
    greetings: HashMap<(PlayerId, NpcId), ()>,
    awards: HashMap<(PlayerId, NpcId, String), DateTime<Utc>>,
    items: HashMap<String, ItemDefinition>,
    player_items: HashMap<(PlayerId, String), u32>,
    room_items: HashMap<(RoomId, String), u32>,
    bank: HashMap<(PlayerId, String), u32>,
    warehouses: HashMap<(PlayerId, String), HashMap<String, u32>>,
    warehouse_caps: HashMap<String, WarehouseCapacity>,
    merchants: HashMap<RoomId, Vec<MerchantItem>>,
    paths: HashMap<PathId, Path>,
    history: HashMap<PlayerId, Vec<String>>,
    messages: Vec<(String, String)>,
}

/// The whole world behind one mutex; no await ever holds the guard.
#[derive(Default)]
pub struct MemoryWorld {
    inner: Mutex<Inner>,
}

impl MemoryWorld {
    pub fn new() -> Arc<MemoryWorld> {
        Arc::new(MemoryWorld::default())
    }

    /// Wire one world into every repository port.
    pub fn repositories(world: &Arc<MemoryWorld>) -> Repositories {
        Repositories {
            auth: world.clone(),
            player: world.clone(),
            world: world.clone(),
            npc: world.clone(),
            lore: world.clone(),
            item: world.clone(),
            currency: world.clone(),
            warehouse: world.clone(),
            merchant: world.clone(),
            path: world.clone(),
            history: world.clone(),
            message: world.clone(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    // =========================================================================
    // Seeding
    // =========================================================================

    pub fn add_session(&self, token: &str, account: &str) {
        self.lock()
            .sessions
            .insert(token.to_string(), account.to_string());
    }

    pub fn add_map(&self, name: &str, width: i32, height: i32) -> MapId {
        let map = Map {
            id: MapId::new(),
            name: name.to_string(),
            width,
            height,
        };
        let id = map.id;
        self.lock().maps.push(map);
        id
    }

    pub fn add_room(&self, room: Room) -> RoomId {
        let id = room.id;
        self.lock().rooms.insert(id, room);
        id
    }

    pub fn add_room_kind_color(&self, kind: &str, color: &str) {
        self.lock()
            .room_kind_colors
            .push((kind.to_string(), color.to_string()));
    }

    pub fn add_player(&self, player: Player) -> PlayerId {
        let id = player.id;
        self.lock().players.insert(id, player);
        id
    }

    pub fn add_item_def(&self, def: ItemDefinition) {
        self.lock().items.insert(def.name.to_lowercase(), def);
    }

    pub fn give_player_item(&self, player_id: PlayerId, item_name: &str, quantity: u32) {
        *self
            .lock()
            .player_items
            .entry((player_id, item_name.to_string()))
            .or_insert(0) += quantity;
    }

    pub fn put_room_item(&self, room_id: RoomId, item_name: &str, quantity: u32) {
        *self
            .lock()
            .room_items
            .entry((room_id, item_name.to_string()))
            .or_insert(0) += quantity;
    }

    pub fn add_npc(&self, npc: ScriptableNpc) -> NpcId {
        let id = npc.id;
        self.lock().npcs.insert(id, npc);
        id
    }

    pub fn place_npc(&self, npc_id: NpcId, room_id: RoomId, slot: u32) -> PlacementId {
        let placement = NpcPlacement {
            id: PlacementId::new(),
            npc_id,
            room_id,
            slot,
            state: NpcState::default(),
        };
        let id = placement.id;
        self.lock().placements.insert(id, placement);
        id
    }

    pub fn add_keeper(&self, room_id: RoomId, keeper: LoreKeeper) {
        self.lock().keepers.entry(room_id).or_default().push(keeper);
    }

    pub fn add_merchant_item(&self, room_id: RoomId, item: MerchantItem) {
        self.lock().merchants.entry(room_id).or_default().push(item);
    }

    pub fn set_warehouse_capacity(&self, warehouse_key: &str, capacity: WarehouseCapacity) {
        self.lock()
            .warehouse_caps
            .insert(warehouse_key.to_string(), capacity);
    }

    pub fn set_bank_balance(&self, player_id: PlayerId, item_name: &str, quantity: u32) {
        self.lock()
            .bank
            .insert((player_id, item_name.to_string()), quantity);
    }

    pub fn add_game_message(&self, key: &str, template: &str) {
        self.lock()
            .messages
            .push((key.to_string(), template.to_string()));
    }

    // =========================================================================
    // Direct inspection (tests)
    // =========================================================================

    pub fn player_item_quantity(&self, player_id: PlayerId, item_name: &str) -> u32 {
        *self
            .lock()
            .player_items
            .get(&(player_id, item_name.to_string()))
            .unwrap_or(&0)
    }

    pub fn room_item_quantity(&self, room_id: RoomId, item_name: &str) -> u32 {
        *self
            .lock()
            .room_items
            .get(&(room_id, item_name.to_string()))
            .unwrap_or(&0)
    }

    pub fn placement(&self, placement_id: PlacementId) -> Option<NpcPlacement> {
        self.lock().placements.get(&placement_id).cloned()
    }

    pub fn set_placement_state(&self, placement_id: PlacementId, state: NpcState) {
        if let Some(placement) = self.lock().placements.get_mut(&placement_id) {
            placement.state = state;
        }
    }
}

// =============================================================================
// Port implementations
// =============================================================================

#[async_trait]
impl AuthRepo for MemoryWorld {
    async fn validate_session(&self, token: &str) -> Result<Option<StoredSession>, RepoError> {
        Ok(self
            .lock()
            .sessions
            .get(token)
            .map(|account| StoredSession {
                account: account.clone(),
            }))
    }
}

#[async_trait]
impl PlayerRepo for MemoryWorld {
    async fn get_by_name(&self, name: &str) -> Result<Option<Player>, RepoError> {
        Ok(self
            .lock()
            .players
            .values()
            .find(|p| p.name.eq_ignore_ascii_case(name))
            .cloned())
    }

    async fn get_by_id(&self, id: PlayerId) -> Result<Option<Player>, RepoError> {
        Ok(self.lock().players.get(&id).cloned())
    }

    async fn update_room(&self, id: PlayerId, room_id: RoomId) -> Result<(), RepoError> {
        let mut inner = self.lock();
        let player = inner.players.get_mut(&id).ok_or(RepoError::NotFound)?;
        player.room_id = room_id;
        Ok(())
    }

    async fn get_widget_config(&self, id: PlayerId) -> Result<WidgetConfigData, RepoError> {
        Ok(self
            .lock()
            .widget_configs
            .get(&id)
            .copied()
            .unwrap_or_default())
    }

    async fn set_widget_config(
        &self,
        id: PlayerId,
        config: WidgetConfigData,
    ) -> Result<(), RepoError> {
        self.lock().widget_configs.insert(id, config);
        Ok(())
    }

    async fn current_encumbrance(&self, id: PlayerId) -> Result<f64, RepoError> {
        let inner = self.lock();
        let total = inner
            .player_items
            .iter()
            .filter(|((player_id, _), qty)| *player_id == id && **qty > 0)
            .map(|((_, name), qty)| {
                let per_unit = inner
                    .items
                    .get(&name.to_lowercase())
                    .map_or(0.0, |def| def.encumbrance);
                per_unit * f64::from(*qty)
            })
            .sum();
        Ok(total)
    }

    async fn assign_attribute_point(
        &self,
        id: PlayerId,
        attribute: &str,
    ) -> Result<Player, RepoError> {
        let mut inner = self.lock();
        let player = inner.players.get_mut(&id).ok_or(RepoError::NotFound)?;
        if player.unspent_points <= 0 {
            return Err(RepoError::Database("no unspent points".to_string()));
        }
        if !player.stats.bump(attribute) {
            return Err(RepoError::Database(format!("unknown attribute {attribute}")));
        }
        player.unspent_points -= 1;
        Ok(player.clone())
    }

    async fn adjust_vitalis(&self, id: PlayerId, delta: i32) -> Result<(), RepoError> {
        let mut inner = self.lock();
        let player = inner.players.get_mut(&id).ok_or(RepoError::NotFound)?;
        player.vitalis = (player.vitalis + delta).max(0);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Player>, RepoError> {
        Ok(self.lock().players.values().cloned().collect())
    }
}

#[async_trait]
impl WorldRepo for MemoryWorld {
    async fn room_by_id(&self, id: RoomId) -> Result<Option<Room>, RepoError> {
        Ok(self.lock().rooms.get(&id).cloned())
    }

    async fn room_by_coords(
        &self,
        map_id: MapId,
        x: i32,
        y: i32,
    ) -> Result<Option<Room>, RepoError> {
        Ok(self
            .lock()
            .rooms
            .values()
            .find(|r| r.map_id == map_id && r.x == x && r.y == y)
            .cloned())
    }

    async fn rooms_by_map(&self, map_id: MapId) -> Result<Vec<Room>, RepoError> {
        Ok(self
            .lock()
            .rooms
            .values()
            .filter(|r| r.map_id == map_id)
            .cloned()
            .collect())
    }

    async fn map_by_id(&self, id: MapId) -> Result<Option<Map>, RepoError> {
        Ok(self.lock().maps.iter().find(|m| m.id == id).cloned())
    }

    async fn all_maps(&self) -> Result<Vec<Map>, RepoError> {
        Ok(self.lock().maps.clone())
    }

    async fn room_kind_colors(&self) -> Result<Vec<(String, String)>, RepoError> {
        Ok(self.lock().room_kind_colors.clone())
    }
}

#[async_trait]
impl NpcRepo for MemoryWorld {
    async fn scriptable_npc_by_id(&self, id: NpcId) -> Result<Option<ScriptableNpc>, RepoError> {
        Ok(self.lock().npcs.get(&id).cloned())
    }

    async fn placements_in_room(&self, room_id: RoomId) -> Result<Vec<NpcPlacement>, RepoError> {
        let mut placements: Vec<NpcPlacement> = self
            .lock()
            .placements
            .values()
            .filter(|p| p.room_id == room_id)
            .cloned()
            .collect();
        placements.sort_by_key(|p| p.slot);
        Ok(placements)
    }

    async fn placement_by_id(&self, id: PlacementId) -> Result<Option<NpcPlacement>, RepoError> {
        Ok(self.lock().placements.get(&id).cloned())
    }

    async fn update_npc_state(
        &self,
        placement_id: PlacementId,
        state: &NpcState,
    ) -> Result<(), RepoError> {
        let mut inner = self.lock();
        let placement = inner
            .placements
            .get_mut(&placement_id)
            .ok_or(RepoError::NotFound)?;
        placement.state = state.clone();
        Ok(())
    }

    async fn active_harvest_for_player(
        &self,
        player_id: PlayerId,
    ) -> Result<Option<NpcPlacement>, RepoError> {
        Ok(self
            .lock()
            .placements
            .values()
            .find(|p| {
                p.state.harvest_active && p.state.harvesting_player_id == Some(player_id)
            })
            .cloned())
    }

    async fn active_harvest_placements(&self) -> Result<Vec<NpcPlacement>, RepoError> {
        Ok(self
            .lock()
            .placements
            .values()
            .filter(|p| p.state.harvest_active)
            .cloned()
            .collect())
    }

    async fn lore_keepers_in_room(&self, room_id: RoomId) -> Result<Vec<LoreKeeper>, RepoError> {
        Ok(self.lock().keepers.get(&room_id).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl LoreRepo for MemoryWorld {
    async fn has_been_greeted(
        &self,
        player_id: PlayerId,
        npc_id: NpcId,
    ) -> Result<bool, RepoError> {
        Ok(self.lock().greetings.contains_key(&(player_id, npc_id)))
    }

    async fn mark_greeted(&self, player_id: PlayerId, npc_id: NpcId) -> Result<(), RepoError> {
        self.lock().greetings.insert((player_id, npc_id), ());
        Ok(())
    }

    async fn last_item_award_time(
        &self,
        player_id: PlayerId,
        npc_id: NpcId,
        item_name: &str,
    ) -> Result<Option<DateTime<Utc>>, RepoError> {
        Ok(self
            .lock()
            .awards
            .get(&(player_id, npc_id, item_name.to_string()))
            .copied())
    }

    async fn record_item_award(
        &self,
        player_id: PlayerId,
        npc_id: NpcId,
        item_name: &str,
        at: DateTime<Utc>,
    ) -> Result<(), RepoError> {
        self.lock()
            .awards
            .insert((player_id, npc_id, item_name.to_string()), at);
        Ok(())
    }
}

#[async_trait]
impl ItemRepo for MemoryWorld {
    async fn all_items(&self) -> Result<Vec<ItemDefinition>, RepoError> {
        Ok(self.lock().items.values().cloned().collect())
    }

    async fn item_by_name(&self, name: &str) -> Result<Option<ItemDefinition>, RepoError> {
        Ok(self.lock().items.get(&name.to_lowercase()).cloned())
    }

    async fn item_encumbrance(&self, name: &str) -> Result<f64, RepoError> {
        Ok(self
            .lock()
            .items
            .get(&name.to_lowercase())
            .map_or(0.0, |def| def.encumbrance))
    }

    async fn player_items(&self, player_id: PlayerId) -> Result<Vec<PlayerItem>, RepoError> {
        let mut items: Vec<PlayerItem> = self
            .lock()
            .player_items
            .iter()
            .filter(|((id, _), qty)| *id == player_id && **qty > 0)
            .map(|((_, name), qty)| PlayerItem {
                player_id,
                item_name: name.clone(),
                quantity: *qty,
            })
            .collect();
        items.sort_by(|a, b| a.item_name.cmp(&b.item_name));
        Ok(items)
    }

    async fn add_player_item(
        &self,
        player_id: PlayerId,
        item_name: &str,
        quantity: u32,
    ) -> Result<(), RepoError> {
        *self
            .lock()
            .player_items
            .entry((player_id, item_name.to_string()))
            .or_insert(0) += quantity;
        Ok(())
    }

    async fn remove_player_item(
        &self,
        player_id: PlayerId,
        item_name: &str,
        quantity: u32,
    ) -> Result<(), RepoError> {
        let mut inner = self.lock();
        let key = (player_id, item_name.to_string());
        let Some(held) = inner.player_items.get_mut(&key) else {
            return Err(RepoError::NotFound);
        };
        *held = held.saturating_sub(quantity);
        if *held == 0 {
            inner.player_items.remove(&key);
        }
        Ok(())
    }

    async fn room_items(&self, room_id: RoomId) -> Result<Vec<RoomItem>, RepoError> {
        let mut items: Vec<RoomItem> = self
            .lock()
            .room_items
            .iter()
            .filter(|((id, _), qty)| *id == room_id && **qty > 0)
            .map(|((_, name), qty)| RoomItem {
                room_id,
                item_name: name.clone(),
                quantity: *qty,
            })
            .collect();
        items.sort_by(|a, b| a.item_name.cmp(&b.item_name));
        Ok(items)
    }

    async fn add_room_item(
        &self,
        room_id: RoomId,
        item_name: &str,
        quantity: u32,
    ) -> Result<(), RepoError> {
        *self
            .lock()
            .room_items
            .entry((room_id, item_name.to_string()))
            .or_insert(0) += quantity;
        Ok(())
    }

    async fn remove_room_item(
        &self,
        room_id: RoomId,
        item_name: &str,
        quantity: u32,
    ) -> Result<(), RepoError> {
        let mut inner = self.lock();
        let key = (room_id, item_name.to_string());
        let Some(held) = inner.room_items.get_mut(&key) else {
            return Err(RepoError::NotFound);
        };
        *held = held.saturating_sub(quantity);
        if *held == 0 {
            inner.room_items.remove(&key);
        }
        Ok(())
    }

    async fn remove_poofable_items(&self, room_id: RoomId) -> Result<(), RepoError> {
        let mut inner = self.lock();
        let poofable: Vec<String> = inner
            .room_items
            .keys()
            .filter(|(id, _)| *id == room_id)
            .filter(|(_, name)| {
                inner
                    .items
                    .get(&name.to_lowercase())
                    .is_some_and(|def| def.poofable)
            })
            .map(|(_, name)| name.clone())
            .collect();
        for name in poofable {
            inner.room_items.remove(&(room_id, name));
        }
        Ok(())
    }
}

#[async_trait]
impl CurrencyRepo for MemoryWorld {
    async fn player_currency(&self, player_id: PlayerId) -> Result<Vec<(String, u32)>, RepoError> {
        let inner = self.lock();
        let mut wallet: Vec<(String, u32)> = inner
            .player_items
            .iter()
            .filter(|((id, name), qty)| {
                *id == player_id
                    && **qty > 0
                    && inner
                        .items
                        .get(&name.to_lowercase())
                        .is_some_and(|def| def.kind == ItemKind::Currency)
            })
            .map(|((_, name), qty)| (name.clone(), *qty))
            .collect();
        wallet.sort();
        Ok(wallet)
    }

    async fn add_player_currency(
        &self,
        player_id: PlayerId,
        item_name: &str,
        quantity: u32,
    ) -> Result<(), RepoError> {
        self.add_player_item(player_id, item_name, quantity).await
    }

    async fn remove_player_currency(
        &self,
        player_id: PlayerId,
        item_name: &str,
        quantity: u32,
    ) -> Result<(), RepoError> {
        self.remove_player_item(player_id, item_name, quantity).await
    }

    async fn bank_balance(&self, player_id: PlayerId) -> Result<Vec<(String, u32)>, RepoError> {
        let mut balance: Vec<(String, u32)> = self
            .lock()
            .bank
            .iter()
            .filter(|((id, _), qty)| *id == player_id && **qty > 0)
            .map(|((_, name), qty)| (name.clone(), *qty))
            .collect();
        balance.sort();
        Ok(balance)
    }

    async fn deposit_currency(
        &self,
        player_id: PlayerId,
        item_name: &str,
        quantity: u32,
    ) -> Result<(), RepoError> {
        self.remove_player_item(player_id, item_name, quantity).await?;
        *self
            .lock()
            .bank
            .entry((player_id, item_name.to_string()))
            .or_insert(0) += quantity;
        Ok(())
    }

    async fn withdraw_currency(
        &self,
        player_id: PlayerId,
        item_name: &str,
        quantity: u32,
    ) -> Result<(), RepoError> {
        {
            let mut inner = self.lock();
            let key = (player_id, item_name.to_string());
            let Some(held) = inner.bank.get_mut(&key) else {
                return Err(RepoError::NotFound);
            };
            if *held < quantity {
                return Err(RepoError::Database("insufficient funds".to_string()));
            }
            *held -= quantity;
            if *held == 0 {
                inner.bank.remove(&key);
            }
        }
        self.add_player_item(player_id, item_name, quantity).await
    }
}

#[async_trait]
impl WarehouseRepo for MemoryWorld {
    async fn player_deeds(&self, player_id: PlayerId) -> Result<Vec<String>, RepoError> {
        let inner = self.lock();
        let mut deeds: Vec<(String, String)> = inner
            .player_items
            .iter()
            .filter(|((id, _), qty)| *id == player_id && **qty > 0)
            .filter_map(|((_, name), _)| {
                let def = inner.items.get(&name.to_lowercase())?;
                let key = def.warehouse_key.clone()?;
                def.is_deed().then(|| (name.clone(), key))
            })
            .collect();
        deeds.sort();
        Ok(deeds.into_iter().map(|(_, key)| key).collect())
    }

    async fn has_deed(
        &self,
        player_id: PlayerId,
        warehouse_key: &str,
    ) -> Result<bool, RepoError> {
        Ok(self
            .player_deeds(player_id)
            .await?
            .iter()
            .any(|key| key == warehouse_key))
    }

    async fn initialize(
        &self,
        player_id: PlayerId,
        warehouse_key: &str,
    ) -> Result<(), RepoError> {
        self.lock()
            .warehouses
            .entry((player_id, warehouse_key.to_string()))
            .or_default();
        Ok(())
    }

    async fn capacity(
        &self,
        _player_id: PlayerId,
        warehouse_key: &str,
    ) -> Result<WarehouseCapacity, RepoError> {
        Ok(self
            .lock()
            .warehouse_caps
            .get(warehouse_key)
            .copied()
            .unwrap_or(DEFAULT_WAREHOUSE_CAPACITY))
    }

    async fn items(
        &self,
        player_id: PlayerId,
        warehouse_key: &str,
    ) -> Result<Vec<(String, u32)>, RepoError> {
        let inner = self.lock();
        let mut items: Vec<(String, u32)> = inner
            .warehouses
            .get(&(player_id, warehouse_key.to_string()))
            .map(|stored| {
                stored
                    .iter()
                    .filter(|(_, qty)| **qty > 0)
                    .map(|(name, qty)| (name.clone(), *qty))
                    .collect()
            })
            .unwrap_or_default();
        items.sort();
        Ok(items)
    }

    async fn add_item(
        &self,
        player_id: PlayerId,
        warehouse_key: &str,
        item_name: &str,
        quantity: u32,
    ) -> Result<(), RepoError> {
        let mut inner = self.lock();
        let stored = inner
            .warehouses
            .entry((player_id, warehouse_key.to_string()))
            .or_default();
        *stored.entry(item_name.to_string()).or_insert(0) += quantity;
        Ok(())
    }

    async fn remove_item(
        &self,
        player_id: PlayerId,
        warehouse_key: &str,
        item_name: &str,
        quantity: u32,
    ) -> Result<(), RepoError> {
        let mut inner = self.lock();
        let Some(stored) = inner
            .warehouses
            .get_mut(&(player_id, warehouse_key.to_string()))
        else {
            return Err(RepoError::NotFound);
        };
        let Some(held) = stored.get_mut(item_name) else {
            return Err(RepoError::NotFound);
        };
        *held = held.saturating_sub(quantity);
        if *held == 0 {
            stored.remove(item_name);
        }
        Ok(())
    }

    async fn item_type_count(
        &self,
        player_id: PlayerId,
        warehouse_key: &str,
    ) -> Result<u32, RepoError> {
        Ok(self
            .lock()
            .warehouses
            .get(&(player_id, warehouse_key.to_string()))
            .map_or(0, |stored| {
                stored.values().filter(|qty| **qty > 0).count() as u32
            }))
    }

    async fn item_quantity(
        &self,
        player_id: PlayerId,
        warehouse_key: &str,
        item_name: &str,
    ) -> Result<u32, RepoError> {
        Ok(self
            .lock()
            .warehouses
            .get(&(player_id, warehouse_key.to_string()))
            .and_then(|stored| stored.get(item_name).copied())
            .unwrap_or(0))
    }
}

#[async_trait]
impl MerchantRepo for MemoryWorld {
    async fn items_for_room(&self, room_id: RoomId) -> Result<Vec<MerchantItem>, RepoError> {
        Ok(self.lock().merchants.get(&room_id).cloned().unwrap_or_default())
    }

    async fn update_stock(
        &self,
        room_id: RoomId,
        item_name: &str,
        new_stock: u32,
    ) -> Result<(), RepoError> {
        let mut inner = self.lock();
        let Some(stock) = inner.merchants.get_mut(&room_id) else {
            return Err(RepoError::NotFound);
        };
        let Some(entry) = stock
            .iter_mut()
            .find(|i| i.item_name.eq_ignore_ascii_case(item_name))
        else {
            return Err(RepoError::NotFound);
        };
        if entry.stock.is_some() {
            entry.stock = Some(new_stock);
        }
        Ok(())
    }
}

#[async_trait]
impl PathRepo for MemoryWorld {
    async fn create_path(&self, path: &Path) -> Result<PathId, RepoError> {
        self.lock().paths.insert(path.id, path.clone());
        Ok(path.id)
    }

    async fn paths_by_player(&self, player_id: PlayerId) -> Result<Vec<Path>, RepoError> {
        let mut paths: Vec<Path> = self
            .lock()
            .paths
            .values()
            .filter(|p| p.player_id == player_id)
            .cloned()
            .collect();
        paths.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(paths)
    }

    async fn path_by_id(&self, id: PathId) -> Result<Option<Path>, RepoError> {
        Ok(self.lock().paths.get(&id).cloned())
    }
}

#[async_trait]
impl HistoryRepo for MemoryWorld {
    async fn terminal_history(
        &self,
        player_id: PlayerId,
        limit: usize,
    ) -> Result<Vec<String>, RepoError> {
        let inner = self.lock();
        let history = inner.history.get(&player_id).cloned().unwrap_or_default();
        let start = history.len().saturating_sub(limit);
        Ok(history[start..].to_vec())
    }

    async fn save_terminal_message(
        &self,
        player_id: PlayerId,
        message: &str,
    ) -> Result<(), RepoError> {
        let mut inner = self.lock();
        let history = inner.history.entry(player_id).or_default();
        history.push(message.to_string());
        if history.len() > HISTORY_CAP {
            let excess = history.len() - HISTORY_CAP;
            history.drain(..excess);
        }
        Ok(())
    }
}

#[async_trait]
impl MessageRepo for MemoryWorld {
    async fn all_game_messages(&self) -> Result<Vec<(String, String)>, RepoError> {
        Ok(self.lock().messages.clone())
    }
}
