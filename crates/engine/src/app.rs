//! Application state and composition.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, Notify};

use driftmere_domain::{CurrencyTable, PlacementId};

use crate::config::AppConfig;
use crate::infrastructure::ports::{
    AuthRepo, ClockPort, CurrencyRepo, HistoryRepo, ItemRepo, LoreRepo, MerchantRepo, MessageRepo,
    NpcRepo, PathRepo, PlayerRepo, RandomPort, WarehouseRepo, WorldRepo,
};
use crate::templates::TemplateCache;

/// Container for all repository ports.
pub struct Repositories {
    pub auth: Arc<dyn AuthRepo>,
    pub player: Arc<dyn PlayerRepo>,
    pub world: Arc<dyn WorldRepo>,
    pub npc: Arc<dyn NpcRepo>,
    pub lore: Arc<dyn LoreRepo>,
    pub item: Arc<dyn ItemRepo>,
    pub currency: Arc<dyn CurrencyRepo>,
    pub warehouse: Arc<dyn WarehouseRepo>,
    pub merchant: Arc<dyn MerchantRepo>,
    pub path: Arc<dyn PathRepo>,
    pub history: Arc<dyn HistoryRepo>,
    pub message: Arc<dyn MessageRepo>,
}

/// Main application state.
///
/// Holds the repository ports, the message template cache, and the shared
/// engine-side locks. Passed to WebSocket handlers via Axum state.
pub struct App {
    pub repos: Repositories,
    pub templates: TemplateCache,
    pub clock: Arc<dyn ClockPort>,
    pub random: Arc<dyn RandomPort>,
    pub config: AppConfig,
    /// Declarative currency table built from the item catalogue.
    pub currency_table: CurrencyTable,
    /// Per-placement guards serializing harvest state transitions.
    placement_locks: DashMap<PlacementId, Arc<Mutex<()>>>,
    /// Fired by an accepted restartServer command.
    pub shutdown: Notify,
}

impl App {
    pub async fn new(
        repos: Repositories,
        clock: Arc<dyn ClockPort>,
        random: Arc<dyn RandomPort>,
        config: AppConfig,
    ) -> App {
        let templates = TemplateCache::load(repos.message.clone()).await;
        let currency_table = match repos.item.all_items().await {
            Ok(items) => CurrencyTable::from_items(&items),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load item catalogue for currency table");
                CurrencyTable::default()
            }
        };
        App {
            repos,
            templates,
            clock,
            random,
            config,
            currency_table,
            placement_locks: DashMap::new(),
            shutdown: Notify::new(),
        }
    }

    /// The mutex guarding one placement's state transitions. The guard must
    /// span the read-check-write, never a broadcast.
    pub fn placement_lock(&self, placement_id: PlacementId) -> Arc<Mutex<()>> {
        self.placement_locks
            .entry(placement_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }
}
