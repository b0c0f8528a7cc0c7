//! Shared service state: collaborator handles and hot-swappable config boxes.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use glacier_core::config::{Config, MiningBoostLevel};
use glacier_core::traits::{ChainRpc, KvStore, MessageBus, TxLedger, Warehouse};

use crate::total_coins::CoinsAdded;

/// Everything the handlers and background tasks share.
///
/// The hot-swappable boxes (`levels`, `coins_added_history`) are replaced
/// wholesale by their syncer tasks; readers clone the `Arc` and never observe
/// a partially mutated slice.
pub struct ServiceState {
    pub cfg: Config,
    pub kv: Arc<dyn KvStore>,
    pub ledger: Arc<dyn TxLedger>,
    pub bus: Arc<dyn MessageBus>,
    pub dwh: Arc<dyn Warehouse>,
    pub chain: Arc<dyn ChainRpc>,
    extra_bonus_start_date: DateTime<Utc>,
    levels: RwLock<Arc<Vec<MiningBoostLevel>>>,
    coins_added_history: RwLock<Arc<Vec<CoinsAdded>>>,
}

impl ServiceState {
    pub fn new(
        cfg: Config,
        kv: Arc<dyn KvStore>,
        ledger: Arc<dyn TxLedger>,
        bus: Arc<dyn MessageBus>,
        dwh: Arc<dyn Warehouse>,
        chain: Arc<dyn ChainRpc>,
    ) -> Self {
        let extra_bonus_start_date = cfg.extra_bonuses.start_date.unwrap_or_else(Utc::now);
        Self {
            cfg,
            kv,
            ledger,
            bus,
            dwh,
            chain,
            extra_bonus_start_date,
            levels: RwLock::new(Arc::new(Vec::new())),
            coins_added_history: RwLock::new(Arc::new(Vec::new())),
        }
    }

    /// Current boost levels, sorted ascending by ICE price.
    pub fn levels(&self) -> Arc<Vec<MiningBoostLevel>> {
        self.levels.read().clone()
    }

    /// Replace the boost levels wholesale.
    pub fn set_levels(&self, levels: Vec<MiningBoostLevel>) {
        *self.levels.write() = Arc::new(levels);
    }

    pub fn coins_added_history(&self) -> Arc<Vec<CoinsAdded>> {
        self.coins_added_history.read().clone()
    }

    pub fn set_coins_added_history(&self, history: Vec<CoinsAdded>) {
        *self.coins_added_history.write() = Arc::new(history);
    }

    pub fn extra_bonus_start_date(&self) -> DateTime<Utc> {
        self.extra_bonus_start_date
    }
}
