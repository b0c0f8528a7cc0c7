//! In-memory reference implementations of the collaborator seams.
//!
//! Back the daemon's standalone mode and the integration tests. They honor
//! the same contracts the production backends must: CAS on
//! `balance_last_updated_at`, NX semantics, TTLs, and the ledger's unique
//! constraints.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use glacier_core::error::{ChainRpcError, Error};
use glacier_core::traits::{
    BalanceHistoryRow, ChainRpc, KvStore, MessageBus, MinerRow, TotalCoinsRow, TxLedger,
    Warehouse, WriteGuard,
};
use glacier_core::types::{AcceptedTransaction, Network, TransactionReceipt};
use glacier_core::user::User;

#[derive(Clone)]
struct ValueWithExpiry {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

/// In-memory [`KvStore`].
#[derive(Default)]
pub struct MemKv {
    users: Mutex<HashMap<i64, User>>,
    keys: Mutex<HashMap<String, ValueWithExpiry>>,
}

impl MemKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a user directly, bypassing the CAS guard.
    pub fn seed_user(&self, user: User) {
        self.users.lock().unwrap().insert(user.internal_id, user);
    }

    fn live_value(&self, key: &str) -> Option<ValueWithExpiry> {
        let mut keys = self.keys.lock().unwrap();
        match keys.get(key) {
            Some(entry) => match entry.expires_at {
                Some(expiry) if expiry <= Utc::now() => {
                    keys.remove(key);
                    None
                }
                _ => Some(entry.clone()),
            },
            None => None,
        }
    }
}

#[async_trait]
impl KvStore for MemKv {
    async fn get_user(&self, internal_id: i64) -> Result<Option<User>, Error> {
        Ok(self.users.lock().unwrap().get(&internal_id).cloned())
    }

    async fn save_user(&self, user: &User, guard: WriteGuard) -> Result<(), Error> {
        let mut users = self.users.lock().unwrap();
        if let WriteGuard::IfBalanceUpdatedAt(expected) = guard {
            let stored = users
                .get(&user.internal_id)
                .and_then(|u| u.balance_last_updated_at);
            if stored != expected {
                return Err(Error::RaceCondition);
            }
        }
        users.insert(user.internal_id, user.clone());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, Error> {
        Ok(self.live_value(key).map(|entry| entry.value))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), Error> {
        self.keys.lock().unwrap().insert(
            key.to_string(),
            ValueWithExpiry {
                value: value.to_string(),
                expires_at: ttl.map(|ttl| Utc::now() + ttl),
            },
        );
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<bool, Error> {
        if self.live_value(key).is_some() {
            return Ok(false);
        }
        self.set(key, value, ttl).await?;
        Ok(true)
    }

    async fn del(&self, key: &str) -> Result<(), Error> {
        self.keys.lock().unwrap().remove(key);
        Ok(())
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, Error> {
        Ok(self
            .live_value(key)
            .and_then(|entry| entry.expires_at)
            .map(|expiry| expiry - Utc::now()))
    }

    async fn incr(&self, key: &str) -> Result<i64, Error> {
        let mut keys = self.keys.lock().unwrap();
        let next = keys
            .get(key)
            .and_then(|entry| entry.value.parse::<i64>().ok())
            .unwrap_or(0)
            + 1;
        keys.insert(
            key.to_string(),
            ValueWithExpiry {
                value: next.to_string(),
                expires_at: None,
            },
        );
        Ok(next)
    }
}

/// In-memory [`TxLedger`] enforcing the unique constraints.
#[derive(Default)]
pub struct MemLedger {
    rows: Mutex<Vec<AcceptedTransaction>>,
}

impl MemLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> Vec<AcceptedTransaction> {
        self.rows.lock().unwrap().clone()
    }
}

#[async_trait]
impl TxLedger for MemLedger {
    async fn insert_accepted_transaction(&self, row: &AcceptedTransaction) -> Result<(), Error> {
        let mut rows = self.rows.lock().unwrap();
        let duplicate = rows.iter().any(|existing| {
            existing.tx_hash == row.tx_hash
                || (existing.tenant == row.tenant
                    && existing.user_id == row.user_id
                    && existing.mining_boost_level == row.mining_boost_level)
        });
        if duplicate {
            return Err(Error::Duplicate);
        }
        rows.push(row.clone());
        Ok(())
    }

    async fn delete_accepted_transaction(
        &self,
        user_id: &str,
        tx_hash: &str,
    ) -> Result<(), Error> {
        self.rows
            .lock()
            .unwrap()
            .retain(|row| !(row.user_id == user_id && row.tx_hash == tx_hash));
        Ok(())
    }
}

/// In-memory [`MessageBus`] capturing published messages.
#[derive(Default)]
pub struct MemBus {
    published: Mutex<Vec<(String, String, Vec<u8>)>>,
}

impl MemBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Vec<(String, String, Vec<u8>)> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageBus for MemBus {
    async fn publish(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<(), Error> {
        self.published
            .lock()
            .unwrap()
            .push((topic.to_string(), key.to_string(), payload));
        Ok(())
    }
}

/// In-memory [`Warehouse`] serving preloaded rows.
#[derive(Default)]
pub struct MemWarehouse {
    pub history: Mutex<Vec<BalanceHistoryRow>>,
    pub coins: Mutex<Vec<TotalCoinsRow>>,
    pub miners: Mutex<Vec<MinerRow>>,
    pub ranks: Mutex<HashMap<i64, u64>>,
}

impl MemWarehouse {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Warehouse for MemWarehouse {
    async fn balance_history(
        &self,
        _internal_id: i64,
        _dates: &[DateTime<Utc>],
    ) -> Result<Vec<BalanceHistoryRow>, Error> {
        Ok(self.history.lock().unwrap().clone())
    }

    async fn total_coins(&self, _dates: &[DateTime<Utc>]) -> Result<Vec<TotalCoinsRow>, Error> {
        Ok(self.coins.lock().unwrap().clone())
    }

    async fn top_miners(
        &self,
        keyword: &str,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<MinerRow>, Error> {
        let miners = self.miners.lock().unwrap();
        Ok(miners
            .iter()
            .filter(|miner| keyword.is_empty() || miner.username.contains(keyword))
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn global_rank(&self, internal_id: i64) -> Result<Option<u64>, Error> {
        Ok(self.ranks.lock().unwrap().get(&internal_id).copied())
    }
}

/// In-memory [`ChainRpc`] serving seeded receipts.
#[derive(Default)]
pub struct MemChainRpc {
    receipts: Mutex<HashMap<(Network, String), TransactionReceipt>>,
}

impl MemChainRpc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_receipt(&self, network: Network, receipt: TransactionReceipt) {
        self.receipts
            .lock()
            .unwrap()
            .insert((network, receipt.tx_hash.clone()), receipt);
    }
}

#[async_trait]
impl ChainRpc for MemChainRpc {
    async fn transaction_receipt(
        &self,
        network: Network,
        tx_hash: &str,
    ) -> Result<TransactionReceipt, ChainRpcError> {
        self.receipts
            .lock()
            .unwrap()
            .get(&(network, tx_hash.to_lowercase()))
            .cloned()
            .ok_or(ChainRpcError::NotFound)
    }
}
