//! Trait interfaces to the external collaborators.
//!
//! These traits define the contracts between the service and its backing
//! systems, all of which are out of scope for this repository:
//! - [`KvStore`] — the per-user state store and ephemeral keys
//! - [`TxLedger`] — the relational global ledger of accepted burn transactions
//! - [`MessageBus`] — the append-only broker the consumers drain
//! - [`Warehouse`] — the analytical store powering history and leaderboards
//! - [`ChainRpc`] — the Ethereum-family RPC driver

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ChainRpcError, Error};
use crate::types::{AcceptedTransaction, Network, Timestamp, TransactionReceipt};
use crate::user::User;

/// Concurrency guard for a user write.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteGuard {
    /// Write unconditionally.
    Unconditional,
    /// Compare-and-set: the stored `balance_last_updated_at` must still equal
    /// the given value, otherwise the write fails with [`Error::RaceCondition`].
    IfBalanceUpdatedAt(Timestamp),
}

/// The Redis-like key/value store holding per-user hashes and ephemeral keys.
///
/// Mutators never read-modify-write outside the store's own atomic
/// primitives; the CAS discipline on `balance_last_updated_at` is the
/// single-writer-per-user lock.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get_user(&self, internal_id: i64) -> Result<Option<User>, Error>;

    /// Persist a user record under the given guard.
    async fn save_user(&self, user: &User, guard: WriteGuard) -> Result<(), Error>;

    async fn get(&self, key: &str) -> Result<Option<String>, Error>;

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), Error>;

    /// SET-if-not-exists. Returns whether the key was set.
    async fn set_nx(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<bool, Error>;

    async fn del(&self, key: &str) -> Result<(), Error>;

    /// Remaining TTL of a key, `None` when the key has no expiry or is absent.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, Error>;

    /// Atomically increment a counter key, returning the new value.
    async fn incr(&self, key: &str) -> Result<i64, Error>;

    /// Read a counter key, 0 when absent.
    async fn get_counter(&self, key: &str) -> Result<u64, Error> {
        match self.get(key).await? {
            Some(raw) => raw
                .parse()
                .map_err(|_| Error::Storage(format!("non-numeric counter at {key}"))),
            None => Ok(0),
        }
    }
}

/// The relational store owning the accepted-transactions ledger.
///
/// Unique constraints on `(tx_hash)` and `(tenant, user_id, level)` are the
/// source of truth for "this tx was spent".
#[async_trait]
pub trait TxLedger: Send + Sync {
    /// Insert a row; a unique-constraint violation maps to [`Error::Duplicate`].
    async fn insert_accepted_transaction(&self, row: &AcceptedTransaction) -> Result<(), Error>;

    /// Compensating delete used to roll back a failed finalize.
    async fn delete_accepted_transaction(&self, user_id: &str, tx_hash: &str)
        -> Result<(), Error>;
}

/// The append-only message broker.
#[async_trait]
pub trait MessageBus: Send + Sync {
    async fn publish(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<(), Error>;
}

/// One child-bucketed balance-history row from the warehouse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceHistoryRow {
    pub created_at: DateTime<Utc>,
    pub balance_total_minted: f64,
    pub balance_total_slashed: f64,
}

/// One daily total-coins row from the warehouse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TotalCoinsRow {
    pub created_at: DateTime<Utc>,
    pub total: f64,
    pub blockchain: f64,
    pub standard: f64,
    pub pre_staking: f64,
}

/// One leaderboard row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinerRow {
    pub user_id: String,
    pub username: String,
    pub profile_picture_url: String,
    pub balance: f64,
}

/// The data-warehouse client powering history reshaping and leaderboards.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Contiguous child-bucketed history for a user over the given dates.
    async fn balance_history(
        &self,
        internal_id: i64,
        dates: &[DateTime<Utc>],
    ) -> Result<Vec<BalanceHistoryRow>, Error>;

    /// Global total-coins rows for the given dates; absent days are omitted.
    async fn total_coins(&self, dates: &[DateTime<Utc>]) -> Result<Vec<TotalCoinsRow>, Error>;

    async fn top_miners(
        &self,
        keyword: &str,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<MinerRow>, Error>;

    async fn global_rank(&self, internal_id: i64) -> Result<Option<u64>, Error>;
}

/// The Ethereum-family RPC driver.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    async fn transaction_receipt(
        &self,
        network: Network,
        tx_hash: &str,
    ) -> Result<TransactionReceipt, ChainRpcError>;
}
