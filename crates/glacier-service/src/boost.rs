//! The two-phase mining-boost upgrade protocol.
//!
//! Phase 1 quotes an upgrade price and parks it under a TTL'd pending key.
//! Phase 2 interprets the on-chain ERC-20 burn, records the tx in the global
//! unique ledger, and mutates the user's tier. The ledger insert
//! happens-before the user mutation; a failed mutation triggers a
//! compensating delete so the tx can be retried.

use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use glacier_core::config::{MiningBoostConfig, MiningBoostLevel};
use glacier_core::constants::{ICE_FLAKES_DENOMINATION, MINING_BOOST_PRICE_PRECISION};
use glacier_core::error::Error;
use glacier_core::traits::WriteGuard;
use glacier_core::types::{
    AcceptedTransaction, Network, TransactionReceipt, ERC20_TRANSFER_TOPIC,
};

use crate::keys::{mining_boost_finalize_mutex_key, mining_boost_upgrade_key};
use crate::state::ServiceState;

/// TTL of the finalize mutex; generously above one finalize round-trip.
const FINALIZE_MUTEX_TTL_SECS: i64 = 60;

/// Backoff before retrying a transient receipt fetch.
const RECEIPT_RETRY_DELAY_SECS: u64 = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingMiningBoostUpgrade {
    pub expires_at: DateTime<Utc>,
    pub ice_price: String,
    pub payment_address: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MiningBoostLevelView {
    pub ice_price: String,
    pub mining_session_length_seconds: u32,
    pub mining_rate_bonus: u16,
    pub max_t1_referrals: u8,
    pub slashing_disabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MiningBoostSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_level_index: Option<u8>,
    pub levels: Vec<MiningBoostLevelView>,
}

/// Format an ICE amount with the boost price precision.
pub fn format_ice_price(amount: f64) -> String {
    format!("{amount:.prec$}", prec = MINING_BOOST_PRICE_PRECISION as usize)
}

/// Recompute the runtime boost levels from the live ICE/USD price.
///
/// `ice_price = floor(usd / live * 10^p) / 10^p`; levels come out sorted
/// ascending so a tier index is also a price ordering.
pub fn build_mining_boost_levels(cfg: &MiningBoostConfig, live_price: f64) -> Vec<MiningBoostLevel> {
    let pow = 10f64.powi(MINING_BOOST_PRICE_PRECISION as i32);
    let mut levels: Vec<MiningBoostLevel> = cfg
        .levels
        .iter()
        .map(|level| {
            let ice_price = (level.usd_price / live_price * pow).floor() / pow;
            MiningBoostLevel {
                ice_price_display: format_ice_price(
                    ice_price * (1.0 + cfg.price_delta as f64 / 100.0),
                ),
                ice_price,
                mining_session_length_secs: level.mining_session_length_secs,
                mining_rate_bonus: level.mining_rate_bonus,
                max_t1_referrals: level.max_t1_referrals,
                slashing_disabled: level.slashing_disabled,
            }
        })
        .collect();
    levels.sort_by(|a, b| a.ice_price.total_cmp(&b.ice_price));

    levels
}

/// Extract `(sender, ice_amount)` from the first matching ERC-20 Transfer to
/// the payment address. Returns `None` when the receipt pays nothing.
pub fn sender_and_burnt_amount(
    receipt: &TransactionReceipt,
    contract_address: &str,
    payment_address: &str,
) -> Option<(String, f64)> {
    let contract = contract_address.trim_start_matches("0x").to_lowercase();
    let payment = payment_address.trim_start_matches("0x").to_lowercase();
    for log in &receipt.logs {
        if log.topics.first().map(|t| t.to_lowercase()) != Some(ERC20_TRANSFER_TOPIC.into()) {
            continue;
        }
        if log.address.trim_start_matches("0x").to_lowercase() != contract {
            continue;
        }
        let (Some(from), Some(to)) = (log.topics.get(1), log.topics.get(2)) else {
            continue;
        };
        if !address_topic_matches(to, &payment) {
            continue;
        }
        let value = decode_u256_value(&log.data);
        if value > 0.0 {
            return Some((from.clone(), value / ICE_FLAKES_DENOMINATION));
        }
    }

    None
}

/// Compare a 32-byte indexed address topic against a bare 20-byte hex address.
fn address_topic_matches(topic: &str, bare_address: &str) -> bool {
    let topic = topic.trim_start_matches("0x").to_lowercase();
    topic.len() >= bare_address.len()
        && !bare_address.is_empty()
        && topic[topic.len() - bare_address.len()..] == *bare_address
}

/// Big-endian uint256 to f64. Precision loss above 2^53 flakes is acceptable
/// for display and pricing math.
fn decode_u256_value(data: &[u8]) -> f64 {
    data.iter().fold(0f64, |acc, byte| acc * 256.0 + *byte as f64)
}

impl ServiceState {
    pub async fn get_mining_boost_summary(
        &self,
        user_id: &str,
    ) -> Result<MiningBoostSummary, Error> {
        let id = self.get_or_init_internal_id(user_id).await?;
        let usr = self
            .kv
            .get_user(id)
            .await?
            .ok_or(Error::RelationNotFound)?;
        let levels = self.levels();
        let current_level_index = usr.mining_boost_level_index;
        let previous_level_price = current_level_index
            .and_then(|ix| levels.get(ix as usize))
            .map(|level| level.ice_price)
            .unwrap_or(0.0);

        let delta = 1.0 + self.cfg.mining_boost.price_delta as f64 / 100.0;
        let views = levels
            .iter()
            .map(|level| MiningBoostLevelView {
                ice_price: format_ice_price(
                    (level.ice_price - previous_level_price).max(0.0) * delta,
                ),
                mining_session_length_seconds: level.mining_session_length_secs,
                mining_rate_bonus: level.mining_rate_bonus,
                max_t1_referrals: level.max_t1_referrals,
                slashing_disabled: level.slashing_disabled,
            })
            .collect();

        Ok(MiningBoostSummary {
            current_level_index,
            levels: views,
        })
    }

    /// Phase 1: quote the upgrade and park it under a TTL'd pending key.
    pub async fn initialize_mining_boost_upgrade(
        &self,
        mining_boost_level_index: u8,
        user_id: &str,
    ) -> Result<PendingMiningBoostUpgrade, Error> {
        let levels = self.levels();
        if mining_boost_level_index as usize >= levels.len() {
            return Err(Error::InvalidProperties(
                "mining boost already at max level".into(),
            ));
        }
        let id = self.get_or_init_internal_id(user_id).await?;
        let usr = self
            .kv
            .get_user(id)
            .await?
            .ok_or(Error::RelationNotFound)?;

        if let Some(current) = usr.mining_boost_level_index {
            if current >= mining_boost_level_index {
                return Err(Error::InvalidProperties(format!(
                    "current mining boost level `{current}` is greater or equal than provided one `{mining_boost_level_index}`"
                )));
            }
        }

        let previous_level_price = usr
            .mining_boost_level_index
            .and_then(|ix| levels.get(ix as usize))
            .map(|level| level.ice_price)
            .unwrap_or(0.0);
        let upgrade_price = levels[mining_boost_level_index as usize].ice_price - previous_level_price;

        let key = mining_boost_upgrade_key(id);
        let value = format!("{mining_boost_level_index}:{}", format_ice_price(upgrade_price));
        let ttl = self.cfg.mining_boost.session_length();
        self.kv.set(&key, &value, Some(ttl)).await?;

        let delta = 1.0 + self.cfg.mining_boost.price_delta as f64 / 100.0;
        Ok(PendingMiningBoostUpgrade {
            expires_at: Utc::now() + ttl,
            ice_price: format_ice_price(upgrade_price * delta),
            payment_address: self.cfg.mining_boost.payment_address.clone(),
        })
    }

    /// Phase 2: interpret the burn tx, record it, and upgrade the tier.
    ///
    /// Returns `None` when the upgrade is fully paid, or the refreshed pending
    /// upgrade when the payment was partial.
    pub async fn finalize_mining_boost_upgrade(
        &self,
        network: Network,
        tx_hash: &str,
        user_id: &str,
    ) -> Result<Option<PendingMiningBoostUpgrade>, Error> {
        let id = self.get_or_init_internal_id(user_id).await?;

        let mutex_key = mining_boost_finalize_mutex_key(id);
        let acquired = self
            .kv
            .set_nx(&mutex_key, "", Some(Duration::seconds(FINALIZE_MUTEX_TTL_SECS)))
            .await?;
        if !acquired {
            return Err(Error::RaceCondition);
        }

        let result = self
            .finalize_mining_boost_upgrade_locked(network, tx_hash, user_id, id)
            .await;
        if let Err(err) = self.kv.del(&mutex_key).await {
            warn!(%user_id, %err, "failed to release boost-finalize mutex; it will expire");
        }

        result
    }

    async fn finalize_mining_boost_upgrade_locked(
        &self,
        network: Network,
        tx_hash: &str,
        user_id: &str,
        id: i64,
    ) -> Result<Option<PendingMiningBoostUpgrade>, Error> {
        let key = mining_boost_upgrade_key(id);
        let raw = self.kv.get(&key).await?.unwrap_or_default();
        let Some((raw_level, raw_price)) = raw.split_once(':') else {
            return Err(Error::NotFound);
        };
        let requested_level: usize = raw_level
            .parse()
            .map_err(|_| Error::Storage(format!("malformed pending upgrade at {key}: {raw}")))?;
        let remaining_price: f64 = raw_price
            .parse()
            .map_err(|_| Error::Storage(format!("malformed pending upgrade at {key}: {raw}")))?;
        let ttl = self.kv.ttl(&key).await?.unwrap_or_else(Duration::zero);
        let expire_at = Utc::now() + ttl.abs();

        let usr = self
            .kv
            .get_user(id)
            .await?
            .ok_or(Error::RelationNotFound)?;
        if let Some(current) = usr.mining_boost_level_index {
            if current as usize >= requested_level {
                return Err(Error::InvalidProperties(format!(
                    "current mining boost level `{current}` is greater or equal than provided one `{requested_level}`"
                )));
            }
        }

        let tx_hash = tx_hash.to_lowercase();
        let (sender_address, burnt_amount) =
            self.sender_and_burnt_amount_for_upgrade(network, &tx_hash).await?;
        if burnt_amount <= 0.0 {
            return Err(Error::InvalidMiningBoostUpgradeTx);
        }

        let levels = self.levels();
        let mut new_level: Option<usize> = if remaining_price - burnt_amount <= 0.0 {
            Some(requested_level)
        } else {
            None
        };
        let mut extra = burnt_amount - remaining_price;
        if extra > 0.0 {
            for ix in 0..levels.len() {
                if ix > requested_level {
                    extra -= levels[ix].ice_price - levels[ix - 1].ice_price;
                }
                if extra >= 0.0 {
                    new_level = Some(ix);
                }
            }
        }

        self.ledger
            .insert_accepted_transaction(&AcceptedTransaction {
                created_at: Utc::now(),
                mining_boost_level: requested_level as u64,
                tenant: self.cfg.tenant.clone(),
                tx_hash: tx_hash.clone(),
                ice_amount: burnt_amount,
                sender_address,
                user_id: user_id.to_string(),
            })
            .await?;

        let mut updated = usr;
        if let Some(level) = new_level {
            updated.mining_boost_level_index = Some(level as u8);
        }
        updated.mining_boost_amount_burnt += burnt_amount;
        let effective_level = updated
            .mining_boost_level_index
            .and_then(|ix| levels.get(ix as usize));
        if let Some(level) = effective_level {
            updated.pre_staking_allocation = 100.0;
            updated.pre_staking_bonus = level.mining_rate_bonus as f64;
        }

        let mutation = async {
            self.kv.save_user(&updated, WriteGuard::Unconditional).await?;
            if remaining_price - burnt_amount > 0.0 {
                let value = format!(
                    "{requested_level}:{}",
                    format_ice_price(remaining_price - burnt_amount)
                );
                self.kv.set(&key, &value, Some(ttl)).await?;
            }
            Ok::<(), Error>(())
        };
        if let Err(err) = mutation.await {
            error!(%user_id, %tx_hash, %err, "boost finalize mutation failed, rolling back ledger row");
            let compensation = self.rollback_accepted_transaction(user_id, &tx_hash).await;
            return Err(err.with_compensation(compensation));
        }

        if remaining_price - burnt_amount <= 0.0 {
            return Ok(None);
        }
        let delta = 1.0 + self.cfg.mining_boost.price_delta as f64 / 100.0;
        Ok(Some(PendingMiningBoostUpgrade {
            expires_at: expire_at,
            ice_price: format_ice_price((remaining_price - burnt_amount) * delta),
            payment_address: self.cfg.mining_boost.payment_address.clone(),
        }))
    }

    async fn sender_and_burnt_amount_for_upgrade(
        &self,
        network: Network,
        tx_hash: &str,
    ) -> Result<(String, f64), Error> {
        let contract = self
            .cfg
            .mining_boost
            .contract_addresses
            .get(&network)
            .cloned()
            .unwrap_or_default();
        loop {
            match self.chain.transaction_receipt(network, tx_hash).await {
                Ok(receipt) => {
                    return Ok(sender_and_burnt_amount(
                        &receipt,
                        &contract,
                        &self.cfg.mining_boost.payment_address,
                    )
                    .unwrap_or_default());
                }
                Err(err) if err.is_transient() => {
                    warn!(%tx_hash, %err, "transient receipt failure, retrying");
                    tokio::time::sleep(StdDuration::from_secs(RECEIPT_RETRY_DELAY_SECS)).await;
                }
                Err(glacier_core::error::ChainRpcError::NotFound) => {
                    return Ok((String::new(), 0.0));
                }
                Err(err) => return Err(Error::ChainRpc(err.to_string())),
            }
        }
    }

    /// Compensating delete of a ledger row, detached from caller cancellation.
    async fn rollback_accepted_transaction(&self, user_id: &str, tx_hash: &str) -> Result<(), Error> {
        let deadline =
            StdDuration::from_secs(glacier_core::constants::COMPENSATION_DEADLINE_SECS);
        match tokio::time::timeout(
            deadline,
            self.ledger.delete_accepted_transaction(user_id, tx_hash),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(Error::Unexpected(format!(
                "ledger rollback for tx {tx_hash} timed out"
            ))),
        }
    }
}
