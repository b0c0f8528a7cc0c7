//! Shared value types: networks, mining-rate classification, pre-staking table,
//! timezone parsing.
//!
//! All monetary amounts are `f64` coin values; on-chain transfer values are
//! converted from 10^18 flakes at the chain boundary.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Nilable instant. `None` mirrors an unset timestamp in the persisted record.
pub type Timestamp = Option<DateTime<Utc>>;

/// Blockchain networks accepted for boost-upgrade payments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Arbitrum,
    Bnb,
    Ethereum,
}

impl Network {
    pub const ALL: [Network; 3] = [Network::Arbitrum, Network::Bnb, Network::Ethereum];
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Network::Arbitrum => "arbitrum",
            Network::Bnb => "bnb",
            Network::Ethereum => "ethereum",
        };
        f.write_str(s)
    }
}

impl FromStr for Network {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "arbitrum" => Ok(Network::Arbitrum),
            "bnb" => Ok(Network::Bnb),
            "ethereum" => Ok(Network::Ethereum),
            _ => Err(()),
        }
    }
}

/// Direction of the user's current mining rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MiningRateType {
    Positive,
    Negative,
    None,
}

/// Fixed bonus-per-years table for pre-staking commitments.
pub const PRE_STAKING_BONUSES_PER_YEAR: [(u64, f64); 6] = [
    (0, 0.0),
    (1, 35.0),
    (2, 70.0),
    (3, 115.0),
    (4, 170.0),
    (5, 250.0),
];

/// Bonus percentage for a pre-staking commitment of `years`. Years above the
/// table cap earn the cap's bonus.
pub fn pre_staking_bonus_for_years(years: u64) -> f64 {
    PRE_STAKING_BONUSES_PER_YEAR
        .iter()
        .rev()
        .find(|(y, _)| years >= *y)
        .map(|(_, b)| *b)
        .unwrap_or(0.0)
}

/// Years corresponding to a stored pre-staking bonus, if it is a table value.
pub fn pre_staking_years_for_bonus(bonus: f64) -> Option<u64> {
    PRE_STAKING_BONUSES_PER_YEAR
        .iter()
        .find(|(_, b)| (*b - bonus).abs() < f64::EPSILON)
        .map(|(y, _)| *y)
}

/// Parse a timezone offset of the form `±H:MM` or `±HH:MM` into minutes.
pub fn parse_utc_offset(tz: &str) -> Option<i64> {
    let tz = tz.trim();
    let (sign, rest) = match tz.as_bytes().first()? {
        b'+' => (1i64, &tz[1..]),
        b'-' => (-1i64, &tz[1..]),
        _ => (1i64, tz),
    };
    let (hours, minutes) = rest.split_once(':')?;
    let hours: i64 = hours.parse().ok()?;
    let minutes: i64 = minutes.parse().ok()?;
    if hours > 14 || minutes > 59 {
        return None;
    }
    Some(sign * (hours * 60 + minutes))
}

/// One row of the global accepted-transactions ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceptedTransaction {
    pub created_at: DateTime<Utc>,
    pub mining_boost_level: u64,
    pub tenant: String,
    pub tx_hash: String,
    pub ice_amount: f64,
    pub sender_address: String,
    pub user_id: String,
}

/// A single log entry from a transaction receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptLog {
    /// Emitting contract address, lowercase hex.
    pub address: String,
    /// Indexed topics, lowercase hex; `topics[0]` is the event signature.
    pub topics: Vec<String>,
    /// ABI-encoded non-indexed fields (32-byte big-endian value for Transfer).
    pub data: Vec<u8>,
}

/// A transaction receipt as returned by the chain RPC driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReceipt {
    pub tx_hash: String,
    pub logs: Vec<ReceiptLog>,
}

/// keccak256("Transfer(address,address,uint256)"), the ERC-20 Transfer topic.
pub const ERC20_TRANSFER_TOPIC: &str =
    "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef";
