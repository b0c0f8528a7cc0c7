//! The canonical per-user accrual record and the referrer snapshot.
//!
//! The record is the single source of truth for a user's balances; every
//! mutation flows through the accrual engine or one of the named mutators.
//! Referral links are integer IDs, never object references: `id_t0 > 0` is an
//! active referrer, `id_t0 < 0` a referrer that has never mined, `0` none.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{Config, MiningBoostLevel};
use crate::types::Timestamp;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct User {
    // Identity.
    pub internal_id: i64,
    pub user_id: String,
    pub created_at: Timestamp,

    // Referral links.
    pub id_t0: i64,
    pub id_t_minus1: i64,
    pub referrals_count_change_guard_updated_at: Timestamp,

    // Session.
    pub mining_session_solo_started_at: Timestamp,
    pub mining_session_solo_last_started_at: Timestamp,
    pub mining_session_solo_ended_at: Timestamp,
    pub mining_session_solo_previously_ended_at: Timestamp,

    // Balance partitions.
    pub balance_solo: f64,
    pub balance_t0: f64,
    pub balance_t1: f64,
    pub balance_t2: f64,
    pub balance_for_t0: f64,
    pub balance_for_t_minus1: f64,
    pub balance_total_standard: f64,
    pub balance_total_pre_staking: f64,
    pub balance_total_minted: f64,
    pub balance_total_slashed: f64,

    // Pending buffers. The unapplied delta is `pending - applied`.
    pub balance_solo_pending: f64,
    pub balance_solo_pending_applied: f64,
    pub balance_t1_pending: f64,
    pub balance_t1_pending_applied: f64,
    pub balance_t2_pending: f64,
    pub balance_t2_pending_applied: f64,

    // Slashing rates, per day divided by the session ratio.
    pub slashing_rate_solo: f64,
    pub slashing_rate_t0: f64,
    pub slashing_rate_for_t0: f64,
    pub slashing_rate_for_t_minus1: f64,

    // Referral counters. May transiently go negative, clamped by the engine.
    pub active_t1_referrals: i32,
    pub active_t2_referrals: i32,

    // Boost.
    pub mining_boost_level_index: Option<u8>,
    pub mining_boost_amount_burnt: f64,

    // Pre-staking.
    pub pre_staking_allocation: f64,
    pub pre_staking_bonus: f64,

    // Extra bonus.
    pub extra_bonus_started_at: Timestamp,
    pub extra_bonus_last_claim_available_at: Timestamp,
    pub extra_bonus: u16,
    pub extra_bonus_days_claim_not_available: u16,
    pub extra_bonus_index: Option<u16>,

    // Negative-progress rollback decision recorded at session start and
    // consumed by the next accrual step. `Some(true)` restores, `Some(false)`
    // forfeits.
    pub rollback_negative_mining: Option<bool>,

    // Timekeeping.
    pub balance_last_updated_at: Timestamp,
    pub utc_offset: i64,

    // Opaque attributes.
    pub latest_device: String,
    pub profile_picture_url: String,
    pub username: String,
    pub hide_ranking: bool,
    pub kyc_steps_passed: u8,
    pub news_seen: u64,
}

/// Referrer snapshot: the subset of the referrer's record the accrual step
/// reads. Materialized by the caller, one hop for T0 and two hops for T-1.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Referral {
    pub internal_id: i64,
    pub id_t0: i64,
    pub mining_session_solo_ended_at: Timestamp,
    pub balance_last_updated_at: Timestamp,
    pub balance_solo: f64,
    pub balance_t0: f64,
    pub balance_t1: f64,
    pub balance_t2: f64,
    pub mining_boost_level_index: Option<u8>,
}

impl User {
    /// Session is live iff `ended_at > now`. Exactly `ended_at == now` counts
    /// as ended.
    pub fn session_active(&self, now: DateTime<Utc>) -> bool {
        matches!(self.mining_session_solo_ended_at, Some(ended) if ended > now)
    }

    pub fn total_balance(&self) -> f64 {
        self.balance_solo + self.balance_t0 + self.balance_t1 + self.balance_t2
    }

    /// Nothing left that slashing or referrer propagation could touch.
    pub fn is_absolute_zero(&self) -> bool {
        self.balance_solo == 0.0
            && self.balance_t0 == 0.0
            && self.balance_solo_pending - self.balance_solo_pending_applied == 0.0
            && self.balance_for_t0 == 0.0
            && self.balance_for_t_minus1 == 0.0
    }

    pub fn reached_slashing_floor(&self, cfg: &Config) -> bool {
        self.total_balance() <= cfg.slashing_floor
    }

    pub fn slashing_disabled(&self, levels: &[MiningBoostLevel]) -> bool {
        boost_level(self.mining_boost_level_index, levels)
            .map(|l| l.slashing_disabled)
            .unwrap_or(false)
    }

    /// Session length honoring the boost tier, falling back to the configured
    /// maximum.
    pub fn max_mining_session_duration(
        &self,
        cfg: &Config,
        levels: &[MiningBoostLevel],
    ) -> Duration {
        boost_level(self.mining_boost_level_index, levels)
            .map(|l| l.mining_session_length())
            .unwrap_or_else(|| cfg.mining_session_duration.max())
    }
}

impl Referral {
    pub fn session_active(&self, now: DateTime<Utc>) -> bool {
        matches!(self.mining_session_solo_ended_at, Some(ended) if ended > now)
    }

    pub fn reached_slashing_floor(&self, cfg: &Config) -> bool {
        self.balance_solo + self.balance_t0 + self.balance_t1 + self.balance_t2
            <= cfg.slashing_floor
    }

    pub fn slashing_disabled(&self, levels: &[MiningBoostLevel]) -> bool {
        boost_level(self.mining_boost_level_index, levels)
            .map(|l| l.slashing_disabled)
            .unwrap_or(false)
    }
}

fn boost_level(index: Option<u8>, levels: &[MiningBoostLevel]) -> Option<&MiningBoostLevel> {
    index.and_then(|ix| levels.get(ix as usize))
}
