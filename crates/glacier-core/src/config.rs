//! Service configuration.
//!
//! Durations are stored as whole seconds so the whole tree deserializes from
//! plain JSON/YAML scalars; accessor methods expose [`chrono::Duration`]s.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::types::Network;

/// Mining-session window durations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MiningSessionDuration {
    /// A new session cannot be restarted within this window of the last start.
    pub min_secs: u64,
    /// Natural length of one session.
    pub max_secs: u64,
    /// Expiration warnings become eligible this long after the session start.
    pub warn_about_expiration_after_secs: u64,
}

impl MiningSessionDuration {
    pub fn min(&self) -> Duration {
        Duration::seconds(self.min_secs as i64)
    }

    pub fn max(&self) -> Duration {
        Duration::seconds(self.max_secs as i64)
    }

    pub fn warn_about_expiration_after(&self) -> Duration {
        Duration::seconds(self.warn_about_expiration_after_secs as i64)
    }
}

impl Default for MiningSessionDuration {
    fn default() -> Self {
        Self {
            min_secs: 12 * 3600,
            max_secs: 24 * 3600,
            warn_about_expiration_after_secs: 18 * 3600,
        }
    }
}

/// Window during which a negative-progress rollback decision is accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackNegativeMining {
    pub available_after_secs: u64,
    pub available_until_secs: u64,
}

impl RollbackNegativeMining {
    pub fn available_after(&self) -> Duration {
        Duration::seconds(self.available_after_secs as i64)
    }

    pub fn available_until(&self) -> Duration {
        Duration::seconds(self.available_until_secs as i64)
    }
}

impl Default for RollbackNegativeMining {
    fn default() -> Self {
        Self {
            available_after_secs: 5 * 24 * 3600,
            available_until_secs: 60 * 24 * 3600,
        }
    }
}

/// Aggregation bucket widths for global counters and history reshaping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalAggregationInterval {
    pub parent_secs: u64,
    pub child_secs: u64,
}

impl GlobalAggregationInterval {
    pub fn parent(&self) -> Duration {
        Duration::seconds(self.parent_secs as i64)
    }

    pub fn child(&self) -> Duration {
        Duration::seconds(self.child_secs as i64)
    }

    /// Children per parent bucket, at least 1.
    pub fn children_per_parent(&self) -> u64 {
        (self.parent_secs / self.child_secs).max(1)
    }
}

impl Default for GlobalAggregationInterval {
    fn default() -> Self {
        Self {
            parent_secs: 24 * 3600,
            child_secs: 3600,
        }
    }
}

/// Adoption milestone schedule controlling base-mining-rate halving.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Adoption {
    pub starting_base_mining_rate: f64,
    pub milestones: u8,
    pub duration_between_milestones_secs: u64,
}

impl Adoption {
    pub fn duration_between_milestones(&self) -> Duration {
        Duration::seconds(self.duration_between_milestones_secs as i64)
    }
}

impl Default for Adoption {
    fn default() -> Self {
        Self {
            starting_base_mining_rate: 16.0,
            milestones: 6,
            duration_between_milestones_secs: 180 * 24 * 3600,
        }
    }
}

/// Referral bonus percentages, in whole percent of the base mining rate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferralBonusMiningRates {
    pub t0: u16,
    pub t1: u32,
    pub t2: u32,
}

impl Default for ReferralBonusMiningRates {
    fn default() -> Self {
        Self { t0: 25, t1: 25, t2: 5 }
    }
}

/// Static definition of one boost tier, keyed by its USD price.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MiningBoostLevelConfig {
    pub usd_price: f64,
    pub mining_session_length_secs: u32,
    pub mining_rate_bonus: u16,
    pub max_t1_referrals: u8,
    pub slashing_disabled: bool,
}

/// A boost tier with its ICE price computed from the live exchange rate.
///
/// Produced by the price syncer; always sorted ascending by `ice_price`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MiningBoostLevel {
    /// Display price: upgrade cost with the price delta applied, 4 decimals.
    pub ice_price_display: String,
    /// Raw tier price in ICE (no delta).
    #[serde(skip)]
    pub ice_price: f64,
    pub mining_session_length_secs: u32,
    pub mining_rate_bonus: u16,
    pub max_t1_referrals: u8,
    pub slashing_disabled: bool,
}

impl MiningBoostLevel {
    pub fn mining_session_length(&self) -> Duration {
        Duration::seconds(self.mining_session_length_secs as i64)
    }
}

/// Boost-upgrade configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MiningBoostConfig {
    pub levels: Vec<MiningBoostLevelConfig>,
    pub network_endpoints: HashMap<Network, Vec<String>>,
    pub contract_addresses: HashMap<Network, String>,
    pub payment_address: String,
    /// TTL of a pending upgrade, and of the upgrade session as shown to users.
    pub session_length_secs: u64,
    /// Extra percentage added on top of the raw upgrade price.
    pub price_delta: u16,
    pub price_endpoint: String,
}

impl MiningBoostConfig {
    pub fn session_length(&self) -> Duration {
        Duration::seconds(self.session_length_secs as i64)
    }
}

impl Default for MiningBoostConfig {
    fn default() -> Self {
        Self {
            levels: vec![
                MiningBoostLevelConfig {
                    usd_price: 10.0,
                    mining_session_length_secs: 24 * 3600,
                    mining_rate_bonus: 25,
                    max_t1_referrals: 5,
                    slashing_disabled: false,
                },
                MiningBoostLevelConfig {
                    usd_price: 30.0,
                    mining_session_length_secs: 2 * 24 * 3600,
                    mining_rate_bonus: 50,
                    max_t1_referrals: 10,
                    slashing_disabled: false,
                },
                MiningBoostLevelConfig {
                    usd_price: 60.0,
                    mining_session_length_secs: 7 * 24 * 3600,
                    mining_rate_bonus: 100,
                    max_t1_referrals: 20,
                    slashing_disabled: true,
                },
            ],
            network_endpoints: HashMap::new(),
            contract_addresses: HashMap::new(),
            payment_address: String::new(),
            session_length_secs: 3600,
            price_delta: 5,
            price_endpoint: "https://data.ice.io/stats".into(),
        }
    }
}

/// Extra-bonus scheduling windows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtraBonuses {
    /// Length of one bonus cycle.
    pub duration_secs: u64,
    /// Window within a cycle during which some chunk can claim.
    pub availability_window_secs: u64,
    /// Window a single chunk has to claim once its slot opens.
    pub claim_window_secs: u64,
    pub utc_offset_duration_secs: u64,
    pub kyc_passed_extra_bonus: u16,
    /// Users are spread over this many chunks by `internal_id % chunk_count`.
    pub chunk_count: u16,
    pub notify_hour_start: u32,
    pub notify_hour_end: u32,
    /// First day of the extra-bonus schedule.
    pub start_date: Option<DateTime<Utc>>,
}

impl ExtraBonuses {
    pub fn duration(&self) -> Duration {
        Duration::seconds(self.duration_secs as i64)
    }

    pub fn availability_window(&self) -> Duration {
        Duration::seconds(self.availability_window_secs as i64)
    }

    pub fn claim_window(&self) -> Duration {
        Duration::seconds(self.claim_window_secs as i64)
    }
}

impl Default for ExtraBonuses {
    fn default() -> Self {
        Self {
            duration_secs: 24 * 3600,
            availability_window_secs: 10 * 3600,
            claim_window_secs: 3600,
            utc_offset_duration_secs: 30 * 60,
            kyc_passed_extra_bonus: 10,
            chunk_count: 1000,
            notify_hour_start: 10,
            notify_hour_end: 20,
            start_date: None,
        }
    }
}

/// KYC gating applied before a mining session may start.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KycConfig {
    pub enabled: bool,
    /// Steps (ascending) that must be passed before mining.
    pub required_steps: Vec<u8>,
    pub config_json_url: String,
    pub try_reset_kyc_steps_url: String,
    pub face_auth_availability_url: String,
    pub require_quiz_only_on_specific_day_of_week: Option<u8>,
    pub face_recognition_delay_secs: u64,
    pub liveness_delay_secs: u64,
    pub quiz_delay_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetailedCoinMetrics {
    pub refresh_interval_secs: u64,
}

impl Default for DetailedCoinMetrics {
    fn default() -> Self {
        Self { refresh_interval_secs: 600 }
    }
}

/// Full service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub tenant: String,
    /// Development mode: elapsed time is measured in minutes instead of hours
    /// and the history day-change rule also fires on minute changes.
    pub development: bool,
    pub mining_disabled: bool,
    pub extra_bonus_claim_enabled: bool,
    pub mining_session_duration: MiningSessionDuration,
    pub rollback_negative_mining: RollbackNegativeMining,
    pub global_aggregation_interval: GlobalAggregationInterval,
    pub adoption: Adoption,
    pub slashing_floor: f64,
    pub slashing_days_count: u64,
    pub referral_bonus_mining_rates: ReferralBonusMiningRates,
    pub mining_boost: MiningBoostConfig,
    pub extra_bonuses: ExtraBonuses,
    pub kyc: KycConfig,
    pub detailed_coin_metrics: DetailedCoinMetrics,
    pub blockchain_coin_stats_json_url: String,
    /// Topic index for day-off events on the message bus.
    pub day_off_topic: usize,
    pub bus_topics: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tenant: "glacier".into(),
            development: false,
            mining_disabled: false,
            extra_bonus_claim_enabled: false,
            mining_session_duration: MiningSessionDuration::default(),
            rollback_negative_mining: RollbackNegativeMining::default(),
            global_aggregation_interval: GlobalAggregationInterval::default(),
            adoption: Adoption::default(),
            slashing_floor: 1.0,
            slashing_days_count: 30,
            referral_bonus_mining_rates: ReferralBonusMiningRates::default(),
            mining_boost: MiningBoostConfig::default(),
            extra_bonuses: ExtraBonuses::default(),
            kyc: KycConfig::default(),
            detailed_coin_metrics: DetailedCoinMetrics::default(),
            blockchain_coin_stats_json_url: String::new(),
            day_off_topic: 5,
            bus_topics: vec![
                "users-table".into(),
                "mining-sessions-table".into(),
                "completed-tasks".into(),
                "viewed-news".into(),
                "device-metadata-table".into(),
                "day-off-started".into(),
            ],
        }
    }
}
