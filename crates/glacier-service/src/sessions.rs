//! Mining-session lifecycle: starting sessions and the mining summary.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use glacier_core::config::{Config, MiningBoostLevel};
use glacier_core::error::Error;
use glacier_core::traits::WriteGuard;
use glacier_core::types::{MiningRateType, Timestamp};
use glacier_core::user::User;

use glacier_engine::rate::base_mining_rate;
use glacier_engine::session::{
    calculate_mining_streak, calculate_remaining_free_mining_sessions,
};

use crate::state::ServiceState;

/// Bus event emitted when a session starts or is artificially extended.
///
/// Also the input to the active-user aggregation: the extension tells the
/// aggregator which part of `(started_at, ended_at)` is newly covered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MiningSessionStarted {
    pub user_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub last_natural_mining_started_at: DateTime<Utc>,
    pub previously_ended_at: Timestamp,
    /// Seconds of session time this start added.
    pub extension_secs: i64,
    pub mining_streak: u64,
    pub free: bool,
}

impl MiningSessionStarted {
    pub fn extension(&self) -> Duration {
        Duration::seconds(self.extension_secs)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MiningRateBonuses {
    pub t1: f64,
    pub t2: f64,
    pub pre_staking: f64,
    pub extra: f64,
    pub total: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MiningRateSummary {
    pub amount: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bonuses: Option<MiningRateBonuses>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MiningRates {
    #[serde(rename = "type")]
    pub rate_type: MiningRateType,
    pub total: MiningRateSummary,
    pub total_no_pre_staking_bonus: MiningRateSummary,
    pub standard: MiningRateSummary,
    pub pre_staking: MiningRateSummary,
    pub base: MiningRateSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MiningSessionView {
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub last_natural_mining_started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previously_ended_at: Timestamp,
    pub resettable_starting_at: DateTime<Utc>,
    pub warn_about_expiration_starting_at: DateTime<Utc>,
    pub free: bool,
    pub mining_streak: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MiningSummary {
    pub mining_rates: MiningRates,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mining_session: Option<MiningSessionView>,
    pub available_extra_bonus: f64,
    pub mining_streak: u64,
    pub remaining_free_mining_sessions: u64,
    pub mining_started: bool,
}

impl ServiceState {
    /// Open (or extend) a solo mining session for the user.
    ///
    /// `resurrect` is the caller's decision about negative mining progress;
    /// it is only consulted when the rollback window is open. `skip_kyc_steps`
    /// lets the client skip steps the config marks skippable.
    pub async fn start_new_mining_session(
        &self,
        user_id: &str,
        resurrect: Option<bool>,
        skip_kyc_steps: &[u8],
    ) -> Result<MiningSummary, Error> {
        if self.cfg.mining_disabled {
            return Err(Error::MiningDisabled);
        }
        let id = self.get_or_init_internal_id(user_id).await?;
        let mut usr = self
            .kv
            .get_user(id)
            .await?
            .ok_or(Error::RelationNotFound)?;
        let now = Utc::now();
        let levels = self.levels();

        if let Some(steps) = missing_kyc_steps(&self.cfg, &usr, skip_kyc_steps) {
            return Err(Error::KycRequired { steps });
        }

        if usr.session_active(now) {
            if let Some(last_started) = usr.mining_session_solo_last_started_at {
                if now < last_started + self.cfg.mining_session_duration.min() {
                    return Err(Error::Duplicate);
                }
            }
        }

        if let Some(amount) = pending_rollback_amount(&self.cfg, &usr, now) {
            match resurrect {
                None => {
                    return Err(Error::NegativeMiningProgressDecisionRequired { amount });
                }
                Some(decision) => usr.rollback_negative_mining = Some(decision),
            }
        }

        let guard = WriteGuard::IfBalanceUpdatedAt(usr.balance_last_updated_at);
        let previously_ended_at = usr.mining_session_solo_ended_at.filter(|ended| *ended <= now);
        let extending = usr.session_active(now);
        let started_at = if extending {
            usr.mining_session_solo_started_at.unwrap_or(now)
        } else {
            now
        };
        let previous_ended_at = usr.mining_session_solo_ended_at;
        let ended_at = now + usr.max_mining_session_duration(&self.cfg, &levels);

        usr.mining_session_solo_previously_ended_at = previously_ended_at;
        usr.mining_session_solo_started_at = Some(started_at);
        usr.mining_session_solo_last_started_at = Some(now);
        usr.mining_session_solo_ended_at = Some(ended_at);
        usr.referrals_count_change_guard_updated_at = Some(started_at);
        usr.slashing_rate_solo = 0.0;
        usr.slashing_rate_t0 = 0.0;

        self.kv.save_user(&usr, guard).await?;

        let extension = match previous_ended_at.filter(|_| extending) {
            Some(previous) => ended_at.signed_duration_since(previous),
            None => ended_at.signed_duration_since(started_at),
        };
        let mining_streak = calculate_mining_streak(
            now,
            usr.mining_session_solo_started_at,
            usr.mining_session_solo_ended_at,
            self.cfg.mining_session_duration.max(),
        );
        let event = MiningSessionStarted {
            user_id: user_id.to_string(),
            started_at,
            ended_at,
            last_natural_mining_started_at: now,
            previously_ended_at,
            extension_secs: extension.num_seconds(),
            mining_streak,
            free: false,
        };

        match self.increment_total_active_users(&event).await {
            Ok(()) | Err(Error::Duplicate) => {}
            Err(err) => return Err(err),
        }
        if let Some(topic) = self.cfg.bus_topics.get(1) {
            let payload = serde_json::to_vec(&event)
                .map_err(|err| Error::Unexpected(err.to_string()))?;
            if let Err(err) = self.bus.publish(topic, user_id, payload).await {
                warn!(%user_id, %err, "failed to publish mining-session event");
            }
        }

        Ok(self.mining_summary_for(&usr, now, &levels))
    }

    /// Rates breakdown, session window and allowances for the user.
    pub async fn get_mining_summary(&self, user_id: &str) -> Result<MiningSummary, Error> {
        let id = self.get_or_init_internal_id(user_id).await?;
        let usr = self
            .kv
            .get_user(id)
            .await?
            .ok_or(Error::RelationNotFound)?;
        Ok(self.mining_summary_for(&usr, Utc::now(), &self.levels()))
    }

    pub(crate) fn mining_summary_for(
        &self,
        usr: &User,
        now: DateTime<Utc>,
        levels: &[MiningBoostLevel],
    ) -> MiningSummary {
        let cfg = &self.cfg;
        let mining_streak = calculate_mining_streak(
            now,
            usr.mining_session_solo_started_at,
            usr.mining_session_solo_ended_at,
            cfg.mining_session_duration.max(),
        );
        let mining_session = match (
            usr.mining_session_solo_last_started_at,
            usr.mining_session_solo_ended_at,
        ) {
            (Some(last_started), Some(ended)) if ended > now => Some(MiningSessionView {
                started_at: usr.mining_session_solo_started_at.unwrap_or(last_started),
                ended_at: ended,
                last_natural_mining_started_at: last_started,
                previously_ended_at: usr.mining_session_solo_previously_ended_at,
                resettable_starting_at: last_started + cfg.mining_session_duration.min(),
                warn_about_expiration_starting_at: last_started
                    + cfg.mining_session_duration.warn_about_expiration_after(),
                free: false,
                mining_streak,
            }),
            _ => None,
        };

        MiningSummary {
            mining_rates: mining_rates_for(usr, now, cfg, levels),
            mining_session,
            available_extra_bonus: 0.0,
            mining_streak,
            remaining_free_mining_sessions: calculate_remaining_free_mining_sessions(
                now, usr, cfg, levels,
            ),
            mining_started: usr.mining_session_solo_started_at.is_some(),
        }
    }
}

/// Steps still required before the user may mine, or `None` when clear.
fn missing_kyc_steps(cfg: &Config, usr: &User, skip: &[u8]) -> Option<Vec<u8>> {
    if !cfg.kyc.enabled {
        return None;
    }
    let missing: Vec<u8> = cfg
        .kyc
        .required_steps
        .iter()
        .copied()
        .filter(|step| *step > usr.kyc_steps_passed && !skip.contains(step))
        .collect();
    if missing.is_empty() {
        None
    } else {
        Some(missing)
    }
}

/// Slashed amount eligible for a rollback decision right now, if any.
fn pending_rollback_amount(cfg: &Config, usr: &User, now: DateTime<Utc>) -> Option<f64> {
    let ended = usr.mining_session_solo_ended_at?;
    if ended > now || usr.balance_total_slashed <= 0.0 {
        return None;
    }
    let idle = now.signed_duration_since(ended);
    let window = &cfg.rollback_negative_mining;
    if idle >= window.available_after() && idle <= window.available_until() {
        Some(usr.balance_total_slashed)
    } else {
        None
    }
}

fn format_amount(amount: f64) -> String {
    format!("{amount:.2}")
}

fn summary(amount: f64, bonuses: Option<MiningRateBonuses>) -> MiningRateSummary {
    MiningRateSummary {
        amount: format_amount(amount),
        bonuses,
    }
}

/// Compute the displayed mining-rate breakdown from the user snapshot alone.
fn mining_rates_for(
    usr: &User,
    now: DateTime<Utc>,
    cfg: &Config,
    levels: &[MiningBoostLevel],
) -> MiningRates {
    let base = base_mining_rate(now, usr.created_at, &cfg.adoption);
    let rates = &cfg.referral_bonus_mining_rates;

    if usr.session_active(now) {
        let extra_bonus = match usr.extra_bonus_started_at {
            Some(started) if started <= now && now < started + cfg.extra_bonuses.duration() => {
                usr.extra_bonus as f64
            }
            _ => 0.0,
        };
        let t0_active = usr.id_t0 > 0;
        let active_t1 = usr.active_t1_referrals.max(0);
        let effective_t1 = match usr
            .mining_boost_level_index
            .and_then(|ix| levels.get(ix as usize))
        {
            Some(level) => active_t1.min(level.max_t1_referrals as i32),
            None => active_t1,
        };
        let active_t2 = usr.active_t2_referrals.max(0);

        let t1_bonus = rates.t1 as f64 * effective_t1 as f64
            + if t0_active { rates.t0 as f64 } else { 0.0 };
        let t2_bonus = rates.t2 as f64 * active_t2 as f64;
        let pre_staking_bonus = usr.pre_staking_allocation * usr.pre_staking_bonus / 100.0;

        let no_pre_staking = base * (100.0 + extra_bonus + t1_bonus + t2_bonus) / 100.0;
        let (standard, pre_staking) = glacier_engine::rate::apply_pre_staking(
            no_pre_staking,
            usr.pre_staking_allocation,
            usr.pre_staking_bonus,
        );
        let total = standard + pre_staking;
        let total_bonus = if base > 0.0 { (total / base - 1.0) * 100.0 } else { 0.0 };

        MiningRates {
            rate_type: MiningRateType::Positive,
            total: summary(
                total,
                Some(MiningRateBonuses {
                    t1: t1_bonus,
                    t2: t2_bonus,
                    pre_staking: pre_staking_bonus,
                    extra: extra_bonus,
                    total: total_bonus,
                }),
            ),
            total_no_pre_staking_bonus: summary(no_pre_staking, None),
            standard: summary(standard, None),
            pre_staking: summary(pre_staking, None),
            base: summary(base, None),
        }
    } else if usr.total_balance() > 0.0
        && !usr.slashing_disabled(levels)
        && !usr.reached_slashing_floor(cfg)
    {
        let ratio = if cfg.development { 1.0 } else { 24.0 };
        let solo_rate = if usr.slashing_rate_solo != 0.0 {
            usr.slashing_rate_solo
        } else {
            usr.balance_solo / cfg.slashing_days_count as f64 / ratio
        };
        let t0_rate = if usr.slashing_rate_t0 != 0.0 {
            usr.slashing_rate_t0
        } else {
            usr.balance_t0 / cfg.slashing_days_count as f64 / ratio
        };
        let negative_total = solo_rate + t0_rate;
        let (standard, pre_staking) = glacier_engine::rate::apply_pre_staking(
            negative_total,
            usr.pre_staking_allocation,
            usr.pre_staking_bonus,
        );

        MiningRates {
            rate_type: MiningRateType::Negative,
            total: summary(standard + pre_staking, None),
            total_no_pre_staking_bonus: summary(negative_total, None),
            standard: summary(standard, None),
            pre_staking: summary(pre_staking, None),
            base: summary(base, None),
        }
    } else {
        MiningRates {
            rate_type: MiningRateType::None,
            total: summary(0.0, None),
            total_no_pre_staking_bonus: summary(0.0, None),
            standard: summary(0.0, None),
            pre_staking: summary(0.0, None),
            base: summary(base, None),
        }
    }
}
