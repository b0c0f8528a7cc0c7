//! The per-user accrual state machine.
//!
//! [`mine`] is pure over its inputs and total: it never fails and never touches
//! storage. The caller materializes the user and both referrer snapshots,
//! invokes it, and persists the outcome atomically under the per-user CAS.

use chrono::{DateTime, Datelike, Timelike, Utc};

use glacier_core::config::{Config, MiningBoostLevel};
use glacier_core::user::{Referral, User};

use crate::rate::{apply_pre_staking, base_mining_rate};
use crate::resurrect::{resurrect, rewire_referrals};

/// Result of one accrual step.
#[derive(Debug, Clone, Default)]
pub struct MineOutcome {
    /// The next user state, or `None` when nothing needs to be written.
    pub user: Option<User>,
    /// A history snapshot should be generated for the previous day.
    pub should_generate_history: bool,
    /// The referral links were rewired during this step.
    pub id_t0_changed: bool,
    /// Amount to add to the T-1 referrer's `balance_t2` pending buffer.
    pub pending_amount_for_t_minus1: f64,
    /// Amount to add to the T0 referrer's `balance_t1` pending buffer.
    pub pending_amount_for_t0: f64,
}

/// Advance a user's balance state to `now`.
pub fn mine(
    now: DateTime<Utc>,
    usr: Option<&User>,
    t0: Option<&Referral>,
    t_minus1: Option<&Referral>,
    cfg: &Config,
    levels: &[MiningBoostLevel],
) -> MineOutcome {
    let Some(usr) = usr else {
        return MineOutcome::default();
    };
    if usr.mining_session_solo_started_at.is_none() || usr.mining_session_solo_ended_at.is_none() {
        return MineOutcome::default();
    }
    let mut updated = usr.clone();
    let (pending_resurrection_for_t_minus1, pending_resurrection_for_t0) = resurrect(&mut updated);
    let id_t0_changed = rewire_referrals(&mut updated, t0);

    let session_ended = !updated.session_active(now);

    if session_ended && updated.is_absolute_zero() {
        if updated.balance_t1_pending - updated.balance_t1_pending_applied != 0.0
            || updated.balance_t2_pending - updated.balance_t2_pending_applied != 0.0
        {
            updated.balance_t1_pending_applied = updated.balance_t1_pending;
            updated.balance_t2_pending_applied = updated.balance_t2_pending;
            updated.balance_last_updated_at = Some(now);

            return MineOutcome {
                user: Some(updated),
                id_t0_changed,
                ..MineOutcome::default()
            };
        }
        if updated.balance_t1 > 0.0 || updated.balance_t2 > 0.0 {
            updated.balance_total_standard = 0.0;
            updated.balance_total_pre_staking = 0.0;
            updated.balance_t1 = 0.0;
            updated.balance_t2 = 0.0;
            updated.balance_last_updated_at = Some(now);

            return MineOutcome {
                user: Some(updated),
                id_t0_changed,
                ..MineOutcome::default()
            };
        }

        return MineOutcome {
            id_t0_changed,
            ..MineOutcome::default()
        };
    }

    if session_ended
        && (updated.reached_slashing_floor(cfg) || updated.slashing_disabled(levels))
    {
        let should_generate_history = match updated.balance_last_updated_at {
            Some(last) => {
                day_changed(last, now, cfg.development)
                    && now.signed_duration_since(last) < cfg.mining_session_duration.min() * 3
            }
            None => false,
        };

        // The guard timestamp must advance past the session start exactly once,
        // otherwise the next session start trips the duplicate check.
        if updated.referrals_count_change_guard_updated_at.is_some()
            && updated.referrals_count_change_guard_updated_at == updated.mining_session_solo_started_at
        {
            return MineOutcome {
                user: Some(updated),
                should_generate_history,
                id_t0_changed,
                ..MineOutcome::default()
            };
        }

        return MineOutcome {
            should_generate_history,
            id_t0_changed,
            ..MineOutcome::default()
        };
    }

    let mut should_generate_history = false;
    match updated.balance_last_updated_at {
        None => updated.balance_last_updated_at = updated.mining_session_solo_started_at,
        Some(last) => {
            if day_changed(last, now, cfg.development) {
                should_generate_history = true;
                updated.balance_total_slashed = 0.0;
                updated.balance_total_minted = 0.0;
            }
            if updated.session_active(now)
                && (updated.is_absolute_zero() || updated.reached_slashing_floor(cfg))
            {
                updated.balance_last_updated_at = updated.mining_session_solo_started_at;
            }
        }
    }

    let time_spent = now.signed_duration_since(updated.balance_last_updated_at.unwrap_or(now));
    let (elapsed, mining_session_ratio) = if cfg.development {
        (time_spent.num_milliseconds() as f64 / 60_000.0, 1.0)
    } else {
        (time_spent.num_milliseconds() as f64 / 3_600_000.0, 24.0)
    };

    let un_applied_solo_pending = updated.balance_solo_pending - updated.balance_solo_pending_applied;
    let un_applied_t1_pending = updated.balance_t1_pending - updated.balance_t1_pending_applied;
    let un_applied_t2_pending = updated.balance_t2_pending - updated.balance_t2_pending_applied;
    updated.balance_solo_pending_applied = updated.balance_solo_pending;
    updated.balance_t1_pending_applied = updated.balance_t1_pending;
    updated.balance_t2_pending_applied = updated.balance_t2_pending;
    if un_applied_solo_pending == 0.0 {
        updated.balance_solo_pending = 0.0;
        updated.balance_solo_pending_applied = 0.0;
    }
    if un_applied_t1_pending == 0.0 {
        updated.balance_t1_pending = 0.0;
        updated.balance_t1_pending_applied = 0.0;
    }
    if un_applied_t2_pending == 0.0 {
        updated.balance_t2_pending = 0.0;
        updated.balance_t2_pending_applied = 0.0;
    }

    let mut minted_amount = 0.0;
    let mut pending_amount_for_t_minus1 = 0.0;
    let mut pending_amount_for_t0 = 0.0;
    let bmr = base_mining_rate(now, updated.created_at, &cfg.adoption);
    let rates = &cfg.referral_bonus_mining_rates;

    if updated.session_active(now) {
        let extra_bonus_active = matches!(
            updated.extra_bonus_started_at,
            Some(started) if started <= now && now < started + cfg.extra_bonuses.duration()
        );
        if extra_bonus_active {
            let rate = (100.0 + updated.extra_bonus as f64) * bmr * elapsed / 100.0;
            updated.balance_solo += rate;
            minted_amount += rate;
        } else {
            let rate = bmr * elapsed;
            updated.balance_solo += rate;
            minted_amount += rate;
        }
        if matches!(t0, Some(t0) if t0.session_active(now)) {
            let rate = rates.t0 as f64 * bmr * elapsed / 100.0;
            updated.balance_for_t0 += rate;
            updated.balance_t0 += rate;
            minted_amount += rate;

            if updated.slashing_rate_for_t0 != 0.0 {
                updated.slashing_rate_for_t0 = 0.0;
            }
        }
        if matches!(t_minus1, Some(t_minus1) if t_minus1.session_active(now)) {
            updated.balance_for_t_minus1 += rates.t2 as f64 * bmr * elapsed / 100.0;

            if updated.slashing_rate_for_t_minus1 != 0.0 {
                updated.slashing_rate_for_t_minus1 = 0.0;
            }
        }
        if updated.active_t1_referrals < 0 {
            updated.active_t1_referrals = 0;
        }
        if updated.active_t2_referrals < 0 {
            updated.active_t2_referrals = 0;
        }
        let effective_t1 = match updated
            .mining_boost_level_index
            .and_then(|ix| levels.get(ix as usize))
        {
            Some(level) => updated.active_t1_referrals.min(level.max_t1_referrals as i32),
            None => updated.active_t1_referrals,
        };
        let t1_rate = rates.t1 as f64 * effective_t1 as f64 * bmr * elapsed / 100.0;
        let t2_rate = rates.t2 as f64 * updated.active_t2_referrals as f64 * bmr * elapsed / 100.0;
        updated.balance_t1 += t1_rate;
        updated.balance_t2 += t2_rate;
        minted_amount += t1_rate + t2_rate;
    } else if !updated.slashing_disabled(levels) {
        if updated.slashing_rate_solo == 0.0 {
            updated.slashing_rate_solo =
                updated.balance_solo / cfg.slashing_days_count as f64 / mining_session_ratio;
        }
        if un_applied_solo_pending != 0.0 {
            updated.slashing_rate_solo +=
                un_applied_solo_pending / cfg.slashing_days_count as f64 / mining_session_ratio;
        }
        if updated.slashing_rate_solo < 0.0 {
            updated.slashing_rate_solo = 0.0;
        }
    }

    if let Some(t0) = t0 {
        let t0_session_ended =
            matches!(t0.mining_session_solo_ended_at, Some(ended) if ended < now);
        if updated.slashing_rate_for_t0 == 0.0
            && t0_session_ended
            && !t0.slashing_disabled(levels)
            && !t0.reached_slashing_floor(cfg)
        {
            updated.slashing_rate_for_t0 =
                updated.balance_for_t0 / cfg.slashing_days_count as f64 / mining_session_ratio;
        }
        let own_session_ended =
            matches!(updated.mining_session_solo_ended_at, Some(ended) if ended < now);
        if updated.slashing_rate_t0 == 0.0
            && own_session_ended
            && !updated.slashing_disabled(levels)
            && !updated.reached_slashing_floor(cfg)
        {
            updated.slashing_rate_t0 =
                updated.balance_t0 / cfg.slashing_days_count as f64 / mining_session_ratio;
        }
    }
    if let Some(t_minus1) = t_minus1 {
        let t_minus1_session_ended =
            matches!(t_minus1.mining_session_solo_ended_at, Some(ended) if ended < now);
        if updated.slashing_rate_for_t_minus1 == 0.0
            && t_minus1_session_ended
            && !t_minus1.slashing_disabled(levels)
            && !t_minus1.reached_slashing_floor(cfg)
        {
            updated.slashing_rate_for_t_minus1 =
                updated.balance_for_t_minus1 / cfg.slashing_days_count as f64 / mining_session_ratio;
        }
    }

    let mut slashed_amount =
        (updated.slashing_rate_solo + updated.slashing_rate_t0) * elapsed;
    updated.balance_solo -= updated.slashing_rate_solo * elapsed;

    pending_amount_for_t_minus1 -= updated.slashing_rate_for_t_minus1 * elapsed;
    pending_amount_for_t0 -= updated.slashing_rate_for_t0 * elapsed;

    updated.balance_for_t_minus1 += pending_amount_for_t_minus1;
    updated.balance_for_t0 += pending_amount_for_t0;
    updated.balance_t0 -= updated.slashing_rate_t0 * elapsed;
    updated.balance_solo += un_applied_solo_pending;
    updated.balance_t1 += un_applied_t1_pending;
    updated.balance_t2 += un_applied_t2_pending;

    pending_amount_for_t_minus1 += pending_resurrection_for_t_minus1;
    pending_amount_for_t0 += pending_resurrection_for_t0;

    if un_applied_solo_pending < 0.0 {
        slashed_amount += -un_applied_solo_pending;
    } else {
        minted_amount += un_applied_solo_pending;
    }
    if un_applied_t1_pending < 0.0 {
        slashed_amount += -un_applied_t1_pending;
    } else {
        minted_amount += un_applied_t1_pending;
    }
    if un_applied_t2_pending < 0.0 {
        slashed_amount += -un_applied_t2_pending;
    } else {
        minted_amount += un_applied_t2_pending;
    }
    if updated.balance_solo < 0.0 {
        updated.balance_solo = 0.0;
    }
    if updated.balance_t0 < 0.0 {
        updated.balance_t0 = 0.0;
    }
    if updated.balance_t1 < 0.0 {
        updated.balance_t1 = 0.0;
    }
    if updated.balance_t2 < 0.0 {
        updated.balance_t2 = 0.0;
    }
    if updated.balance_for_t0 < 0.0 {
        updated.balance_for_t0 = 0.0;
        pending_amount_for_t0 = 0.0;
    }
    if updated.balance_for_t_minus1 < 0.0 {
        updated.balance_for_t_minus1 = 0.0;
        pending_amount_for_t_minus1 = 0.0;
    }

    // A zero account cannot report a slash.
    if usr.balance_total_pre_staking + usr.balance_total_standard == 0.0 {
        slashed_amount = 0.0;
    }

    let total_amount = updated.total_balance();
    let (standard, pre_staking) = apply_pre_staking(
        total_amount,
        updated.pre_staking_allocation,
        updated.pre_staking_bonus,
    );
    updated.balance_total_standard = standard;
    updated.balance_total_pre_staking = pre_staking;
    let (minted_standard, minted_pre_staking) = apply_pre_staking(
        minted_amount,
        updated.pre_staking_allocation,
        updated.pre_staking_bonus,
    );
    let (slashed_standard, slashed_pre_staking) = apply_pre_staking(
        slashed_amount,
        updated.pre_staking_allocation,
        updated.pre_staking_bonus,
    );
    updated.balance_total_minted += minted_standard + minted_pre_staking;
    updated.balance_total_slashed += slashed_standard + slashed_pre_staking;
    updated.balance_last_updated_at = Some(now);

    MineOutcome {
        user: Some(updated),
        should_generate_history,
        id_t0_changed,
        pending_amount_for_t_minus1,
        pending_amount_for_t0,
    }
}

fn day_changed(last: DateTime<Utc>, now: DateTime<Utc>, development: bool) -> bool {
    last.year() != now.year()
        || last.ordinal() != now.ordinal()
        || (development && last.minute() != now.minute())
}
