//! Time and rate primitives: base-mining-rate halving, the pre-staking split,
//! and mining-session window derivation.

use chrono::{DateTime, Duration, Utc};

use glacier_core::config::Adoption;
use glacier_core::types::Timestamp;

/// Base mining rate at `now` for an account created at `created_at`.
///
/// The rate starts at `starting_base_mining_rate` and halves at every
/// adoption milestone, capped at `milestones` halvings. Accounts with no
/// creation date, or created at/after `now`, earn the starting rate.
pub fn base_mining_rate(now: DateTime<Utc>, created_at: Timestamp, adoption: &Adoption) -> f64 {
    let created_at = match created_at {
        Some(t) if t < now => t,
        _ => return adoption.starting_base_mining_rate,
    };
    let between = adoption.duration_between_milestones().num_seconds();
    if between <= 0 {
        return adoption.starting_base_mining_rate;
    }
    let elapsed = now.signed_duration_since(created_at).num_seconds();
    let k = (elapsed / between).min(adoption.milestones as i64);
    adoption.starting_base_mining_rate / 2f64.powi(k as i32)
}

/// Split `total` into `(standard, pre_staking)` according to the pre-staking
/// election.
///
/// `allocation` is a percentage in `[0, 100]`; `bonus` the tier multiplier
/// percentage. Both outputs are non-negative for non-negative input.
pub fn apply_pre_staking(total: f64, allocation: f64, bonus: f64) -> (f64, f64) {
    let pre_staking = total * (allocation / 100.0) * (1.0 + bonus / 100.0);
    let standard = total * (1.0 - allocation / 100.0);
    (standard, pre_staking)
}

/// One stride of a (possibly boost-extended) mining session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionWindow {
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

/// Walk forward from `started_at` in strides of `max_dur` and return the
/// window containing `now`, or `None` once past `ended_at`.
pub fn calculate_mining_session(
    now: DateTime<Utc>,
    started_at: Timestamp,
    ended_at: Timestamp,
    max_dur: Duration,
) -> Option<SessionWindow> {
    let (started_at, ended_at) = (started_at?, ended_at?);
    if now < started_at || now >= ended_at || max_dur <= Duration::zero() {
        return None;
    }
    let strides = now.signed_duration_since(started_at).num_seconds() / max_dur.num_seconds();
    let window_start = started_at + Duration::seconds(strides * max_dur.num_seconds());
    Some(SessionWindow {
        started_at: window_start,
        ended_at: window_start + max_dur,
    })
}
