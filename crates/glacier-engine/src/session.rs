//! Mining-session lifecycle math: day-off detection, streaks, and the
//! free-session allowance.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use glacier_core::config::{Config, MiningBoostLevel};
use glacier_core::types::Timestamp;
use glacier_core::user::User;

use crate::rate::calculate_mining_session;

/// Event published when a full session interval elapsed without the user
/// refreshing their balance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayOffStarted {
    pub id: String,
    pub user_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub remaining_free_mining_sessions: u64,
    pub mining_streak: u64,
}

/// Consecutive completed session intervals within the live session.
pub fn calculate_mining_streak(
    now: DateTime<Utc>,
    started_at: Timestamp,
    ended_at: Timestamp,
    max_dur: chrono::Duration,
) -> u64 {
    let (Some(started_at), Some(ended_at)) = (started_at, ended_at) else {
        return 0;
    };
    if now < started_at || now > ended_at || max_dur <= chrono::Duration::zero() {
        return 0;
    }
    (now.signed_duration_since(started_at).num_seconds() / max_dur.num_seconds()) as u64
}

/// Artificial session extensions the user still has banked.
///
/// With an active boost the allowance is measured against the boosted window
/// that contains `now`; otherwise it is simply the time left divided by the
/// standard maximum.
pub fn calculate_remaining_free_mining_sessions(
    now: DateTime<Utc>,
    usr: &User,
    cfg: &Config,
    levels: &[MiningBoostLevel],
) -> u64 {
    let start = usr.mining_session_solo_last_started_at;
    let Some(end) = usr.mining_session_solo_ended_at else {
        return 0;
    };
    if now > end {
        return 0;
    }

    let max_mining_session = usr.max_mining_session_duration(cfg, levels);
    if max_mining_session > cfg.mining_session_duration.max() {
        let Some(window) = calculate_mining_session(now, start, Some(end), max_mining_session)
        else {
            return 0;
        };
        if end < window.ended_at {
            return 0;
        }
        return (end.signed_duration_since(window.ended_at).num_seconds()
            / cfg.mining_session_duration.max().num_seconds()) as u64;
    }

    (end.signed_duration_since(now).num_seconds()
        / cfg.mining_session_duration.max().num_seconds()) as u64
}

/// Detect whether a new day-off interval just began for the user.
///
/// Fires when the natural session window has fully elapsed, the overall
/// session is still running, and the balance has not been refreshed since the
/// bucketed interval start.
pub fn did_a_new_day_off_just_start(
    now: DateTime<Utc>,
    usr: &User,
    cfg: &Config,
    levels: &[MiningBoostLevel],
) -> Option<DayOffStarted> {
    usr.mining_session_solo_started_at?;
    let ended = usr.mining_session_solo_ended_at?;
    let last_started = usr.mining_session_solo_last_started_at?;
    let balance_last_updated = usr.balance_last_updated_at?;

    let max_dur = usr.max_mining_session_duration(cfg, levels);
    let natural_ended_at = last_started + max_dur;
    if ended < now || natural_ended_at > now {
        return None;
    }

    let stride = cfg.mining_session_duration.max().num_seconds();
    let buckets = now.signed_duration_since(natural_ended_at).num_seconds() / stride;
    let day_off_started_at = natural_ended_at + chrono::Duration::seconds(buckets * stride);
    if balance_last_updated > day_off_started_at {
        return None;
    }

    Some(DayOffStarted {
        id: format!(
            "{}~{}",
            usr.user_id,
            day_off_started_at.timestamp_nanos_opt().unwrap_or_default()
                / cfg.mining_session_duration.max().num_nanoseconds().unwrap_or(1)
        ),
        user_id: usr.user_id.clone(),
        started_at: day_off_started_at,
        ended_at: day_off_started_at + cfg.mining_session_duration.max(),
        remaining_free_mining_sessions: calculate_remaining_free_mining_sessions(
            now, usr, cfg, levels,
        ),
        mining_streak: calculate_mining_streak(
            now,
            usr.mining_session_solo_started_at,
            usr.mining_session_solo_ended_at,
            cfg.mining_session_duration.max(),
        ),
    })
}
