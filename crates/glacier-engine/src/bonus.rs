//! Extra-bonus availability windowing.
//!
//! Claims are staggered: the user population is split into chunks and each
//! chunk's slot opens at a fixed offset within the daily availability window,
//! evaluated in the user's local time.

use chrono::{DateTime, Duration, Timelike, Utc};

use glacier_core::config::ExtraBonuses;
use glacier_core::user::User;

/// Check whether the user can claim the extra bonus right now and, if so,
/// advance the claim cursor on the record.
///
/// All five gates must hold:
/// 1. the user's chunk has a slot in the schedule,
/// 2. the current cycle has not been claimed yet,
/// 3. the local hour is inside the notification window,
/// 4. the previous availability window has fully elapsed,
/// 5. the chunk-specific slot offset has been reached.
pub fn is_extra_bonus_available(
    now: DateTime<Utc>,
    start_date: DateTime<Utc>,
    usr: &mut User,
    cfg: &ExtraBonuses,
) -> bool {
    if cfg.chunk_count == 0 {
        return false;
    }
    let tz = Duration::minutes(usr.utc_offset);
    let local_now = now + tz;
    let local_start = start_date + tz;
    if local_now < local_start {
        return false;
    }

    let cycle = cfg.duration().num_seconds().max(1);
    let current_index = 1 + local_now.signed_duration_since(local_start).num_seconds() / cycle;
    if let Some(prev) = usr.extra_bonus_index {
        if prev as i64 >= current_index {
            return false;
        }
    }

    let hour = local_now.hour();
    if hour < cfg.notify_hour_start || hour > cfg.notify_hour_end {
        return false;
    }

    if let Some(last) = usr.extra_bonus_last_claim_available_at {
        if now < last + cfg.availability_window() {
            return false;
        }
    }

    let chunk = (usr.internal_id.unsigned_abs() % cfg.chunk_count as u64) as i64;
    let stagger_secs = (cfg.availability_window() - cfg.claim_window()).num_seconds() * chunk
        / cfg.chunk_count as i64;
    let cycle_start = local_start + Duration::seconds((current_index - 1) * cycle);
    let slot_opens = cycle_start
        + Duration::hours(cfg.notify_hour_start as i64)
        + Duration::seconds(stagger_secs.max(0));
    if local_now < slot_opens {
        return false;
    }

    let last_index = usr.extra_bonus_index.unwrap_or(0) as i64;
    usr.extra_bonus_days_claim_not_available = (current_index - last_index - 1).max(0) as u16;
    usr.extra_bonus_index = Some(current_index as u16);
    usr.extra_bonus_last_claim_available_at = Some(now);
    true
}
