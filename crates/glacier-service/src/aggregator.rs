//! Active-user counters, bucketed by the child aggregation interval.

use tracing::warn;

use glacier_core::config::Config;
use glacier_core::error::Error;

use crate::keys::{mining_session_dupl_guard_key, total_active_users_key, truncate};
use crate::sessions::MiningSessionStarted;
use crate::state::ServiceState;

/// Bucket keys a session start must increment.
///
/// Overlap rules: counting begins one child interval after the start for a
/// natural start or when the start falls in a fresh bucket; the end bucket is
/// skipped when it equals the previous session's end bucket, which already
/// counted it.
pub fn detect_incr_total_active_users_keys(
    cfg: &Config,
    session: &MiningSessionStarted,
) -> Vec<String> {
    let child = cfg.global_aggregation_interval.child();
    let mut keys = Vec::with_capacity(
        (cfg.mining_session_duration.max().num_seconds() / child.num_seconds().max(1)) as usize + 1,
    );
    let mut start = session.ended_at - session.extension();
    let end = session.ended_at;
    let previously_ended = session.previously_ended_at;

    let natural_start = session.last_natural_mining_started_at == session.started_at;
    let start_bucket_fresh = match previously_ended {
        Some(prev) => {
            total_active_users_key(cfg, session.started_at) != total_active_users_key(cfg, prev)
        }
        None => true,
    };
    if natural_start || start_bucket_fresh {
        start += child;
    }
    let mut start = truncate(start, child);
    let end = truncate(end, child);
    while start < end {
        keys.push(total_active_users_key(cfg, start));
        start += child;
    }
    let end_key = total_active_users_key(cfg, end);
    match previously_ended {
        Some(prev) if total_active_users_key(cfg, prev) == end_key => {}
        _ => keys.push(end_key),
    }

    keys
}

impl ServiceState {
    /// Increment every bucket the session covers, exactly once per session.
    ///
    /// A per-session NX guard provides the dedup; it is removed again if any
    /// increment fails so the operation can be retried.
    pub async fn increment_total_active_users(
        &self,
        session: &MiningSessionStarted,
    ) -> Result<(), Error> {
        let guard_key = mining_session_dupl_guard_key(
            "incr_total_active_users",
            &session.user_id,
            session.last_natural_mining_started_at,
        );
        let set = self
            .kv
            .set_nx(&guard_key, "", Some(self.cfg.mining_session_duration.min()))
            .await?;
        if !set {
            return Err(Error::Duplicate);
        }

        let keys = detect_incr_total_active_users_keys(&self.cfg, session);
        for key in &keys {
            if let Err(err) = self.kv.incr(key).await {
                warn!(%key, %err, "active-user increment failed, rolling back dedup guard");
                let compensation = self.kv.del(&guard_key).await;
                return Err(err.with_compensation(compensation));
            }
        }

        Ok(())
    }

    /// Active users in the bucket containing `now`.
    pub async fn total_active_users(
        &self,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<u64, Error> {
        self.kv
            .get_counter(&total_active_users_key(&self.cfg, now))
            .await
    }
}
