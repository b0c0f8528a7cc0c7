//! The per-user accrual step: materialize snapshots, run the pure engine,
//! persist atomically, propagate referrer pendings, emit day-off events.

use chrono::Utc;
use tracing::warn;

use glacier_core::error::Error;
use glacier_core::traits::WriteGuard;
use glacier_core::user::{Referral, User};

use glacier_engine::mine::mine;
use glacier_engine::session::did_a_new_day_off_just_start;

use crate::state::ServiceState;

fn referral_snapshot(usr: &User) -> Referral {
    Referral {
        internal_id: usr.internal_id,
        id_t0: usr.id_t0,
        mining_session_solo_ended_at: usr.mining_session_solo_ended_at,
        balance_last_updated_at: usr.balance_last_updated_at,
        balance_solo: usr.balance_solo,
        balance_t0: usr.balance_t0,
        balance_t1: usr.balance_t1,
        balance_t2: usr.balance_t2,
        mining_boost_level_index: usr.mining_boost_level_index,
    }
}

impl ServiceState {
    /// Advance one user's balance state to now.
    ///
    /// Returns the persisted record, or `None` when the engine decided no
    /// write was needed. Outward pending amounts land in the referrers'
    /// pending buffers, to be folded by their own next step.
    pub async fn mine_user(&self, internal_id: i64) -> Result<Option<User>, Error> {
        let now = Utc::now();
        let Some(usr) = self.kv.get_user(internal_id).await? else {
            return Ok(None);
        };
        let levels = self.levels();

        let t0 = match usr.id_t0 {
            0 => None,
            id => self.kv.get_user(id.abs()).await?.map(|u| referral_snapshot(&u)),
        };
        let t_minus1 = match usr.id_t_minus1 {
            0 => None,
            id => self.kv.get_user(id.abs()).await?.map(|u| referral_snapshot(&u)),
        };

        let day_off = did_a_new_day_off_just_start(now, &usr, &self.cfg, &levels);

        let guard = WriteGuard::IfBalanceUpdatedAt(usr.balance_last_updated_at);
        let outcome = mine(now, Some(&usr), t0.as_ref(), t_minus1.as_ref(), &self.cfg, &levels);

        if let Some(updated) = &outcome.user {
            self.kv.save_user(updated, guard).await?;
        }

        if outcome.pending_amount_for_t0 != 0.0 {
            if let Some(t0) = &t0 {
                self.add_pending_t1(t0.internal_id, outcome.pending_amount_for_t0).await?;
            }
        }
        if outcome.pending_amount_for_t_minus1 != 0.0 {
            if let Some(t_minus1) = &t_minus1 {
                self.add_pending_t2(t_minus1.internal_id, outcome.pending_amount_for_t_minus1)
                    .await?;
            }
        }

        if let Some(event) = day_off {
            if let Some(topic) = self.cfg.bus_topics.get(self.cfg.day_off_topic) {
                let payload = serde_json::to_vec(&event)
                    .map_err(|err| Error::Unexpected(err.to_string()))?;
                if let Err(err) = self.bus.publish(topic, &event.user_id, payload).await {
                    warn!(user_id = %event.user_id, %err, "failed to publish day-off event");
                }
            }
        }

        Ok(outcome.user)
    }

    async fn add_pending_t1(&self, internal_id: i64, amount: f64) -> Result<(), Error> {
        let Some(mut referrer) = self.kv.get_user(internal_id).await? else {
            return Ok(());
        };
        referrer.balance_t1_pending += amount;
        self.kv.save_user(&referrer, WriteGuard::Unconditional).await
    }

    async fn add_pending_t2(&self, internal_id: i64, amount: f64) -> Result<(), Error> {
        let Some(mut referrer) = self.kv.get_user(internal_id).await? else {
            return Ok(());
        };
        referrer.balance_t2_pending += amount;
        self.kv.save_user(&referrer, WriteGuard::Unconditional).await
    }
}
