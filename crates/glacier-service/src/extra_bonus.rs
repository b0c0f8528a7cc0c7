//! Extra-bonus claims.
//!
//! The outward HTTP path is always disabled; the internal claim stays behind
//! `Config::extra_bonus_claim_enabled` for operational use.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use glacier_core::error::Error;
use glacier_core::traits::WriteGuard;

use glacier_engine::bonus::is_extra_bonus_available;

use crate::state::ServiceState;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtraBonusSummary {
    pub available_extra_bonus: u16,
}

impl ServiceState {
    /// Claim the extra bonus for the current cycle, if the user's slot is open.
    pub async fn claim_extra_bonus(&self, user_id: &str) -> Result<ExtraBonusSummary, Error> {
        if !self.cfg.extra_bonus_claim_enabled
            || self.cfg.extra_bonuses.kyc_passed_extra_bonus == 0
        {
            return Err(Error::NotFound);
        }
        let id = self.get_or_init_internal_id(user_id).await?;
        let mut usr = self
            .kv
            .get_user(id)
            .await?
            .ok_or(Error::RelationNotFound)?;

        let now = Utc::now();
        let guard = WriteGuard::IfBalanceUpdatedAt(usr.balance_last_updated_at);
        if !is_extra_bonus_available(
            now,
            self.extra_bonus_start_date(),
            &mut usr,
            &self.cfg.extra_bonuses,
        ) {
            return Err(Error::NotFound);
        }

        usr.extra_bonus_started_at = Some(now);
        usr.extra_bonus = self.cfg.extra_bonuses.kyc_passed_extra_bonus;
        self.kv.save_user(&usr, guard).await?;

        Ok(ExtraBonusSummary {
            available_extra_bonus: usr.extra_bonus,
        })
    }
}
