//! Pre-staking election: summary and the monotonic internal transition.
//!
//! The outward HTTP path is disabled; the transition stays reachable for
//! internal mutators (boost finalization sets the allocation directly).

use serde::{Deserialize, Serialize};

use glacier_core::constants::MAX_PRE_STAKING_YEARS;
use glacier_core::error::Error;
use glacier_core::traits::WriteGuard;
use glacier_core::types::{pre_staking_bonus_for_years, pre_staking_years_for_bonus};

use crate::state::ServiceState;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreStakingSummary {
    pub years: u64,
    pub allocation: f64,
    pub bonus: f64,
}

impl ServiceState {
    pub async fn get_pre_staking_summary(&self, user_id: &str) -> Result<PreStakingSummary, Error> {
        let id = self.get_or_init_internal_id(user_id).await?;
        let usr = self
            .kv
            .get_user(id)
            .await?
            .ok_or(Error::RelationNotFound)?;
        if usr.pre_staking_allocation == 0.0 {
            return Err(Error::NotFound);
        }

        Ok(PreStakingSummary {
            years: pre_staking_years_for_bonus(usr.pre_staking_bonus).unwrap_or_default(),
            allocation: usr.pre_staking_allocation,
            bonus: usr.pre_staking_bonus,
        })
    }

    /// Raise (never lower) the user's pre-staking commitment.
    pub async fn start_or_update_pre_staking(
        &self,
        user_id: &str,
        years: u64,
        allocation: f64,
    ) -> Result<PreStakingSummary, Error> {
        let years = years.min(MAX_PRE_STAKING_YEARS);
        let allocation = allocation.min(100.0);
        let id = self.get_or_init_internal_id(user_id).await?;
        let mut usr = self
            .kv
            .get_user(id)
            .await?
            .ok_or(Error::RelationNotFound)?;

        let current_years = pre_staking_years_for_bonus(usr.pre_staking_bonus).unwrap_or_default();
        if years < current_years || allocation < usr.pre_staking_allocation {
            return Err(Error::DecreasingPreStakingNotAllowed);
        }

        let bonus = pre_staking_bonus_for_years(years);
        let guard = WriteGuard::IfBalanceUpdatedAt(usr.balance_last_updated_at);
        usr.pre_staking_allocation = allocation;
        usr.pre_staking_bonus = bonus;
        self.kv.save_user(&usr, guard).await?;

        Ok(PreStakingSummary {
            years,
            allocation,
            bonus,
        })
    }
}
