//! Balance summary, ranking and the top-miners leaderboard.

use serde::{Deserialize, Serialize};

use glacier_core::constants::{DEFAULT_TOP_MINERS_LIMIT, MAX_PAGE_LIMIT};
use glacier_core::error::Error;
use glacier_core::traits::MinerRow;

use crate::state::ServiceState;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceSummary {
    pub total: String,
    pub total_no_pre_staking_bonus: String,
    pub standard: String,
    pub pre_staking: String,
    pub t1: String,
    pub t2: String,
    pub total_referrals: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingSummary {
    pub global_rank: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Miner {
    pub user_id: String,
    pub username: String,
    pub profile_picture_url: String,
    pub balance: String,
}

fn format_amount(amount: f64) -> String {
    format!("{amount:.2}")
}

impl ServiceState {
    pub async fn get_balance_summary(&self, user_id: &str) -> Result<BalanceSummary, Error> {
        let id = self.get_or_init_internal_id(user_id).await?;
        let usr = self
            .kv
            .get_user(id)
            .await?
            .ok_or(Error::RelationNotFound)?;

        Ok(BalanceSummary {
            total: format_amount(usr.balance_total_standard + usr.balance_total_pre_staking),
            total_no_pre_staking_bonus: format_amount(usr.total_balance()),
            standard: format_amount(usr.balance_total_standard),
            pre_staking: format_amount(usr.balance_total_pre_staking),
            t1: format_amount(usr.balance_t1),
            t2: format_amount(usr.balance_t2),
            total_referrals: format_amount(usr.balance_t0 + usr.balance_t1 + usr.balance_t2),
        })
    }

    pub async fn get_ranking_summary(&self, user_id: &str) -> Result<RankingSummary, Error> {
        let id = self.get_or_init_internal_id(user_id).await?;
        let usr = self
            .kv
            .get_user(id)
            .await?
            .ok_or(Error::RelationNotFound)?;
        if usr.hide_ranking {
            return Err(Error::GlobalRankHidden);
        }
        let global_rank = self.dwh.global_rank(id).await?.unwrap_or_default();

        Ok(RankingSummary { global_rank })
    }

    /// Paginated leaderboard. `next_offset` is 0 once the last page is reached.
    pub async fn get_top_miners(
        &self,
        keyword: &str,
        limit: u64,
        offset: u64,
    ) -> Result<(Vec<Miner>, u64), Error> {
        let limit = match limit {
            0 => DEFAULT_TOP_MINERS_LIMIT,
            n => n.min(MAX_PAGE_LIMIT),
        };
        let rows = self.dwh.top_miners(keyword, limit, offset).await?;
        let next_offset = if (rows.len() as u64) < limit {
            0
        } else {
            offset + rows.len() as u64
        };
        let miners = rows.into_iter().map(miner_from_row).collect();

        Ok((miners, next_offset))
    }
}

fn miner_from_row(row: MinerRow) -> Miner {
    Miner {
        user_id: row.user_id,
        username: row.username,
        profile_picture_url: row.profile_picture_url,
        balance: format_amount(row.balance),
    }
}
