//! Global total-coins time-series.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use glacier_core::config::Config;
use glacier_core::constants::{DEFAULT_TOTAL_COINS_DAYS, MAX_TOTAL_COINS_DAYS};
use glacier_core::error::Error;

use crate::keys::truncate;
use crate::state::ServiceState;

/// One entry of the externally sourced coins-added feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoinsAdded {
    pub date: DateTime<Utc>,
    pub coins_added: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TotalCoins {
    pub total: f64,
    pub blockchain: f64,
    pub standard: f64,
    pub pre_staking: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TotalCoinsTimeSeriesDataPoint {
    pub date: DateTime<Utc>,
    #[serde(flatten)]
    pub coins: TotalCoins,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TotalCoinsSummary {
    #[serde(flatten)]
    pub coins: TotalCoins,
    pub time_series: Vec<TotalCoinsTimeSeriesDataPoint>,
}

/// The `days` parent-bucket dates ending at `now`, newest first.
pub fn total_coins_dates(cfg: &Config, now: DateTime<Utc>, days: u64) -> Vec<DateTime<Utc>> {
    let parent = cfg.global_aggregation_interval.parent();
    let anchor = truncate(now, parent);
    (0..days).map(|i| anchor - parent * i as i32).collect()
}

/// Fold the coins-added feed into the blockchain column.
///
/// An entry contributes to the newest point whose date is not older than the
/// entry, and to every point newer than that one, so each point carries the
/// running total of everything added up to it.
pub fn enhance_with_blockchain_coin_stats(
    points: &mut [TotalCoinsTimeSeriesDataPoint],
    history: &[CoinsAdded],
) {
    for entry in history {
        let anchor = points.iter().rposition(|p| p.date >= entry.date);
        if let Some(anchor) = anchor {
            for point in &mut points[..=anchor] {
                point.coins.blockchain += entry.coins_added;
            }
        }
    }
}

impl ServiceState {
    /// Daily total-coins data points ending now, newest first, padded with
    /// zeros for absent days.
    pub async fn get_total_coins_summary(
        &self,
        days: u64,
        utc_offset_minutes: i64,
    ) -> Result<TotalCoinsSummary, Error> {
        let days = match days {
            0 => DEFAULT_TOTAL_COINS_DAYS,
            n => n.min(MAX_TOTAL_COINS_DAYS),
        };
        let now = Utc::now() + Duration::minutes(utc_offset_minutes);
        let dates = total_coins_dates(&self.cfg, now, days);
        let rows = self.dwh.total_coins(&dates).await?;

        let parent = self.cfg.global_aggregation_interval.parent();
        let mut points: Vec<TotalCoinsTimeSeriesDataPoint> = dates
            .iter()
            .map(|date| {
                let coins = rows
                    .iter()
                    .find(|row| truncate(row.created_at, parent) == *date)
                    .map(|row| TotalCoins {
                        total: row.total,
                        blockchain: row.blockchain,
                        standard: row.standard,
                        pre_staking: row.pre_staking,
                    })
                    .unwrap_or_default();
                TotalCoinsTimeSeriesDataPoint { date: *date, coins }
            })
            .collect();

        let history = self.coins_added_history();
        enhance_with_blockchain_coin_stats(&mut points, &history);

        let coins = points.first().map(|p| p.coins).unwrap_or_default();
        Ok(TotalCoinsSummary {
            coins,
            time_series: points,
        })
    }
}
