//! Balance-history reshaping: warehouse rows into nested parent/child entries.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use glacier_core::config::Config;
use glacier_core::constants::{DEFAULT_BALANCE_HISTORY_LIMIT, MAX_PAGE_LIMIT};
use glacier_core::error::Error;
use glacier_core::traits::BalanceHistoryRow;

use crate::keys::truncate;
use crate::state::ServiceState;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceHistoryBalanceDiff {
    /// Magnitude formatted with two decimals; sign carried by `negative`.
    pub amount: String,
    /// Percent change against the previous entry, rounded to two decimals.
    pub bonus: f64,
    pub negative: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceHistoryEntry {
    pub time: DateTime<Utc>,
    pub balance: BalanceHistoryBalanceDiff,
    pub time_series: Vec<BalanceHistoryEntry>,
}

/// Date window for a paginated history query: the parent dates to fetch plus
/// the inclusive `[not_before, not_after]` filter.
pub fn calculate_dates(
    cfg: &Config,
    limit: u64,
    offset: u64,
    start: DateTime<Utc>,
    end: Option<DateTime<Utc>>,
    factor: i64,
) -> (Vec<DateTime<Utc>>, DateTime<Utc>, DateTime<Utc>) {
    let interval = &cfg.global_aggregation_interval;
    let parent = interval.parent();
    let children = interval.children_per_parent();
    let calculated_limit = (limit / children) as i64;
    let calculated_offset = (offset / children) as i64;
    let base = truncate(start, parent);

    if factor >= 0 {
        let not_before = base + parent * calculated_offset as i32;
        let unbounded = not_before + parent * calculated_limit as i32;
        let not_after = match end.map(|e| truncate(e, parent)) {
            Some(end) if end < unbounded => end,
            _ => unbounded,
        };
        let dates = (0..calculated_limit)
            .map(|i| base + parent * (calculated_offset + i) as i32)
            .collect();
        (dates, not_before, not_after)
    } else {
        let not_after = base - parent * calculated_offset as i32;
        let not_before = not_after - parent * calculated_limit as i32;
        let dates = (0..calculated_limit)
            .map(|i| not_after - parent * i as i32)
            .collect();
        (dates, not_before, not_after)
    }
}

/// Reshape a contiguous child-bucketed series into nested parent entries.
///
/// Parent deltas compare against the previous parent over the whole series,
/// child deltas against the previous child inside the returned window. The
/// outer sequence is reversed when the query runs backwards in time.
pub fn process_balance_history(
    cfg: &Config,
    rows: &[BalanceHistoryRow],
    start_date_is_before_end_date: bool,
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
) -> Vec<BalanceHistoryEntry> {
    let interval = &cfg.global_aggregation_interval;
    let child = interval.child();
    let parent = interval.parent();

    // Child buckets, summed; then grouped under their parent bucket.
    let mut children: BTreeMap<DateTime<Utc>, (f64, f64)> = BTreeMap::new();
    for row in rows {
        let bucket = truncate(row.created_at, child);
        let entry = children.entry(bucket).or_insert((0.0, 0.0));
        entry.0 += row.balance_total_minted;
        entry.1 += row.balance_total_slashed;
    }
    let mut parents: BTreeMap<DateTime<Utc>, Vec<DateTime<Utc>>> = BTreeMap::new();
    for bucket in children.keys() {
        parents.entry(truncate(*bucket, parent)).or_default().push(*bucket);
    }

    // Parent deltas over the full series, filtered to the window afterwards.
    let mut previous_parent_amount: Option<f64> = None;
    let mut kept: Vec<(DateTime<Utc>, f64, bool, f64, Vec<DateTime<Utc>>)> = Vec::new();
    for (parent_time, child_times) in &parents {
        let minted: f64 = child_times.iter().map(|t| children[t].0).sum();
        let slashed: f64 = child_times.iter().map(|t| children[t].1).sum();
        let amount = minted - slashed;
        let bonus = percent_change(previous_parent_amount, amount);
        previous_parent_amount = Some(amount);
        if *parent_time >= not_before && *parent_time <= not_after {
            kept.push((*parent_time, amount, slashed > minted, bonus, child_times.clone()));
        }
    }

    // Child deltas only see the window.
    let mut previous_child_amount: Option<f64> = None;
    let mut entries: Vec<BalanceHistoryEntry> = Vec::with_capacity(kept.len());
    for (parent_time, amount, negative, bonus, child_times) in kept {
        let time_series = child_times
            .iter()
            .map(|t| {
                let (minted, slashed) = children[t];
                let child_amount = minted - slashed;
                let child_bonus = percent_change(previous_child_amount, child_amount);
                previous_child_amount = Some(child_amount);
                BalanceHistoryEntry {
                    time: *t,
                    balance: BalanceHistoryBalanceDiff {
                        amount: format!("{:.2}", child_amount.abs()),
                        bonus: child_bonus,
                        negative: slashed > minted,
                    },
                    time_series: Vec::new(),
                }
            })
            .collect();
        entries.push(BalanceHistoryEntry {
            time: parent_time,
            balance: BalanceHistoryBalanceDiff {
                amount: format!("{:.2}", amount.abs()),
                bonus,
                negative,
            },
            time_series,
        });
    }

    if !start_date_is_before_end_date {
        entries.reverse();
    }

    entries
}

fn percent_change(previous: Option<f64>, current: f64) -> f64 {
    match previous {
        Some(prev) if prev != 0.0 => round2((current - prev) * 100.0 / prev.abs()),
        _ => 0.0,
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

impl ServiceState {
    /// Paginated balance history for the user, shifted into the caller's
    /// timezone.
    pub async fn get_balance_history(
        &self,
        user_id: &str,
        start_date: Option<DateTime<Utc>>,
        end_date: Option<DateTime<Utc>>,
        utc_offset_minutes: i64,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<BalanceHistoryEntry>, Error> {
        let id = self.get_or_init_internal_id(user_id).await?;
        let limit = match limit {
            0 => DEFAULT_BALANCE_HISTORY_LIMIT,
            n => n.min(MAX_PAGE_LIMIT),
        };
        let tz = chrono::Duration::minutes(utc_offset_minutes);
        let now = Utc::now();
        let start = start_date.unwrap_or(now) + tz;
        let end = end_date.map(|e| e + tz);
        let factor = match end {
            Some(end) if end < start => -1,
            _ => 1,
        };

        let (dates, not_before, not_after) =
            calculate_dates(&self.cfg, limit, offset, start, end, factor);
        if dates.is_empty() {
            return Ok(Vec::new());
        }
        let rows = self.dwh.balance_history(id, &dates).await?;

        Ok(process_balance_history(
            &self.cfg,
            &rows,
            factor >= 0,
            not_before,
            not_after,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn cfg() -> Config {
        Config::default()
    }

    fn at(mo: u32, d: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, mo, d, h, m, 10).unwrap()
    }

    fn day(mo: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, mo, d, 0, 0, 0).unwrap()
    }

    // --- calculate_dates (parent 24h, child 1h) ---

    #[test]
    fn dates_forward_limit_one_parent() {
        let (dates, not_before, not_after) =
            calculate_dates(&cfg(), 24, 0, at(6, 5, 5, 15), Some(at(6, 7, 5, 15)), 1);
        assert_eq!(dates, vec![day(6, 5)]);
        assert_eq!(not_before, day(6, 5));
        assert_eq!(not_after, day(6, 6));
    }

    #[test]
    fn dates_forward_sub_parent_limit_is_empty() {
        let (dates, not_before, not_after) =
            calculate_dates(&cfg(), 12, 0, at(6, 5, 0, 0), Some(at(6, 7, 0, 0)), 1);
        assert!(dates.is_empty());
        assert_eq!(not_before, day(6, 5));
        assert_eq!(not_after, day(6, 5));
    }

    #[test]
    fn dates_forward_partial_second_parent_truncates() {
        let (dates, not_before, not_after) =
            calculate_dates(&cfg(), 36, 0, at(6, 5, 5, 15), Some(at(6, 7, 5, 15)), 1);
        assert_eq!(dates, vec![day(6, 5)]);
        assert_eq!(not_before, day(6, 5));
        assert_eq!(not_after, day(6, 6));
    }

    #[test]
    fn dates_forward_bounded_by_end() {
        let (dates, not_before, not_after) =
            calculate_dates(&cfg(), 48, 0, at(6, 5, 5, 15), Some(at(6, 6, 5, 15)), 1);
        assert_eq!(dates, vec![day(6, 5), day(6, 6)]);
        assert_eq!(not_before, day(6, 5));
        assert_eq!(not_after, day(6, 6));
    }

    #[test]
    fn dates_backward_limit_one_parent() {
        let (dates, not_before, not_after) =
            calculate_dates(&cfg(), 24, 0, at(6, 5, 5, 15), None, -1);
        assert_eq!(dates, vec![day(6, 5)]);
        assert_eq!(not_before, day(6, 4));
        assert_eq!(not_after, day(6, 5));
    }

    #[test]
    fn dates_backward_offset_shifts_window() {
        let (dates, not_before, not_after) =
            calculate_dates(&cfg(), 24, 24, at(6, 5, 5, 15), None, -1);
        assert_eq!(dates, vec![day(6, 4)]);
        assert_eq!(not_before, day(6, 3));
        assert_eq!(not_after, day(6, 4));
    }

    #[test]
    fn dates_forward_offset_shifts_window() {
        let (dates, not_before, not_after) =
            calculate_dates(&cfg(), 24, 24, at(6, 5, 5, 15), Some(at(6, 7, 5, 15)), 1);
        assert_eq!(dates, vec![day(6, 6)]);
        assert_eq!(not_before, day(6, 6));
        assert_eq!(not_after, day(6, 7));
    }

    #[test]
    fn dates_backward_two_parents_descending() {
        let (dates, not_before, not_after) =
            calculate_dates(&cfg(), 48, 48, at(6, 5, 5, 15), Some(at(6, 5, 5, 15)), -1);
        assert_eq!(dates, vec![day(6, 3), day(6, 2)]);
        assert_eq!(not_before, day(6, 1));
        assert_eq!(not_after, day(6, 3));
    }

    // --- process_balance_history ---

    fn row(created_at: DateTime<Utc>, minted: f64, slashed: f64) -> BalanceHistoryRow {
        BalanceHistoryRow {
            created_at,
            balance_total_minted: minted,
            balance_total_slashed: slashed,
        }
    }

    /// Six daily rows ending the day before `now`, oldest slashed.
    fn week_history(now: DateTime<Utc>) -> Vec<BalanceHistoryRow> {
        let parent = Duration::hours(24);
        vec![
            row(truncate(now - parent, parent), 25.0, 0.0),
            row(truncate(now - parent * 2, parent), 28.0, 0.0),
            row(truncate(now - parent * 3, parent), 32.0, 0.0),
            row(truncate(now - parent * 4, parent), 31.0, 0.0),
            row(truncate(now - parent * 5, parent), 25.0, 0.0),
            row(truncate(now - parent * 6, parent), 0.0, 17.0),
        ]
    }

    #[test]
    fn history_forward_with_wide_window() {
        let now = at(6, 5, 5, 15);
        let entries = process_balance_history(
            &cfg(),
            &week_history(now),
            true,
            now - Duration::hours(24) * 10,
            now,
        );
        let amounts: Vec<&str> =
            entries.iter().map(|e| e.balance.amount.as_str()).collect();
        assert_eq!(amounts, vec!["17.00", "25.00", "31.00", "32.00", "28.00", "25.00"]);
        assert!(entries[0].balance.negative);
        assert_eq!(entries[0].balance.bonus, 0.0);
        assert_eq!(entries[1].balance.bonus, 247.06);
        assert_eq!(entries[2].balance.bonus, 24.0);
        assert_eq!(entries[3].balance.bonus, 3.23);
        assert_eq!(entries[4].balance.bonus, -12.5);
        assert_eq!(entries[5].balance.bonus, -10.71);
        // Single child per parent carries the same amount.
        assert_eq!(entries[1].time_series.len(), 1);
        assert_eq!(entries[1].time_series[0].balance.amount, "25.00");
        assert_eq!(entries[1].time_series[0].balance.bonus, 247.06);
    }

    #[test]
    fn history_narrow_window_keeps_full_series_parent_bonus() {
        let now = at(6, 5, 5, 15);
        let parent = Duration::hours(24);
        let entries = process_balance_history(
            &cfg(),
            &week_history(now),
            true,
            truncate(now - parent * 5, parent),
            truncate(now, parent),
        );
        assert_eq!(entries.len(), 5);
        // Parent bonus still computed against the filtered-out previous day.
        assert_eq!(entries[0].balance.amount, "25.00");
        assert_eq!(entries[0].balance.bonus, 247.06);
        // The first child in the window has no predecessor to compare against.
        assert_eq!(entries[0].time_series[0].balance.bonus, 0.0);
        assert_eq!(entries[1].time_series[0].balance.bonus, 24.0);
    }

    #[test]
    fn history_backward_reverses_outer_sequence() {
        let now = at(6, 5, 5, 15);
        let forward = process_balance_history(
            &cfg(),
            &week_history(now),
            true,
            now - Duration::hours(24) * 10,
            now,
        );
        let backward = process_balance_history(
            &cfg(),
            &week_history(now),
            false,
            now - Duration::hours(24) * 10,
            now,
        );
        let mut reversed = backward.clone();
        reversed.reverse();
        let forward_times: Vec<_> = forward.iter().map(|e| e.time).collect();
        let reversed_times: Vec<_> = reversed.iter().map(|e| e.time).collect();
        assert_eq!(forward_times, reversed_times);
        // Bonuses stay chronological regardless of direction.
        assert_eq!(backward[0].balance.bonus, forward[forward.len() - 1].balance.bonus);
    }

    #[test]
    fn history_child_equal_to_parent() {
        let mut config = cfg();
        config.global_aggregation_interval.child_secs = 24 * 3600;
        let now = day(6, 1);
        let child = Duration::hours(24);
        let rows = vec![
            row(now, 25.0, 0.0),
            row(now - child, 28.0, 0.0),
            row(now - child * 2, 28.0, 0.0),
        ];
        let entries = process_balance_history(&config, &rows, true, now - child * 24, now);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].time, day(5, 30));
        assert_eq!(entries[0].balance.bonus, 0.0);
        assert_eq!(entries[1].balance.bonus, 0.0);
        assert_eq!(entries[2].balance.amount, "25.00");
        assert_eq!(entries[2].balance.bonus, -10.71);
        assert_eq!(entries[2].time_series[0].balance.bonus, -10.71);
    }

    #[test]
    fn hourly_children_aggregate_under_parents() {
        let config = cfg();
        let base = day(6, 1);
        let rows = vec![
            row(base + Duration::hours(1), 5.0, 0.0),
            row(base + Duration::hours(2), 7.0, 1.0),
            row(base + Duration::hours(26), 10.0, 0.0),
        ];
        let entries = process_balance_history(&config, &rows, true, base, base + Duration::hours(48));
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].balance.amount, "11.00");
        assert_eq!(entries[0].time_series.len(), 2);
        assert_eq!(entries[1].balance.amount, "10.00");
        // 11 -> 10 across parents: -9.09%.
        assert_eq!(entries[1].balance.bonus, -9.09);
    }
}
