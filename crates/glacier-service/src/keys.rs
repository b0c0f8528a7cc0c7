//! Key formats and time-bucket layouts for the KV store.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};

use glacier_core::config::Config;
use glacier_core::constants::{
    DAY_FORMAT, HOUR_FORMAT, MINUTE_FORMAT, TOTAL_ACTIVE_USERS_KEY_PREFIX,
};

/// Counter behind the monotonic internal-ID allocator.
pub const USERS_SERIAL_COUNTER_KEY: &str = "users_serial_counter";

pub fn serialized_users_key(internal_id: i64) -> String {
    format!("users:{internal_id}")
}

pub fn user_id_mapping_key(user_id: &str) -> String {
    format!("user_ids:{user_id}")
}

pub fn mining_boost_upgrade_key(internal_id: i64) -> String {
    format!("mining_boost_upgrades:{internal_id}")
}

pub fn mining_boost_finalize_mutex_key(internal_id: i64) -> String {
    format!("mining_boost_finalize_mutex:{internal_id}")
}

pub fn mining_session_dupl_guard_key(purpose: &str, user_id: &str, started_at: DateTime<Utc>) -> String {
    format!("{purpose}_dupl_guards:{user_id}~{}", started_at.timestamp())
}

pub fn news_seen_dupl_guard_key(user_id: &str, news_id: &str) -> String {
    format!("news_seen_dupl_guards:{user_id}~{news_id}")
}

/// Truncate an instant down to a multiple of `interval` since the epoch.
pub fn truncate(t: DateTime<Utc>, interval: Duration) -> DateTime<Utc> {
    let secs = interval.num_seconds();
    if secs <= 0 {
        return t;
    }
    let ts = t.timestamp();
    Utc.timestamp_opt(ts - ts.rem_euclid(secs), 0).single().unwrap_or(t)
}

/// Bucket layout for the configured child aggregation interval.
pub fn child_bucket_format(cfg: &Config) -> &'static str {
    let child = cfg.global_aggregation_interval.child();
    if child < Duration::hours(1) {
        MINUTE_FORMAT
    } else if child < Duration::hours(24) {
        HOUR_FORMAT
    } else {
        DAY_FORMAT
    }
}

/// Counter key for the active-user bucket containing `date`.
pub fn total_active_users_key(cfg: &Config, date: DateTime<Utc>) -> String {
    format!(
        "{TOTAL_ACTIVE_USERS_KEY_PREFIX}:{}",
        date.format(child_bucket_format(cfg))
    )
}

/// Recover the bucket timestamp from an active-user counter key.
pub fn extract_time_from_total_active_users_key(
    cfg: &Config,
    key: &str,
) -> Option<DateTime<Utc>> {
    let raw = key.strip_prefix(TOTAL_ACTIVE_USERS_KEY_PREFIX)?.strip_prefix(':')?;
    let format = child_bucket_format(cfg);
    let naive = match format {
        DAY_FORMAT => NaiveDate::parse_from_str(raw, DAY_FORMAT)
            .ok()?
            .and_hms_opt(0, 0, 0)?,
        HOUR_FORMAT => {
            NaiveDateTime::parse_from_str(&format!("{raw}:00"), &format!("{HOUR_FORMAT}:%M"))
                .ok()?
        }
        _ => NaiveDateTime::parse_from_str(raw, MINUTE_FORMAT).ok()?,
    };
    Some(Utc.from_utc_datetime(&naive))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use glacier_core::config::GlobalAggregationInterval;

    fn at(d: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 6, d, h, m, 0).unwrap()
    }

    fn cfg_with_child(child_secs: u64) -> Config {
        Config {
            global_aggregation_interval: GlobalAggregationInterval {
                parent_secs: 24 * 3600,
                child_secs,
            },
            ..Config::default()
        }
    }

    #[test]
    fn user_keys_are_stable() {
        assert_eq!(serialized_users_key(42), "users:42");
        assert_eq!(user_id_mapping_key("did:x:1"), "user_ids:did:x:1");
        assert_eq!(mining_boost_upgrade_key(7), "mining_boost_upgrades:7");
    }

    #[test]
    fn truncate_snaps_to_interval() {
        assert_eq!(truncate(at(5, 10, 15), Duration::hours(1)), at(5, 10, 0));
        assert_eq!(truncate(at(5, 10, 15), Duration::hours(24)), at(5, 0, 0));
        assert_eq!(truncate(at(5, 0, 0), Duration::hours(24)), at(5, 0, 0));
    }

    #[test]
    fn bucket_format_follows_child_width() {
        assert_eq!(child_bucket_format(&cfg_with_child(60)), MINUTE_FORMAT);
        assert_eq!(child_bucket_format(&cfg_with_child(3600)), HOUR_FORMAT);
        assert_eq!(child_bucket_format(&cfg_with_child(24 * 3600)), DAY_FORMAT);
    }

    #[test]
    fn active_users_key_hourly() {
        let cfg = cfg_with_child(3600);
        assert_eq!(
            total_active_users_key(&cfg, at(5, 11, 30)),
            "TOTAL_ACTIVE_USERS:2023-06-05T11"
        );
    }

    #[test]
    fn active_users_key_roundtrip() {
        for child_secs in [60, 3600, 24 * 3600] {
            let cfg = cfg_with_child(child_secs);
            let bucket = truncate(at(5, 11, 30), Duration::seconds(child_secs as i64));
            let key = total_active_users_key(&cfg, bucket);
            assert_eq!(
                extract_time_from_total_active_users_key(&cfg, &key),
                Some(bucket),
                "child_secs={child_secs}"
            );
        }
    }

    #[test]
    fn extract_rejects_foreign_keys() {
        let cfg = cfg_with_child(3600);
        assert_eq!(extract_time_from_total_active_users_key(&cfg, "users:1"), None);
        assert_eq!(
            extract_time_from_total_active_users_key(&cfg, "TOTAL_ACTIVE_USERS:garbage"),
            None
        );
    }
}
