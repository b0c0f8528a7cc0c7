//! Aggregation scenarios: active-user buckets, history round-trips, identity.

use chrono::{Duration, TimeZone, Utc};

use glacier_core::config::Config;
use glacier_core::error::Error;
use glacier_core::traits::BalanceHistoryRow;
use glacier_service::aggregator::detect_incr_total_active_users_keys;
use glacier_service::history::process_balance_history;
use glacier_service::keys::truncate;
use glacier_service::sessions::MiningSessionStarted;
use glacier_tests::helpers::test_service;

fn at(d: u32, h: u32, m: u32) -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 6, d, h, m, 0).unwrap()
}

#[test]
fn active_user_bucket_set_for_the_documented_window() {
    let cfg = Config::default();
    let session = MiningSessionStarted {
        user_id: "u1".into(),
        started_at: at(5, 10, 15),
        ended_at: at(5, 12, 40),
        last_natural_mining_started_at: at(5, 10, 15),
        previously_ended_at: Some(at(5, 9, 50)),
        extension_secs: at(5, 12, 40)
            .signed_duration_since(at(5, 10, 15))
            .num_seconds(),
        mining_streak: 0,
        free: false,
    };
    let keys = detect_incr_total_active_users_keys(&cfg, &session);
    assert_eq!(
        keys,
        vec![
            "TOTAL_ACTIVE_USERS:2023-06-05T11".to_string(),
            "TOTAL_ACTIVE_USERS:2023-06-05T12".to_string(),
        ]
    );
}

#[tokio::test]
async fn increment_is_deduplicated_per_session() {
    let svc = test_service(Config::default());
    let session = MiningSessionStarted {
        user_id: "u1".into(),
        started_at: at(5, 10, 15),
        ended_at: at(5, 12, 40),
        last_natural_mining_started_at: at(5, 10, 15),
        previously_ended_at: None,
        extension_secs: 2 * 3600 + 25 * 60,
        mining_streak: 0,
        free: false,
    };
    svc.state.increment_total_active_users(&session).await.unwrap();
    let err = svc
        .state
        .increment_total_active_users(&session)
        .await
        .unwrap_err();
    assert_eq!(err, Error::Duplicate);

    // Counters incremented exactly once.
    let count = svc
        .state
        .kv
        .get_counter("TOTAL_ACTIVE_USERS:2023-06-05T12")
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn counters_are_monotonic_across_users() {
    let svc = test_service(Config::default());
    for user in ["u1", "u2", "u3"] {
        let session = MiningSessionStarted {
            user_id: user.into(),
            started_at: at(5, 10, 15),
            ended_at: at(5, 12, 40),
            last_natural_mining_started_at: at(5, 10, 15),
            previously_ended_at: None,
            extension_secs: 2 * 3600 + 25 * 60,
            mining_streak: 0,
            free: false,
        };
        svc.state.increment_total_active_users(&session).await.unwrap();
    }
    let count = svc
        .state
        .kv
        .get_counter("TOTAL_ACTIVE_USERS:2023-06-05T12")
        .await
        .unwrap();
    assert_eq!(count, 3);
}

#[test]
fn history_direction_only_reverses_the_outer_list() {
    let cfg = Config::default();
    let parent = Duration::hours(24);
    let now = at(5, 5, 15);
    let rows: Vec<BalanceHistoryRow> = (1..=5)
        .map(|i| BalanceHistoryRow {
            created_at: truncate(now - parent * i, parent),
            balance_total_minted: 10.0 + i as f64,
            balance_total_slashed: 0.0,
        })
        .collect();
    let not_before = now - parent * 10;
    let forward = process_balance_history(&cfg, &rows, true, not_before, now);
    let mut backward = process_balance_history(&cfg, &rows, false, not_before, now);
    backward.reverse();
    assert_eq!(forward, backward);
}

#[tokio::test]
async fn internal_ids_are_sequential_and_idempotent() {
    let svc = test_service(Config::default());
    let a = svc.state.get_or_init_internal_id("did:x:a").await.unwrap();
    let b = svc.state.get_or_init_internal_id("did:x:b").await.unwrap();
    let a_again = svc.state.get_or_init_internal_id("did:x:a").await.unwrap();
    assert_eq!(a, 1);
    assert_eq!(b, 2);
    assert_eq!(a_again, a);
}
