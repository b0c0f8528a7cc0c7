//! End-to-end accrual scenarios over the pure engine.

use chrono::Duration;

use glacier_core::config::Config;
use glacier_core::user::{Referral, User};
use glacier_engine::mine;
use glacier_tests::helpers::at;

fn cfg() -> Config {
    Config {
        slashing_days_count: 10,
        slashing_floor: 0.0,
        ..Config::default()
    }
}

#[test]
fn pure_solo_mint_over_one_hour() {
    let now = at(5, 12);
    let usr = User {
        internal_id: 1,
        user_id: "u1".into(),
        created_at: Some(now),
        mining_session_solo_started_at: Some(now - Duration::hours(1)),
        mining_session_solo_last_started_at: Some(now - Duration::hours(1)),
        mining_session_solo_ended_at: Some(now + Duration::hours(23)),
        balance_last_updated_at: Some(now - Duration::hours(1)),
        ..User::default()
    };
    let out = mine(now, Some(&usr), None, None, &cfg(), &[]);
    let updated = out.user.expect("a write is expected");
    let base = cfg().adoption.starting_base_mining_rate;
    assert!((updated.balance_solo - base).abs() < 1e-9);
    assert!((updated.balance_total_minted - base).abs() < 1e-9);
    assert_eq!(updated.balance_total_slashed, 0.0);
    assert_eq!(updated.balance_last_updated_at, Some(now));
}

#[test]
fn extra_bonus_window_scales_minting() {
    let now = at(5, 12);
    let usr = User {
        internal_id: 1,
        user_id: "u1".into(),
        created_at: Some(now),
        extra_bonus: 50,
        extra_bonus_started_at: Some(now - Duration::hours(2)),
        mining_session_solo_started_at: Some(now - Duration::hours(1)),
        mining_session_solo_last_started_at: Some(now - Duration::hours(1)),
        mining_session_solo_ended_at: Some(now + Duration::hours(23)),
        balance_last_updated_at: Some(now - Duration::hours(1)),
        ..User::default()
    };
    let out = mine(now, Some(&usr), None, None, &cfg(), &[]);
    let updated = out.user.unwrap();
    let base = cfg().adoption.starting_base_mining_rate;
    assert!((updated.balance_solo - 1.5 * base).abs() < 1e-9);
    assert!((updated.balance_total_minted - 1.5 * base).abs() < 1e-9);
}

#[test]
fn post_session_slashing_at_the_documented_rate() {
    let now = at(6, 13);
    let usr = User {
        internal_id: 1,
        user_id: "u1".into(),
        created_at: Some(at(1, 0)),
        mining_session_solo_started_at: Some(at(4, 12)),
        mining_session_solo_last_started_at: Some(at(4, 12)),
        mining_session_solo_ended_at: Some(at(5, 12)),
        balance_last_updated_at: Some(now - Duration::hours(1)),
        balance_solo: 240.0,
        balance_total_standard: 240.0,
        ..User::default()
    };
    let out = mine(now, Some(&usr), None, None, &cfg(), &[]);
    let updated = out.user.unwrap();
    // 240 / 10 days / 24h = 1.0 per hour.
    assert!((updated.slashing_rate_solo - 1.0).abs() < 1e-9);
    assert!((updated.balance_solo - 239.0).abs() < 1e-9);
    assert!((updated.balance_total_slashed - 1.0).abs() < 1e-9);
}

#[test]
fn absolute_zero_shortcut_folds_pendings_without_minting() {
    let now = at(6, 13);
    let usr = User {
        internal_id: 1,
        user_id: "u1".into(),
        mining_session_solo_started_at: Some(at(4, 12)),
        mining_session_solo_last_started_at: Some(at(4, 12)),
        mining_session_solo_ended_at: Some(at(5, 12)),
        balance_t1_pending: 10.0,
        ..User::default()
    };
    let out = mine(now, Some(&usr), None, None, &cfg(), &[]);
    assert!(!out.should_generate_history);
    let updated = out.user.unwrap();
    assert_eq!(updated.balance_t1_pending, 10.0);
    assert_eq!(updated.balance_t1_pending_applied, 10.0);
    assert_eq!(updated.balance_solo, 0.0);
    assert_eq!(updated.balance_last_updated_at, Some(now));
}

#[test]
fn referral_chain_pays_and_drains_both_ways() {
    // An active miner with active referrers accrues into every partition;
    // once everyone stops, slashing drains the same partitions and the
    // outward pendings turn negative.
    let cfg = cfg();
    let mut now = at(5, 12);
    let mut usr = User {
        internal_id: 1,
        user_id: "u1".into(),
        created_at: Some(now),
        id_t0: 2,
        id_t_minus1: 3,
        active_t1_referrals: 1,
        mining_session_solo_started_at: Some(now - Duration::hours(1)),
        mining_session_solo_last_started_at: Some(now - Duration::hours(1)),
        mining_session_solo_ended_at: Some(now + Duration::hours(11)),
        balance_last_updated_at: Some(now - Duration::hours(1)),
        ..User::default()
    };
    let t0 = Referral {
        internal_id: 2,
        mining_session_solo_ended_at: Some(now + Duration::hours(5)),
        balance_solo: 100.0,
        ..Referral::default()
    };
    let t_minus1 = Referral {
        internal_id: 3,
        mining_session_solo_ended_at: Some(now + Duration::hours(5)),
        balance_solo: 100.0,
        ..Referral::default()
    };

    let out = mine(now, Some(&usr), Some(&t0), Some(&t_minus1), &cfg, &[]);
    usr = out.user.unwrap();
    let base = cfg.adoption.starting_base_mining_rate;
    assert!((usr.balance_t0 - 0.25 * base).abs() < 1e-9);
    assert!((usr.balance_for_t0 - 0.25 * base).abs() < 1e-9);
    assert!((usr.balance_for_t_minus1 - 0.05 * base).abs() < 1e-9);
    assert!((usr.balance_t1 - 0.25 * base).abs() < 1e-9);

    // Everyone's session is over; a day of decay follows.
    now = now + Duration::hours(24);
    let ended_t0 = Referral {
        mining_session_solo_ended_at: Some(now - Duration::hours(1)),
        ..t0
    };
    let ended_t_minus1 = Referral {
        mining_session_solo_ended_at: Some(now - Duration::hours(1)),
        ..t_minus1
    };
    let before_for_t0 = usr.balance_for_t0;
    let step = mine(
        now + Duration::hours(1),
        Some(&usr),
        Some(&ended_t0),
        Some(&ended_t_minus1),
        &cfg,
        &[],
    );
    let decayed = step.user.unwrap();
    assert!(step.pending_amount_for_t0 < 0.0);
    assert!(step.pending_amount_for_t_minus1 < 0.0);
    assert!(decayed.balance_for_t0 < before_for_t0);
    assert!(decayed.balance_solo < usr.balance_solo);
    assert!(decayed.balance_total_slashed > 0.0);
}

#[test]
fn daily_totals_reset_on_date_change() {
    let cfg = cfg();
    let mut usr = User {
        internal_id: 1,
        user_id: "u1".into(),
        created_at: Some(at(1, 0)),
        mining_session_solo_started_at: Some(at(5, 20)),
        mining_session_solo_last_started_at: Some(at(5, 20)),
        mining_session_solo_ended_at: Some(at(6, 20)),
        balance_last_updated_at: Some(at(5, 20)),
        balance_solo: 10.0,
        balance_total_standard: 10.0,
        balance_total_minted: 99.0,
        ..User::default()
    };
    // Step within the same day: no reset.
    let out = mine(at(5, 23), Some(&usr), None, None, &cfg, &[]);
    assert!(!out.should_generate_history);
    usr = out.user.unwrap();
    assert!(usr.balance_total_minted > 99.0);

    // Crossing midnight resets the daily counters and requests history.
    let out = mine(at(6, 1), Some(&usr), None, None, &cfg, &[]);
    assert!(out.should_generate_history);
    let updated = out.user.unwrap();
    assert!(updated.balance_total_minted < 99.0);
}
