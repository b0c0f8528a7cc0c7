//! End-to-end boost-upgrade scenarios: partial payment, overpayment walk,
//! and tx replay.

use glacier_core::config::Config;
use glacier_core::error::Error;
use glacier_core::types::{Network, ReceiptLog, TransactionReceipt, ERC20_TRANSFER_TOPIC};
use glacier_tests::helpers::{fresh_user, test_service, TestService};

const CONTRACT: &str = "0x00000000000000000000000000000000000000aa";
const PAYMENT: &str = "0x00000000000000000000000000000000000000bb";
const SENDER: &str = "0x00000000000000000000000000000000000000cc";

fn boost_cfg() -> Config {
    let mut cfg = Config::default();
    cfg.mining_boost.payment_address = PAYMENT.into();
    cfg.mining_boost
        .contract_addresses
        .insert(Network::Ethereum, CONTRACT.into());
    cfg.mining_boost.price_delta = 0;
    cfg
}

fn burn_receipt(tx_hash: &str, ice: f64) -> TransactionReceipt {
    let flakes = (ice * 1e18) as u128;
    let mut data = vec![0u8; 32];
    data[16..].copy_from_slice(&flakes.to_be_bytes());
    TransactionReceipt {
        tx_hash: tx_hash.into(),
        logs: vec![ReceiptLog {
            address: CONTRACT.into(),
            topics: vec![
                ERC20_TRANSFER_TOPIC.into(),
                format!("0x{:0>64}", SENDER.trim_start_matches("0x")),
                format!("0x{:0>64}", PAYMENT.trim_start_matches("0x")),
            ],
            data,
        }],
    }
}

async fn service_with_user() -> (TestService, String) {
    let svc = test_service(boost_cfg());
    let usr = fresh_user(1);
    let user_id = usr.user_id.clone();
    // Align the ID allocator with the seeded record.
    let id = svc.state.get_or_init_internal_id(&user_id).await.unwrap();
    let usr = glacier_core::user::User { internal_id: id, ..usr };
    svc.kv.seed_user(usr);
    (svc, user_id)
}

#[tokio::test]
async fn initialize_quotes_the_price_difference() {
    let (svc, user_id) = service_with_user().await;
    // Levels priced 1:1 with USD: 10, 30, 60.
    let pending = svc
        .state
        .initialize_mining_boost_upgrade(1, &user_id)
        .await
        .unwrap();
    assert_eq!(pending.ice_price, "30.0000");
    assert_eq!(pending.payment_address, PAYMENT);
}

#[tokio::test]
async fn initialize_rejects_out_of_range_and_downgrades() {
    let (svc, user_id) = service_with_user().await;
    assert!(matches!(
        svc.state.initialize_mining_boost_upgrade(3, &user_id).await,
        Err(Error::InvalidProperties(_))
    ));

    let id = svc.state.get_or_init_internal_id(&user_id).await.unwrap();
    let mut usr = svc.state.kv.get_user(id).await.unwrap().unwrap();
    usr.mining_boost_level_index = Some(1);
    svc.kv.seed_user(usr);
    assert!(matches!(
        svc.state.initialize_mining_boost_upgrade(1, &user_id).await,
        Err(Error::InvalidProperties(_))
    ));
}

#[tokio::test]
async fn partial_payment_keeps_level_and_refreshes_pending() {
    let (svc, user_id) = service_with_user().await;
    svc.state
        .initialize_mining_boost_upgrade(2, &user_id)
        .await
        .unwrap();
    // Level 2 costs 60; only 20 is burnt.
    svc.chain
        .seed_receipt(Network::Ethereum, burn_receipt("0x01", 20.0));
    let pending = svc
        .state
        .finalize_mining_boost_upgrade(Network::Ethereum, "0x01", &user_id)
        .await
        .unwrap()
        .expect("a refreshed pending upgrade");
    assert_eq!(pending.ice_price, "40.0000");

    let id = svc.state.get_or_init_internal_id(&user_id).await.unwrap();
    let usr = svc.state.kv.get_user(id).await.unwrap().unwrap();
    assert_eq!(usr.mining_boost_level_index, None);
    assert!((usr.mining_boost_amount_burnt - 20.0).abs() < 1e-9);
    assert_eq!(svc.ledger.rows().len(), 1);

    let key = glacier_service::keys::mining_boost_upgrade_key(id);
    let raw = svc.state.kv.get(&key).await.unwrap().unwrap();
    assert_eq!(raw, "2:40.0000");
}

#[tokio::test]
async fn exact_payment_reaches_the_requested_level() {
    let (svc, user_id) = service_with_user().await;
    svc.state
        .initialize_mining_boost_upgrade(1, &user_id)
        .await
        .unwrap();
    svc.chain
        .seed_receipt(Network::Ethereum, burn_receipt("0x02", 30.0));
    let pending = svc
        .state
        .finalize_mining_boost_upgrade(Network::Ethereum, "0x02", &user_id)
        .await
        .unwrap();
    assert!(pending.is_none());

    let id = svc.state.get_or_init_internal_id(&user_id).await.unwrap();
    let usr = svc.state.kv.get_user(id).await.unwrap().unwrap();
    assert_eq!(usr.mining_boost_level_index, Some(1));
    assert_eq!(usr.pre_staking_allocation, 100.0);
    assert_eq!(usr.pre_staking_bonus, 50.0);
}

#[tokio::test]
async fn small_overpayment_does_not_cascade() {
    let (svc, user_id) = service_with_user().await;
    svc.state
        .initialize_mining_boost_upgrade(1, &user_id)
        .await
        .unwrap();
    // 40 burnt against a 30 quote: the 10 extra is short of the 30 gap to
    // level 2.
    svc.chain
        .seed_receipt(Network::Ethereum, burn_receipt("0x03", 40.0));
    svc.state
        .finalize_mining_boost_upgrade(Network::Ethereum, "0x03", &user_id)
        .await
        .unwrap();

    let id = svc.state.get_or_init_internal_id(&user_id).await.unwrap();
    let usr = svc.state.kv.get_user(id).await.unwrap().unwrap();
    assert_eq!(usr.mining_boost_level_index, Some(1));
}

#[tokio::test]
async fn large_overpayment_cascades_to_higher_level() {
    let (svc, user_id) = service_with_user().await;
    svc.state
        .initialize_mining_boost_upgrade(1, &user_id)
        .await
        .unwrap();
    // 80 burnt against a 30 quote: the 50 extra covers the 30 gap to level 2.
    svc.chain
        .seed_receipt(Network::Ethereum, burn_receipt("0x04", 80.0));
    svc.state
        .finalize_mining_boost_upgrade(Network::Ethereum, "0x04", &user_id)
        .await
        .unwrap();

    let id = svc.state.get_or_init_internal_id(&user_id).await.unwrap();
    let usr = svc.state.kv.get_user(id).await.unwrap().unwrap();
    assert_eq!(usr.mining_boost_level_index, Some(2));
    // Level 2 disables slashing in the default table.
    assert_eq!(usr.pre_staking_bonus, 100.0);
}

#[tokio::test]
async fn replayed_tx_hash_is_rejected_exactly_once() {
    let (svc, user_id) = service_with_user().await;
    svc.state
        .initialize_mining_boost_upgrade(1, &user_id)
        .await
        .unwrap();
    svc.chain
        .seed_receipt(Network::Ethereum, burn_receipt("0x05", 30.0));
    svc.state
        .finalize_mining_boost_upgrade(Network::Ethereum, "0x05", &user_id)
        .await
        .unwrap();

    // Re-quote a higher level, then replay the old tx.
    svc.state
        .initialize_mining_boost_upgrade(2, &user_id)
        .await
        .unwrap();
    let err = svc
        .state
        .finalize_mining_boost_upgrade(Network::Ethereum, "0x05", &user_id)
        .await
        .unwrap_err();
    assert_eq!(err, Error::Duplicate);
    assert_eq!(svc.ledger.rows().len(), 1);

    let id = svc.state.get_or_init_internal_id(&user_id).await.unwrap();
    let usr = svc.state.kv.get_user(id).await.unwrap().unwrap();
    assert_eq!(usr.mining_boost_level_index, Some(1));
    assert!((usr.mining_boost_amount_burnt - 30.0).abs() < 1e-9);
}

#[tokio::test]
async fn unknown_tx_is_invalid() {
    let (svc, user_id) = service_with_user().await;
    svc.state
        .initialize_mining_boost_upgrade(1, &user_id)
        .await
        .unwrap();
    let err = svc
        .state
        .finalize_mining_boost_upgrade(Network::Ethereum, "0xdead", &user_id)
        .await
        .unwrap_err();
    assert_eq!(err, Error::InvalidMiningBoostUpgradeTx);
    assert!(svc.ledger.rows().is_empty());
}

#[tokio::test]
async fn finalize_without_pending_upgrade_is_not_found() {
    let (svc, user_id) = service_with_user().await;
    svc.chain
        .seed_receipt(Network::Ethereum, burn_receipt("0x06", 30.0));
    let err = svc
        .state
        .finalize_mining_boost_upgrade(Network::Ethereum, "0x06", &user_id)
        .await
        .unwrap_err();
    assert_eq!(err, Error::NotFound);
}

#[tokio::test]
async fn boost_summary_prices_relative_to_current_level() {
    let (svc, user_id) = service_with_user().await;
    let summary = svc.state.get_mining_boost_summary(&user_id).await.unwrap();
    assert_eq!(summary.current_level_index, None);
    let prices: Vec<&str> = summary.levels.iter().map(|l| l.ice_price.as_str()).collect();
    assert_eq!(prices, vec!["10.0000", "30.0000", "60.0000"]);

    let id = svc.state.get_or_init_internal_id(&user_id).await.unwrap();
    let mut usr = svc.state.kv.get_user(id).await.unwrap().unwrap();
    usr.mining_boost_level_index = Some(1);
    svc.kv.seed_user(usr);
    let summary = svc.state.get_mining_boost_summary(&user_id).await.unwrap();
    let prices: Vec<&str> = summary.levels.iter().map(|l| l.ice_price.as_str()).collect();
    assert_eq!(prices, vec!["0.0000", "0.0000", "30.0000"]);
}
