//! Shared test helpers: a fully wired in-memory service and user factories.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};

use glacier_core::config::Config;
use glacier_core::user::User;
use glacier_service::boost::build_mining_boost_levels;
use glacier_service::mem::{MemBus, MemChainRpc, MemKv, MemLedger, MemWarehouse};
use glacier_service::ServiceState;

/// A service wired to in-memory backends, with handles kept for inspection.
pub struct TestService {
    pub state: Arc<ServiceState>,
    pub kv: Arc<MemKv>,
    pub ledger: Arc<MemLedger>,
    pub bus: Arc<MemBus>,
    pub dwh: Arc<MemWarehouse>,
    pub chain: Arc<MemChainRpc>,
}

/// Wire a service over in-memory backends with boost levels priced 1:1.
pub fn test_service(cfg: Config) -> TestService {
    let kv = Arc::new(MemKv::new());
    let ledger = Arc::new(MemLedger::new());
    let bus = Arc::new(MemBus::new());
    let dwh = Arc::new(MemWarehouse::new());
    let chain = Arc::new(MemChainRpc::new());
    let levels = build_mining_boost_levels(&cfg.mining_boost, 1.0);
    let state = Arc::new(ServiceState::new(
        cfg,
        kv.clone(),
        ledger.clone(),
        bus.clone(),
        dwh.clone(),
        chain.clone(),
    ));
    state.set_levels(levels);

    TestService {
        state,
        kv,
        ledger,
        bus,
        dwh,
        chain,
    }
}

pub fn at(d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 6, d, h, 0, 0).unwrap()
}

/// A just-created user with no mining history.
pub fn fresh_user(internal_id: i64) -> User {
    User {
        internal_id,
        user_id: format!("did:x:{internal_id}"),
        created_at: Some(Utc::now()),
        ..User::default()
    }
}

/// A user with a live session that started `hours_ago` hours ago.
pub fn mining_user(internal_id: i64, now: DateTime<Utc>, hours_ago: i64) -> User {
    let started = now - Duration::hours(hours_ago);
    User {
        internal_id,
        user_id: format!("did:x:{internal_id}"),
        created_at: Some(started),
        mining_session_solo_started_at: Some(started),
        mining_session_solo_last_started_at: Some(started),
        mining_session_solo_ended_at: Some(started + Duration::hours(24)),
        balance_last_updated_at: Some(started),
        ..User::default()
    }
}
