//! # glacier-engine
//! Pure accrual math: no I/O, no locks, total functions over snapshots.
//!
//! The service layer materializes the user and referrer records, calls into
//! this crate, and persists the result atomically.

pub mod bonus;
pub mod mine;
pub mod rate;
pub mod resurrect;
pub mod session;

pub use mine::{mine, MineOutcome};
pub use rate::{apply_pre_staking, base_mining_rate, calculate_mining_session, SessionWindow};
