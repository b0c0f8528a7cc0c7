//! Protocol-wide constants.

/// Number of digits after the floating point kept when formatting boost prices.
pub const MINING_BOOST_PRICE_PRECISION: u32 = 4;

/// 1 ICE = 10^18 flakes; on-chain transfer values are denominated in flakes.
pub const ICE_FLAKES_DENOMINATION: f64 = 1_000_000_000_000_000_000.0;

/// Upper bound for pre-staking commitment, in years.
pub const MAX_PRE_STAKING_YEARS: u64 = 5;

/// Hard cap on `limit` query parameters across paginated endpoints.
pub const MAX_PAGE_LIMIT: u64 = 1000;

/// Default `limit` for the balance-history endpoint.
pub const DEFAULT_BALANCE_HISTORY_LIMIT: u64 = 24;

/// Default `limit` for the top-miners endpoint.
pub const DEFAULT_TOP_MINERS_LIMIT: u64 = 10;

/// Default and maximum `days` for the total-coins endpoint.
pub const DEFAULT_TOTAL_COINS_DAYS: u64 = 3;
pub const MAX_TOTAL_COINS_DAYS: u64 = 90;

/// Deadline applied to every outbound I/O call.
pub const REQUEST_DEADLINE_SECS: u64 = 25;

/// Deadline for compensating deletions, detached from the caller's context.
pub const COMPENSATION_DEADLINE_SECS: u64 = 30;

/// Prefix for the per-bucket active-user counters.
pub const TOTAL_ACTIVE_USERS_KEY_PREFIX: &str = "TOTAL_ACTIVE_USERS";

/// Bucket date layouts, chosen by the child aggregation interval width.
pub const DAY_FORMAT: &str = "%Y-%m-%d";
pub const HOUR_FORMAT: &str = "%Y-%m-%dT%H";
pub const MINUTE_FORMAT: &str = "%Y-%m-%dT%H:%M";
