//! ICE price syncer: periodic live-price fetch and boost-level recompute.

use std::time::Duration;

use serde::Deserialize;
use tracing::{error, info};

use glacier_core::error::Error;

use crate::boost::build_mining_boost_levels;
use crate::state::ServiceState;

/// How often the live price is refreshed.
const SYNC_INTERVAL: Duration = Duration::from_secs(600);

/// Fetch retry schedule: exponential backoff from 10ms to 1s.
const FETCH_RETRIES: u32 = 25;
const BACKOFF_MIN: Duration = Duration::from_millis(10);
const BACKOFF_MAX: Duration = Duration::from_secs(1);

#[derive(Debug, Deserialize)]
struct PriceStats {
    price: f64,
}

/// Fetch the live ICE/USD price, accepting only HTTP 200 and a `{price}` body.
pub async fn fetch_ice_price(endpoint: &str) -> Result<f64, Error> {
    let client = reqwest::Client::new();
    let mut backoff = BACKOFF_MIN;
    let mut last_error = String::new();
    for _ in 0..FETCH_RETRIES {
        let response = client
            .get(endpoint)
            .query(&[("caller", "glacier")])
            .header("Accept", "application/json")
            .header("Cache-Control", "no-cache, no-store, must-revalidate")
            .header("Pragma", "no-cache")
            .header("Expires", "0")
            .send()
            .await;
        match response {
            Ok(response) if response.status().is_success() => {
                match response.json::<PriceStats>().await {
                    Ok(stats) => return Ok(stats.price),
                    Err(err) => last_error = format!("malformed price body: {err}"),
                }
            }
            Ok(response) => last_error = format!("price endpoint status {}", response.status()),
            Err(err) => last_error = err.to_string(),
        }
        error!(%endpoint, %last_error, "failed to fetch ice price, retrying");
        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(BACKOFF_MAX);
    }

    Err(Error::Unexpected(format!(
        "failed to fetch ice price from {endpoint}: {last_error}"
    )))
}

impl ServiceState {
    /// One refresh: fetch the live price and swap in recomputed levels.
    pub async fn sync_ice_price(&self) -> Result<(), Error> {
        let price = fetch_ice_price(&self.cfg.mining_boost.price_endpoint).await?;
        if price <= 0.0 {
            return Err(Error::Unexpected(format!("non-positive ice price: {price}")));
        }
        let levels = build_mining_boost_levels(&self.cfg.mining_boost, price);
        info!(price, levels = levels.len(), "ice price synced");
        self.set_levels(levels);

        Ok(())
    }

    /// Run the syncer forever. The caller must have performed (and checked)
    /// the initial sync; failures here are logged and retried next tick.
    pub async fn run_ice_price_syncer(&self) {
        let mut ticker = tokio::time::interval(SYNC_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(err) = self.sync_ice_price().await {
                error!(%err, "ice price sync failed");
            }
        }
    }
}
