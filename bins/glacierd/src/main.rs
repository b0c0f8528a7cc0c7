//! Glacier daemon: wires the collaborator backends, runs the price syncer,
//! and serves the HTTP surface.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use glacier_core::config::Config;
use glacier_service::boost::build_mining_boost_levels;
use glacier_service::http;
use glacier_service::mem::{MemBus, MemChainRpc, MemKv, MemLedger, MemWarehouse};
use glacier_service::ServiceState;

#[derive(Parser, Debug)]
#[command(name = "glacierd", about = "Glacier tokenomics accrual daemon")]
struct Args {
    /// Address to bind the HTTP server to.
    #[arg(long, default_value = "127.0.0.1:8080")]
    bind: String,

    /// Path to a JSON config file; defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level filter (e.g. "info", "glacier_service=debug").
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Run with in-memory backends and a static ICE price (no network).
    #[arg(long)]
    standalone: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&args.log_level).unwrap_or_default())
        .init();

    let cfg = match &args.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config at {}", path.display()))?;
            serde_json::from_str::<Config>(&raw)
                .with_context(|| format!("failed to parse config at {}", path.display()))?
        }
        None => Config::default(),
    };

    // The production deployment injects real KV/SQL/bus/DWH/chain backends
    // here; the in-memory set keeps the daemon runnable on its own.
    let state = Arc::new(ServiceState::new(
        cfg,
        Arc::new(MemKv::new()),
        Arc::new(MemLedger::new()),
        Arc::new(MemBus::new()),
        Arc::new(MemWarehouse::new()),
        Arc::new(MemChainRpc::new()),
    ));

    if args.standalone {
        warn!("standalone mode: boost levels priced at 1 ICE per USD");
        state.set_levels(build_mining_boost_levels(&state.cfg.mining_boost, 1.0));
    } else {
        // The first sync must succeed; without live prices every boost quote
        // would be wrong.
        state
            .sync_ice_price()
            .await
            .map_err(|err| anyhow::anyhow!("initial ice price sync failed: {err}"))?;
        let syncer_state = Arc::clone(&state);
        tokio::spawn(async move { syncer_state.run_ice_price_syncer().await });
    }

    let listener = tokio::net::TcpListener::bind(&args.bind)
        .await
        .with_context(|| format!("failed to bind {}", args.bind))?;
    info!(bind = %args.bind, "glacierd listening");

    axum::serve(listener, http::router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await
        .context("http server failed")?;

    Ok(())
}
