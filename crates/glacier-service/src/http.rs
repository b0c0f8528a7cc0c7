//! HTTP front door: the `/v1r` read surface and `/v1w` write surface.
//!
//! Authentication happens in middleware upstream of this router; handlers
//! trust the path `user_id`. Every error is rendered as
//! `{"error": ..., "code": ...}` with the taxonomy's status code.

use std::str::FromStr;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tracing::error;

use glacier_core::error::Error;
use glacier_core::types::{parse_utc_offset, Network};

use crate::state::ServiceState;

type AppState = Arc<ServiceState>;

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(
            "/v1r/tokenomics/:user_id/mining-summary",
            get(get_mining_summary),
        )
        .route(
            "/v1r/tokenomics/:user_id/mining-boost-summary",
            get(get_mining_boost_summary),
        )
        .route(
            "/v1r/tokenomics/:user_id/pre-staking-summary",
            get(get_pre_staking_summary),
        )
        .route(
            "/v1r/tokenomics/:user_id/balance-summary",
            get(get_balance_summary),
        )
        .route(
            "/v1r/tokenomics/:user_id/balance-history",
            get(get_balance_history),
        )
        .route(
            "/v1r/tokenomics/:user_id/ranking-summary",
            get(get_ranking_summary),
        )
        .route("/v1r/tokenomics-statistics/top-miners", get(get_top_miners))
        .route("/v1r/tokenomics-statistics/adoption", get(get_adoption))
        .route(
            "/v1r/tokenomics-statistics/total-coins",
            get(get_total_coins),
        )
        .route(
            "/v1w/tokenomics/:user_id/mining-boosts",
            put(initialize_mining_boost_upgrade).patch(finalize_mining_boost_upgrade),
        )
        .route(
            "/v1w/tokenomics/:user_id/mining-sessions",
            post(start_new_mining_session),
        )
        .route(
            "/v1w/tokenomics/:user_id/pre-staking",
            put(pre_staking_disabled),
        )
        .route(
            "/v1w/tokenomics/:user_id/extra-bonus-claims",
            post(extra_bonus_disabled),
        )
        .with_state(state)
        .layer(cors)
}

// ---------------------------------------------------------------------------
// Error rendering
// ---------------------------------------------------------------------------

fn error_body(code: &str, err: &Error) -> Json<serde_json::Value> {
    Json(json!({"error": err.to_string(), "code": code}))
}

/// Default mapping from the error taxonomy to HTTP. `not_found_code` lets the
/// few endpoints with specialized 404/409 semantics override the code.
fn map_error(err: Error, not_found_code: &str, duplicate_code: &str) -> Response {
    let response = match &err {
        Error::RelationNotFound => (StatusCode::NOT_FOUND, error_body("USER_NOT_FOUND", &err)),
        Error::NotFound => (StatusCode::NOT_FOUND, error_body(not_found_code, &err)),
        Error::Duplicate => (StatusCode::CONFLICT, error_body(duplicate_code, &err)),
        Error::RaceCondition => (StatusCode::BAD_REQUEST, error_body("RACE_CONDITION", &err)),
        Error::InvalidMiningBoostUpgradeTx => (
            StatusCode::BAD_REQUEST,
            error_body("INVALID_MINING_BOOST_TX", &err),
        ),
        Error::NegativeMiningProgressDecisionRequired { amount } => (
            StatusCode::CONFLICT,
            Json(json!({
                "error": err.to_string(),
                "code": "RESURRECTION_DECISION_REQUIRED",
                "data": {"amount": format!("{amount:.2}")},
            })),
        ),
        Error::KycRequired { steps } => (
            StatusCode::CONFLICT,
            Json(json!({
                "error": err.to_string(),
                "code": "KYC_REQUIRED",
                "data": {"kycSteps": steps},
            })),
        ),
        Error::MiningDisabled => (StatusCode::FORBIDDEN, error_body("MINING_DISABLED", &err)),
        Error::GlobalRankHidden => {
            (StatusCode::FORBIDDEN, error_body("GLOBAL_RANK_HIDDEN", &err))
        }
        Error::DecreasingPreStakingNotAllowed => (
            StatusCode::BAD_REQUEST,
            error_body("INVALID_PROPERTIES", &err),
        ),
        Error::InvalidProperties(_) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            error_body("INVALID_PROPERTIES", &err),
        ),
        Error::Storage(_) | Error::ChainRpc(_) | Error::Unexpected(_) => {
            error!(%err, "unexpected failure");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_body("UNEXPECTED", &err),
            )
        }
    };
    response.into_response()
}

fn plain_error(err: Error) -> Response {
    map_error(err, "NOT_FOUND", "DUPLICATE")
}

fn invalid_properties(message: &str) -> Response {
    map_error(
        Error::InvalidProperties(message.to_string()),
        "NOT_FOUND",
        "DUPLICATE",
    )
}

fn parse_tz(tz: &Option<String>) -> Result<i64, Response> {
    match tz {
        None => Ok(0),
        Some(tz) => {
            parse_utc_offset(tz).ok_or_else(|| invalid_properties(&format!("invalid tz: {tz}")))
        }
    }
}

// ---------------------------------------------------------------------------
// Read surface
// ---------------------------------------------------------------------------

async fn get_mining_summary(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Response {
    match state.get_mining_summary(&user_id).await {
        Ok(summary) => Json(summary).into_response(),
        Err(err) => plain_error(err),
    }
}

async fn get_mining_boost_summary(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Response {
    match state.get_mining_boost_summary(&user_id).await {
        Ok(summary) => Json(summary).into_response(),
        Err(err) => plain_error(err),
    }
}

async fn get_pre_staking_summary(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Response {
    match state.get_pre_staking_summary(&user_id).await {
        Ok(summary) => Json(summary).into_response(),
        Err(err) => map_error(err, "PRE_STAKING_NOT_ENABLED", "DUPLICATE"),
    }
}

async fn get_balance_summary(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Response {
    match state.get_balance_summary(&user_id).await {
        Ok(summary) => Json(summary).into_response(),
        Err(err) => plain_error(err),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BalanceHistoryQuery {
    start_date: Option<DateTime<Utc>>,
    end_date: Option<DateTime<Utc>>,
    tz: Option<String>,
    #[serde(default)]
    limit: u64,
    #[serde(default)]
    offset: u64,
}

async fn get_balance_history(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<BalanceHistoryQuery>,
) -> Response {
    let utc_offset = match parse_tz(&query.tz) {
        Ok(offset) => offset,
        Err(response) => return response,
    };
    match state
        .get_balance_history(
            &user_id,
            query.start_date,
            query.end_date,
            utc_offset,
            query.limit,
            query.offset,
        )
        .await
    {
        Ok(entries) => Json(entries).into_response(),
        Err(err) => plain_error(err),
    }
}

async fn get_ranking_summary(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Response {
    match state.get_ranking_summary(&user_id).await {
        Ok(summary) => Json(summary).into_response(),
        Err(err) => plain_error(err),
    }
}

#[derive(Debug, Deserialize)]
struct TopMinersQuery {
    #[serde(default)]
    keyword: String,
    #[serde(default)]
    limit: u64,
    #[serde(default)]
    offset: u64,
}

async fn get_top_miners(
    State(state): State<AppState>,
    Query(query): Query<TopMinersQuery>,
) -> Response {
    match state
        .get_top_miners(&query.keyword, query.limit, query.offset)
        .await
    {
        Ok((miners, next_offset)) => {
            let mut headers = HeaderMap::new();
            if let Ok(value) = HeaderValue::from_str(&next_offset.to_string()) {
                headers.insert("X-Next-Offset", value);
            }
            (headers, Json(miners)).into_response()
        }
        Err(err) => plain_error(err),
    }
}

async fn get_adoption(State(state): State<AppState>, headers: HeaderMap) -> Response {
    // The adoption timeline is per-user; the authenticated user rides in a
    // header placed by the auth middleware.
    let user_id = headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    match state.get_adoption_summary(&user_id).await {
        Ok(summary) => Json(summary).into_response(),
        Err(err) => plain_error(err),
    }
}

#[derive(Debug, Deserialize)]
struct TotalCoinsQuery {
    #[serde(default)]
    days: u64,
    tz: Option<String>,
}

async fn get_total_coins(
    State(state): State<AppState>,
    Query(query): Query<TotalCoinsQuery>,
) -> Response {
    let utc_offset = match parse_tz(&query.tz) {
        Ok(offset) => offset,
        Err(response) => return response,
    };
    match state.get_total_coins_summary(query.days, utc_offset).await {
        Ok(summary) => Json(summary).into_response(),
        Err(err) => plain_error(err),
    }
}

// ---------------------------------------------------------------------------
// Write surface
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitializeMiningBoostUpgradeBody {
    mining_boost_level_index: u8,
}

async fn initialize_mining_boost_upgrade(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(body): Json<InitializeMiningBoostUpgradeBody>,
) -> Response {
    match state
        .initialize_mining_boost_upgrade(body.mining_boost_level_index, &user_id)
        .await
    {
        Ok(pending) => Json(pending).into_response(),
        Err(err) => plain_error(err),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FinalizeMiningBoostUpgradeBody {
    network: String,
    tx_hash: String,
}

async fn finalize_mining_boost_upgrade(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(body): Json<FinalizeMiningBoostUpgradeBody>,
) -> Response {
    let Ok(network) = Network::from_str(&body.network) else {
        return invalid_properties(&format!("invalid network {}", body.network));
    };
    match state
        .finalize_mining_boost_upgrade(network, &body.tx_hash, &user_id)
        .await
    {
        Ok(pending) => Json(pending).into_response(),
        Err(err) => map_error(err, "NO_PENDING_UPGRADE", "TX_ALREADY_USED"),
    }
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct StartNewMiningSessionBody {
    resurrect: Option<bool>,
    #[serde(default)]
    skip_kyc_steps: Vec<u8>,
}

async fn start_new_mining_session(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    body: Option<Json<StartNewMiningSessionBody>>,
) -> Response {
    let body = body.map(|Json(body)| body).unwrap_or(StartNewMiningSessionBody {
        resurrect: None,
        skip_kyc_steps: Vec::new(),
    });
    match state
        .start_new_mining_session(&user_id, body.resurrect, &body.skip_kyc_steps)
        .await
    {
        Ok(summary) => (StatusCode::CREATED, Json(summary)).into_response(),
        Err(err) => map_error(err, "NOT_FOUND", "MINING_IN_PROGRESS"),
    }
}

async fn pre_staking_disabled() -> Response {
    (
        StatusCode::FORBIDDEN,
        Json(json!({"error": "endpoint disabled", "code": "PRE_STAKING_DISABLED"})),
    )
        .into_response()
}

async fn extra_bonus_disabled() -> Response {
    (
        StatusCode::FORBIDDEN,
        Json(json!({"error": "endpoint disabled", "code": "EXTRA_BONUS_DISABLED"})),
    )
        .into_response()
}
