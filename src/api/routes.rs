use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::any::Any;
use std::collections::BTreeMap;
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer, trace::TraceLayer};

use super::{ws::websocket_handler, AppState};
use crate::candles::{self, CandleInterval};
use crate::models::{Candle, Chain, GasSample, PriceSample, Sample, SeriesId, TransactionType};
use crate::simulator::{self, ChainCost, SimulationError, SimulationRequest};

pub const DEFAULT_HISTORY_HOURS: f64 = 24.0;
const MAX_HISTORY_HOURS: f64 = 24.0 * 366.0;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/gas-prices", get(get_gas_prices))
        .route("/api/eth-price", get(get_eth_price))
        .route("/api/eth-price/history", get(get_eth_price_history))
        .route("/api/gas-history/:series", get(get_history))
        .route("/api/gas-history/:series/candles", get(get_candles))
        .route("/api/simulate-transaction", post(post_simulate_transaction))
        .route("/api/transaction-types", get(get_transaction_types))
        .route("/ws", get(websocket_handler))
        .layer(middleware::from_fn(crate::middleware::request_logging))
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ===== Route Handlers =====

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        subscribers: state.hub.subscriber_count(),
    })
}

/// Latest gas sample per chain. Empty before the first tick.
async fn get_gas_prices(State(state): State<AppState>) -> Json<Vec<GasSample>> {
    Json(state.store.latest_gas())
}

async fn get_eth_price(State(state): State<AppState>) -> Json<PriceResponse> {
    Json(PriceResponse {
        price: state.quote_price(),
    })
}

async fn get_eth_price_history(
    State(state): State<AppState>,
    Query(params): Query<HistoryQuery>,
) -> Json<Vec<PriceSample>> {
    let window = params.window();
    let history = state
        .store
        .range(SeriesId::EthUsd, window)
        .into_iter()
        .filter_map(|s| match s {
            Sample::Price(p) => Some(p),
            Sample::Gas(_) => None,
        })
        .collect();
    Json(history)
}

/// History for one series over the last `hours` (default 24).
async fn get_history(
    State(state): State<AppState>,
    Path(series): Path<String>,
    Query(params): Query<HistoryQuery>,
) -> Result<Json<Vec<Sample>>, ApiError> {
    let series: SeriesId = series
        .parse()
        .map_err(|e: crate::models::UnknownSeries| ApiError::NotFound(e.to_string()))?;
    Ok(Json(state.store.range(series, params.window())))
}

async fn get_candles(
    State(state): State<AppState>,
    Path(chain): Path<String>,
    Query(params): Query<CandleQuery>,
) -> Result<Json<Vec<Candle>>, ApiError> {
    let chain: Chain = chain
        .parse()
        .map_err(|e: crate::models::UnknownSeries| ApiError::NotFound(e.to_string()))?;
    let interval = match params.interval.as_deref() {
        None | Some("") => CandleInterval::default(),
        Some(raw) => raw.parse().map_err(ApiError::BadRequest)?,
    };

    let history = HistoryQuery { hours: params.hours };
    let samples: Vec<GasSample> = state
        .store
        .range(SeriesId::Gas(chain), history.window())
        .into_iter()
        .filter_map(|s| match s {
            Sample::Gas(g) => Some(g),
            Sample::Price(_) => None,
        })
        .collect();

    Ok(Json(candles::aggregate(&samples, interval)))
}

async fn post_simulate_transaction(
    State(state): State<AppState>,
    payload: Result<Json<SimulationRequest>, JsonRejection>,
) -> Result<Json<BTreeMap<Chain, ChainCost>>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let input = request.validate()?;
    let latest = state.store.latest_gas();
    Ok(Json(simulator::simulate(input, &latest, state.quote_price())))
}

async fn get_transaction_types() -> Json<Vec<TransactionTypeInfo>> {
    Json(
        TransactionType::ALL
            .iter()
            .map(|tx| TransactionTypeInfo {
                id: *tx,
                name: tx.label(),
                gas_limit: tx.gas_limit(),
            })
            .collect(),
    )
}

// ===== Request/Response Types =====

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    /// Lookback in hours; absent, unparseable or non-positive means 24.
    hours: Option<String>,
}

impl HistoryQuery {
    pub fn hours(&self) -> f64 {
        self.hours
            .as_deref()
            .and_then(|h| h.trim().parse::<f64>().ok())
            .filter(|h| h.is_finite() && *h > 0.0)
            .map(|h| h.min(MAX_HISTORY_HOURS))
            .unwrap_or(DEFAULT_HISTORY_HOURS)
    }

    pub fn window(&self) -> Duration {
        Duration::milliseconds((self.hours() * 3_600_000.0) as i64)
    }
}

#[derive(Debug, Deserialize)]
struct CandleQuery {
    hours: Option<String>,
    interval: Option<String>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    subscribers: usize,
}

#[derive(Serialize)]
struct PriceResponse {
    price: f64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TransactionTypeInfo {
    id: TransactionType,
    name: &'static str,
    gas_limit: u64,
}

// ===== Error Handling =====

#[derive(Debug)]
pub enum ApiError {
    Internal(anyhow::Error),
    NotFound(String),
    BadRequest(String),
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err)
    }
}

impl From<SimulationError> for ApiError {
    fn from(err: SimulationError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Internal(err) => {
                tracing::error!("Internal error: {:#}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
        };

        let body = Json(json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!(detail, "Handler panicked");
    ApiError::Internal(anyhow::anyhow!("handler panicked: {detail}")).into_response()
}
