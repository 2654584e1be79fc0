use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use gateway_core::adapter::{DownloadRequest, Period};
use gateway_core::{AccountType, AdjustType, GatewayError, OrderSide, OrderType, SessionId, SubscriptionId, SymbolCode};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::dispatch::auth::AuthBearer;
use crate::lifecycle::AppState;

/// Wraps a `GatewayError` so it can be returned directly from a handler,
/// mapping each error code to its HTTP status.
struct ApiError(GatewayError);

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            GatewayError::AuthMissing | GatewayError::AuthInvalid => StatusCode::UNAUTHORIZED,
            GatewayError::EmptySymbols => StatusCode::UNPROCESSABLE_ENTITY,
            GatewayError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            GatewayError::FailedPrecondition(_) => StatusCode::BAD_REQUEST,
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::SubLimit => StatusCode::CONFLICT,
            GatewayError::UpstreamFailure(_) => StatusCode::BAD_GATEWAY,
            GatewayError::PolicyBlocked => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(json!({
            "code": self.0.code(),
            "message": self.0.to_string(),
        }));
        (status, body).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// The `/api/v1` surface. Left unbound to a concrete state type so the
/// caller can nest it under the top-level router alongside the streaming
/// socket route before calling `with_state` once.
pub fn router() -> Router<Arc<AppState>> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health/", get(health))
        .route("/health/ready", get(health))
        .route("/health/live", get(health))
        .route("/data/market", post(market_data))
        .route("/data/financial", post(financial))
        .route("/data/sectors", get(sector_list))
        .route("/data/sector", post(stock_list_in_sector))
        .route("/data/index-weight", post(index_weight))
        .route("/data/trading-calendar/:year", get(trading_calendar))
        .route("/data/instrument/:code", get(instrument_info))
        .route("/data/periods", get(period_list))
        .route("/data/cb", get(cb_info))
        .route("/data/ipo", get(ipo_info))
        .route("/data/dividend/:code", get(divid_factors))
        .route("/data/tick-range", post(tick_range))
        .route("/data/kline-range", post(kline_range))
        .route("/data/l2/quote", post(l2_quote))
        .route("/data/l2/order", post(l2_order))
        .route("/data/l2/transaction", post(l2_transaction))
        .route("/data/download", post(start_download))
        .route("/data/download/:task_id", get(download_status))
        .route(
            "/data/sector/:sector/symbol/:code",
            post(add_symbol_to_sector).delete(remove_symbol_from_sector),
        )
        .route("/data/subscription", post(subscribe))
        .route(
            "/data/subscription/:id",
            delete(unsubscribe).get(describe_subscription),
        )
        .route("/data/subscriptions", get(list_subscriptions))
        .route("/trading/connect", post(connect))
        .route("/trading/disconnect/:sid", post(disconnect))
        .route("/trading/asset/:sid", get(query_asset))
        .route("/trading/positions/:sid", get(query_positions))
        .route("/trading/orders/:sid", get(query_orders))
        .route("/trading/trades/:sid", get(query_trades))
        .route("/trading/order/:sid", post(place_order))
        .route("/trading/cancel/:sid", post(cancel_order))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({"status": "healthy"}))
}

// ---- data -----------------------------------------------------------------

#[derive(Deserialize)]
struct MarketDataBody {
    stock_codes: Vec<String>,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
    #[serde(default = "default_period")]
    period: String,
}

fn default_period() -> String {
    "day1".to_string()
}

fn parse_period(raw: &str) -> Result<Period, GatewayError> {
    match raw.to_lowercase().as_str() {
        "tick" => Ok(Period::Tick),
        "min1" | "1m" => Ok(Period::Min1),
        "min5" | "5m" => Ok(Period::Min5),
        "min15" | "15m" => Ok(Period::Min15),
        "min30" | "30m" => Ok(Period::Min30),
        "hour1" | "1h" => Ok(Period::Hour1),
        "day1" | "1d" => Ok(Period::Day1),
        other => Err(GatewayError::InvalidArgument(format!(
            "unknown period: {other}"
        ))),
    }
}

fn parse_symbols(raw: &[String]) -> Result<Vec<SymbolCode>, GatewayError> {
    raw.iter()
        .map(|s| SymbolCode::parse(s).ok_or_else(|| GatewayError::EmptySymbols))
        .collect()
}

async fn market_data(
    State(state): State<Arc<AppState>>,
    _auth: AuthBearer,
    Json(body): Json<MarketDataBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let symbols = parse_symbols(&body.stock_codes)?;
    let period = parse_period(&body.period)?;
    let rows = state
        .data_service
        .market_data(&symbols, body.start_date, body.end_date, period)
        .await?;
    Ok(Json(json!({"items": rows, "total": rows_len(&rows)})))
}

fn rows_len<T>(rows: &[T]) -> usize {
    rows.len()
}

#[derive(Deserialize)]
struct FinancialBody {
    stock_codes: Vec<String>,
    table_list: Vec<String>,
}

async fn financial(
    State(state): State<Arc<AppState>>,
    _auth: AuthBearer,
    Json(body): Json<FinancialBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let symbols = parse_symbols(&body.stock_codes)?;
    let tables = state.data_service.financial(&symbols, &body.table_list).await?;
    Ok(Json(json!({"items": tables, "total": tables.len()})))
}

async fn sector_list(
    State(state): State<Arc<AppState>>,
    _auth: AuthBearer,
) -> ApiResult<Json<serde_json::Value>> {
    let sectors = state.data_service.sector_list().await?;
    Ok(Json(json!({"items": sectors, "total": sectors.len()})))
}

#[derive(Deserialize)]
struct SectorBody {
    sector_name: String,
}

async fn stock_list_in_sector(
    State(state): State<Arc<AppState>>,
    _auth: AuthBearer,
    Json(body): Json<SectorBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let stocks = state
        .data_service
        .stock_list_in_sector(&body.sector_name)
        .await?;
    Ok(Json(json!({"sector_name": body.sector_name, "stock_list": stocks})))
}

#[derive(Deserialize)]
struct IndexWeightBody {
    index_code: String,
    date: Option<DateTime<Utc>>,
}

async fn index_weight(
    State(state): State<Arc<AppState>>,
    _auth: AuthBearer,
    Json(body): Json<IndexWeightBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let weights = state
        .data_service
        .index_weight(&body.index_code, body.date)
        .await?;
    Ok(Json(json!({"items": weights, "total": weights.len()})))
}

async fn trading_calendar(
    State(state): State<Arc<AppState>>,
    _auth: AuthBearer,
    Path(year): Path<u16>,
) -> ApiResult<Json<serde_json::Value>> {
    let dates = state.data_service.trading_calendar(year).await?;
    let holidays = state.data_service.holidays(year).await?;
    Ok(Json(json!({
        "trading_dates": dates,
        "holidays": holidays,
        "year": year,
    })))
}

async fn instrument_info(
    State(state): State<Arc<AppState>>,
    _auth: AuthBearer,
    Path(code): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let symbol = SymbolCode::parse(&code).ok_or(GatewayError::EmptySymbols)?;
    let info = state.data_service.instrument_info(&symbol).await?;
    Ok(Json(serde_json::to_value(info).unwrap_or(serde_json::Value::Null)))
}

async fn period_list(
    State(state): State<Arc<AppState>>,
    _auth: AuthBearer,
) -> ApiResult<Json<serde_json::Value>> {
    let periods = state.data_service.period_list().await?;
    Ok(Json(json!({"items": periods, "total": periods.len()})))
}

async fn cb_info(
    State(state): State<Arc<AppState>>,
    _auth: AuthBearer,
) -> ApiResult<Json<serde_json::Value>> {
    let items = state.data_service.cb_info().await?;
    Ok(Json(json!({"items": items, "total": items.len()})))
}

async fn ipo_info(
    State(state): State<Arc<AppState>>,
    _auth: AuthBearer,
) -> ApiResult<Json<serde_json::Value>> {
    let items = state.data_service.ipo_info().await?;
    Ok(Json(json!({"items": items, "total": items.len()})))
}

async fn divid_factors(
    State(state): State<Arc<AppState>>,
    _auth: AuthBearer,
    Path(code): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let symbol = SymbolCode::parse(&code).ok_or(GatewayError::EmptySymbols)?;
    let factors = state.data_service.divid_factors(&symbol).await?;
    Ok(Json(json!({"items": factors, "total": factors.len()})))
}

#[derive(Deserialize)]
struct RangeBody {
    stock_codes: Vec<String>,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
    #[serde(default = "default_period")]
    period: String,
}

async fn tick_range(
    State(state): State<Arc<AppState>>,
    _auth: AuthBearer,
    Json(body): Json<RangeBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let symbols = parse_symbols(&body.stock_codes)?;
    let rows = state
        .data_service
        .tick_range(&symbols, body.start_date, body.end_date)
        .await?;
    Ok(Json(json!({"items": rows, "total": rows_len(&rows)})))
}

async fn kline_range(
    State(state): State<Arc<AppState>>,
    _auth: AuthBearer,
    Json(body): Json<RangeBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let symbols = parse_symbols(&body.stock_codes)?;
    let period = parse_period(&body.period)?;
    let rows = state
        .data_service
        .kline_range(&symbols, body.start_date, body.end_date, period)
        .await?;
    Ok(Json(json!({"items": rows, "total": rows_len(&rows)})))
}

#[derive(Deserialize)]
struct L2RangeBody {
    stock_codes: Vec<String>,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
}

async fn l2_quote(
    State(state): State<Arc<AppState>>,
    _auth: AuthBearer,
    Json(body): Json<L2RangeBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let symbols = parse_symbols(&body.stock_codes)?;
    let items = state
        .data_service
        .l2_quote(&symbols, body.start_date, body.end_date)
        .await?;
    Ok(Json(json!({"items": items, "total": items.len()})))
}

async fn l2_order(
    State(state): State<Arc<AppState>>,
    _auth: AuthBearer,
    Json(body): Json<L2RangeBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let symbols = parse_symbols(&body.stock_codes)?;
    let items = state
        .data_service
        .l2_order(&symbols, body.start_date, body.end_date)
        .await?;
    Ok(Json(json!({"items": items, "total": items.len()})))
}

async fn l2_transaction(
    State(state): State<Arc<AppState>>,
    _auth: AuthBearer,
    Json(body): Json<L2RangeBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let symbols = parse_symbols(&body.stock_codes)?;
    let items = state
        .data_service
        .l2_transaction(&symbols, body.start_date, body.end_date)
        .await?;
    Ok(Json(json!({"items": items, "total": items.len()})))
}

#[derive(Deserialize)]
struct DownloadBody {
    stock_codes: Vec<String>,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
    #[serde(default = "default_period")]
    period: String,
}

async fn start_download(
    State(state): State<Arc<AppState>>,
    _auth: AuthBearer,
    Json(body): Json<DownloadBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let symbols = parse_symbols(&body.stock_codes)?;
    let period = parse_period(&body.period)?;
    let task = state
        .data_service
        .start_download(DownloadRequest {
            symbols,
            start: body.start_date,
            end: body.end_date,
            period,
        })
        .await?;
    Ok(Json(serde_json::to_value(task).unwrap_or(serde_json::Value::Null)))
}

async fn download_status(
    State(state): State<Arc<AppState>>,
    _auth: AuthBearer,
    Path(task_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let task = state.data_service.download_status(task_id).await?;
    Ok(Json(serde_json::to_value(task).unwrap_or(serde_json::Value::Null)))
}

async fn add_symbol_to_sector(
    State(state): State<Arc<AppState>>,
    _auth: AuthBearer,
    Path((sector, code)): Path<(String, String)>,
) -> ApiResult<Json<serde_json::Value>> {
    let symbol = SymbolCode::parse(&code).ok_or(GatewayError::EmptySymbols)?;
    state.data_service.add_symbol_to_sector(&sector, &symbol).await?;
    Ok(Json(json!({"success": true})))
}

async fn remove_symbol_from_sector(
    State(state): State<Arc<AppState>>,
    _auth: AuthBearer,
    Path((sector, code)): Path<(String, String)>,
) -> ApiResult<Json<serde_json::Value>> {
    let symbol = SymbolCode::parse(&code).ok_or(GatewayError::EmptySymbols)?;
    state
        .data_service
        .remove_symbol_from_sector(&sector, &symbol)
        .await?;
    Ok(Json(json!({"success": true})))
}

#[derive(Deserialize)]
struct SubscribeBody {
    symbols: Vec<String>,
    #[serde(default)]
    adjust_type: Option<String>,
    #[serde(default = "default_subscription_type")]
    subscription_type: String,
}

fn default_subscription_type() -> String {
    "per_symbol".to_string()
}

async fn subscribe(
    State(state): State<Arc<AppState>>,
    _auth: AuthBearer,
    Json(body): Json<SubscribeBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let adjust: AdjustType = body
        .adjust_type
        .as_deref()
        .unwrap_or("none")
        .parse()
        .map_err(GatewayError::InvalidArgument)?;

    let id = if body.subscription_type == "firehose" {
        state.data_service.subscribe_firehose().await?
    } else {
        let symbols = parse_symbols(&body.symbols)?;
        state.data_service.subscribe(symbols, adjust).await?
    };

    let descriptor = state
        .data_service
        .describe_subscription(id)
        .ok_or_else(|| GatewayError::Internal("subscription vanished immediately".to_string()))?;

    Ok(Json(json!({
        "subscription_id": descriptor.id.to_string(),
        "status": "active",
        "created_at": descriptor.created_at,
    })))
}

async fn unsubscribe(
    State(state): State<Arc<AppState>>,
    _auth: AuthBearer,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let id = parse_subscription_id(&id)?;
    state.data_service.unsubscribe(id).await?;
    Ok(Json(json!({"success": true})))
}

async fn describe_subscription(
    State(state): State<Arc<AppState>>,
    _auth: AuthBearer,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let id = parse_subscription_id(&id)?;
    let descriptor = state
        .data_service
        .describe_subscription(id)
        .ok_or_else(|| GatewayError::NotFound(format!("subscription {id}")))?;
    Ok(Json(serde_json::to_value(descriptor).unwrap_or(serde_json::Value::Null)))
}

async fn list_subscriptions(
    State(state): State<Arc<AppState>>,
    _auth: AuthBearer,
) -> Json<serde_json::Value> {
    let subs = state.data_service.list_subscriptions();
    Json(json!({"subscriptions": subs, "total": subs.len()}))
}

fn parse_subscription_id(raw: &str) -> Result<SubscriptionId, GatewayError> {
    Uuid::parse_str(raw)
        .map(SubscriptionId)
        .map_err(|_| GatewayError::InvalidArgument(format!("invalid subscription id: {raw}")))
}

fn parse_session_id(raw: &str) -> Result<SessionId, GatewayError> {
    Uuid::parse_str(raw)
        .map(SessionId)
        .map_err(|_| GatewayError::InvalidArgument(format!("invalid session id: {raw}")))
}

// ---- trading ----------------------------------------------------------------

#[derive(Deserialize)]
struct ConnectBody {
    account_id: String,
    password: String,
    #[serde(default)]
    account_type: Option<String>,
}

#[derive(Serialize)]
struct ConnectResponse {
    session_id: String,
    account_info: gateway_core::session::AccountSnapshot,
}

async fn connect(
    State(state): State<Arc<AppState>>,
    _auth: AuthBearer,
    Json(body): Json<ConnectBody>,
) -> ApiResult<Json<ConnectResponse>> {
    let account_type = match body.account_type.as_deref() {
        Some("margin") => AccountType::Margin,
        _ => AccountType::Cash,
    };
    let (session_id, snapshot) = state
        .trading_service
        .connect(&body.account_id, &body.password, account_type)
        .await?;
    Ok(Json(ConnectResponse {
        session_id: session_id.0.to_string(),
        account_info: snapshot,
    }))
}

async fn disconnect(
    State(state): State<Arc<AppState>>,
    _auth: AuthBearer,
    Path(sid): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let session_id = parse_session_id(&sid)?;
    state.trading_service.disconnect(session_id).await?;
    Ok(Json(json!({"success": true})))
}

async fn query_asset(
    State(state): State<Arc<AppState>>,
    _auth: AuthBearer,
    Path(sid): Path<String>,
) -> ApiResult<Json<gateway_core::session::AccountSnapshot>> {
    let session_id = parse_session_id(&sid)?;
    let snapshot = state.trading_service.query_asset(session_id).await?;
    Ok(Json(snapshot))
}

async fn query_positions(
    State(state): State<Arc<AppState>>,
    _auth: AuthBearer,
    Path(sid): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let session_id = parse_session_id(&sid)?;
    let positions = state.trading_service.query_positions(session_id).await?;
    Ok(Json(json!({"items": positions, "total": positions.len()})))
}

async fn query_orders(
    State(state): State<Arc<AppState>>,
    _auth: AuthBearer,
    Path(sid): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let session_id = parse_session_id(&sid)?;
    let orders = state.trading_service.query_orders(session_id).await?;
    Ok(Json(json!({"items": orders, "total": orders.len()})))
}

async fn query_trades(
    State(state): State<Arc<AppState>>,
    _auth: AuthBearer,
    Path(sid): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let session_id = parse_session_id(&sid)?;
    let trades = state.trading_service.query_trades(session_id).await?;
    Ok(Json(json!({"items": trades, "total": trades.len()})))
}

#[derive(Deserialize)]
struct PlaceOrderBody {
    stock_code: String,
    side: String,
    order_type: String,
    volume: Decimal,
    price: Option<Decimal>,
}

async fn place_order(
    State(state): State<Arc<AppState>>,
    _auth: AuthBearer,
    Path(sid): Path<String>,
    Json(body): Json<PlaceOrderBody>,
) -> ApiResult<Json<gateway_core::OrderRecord>> {
    let session_id = parse_session_id(&sid)?;
    let symbol = SymbolCode::parse(&body.stock_code).ok_or(GatewayError::EmptySymbols)?;
    let side = match body.side.to_uppercase().as_str() {
        "BUY" => OrderSide::Buy,
        "SELL" => OrderSide::Sell,
        other => {
            return Err(GatewayError::InvalidArgument(format!("unknown side: {other}")).into())
        }
    };
    let order_type = match body.order_type.to_uppercase().as_str() {
        "MARKET" => OrderType::Market,
        "LIMIT" => OrderType::Limit,
        other => {
            return Err(
                GatewayError::InvalidArgument(format!("unknown order type: {other}")).into(),
            )
        }
    };
    let order = state
        .trading_service
        .place_order(session_id, &symbol, side, order_type, body.volume, body.price)
        .await?;
    Ok(Json(order))
}

#[derive(Deserialize)]
struct CancelOrderBody {
    order_id: String,
}

async fn cancel_order(
    State(state): State<Arc<AppState>>,
    _auth: AuthBearer,
    Path(sid): Path<String>,
    Json(body): Json<CancelOrderBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let session_id = parse_session_id(&sid)?;
    let order_id = Uuid::parse_str(&body.order_id)
        .map(gateway_core::OrderId)
        .map_err(|_| GatewayError::InvalidArgument(format!("invalid order id: {}", body.order_id)))?;
    state.trading_service.cancel_order(session_id, order_id).await?;
    Ok(Json(json!({"success": true})))
}
