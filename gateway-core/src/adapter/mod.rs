mod live;
mod read_live;
mod simulation;

pub use live::LiveAdapter;
pub use read_live::ReadLiveAdapter;
pub use simulation::SimulationAdapter;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;
use crate::session::{AccountSnapshot, OrderId, OrderRecord, OrderSide, OrderType};
use crate::subscription::AdjustType;
use crate::symbol::{SymbolCode, TickFrame};

/// A frame-delivery callback invoked from the adapter's private callback
/// thread. Implementations MUST NOT re-enter the adapter from within the
/// callback.
pub type FrameCallback = std::sync::Arc<dyn Fn(TickFrame) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Period {
    Tick,
    Min1,
    Min5,
    Min15,
    Min30,
    Hour1,
    Day1,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketDataRow {
    pub symbol: SymbolCode,
    pub time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinancialTable {
    pub table_name: String,
    pub rows: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentInfo {
    pub symbol: SymbolCode,
    pub name: String,
    pub sector: String,
    pub lot_size: u32,
    pub tick_size: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DownloadStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadTask {
    pub task_id: uuid::Uuid,
    pub status: DownloadStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionRecord {
    pub symbol: SymbolCode,
    pub volume: Decimal,
    pub avg_price: Decimal,
    pub unrealized_pnl: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub trade_id: uuid::Uuid,
    pub order_id: OrderId,
    pub symbol: SymbolCode,
    pub side: OrderSide,
    pub volume: Decimal,
    pub price: Decimal,
    pub traded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct L2Level {
    pub price: Decimal,
    pub volume: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct L2Quote {
    pub symbol: SymbolCode,
    pub time: DateTime<Utc>,
    pub bids: Vec<L2Level>,
    pub asks: Vec<L2Level>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct L2Order {
    pub symbol: SymbolCode,
    pub time: DateTime<Utc>,
    pub order_id: u64,
    pub side: OrderSide,
    pub price: Decimal,
    pub volume: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct L2Transaction {
    pub symbol: SymbolCode,
    pub time: DateTime<Utc>,
    pub price: Decimal,
    pub volume: u64,
    pub buy_order_id: u64,
    pub sell_order_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadRequest {
    pub symbols: Vec<SymbolCode>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub period: Period,
}

/// Uniform façade over the proprietary native market-data and trading
/// library. Three concrete variants implement this trait; callers never
/// match on which variant they hold.
#[async_trait]
pub trait UpstreamAdapter: Send + Sync {
    fn name(&self) -> &'static str;

    // ---- reference & market data (reads) ------------------------------
    async fn market_data(
        &self,
        symbols: &[SymbolCode],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        period: Period,
    ) -> Result<Vec<MarketDataRow>, GatewayError>;

    async fn financial(
        &self,
        symbols: &[SymbolCode],
        tables: &[String],
    ) -> Result<Vec<FinancialTable>, GatewayError>;

    async fn sector_list(&self) -> Result<Vec<String>, GatewayError>;

    async fn stock_list_in_sector(&self, sector: &str) -> Result<Vec<SymbolCode>, GatewayError>;

    async fn index_weight(
        &self,
        index_code: &str,
        date: Option<DateTime<Utc>>,
    ) -> Result<Vec<(SymbolCode, Decimal)>, GatewayError>;

    async fn trading_calendar(&self, year: u16) -> Result<Vec<DateTime<Utc>>, GatewayError>;

    async fn instrument_info(&self, symbol: &SymbolCode) -> Result<InstrumentInfo, GatewayError>;

    async fn holidays(&self, year: u16) -> Result<Vec<DateTime<Utc>>, GatewayError>;

    async fn period_list(&self) -> Result<Vec<Period>, GatewayError>;

    async fn cb_info(&self) -> Result<Vec<InstrumentInfo>, GatewayError>;

    async fn ipo_info(&self) -> Result<Vec<InstrumentInfo>, GatewayError>;

    async fn divid_factors(
        &self,
        symbol: &SymbolCode,
    ) -> Result<Vec<(DateTime<Utc>, Decimal)>, GatewayError>;

    async fn tick_range(
        &self,
        symbols: &[SymbolCode],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<MarketDataRow>, GatewayError>;

    async fn kline_range(
        &self,
        symbols: &[SymbolCode],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        period: Period,
    ) -> Result<Vec<MarketDataRow>, GatewayError>;

    async fn l2_quote(
        &self,
        symbols: &[SymbolCode],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<L2Quote>, GatewayError>;

    async fn l2_order(
        &self,
        symbols: &[SymbolCode],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<L2Order>, GatewayError>;

    async fn l2_transaction(
        &self,
        symbols: &[SymbolCode],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<L2Transaction>, GatewayError>;

    async fn start_download(&self, request: DownloadRequest) -> Result<DownloadTask, GatewayError>;

    async fn download_status(&self, task_id: uuid::Uuid) -> Result<DownloadTask, GatewayError>;

    async fn add_symbol_to_sector(
        &self,
        sector: &str,
        symbol: &SymbolCode,
    ) -> Result<(), GatewayError>;

    async fn remove_symbol_from_sector(
        &self,
        sector: &str,
        symbol: &SymbolCode,
    ) -> Result<(), GatewayError>;

    // ---- subscriptions --------------------------------------------------
    /// Subscribe to a set of symbols. The callback is invoked from the
    /// adapter's private thread, never re-entering the adapter.
    async fn subscribe_symbols(
        &self,
        symbols: &[SymbolCode],
        adjust: AdjustType,
        on_frame: FrameCallback,
    ) -> Result<(), GatewayError>;

    async fn subscribe_firehose(&self, on_frame: FrameCallback) -> Result<(), GatewayError>;

    /// `symbol` is either a concrete symbol or the literal token `"*"` for
    /// firehose unsubscribe; the adapter treats it as an opaque token it
    /// recognises rather than a real symbol code.
    async fn unsubscribe(&self, symbol: &str) -> Result<(), GatewayError>;

    // ---- trading (mutating calls gated by the Policy Gate upstream) ----
    async fn connect(&self, account_id: &str, password: &str) -> Result<AccountSnapshot, GatewayError>;

    async fn disconnect(&self, account_id: &str) -> Result<(), GatewayError>;

    async fn order(
        &self,
        account_id: &str,
        symbol: &SymbolCode,
        side: OrderSide,
        order_type: OrderType,
        volume: Decimal,
        price: Option<Decimal>,
    ) -> Result<OrderRecord, GatewayError>;

    async fn cancel(&self, account_id: &str, order_id: OrderId) -> Result<(), GatewayError>;

    async fn query_positions(&self, account_id: &str) -> Result<Vec<PositionRecord>, GatewayError>;

    async fn query_asset(&self, account_id: &str) -> Result<AccountSnapshot, GatewayError>;

    async fn query_orders(&self, account_id: &str) -> Result<Vec<OrderRecord>, GatewayError>;

    async fn query_trades(&self, account_id: &str) -> Result<Vec<TradeRecord>, GatewayError>;
}
