use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::adapter::{
    DownloadRequest, DownloadTask, FinancialTable, FrameCallback, InstrumentInfo, L2Order,
    L2Quote, L2Transaction, MarketDataRow, Period, PositionRecord, TradeRecord, UpstreamAdapter,
};
use crate::error::GatewayError;
use crate::session::{AccountSnapshot, OrderId, OrderRecord, OrderSide, OrderType};
use crate::subscription::AdjustType;
use crate::symbol::SymbolCode;

/// Delegates reads to the native library, rejects every order-mutating
/// operation with `PolicyBlocked`.
///
/// The native library itself is out of scope here; this variant
/// documents the seam a production build would fill in (an FFI or IPC
/// client) and fails reads with `UpstreamFailure` rather than linking
/// anything, so the workspace still builds without the proprietary library.
pub struct ReadLiveAdapter;

impl Default for ReadLiveAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadLiveAdapter {
    pub fn new() -> Self {
        ReadLiveAdapter
    }

    fn unavailable() -> GatewayError {
        GatewayError::UpstreamFailure(
            "native market-data library is not linked into this build".to_string(),
        )
    }
}

#[async_trait]
impl UpstreamAdapter for ReadLiveAdapter {
    fn name(&self) -> &'static str {
        "read-live"
    }

    async fn market_data(
        &self,
        _symbols: &[SymbolCode],
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
        _period: Period,
    ) -> Result<Vec<MarketDataRow>, GatewayError> {
        Err(Self::unavailable())
    }

    async fn financial(
        &self,
        _symbols: &[SymbolCode],
        _tables: &[String],
    ) -> Result<Vec<FinancialTable>, GatewayError> {
        Err(Self::unavailable())
    }

    async fn sector_list(&self) -> Result<Vec<String>, GatewayError> {
        Err(Self::unavailable())
    }

    async fn stock_list_in_sector(&self, _sector: &str) -> Result<Vec<SymbolCode>, GatewayError> {
        Err(Self::unavailable())
    }

    async fn index_weight(
        &self,
        _index_code: &str,
        _date: Option<DateTime<Utc>>,
    ) -> Result<Vec<(SymbolCode, Decimal)>, GatewayError> {
        Err(Self::unavailable())
    }

    async fn trading_calendar(&self, _year: u16) -> Result<Vec<DateTime<Utc>>, GatewayError> {
        Err(Self::unavailable())
    }

    async fn instrument_info(&self, _symbol: &SymbolCode) -> Result<InstrumentInfo, GatewayError> {
        Err(Self::unavailable())
    }

    async fn holidays(&self, _year: u16) -> Result<Vec<DateTime<Utc>>, GatewayError> {
        Err(Self::unavailable())
    }

    async fn period_list(&self) -> Result<Vec<Period>, GatewayError> {
        Err(Self::unavailable())
    }

    async fn cb_info(&self) -> Result<Vec<InstrumentInfo>, GatewayError> {
        Err(Self::unavailable())
    }

    async fn ipo_info(&self) -> Result<Vec<InstrumentInfo>, GatewayError> {
        Err(Self::unavailable())
    }

    async fn divid_factors(
        &self,
        _symbol: &SymbolCode,
    ) -> Result<Vec<(DateTime<Utc>, Decimal)>, GatewayError> {
        Err(Self::unavailable())
    }

    async fn tick_range(
        &self,
        _symbols: &[SymbolCode],
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Result<Vec<MarketDataRow>, GatewayError> {
        Err(Self::unavailable())
    }

    async fn kline_range(
        &self,
        _symbols: &[SymbolCode],
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
        _period: Period,
    ) -> Result<Vec<MarketDataRow>, GatewayError> {
        Err(Self::unavailable())
    }

    async fn l2_quote(
        &self,
        _symbols: &[SymbolCode],
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Result<Vec<L2Quote>, GatewayError> {
        Err(Self::unavailable())
    }

    async fn l2_order(
        &self,
        _symbols: &[SymbolCode],
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Result<Vec<L2Order>, GatewayError> {
        Err(Self::unavailable())
    }

    async fn l2_transaction(
        &self,
        _symbols: &[SymbolCode],
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Result<Vec<L2Transaction>, GatewayError> {
        Err(Self::unavailable())
    }

    async fn start_download(&self, _request: DownloadRequest) -> Result<DownloadTask, GatewayError> {
        Err(Self::unavailable())
    }

    async fn download_status(&self, _task_id: uuid::Uuid) -> Result<DownloadTask, GatewayError> {
        Err(Self::unavailable())
    }

    async fn add_symbol_to_sector(
        &self,
        _sector: &str,
        _symbol: &SymbolCode,
    ) -> Result<(), GatewayError> {
        Err(Self::unavailable())
    }

    async fn remove_symbol_from_sector(
        &self,
        _sector: &str,
        _symbol: &SymbolCode,
    ) -> Result<(), GatewayError> {
        Err(Self::unavailable())
    }

    async fn subscribe_symbols(
        &self,
        _symbols: &[SymbolCode],
        _adjust: AdjustType,
        _on_frame: FrameCallback,
    ) -> Result<(), GatewayError> {
        Err(Self::unavailable())
    }

    async fn subscribe_firehose(&self, _on_frame: FrameCallback) -> Result<(), GatewayError> {
        Err(Self::unavailable())
    }

    async fn unsubscribe(&self, _symbol: &str) -> Result<(), GatewayError> {
        Ok(())
    }

    async fn connect(&self, _account_id: &str, _password: &str) -> Result<AccountSnapshot, GatewayError> {
        Err(Self::unavailable())
    }

    async fn disconnect(&self, _account_id: &str) -> Result<(), GatewayError> {
        Ok(())
    }

    async fn order(
        &self,
        _account_id: &str,
        _symbol: &SymbolCode,
        _side: OrderSide,
        _order_type: OrderType,
        _volume: Decimal,
        _price: Option<Decimal>,
    ) -> Result<OrderRecord, GatewayError> {
        Err(GatewayError::PolicyBlocked)
    }

    async fn cancel(&self, _account_id: &str, _order_id: OrderId) -> Result<(), GatewayError> {
        Err(GatewayError::PolicyBlocked)
    }

    async fn query_positions(&self, _account_id: &str) -> Result<Vec<PositionRecord>, GatewayError> {
        Err(Self::unavailable())
    }

    async fn query_asset(&self, _account_id: &str) -> Result<AccountSnapshot, GatewayError> {
        Err(Self::unavailable())
    }

    async fn query_orders(&self, _account_id: &str) -> Result<Vec<OrderRecord>, GatewayError> {
        Err(Self::unavailable())
    }

    async fn query_trades(&self, _account_id: &str) -> Result<Vec<TradeRecord>, GatewayError> {
        Err(Self::unavailable())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mutating_calls_are_policy_blocked_not_upstream_failure() {
        let adapter = ReadLiveAdapter::new();
        let symbol = SymbolCode::parse("000001.SZ").unwrap();
        let err = adapter
            .order(
                "acct",
                &symbol,
                OrderSide::Buy,
                OrderType::Market,
                Decimal::new(1, 0),
                None,
            )
            .await
            .unwrap_err();
        assert_eq!(err, GatewayError::PolicyBlocked);
    }
}
