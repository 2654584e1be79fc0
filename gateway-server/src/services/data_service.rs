use std::sync::Arc;

use chrono::{DateTime, Utc};
use gateway_core::adapter::{
    DownloadRequest, DownloadTask, FinancialTable, InstrumentInfo, L2Order, L2Quote,
    L2Transaction, MarketDataRow, Period,
};
use gateway_core::{AdjustType, GatewayError, SymbolCode, UpstreamAdapter};
use rust_decimal::Decimal;

use crate::subscription_manager::{SubscriptionDescriptor, SubscriptionManager};

/// Validates and forwards every read-only market-data call, and owns the
/// subscribe/unsubscribe surface on top of the Subscription Manager.
#[derive(Clone)]
pub struct DataService {
    adapter: Arc<dyn UpstreamAdapter>,
    subscriptions: SubscriptionManager,
}

fn require_symbols(symbols: &[SymbolCode]) -> Result<(), GatewayError> {
    if symbols.is_empty() {
        return Err(GatewayError::EmptySymbols);
    }
    Ok(())
}

impl DataService {
    pub fn new(adapter: Arc<dyn UpstreamAdapter>, subscriptions: SubscriptionManager) -> Self {
        DataService {
            adapter,
            subscriptions,
        }
    }

    pub fn subscriptions(&self) -> &SubscriptionManager {
        &self.subscriptions
    }

    pub async fn market_data(
        &self,
        symbols: &[SymbolCode],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        period: Period,
    ) -> Result<Vec<MarketDataRow>, GatewayError> {
        require_symbols(symbols)?;
        if start > end {
            return Err(GatewayError::InvalidArgument(
                "start must not be after end".to_string(),
            ));
        }
        self.adapter.market_data(symbols, start, end, period).await
    }

    pub async fn financial(
        &self,
        symbols: &[SymbolCode],
        tables: &[String],
    ) -> Result<Vec<FinancialTable>, GatewayError> {
        require_symbols(symbols)?;
        if tables.is_empty() {
            return Err(GatewayError::InvalidArgument(
                "table list must not be empty".to_string(),
            ));
        }
        self.adapter.financial(symbols, tables).await
    }

    pub async fn sector_list(&self) -> Result<Vec<String>, GatewayError> {
        self.adapter.sector_list().await
    }

    pub async fn stock_list_in_sector(&self, sector: &str) -> Result<Vec<SymbolCode>, GatewayError> {
        if sector.trim().is_empty() {
            return Err(GatewayError::InvalidArgument(
                "sector must not be blank".to_string(),
            ));
        }
        self.adapter.stock_list_in_sector(sector).await
    }

    pub async fn index_weight(
        &self,
        index_code: &str,
        date: Option<DateTime<Utc>>,
    ) -> Result<Vec<(SymbolCode, Decimal)>, GatewayError> {
        if index_code.trim().is_empty() {
            return Err(GatewayError::InvalidArgument(
                "index code must not be blank".to_string(),
            ));
        }
        self.adapter.index_weight(index_code, date).await
    }

    pub async fn trading_calendar(&self, year: u16) -> Result<Vec<DateTime<Utc>>, GatewayError> {
        self.adapter.trading_calendar(year).await
    }

    pub async fn instrument_info(&self, symbol: &SymbolCode) -> Result<InstrumentInfo, GatewayError> {
        self.adapter.instrument_info(symbol).await
    }

    pub async fn holidays(&self, year: u16) -> Result<Vec<DateTime<Utc>>, GatewayError> {
        self.adapter.holidays(year).await
    }

    pub async fn period_list(&self) -> Result<Vec<Period>, GatewayError> {
        self.adapter.period_list().await
    }

    pub async fn cb_info(&self) -> Result<Vec<InstrumentInfo>, GatewayError> {
        self.adapter.cb_info().await
    }

    pub async fn ipo_info(&self) -> Result<Vec<InstrumentInfo>, GatewayError> {
        self.adapter.ipo_info().await
    }

    pub async fn divid_factors(
        &self,
        symbol: &SymbolCode,
    ) -> Result<Vec<(DateTime<Utc>, Decimal)>, GatewayError> {
        self.adapter.divid_factors(symbol).await
    }

    fn require_range(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<(), GatewayError> {
        if start > end {
            return Err(GatewayError::InvalidArgument(
                "start must not be after end".to_string(),
            ));
        }
        Ok(())
    }

    pub async fn tick_range(
        &self,
        symbols: &[SymbolCode],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<MarketDataRow>, GatewayError> {
        require_symbols(symbols)?;
        Self::require_range(start, end)?;
        self.adapter.tick_range(symbols, start, end).await
    }

    pub async fn kline_range(
        &self,
        symbols: &[SymbolCode],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        period: Period,
    ) -> Result<Vec<MarketDataRow>, GatewayError> {
        require_symbols(symbols)?;
        Self::require_range(start, end)?;
        self.adapter.kline_range(symbols, start, end, period).await
    }

    pub async fn l2_quote(
        &self,
        symbols: &[SymbolCode],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<L2Quote>, GatewayError> {
        require_symbols(symbols)?;
        Self::require_range(start, end)?;
        self.adapter.l2_quote(symbols, start, end).await
    }

    pub async fn l2_order(
        &self,
        symbols: &[SymbolCode],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<L2Order>, GatewayError> {
        require_symbols(symbols)?;
        Self::require_range(start, end)?;
        self.adapter.l2_order(symbols, start, end).await
    }

    pub async fn l2_transaction(
        &self,
        symbols: &[SymbolCode],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<L2Transaction>, GatewayError> {
        require_symbols(symbols)?;
        Self::require_range(start, end)?;
        self.adapter.l2_transaction(symbols, start, end).await
    }

    pub async fn start_download(&self, request: DownloadRequest) -> Result<DownloadTask, GatewayError> {
        require_symbols(&request.symbols)?;
        Self::require_range(request.start, request.end)?;
        self.adapter.start_download(request).await
    }

    pub async fn download_status(&self, task_id: uuid::Uuid) -> Result<DownloadTask, GatewayError> {
        self.adapter.download_status(task_id).await
    }

    pub async fn add_symbol_to_sector(
        &self,
        sector: &str,
        symbol: &SymbolCode,
    ) -> Result<(), GatewayError> {
        if sector.trim().is_empty() {
            return Err(GatewayError::InvalidArgument(
                "sector must not be blank".to_string(),
            ));
        }
        self.adapter.add_symbol_to_sector(sector, symbol).await
    }

    pub async fn remove_symbol_from_sector(
        &self,
        sector: &str,
        symbol: &SymbolCode,
    ) -> Result<(), GatewayError> {
        if sector.trim().is_empty() {
            return Err(GatewayError::InvalidArgument(
                "sector must not be blank".to_string(),
            ));
        }
        self.adapter.remove_symbol_from_sector(sector, symbol).await
    }

    pub async fn subscribe(
        &self,
        symbols: Vec<SymbolCode>,
        adjust: AdjustType,
    ) -> Result<gateway_core::SubscriptionId, GatewayError> {
        self.subscriptions.subscribe(symbols, adjust).await
    }

    pub async fn subscribe_firehose(&self) -> Result<gateway_core::SubscriptionId, GatewayError> {
        self.subscriptions.subscribe_firehose().await
    }

    pub async fn unsubscribe(&self, id: gateway_core::SubscriptionId) -> Result<(), GatewayError> {
        self.subscriptions.unsubscribe(id).await
    }

    pub fn describe_subscription(
        &self,
        id: gateway_core::SubscriptionId,
    ) -> Option<SubscriptionDescriptor> {
        self.subscriptions.describe(id)
    }

    pub fn list_subscriptions(&self) -> Vec<SubscriptionDescriptor> {
        self.subscriptions.list()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_core::adapter::SimulationAdapter;
    use gateway_core::config::SubscriptionCaps;
    use gateway_core::Mode;

    fn service() -> DataService {
        let adapter: Arc<dyn UpstreamAdapter> = Arc::new(SimulationAdapter::new());
        let caps = SubscriptionCaps {
            max_subs: 10,
            queue_depth: 10,
            heartbeat_timeout_secs: 60,
            firehose_enabled: true,
        };
        let subs = SubscriptionManager::new(caps, Mode::Dev, adapter.clone());
        DataService::new(adapter, subs)
    }

    #[tokio::test]
    async fn market_data_rejects_empty_symbols() {
        let svc = service();
        let now = Utc::now();
        let err = svc
            .market_data(&[], now, now, Period::Day1)
            .await
            .unwrap_err();
        assert_eq!(err, GatewayError::EmptySymbols);
    }

    #[tokio::test]
    async fn market_data_rejects_inverted_range() {
        let svc = service();
        let symbol = SymbolCode::parse("000001.SZ").unwrap();
        let now = Utc::now();
        let earlier = now - chrono::Duration::days(1);
        let err = svc
            .market_data(&[symbol], now, earlier, Period::Day1)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn subscribe_then_describe_round_trips() {
        let svc = service();
        let symbol = SymbolCode::parse("000001.SZ").unwrap();
        let id = svc.subscribe(vec![symbol], AdjustType::None).await.unwrap();
        assert!(svc.describe_subscription(id).is_some());
        svc.unsubscribe(id).await.unwrap();
        assert!(svc.describe_subscription(id).is_none());
    }
}
