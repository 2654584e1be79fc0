use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use rust_decimal::Decimal;

use crate::adapter::{
    DownloadRequest, DownloadStatus, DownloadTask, FinancialTable, FrameCallback, InstrumentInfo,
    L2Level, L2Order, L2Quote, L2Transaction, MarketDataRow, Period, PositionRecord, TradeRecord,
    UpstreamAdapter,
};
use crate::error::GatewayError;
use crate::session::{AccountSnapshot, OrderId, OrderRecord, OrderSide, OrderStatus, OrderType};
use crate::subscription::AdjustType;
use crate::symbol::{Quote, SymbolCode, TickFrame};

const TICK_INTERVAL: Duration = Duration::from_millis(250);

/// Generates plausible tick streams and reference data on demand and
/// accepts orders, replying instantly. Carries no native dependency so the
/// gateway builds and tests on any developer box.
pub struct SimulationAdapter {
    tracked_symbols: Arc<DashSet<String>>,
    firehose: Arc<AtomicBool>,
    callback: Arc<Mutex<Option<FrameCallback>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
    running: Arc<AtomicBool>,
    custom_sectors: Arc<DashMap<String, DashSet<String>>>,
}

impl Default for SimulationAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulationAdapter {
    pub fn new() -> Self {
        SimulationAdapter {
            tracked_symbols: Arc::new(DashSet::new()),
            firehose: Arc::new(AtomicBool::new(false)),
            callback: Arc::new(Mutex::new(None)),
            thread: Mutex::new(None),
            running: Arc::new(AtomicBool::new(false)),
            custom_sectors: Arc::new(DashMap::new()),
        }
    }

    fn ensure_thread_started(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let tracked_symbols = self.tracked_symbols.clone();
        let firehose = self.firehose.clone();
        let callback = self.callback.clone();
        let running = self.running.clone();
        let handle = std::thread::Builder::new()
            .name("sim-adapter-callback".into())
            .spawn(move || {
                while running.load(Ordering::SeqCst) {
                    std::thread::sleep(TICK_INTERVAL);
                    let cb = callback.lock().clone();
                    let Some(cb) = cb else { continue };

                    let mut universe: Vec<String> =
                        tracked_symbols.iter().map(|s| s.clone()).collect();
                    if firehose.load(Ordering::SeqCst) {
                        for s in ["000001.SZ", "600000.SH", "300750.SZ"] {
                            if !universe.iter().any(|u| u == s) {
                                universe.push(s.to_string());
                            }
                        }
                    }
                    if universe.is_empty() {
                        continue;
                    }

                    let mut frame: TickFrame = TickFrame::new();
                    for symbol in universe {
                        let Some(code) = SymbolCode::parse(&symbol) else {
                            continue;
                        };
                        frame.insert(code, synthetic_quote(&symbol));
                    }
                    cb(frame);
                }
            })
            .expect("spawn simulation adapter callback thread");
        *self.thread.lock() = Some(handle);
    }

    /// Stops the callback thread. Idempotent; safe to call even if the
    /// thread was never started.
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread.lock().take() {
            let _ = handle.join();
        }
    }
}

fn stable_hash(s: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    s.hash(&mut hasher);
    hasher.finish()
}

fn synthetic_quote(symbol: &str) -> Quote {
    let base = 10.0 + (stable_hash(symbol) % 100) as f64 / 10.0;
    Quote {
        last_price: Decimal::from_f64_retain(base).unwrap_or_default(),
        volume: 1_000_000,
        amount: Decimal::from_f64_retain(base * 1_000_000.0).unwrap_or_default(),
        open: Decimal::from_f64_retain(base * 0.99).unwrap_or_default(),
        high: Decimal::from_f64_retain(base * 1.05).unwrap_or_default(),
        low: Decimal::from_f64_retain(base * 0.98).unwrap_or_default(),
        close: Decimal::from_f64_retain(base).unwrap_or_default(),
        bid: Decimal::from_f64_retain(base * 0.999),
        ask: Decimal::from_f64_retain(base * 1.001),
        ts: Utc::now(),
    }
}

#[async_trait]
impl UpstreamAdapter for SimulationAdapter {
    fn name(&self) -> &'static str {
        "simulation"
    }

    async fn market_data(
        &self,
        symbols: &[SymbolCode],
        start: DateTime<Utc>,
        _end: DateTime<Utc>,
        _period: Period,
    ) -> Result<Vec<MarketDataRow>, GatewayError> {
        Ok(symbols
            .iter()
            .map(|s| {
                let q = synthetic_quote(s.as_str());
                MarketDataRow {
                    symbol: s.clone(),
                    time: start,
                    open: q.open,
                    high: q.high,
                    low: q.low,
                    close: q.close,
                    volume: q.volume,
                }
            })
            .collect())
    }

    async fn financial(
        &self,
        symbols: &[SymbolCode],
        tables: &[String],
    ) -> Result<Vec<FinancialTable>, GatewayError> {
        Ok(tables
            .iter()
            .map(|t| FinancialTable {
                table_name: t.clone(),
                rows: symbols
                    .iter()
                    .map(|s| serde_json::json!({"symbol": s.as_str(), "value": 0}))
                    .collect(),
            })
            .collect())
    }

    async fn sector_list(&self) -> Result<Vec<String>, GatewayError> {
        Ok(vec!["Technology".into(), "Financials".into(), "Energy".into()])
    }

    async fn stock_list_in_sector(&self, sector: &str) -> Result<Vec<SymbolCode>, GatewayError> {
        let _ = sector;
        Ok(["000001.SZ", "600000.SH"]
            .iter()
            .filter_map(|s| SymbolCode::parse(s))
            .collect())
    }

    async fn index_weight(
        &self,
        _index_code: &str,
        _date: Option<DateTime<Utc>>,
    ) -> Result<Vec<(SymbolCode, Decimal)>, GatewayError> {
        Ok(vec![(
            SymbolCode::parse("000001.SZ").unwrap(),
            Decimal::new(500, 2),
        )])
    }

    async fn trading_calendar(&self, year: u16) -> Result<Vec<DateTime<Utc>>, GatewayError> {
        use chrono::TimeZone;
        let mut days = Vec::new();
        let mut date = Utc.with_ymd_and_hms(year as i32, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(year as i32, 12, 31, 0, 0, 0).unwrap();
        while date <= end {
            use chrono::Datelike;
            if date.weekday().num_days_from_monday() < 5 {
                days.push(date);
            }
            date += chrono::Duration::days(1);
        }
        Ok(days)
    }

    async fn instrument_info(&self, symbol: &SymbolCode) -> Result<InstrumentInfo, GatewayError> {
        Ok(InstrumentInfo {
            symbol: symbol.clone(),
            name: format!("{} simulated instrument", symbol.as_str()),
            sector: "Technology".to_string(),
            lot_size: 100,
            tick_size: Decimal::new(1, 2),
        })
    }

    async fn holidays(&self, year: u16) -> Result<Vec<DateTime<Utc>>, GatewayError> {
        use chrono::TimeZone;
        Ok(vec![Utc.with_ymd_and_hms(year as i32, 1, 1, 0, 0, 0).unwrap()])
    }

    async fn period_list(&self) -> Result<Vec<Period>, GatewayError> {
        Ok(vec![
            Period::Tick,
            Period::Min1,
            Period::Min5,
            Period::Min15,
            Period::Min30,
            Period::Hour1,
            Period::Day1,
        ])
    }

    async fn cb_info(&self) -> Result<Vec<InstrumentInfo>, GatewayError> {
        Ok(vec![InstrumentInfo {
            symbol: SymbolCode::parse("113050.SH").unwrap(),
            name: "simulated convertible bond".to_string(),
            sector: "ConvertibleBond".to_string(),
            lot_size: 10,
            tick_size: Decimal::new(1, 3),
        }])
    }

    async fn ipo_info(&self) -> Result<Vec<InstrumentInfo>, GatewayError> {
        Ok(vec![InstrumentInfo {
            symbol: SymbolCode::parse("001000.SZ").unwrap(),
            name: "simulated IPO".to_string(),
            sector: "IPO".to_string(),
            lot_size: 100,
            tick_size: Decimal::new(1, 2),
        }])
    }

    async fn divid_factors(
        &self,
        symbol: &SymbolCode,
    ) -> Result<Vec<(DateTime<Utc>, Decimal)>, GatewayError> {
        let _ = symbol;
        Ok(vec![(Utc::now(), Decimal::ONE)])
    }

    async fn tick_range(
        &self,
        symbols: &[SymbolCode],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<MarketDataRow>, GatewayError> {
        self.market_data(symbols, start, end, Period::Tick).await
    }

    async fn kline_range(
        &self,
        symbols: &[SymbolCode],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        period: Period,
    ) -> Result<Vec<MarketDataRow>, GatewayError> {
        self.market_data(symbols, start, end, period).await
    }

    async fn l2_quote(
        &self,
        symbols: &[SymbolCode],
        start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Result<Vec<L2Quote>, GatewayError> {
        Ok(symbols
            .iter()
            .map(|s| {
                let q = synthetic_quote(s.as_str());
                L2Quote {
                    symbol: s.clone(),
                    time: start,
                    bids: vec![L2Level { price: q.bid.unwrap_or(q.close), volume: 100 }],
                    asks: vec![L2Level { price: q.ask.unwrap_or(q.close), volume: 100 }],
                }
            })
            .collect())
    }

    async fn l2_order(
        &self,
        symbols: &[SymbolCode],
        start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Result<Vec<L2Order>, GatewayError> {
        Ok(symbols
            .iter()
            .map(|s| {
                let q = synthetic_quote(s.as_str());
                L2Order {
                    symbol: s.clone(),
                    time: start,
                    order_id: stable_hash(s.as_str()),
                    side: OrderSide::Buy,
                    price: q.close,
                    volume: 100,
                }
            })
            .collect())
    }

    async fn l2_transaction(
        &self,
        symbols: &[SymbolCode],
        start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Result<Vec<L2Transaction>, GatewayError> {
        Ok(symbols
            .iter()
            .map(|s| {
                let q = synthetic_quote(s.as_str());
                let id = stable_hash(s.as_str());
                L2Transaction {
                    symbol: s.clone(),
                    time: start,
                    price: q.close,
                    volume: 100,
                    buy_order_id: id,
                    sell_order_id: id.wrapping_add(1),
                }
            })
            .collect())
    }

    async fn start_download(&self, request: DownloadRequest) -> Result<DownloadTask, GatewayError> {
        let _ = request;
        Ok(DownloadTask {
            task_id: uuid::Uuid::new_v4(),
            status: DownloadStatus::Completed,
        })
    }

    async fn download_status(&self, task_id: uuid::Uuid) -> Result<DownloadTask, GatewayError> {
        Ok(DownloadTask {
            task_id,
            status: DownloadStatus::Completed,
        })
    }

    async fn add_symbol_to_sector(
        &self,
        sector: &str,
        symbol: &SymbolCode,
    ) -> Result<(), GatewayError> {
        self.custom_sectors
            .entry(sector.to_string())
            .or_default()
            .insert(symbol.as_str().to_string());
        Ok(())
    }

    async fn remove_symbol_from_sector(
        &self,
        sector: &str,
        symbol: &SymbolCode,
    ) -> Result<(), GatewayError> {
        if let Some(members) = self.custom_sectors.get(sector) {
            members.remove(symbol.as_str());
        }
        Ok(())
    }

    async fn subscribe_symbols(
        &self,
        symbols: &[SymbolCode],
        _adjust: AdjustType,
        on_frame: FrameCallback,
    ) -> Result<(), GatewayError> {
        *self.callback.lock() = Some(on_frame);
        for s in symbols {
            self.tracked_symbols.insert(s.as_str().to_string());
        }
        self.ensure_thread_started();
        Ok(())
    }

    async fn subscribe_firehose(&self, on_frame: FrameCallback) -> Result<(), GatewayError> {
        *self.callback.lock() = Some(on_frame);
        self.firehose.store(true, Ordering::SeqCst);
        self.ensure_thread_started();
        Ok(())
    }

    async fn unsubscribe(&self, symbol: &str) -> Result<(), GatewayError> {
        if symbol == "*" {
            self.firehose.store(false, Ordering::SeqCst);
        } else {
            self.tracked_symbols.remove(symbol);
        }
        if self.tracked_symbols.is_empty() && !self.firehose.load(Ordering::SeqCst) {
            self.running.store(false, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn connect(&self, _account_id: &str, _password: &str) -> Result<AccountSnapshot, GatewayError> {
        Ok(AccountSnapshot {
            cash: Decimal::new(100_000_00, 2),
            equity: Decimal::new(100_000_00, 2),
            margin_used: Decimal::ZERO,
        })
    }

    async fn disconnect(&self, _account_id: &str) -> Result<(), GatewayError> {
        Ok(())
    }

    async fn order(
        &self,
        _account_id: &str,
        symbol: &SymbolCode,
        side: OrderSide,
        order_type: OrderType,
        volume: Decimal,
        price: Option<Decimal>,
    ) -> Result<OrderRecord, GatewayError> {
        Ok(OrderRecord {
            order_id: OrderId::new(),
            symbol: symbol.clone(),
            side,
            order_type,
            volume,
            price,
            status: OrderStatus::Filled,
            submitted_at: Utc::now(),
            filled_volume: volume,
            filled_amount: price.unwrap_or_default() * volume,
            avg_price: price,
            simulated: false,
        })
    }

    async fn cancel(&self, _account_id: &str, _order_id: OrderId) -> Result<(), GatewayError> {
        Ok(())
    }

    async fn query_positions(&self, _account_id: &str) -> Result<Vec<PositionRecord>, GatewayError> {
        Ok(Vec::new())
    }

    async fn query_asset(&self, account_id: &str) -> Result<AccountSnapshot, GatewayError> {
        self.connect(account_id, "").await
    }

    async fn query_orders(&self, _account_id: &str) -> Result<Vec<OrderRecord>, GatewayError> {
        Ok(Vec::new())
    }

    async fn query_trades(&self, _account_id: &str) -> Result<Vec<TradeRecord>, GatewayError> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc as StdArc;

    #[tokio::test]
    async fn subscribe_symbols_starts_delivering_frames() {
        let adapter = SimulationAdapter::new();
        let received = StdArc::new(AtomicUsize::new(0));
        let received_clone = received.clone();
        let cb: FrameCallback = Arc::new(move |_frame| {
            received_clone.fetch_add(1, Ordering::SeqCst);
        });
        let symbols = vec![SymbolCode::parse("000001.SZ").unwrap()];
        adapter
            .subscribe_symbols(&symbols, AdjustType::None, cb)
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(received.load(Ordering::SeqCst) >= 1);
        adapter.shutdown();
    }

    #[tokio::test]
    async fn unsubscribe_all_stops_the_callback_thread() {
        let adapter = SimulationAdapter::new();
        let cb: FrameCallback = Arc::new(|_frame| {});
        let symbols = vec![SymbolCode::parse("000001.SZ").unwrap()];
        adapter
            .subscribe_symbols(&symbols, AdjustType::None, cb)
            .await
            .unwrap();
        adapter.unsubscribe("000001.SZ").await.unwrap();
        assert!(!adapter.running.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn order_replies_instantly_as_filled() {
        let adapter = SimulationAdapter::new();
        let symbol = SymbolCode::parse("000001.SZ").unwrap();
        let record = adapter
            .order(
                "acct",
                &symbol,
                OrderSide::Buy,
                OrderType::Limit,
                Decimal::new(100, 0),
                Some(Decimal::new(1350, 2)),
            )
            .await
            .unwrap();
        assert_eq!(record.status, OrderStatus::Filled);
    }
}
