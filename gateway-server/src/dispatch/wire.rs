//! Binary-RPC wire types.
//!
//! `gateway-core`'s domain types use `chrono::DateTime<Utc>`, which has no
//! `rkyv::Archive` impl upstream. Rather than pull a shim crate in, this
//! module mirrors the domain types with a thin DTO layer — timestamps as
//! epoch milliseconds — and converts at the boundary. `rust_decimal::Decimal`
//! archives directly (the `rkyv`/`rkyv-safe` features are enabled on it in
//! both crates), so money fields need no conversion.

use chrono::{DateTime, TimeZone, Utc};
use gateway_core::adapter::{FinancialTable, InstrumentInfo, MarketDataRow, Period, PositionRecord};
use gateway_core::session::AccountSnapshot;
use gateway_core::{
    AdjustType, GatewayError, OrderRecord, OrderSide, OrderStatus, OrderType, Quote, SubscriptionKind,
    SymbolCode, TickFrame,
};

use crate::subscription_manager::SubscriptionDescriptor;
use rkyv::{Archive, Deserialize as RkyvDeserialize, Serialize as RkyvSerialize};
use rust_decimal::Decimal;

pub fn to_millis(dt: DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}

pub fn from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_else(Utc::now)
}

#[derive(Archive, RkyvSerialize, RkyvDeserialize, Debug, Clone, PartialEq)]
#[archive(compare(PartialEq), check_bytes)]
#[archive_attr(derive(Debug))]
pub enum WirePeriod {
    Tick,
    Min1,
    Min5,
    Min15,
    Min30,
    Hour1,
    Day1,
}

impl From<Period> for WirePeriod {
    fn from(p: Period) -> Self {
        match p {
            Period::Tick => WirePeriod::Tick,
            Period::Min1 => WirePeriod::Min1,
            Period::Min5 => WirePeriod::Min5,
            Period::Min15 => WirePeriod::Min15,
            Period::Min30 => WirePeriod::Min30,
            Period::Hour1 => WirePeriod::Hour1,
            Period::Day1 => WirePeriod::Day1,
        }
    }
}

impl From<WirePeriod> for Period {
    fn from(p: WirePeriod) -> Self {
        match p {
            WirePeriod::Tick => Period::Tick,
            WirePeriod::Min1 => Period::Min1,
            WirePeriod::Min5 => Period::Min5,
            WirePeriod::Min15 => Period::Min15,
            WirePeriod::Min30 => Period::Min30,
            WirePeriod::Hour1 => Period::Hour1,
            WirePeriod::Day1 => Period::Day1,
        }
    }
}

#[derive(Archive, RkyvSerialize, RkyvDeserialize, Debug, Clone, PartialEq)]
#[archive(compare(PartialEq), check_bytes)]
#[archive_attr(derive(Debug))]
pub enum WireAdjust {
    None,
    Front,
    Back,
}

impl From<AdjustType> for WireAdjust {
    fn from(a: AdjustType) -> Self {
        match a {
            AdjustType::None => WireAdjust::None,
            AdjustType::Front => WireAdjust::Front,
            AdjustType::Back => WireAdjust::Back,
        }
    }
}

impl From<WireAdjust> for AdjustType {
    fn from(a: WireAdjust) -> Self {
        match a {
            WireAdjust::None => AdjustType::None,
            WireAdjust::Front => AdjustType::Front,
            WireAdjust::Back => AdjustType::Back,
        }
    }
}

#[derive(Archive, RkyvSerialize, RkyvDeserialize, Debug, Clone, PartialEq)]
#[archive(compare(PartialEq), check_bytes)]
#[archive_attr(derive(Debug))]
pub struct WireQuote {
    pub last_price: Decimal,
    pub volume: u64,
    pub amount: Decimal,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub bid: Option<Decimal>,
    pub ask: Option<Decimal>,
    pub ts_ms: i64,
}

impl From<&Quote> for WireQuote {
    fn from(q: &Quote) -> Self {
        WireQuote {
            last_price: q.last_price,
            volume: q.volume,
            amount: q.amount,
            open: q.open,
            high: q.high,
            low: q.low,
            close: q.close,
            bid: q.bid,
            ask: q.ask,
            ts_ms: to_millis(q.ts),
        }
    }
}

impl From<WireQuote> for Quote {
    fn from(q: WireQuote) -> Self {
        Quote {
            last_price: q.last_price,
            volume: q.volume,
            amount: q.amount,
            open: q.open,
            high: q.high,
            low: q.low,
            close: q.close,
            bid: q.bid,
            ask: q.ask,
            ts: from_millis(q.ts_ms),
        }
    }
}

#[derive(Archive, RkyvSerialize, RkyvDeserialize, Debug, Clone, PartialEq, Default)]
#[archive(compare(PartialEq), check_bytes)]
#[archive_attr(derive(Debug))]
pub struct WireTickFrame {
    pub quotes: Vec<(String, WireQuote)>,
}

impl From<&TickFrame> for WireTickFrame {
    fn from(frame: &TickFrame) -> Self {
        WireTickFrame {
            quotes: frame
                .iter()
                .map(|(symbol, quote)| (symbol.as_str().to_string(), WireQuote::from(quote)))
                .collect(),
        }
    }
}

impl From<WireTickFrame> for TickFrame {
    fn from(wire: WireTickFrame) -> Self {
        wire.quotes
            .into_iter()
            .filter_map(|(symbol, quote)| {
                SymbolCode::parse(&symbol).map(|code| (code, Quote::from(quote)))
            })
            .collect()
    }
}

#[derive(Archive, RkyvSerialize, RkyvDeserialize, Debug, Clone, PartialEq)]
#[archive(compare(PartialEq), check_bytes)]
#[archive_attr(derive(Debug))]
pub struct WireMarketDataRow {
    pub symbol: String,
    pub time_ms: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: u64,
}

impl From<&MarketDataRow> for WireMarketDataRow {
    fn from(row: &MarketDataRow) -> Self {
        WireMarketDataRow {
            symbol: row.symbol.as_str().to_string(),
            time_ms: to_millis(row.time),
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
        }
    }
}

#[derive(Archive, RkyvSerialize, RkyvDeserialize, Debug, Clone, PartialEq)]
#[archive(compare(PartialEq), check_bytes)]
#[archive_attr(derive(Debug))]
pub struct WireInstrumentInfo {
    pub symbol: String,
    pub name: String,
    pub sector: String,
    pub lot_size: u32,
    pub tick_size: Decimal,
}

impl From<&InstrumentInfo> for WireInstrumentInfo {
    fn from(i: &InstrumentInfo) -> Self {
        WireInstrumentInfo {
            symbol: i.symbol.as_str().to_string(),
            name: i.name.clone(),
            sector: i.sector.clone(),
            lot_size: i.lot_size,
            tick_size: i.tick_size,
        }
    }
}

#[derive(Archive, RkyvSerialize, RkyvDeserialize, Debug, Clone, PartialEq)]
#[archive(compare(PartialEq), check_bytes)]
#[archive_attr(derive(Debug))]
pub struct WireFinancialTable {
    pub table_name: String,
    pub rows_json: String,
}

impl From<&FinancialTable> for WireFinancialTable {
    fn from(t: &FinancialTable) -> Self {
        WireFinancialTable {
            table_name: t.table_name.clone(),
            rows_json: serde_json::to_string(&t.rows).unwrap_or_else(|_| "[]".to_string()),
        }
    }
}

#[derive(Archive, RkyvSerialize, RkyvDeserialize, Debug, Clone, PartialEq)]
#[archive(compare(PartialEq), check_bytes)]
#[archive_attr(derive(Debug))]
pub enum WireOrderSide {
    Buy,
    Sell,
}

impl From<OrderSide> for WireOrderSide {
    fn from(s: OrderSide) -> Self {
        match s {
            OrderSide::Buy => WireOrderSide::Buy,
            OrderSide::Sell => WireOrderSide::Sell,
        }
    }
}

impl From<WireOrderSide> for OrderSide {
    fn from(s: WireOrderSide) -> Self {
        match s {
            WireOrderSide::Buy => OrderSide::Buy,
            WireOrderSide::Sell => OrderSide::Sell,
        }
    }
}

#[derive(Archive, RkyvSerialize, RkyvDeserialize, Debug, Clone, PartialEq)]
#[archive(compare(PartialEq), check_bytes)]
#[archive_attr(derive(Debug))]
pub enum WireOrderType {
    Market,
    Limit,
}

impl From<OrderType> for WireOrderType {
    fn from(t: OrderType) -> Self {
        match t {
            OrderType::Market => WireOrderType::Market,
            OrderType::Limit => WireOrderType::Limit,
        }
    }
}

impl From<WireOrderType> for OrderType {
    fn from(t: WireOrderType) -> Self {
        match t {
            WireOrderType::Market => OrderType::Market,
            WireOrderType::Limit => OrderType::Limit,
        }
    }
}

#[derive(Archive, RkyvSerialize, RkyvDeserialize, Debug, Clone, PartialEq)]
#[archive(compare(PartialEq), check_bytes)]
#[archive_attr(derive(Debug))]
pub enum WireOrderStatus {
    Pending,
    Submitted,
    PartialFilled,
    Filled,
    Cancelled,
    Rejected,
}

impl From<OrderStatus> for WireOrderStatus {
    fn from(s: OrderStatus) -> Self {
        match s {
            OrderStatus::Pending => WireOrderStatus::Pending,
            OrderStatus::Submitted => WireOrderStatus::Submitted,
            OrderStatus::PartialFilled => WireOrderStatus::PartialFilled,
            OrderStatus::Filled => WireOrderStatus::Filled,
            OrderStatus::Cancelled => WireOrderStatus::Cancelled,
            OrderStatus::Rejected => WireOrderStatus::Rejected,
        }
    }
}

#[derive(Archive, RkyvSerialize, RkyvDeserialize, Debug, Clone, PartialEq)]
#[archive(compare(PartialEq), check_bytes)]
#[archive_attr(derive(Debug))]
pub struct WireOrderRecord {
    pub order_id: String,
    pub symbol: String,
    pub side: WireOrderSide,
    pub order_type: WireOrderType,
    pub volume: Decimal,
    pub price: Option<Decimal>,
    pub status: WireOrderStatus,
    pub submitted_at_ms: i64,
    pub filled_volume: Decimal,
    pub filled_amount: Decimal,
    pub avg_price: Option<Decimal>,
    pub simulated: bool,
}

impl From<&OrderRecord> for WireOrderRecord {
    fn from(o: &OrderRecord) -> Self {
        WireOrderRecord {
            order_id: o.order_id.to_string(),
            symbol: o.symbol.as_str().to_string(),
            side: o.side.into(),
            order_type: o.order_type.into(),
            volume: o.volume,
            price: o.price,
            status: o.status.into(),
            submitted_at_ms: to_millis(o.submitted_at),
            filled_volume: o.filled_volume,
            filled_amount: o.filled_amount,
            avg_price: o.avg_price,
            simulated: o.simulated,
        }
    }
}

#[derive(Archive, RkyvSerialize, RkyvDeserialize, Debug, Clone, PartialEq)]
#[archive(compare(PartialEq), check_bytes)]
#[archive_attr(derive(Debug))]
pub struct WireAccountSnapshot {
    pub cash: Decimal,
    pub equity: Decimal,
    pub margin_used: Decimal,
}

impl From<&AccountSnapshot> for WireAccountSnapshot {
    fn from(s: &AccountSnapshot) -> Self {
        WireAccountSnapshot {
            cash: s.cash,
            equity: s.equity,
            margin_used: s.margin_used,
        }
    }
}

#[derive(Archive, RkyvSerialize, RkyvDeserialize, Debug, Clone, PartialEq)]
#[archive(compare(PartialEq), check_bytes)]
#[archive_attr(derive(Debug))]
pub struct WirePositionRecord {
    pub symbol: String,
    pub volume: Decimal,
    pub avg_price: Decimal,
    pub unrealized_pnl: Decimal,
}

impl From<&PositionRecord> for WirePositionRecord {
    fn from(p: &PositionRecord) -> Self {
        WirePositionRecord {
            symbol: p.symbol.as_str().to_string(),
            volume: p.volume,
            avg_price: p.avg_price,
            unrealized_pnl: p.unrealized_pnl,
        }
    }
}

#[derive(Archive, RkyvSerialize, RkyvDeserialize, Debug, Clone, PartialEq)]
#[archive(compare(PartialEq), check_bytes)]
#[archive_attr(derive(Debug))]
pub enum WireSubscriptionKind {
    PerSymbol,
    Firehose,
}

impl From<SubscriptionKind> for WireSubscriptionKind {
    fn from(k: SubscriptionKind) -> Self {
        match k {
            SubscriptionKind::PerSymbol => WireSubscriptionKind::PerSymbol,
            SubscriptionKind::Firehose => WireSubscriptionKind::Firehose,
        }
    }
}

#[derive(Archive, RkyvSerialize, RkyvDeserialize, Debug, Clone, PartialEq)]
#[archive(compare(PartialEq), check_bytes)]
#[archive_attr(derive(Debug))]
pub struct WireSubscriptionDescriptor {
    pub id: String,
    pub symbols: Vec<String>,
    pub adjust: WireAdjust,
    pub kind: WireSubscriptionKind,
    pub created_at_ms: i64,
    pub last_activity_at_ms: i64,
    pub active: bool,
    pub queued_frames: u64,
    pub dropped_frames: u64,
}

impl From<&SubscriptionDescriptor> for WireSubscriptionDescriptor {
    fn from(d: &SubscriptionDescriptor) -> Self {
        WireSubscriptionDescriptor {
            id: d.id.to_string(),
            symbols: d.symbols.iter().map(|s| s.as_str().to_string()).collect(),
            adjust: d.adjust.into(),
            kind: d.kind.into(),
            created_at_ms: to_millis(d.created_at),
            last_activity_at_ms: to_millis(d.last_activity_at),
            active: d.active,
            queued_frames: d.queued_frames as u64,
            dropped_frames: d.dropped_frames,
        }
    }
}

/// One request on the binary-RPC surface. Every variant name matches its
/// HTTP counterpart one-for-one.
#[derive(Archive, RkyvSerialize, RkyvDeserialize, Debug, Clone, PartialEq)]
#[archive(check_bytes)]
#[archive_attr(derive(Debug))]
pub enum WireRequest {
    HealthCheck,
    Watch,
    MarketData {
        symbols: Vec<String>,
        start_ms: i64,
        end_ms: i64,
        period: WirePeriod,
    },
    Financial {
        symbols: Vec<String>,
        tables: Vec<String>,
    },
    SectorList,
    StockListInSector {
        sector: String,
    },
    IndexWeight {
        index_code: String,
        date_ms: Option<i64>,
    },
    TradingCalendar {
        year: u16,
    },
    InstrumentInfo {
        symbol: String,
    },
    Subscribe {
        symbols: Vec<String>,
        adjust: WireAdjust,
    },
    SubscribeFirehose,
    Unsubscribe {
        subscription_id: String,
    },
    DescribeSubscription {
        subscription_id: String,
    },
    ListSubscriptions,
    Connect {
        account_id: String,
        password: String,
    },
    Disconnect {
        session_id: String,
    },
    PlaceOrder {
        session_id: String,
        symbol: String,
        side: WireOrderSide,
        order_type: WireOrderType,
        volume: Decimal,
        price: Option<Decimal>,
    },
    CancelOrder {
        session_id: String,
        order_id: String,
    },
    QueryPositions {
        session_id: String,
    },
    QueryAsset {
        session_id: String,
    },
    QueryOrders {
        session_id: String,
    },
}

#[derive(Archive, RkyvSerialize, RkyvDeserialize, Debug, Clone, PartialEq)]
#[archive(check_bytes)]
#[archive_attr(derive(Debug))]
pub enum WireResponse {
    HealthOk,
    Watching,
    MarketData(Vec<WireMarketDataRow>),
    Financial(Vec<WireFinancialTable>),
    SectorList(Vec<String>),
    Symbols(Vec<String>),
    IndexWeight(Vec<(String, Decimal)>),
    TradingCalendar(Vec<i64>),
    InstrumentInfo(WireInstrumentInfo),
    SubscriptionId(String),
    Unsubscribed,
    SubscriptionDescriptor(WireSubscriptionDescriptor),
    SubscriptionList(Vec<WireSubscriptionDescriptor>),
    Connected {
        session_id: String,
        snapshot: WireAccountSnapshot,
    },
    Disconnected,
    Order(WireOrderRecord),
    Cancelled,
    Positions(Vec<WirePositionRecord>),
    Asset(WireAccountSnapshot),
    Orders(Vec<WireOrderRecord>),
    Error { code: String, message: String },
}

impl WireResponse {
    pub fn from_error(err: &GatewayError) -> Self {
        WireResponse::Error {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

/// One envelope on the wire: an opaque correlation id plus the request or
/// response body. Framing (the 8-byte big-endian length prefix) lives in
/// `dispatch::rpc`.
#[derive(Archive, RkyvSerialize, RkyvDeserialize, Debug, Clone, PartialEq)]
#[archive(check_bytes)]
#[archive_attr(derive(Debug))]
pub struct RpcRequestEnvelope {
    pub id: u64,
    pub request: WireRequest,
}

#[derive(Archive, RkyvSerialize, RkyvDeserialize, Debug, Clone, PartialEq)]
#[archive(check_bytes)]
#[archive_attr(derive(Debug))]
pub struct RpcResponseEnvelope {
    pub id: u64,
    pub response: WireResponse,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rkyv::ser::Serializer;

    #[test]
    fn tick_frame_round_trips_through_wire_shape() {
        let symbol = SymbolCode::parse("000001.SZ").unwrap();
        let mut frame = TickFrame::new();
        frame.insert(
            symbol.clone(),
            Quote {
                last_price: Decimal::new(1350, 2),
                volume: 100,
                amount: Decimal::new(135000, 2),
                open: Decimal::new(1340, 2),
                high: Decimal::new(1360, 2),
                low: Decimal::new(1330, 2),
                close: Decimal::new(1350, 2),
                bid: Some(Decimal::new(1349, 2)),
                ask: Some(Decimal::new(1351, 2)),
                ts: Utc::now(),
            },
        );
        let wire = WireTickFrame::from(&frame);
        let back: TickFrame = wire.into();
        assert_eq!(back.get(&symbol).unwrap().last_price, Decimal::new(1350, 2));
    }

    #[test]
    fn request_envelope_serializes_with_rkyv() {
        let envelope = RpcRequestEnvelope {
            id: 42,
            request: WireRequest::SectorList,
        };
        let mut serializer = rkyv::ser::serializers::AllocSerializer::<256>::default();
        serializer.serialize_value(&envelope).unwrap();
        let bytes = serializer.into_serializer().into_inner();
        let archived = rkyv::check_archived_root::<RpcRequestEnvelope>(&bytes[..]).unwrap();
        assert_eq!(archived.id, 42);
    }
}
