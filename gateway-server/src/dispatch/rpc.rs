use std::sync::Arc;

use gateway_core::{AccountType, GatewayError, OrderId, SessionId, SubscriptionId, SymbolCode};
use rkyv::ser::serializers::AllocSerializer;
use rkyv::ser::Serializer;
use rkyv::Deserialize as RkyvDeserializeTrait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::dispatch::wire::{
    from_millis, to_millis, RpcRequestEnvelope, RpcResponseEnvelope, WireAccountSnapshot,
    WireFinancialTable, WireInstrumentInfo, WireMarketDataRow, WireOrderRecord, WirePositionRecord,
    WireRequest, WireResponse, WireSubscriptionDescriptor,
};
use crate::lifecycle::AppState;

/// An 8-byte big-endian length header followed by that many bytes of
/// `rkyv`-archived payload.
async fn read_frame(stream: &mut TcpStream) -> std::io::Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 8];
    match stream.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }
    let len = u64::from_be_bytes(len_buf) as usize;
    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).await?;
    Ok(Some(buf))
}

async fn write_frame(stream: &mut TcpStream, bytes: &[u8]) -> std::io::Result<()> {
    stream.write_all(&(bytes.len() as u64).to_be_bytes()).await?;
    stream.write_all(bytes).await?;
    stream.flush().await
}

fn encode(envelope: &RpcResponseEnvelope) -> Vec<u8> {
    let mut serializer = AllocSerializer::<1024>::default();
    serializer
        .serialize_value(envelope)
        .expect("rkyv serialization of a response envelope cannot fail");
    serializer.into_serializer().into_inner().to_vec()
}

fn decode(bytes: &[u8]) -> Result<RpcRequestEnvelope, GatewayError> {
    let archived = rkyv::check_archived_root::<RpcRequestEnvelope>(bytes)
        .map_err(|e| GatewayError::InvalidArgument(format!("malformed rpc frame: {e}")))?;
    archived
        .deserialize(&mut rkyv::Infallible)
        .map_err(|_: std::convert::Infallible| {
            GatewayError::InvalidArgument("rpc frame deserialization failed".to_string())
        })
}

/// Accepts connections on `host:port` and serves the binary-RPC surface,
/// one task per connection, mirroring `ff_data_server::async_listener`.
pub async fn serve(state: Arc<AppState>, host: &str, port: u16) -> std::io::Result<()> {
    let listener = TcpListener::bind((host, port)).await?;
    tracing::info!(%host, port, "binary rpc surface listening");
    loop {
        let (stream, peer) = listener.accept().await?;
        let state = state.clone();
        tokio::spawn(async move {
            if let Err(err) = handle_connection(state, stream).await {
                tracing::warn!(%peer, error = %err, "rpc connection ended with an error");
            }
        });
    }
}

async fn handle_connection(state: Arc<AppState>, mut stream: TcpStream) -> std::io::Result<()> {
    loop {
        let Some(bytes) = read_frame(&mut stream).await? else {
            return Ok(());
        };
        let response_envelope = match decode(&bytes) {
            Ok(request) => {
                let id = request.id;
                let response = dispatch(&state, request.request).await;
                RpcResponseEnvelope { id, response }
            }
            Err(err) => RpcResponseEnvelope {
                id: 0,
                response: WireResponse::from_error(&err),
            },
        };
        write_frame(&mut stream, &encode(&response_envelope)).await?;
    }
}

fn parse_uuid(raw: &str) -> Result<uuid::Uuid, GatewayError> {
    uuid::Uuid::parse_str(raw).map_err(|_| GatewayError::InvalidArgument(format!("invalid id: {raw}")))
}

async fn dispatch(state: &Arc<AppState>, request: WireRequest) -> WireResponse {
    match try_dispatch(state, request).await {
        Ok(response) => response,
        Err(err) => WireResponse::from_error(&err),
    }
}

async fn try_dispatch(state: &Arc<AppState>, request: WireRequest) -> Result<WireResponse, GatewayError> {
    match request {
        WireRequest::HealthCheck => Ok(WireResponse::HealthOk),

        WireRequest::Watch => Ok(WireResponse::Watching),

        WireRequest::MarketData {
            symbols,
            start_ms,
            end_ms,
            period,
        } => {
            let symbols = parse_symbols(&symbols)?;
            let rows = state
                .data_service
                .market_data(&symbols, from_millis(start_ms), from_millis(end_ms), period.into())
                .await?;
            Ok(WireResponse::MarketData(
                rows.iter().map(WireMarketDataRow::from).collect(),
            ))
        }

        WireRequest::Financial { symbols, tables } => {
            let symbols = parse_symbols(&symbols)?;
            let result = state.data_service.financial(&symbols, &tables).await?;
            Ok(WireResponse::Financial(
                result.iter().map(WireFinancialTable::from).collect(),
            ))
        }

        WireRequest::SectorList => Ok(WireResponse::SectorList(state.data_service.sector_list().await?)),

        WireRequest::StockListInSector { sector } => {
            let stocks = state.data_service.stock_list_in_sector(&sector).await?;
            Ok(WireResponse::Symbols(
                stocks.iter().map(|s| s.as_str().to_string()).collect(),
            ))
        }

        WireRequest::IndexWeight { index_code, date_ms } => {
            let weights = state
                .data_service
                .index_weight(&index_code, date_ms.map(from_millis))
                .await?;
            Ok(WireResponse::IndexWeight(
                weights
                    .into_iter()
                    .map(|(symbol, weight)| (symbol.as_str().to_string(), weight))
                    .collect(),
            ))
        }

        WireRequest::TradingCalendar { year } => {
            let dates = state.data_service.trading_calendar(year).await?;
            Ok(WireResponse::TradingCalendar(
                dates.into_iter().map(to_millis).collect(),
            ))
        }

        WireRequest::InstrumentInfo { symbol } => {
            let symbol = SymbolCode::parse(&symbol).ok_or(GatewayError::EmptySymbols)?;
            let info = state.data_service.instrument_info(&symbol).await?;
            Ok(WireResponse::InstrumentInfo(WireInstrumentInfo::from(&info)))
        }

        WireRequest::Subscribe { symbols, adjust } => {
            let symbols = parse_symbols(&symbols)?;
            let id = state.data_service.subscribe(symbols, adjust.into()).await?;
            Ok(WireResponse::SubscriptionId(id.to_string()))
        }

        WireRequest::SubscribeFirehose => {
            let id = state.data_service.subscribe_firehose().await?;
            Ok(WireResponse::SubscriptionId(id.to_string()))
        }

        WireRequest::Unsubscribe { subscription_id } => {
            let id = SubscriptionId(parse_uuid(&subscription_id)?);
            state.data_service.unsubscribe(id).await?;
            Ok(WireResponse::Unsubscribed)
        }

        WireRequest::DescribeSubscription { subscription_id } => {
            let id = SubscriptionId(parse_uuid(&subscription_id)?);
            let descriptor = state
                .data_service
                .describe_subscription(id)
                .ok_or_else(|| GatewayError::NotFound(format!("subscription {id}")))?;
            Ok(WireResponse::SubscriptionDescriptor(
                WireSubscriptionDescriptor::from(&descriptor),
            ))
        }

        WireRequest::ListSubscriptions => {
            let subs = state.data_service.list_subscriptions();
            Ok(WireResponse::SubscriptionList(
                subs.iter().map(WireSubscriptionDescriptor::from).collect(),
            ))
        }

        WireRequest::Connect { account_id, password } => {
            let (session_id, snapshot) = state
                .trading_service
                .connect(&account_id, &password, AccountType::Cash)
                .await?;
            Ok(WireResponse::Connected {
                session_id: session_id.0.to_string(),
                snapshot: WireAccountSnapshot::from(&snapshot),
            })
        }

        WireRequest::Disconnect { session_id } => {
            let id = SessionId(parse_uuid(&session_id)?);
            state.trading_service.disconnect(id).await?;
            Ok(WireResponse::Disconnected)
        }

        WireRequest::PlaceOrder {
            session_id,
            symbol,
            side,
            order_type,
            volume,
            price,
        } => {
            let id = SessionId(parse_uuid(&session_id)?);
            let symbol = SymbolCode::parse(&symbol).ok_or(GatewayError::EmptySymbols)?;
            let order = state
                .trading_service
                .place_order(id, &symbol, side.into(), order_type.into(), volume, price)
                .await?;
            Ok(WireResponse::Order(WireOrderRecord::from(&order)))
        }

        WireRequest::CancelOrder { session_id, order_id } => {
            let id = SessionId(parse_uuid(&session_id)?);
            let order_id = OrderId(parse_uuid(&order_id)?);
            state.trading_service.cancel_order(id, order_id).await?;
            Ok(WireResponse::Cancelled)
        }

        WireRequest::QueryPositions { session_id } => {
            let id = SessionId(parse_uuid(&session_id)?);
            let positions = state.trading_service.query_positions(id).await?;
            Ok(WireResponse::Positions(
                positions.iter().map(WirePositionRecord::from).collect(),
            ))
        }

        WireRequest::QueryAsset { session_id } => {
            let id = SessionId(parse_uuid(&session_id)?);
            let snapshot = state.trading_service.query_asset(id).await?;
            Ok(WireResponse::Asset(WireAccountSnapshot::from(&snapshot)))
        }

        WireRequest::QueryOrders { session_id } => {
            let id = SessionId(parse_uuid(&session_id)?);
            let orders = state.trading_service.query_orders(id).await?;
            Ok(WireResponse::Orders(
                orders.iter().map(WireOrderRecord::from).collect(),
            ))
        }
    }
}

fn parse_symbols(raw: &[String]) -> Result<Vec<SymbolCode>, GatewayError> {
    raw.iter()
        .map(|s| SymbolCode::parse(s).ok_or(GatewayError::EmptySymbols))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::Lifecycle;
    use gateway_core::AppConfig;
    use gateway_core::Mode;

    #[tokio::test]
    async fn health_check_dispatches_to_health_ok() {
        let lifecycle = Lifecycle::bootstrap(AppConfig::default(), Mode::Mock);
        let response = dispatch(&lifecycle.state, WireRequest::HealthCheck).await;
        assert!(matches!(response, WireResponse::HealthOk));
    }

    #[tokio::test]
    async fn unknown_symbol_market_data_request_becomes_error_response() {
        let lifecycle = Lifecycle::bootstrap(AppConfig::default(), Mode::Mock);
        let response = dispatch(
            &lifecycle.state,
            WireRequest::MarketData {
                symbols: vec![],
                start_ms: 0,
                end_ms: 0,
                period: crate::dispatch::wire::WirePeriod::Day1,
            },
        )
        .await;
        assert!(matches!(response, WireResponse::Error { .. }));
    }
}
