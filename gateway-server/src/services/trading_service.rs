use std::sync::Arc;

use chrono::Utc;
use gateway_core::config::AppConfig;
use gateway_core::session::AccountSnapshot;
use gateway_core::{
    trading_allowed, AccountType, GatewayError, Mode, OrderId, OrderRecord, OrderSide, OrderStatus,
    OrderType, Session, SessionId, SymbolCode, UpstreamAdapter,
};
use rust_decimal::Decimal;

use crate::session_registry::SessionRegistry;

/// Gates every mutating call through the Policy Gate before it can reach
/// the adapter. A blocked mutating call is never surfaced as an error —
/// it is filled locally against the session's own book instead, the same
/// shape of response a real fill would produce, marked `simulated: true`.
/// The Policy Gate redirects rather than rejects.
#[derive(Clone)]
pub struct TradingService {
    adapter: Arc<dyn UpstreamAdapter>,
    sessions: SessionRegistry,
    mode: Mode,
    config: Arc<AppConfig>,
}

impl TradingService {
    pub fn new(
        adapter: Arc<dyn UpstreamAdapter>,
        sessions: SessionRegistry,
        mode: Mode,
        config: Arc<AppConfig>,
    ) -> Self {
        TradingService {
            adapter,
            sessions,
            mode,
            config,
        }
    }

    fn mutating_allowed(&self) -> bool {
        trading_allowed(true, self.mode, &self.config)
    }

    pub async fn connect(
        &self,
        account_id: &str,
        password: &str,
        account_type: AccountType,
    ) -> Result<(SessionId, AccountSnapshot), GatewayError> {
        let snapshot = self.adapter.connect(account_id, password).await?;
        let id = self
            .sessions
            .create(account_id.to_string(), account_type, snapshot.clone());
        Ok((id, snapshot))
    }

    /// Idempotent: disconnecting an unknown or already-removed session id
    /// succeeds silently rather than returning `NOT_FOUND`.
    pub async fn disconnect(&self, id: SessionId) -> Result<(), GatewayError> {
        let Some(session) = self.sessions.remove(id) else {
            return Ok(());
        };
        self.adapter.disconnect(&session.account_id).await
    }

    pub fn session(&self, id: SessionId) -> Result<Session, GatewayError> {
        self.sessions.get(id).ok_or_else(|| {
            GatewayError::FailedPrecondition(format!("no session {id}"))
        })
    }

    /// Places an order. Routed to the adapter only when the Policy Gate
    /// allows mutating calls in the current mode; otherwise filled locally.
    pub async fn place_order(
        &self,
        session_id: SessionId,
        symbol: &SymbolCode,
        side: OrderSide,
        order_type: OrderType,
        volume: Decimal,
        price: Option<Decimal>,
    ) -> Result<OrderRecord, GatewayError> {
        if volume <= Decimal::ZERO {
            return Err(GatewayError::InvalidArgument(
                "volume must be positive".to_string(),
            ));
        }
        let session = self.session(session_id)?;

        let order = if self.mutating_allowed() {
            self.adapter
                .order(&session.account_id, symbol, side, order_type, volume, price)
                .await?
        } else {
            simulate_fill(symbol, side, order_type, volume, price)
        };

        self.sessions.record_order(session_id, order.clone())?;
        Ok(order)
    }

    /// Cancels an order. Simulated orders (placed while mutating calls were
    /// blocked) are cancelled locally; real orders are cancelled through the
    /// adapter regardless of the Policy Gate's current verdict, since the
    /// order already lives on the upstream book.
    pub async fn cancel_order(
        &self,
        session_id: SessionId,
        order_id: OrderId,
    ) -> Result<(), GatewayError> {
        let session = self.session(session_id)?;
        let order = session
            .orders
            .get(&order_id)
            .ok_or_else(|| GatewayError::NotFound(format!("order {order_id}")))?
            .clone();

        if order.simulated {
            return self
                .sessions
                .update_order(session_id, order_id, |o| o.transition(OrderStatus::Cancelled));
        }

        self.adapter.cancel(&session.account_id, order_id).await?;
        self.sessions
            .update_order(session_id, order_id, |o| o.transition(OrderStatus::Cancelled))
    }

    pub async fn query_positions(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<gateway_core::adapter::PositionRecord>, GatewayError> {
        let session = self.session(session_id)?;
        self.adapter.query_positions(&session.account_id).await
    }

    pub async fn query_asset(&self, session_id: SessionId) -> Result<AccountSnapshot, GatewayError> {
        let session = self.session(session_id)?;
        let snapshot = self.adapter.query_asset(&session.account_id).await?;
        self.sessions.update_snapshot(session_id, snapshot.clone())?;
        Ok(snapshot)
    }

    pub async fn query_orders(&self, session_id: SessionId) -> Result<Vec<OrderRecord>, GatewayError> {
        let session = self.session(session_id)?;
        Ok(session.orders.into_values().collect())
    }

    pub async fn query_trades(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<gateway_core::adapter::TradeRecord>, GatewayError> {
        let session = self.session(session_id)?;
        self.adapter.query_trades(&session.account_id).await
    }
}

fn simulate_fill(
    symbol: &SymbolCode,
    side: OrderSide,
    order_type: OrderType,
    volume: Decimal,
    price: Option<Decimal>,
) -> OrderRecord {
    let fill_price = price.unwrap_or(Decimal::ZERO);
    OrderRecord {
        order_id: OrderId::new(),
        symbol: symbol.clone(),
        side,
        order_type,
        volume,
        price,
        status: OrderStatus::Filled,
        submitted_at: Utc::now(),
        filled_volume: volume,
        filled_amount: fill_price * volume,
        avg_price: Some(fill_price),
        simulated: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_core::adapter::SimulationAdapter;

    fn service(mode: Mode, allow_real_trading: bool) -> TradingService {
        let mut config = AppConfig::default();
        config.upstream.trading.allow_real_trading = allow_real_trading;
        TradingService::new(
            Arc::new(SimulationAdapter::new()),
            SessionRegistry::new(),
            mode,
            Arc::new(config),
        )
    }

    #[tokio::test]
    async fn order_is_simulated_when_policy_blocks_mutating_calls() {
        let svc = service(Mode::Dev, true);
        let (session_id, _) = svc.connect("acct-1", "pw", AccountType::Cash).await.unwrap();
        let symbol = SymbolCode::parse("000001.SZ").unwrap();
        let order = svc
            .place_order(
                session_id,
                &symbol,
                OrderSide::Buy,
                OrderType::Limit,
                Decimal::new(100, 0),
                Some(Decimal::new(1000, 2)),
            )
            .await
            .unwrap();
        assert!(order.simulated);
        assert_eq!(order.status, OrderStatus::Filled);
    }

    #[tokio::test]
    async fn order_reaches_adapter_when_prod_and_flag_are_set() {
        let svc = service(Mode::Prod, true);
        let (session_id, _) = svc.connect("acct-1", "pw", AccountType::Cash).await.unwrap();
        let symbol = SymbolCode::parse("000001.SZ").unwrap();
        let order = svc
            .place_order(
                session_id,
                &symbol,
                OrderSide::Buy,
                OrderType::Market,
                Decimal::new(100, 0),
                None,
            )
            .await
            .unwrap();
        assert!(!order.simulated);
    }

    #[tokio::test]
    async fn zero_volume_order_is_rejected() {
        let svc = service(Mode::Dev, false);
        let (session_id, _) = svc.connect("acct-1", "pw", AccountType::Cash).await.unwrap();
        let symbol = SymbolCode::parse("000001.SZ").unwrap();
        let err = svc
            .place_order(
                session_id,
                &symbol,
                OrderSide::Buy,
                OrderType::Limit,
                Decimal::ZERO,
                Some(Decimal::new(10, 0)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn cancel_of_unknown_order_is_rejected() {
        let svc = service(Mode::Dev, false);
        let (session_id, _) = svc.connect("acct-1", "pw", AccountType::Cash).await.unwrap();
        let bogus = OrderId::new();
        let err = svc.cancel_order(session_id, bogus).await.unwrap_err();
        assert!(matches!(err, GatewayError::NotFound(_)));
    }

    #[tokio::test]
    async fn cancel_of_an_already_filled_simulated_order_reports_failed_precondition() {
        let svc = service(Mode::Dev, false);
        let (session_id, _) = svc.connect("acct-1", "pw", AccountType::Cash).await.unwrap();
        let symbol = SymbolCode::parse("000001.SZ").unwrap();
        let order = svc
            .place_order(
                session_id,
                &symbol,
                OrderSide::Buy,
                OrderType::Limit,
                Decimal::new(10, 0),
                Some(Decimal::new(10, 0)),
            )
            .await
            .unwrap();
        // simulate_fill() always produces a terminal Filled order, so the
        // state machine rejects cancelling it.
        let err = svc
            .cancel_order(session_id, order.order_id)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::FailedPrecondition(_)));
    }

    #[tokio::test]
    async fn unknown_session_id_reports_failed_precondition_not_not_found() {
        let svc = service(Mode::Dev, false);
        let err = svc.session(SessionId::new()).unwrap_err();
        assert!(matches!(err, GatewayError::FailedPrecondition(_)));
    }

    #[tokio::test]
    async fn disconnect_of_unknown_session_is_idempotent() {
        let svc = service(Mode::Dev, false);
        svc.disconnect(SessionId::new()).await.unwrap();
    }
}
