use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use gateway_core::{AccountType, GatewayError, OrderId, OrderRecord, Session, SessionId};
use gateway_core::session::AccountSnapshot;
use parking_lot::Mutex;

struct Inner {
    sessions: Mutex<HashMap<SessionId, Session>>,
    by_account: Mutex<HashMap<String, SessionId>>,
}

/// Owns every authenticated trading session. One session per account id —
/// `connect`ing an account that already has a live session replaces it,
/// mirroring a fresh login invalidating the previous one.
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<Inner>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        SessionRegistry {
            inner: Arc::new(Inner {
                sessions: Mutex::new(HashMap::new()),
                by_account: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn create(
        &self,
        account_id: String,
        account_type: AccountType,
        snapshot: AccountSnapshot,
    ) -> SessionId {
        let session = Session {
            id: SessionId::new(),
            account_id: account_id.clone(),
            account_type,
            connected_at: Utc::now(),
            account_snapshot: snapshot,
            orders: HashMap::new(),
        };
        let id = session.id;

        let mut sessions = self.inner.sessions.lock();
        let mut by_account = self.inner.by_account.lock();
        if let Some(previous) = by_account.insert(account_id, id) {
            sessions.remove(&previous);
        }
        sessions.insert(id, session);
        id
    }

    pub fn remove(&self, id: SessionId) -> Option<Session> {
        let mut sessions = self.inner.sessions.lock();
        let removed = sessions.remove(&id)?;
        self.inner.by_account.lock().remove(&removed.account_id);
        Some(removed)
    }

    pub fn remove_by_account(&self, account_id: &str) -> Option<Session> {
        let id = self.inner.by_account.lock().remove(account_id)?;
        self.inner.sessions.lock().remove(&id)
    }

    pub fn get(&self, id: SessionId) -> Option<Session> {
        self.inner.sessions.lock().get(&id).cloned()
    }

    pub fn find_by_account(&self, account_id: &str) -> Option<SessionId> {
        self.inner.by_account.lock().get(account_id).copied()
    }

    pub fn list(&self) -> Vec<Session> {
        self.inner.sessions.lock().values().cloned().collect()
    }

    pub fn record_order(&self, id: SessionId, order: OrderRecord) -> Result<(), GatewayError> {
        let mut sessions = self.inner.sessions.lock();
        let session = sessions
            .get_mut(&id)
            .ok_or_else(|| GatewayError::NotFound(format!("session {id}")))?;
        session.orders.insert(order.order_id, order);
        Ok(())
    }

    pub fn update_order<F>(&self, id: SessionId, order_id: OrderId, f: F) -> Result<(), GatewayError>
    where
        F: FnOnce(&mut OrderRecord) -> Result<(), String>,
    {
        let mut sessions = self.inner.sessions.lock();
        let session = sessions
            .get_mut(&id)
            .ok_or_else(|| GatewayError::NotFound(format!("session {id}")))?;
        let order = session
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| GatewayError::NotFound(format!("order {order_id}")))?;
        f(order).map_err(GatewayError::FailedPrecondition)
    }

    pub fn update_snapshot(
        &self,
        id: SessionId,
        snapshot: AccountSnapshot,
    ) -> Result<(), GatewayError> {
        let mut sessions = self.inner.sessions.lock();
        let session = sessions
            .get_mut(&id)
            .ok_or_else(|| GatewayError::NotFound(format!("session {id}")))?;
        session.account_snapshot = snapshot;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn snapshot() -> AccountSnapshot {
        AccountSnapshot {
            cash: Decimal::new(1000, 0),
            equity: Decimal::new(1000, 0),
            margin_used: Decimal::ZERO,
        }
    }

    #[test]
    fn reconnecting_an_account_replaces_the_previous_session() {
        let registry = SessionRegistry::new();
        let first = registry.create("acct-1".to_string(), AccountType::Cash, snapshot());
        let second = registry.create("acct-1".to_string(), AccountType::Cash, snapshot());
        assert!(registry.get(first).is_none());
        assert!(registry.get(second).is_some());
        assert_eq!(registry.find_by_account("acct-1"), Some(second));
    }

    #[test]
    fn record_order_then_update_mutates_in_place() {
        use gateway_core::{OrderSide, OrderStatus, OrderType, SymbolCode};

        let registry = SessionRegistry::new();
        let id = registry.create("acct-1".to_string(), AccountType::Cash, snapshot());
        let order = OrderRecord {
            order_id: OrderId::new(),
            symbol: SymbolCode::parse("000001.SZ").unwrap(),
            side: OrderSide::Buy,
            order_type: OrderType::Limit,
            volume: Decimal::new(100, 0),
            price: Some(Decimal::new(10, 0)),
            status: OrderStatus::Pending,
            submitted_at: Utc::now(),
            filled_volume: Decimal::ZERO,
            filled_amount: Decimal::ZERO,
            avg_price: None,
            simulated: false,
        };
        let order_id = order.order_id;
        registry.record_order(id, order).unwrap();
        registry
            .update_order(id, order_id, |o| {
                o.status = OrderStatus::Submitted;
                Ok(())
            })
            .unwrap();
        let session = registry.get(id).unwrap();
        assert_eq!(
            session.orders.get(&order_id).unwrap().status,
            OrderStatus::Submitted
        );
    }

    #[test]
    fn remove_unknown_session_is_none() {
        let registry = SessionRegistry::new();
        assert!(registry.remove(SessionId::new()).is_none());
    }
}
