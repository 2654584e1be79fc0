use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::symbol::SymbolCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        SessionId(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    Cash,
    Margin,
}

impl Default for AccountType {
    fn default() -> Self {
        AccountType::Cash
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(pub Uuid);

impl OrderId {
    pub fn new() -> Self {
        OrderId(Uuid::new_v4())
    }
}

impl Default for OrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    Market,
    Limit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    Pending,
    Submitted,
    PartialFilled,
    Filled,
    Cancelled,
    Rejected,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Rejected
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRecord {
    pub order_id: OrderId,
    pub symbol: SymbolCode,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub volume: Decimal,
    pub price: Option<Decimal>,
    pub status: OrderStatus,
    pub submitted_at: DateTime<Utc>,
    pub filled_volume: Decimal,
    pub filled_amount: Decimal,
    pub avg_price: Option<Decimal>,
    /// Set when the Policy Gate (`policy::trading_allowed`) denied the
    /// mutating call that produced this order and a broker-shaped response
    /// was synthesized instead of touching the adapter.
    pub simulated: bool,
}

impl OrderRecord {
    /// Apply a status transition, validating it against the allowed order
    /// lifecycle. Terminal states reject further transitions.
    pub fn transition(&mut self, next: OrderStatus) -> Result<(), String> {
        if self.status.is_terminal() {
            return Err(format!(
                "cannot transition order {} out of terminal state {:?}",
                self.order_id, self.status
            ));
        }
        let valid = matches!(
            (self.status, next),
            (OrderStatus::Pending, OrderStatus::Submitted)
                | (OrderStatus::Submitted, OrderStatus::PartialFilled)
                | (OrderStatus::Submitted, OrderStatus::Filled)
                | (OrderStatus::Submitted, OrderStatus::Cancelled)
                | (OrderStatus::Submitted, OrderStatus::Rejected)
                | (OrderStatus::PartialFilled, OrderStatus::PartialFilled)
                | (OrderStatus::PartialFilled, OrderStatus::Filled)
                | (OrderStatus::PartialFilled, OrderStatus::Cancelled)
        );
        if !valid {
            return Err(format!(
                "invalid order transition {:?} -> {:?}",
                self.status, next
            ));
        }
        self.status = next;
        Ok(())
    }
}

/// A live authenticated connection to a trading account.
///
/// Owned exclusively by the Session Registry; services hold the `SessionId`
/// and look the session up on each call rather than caching a reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub account_id: String,
    pub account_type: AccountType,
    pub connected_at: DateTime<Utc>,
    pub account_snapshot: AccountSnapshot,
    pub orders: HashMap<OrderId, OrderRecord>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub cash: Decimal,
    pub equity: Decimal,
    pub margin_used: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending_order() -> OrderRecord {
        OrderRecord {
            order_id: OrderId::new(),
            symbol: SymbolCode::parse("000001.SZ").unwrap(),
            side: OrderSide::Buy,
            order_type: OrderType::Limit,
            volume: Decimal::new(100, 0),
            price: Some(Decimal::new(1350, 2)),
            status: OrderStatus::Pending,
            submitted_at: Utc::now(),
            filled_volume: Decimal::ZERO,
            filled_amount: Decimal::ZERO,
            avg_price: None,
            simulated: false,
        }
    }

    #[test]
    fn valid_transition_chain_reaches_filled() {
        let mut order = pending_order();
        order.transition(OrderStatus::Submitted).unwrap();
        order.transition(OrderStatus::PartialFilled).unwrap();
        order.transition(OrderStatus::Filled).unwrap();
        assert_eq!(order.status, OrderStatus::Filled);
    }

    #[test]
    fn terminal_state_rejects_further_transitions() {
        let mut order = pending_order();
        order.transition(OrderStatus::Submitted).unwrap();
        order.transition(OrderStatus::Rejected).unwrap();
        assert!(order.transition(OrderStatus::Submitted).is_err());
    }

    #[test]
    fn skipping_submitted_is_invalid() {
        let mut order = pending_order();
        assert!(order.transition(OrderStatus::Filled).is_err());
    }
}
