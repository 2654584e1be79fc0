use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::symbol::SymbolCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(pub Uuid);

impl SubscriptionId {
    pub fn new() -> Self {
        SubscriptionId(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdjustType {
    None,
    Front,
    Back,
}

impl std::str::FromStr for AdjustType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(AdjustType::None),
            "front" => Ok(AdjustType::Front),
            "back" => Ok(AdjustType::Back),
            other => Err(format!("unknown adjust type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionKind {
    PerSymbol,
    Firehose,
}

/// A server-side descriptor of a client's interest in one or more symbols.
///
/// The bounded queue and symbol-index membership that back a live
/// subscription are owned by the Subscription Manager, not by this
/// descriptor — `Subscription` only records identity and lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub symbols: Vec<SymbolCode>,
    pub adjust: AdjustType,
    pub kind: SubscriptionKind,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub active: bool,
}

impl Subscription {
    pub fn new_per_symbol(symbols: Vec<SymbolCode>, adjust: AdjustType) -> Self {
        let now = Utc::now();
        Subscription {
            id: SubscriptionId::new(),
            symbols,
            adjust,
            kind: SubscriptionKind::PerSymbol,
            created_at: now,
            last_activity_at: now,
            active: true,
        }
    }

    pub fn new_firehose() -> Self {
        let now = Utc::now();
        Subscription {
            id: SubscriptionId::new(),
            symbols: Vec::new(),
            adjust: AdjustType::None,
            kind: SubscriptionKind::Firehose,
            created_at: now,
            last_activity_at: now,
            active: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adjust_type_parses_valid_values_only() {
        assert_eq!("front".parse::<AdjustType>().unwrap(), AdjustType::Front);
        assert!("sideways".parse::<AdjustType>().is_err());
    }

    #[test]
    fn new_subscription_is_active_with_matching_timestamps() {
        let sub = Subscription::new_per_symbol(vec![], AdjustType::None);
        assert!(sub.active);
        assert_eq!(sub.created_at, sub.last_activity_at);
    }
}
