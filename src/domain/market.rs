use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Snapshot of current market conditions handed to predictors at fan-out.
///
/// The core treats this as opaque context; feature engineering happens
/// inside the predictors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSnapshot {
    /// Topic/instrument identifier
    pub topic: String,
    /// Last traded price
    pub last_price: Option<Decimal>,
    /// Current best bid
    pub bid: Option<Decimal>,
    /// Current best ask
    pub ask: Option<Decimal>,
    /// Recent price momentum over short horizons (1s, 5s, 15s, 60s)
    pub momentum: Option<[f64; 4]>,
    /// Timestamp of this snapshot
    pub timestamp: DateTime<Utc>,
}

impl MarketSnapshot {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            last_price: None,
            bid: None,
            ask: None,
            momentum: None,
            timestamp: Utc::now(),
        }
    }

    /// Bid/ask spread when both sides are quoted
    pub fn spread(&self) -> Option<Decimal> {
        match (self.bid, self.ask) {
            (Some(bid), Some(ask)) => Some(ask - bid),
            _ => None,
        }
    }

    /// Midpoint when both sides are quoted
    pub fn mid(&self) -> Option<Decimal> {
        match (self.bid, self.ask) {
            (Some(bid), Some(ask)) => Some((bid + ask) / Decimal::from(2)),
            _ => None,
        }
    }
}
