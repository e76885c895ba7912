use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::action::ActionId;

/// Realized outcome of a trade, reported by the execution collaborator
/// after the position closes or expires unrealized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeFeedback {
    /// Action this outcome belongs to
    pub action_id: ActionId,
    /// Realized P&L as a fraction of committed capital
    pub pnl_fraction: Decimal,
    /// When the outcome was reported
    pub received_at: DateTime<Utc>,
}

impl TradeFeedback {
    pub fn new(action_id: ActionId, pnl_fraction: Decimal) -> Self {
        Self {
            action_id,
            pnl_fraction,
            received_at: Utc::now(),
        }
    }
}

/// Change applied to one voter's reliability estimate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReliabilityDelta {
    /// Voter whose estimate moved
    pub voter_id: String,
    /// Whether the voter's label matched the realized direction
    pub hit: bool,
    /// Score before the update
    pub previous: f32,
    /// Score after the update
    pub updated: f32,
}

/// Result of processing one trade feedback
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackReport {
    /// Action the feedback applied to
    pub action_id: ActionId,
    /// Bounded reward dispatched to the decision agent
    pub reward: f32,
    /// Per-voter reliability updates derived from the tally
    pub reliability_deltas: Vec<ReliabilityDelta>,
    /// Policy version after the update, when the update succeeded
    pub policy_version: Option<u64>,
    /// True when this report was served from the idempotency record
    pub duplicate: bool,
}

/// Rolling estimate of how often a voter's label matched realized outcomes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoterReliabilityRecord {
    /// Voter identity
    pub voter_id: String,
    /// Exponential moving average of hit rate, in [0, 1]
    pub score: f32,
    /// Number of outcomes observed
    pub samples: u64,
    /// Last update time
    pub updated_at: DateTime<Utc>,
}
