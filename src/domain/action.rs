use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::label::TradeLabel;

/// Unique identity of an emitted action
pub type ActionId = Uuid;

/// The decision agent's output for one decision cycle.
///
/// Exactly one action is emitted per cycle per topic; immutable once
/// emitted. The policy version pins which policy state produced it so
/// later feedback credits the right weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    /// Unique action identity
    pub id: ActionId,
    /// Topic the decision applies to
    pub topic: String,
    /// Chosen direction
    pub label: TradeLabel,
    /// Confidence in [0, 1]
    pub confidence: f32,
    /// Window id of the tally this action was decided from, if one arrived
    pub tally_ref: Option<u64>,
    /// Policy version that produced this action
    pub policy_version: u64,
    /// Whether confidence cleared the configured actionable minimum
    pub actionable: bool,
    /// When the decision was made
    pub decided_at: DateTime<Utc>,
}

impl Action {
    /// The well-defined degraded action: hold with zero confidence.
    ///
    /// Emitted when no votes arrived for a cycle; never an error upward.
    pub fn hold(topic: impl Into<String>, policy_version: u64, tally_ref: Option<u64>) -> Self {
        Self {
            id: Uuid::new_v4(),
            topic: topic.into(),
            label: TradeLabel::Hold,
            confidence: 0.0,
            tally_ref,
            policy_version,
            actionable: false,
            decided_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hold_action_is_degraded() {
        let action = Action::hold("BTC-USD", 3, None);
        assert_eq!(action.label, TradeLabel::Hold);
        assert_eq!(action.confidence, 0.0);
        assert!(!action.actionable);
        assert_eq!(action.policy_version, 3);
    }
}
