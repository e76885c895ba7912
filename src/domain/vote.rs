use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::label::TradeLabel;

/// One model's labeled, confidence-scored opinion for a topic within a
/// decision window.
///
/// Immutable once cast. A voter may hold at most one active vote per topic
/// per window; a later cast supersedes the earlier one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vote {
    /// Identity of the casting model
    pub voter_id: String,
    /// What is being decided
    pub topic: String,
    /// Predicted direction
    pub label: TradeLabel,
    /// Confidence in [0, 1]
    pub confidence: f32,
    /// When the vote was cast
    pub cast_at: DateTime<Utc>,
}

impl Vote {
    /// Create a new vote. Confidence is clamped into [0, 1].
    pub fn new(
        voter_id: impl Into<String>,
        topic: impl Into<String>,
        label: TradeLabel,
        confidence: f32,
        cast_at: DateTime<Utc>,
    ) -> Self {
        Self {
            voter_id: voter_id.into(),
            topic: topic.into(),
            label,
            confidence: confidence.clamp(0.0, 1.0),
            cast_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_clamped() {
        let vote = Vote::new("ofi", "BTC-USD", TradeLabel::Buy, 1.7, Utc::now());
        assert_eq!(vote.confidence, 1.0);

        let vote = Vote::new("ofi", "BTC-USD", TradeLabel::Sell, -0.3, Utc::now());
        assert_eq!(vote.confidence, 0.0);
    }
}
