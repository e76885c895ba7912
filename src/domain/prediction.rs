use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::label::TradeLabel;
use super::vote::Vote;

/// A single predictor's output for one topic
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    /// Identity of the producing model
    pub source: String,
    /// Predicted direction
    pub label: TradeLabel,
    /// Confidence in [0, 1]
    pub confidence: f32,
    /// Optional expected-return estimate, as a fraction
    pub expected_return: Option<Decimal>,
    /// When the prediction was produced
    pub predicted_at: DateTime<Utc>,
}

impl Prediction {
    /// Create a new prediction. Confidence is clamped into [0, 1].
    pub fn new(source: impl Into<String>, label: TradeLabel, confidence: f32) -> Self {
        Self {
            source: source.into(),
            label,
            confidence: confidence.clamp(0.0, 1.0),
            expected_return: None,
            predicted_at: Utc::now(),
        }
    }

    /// Attach an expected-return estimate
    pub fn with_expected_return(mut self, expected: Decimal) -> Self {
        self.expected_return = Some(expected);
        self
    }

    /// Cast this prediction as a vote on the given topic
    pub fn into_vote(self, topic: impl Into<String>) -> Vote {
        Vote::new(
            self.source,
            topic,
            self.label,
            self.confidence,
            self.predicted_at,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_into_vote_preserves_identity() {
        let prediction = Prediction::new("regime", TradeLabel::Sell, 0.72)
            .with_expected_return(dec!(-0.01));
        let cast_at = prediction.predicted_at;
        let vote = prediction.into_vote("ETH-USD");

        assert_eq!(vote.voter_id, "regime");
        assert_eq!(vote.topic, "ETH-USD");
        assert_eq!(vote.label, TradeLabel::Sell);
        assert_eq!(vote.cast_at, cast_at);
    }
}
