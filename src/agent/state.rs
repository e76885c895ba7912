//! State Representation
//!
//! Encodes a vote tally plus auxiliary voter-reliability and recency
//! context into the fixed-shape feature vector the policy consumes.

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::VoteTally;

/// Per-label aggregated confidence features
pub const LABEL_FEATURES: usize = 3;

/// Participation features (present ratio, missing ratio)
pub const PARTICIPATION_FEATURES: usize = 2;

/// Fixed number of per-voter reliability slots, roster order
pub const RELIABILITY_SLOTS: usize = 8;

/// Recency features (window age, time since last action, hour sin/cos)
pub const RECENCY_FEATURES: usize = 4;

/// Total number of features in the state representation
pub const TOTAL_FEATURES: usize =
    LABEL_FEATURES + PARTICIPATION_FEATURES + RELIABILITY_SLOTS + RECENCY_FEATURES;

/// Raw observation assembled from a tally before encoding
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TallyObservation {
    /// Per-label summed confidence, encoding order
    pub label_confidence: [f32; 3],

    /// Distinct voters that voted
    pub total_voters: usize,

    /// Roster members that never voted
    pub missing_voters: usize,

    /// Reliability score per roster voter, tally vote order
    pub voter_reliability: Vec<f32>,

    /// Seconds since the window closed (0 for provisional tallies)
    pub window_age_secs: f32,

    /// Seconds since the previous action for this topic, if any
    pub secs_since_last_action: Option<f32>,

    /// Hour of day encoded as sin component
    pub hour_sin: f32,

    /// Hour of day encoded as cos component
    pub hour_cos: f32,
}

impl TallyObservation {
    /// Assemble an observation from a tally and per-voter reliability
    /// scores aligned with the tally's vote order.
    pub fn from_tally(
        tally: &VoteTally,
        voter_reliability: Vec<f32>,
        last_action_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        let mut obs = Self {
            label_confidence: tally.totals.as_array(),
            total_voters: tally.total_voters,
            missing_voters: tally.missing_voters,
            voter_reliability,
            window_age_secs: tally
                .closed_at
                .map(|t| (now - t).num_milliseconds() as f32 / 1_000.0)
                .unwrap_or(0.0),
            secs_since_last_action: last_action_at
                .map(|t| (now - t).num_milliseconds() as f32 / 1_000.0),
            ..Default::default()
        };
        obs.update_time_features(now.hour());
        obs
    }

    /// Update cyclical time features from the hour of day (0-23)
    pub fn update_time_features(&mut self, hour: u32) {
        use std::f32::consts::PI;

        let hour_rad = 2.0 * PI * (hour as f32) / 24.0;
        self.hour_sin = hour_rad.sin();
        self.hour_cos = hour_rad.cos();
    }
}

/// Trait for encoding observations into feature vectors
pub trait StateEncoder: Send + Sync {
    /// Encode an observation into a fixed-shape feature vector
    fn encode(&self, obs: &TallyObservation) -> Vec<f32>;

    /// Get the output dimension
    fn output_dim(&self) -> usize {
        TOTAL_FEATURES
    }
}

/// Default stateless encoder.
///
/// Confidence features are normalized by voter count so the policy sees
/// comparable magnitudes across thin and full windows; time spans are
/// scaled to minutes.
#[derive(Debug, Clone, Default)]
pub struct DefaultStateEncoder;

impl DefaultStateEncoder {
    pub fn new() -> Self {
        Self
    }
}

impl StateEncoder for DefaultStateEncoder {
    fn encode(&self, obs: &TallyObservation) -> Vec<f32> {
        let mut features = Vec::with_capacity(TOTAL_FEATURES);

        // Label features (3): mean confidence per label
        let scale = (obs.total_voters.max(1)) as f32;
        for confidence in obs.label_confidence {
            features.push(confidence / scale);
        }

        // Participation features (2)
        let roster = (obs.total_voters + obs.missing_voters).max(1) as f32;
        features.push(obs.total_voters as f32 / roster);
        features.push(obs.missing_voters as f32 / roster);

        // Reliability slots (8): pad or truncate to fixed width
        for i in 0..RELIABILITY_SLOTS {
            features.push(obs.voter_reliability.get(i).copied().unwrap_or(0.0));
        }

        // Recency features (4)
        features.push(obs.window_age_secs / 60.0);
        features.push(obs.secs_since_last_action.unwrap_or(0.0) / 60.0);
        features.push(obs.hour_sin);
        features.push(obs.hour_cos);

        debug_assert_eq!(
            features.len(),
            TOTAL_FEATURES,
            "Feature count mismatch: {} vs {}",
            features.len(),
            TOTAL_FEATURES
        );

        features
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{LabelTotals, TradeLabel, Vote};
    use chrono::TimeZone;

    fn tally_with(votes: Vec<(&str, TradeLabel, f32)>, missing: usize) -> VoteTally {
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let mut totals = LabelTotals::default();
        let votes: Vec<Vote> = votes
            .into_iter()
            .map(|(voter, label, confidence)| {
                totals.add(label, confidence);
                Vote::new(voter, "BTC-USD", label, confidence, now)
            })
            .collect();
        let total_voters = votes.len();
        VoteTally {
            topic: "BTC-USD".to_string(),
            window_id: 0,
            votes,
            totals,
            winning_label: None,
            total_voters,
            missing_voters: missing,
            provisional: false,
            closed_at: Some(now),
        }
    }

    #[test]
    fn test_encoder_output_dim() {
        let tally = tally_with(vec![("a", TradeLabel::Buy, 0.8)], 2);
        let obs = TallyObservation::from_tally(&tally, vec![0.6], None, Utc::now());
        let features = DefaultStateEncoder::new().encode(&obs);
        assert_eq!(features.len(), TOTAL_FEATURES);
    }

    #[test]
    fn test_participation_ratios() {
        let tally = tally_with(
            vec![("a", TradeLabel::Buy, 0.8), ("b", TradeLabel::Sell, 0.4)],
            2,
        );
        let obs = TallyObservation::from_tally(&tally, vec![0.5, 0.5], None, Utc::now());
        let features = DefaultStateEncoder::new().encode(&obs);

        assert!((features[LABEL_FEATURES] - 0.5).abs() < 1e-6);
        assert!((features[LABEL_FEATURES + 1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_reliability_slots_padded() {
        let tally = tally_with(vec![("a", TradeLabel::Buy, 0.8)], 0);
        let obs = TallyObservation::from_tally(&tally, vec![0.9], None, Utc::now());
        let features = DefaultStateEncoder::new().encode(&obs);

        let slots = &features[LABEL_FEATURES + PARTICIPATION_FEATURES..]
            [..RELIABILITY_SLOTS];
        assert!((slots[0] - 0.9).abs() < 1e-6);
        assert!(slots[1..].iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_time_encoding() {
        let mut obs = TallyObservation::default();
        obs.update_time_features(12);

        // At noon, sin should be ~0 and cos ~-1
        assert!(obs.hour_sin.abs() < 0.1);
        assert!(obs.hour_cos < -0.9);
    }
}
