use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::label::TradeLabel;
use super::vote::Vote;

/// Per-label summed confidence, indexed by `TradeLabel::index`
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LabelTotals([f32; 3]);

impl LabelTotals {
    /// Accumulate confidence for a label
    pub fn add(&mut self, label: TradeLabel, confidence: f32) {
        self.0[label.index()] += confidence;
    }

    /// Aggregated confidence for a label
    pub fn get(&self, label: TradeLabel) -> f32 {
        self.0[label.index()]
    }

    /// Sum across all labels
    pub fn total(&self) -> f32 {
        self.0.iter().sum()
    }

    /// Iterate (label, total) pairs in encoding order
    pub fn iter(&self) -> impl Iterator<Item = (TradeLabel, f32)> + '_ {
        TradeLabel::all().iter().map(|l| (*l, self.get(*l)))
    }

    /// Raw feature view for the state encoder
    pub fn as_array(&self) -> [f32; 3] {
        self.0
    }
}

/// The aggregated result of all votes in one decision window.
///
/// Immutable once the window is closed; retained for audit and for
/// feedback attribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteTally {
    /// What was being decided
    pub topic: String,
    /// Sequential window identifier within the topic
    pub window_id: u64,
    /// Accepted votes in arrival order (superseded casts removed)
    pub votes: Vec<Vote>,
    /// Per-label summed confidence
    pub totals: LabelTotals,
    /// Label with the highest aggregated confidence, if any votes arrived
    pub winning_label: Option<TradeLabel>,
    /// Number of distinct voters that voted
    pub total_voters: usize,
    /// Roster members that never voted
    pub missing_voters: usize,
    /// True for partial tallies computed before the window closed
    pub provisional: bool,
    /// When the window closed; None while provisional
    pub closed_at: Option<DateTime<Utc>>,
}

impl VoteTally {
    /// Whether any votes were included
    pub fn is_empty(&self) -> bool {
        self.votes.is_empty()
    }

    /// Aggregated confidence of the winning label, or 0.0 for an empty tally
    pub fn winning_confidence(&self) -> f32 {
        self.winning_label.map(|l| self.totals.get(l)).unwrap_or(0.0)
    }

    /// Distinct voters that cast a vote for the given label
    pub fn voters_for(&self, label: TradeLabel) -> usize {
        self.votes.iter().filter(|v| v.label == label).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_totals_accumulate() {
        let mut totals = LabelTotals::default();
        totals.add(TradeLabel::Buy, 0.8);
        totals.add(TradeLabel::Buy, 0.6);
        totals.add(TradeLabel::Sell, 0.4);

        assert!((totals.get(TradeLabel::Buy) - 1.4).abs() < 1e-6);
        assert!((totals.get(TradeLabel::Sell) - 0.4).abs() < 1e-6);
        assert_eq!(totals.get(TradeLabel::Hold), 0.0);
        assert!((totals.total() - 1.8).abs() < 1e-6);
    }
}
