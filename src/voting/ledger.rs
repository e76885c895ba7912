//! Append-only record of accepted votes and closed tallies.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use crate::domain::{Vote, VoteTally};

/// Append-only store of cast votes keyed by topic, plus every closed
/// tally for audit and feedback attribution.
#[derive(Debug, Default)]
pub struct VoteLedger {
    votes: RwLock<HashMap<String, Vec<Vote>>>,
    tallies: RwLock<HashMap<(String, u64), Arc<VoteTally>>>,
}

/// Ledger size counters
#[derive(Debug, Clone, Default)]
pub struct LedgerStats {
    pub topics: usize,
    pub votes_recorded: usize,
    pub tallies_recorded: usize,
}

impl std::fmt::Display for LedgerStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Ledger[topics={}, votes={}, tallies={}]",
            self.topics, self.votes_recorded, self.tallies_recorded
        )
    }
}

impl VoteLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an accepted vote to the topic's log
    pub async fn append_vote(&self, vote: &Vote) {
        self.votes
            .write()
            .await
            .entry(vote.topic.clone())
            .or_default()
            .push(vote.clone());
    }

    /// Record a closed tally. Idempotent: if the (topic, window) pair is
    /// already present the stored tally is returned unchanged.
    pub async fn record_tally(&self, tally: Arc<VoteTally>) -> Arc<VoteTally> {
        let key = (tally.topic.clone(), tally.window_id);
        let mut tallies = self.tallies.write().await;
        if let Some(existing) = tallies.get(&key) {
            return Arc::clone(existing);
        }
        debug!(topic = %key.0, window = key.1, "tally recorded");
        tallies.insert(key, Arc::clone(&tally));
        tally
    }

    /// Stored tally for a closed window
    pub async fn tally(&self, topic: &str, window_id: u64) -> Option<Arc<VoteTally>> {
        self.tallies
            .read()
            .await
            .get(&(topic.to_string(), window_id))
            .cloned()
    }

    /// All recorded votes for a topic, in append order
    pub async fn votes_for(&self, topic: &str) -> Vec<Vote> {
        self.votes
            .read()
            .await
            .get(topic)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn stats(&self) -> LedgerStats {
        let votes = self.votes.read().await;
        let tallies = self.tallies.read().await;
        LedgerStats {
            topics: votes.len(),
            votes_recorded: votes.values().map(|v| v.len()).sum(),
            tallies_recorded: tallies.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{LabelTotals, TradeLabel};
    use chrono::Utc;

    fn tally(topic: &str, window_id: u64) -> Arc<VoteTally> {
        Arc::new(VoteTally {
            topic: topic.to_string(),
            window_id,
            votes: vec![],
            totals: LabelTotals::default(),
            winning_label: None,
            total_voters: 0,
            missing_voters: 0,
            provisional: false,
            closed_at: Some(Utc::now()),
        })
    }

    #[tokio::test]
    async fn test_record_tally_idempotent() {
        let ledger = VoteLedger::new();
        let first = ledger.record_tally(tally("BTC-USD", 1)).await;
        let second = ledger.record_tally(tally("BTC-USD", 1)).await;
        assert!(Arc::ptr_eq(&first, &second));

        let stats = ledger.stats().await;
        assert_eq!(stats.tallies_recorded, 1);
    }

    #[tokio::test]
    async fn test_votes_append_in_order() {
        let ledger = VoteLedger::new();
        let now = Utc::now();
        for (voter, confidence) in [("a", 0.1), ("b", 0.2), ("c", 0.3)] {
            let vote = Vote::new(voter, "BTC-USD", TradeLabel::Buy, confidence, now);
            ledger.append_vote(&vote).await;
        }

        let votes = ledger.votes_for("BTC-USD").await;
        let voters: Vec<&str> = votes.iter().map(|v| v.voter_id.as_str()).collect();
        assert_eq!(voters, vec!["a", "b", "c"]);
    }
}
