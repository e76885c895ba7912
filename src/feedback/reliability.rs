//! Voter Reliability Store
//!
//! Rolling per-voter accuracy estimates, updated from realized outcomes.
//! Keyed per voter with independent updates, so no global lock is needed.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::debug;

use crate::config::ReliabilityConfig;
use crate::domain::{ReliabilityDelta, VoterReliabilityRecord};

/// Per-voter exponential-moving-average accuracy
#[derive(Debug, Default)]
pub struct ReliabilityStore {
    config: ReliabilityConfig,
    records: DashMap<String, VoterReliabilityRecord>,
}

/// Store-level counters
#[derive(Debug, Clone, Default)]
pub struct ReliabilityStats {
    pub voters: usize,
    pub total_samples: u64,
    pub mean_score: f32,
}

impl std::fmt::Display for ReliabilityStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Reliability[voters={}, samples={}, mean={:.3}]",
            self.voters, self.total_samples, self.mean_score
        )
    }
}

impl ReliabilityStore {
    pub fn new(config: ReliabilityConfig) -> Self {
        Self {
            config,
            records: DashMap::new(),
        }
    }

    /// Fold one hit/miss observation into a voter's rolling estimate
    pub fn update(&self, voter_id: &str, hit: bool, now: DateTime<Utc>) -> ReliabilityDelta {
        let mut entry = self
            .records
            .entry(voter_id.to_string())
            .or_insert_with(|| VoterReliabilityRecord {
                voter_id: voter_id.to_string(),
                score: self.config.initial_score,
                samples: 0,
                updated_at: now,
            });

        let previous = entry.score;
        let target = if hit { 1.0 } else { 0.0 };
        entry.score = (1.0 - self.config.decay) * previous + self.config.decay * target;
        entry.samples += 1;
        entry.updated_at = now;
        debug!(voter = voter_id, hit, score = entry.score, "reliability updated");

        ReliabilityDelta {
            voter_id: voter_id.to_string(),
            hit,
            previous,
            updated: entry.score,
        }
    }

    /// Current score for a voter; unseen voters get the initial score
    pub fn score(&self, voter_id: &str) -> f32 {
        self.records
            .get(voter_id)
            .map(|r| r.score)
            .unwrap_or(self.config.initial_score)
    }

    /// Full record for a voter, if any outcomes were observed
    pub fn record(&self, voter_id: &str) -> Option<VoterReliabilityRecord> {
        self.records.get(voter_id).map(|r| r.value().clone())
    }

    /// Scores for a list of voters, preserving order
    pub fn scores_for<'a>(&self, voters: impl IntoIterator<Item = &'a str>) -> Vec<f32> {
        voters.into_iter().map(|v| self.score(v)).collect()
    }

    pub fn stats(&self) -> ReliabilityStats {
        let voters = self.records.len();
        let mut total_samples = 0u64;
        let mut score_sum = 0.0f32;
        for record in self.records.iter() {
            total_samples += record.samples;
            score_sum += record.score;
        }
        ReliabilityStats {
            voters,
            total_samples,
            mean_score: if voters > 0 {
                score_sum / voters as f32
            } else {
                0.0
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ReliabilityStore {
        ReliabilityStore::new(ReliabilityConfig {
            decay: 0.2,
            initial_score: 0.5,
        })
    }

    #[test]
    fn test_unseen_voter_gets_initial_score() {
        assert_eq!(store().score("lstm"), 0.5);
    }

    #[test]
    fn test_ema_moves_toward_outcomes() {
        let store = store();
        let now = Utc::now();

        let delta = store.update("lstm", true, now);
        assert_eq!(delta.previous, 0.5);
        assert!((delta.updated - 0.6).abs() < 1e-6);

        let delta = store.update("lstm", false, now);
        assert!((delta.updated - 0.48).abs() < 1e-6);

        let record = store.record("lstm").unwrap();
        assert_eq!(record.samples, 2);
    }

    #[test]
    fn test_voters_update_independently() {
        let store = store();
        let now = Utc::now();
        for _ in 0..5 {
            store.update("good", true, now);
            store.update("bad", false, now);
        }

        assert!(store.score("good") > 0.8);
        assert!(store.score("bad") < 0.2);

        let scores = store.scores_for(["good", "bad", "unseen"]);
        assert_eq!(scores.len(), 3);
        assert_eq!(scores[2], 0.5);
    }
}
