//! Feedback Processor
//!
//! Converts realized trade outcomes into reward signals and dispatches
//! them to the decision agent and the voter reliability store. Exactly one
//! application per action: duplicates are logged no-ops that return the
//! original report.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{info, warn};

use super::reliability::ReliabilityStore;
use super::reward::RewardMapper;
use crate::agent::DecisionAgent;
use crate::config::RewardConfig;
use crate::domain::{ActionId, FeedbackReport, TradeFeedback};
use crate::error::{QuorumError, Result};

#[derive(Debug, Clone)]
struct ProcessedFeedback {
    report: FeedbackReport,
    policy_applied: bool,
}

/// Processor-level counters
#[derive(Debug, Clone, Default)]
pub struct ProcessorStats {
    pub feedback_processed: u64,
    pub duplicates_ignored: u64,
    pub reliability_updates: u64,
}

impl std::fmt::Display for ProcessorStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Feedback[processed={}, duplicates={}, reliability_updates={}]",
            self.feedback_processed, self.duplicates_ignored, self.reliability_updates
        )
    }
}

/// Closes the loop from realized outcomes back into the policy and the
/// per-voter reliability estimates.
pub struct FeedbackProcessor {
    mapper: RewardMapper,
    reliability: Arc<ReliabilityStore>,
    agent: Arc<DecisionAgent>,
    processed: RwLock<HashMap<ActionId, ProcessedFeedback>>,
    stats: RwLock<ProcessorStats>,
}

impl FeedbackProcessor {
    pub fn new(
        config: RewardConfig,
        reliability: Arc<ReliabilityStore>,
        agent: Arc<DecisionAgent>,
    ) -> Self {
        Self {
            mapper: RewardMapper::new(config),
            reliability,
            agent,
            processed: RwLock::new(HashMap::new()),
            stats: RwLock::new(ProcessorStats::default()),
        }
    }

    pub fn reliability(&self) -> &Arc<ReliabilityStore> {
        &self.reliability
    }

    /// Apply one trade outcome.
    ///
    /// Reliability updates and the policy update are independent legs: a
    /// failed policy update is reported to the caller, and a retry for the
    /// same action replays only the policy leg. A second call for an
    /// already-applied action is a no-op returning the original report.
    pub async fn process(&self, feedback: &TradeFeedback) -> Result<FeedbackReport> {
        // The write guard is held across the whole application so that two
        // concurrent reports for the same action cannot both pass the
        // idempotency check.
        let mut processed = self.processed.write().await;

        if let Some(existing) = processed.get_mut(&feedback.action_id) {
            if existing.policy_applied {
                info!(
                    "{}",
                    QuorumError::DuplicateFeedback {
                        action_id: feedback.action_id
                    }
                );
                self.stats.write().await.duplicates_ignored += 1;
                let mut report = existing.report.clone();
                report.duplicate = true;
                return Ok(report);
            }

            // Earlier attempt applied reliability but the policy leg
            // failed; replay only the policy leg.
            let version = self
                .agent
                .update(feedback.action_id, existing.report.reward)
                .await?;
            existing.policy_applied = true;
            existing.report.policy_version = Some(version);
            return Ok(existing.report.clone());
        }

        let (action, tally) = self
            .agent
            .lookup(feedback.action_id)
            .await
            .ok_or(QuorumError::UnknownActionReference {
                action_id: feedback.action_id,
            })?;

        let reward = self.mapper.map(action.label, feedback.pnl_fraction);
        let direction = self
            .mapper
            .realized_direction(action.label, feedback.pnl_fraction);

        let mut reliability_deltas = Vec::new();
        if let Some(tally) = &tally {
            for vote in &tally.votes {
                let hit = vote.label == direction;
                reliability_deltas.push(self.reliability.update(
                    &vote.voter_id,
                    hit,
                    feedback.received_at,
                ));
            }
        }

        let mut report = FeedbackReport {
            action_id: feedback.action_id,
            reward,
            reliability_deltas,
            policy_version: None,
            duplicate: false,
        };

        {
            let mut stats = self.stats.write().await;
            stats.feedback_processed += 1;
            stats.reliability_updates += report.reliability_deltas.len() as u64;
        }

        match self.agent.update(feedback.action_id, reward).await {
            Ok(version) => {
                report.policy_version = Some(version);
                info!(
                    action_id = %feedback.action_id,
                    reward,
                    policy_version = version,
                    voters = report.reliability_deltas.len(),
                    "feedback applied"
                );
                processed.insert(
                    feedback.action_id,
                    ProcessedFeedback {
                        report: report.clone(),
                        policy_applied: true,
                    },
                );
                Ok(report)
            }
            Err(e) => {
                warn!(
                    action_id = %feedback.action_id,
                    error = %e,
                    "policy update failed; reliability already applied, retry will replay only the policy leg"
                );
                processed.insert(
                    feedback.action_id,
                    ProcessedFeedback {
                        report,
                        policy_applied: false,
                    },
                );
                Err(e)
            }
        }
    }

    pub async fn stats(&self) -> ProcessorStats {
        self.stats.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DecisionConfig, ReliabilityConfig};
    use crate::domain::{LabelTotals, TradeLabel, Vote, VoteTally};
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn at(secs: i64) -> chrono::DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn tally(votes: Vec<(&str, TradeLabel, f32)>) -> Arc<VoteTally> {
        let mut totals = LabelTotals::default();
        let votes: Vec<Vote> = votes
            .into_iter()
            .map(|(voter, label, confidence)| {
                totals.add(label, confidence);
                Vote::new(voter, "BTC-USD", label, confidence, at(0))
            })
            .collect();
        let total_voters = votes.len();
        Arc::new(VoteTally {
            topic: "BTC-USD".to_string(),
            window_id: 0,
            votes,
            totals,
            winning_label: Some(TradeLabel::Buy),
            total_voters,
            missing_voters: 0,
            provisional: false,
            closed_at: Some(at(0)),
        })
    }

    fn processor() -> (FeedbackProcessor, Arc<DecisionAgent>) {
        let agent = Arc::new(DecisionAgent::new(DecisionConfig {
            exploration_rate: 0.0,
            ..Default::default()
        }));
        let reliability = Arc::new(ReliabilityStore::new(ReliabilityConfig::default()));
        (
            FeedbackProcessor::new(RewardConfig::default(), reliability, Arc::clone(&agent)),
            agent,
        )
    }

    #[tokio::test]
    async fn test_feedback_idempotent_per_action() {
        let (processor, agent) = processor();
        let t = tally(vec![
            ("ofi", TradeLabel::Buy, 0.8),
            ("regime", TradeLabel::Sell, 0.4),
        ]);
        let action = agent.decide(&t, vec![0.5, 0.5], at(1)).await;

        // pnl 0.05 at k=10 -> reward 0.5
        let feedback = TradeFeedback::new(action.id, dec!(0.05));
        let first = processor.process(&feedback).await.unwrap();
        assert!((first.reward - 0.5).abs() < 1e-6);
        assert!(!first.duplicate);
        let version_after_first = agent.policy_version().await;

        let second = processor.process(&feedback).await.unwrap();
        assert_eq!(second.reward, first.reward);
        assert!(second.duplicate);
        // No second policy update, no second reliability application
        assert_eq!(agent.policy_version().await, version_after_first);
        let stats = processor.stats().await;
        assert_eq!(stats.feedback_processed, 1);
        assert_eq!(stats.duplicates_ignored, 1);
        assert_eq!(stats.reliability_updates, 2);
    }

    #[tokio::test]
    async fn test_reliability_credits_matching_votes() {
        let (processor, agent) = processor();
        let t = tally(vec![
            ("bull", TradeLabel::Buy, 0.8),
            ("bear", TradeLabel::Sell, 0.6),
        ]);
        let action = agent.decide(&t, vec![0.5, 0.5], at(1)).await;

        // Positive pnl on the emitted action
        let feedback = TradeFeedback::new(action.id, dec!(0.05));
        let report = processor.process(&feedback).await.unwrap();

        let direction = report
            .reliability_deltas
            .iter()
            .map(|d| (d.voter_id.clone(), d.hit))
            .collect::<Vec<_>>();
        // Exactly one of the two opposing voters can be right
        assert_eq!(direction.len(), 2);
        assert_ne!(direction[0].1, direction[1].1);
    }

    #[tokio::test]
    async fn test_unknown_action_is_hard_error() {
        let (processor, _) = processor();
        let feedback = TradeFeedback::new(uuid::Uuid::new_v4(), dec!(0.05));
        let result = processor.process(&feedback).await;
        assert!(matches!(
            result,
            Err(QuorumError::UnknownActionReference { .. })
        ));
    }
}
