//! Service Host
//!
//! The transport-agnostic dispatcher tying the core together: it fans a
//! prediction cycle out to every registered predictor concurrently,
//! collects the survivors into votes, waits for the decision window to
//! close, and hands the tally to the decision agent.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::protocol::{
    parse_request, CastVoteAck, CastVoteRequest, DecideRequest, FeedbackAck, GetTallyRequest,
    OperationHandler, OperationTable, SubmitFeedbackRequest,
};
use super::registry::PredictorRegistry;
use crate::agent::DecisionAgent;
use crate::config::CoreConfig;
use crate::domain::{Action, MarketSnapshot, Prediction, TradeFeedback, Vote, VoteTally};
use crate::ensemble::{EnsembleCombiner, EnsembleWeightSet};
use crate::error::{QuorumError, Result};
use crate::feedback::{FeedbackProcessor, ReliabilityStore};
use crate::voting::{VoteLedger, VotingAggregator};

/// Why a predictor contributed no vote to a cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AbsenceReason {
    /// The call exceeded the per-predictor timeout
    Timeout,
    /// The call returned an error
    Failed(String),
    /// A signal group had no responding members
    NoSignal,
    /// The result arrived after the window froze and was discarded
    Discarded,
}

/// Outcome of one prediction cycle
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub topic: String,
    pub window_id: u64,
    pub tally: Arc<VoteTally>,
    pub action: Action,
    pub votes_cast: usize,
    pub absent: Vec<(String, AbsenceReason)>,
}

/// Host-level counters
#[derive(Debug, Clone, Default)]
pub struct HostStats {
    pub cycles_run: u64,
    pub predictions_received: u64,
    pub predictor_timeouts: u64,
    pub predictor_errors: u64,
    pub votes_cast: u64,
    pub actions_emitted: u64,
    pub feedback_processed: u64,
}

impl std::fmt::Display for HostStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Host[cycles={}, predictions={}, timeouts={}, errors={}, votes={}, actions={}, feedback={}]",
            self.cycles_run,
            self.predictions_received,
            self.predictor_timeouts,
            self.predictor_errors,
            self.votes_cast,
            self.actions_emitted,
            self.feedback_processed
        )
    }
}

/// The assembled decision core
pub struct ServiceHost {
    config: CoreConfig,
    registry: PredictorRegistry,
    combiner: EnsembleCombiner,
    /// Current ensemble weights; combine operations read a snapshot
    weights: RwLock<EnsembleWeightSet>,
    ledger: Arc<VoteLedger>,
    aggregator: VotingAggregator,
    agent: Arc<DecisionAgent>,
    feedback: FeedbackProcessor,
    operations: OperationTable,
    stats: RwLock<HostStats>,
}

impl ServiceHost {
    /// Assemble the core from configuration and an explicitly constructed
    /// predictor registry. All component wiring happens here; nothing is
    /// global.
    pub async fn new(config: CoreConfig, registry: PredictorRegistry) -> Arc<Self> {
        let ledger = Arc::new(VoteLedger::new());
        let aggregator = VotingAggregator::new(config.window.clone(), Arc::clone(&ledger));
        let agent = Arc::new(DecisionAgent::new(config.decision.clone()));
        let reliability = Arc::new(ReliabilityStore::new(config.reliability.clone()));
        let feedback = FeedbackProcessor::new(
            config.reward.clone(),
            reliability,
            Arc::clone(&agent),
        );
        let combiner = EnsembleCombiner::new(config.ensemble.clone());

        let host = Arc::new(Self {
            config,
            registry,
            combiner,
            weights: RwLock::new(EnsembleWeightSet::new()),
            ledger,
            aggregator,
            agent,
            feedback,
            operations: OperationTable::new(),
            stats: RwLock::new(HostStats::default()),
        });
        host.install_operations().await;
        host
    }

    pub fn agent(&self) -> &Arc<DecisionAgent> {
        &self.agent
    }

    pub fn ledger(&self) -> &Arc<VoteLedger> {
        &self.ledger
    }

    pub fn reliability(&self) -> &Arc<ReliabilityStore> {
        self.feedback.reliability()
    }

    pub async fn stats(&self) -> HostStats {
        self.stats.read().await.clone()
    }

    /// Replace the ensemble weights. Combines in flight keep the snapshot
    /// they already read.
    pub async fn set_ensemble_weights(&self, weights: EnsembleWeightSet) {
        *self.weights.write().await = weights;
    }

    /// Register an additional named operation
    pub async fn register_operation(&self, operation: impl Into<String>, handler: OperationHandler) {
        self.operations.register(operation, handler).await;
    }

    /// Route a serialized request to a named operation
    pub async fn dispatch(&self, operation: &str, request: Value) -> Result<Value> {
        self.operations.dispatch(operation, request).await
    }

    /// Accept an externally cast vote into the topic's current window
    pub async fn cast_vote(&self, request: CastVoteRequest) -> Result<CastVoteAck> {
        let now = Utc::now();
        let vote = Vote::new(
            request.voter_id,
            request.topic,
            request.label,
            request.confidence,
            request.timestamp.unwrap_or(now),
        );
        let window_id = self.aggregator.cast_vote(vote, now).await?;
        self.stats.write().await.votes_cast += 1;
        Ok(CastVoteAck { window_id })
    }

    /// Stored tally for closed windows, provisional (flagged) otherwise
    pub async fn get_tally(&self, request: GetTallyRequest) -> Result<VoteTally> {
        self.aggregator.tally(&request.topic, request.window_id).await
    }

    /// Finalize the topic's window if due, then decide.
    ///
    /// With nothing to finalize this degrades to a hold action with no
    /// tally reference rather than an error.
    pub async fn decide(&self, topic: &str) -> Result<Action> {
        let now = Utc::now();
        let action = match self.aggregator.poll(topic, now).await {
            Some(tally) => self.decide_on(&tally).await,
            None => {
                let action = self.agent.decide_unreferenced(topic, now).await;
                self.stats.write().await.actions_emitted += 1;
                action
            }
        };
        Ok(action)
    }

    /// Apply a realized trade outcome. Idempotent per action id.
    pub async fn submit_feedback(&self, request: SubmitFeedbackRequest) -> Result<FeedbackAck> {
        let feedback = TradeFeedback::new(request.action_id, request.pnl_fraction);
        let report = self.feedback.process(&feedback).await?;
        self.stats.write().await.feedback_processed += 1;
        Ok(FeedbackAck {
            action_id: report.action_id,
            reward: report.reward,
            duplicate: report.duplicate,
        })
    }

    /// Run one full prediction cycle for a topic: open the window, fan out
    /// to every registered predictor concurrently, cast the survivors'
    /// votes, wait for the window to close, and decide on the tally.
    ///
    /// Predictors that error or time out are recorded absent and never
    /// block the cycle or fabricate a vote.
    pub async fn run_cycle(&self, topic: &str, market: &MarketSnapshot) -> Result<CycleReport> {
        let now = Utc::now();
        let roster = self.registry.roster();
        let window_id = self.aggregator.open_window(topic, roster, now).await?;
        info!(topic, window_id, predictors = self.registry.len(), "prediction cycle started");

        let timeout = Duration::from_millis(self.config.host.predictor_timeout_ms);
        let fanout = self.registry.entries().into_iter().map(|(name, predictor)| {
            let market = market.clone();
            let topic = topic.to_string();
            async move {
                let outcome =
                    match tokio::time::timeout(timeout, predictor.predict(&topic, &market)).await
                    {
                        Ok(Ok(prediction)) => Ok(prediction),
                        Ok(Err(e)) => Err(QuorumError::PredictorFailed {
                            predictor: name.clone(),
                            reason: e.to_string(),
                        }),
                        Err(_) => Err(QuorumError::PredictorTimeout {
                            predictor: name.clone(),
                        }),
                    };
                (name, outcome)
            }
        });
        let results = join_all(fanout).await;

        let mut grouped: HashMap<String, Vec<(String, Prediction)>> = HashMap::new();
        let mut votes: Vec<Vote> = Vec::new();
        let mut absent: Vec<(String, AbsenceReason)> = Vec::new();

        for (name, outcome) in results {
            match outcome {
                Ok(prediction) => {
                    self.stats.write().await.predictions_received += 1;
                    match self.registry.group_of(&name) {
                        Some(group) => grouped
                            .entry(group.to_string())
                            .or_default()
                            .push((name, prediction)),
                        None => votes.push(Vote::new(
                            name,
                            topic,
                            prediction.label,
                            prediction.confidence,
                            prediction.predicted_at,
                        )),
                    }
                }
                Err(e) => {
                    warn!(topic, error = %e, "predictor absent for cycle");
                    let reason = match &e {
                        QuorumError::PredictorTimeout { .. } => {
                            self.stats.write().await.predictor_timeouts += 1;
                            AbsenceReason::Timeout
                        }
                        _ => {
                            self.stats.write().await.predictor_errors += 1;
                            AbsenceReason::Failed(e.to_string())
                        }
                    };
                    absent.push((name, reason));
                }
            }
        }

        // Pre-merge signal groups through the ensemble combiner
        let weights = self.weights.read().await.clone();
        for group in self.registry.group_names() {
            match grouped.remove(group) {
                Some(members) if !members.is_empty() => {
                    match self.combiner.combine(&members, &weights) {
                        Ok(prediction) => votes.push(Vote::new(
                            group.clone(),
                            topic,
                            prediction.label,
                            prediction.confidence,
                            prediction.predicted_at,
                        )),
                        Err(e) => {
                            warn!(topic, group = %group, error = %e, "signal group combine failed");
                            absent.push((group.clone(), AbsenceReason::Failed(e.to_string())));
                        }
                    }
                }
                _ => absent.push((group.clone(), AbsenceReason::NoSignal)),
            }
        }

        let mut votes_cast = 0usize;
        for vote in votes {
            let voter = vote.voter_id.clone();
            match self.aggregator.cast_vote(vote, Utc::now()).await {
                Ok(_) => votes_cast += 1,
                Err(QuorumError::WindowClosed { .. }) => {
                    absent.push((voter, AbsenceReason::Discarded));
                }
                Err(e) => return Err(e),
            }
        }
        self.stats.write().await.votes_cast += votes_cast as u64;

        let tally = self.wait_for_close(topic).await?;
        let action = self.decide_on(&tally).await;
        self.stats.write().await.cycles_run += 1;

        info!(
            topic,
            window_id,
            voters = tally.total_voters,
            missing = tally.missing_voters,
            action = %action.label,
            confidence = action.confidence,
            "prediction cycle complete"
        );
        Ok(CycleReport {
            topic: topic.to_string(),
            window_id,
            tally,
            action,
            votes_cast,
            absent,
        })
    }

    async fn decide_on(&self, tally: &Arc<VoteTally>) -> Action {
        let reliability = self
            .reliability()
            .scores_for(tally.votes.iter().map(|v| v.voter_id.as_str()));
        let action = self.agent.decide(tally, reliability, Utc::now()).await;
        self.stats.write().await.actions_emitted += 1;
        action
    }

    /// Poll until the topic's window closes. The window deadline itself
    /// guarantees forward progress; the hard stop only guards against a
    /// wedged clock.
    async fn wait_for_close(&self, topic: &str) -> Result<Arc<VoteTally>> {
        let poll_interval = Duration::from_millis(self.config.host.poll_interval_ms.max(1));
        let hard_stop = tokio::time::Instant::now()
            + Duration::from_millis(self.config.window.max_duration_ms + 1_000);
        loop {
            if let Some(tally) = self.aggregator.poll(topic, Utc::now()).await {
                return Ok(tally);
            }
            if tokio::time::Instant::now() >= hard_stop {
                return Err(QuorumError::Internal(format!(
                    "window for {topic} failed to close"
                )));
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    async fn install_operations(self: &Arc<Self>) {
        let host = Arc::clone(self);
        self.operations
            .register(
                "cast_vote",
                Arc::new(move |request| {
                    let host = Arc::clone(&host);
                    Box::pin(async move {
                        let request = parse_request::<CastVoteRequest>("cast_vote", request)?;
                        let ack = host.cast_vote(request).await?;
                        Ok(serde_json::to_value(ack)?)
                    })
                }),
            )
            .await;

        let host = Arc::clone(self);
        self.operations
            .register(
                "get_tally",
                Arc::new(move |request| {
                    let host = Arc::clone(&host);
                    Box::pin(async move {
                        let request = parse_request::<GetTallyRequest>("get_tally", request)?;
                        let tally = host.get_tally(request).await?;
                        Ok(serde_json::to_value(tally)?)
                    })
                }),
            )
            .await;

        let host = Arc::clone(self);
        self.operations
            .register(
                "decide",
                Arc::new(move |request| {
                    let host = Arc::clone(&host);
                    Box::pin(async move {
                        let request = parse_request::<DecideRequest>("decide", request)?;
                        let action = host.decide(&request.topic).await?;
                        Ok(serde_json::to_value(action)?)
                    })
                }),
            )
            .await;

        let host = Arc::clone(self);
        self.operations
            .register(
                "submit_feedback",
                Arc::new(move |request| {
                    let host = Arc::clone(&host);
                    Box::pin(async move {
                        let request =
                            parse_request::<SubmitFeedbackRequest>("submit_feedback", request)?;
                        let ack = host.submit_feedback(request).await?;
                        Ok(serde_json::to_value(ack)?)
                    })
                }),
            )
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TradeLabel;

    #[tokio::test]
    async fn test_decide_without_window_degrades_to_hold() {
        let host = ServiceHost::new(CoreConfig::default(), PredictorRegistry::new()).await;
        let action = host.decide("BTC-USD").await.unwrap();

        assert_eq!(action.label, TradeLabel::Hold);
        assert_eq!(action.confidence, 0.0);
        assert_eq!(action.tally_ref, None);
    }

    #[tokio::test]
    async fn test_builtin_operations_installed() {
        let host = ServiceHost::new(CoreConfig::default(), PredictorRegistry::new()).await;
        let mut operations = host.operations.operations().await;
        operations.sort();
        assert_eq!(
            operations,
            vec!["cast_vote", "decide", "get_tally", "submit_feedback"]
        );
    }

    #[test]
    fn test_stats_display() {
        let stats = HostStats::default();
        assert!(stats.to_string().starts_with("Host["));
    }
}
