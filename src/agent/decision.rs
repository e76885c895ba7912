//! Decision Agent
//!
//! Consumes closed tallies, emits exactly one action per cycle, and owns
//! the single mutable policy behind an exclusive-writer/concurrent-reader
//! lock. Feedback is the only path that mutates the policy.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::policy::{LinearPolicy, PolicyStats};
use super::state::{DefaultStateEncoder, StateEncoder, TallyObservation, TOTAL_FEATURES};
use crate::config::DecisionConfig;
use crate::domain::{Action, ActionId, TradeLabel, VoteTally};
use crate::error::{QuorumError, Result};

/// One recorded (state, action, reward) transition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperienceEntry {
    pub action_id: ActionId,
    pub state: Vec<f32>,
    pub label: TradeLabel,
    pub reward: f32,
    pub recorded_at: DateTime<Utc>,
}

/// Everything needed to attribute feedback to a decision later
#[derive(Debug, Clone)]
struct ActionRecord {
    action: Action,
    state: Vec<f32>,
    tally: Option<Arc<VoteTally>>,
}

/// The learning decision agent
pub struct DecisionAgent {
    config: DecisionConfig,
    encoder: DefaultStateEncoder,
    policy: RwLock<Arc<LinearPolicy>>,
    explorer: Mutex<StdRng>,
    actions: RwLock<HashMap<ActionId, ActionRecord>>,
    last_decided: RwLock<HashMap<String, DateTime<Utc>>>,
    experience: Mutex<VecDeque<ExperienceEntry>>,
}

impl DecisionAgent {
    pub fn new(config: DecisionConfig) -> Self {
        let explorer = StdRng::seed_from_u64(config.exploration_seed);
        Self {
            config,
            encoder: DefaultStateEncoder::new(),
            policy: RwLock::new(Arc::new(LinearPolicy::new(TOTAL_FEATURES))),
            explorer: Mutex::new(explorer),
            actions: RwLock::new(HashMap::new()),
            last_decided: RwLock::new(HashMap::new()),
            experience: Mutex::new(VecDeque::new()),
        }
    }

    /// Decide on a closed tally.
    ///
    /// `voter_reliability` is aligned with the tally's vote order. An empty
    /// tally yields the degraded hold action rather than an error.
    pub async fn decide(
        &self,
        tally: &Arc<VoteTally>,
        voter_reliability: Vec<f32>,
        now: DateTime<Utc>,
    ) -> Action {
        let policy = Arc::clone(&*self.policy.read().await);

        if tally.is_empty() {
            warn!(topic = %tally.topic, window = tally.window_id, "empty tally, holding");
            let action = Action::hold(&tally.topic, policy.version(), Some(tally.window_id));
            self.record(action.clone(), vec![0.0; TOTAL_FEATURES], Some(Arc::clone(tally)), now)
                .await;
            return action;
        }

        let last_action_at = self.last_decided.read().await.get(&tally.topic).copied();
        let obs =
            TallyObservation::from_tally(tally, voter_reliability, last_action_at, now);
        let state = self.encoder.encode(&obs);

        let (mut label, mut confidence) = policy.greedy(&state);
        if self.config.exploration_rate > 0.0 {
            let mut rng = self.explorer.lock().await;
            if rng.gen::<f32>() < self.config.exploration_rate {
                let index = rng.gen_range(0..crate::agent::policy::NUM_ACTIONS);
                label = TradeLabel::from_index(index).unwrap_or(TradeLabel::Hold);
                confidence = policy.probability_of(&state, label);
                debug!(topic = %tally.topic, explored = %label, "exploratory action");
            }
        }

        let action = Action {
            id: Uuid::new_v4(),
            topic: tally.topic.clone(),
            label,
            confidence,
            tally_ref: Some(tally.window_id),
            policy_version: policy.version(),
            actionable: confidence >= self.config.min_actionable_confidence,
            decided_at: now,
        };
        info!(
            topic = %action.topic,
            label = %action.label,
            confidence = action.confidence,
            policy_version = action.policy_version,
            "action emitted"
        );
        self.record(action.clone(), state, Some(Arc::clone(tally)), now)
            .await;
        action
    }

    /// Decide with no tally at all: well-defined hold with no tally ref
    pub async fn decide_unreferenced(&self, topic: &str, now: DateTime<Utc>) -> Action {
        let version = self.policy.read().await.version();
        warn!(topic, "no tally available, holding");
        let action = Action::hold(topic, version, None);
        self.record(action.clone(), vec![0.0; TOTAL_FEATURES], None, now)
            .await;
        action
    }

    /// Apply a single serialized policy update for an emitted action.
    ///
    /// The successor policy is built aside and swapped in under the write
    /// lock, so concurrent `decide` calls observe either the old or the
    /// new policy, never a torn one. On failure the old policy stands.
    pub async fn update(&self, action_id: ActionId, reward: f32) -> Result<u64> {
        let (state, label) = {
            let actions = self.actions.read().await;
            let record = actions
                .get(&action_id)
                .ok_or(QuorumError::UnknownActionReference { action_id })?;
            (record.state.clone(), record.action.label)
        };

        let mut guard = self.policy.write().await;
        let next = guard.step(&state, label, reward, self.config.learning_rate)?;
        let version = next.version();
        *guard = Arc::new(next);
        drop(guard);

        let mut experience = self.experience.lock().await;
        if experience.len() >= self.config.experience_capacity {
            experience.pop_front();
        }
        experience.push_back(ExperienceEntry {
            action_id,
            state,
            label,
            reward,
            recorded_at: Utc::now(),
        });
        debug!(%action_id, reward, version, "policy updated");
        Ok(version)
    }

    /// Action and originating tally for feedback attribution
    pub async fn lookup(&self, action_id: ActionId) -> Option<(Action, Option<Arc<VoteTally>>)> {
        let actions = self.actions.read().await;
        actions
            .get(&action_id)
            .map(|r| (r.action.clone(), r.tally.clone()))
    }

    /// Version of the current policy
    pub async fn policy_version(&self) -> u64 {
        self.policy.read().await.version()
    }

    /// Diagnostic view of the current policy
    pub async fn policy_stats(&self) -> PolicyStats {
        self.policy.read().await.stats()
    }

    /// Number of transitions in the experience log
    pub async fn experience_len(&self) -> usize {
        self.experience.lock().await.len()
    }

    async fn record(
        &self,
        action: Action,
        state: Vec<f32>,
        tally: Option<Arc<VoteTally>>,
        now: DateTime<Utc>,
    ) {
        self.last_decided
            .write()
            .await
            .insert(action.topic.clone(), now);
        self.actions.write().await.insert(
            action.id,
            ActionRecord {
                action,
                state,
                tally,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{LabelTotals, Vote};
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn config() -> DecisionConfig {
        DecisionConfig {
            exploration_rate: 0.0,
            ..Default::default()
        }
    }

    fn tally(votes: Vec<(&str, TradeLabel, f32)>, missing: usize) -> Arc<VoteTally> {
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
            window_id: 7,
            votes,
            totals,
            winning_label: Some(TradeLabel::Buy),
            total_voters,
            missing_voters: missing,
            provisional: false,
            closed_at: Some(at(0)),
        })
    }

    #[tokio::test]
    async fn test_empty_tally_yields_hold_not_error() {
        let agent = DecisionAgent::new(config());
        let empty = tally(vec![], 3);
        let action = agent.decide(&empty, vec![], at(1)).await;

        assert_eq!(action.label, TradeLabel::Hold);
        assert_eq!(action.confidence, 0.0);
        assert_eq!(action.tally_ref, Some(7));
    }

    #[tokio::test]
    async fn test_partial_roster_still_decides() {
        let agent = DecisionAgent::new(config());
        let thin = tally(vec![("a", TradeLabel::Buy, 0.9)], 2);
        let action = agent.decide(&thin, vec![0.5], at(1)).await;

        assert_eq!(action.topic, "BTC-USD");
        assert_eq!(action.tally_ref, Some(7));
    }

    #[tokio::test]
    async fn test_action_tagged_with_policy_version() {
        let agent = DecisionAgent::new(config());
        let t = tally(vec![("a", TradeLabel::Buy, 0.9)], 0);

        let first = agent.decide(&t, vec![0.5], at(1)).await;
        assert_eq!(first.policy_version, 0);

        agent.update(first.id, 0.5).await.unwrap();
        assert_eq!(agent.policy_version().await, 1);
    }

    #[tokio::test]
    async fn test_update_unknown_action_is_hard_error() {
        let agent = DecisionAgent::new(config());
        let result = agent.update(Uuid::new_v4(), 0.5).await;
        assert!(matches!(
            result,
            Err(QuorumError::UnknownActionReference { .. })
        ));
    }

    #[tokio::test]
    async fn test_failed_update_keeps_previous_policy() {
        let agent = DecisionAgent::new(config());
        let t = tally(vec![("a", TradeLabel::Buy, 0.9)], 0);
        let action = agent.decide(&t, vec![0.5], at(1)).await;

        let result = agent.update(action.id, f32::NAN).await;
        assert!(matches!(result, Err(QuorumError::PolicyUpdate(_))));
        assert_eq!(agent.policy_version().await, 0);
        assert_eq!(agent.experience_len().await, 0);
    }

    #[tokio::test]
    async fn test_updates_serialize_and_bump_version() {
        let agent = DecisionAgent::new(config());
        let t = tally(vec![("a", TradeLabel::Buy, 0.9)], 0);

        for expected in 1..=5u64 {
            let action = agent.decide(&t, vec![0.5], at(expected as i64)).await;
            let version = agent.update(action.id, 0.3).await.unwrap();
            assert_eq!(version, expected);
        }
        assert_eq!(agent.experience_len().await, 5);
    }

    #[tokio::test]
    async fn test_seeded_exploration_is_reproducible() {
        let make = || {
            DecisionAgent::new(DecisionConfig {
                exploration_rate: 1.0,
                exploration_seed: 42,
                ..Default::default()
            })
        };
        let t = tally(vec![("a", TradeLabel::Buy, 0.9)], 0);

        let mut first = Vec::new();
        let agent = make();
        for i in 0..10 {
            first.push(agent.decide(&t, vec![0.5], at(i)).await.label);
        }

        let mut second = Vec::new();
        let agent = make();
        for i in 0..10 {
            second.push(agent.decide(&t, vec![0.5], at(i)).await.label);
        }

        assert_eq!(first, second);
    }
}
