//! Learned Policy
//!
//! A value-based linear policy: one weight row per action over the state
//! features. Deterministic given (state, version); updates produce a new
//! policy value so a swap is all-or-nothing.

use serde::{Deserialize, Serialize};

use crate::domain::TradeLabel;
use crate::error::{QuorumError, Result};

/// Number of actions the policy scores (one per trade label)
pub const NUM_ACTIONS: usize = 3;

/// Initial bias toward holding, so an untrained policy never fabricates a
/// directional action.
const INITIAL_HOLD_BIAS: f32 = 0.1;

/// Per-action linear value model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearPolicy {
    version: u64,
    feature_dim: usize,
    /// One weight row per action, encoding order
    weights: Vec<Vec<f32>>,
    bias: Vec<f32>,
}

/// Diagnostic view of the policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyStats {
    pub version: u64,
    pub feature_dim: usize,
    /// L2 norm of each action's weight row
    pub weight_norms: Vec<f32>,
}

impl std::fmt::Display for PolicyStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Policy[v{}, dim={}, norms={:?}]",
            self.version, self.feature_dim, self.weight_norms
        )
    }
}

impl LinearPolicy {
    /// Create a fresh policy at version 0
    pub fn new(feature_dim: usize) -> Self {
        let mut bias = vec![0.0; NUM_ACTIONS];
        bias[TradeLabel::Hold.index()] = INITIAL_HOLD_BIAS;
        Self {
            version: 0,
            feature_dim,
            weights: vec![vec![0.0; feature_dim]; NUM_ACTIONS],
            bias,
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn feature_dim(&self) -> usize {
        self.feature_dim
    }

    /// Action-value estimates for a state
    pub fn scores(&self, state: &[f32]) -> Vec<f32> {
        self.weights
            .iter()
            .zip(&self.bias)
            .map(|(row, b)| {
                row.iter()
                    .zip(state)
                    .map(|(w, x)| w * x)
                    .sum::<f32>()
                    + b
            })
            .collect()
    }

    /// Softmax probability of each action
    pub fn probabilities(&self, state: &[f32]) -> Vec<f32> {
        let scores = self.scores(state);
        let max = scores.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        let exps: Vec<f32> = scores.iter().map(|s| (s - max).exp()).collect();
        let sum: f32 = exps.iter().sum();
        exps.into_iter().map(|e| e / sum).collect()
    }

    /// Greedy action and its softmax probability
    pub fn greedy(&self, state: &[f32]) -> (TradeLabel, f32) {
        let probs = self.probabilities(state);
        let mut best = TradeLabel::Hold.index();
        for i in 0..NUM_ACTIONS {
            if probs[i] > probs[best] {
                best = i;
            }
        }
        let label = TradeLabel::from_index(best).unwrap_or(TradeLabel::Hold);
        (label, probs[best])
    }

    /// Softmax probability of a specific action
    pub fn probability_of(&self, state: &[f32], label: TradeLabel) -> f32 {
        self.probabilities(state)[label.index()]
    }

    /// Produce the successor policy after one temporal-difference step on
    /// the taken action. The current policy is untouched; a non-finite
    /// result is rejected so the caller can keep the pre-update state.
    pub fn step(
        &self,
        state: &[f32],
        action: TradeLabel,
        reward: f32,
        learning_rate: f32,
    ) -> Result<LinearPolicy> {
        if state.len() != self.feature_dim {
            return Err(QuorumError::PolicyUpdate(format!(
                "state dimension {} does not match policy dimension {}",
                state.len(),
                self.feature_dim
            )));
        }
        if !reward.is_finite() {
            return Err(QuorumError::PolicyUpdate(format!(
                "non-finite reward {reward}"
            )));
        }

        let mut next = self.clone();
        let idx = action.index();
        let q = next.scores(state)[idx];
        let delta = reward - q;

        for (w, x) in next.weights[idx].iter_mut().zip(state) {
            *w += learning_rate * delta * x;
        }
        next.bias[idx] += learning_rate * delta;

        let torn = next.weights[idx].iter().any(|w| !w.is_finite())
            || !next.bias[idx].is_finite();
        if torn {
            return Err(QuorumError::PolicyUpdate(
                "update produced non-finite weights".to_string(),
            ));
        }

        next.version += 1;
        Ok(next)
    }

    pub fn stats(&self) -> PolicyStats {
        PolicyStats {
            version: self.version,
            feature_dim: self.feature_dim,
            weight_norms: self
                .weights
                .iter()
                .map(|row| row.iter().map(|w| w * w).sum::<f32>().sqrt())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::state::TOTAL_FEATURES;

    #[test]
    fn test_untrained_policy_holds() {
        let policy = LinearPolicy::new(TOTAL_FEATURES);
        let state = vec![0.0; TOTAL_FEATURES];
        let (label, _) = policy.greedy(&state);
        assert_eq!(label, TradeLabel::Hold);
    }

    #[test]
    fn test_deterministic_given_state_and_version() {
        let policy = LinearPolicy::new(TOTAL_FEATURES);
        let state: Vec<f32> = (0..TOTAL_FEATURES).map(|i| i as f32 * 0.01).collect();
        assert_eq!(policy.greedy(&state), policy.greedy(&state));
    }

    #[test]
    fn test_step_moves_value_toward_reward() {
        let policy = LinearPolicy::new(TOTAL_FEATURES);
        let mut state = vec![0.0; TOTAL_FEATURES];
        state[0] = 1.0;

        let updated = policy
            .step(&state, TradeLabel::Buy, 1.0, 0.5)
            .unwrap();
        let before = policy.scores(&state)[TradeLabel::Buy.index()];
        let after = updated.scores(&state)[TradeLabel::Buy.index()];

        assert!(after > before);
        assert_eq!(updated.version(), policy.version() + 1);
    }

    #[test]
    fn test_step_rejects_bad_input_without_touching_policy() {
        let policy = LinearPolicy::new(TOTAL_FEATURES);
        let state = vec![0.0; TOTAL_FEATURES];

        assert!(policy.step(&state, TradeLabel::Buy, f32::NAN, 0.1).is_err());
        assert!(policy.step(&[0.0; 2], TradeLabel::Buy, 0.5, 0.1).is_err());
        // Original still at version 0 with zero weights
        assert_eq!(policy.version(), 0);
        assert!(policy.stats().weight_norms.iter().all(|n| *n == 0.0));
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let policy = LinearPolicy::new(TOTAL_FEATURES);
        let state: Vec<f32> = (0..TOTAL_FEATURES).map(|i| (i % 3) as f32).collect();
        let sum: f32 = policy.probabilities(&state).iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
    }
}
