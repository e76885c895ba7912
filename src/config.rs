//! Core Configuration
//!
//! Configuration structs for the decision core. These are plain values:
//! loading them from files or the environment is the embedding
//! application's concern.

use serde::{Deserialize, Serialize};

/// Top-level configuration for the decision core
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Ensemble combiner configuration
    pub ensemble: EnsembleConfig,
    /// Decision window configuration
    pub window: WindowConfig,
    /// Decision agent configuration
    pub decision: DecisionConfig,
    /// Reward mapping configuration
    pub reward: RewardConfig,
    /// Voter reliability configuration
    pub reliability: ReliabilityConfig,
    /// Service host configuration
    pub host: HostConfig,
}

/// Ensemble combiner parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleConfig {
    /// Strength of the entropy-based disagreement discount.
    ///
    /// Combined confidence under label disagreement is multiplied by
    /// `1 - discount_strength * normalized_entropy`. Zero disables the
    /// discount entirely.
    pub discount_strength: f32,
    /// Minimum components required for a combine to succeed
    pub min_components: usize,
    /// Weight assumed for components absent from the weight set
    pub default_weight: f32,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            discount_strength: 0.2,
            min_components: 1,
            default_weight: 1.0,
        }
    }
}

/// Decision window timing parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Base deadline after window open (milliseconds)
    pub deadline_ms: u64,
    /// Deadline extension granted per accepted vote (milliseconds, 0 disables)
    pub vote_grace_ms: u64,
    /// Hard cap on total window duration (milliseconds)
    pub max_duration_ms: u64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            deadline_ms: 2_000,
            vote_grace_ms: 0,
            max_duration_ms: 10_000,
        }
    }
}

/// Decision agent parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionConfig {
    /// Learning rate for policy updates
    pub learning_rate: f32,
    /// Epsilon for epsilon-greedy exploration (0 disables)
    pub exploration_rate: f32,
    /// Seed for the exploration RNG, for reproducible replay
    pub exploration_seed: u64,
    /// Minimum confidence for an action to be flagged actionable
    pub min_actionable_confidence: f32,
    /// Fixed number of per-voter reliability slots in the state encoding
    pub reliability_slots: usize,
    /// Capacity of the bounded experience log
    pub experience_capacity: usize,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            exploration_rate: 0.05,
            exploration_seed: 17,
            min_actionable_confidence: 0.25,
            reliability_slots: 8,
            experience_capacity: 1_024,
        }
    }
}

/// Reward mapping parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardConfig {
    /// Saturating scale applied to the realized P&L fraction
    pub scale_k: f32,
    /// Multiplier for decisive (buy/sell) actions with material P&L
    pub decisive_multiplier: f32,
    /// Reward granted for a hold that realized near-zero P&L
    pub hold_inaction_reward: f32,
    /// P&L fraction magnitude below which an outcome counts as flat
    pub flat_pnl_epsilon: f32,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            scale_k: 10.0,
            decisive_multiplier: 1.0,
            hold_inaction_reward: 0.05,
            flat_pnl_epsilon: 0.005,
        }
    }
}

/// Voter reliability tracking parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReliabilityConfig {
    /// EMA decay: weight of the newest observation
    pub decay: f32,
    /// Score assigned to voters with no history
    pub initial_score: f32,
}

impl Default for ReliabilityConfig {
    fn default() -> Self {
        Self {
            decay: 0.1,
            initial_score: 0.5,
        }
    }
}

/// Service host parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// Per-predictor call timeout during fan-out (milliseconds)
    pub predictor_timeout_ms: u64,
    /// Poll interval while waiting for a window to close (milliseconds)
    pub poll_interval_ms: u64,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            predictor_timeout_ms: 1_500,
            poll_interval_ms: 25,
        }
    }
}
