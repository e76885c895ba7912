//! Ensemble Combiner
//!
//! Merges multiple predictions for the same underlying signal into one
//! blended prediction. Weights are renormalized over the components that
//! actually responded, so an absent component never zeroes out the blend.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::EnsembleConfig;
use crate::domain::{LabelTotals, Prediction, TradeLabel};
use crate::error::{QuorumError, Result};

/// Named component weights, non-negative, not required to sum to 1.
///
/// Mutable only through explicit configuration updates; a combine call
/// operates on a snapshot and never mutates the set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnsembleWeightSet {
    weights: HashMap<String, f32>,
}

impl EnsembleWeightSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a component weight. Negative values are clamped to zero.
    pub fn set(&mut self, component: impl Into<String>, weight: f32) -> &mut Self {
        self.weights.insert(component.into(), weight.max(0.0));
        self
    }

    /// Builder-style weight assignment
    pub fn with(mut self, component: impl Into<String>, weight: f32) -> Self {
        self.set(component, weight);
        self
    }

    /// Configured weight for a component, if any
    pub fn get(&self, component: &str) -> Option<f32> {
        self.weights.get(component).copied()
    }

    /// Number of configured components
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }
}

/// Combines component predictions into one blended prediction.
///
/// Pure over its inputs; safe to call concurrently with different weight
/// snapshots.
#[derive(Debug, Clone, Default)]
pub struct EnsembleCombiner {
    config: EnsembleConfig,
}

impl EnsembleCombiner {
    pub fn new(config: EnsembleConfig) -> Self {
        Self { config }
    }

    /// Merge the responding components into a single prediction.
    ///
    /// On label agreement the combined confidence is the weighted mean of
    /// component confidences. On disagreement the label of the highest
    /// weighted-confidence component wins and the combined confidence is
    /// discounted by the entropy of the weighted label distribution, so
    /// disagreement never scores higher than full agreement would.
    pub fn combine(
        &self,
        predictions: &[(String, Prediction)],
        weights: &EnsembleWeightSet,
    ) -> Result<Prediction> {
        if predictions.is_empty() || predictions.len() < self.config.min_components {
            return Err(QuorumError::NoSignal);
        }

        // Renormalize weights over the components that responded
        let raw: Vec<f32> = predictions
            .iter()
            .map(|(name, _)| weights.get(name).unwrap_or(self.config.default_weight))
            .collect();
        let weight_sum: f32 = raw.iter().sum();
        if weight_sum <= 0.0 {
            return Err(QuorumError::InvalidWeights(
                "responding components carry zero total weight".to_string(),
            ));
        }
        let normalized: Vec<f32> = raw.iter().map(|w| w / weight_sum).collect();

        // Weighted-confidence mass per label, and the single strongest component
        let mut mass = LabelTotals::default();
        let mut winner: Option<(usize, f32)> = None;
        for (i, (name, prediction)) in predictions.iter().enumerate() {
            let contribution = normalized[i] * prediction.confidence;
            mass.add(prediction.label, contribution);

            let beats = match winner {
                None => true,
                Some((best, best_contribution)) => {
                    contribution > best_contribution
                        || (contribution == best_contribution
                            && self.breaks_component_tie(predictions, i, best))
                }
            };
            if beats {
                winner = Some((i, contribution));
            }
            debug!(
                component = %name,
                label = %prediction.label,
                weight = normalized[i],
                confidence = prediction.confidence,
                "ensemble component"
            );
        }
        let (winner_idx, _) = winner.ok_or(QuorumError::NoSignal)?;
        let winning_label = predictions[winner_idx].1.label;

        // Weighted mean confidence over the agreeing components
        let agree_weight: f32 = predictions
            .iter()
            .enumerate()
            .filter(|(_, (_, p))| p.label == winning_label)
            .map(|(i, _)| normalized[i])
            .sum();
        let agree_confidence = if agree_weight > 0.0 {
            mass.get(winning_label) / agree_weight
        } else {
            0.0
        };

        let confidence = agree_confidence * self.agreement_multiplier(&mass);

        let expected_return =
            weighted_expected_return(predictions, &normalized, winning_label);

        let source = predictions
            .iter()
            .map(|(name, _)| name.as_str())
            .collect::<Vec<_>>()
            .join("+");
        let predicted_at = predictions
            .iter()
            .map(|(_, p)| p.predicted_at)
            .max()
            .unwrap_or_else(chrono::Utc::now);

        Ok(Prediction {
            source,
            label: winning_label,
            confidence: confidence.clamp(0.0, 1.0),
            expected_return,
            predicted_at,
        })
    }

    /// Discount multiplier derived from the entropy of the weighted label
    /// distribution. 1.0 under unanimity.
    fn agreement_multiplier(&self, mass: &LabelTotals) -> f32 {
        let total = mass.total();
        let present: Vec<f32> = mass
            .iter()
            .map(|(_, m)| m)
            .filter(|m| *m > 0.0)
            .collect();
        if present.len() <= 1 || total <= 0.0 {
            return 1.0;
        }

        let entropy: f32 = present
            .iter()
            .map(|m| {
                let p = m / total;
                -p * p.ln()
            })
            .sum();
        let normalized = entropy / (present.len() as f32).ln();

        (1.0 - self.config.discount_strength * normalized).max(0.0)
    }

    /// Deterministic tie-break between equally strong components: earlier
    /// prediction first, then lexicographic component name.
    fn breaks_component_tie(
        &self,
        predictions: &[(String, Prediction)],
        challenger: usize,
        incumbent: usize,
    ) -> bool {
        let (c_name, c_pred) = &predictions[challenger];
        let (i_name, i_pred) = &predictions[incumbent];
        (c_pred.predicted_at, c_name.as_str()) < (i_pred.predicted_at, i_name.as_str())
    }
}

/// Weighted mean of the agreeing components' expected-return estimates,
/// when any are present.
fn weighted_expected_return(
    predictions: &[(String, Prediction)],
    normalized: &[f32],
    winning_label: TradeLabel,
) -> Option<Decimal> {
    let mut sum = 0.0f64;
    let mut weight = 0.0f64;
    for (i, (_, prediction)) in predictions.iter().enumerate() {
        if prediction.label != winning_label {
            continue;
        }
        if let Some(er) = prediction.expected_return {
            let er: f64 = er.to_string().parse().ok()?;
            sum += er * normalized[i] as f64;
            weight += normalized[i] as f64;
        }
    }
    if weight <= 0.0 {
        return None;
    }
    Decimal::from_str_exact(&format!("{:.6}", sum / weight)).ok()
}
