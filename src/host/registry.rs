//! Predictor Registry
//!
//! Explicitly constructed, explicitly owned registry of named predictors,
//! handed to the service host at startup. No ambient global state: the
//! registry's lifecycle is init-on-construction, teardown-on-drop.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::domain::{MarketSnapshot, Prediction};
use crate::error::{QuorumError, Result};

/// Capability contract every predictive model implements.
///
/// The core treats implementations as opaque producers of predictions;
/// heterogeneous models plug in behind this single call shape.
#[async_trait]
pub trait Predictor: Send + Sync {
    /// Registry name of this predictor
    fn name(&self) -> &str;

    /// Produce a prediction for a topic from current market context
    async fn predict(&self, topic: &str, market: &MarketSnapshot) -> Result<Prediction>;
}

/// Named registry of predictors, with optional signal groups whose
/// members are pre-merged by the ensemble combiner before casting.
#[derive(Default)]
pub struct PredictorRegistry {
    order: Vec<String>,
    predictors: HashMap<String, Arc<dyn Predictor>>,
    /// group name -> member predictor names
    groups: HashMap<String, Vec<String>>,
    member_to_group: HashMap<String, String>,
    group_order: Vec<String>,
}

impl PredictorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a predictor under its own name. Re-registering a name
    /// replaces the previous implementation.
    pub fn register(&mut self, predictor: Arc<dyn Predictor>) {
        let name = predictor.name().to_string();
        if self.predictors.insert(name.clone(), predictor).is_some() {
            warn!(predictor = %name, "predictor re-registered, replacing");
        } else {
            self.order.push(name);
        }
    }

    /// Builder-style registration
    pub fn with_predictor(mut self, predictor: Arc<dyn Predictor>) -> Self {
        self.register(predictor);
        self
    }

    /// Declare a signal group: the members' predictions are merged into a
    /// single vote cast under the group's name.
    pub fn define_group(&mut self, group: impl Into<String>, members: &[&str]) -> Result<()> {
        let group = group.into();
        for member in members {
            if !self.predictors.contains_key(*member) {
                return Err(QuorumError::Internal(format!(
                    "group {group} references unknown predictor {member}"
                )));
            }
            if let Some(existing) = self.member_to_group.get(*member) {
                return Err(QuorumError::Internal(format!(
                    "predictor {member} already belongs to group {existing}"
                )));
            }
        }
        for member in members {
            self.member_to_group
                .insert((*member).to_string(), group.clone());
        }
        self.groups
            .insert(group.clone(), members.iter().map(|m| m.to_string()).collect());
        self.group_order.push(group);
        Ok(())
    }

    /// All registered predictors in registration order
    pub fn entries(&self) -> Vec<(String, Arc<dyn Predictor>)> {
        self.order
            .iter()
            .filter_map(|name| {
                self.predictors
                    .get(name)
                    .map(|p| (name.clone(), Arc::clone(p)))
            })
            .collect()
    }

    /// Group a predictor belongs to, if any
    pub fn group_of(&self, predictor: &str) -> Option<&str> {
        self.member_to_group.get(predictor).map(|s| s.as_str())
    }

    /// Declared groups in declaration order
    pub fn group_names(&self) -> &[String] {
        &self.group_order
    }

    /// Voter identities expected in a decision window: group names plus
    /// ungrouped predictor names, registration order.
    pub fn roster(&self) -> Vec<String> {
        let mut roster = self.group_order.clone();
        for name in &self.order {
            if !self.member_to_group.contains_key(name) {
                roster.push(name.clone());
            }
        }
        roster
    }

    pub fn len(&self) -> usize {
        self.predictors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predictors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TradeLabel;

    struct FixedPredictor {
        name: String,
    }

    #[async_trait]
    impl Predictor for FixedPredictor {
        fn name(&self) -> &str {
            &self.name
        }

        async fn predict(&self, _topic: &str, _market: &MarketSnapshot) -> Result<Prediction> {
            Ok(Prediction::new(&self.name, TradeLabel::Buy, 0.5))
        }
    }

    fn predictor(name: &str) -> Arc<dyn Predictor> {
        Arc::new(FixedPredictor {
            name: name.to_string(),
        })
    }

    #[test]
    fn test_roster_merges_groups_and_singletons() {
        let mut registry = PredictorRegistry::new()
            .with_predictor(predictor("price_traditional"))
            .with_predictor(predictor("price_advanced"))
            .with_predictor(predictor("order_flow"));
        registry
            .define_group("price", &["price_traditional", "price_advanced"])
            .unwrap();

        assert_eq!(registry.roster(), vec!["price", "order_flow"]);
        assert_eq!(registry.group_of("price_advanced"), Some("price"));
        assert_eq!(registry.group_of("order_flow"), None);
    }

    #[test]
    fn test_group_requires_known_members() {
        let mut registry = PredictorRegistry::new().with_predictor(predictor("a"));
        assert!(registry.define_group("g", &["a", "missing"]).is_err());

        registry.register(predictor("b"));
        registry.define_group("g", &["a"]).unwrap();
        // A member cannot join a second group
        assert!(registry.define_group("h", &["a"]).is_err());
    }
}
