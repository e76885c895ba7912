//! Ensemble combination of component predictions.

mod combiner;

pub use combiner::{EnsembleCombiner, EnsembleWeightSet};
