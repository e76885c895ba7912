//! Core data model for the decision subsystem.

mod action;
mod feedback;
mod label;
mod market;
mod prediction;
mod tally;
mod vote;

pub use action::{Action, ActionId};
pub use feedback::{FeedbackReport, ReliabilityDelta, TradeFeedback, VoterReliabilityRecord};
pub use label::TradeLabel;
pub use market::MarketSnapshot;
pub use prediction::Prediction;
pub use tally::{LabelTotals, VoteTally};
pub use vote::Vote;
