pub mod agent;
pub mod config;
pub mod domain;
pub mod ensemble;
pub mod error;
pub mod feedback;
pub mod host;
pub mod logging;
pub mod voting;

pub use agent::{DecisionAgent, LinearPolicy, StateEncoder, TallyObservation};
pub use config::{
    CoreConfig, DecisionConfig, EnsembleConfig, HostConfig, ReliabilityConfig, RewardConfig,
    WindowConfig,
};
pub use domain::{
    Action, ActionId, FeedbackReport, MarketSnapshot, Prediction, TradeFeedback, TradeLabel, Vote,
    VoteTally, VoterReliabilityRecord,
};
pub use ensemble::{EnsembleCombiner, EnsembleWeightSet};
pub use error::{QuorumError, Result};
pub use feedback::{FeedbackProcessor, ReliabilityStore, RewardMapper};
pub use host::{
    CastVoteRequest, CycleReport, Predictor, PredictorRegistry, ServiceHost,
    SubmitFeedbackRequest,
};
pub use voting::{VoteLedger, VotingAggregator, WindowState};
