//! Service host: predictor registry, operation dispatch, and the
//! concurrent prediction fan-out.

mod protocol;
mod registry;
mod service;

pub use protocol::{
    CastVoteAck, CastVoteRequest, DecideRequest, FeedbackAck, GetTallyRequest, OperationHandler,
    OperationTable, SubmitFeedbackRequest,
};
pub use registry::{Predictor, PredictorRegistry};
pub use service::{AbsenceReason, CycleReport, HostStats, ServiceHost};
