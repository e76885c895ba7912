use thiserror::Error;

/// Main error type for the decision core
#[derive(Error, Debug)]
pub enum QuorumError {
    // Signal availability errors
    #[error("No signal: zero components responded for this cycle")]
    NoSignal,

    #[error("Predictor timed out: {predictor}")]
    PredictorTimeout { predictor: String },

    #[error("Predictor failed: {predictor} - {reason}")]
    PredictorFailed { predictor: String, reason: String },

    // Voting errors
    #[error("No open decision window for topic: {0}")]
    NoOpenWindow(String),

    #[error("Window {window_id} for topic {topic} no longer accepts votes")]
    WindowClosed { topic: String, window_id: u64 },

    #[error("Window {window_id} for topic {topic} is still open")]
    WindowStillOpen { topic: String, window_id: u64 },

    #[error("Invalid state transition: from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Unknown topic: {0}")]
    UnknownTopic(String),

    #[error("Invalid vote: {0}")]
    InvalidVote(String),

    // Ensemble errors
    #[error("Invalid ensemble weights: {0}")]
    InvalidWeights(String),

    // Feedback errors
    #[error("Duplicate feedback for action {action_id}")]
    DuplicateFeedback { action_id: uuid::Uuid },

    #[error("Unknown action reference: {action_id}")]
    UnknownActionReference { action_id: uuid::Uuid },

    // Policy errors
    #[error("Policy update failed: {0}")]
    PolicyUpdate(String),

    // Dispatch errors
    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    #[error("Malformed request for operation {operation}: {reason}")]
    MalformedRequest { operation: String, reason: String },

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for QuorumError
pub type Result<T> = std::result::Result<T, QuorumError>;

impl QuorumError {
    /// Whether this error is absorbed at the cycle level rather than
    /// propagated to the caller.
    pub fn is_cycle_local(&self) -> bool {
        matches!(
            self,
            QuorumError::PredictorTimeout { .. }
                | QuorumError::PredictorFailed { .. }
                | QuorumError::WindowClosed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_local_classification() {
        let timeout = QuorumError::PredictorTimeout {
            predictor: "lstm".to_string(),
        };
        assert!(timeout.is_cycle_local());

        let unknown = QuorumError::UnknownActionReference {
            action_id: uuid::Uuid::nil(),
        };
        assert!(!unknown.is_cycle_local());
    }
}
