//! Operation protocol
//!
//! Transport-agnostic request/response shapes for the host's addressable
//! operations, and the dispatch table that routes serialized requests to
//! registered handlers.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

use crate::domain::{ActionId, TradeLabel};
use crate::error::{QuorumError, Result};

/// `cast_vote` request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CastVoteRequest {
    pub topic: String,
    pub voter_id: String,
    pub label: TradeLabel,
    pub confidence: f32,
    /// Vote timestamp; the host clock is used when omitted
    pub timestamp: Option<DateTime<Utc>>,
}

/// `cast_vote` acknowledgement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CastVoteAck {
    pub window_id: u64,
}

/// `get_tally` request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetTallyRequest {
    pub topic: String,
    pub window_id: u64,
}

/// `decide` request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecideRequest {
    pub topic: String,
}

/// `submit_feedback` request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitFeedbackRequest {
    pub action_id: ActionId,
    pub pnl_fraction: Decimal,
}

/// `submit_feedback` acknowledgement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackAck {
    pub action_id: ActionId,
    pub reward: f32,
    pub duplicate: bool,
}

/// Async handler for one named operation
pub type OperationHandler =
    Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// Named operation table: `register` a handler, `dispatch` a serialized
/// request to it.
#[derive(Default)]
pub struct OperationTable {
    handlers: RwLock<HashMap<String, OperationHandler>>,
}

impl OperationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under an operation name, replacing any previous
    /// handler for that name.
    pub async fn register(&self, operation: impl Into<String>, handler: OperationHandler) {
        let operation = operation.into();
        debug!(%operation, "operation registered");
        self.handlers.write().await.insert(operation, handler);
    }

    /// Route a serialized request to the named operation's handler
    pub async fn dispatch(&self, operation: &str, request: Value) -> Result<Value> {
        let handler = {
            let handlers = self.handlers.read().await;
            handlers
                .get(operation)
                .cloned()
                .ok_or_else(|| QuorumError::UnknownOperation(operation.to_string()))?
        };
        handler(request).await
    }

    /// Names of all registered operations
    pub async fn operations(&self) -> Vec<String> {
        self.handlers.read().await.keys().cloned().collect()
    }
}

/// Deserialize an operation request, mapping failures to a malformed
/// request error carrying the operation name.
pub(crate) fn parse_request<T: serde::de::DeserializeOwned>(
    operation: &str,
    request: Value,
) -> Result<T> {
    serde_json::from_value(request).map_err(|e| QuorumError::MalformedRequest {
        operation: operation.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_dispatch_unknown_operation() {
        let table = OperationTable::new();
        let result = table.dispatch("missing", json!({})).await;
        assert!(matches!(result, Err(QuorumError::UnknownOperation(_))));
    }

    #[tokio::test]
    async fn test_register_and_dispatch() {
        let table = OperationTable::new();
        table
            .register(
                "echo",
                Arc::new(|request| Box::pin(async move { Ok(request) })),
            )
            .await;

        let response = table.dispatch("echo", json!({"x": 1})).await.unwrap();
        assert_eq!(response, json!({"x": 1}));
        assert_eq!(table.operations().await, vec!["echo".to_string()]);
    }

    #[test]
    fn test_parse_request_reports_operation() {
        let result: Result<CastVoteRequest> = parse_request("cast_vote", json!({"bad": true}));
        match result {
            Err(QuorumError::MalformedRequest { operation, .. }) => {
                assert_eq!(operation, "cast_vote");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
