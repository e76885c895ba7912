//! Voting Aggregator
//!
//! Owns the current decision window per topic and enforces that windows
//! for one topic are strictly sequential: a new window cannot open until
//! the previous one has closed.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::ledger::VoteLedger;
use super::window::{DecisionWindow, WindowState};
use crate::config::WindowConfig;
use crate::domain::{Vote, VoteTally};
use crate::error::{QuorumError, Result};

#[derive(Debug, Default)]
struct TopicState {
    current: Option<DecisionWindow>,
    next_window_id: u64,
    last_closed: Option<u64>,
}

/// Collects votes per (topic, window) and produces tallies
pub struct VotingAggregator {
    config: WindowConfig,
    topics: RwLock<HashMap<String, TopicState>>,
    ledger: Arc<VoteLedger>,
}

impl VotingAggregator {
    pub fn new(config: WindowConfig, ledger: Arc<VoteLedger>) -> Self {
        Self {
            config,
            topics: RwLock::new(HashMap::new()),
            ledger,
        }
    }

    pub fn ledger(&self) -> &Arc<VoteLedger> {
        &self.ledger
    }

    /// Open the next window for a topic with the expected-voter roster.
    ///
    /// Errors if the previous window has not closed yet.
    pub async fn open_window(
        &self,
        topic: &str,
        roster: Vec<String>,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let mut topics = self.topics.write().await;
        let state = topics.entry(topic.to_string()).or_default();

        if let Some(window) = &state.current {
            return Err(QuorumError::WindowStillOpen {
                topic: topic.to_string(),
                window_id: window.window_id(),
            });
        }

        let window_id = state.next_window_id;
        state.next_window_id += 1;
        info!(topic, window_id, voters = roster.len(), "decision window opened");
        state.current = Some(DecisionWindow::new(
            topic,
            window_id,
            roster,
            now,
            &self.config,
        ));
        Ok(window_id)
    }

    /// Cast a vote into the topic's current window.
    ///
    /// A vote arriving at or after the deadline freezes the window and is
    /// rejected, so in-flight predictor results cannot leak into a tally
    /// that is about to finalize.
    pub async fn cast_vote(&self, vote: Vote, now: DateTime<Utc>) -> Result<u64> {
        let mut topics = self.topics.write().await;
        let state = topics
            .get_mut(&vote.topic)
            .ok_or_else(|| QuorumError::UnknownTopic(vote.topic.clone()))?;
        let window = state
            .current
            .as_mut()
            .ok_or_else(|| QuorumError::NoOpenWindow(vote.topic.clone()))?;

        if window.state() == WindowState::Open && now >= window.deadline() {
            window.begin_close();
            return Err(QuorumError::WindowClosed {
                topic: vote.topic.clone(),
                window_id: window.window_id(),
            });
        }

        let window_id = window.window_id();
        window.cast(vote.clone(), now)?;
        debug!(
            topic = %vote.topic,
            voter = %vote.voter_id,
            window = window_id,
            label = %vote.label,
            confidence = vote.confidence,
            "vote accepted"
        );
        self.ledger.append_vote(&vote).await;
        Ok(window_id)
    }

    /// Close and record the topic's current window if it is due.
    ///
    /// Returns the freshly closed tally, or None when there is no window
    /// or it is not due yet. Idempotent across repeated polling.
    pub async fn poll(&self, topic: &str, now: DateTime<Utc>) -> Option<Arc<VoteTally>> {
        let mut topics = self.topics.write().await;
        let state = topics.get_mut(topic)?;
        let due = state
            .current
            .as_ref()
            .map(|w| w.is_due(now))
            .unwrap_or(false);
        if !due {
            return None;
        }

        let mut window = state.current.take()?;
        let tally = window.finalize(now);
        state.last_closed = Some(tally.window_id);
        drop(topics);

        Some(self.ledger.record_tally(tally).await)
    }

    /// The tally for a specific window: stored when closed, provisional
    /// (flagged) when the window is still open or closing.
    pub async fn tally(&self, topic: &str, window_id: u64) -> Result<VoteTally> {
        {
            let topics = self.topics.read().await;
            if let Some(state) = topics.get(topic) {
                if let Some(window) = &state.current {
                    if window.window_id() == window_id {
                        return Ok(window.provisional_tally());
                    }
                }
            }
        }

        self.ledger
            .tally(topic, window_id)
            .await
            .map(|t| (*t).clone())
            .ok_or_else(|| QuorumError::UnknownTopic(format!("{topic}#{window_id}")))
    }

    /// The most recently closed tally for a topic, if any
    pub async fn last_closed(&self, topic: &str) -> Option<Arc<VoteTally>> {
        let window_id = {
            let topics = self.topics.read().await;
            topics.get(topic)?.last_closed?
        };
        self.ledger.tally(topic, window_id).await
    }

    /// Identifier of the current open window for a topic
    pub async fn current_window(&self, topic: &str) -> Option<u64> {
        let topics = self.topics.read().await;
        topics
            .get(topic)?
            .current
            .as_ref()
            .map(|w| w.window_id())
    }
}
