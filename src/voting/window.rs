//! Decision window state machine.
//!
//! One window per (topic, cycle): `Open -> Closing -> Closed`. Votes are
//! accepted only while `Open`, last-write-wins per voter. `Closing` freezes
//! writes; `finalize` computes the tally exactly once.

use std::cmp::Ordering;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::WindowConfig;
use crate::domain::{LabelTotals, TradeLabel, Vote, VoteTally};
use crate::error::{QuorumError, Result};

/// Window lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WindowState {
    /// Accepting votes
    Open,
    /// Writes frozen, tally not yet computed
    Closing,
    /// Tally computed and immutable
    Closed,
}

impl std::fmt::Display for WindowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WindowState::Open => write!(f, "Open"),
            WindowState::Closing => write!(f, "Closing"),
            WindowState::Closed => write!(f, "Closed"),
        }
    }
}

/// Bounded voting interval for one topic cycle
#[derive(Debug)]
pub struct DecisionWindow {
    topic: String,
    window_id: u64,
    roster: Vec<String>,
    state: WindowState,
    /// Accepted votes in arrival order; a superseded cast is removed and
    /// the replacement appended.
    votes: Vec<Vote>,
    opened_at: DateTime<Utc>,
    deadline: DateTime<Utc>,
    hard_deadline: DateTime<Utc>,
    vote_grace: Duration,
    tally: Option<Arc<VoteTally>>,
}

impl DecisionWindow {
    pub fn new(
        topic: impl Into<String>,
        window_id: u64,
        roster: Vec<String>,
        opened_at: DateTime<Utc>,
        config: &WindowConfig,
    ) -> Self {
        let hard_deadline = opened_at + Duration::milliseconds(config.max_duration_ms as i64);
        let deadline =
            (opened_at + Duration::milliseconds(config.deadline_ms as i64)).min(hard_deadline);
        Self {
            topic: topic.into(),
            window_id,
            roster,
            state: WindowState::Open,
            votes: Vec::new(),
            opened_at,
            deadline,
            hard_deadline,
            vote_grace: Duration::milliseconds(config.vote_grace_ms as i64),
            tally: None,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn window_id(&self) -> u64 {
        self.window_id
    }

    pub fn state(&self) -> WindowState {
        self.state
    }

    pub fn deadline(&self) -> DateTime<Utc> {
        self.deadline
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    /// Accept a vote while `Open`. Last-write-wins per voter; each accepted
    /// vote extends the deadline by the configured grace, capped by the
    /// hard maximum window duration.
    pub fn cast(&mut self, vote: Vote, now: DateTime<Utc>) -> Result<()> {
        if self.state != WindowState::Open {
            return Err(QuorumError::WindowClosed {
                topic: self.topic.clone(),
                window_id: self.window_id,
            });
        }
        if vote.topic != self.topic {
            return Err(QuorumError::InvalidVote(format!(
                "vote for topic {} cast into window for {}",
                vote.topic, self.topic
            )));
        }

        if let Some(pos) = self.votes.iter().position(|v| v.voter_id == vote.voter_id) {
            let superseded = self.votes.remove(pos);
            debug!(
                voter = %superseded.voter_id,
                window = self.window_id,
                "vote superseded within window"
            );
        }
        self.votes.push(vote);

        if self.vote_grace > Duration::zero() {
            let extended = (now + self.vote_grace).min(self.hard_deadline);
            if extended > self.deadline {
                self.deadline = extended;
            }
        }
        Ok(())
    }

    /// Whether every expected voter has voted. An empty roster closes on
    /// deadline only.
    pub fn roster_complete(&self) -> bool {
        !self.roster.is_empty()
            && self
                .roster
                .iter()
                .all(|r| self.votes.iter().any(|v| &v.voter_id == r))
    }

    /// Whether the window should leave `Open`
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        now >= self.deadline || self.roster_complete()
    }

    /// Freeze further writes. Idempotent.
    pub fn begin_close(&mut self) {
        if self.state == WindowState::Open {
            self.state = WindowState::Closing;
        }
    }

    /// Compute and store the final tally. Idempotent: a second call returns
    /// the same stored tally.
    pub fn finalize(&mut self, now: DateTime<Utc>) -> Arc<VoteTally> {
        if let Some(tally) = &self.tally {
            return Arc::clone(tally);
        }
        self.begin_close();
        let tally = Arc::new(self.build_tally(false, Some(now)));
        self.state = WindowState::Closed;
        debug!(
            topic = %self.topic,
            window = self.window_id,
            voters = tally.total_voters,
            missing = tally.missing_voters,
            winner = ?tally.winning_label,
            "window finalized"
        );
        self.tally = Some(Arc::clone(&tally));
        tally
    }

    /// Partial tally from votes-so-far, explicitly flagged provisional
    pub fn provisional_tally(&self) -> VoteTally {
        self.build_tally(true, None)
    }

    fn build_tally(&self, provisional: bool, closed_at: Option<DateTime<Utc>>) -> VoteTally {
        let mut totals = LabelTotals::default();
        for vote in &self.votes {
            totals.add(vote.label, vote.confidence);
        }
        let winning_label = pick_winner(&self.votes, &totals);

        VoteTally {
            topic: self.topic.clone(),
            window_id: self.window_id,
            votes: self.votes.clone(),
            totals,
            winning_label,
            total_voters: self.votes.len(),
            missing_voters: self.roster.len().saturating_sub(self.votes.len()),
            provisional,
            closed_at,
        }
    }
}

/// Majority label: highest aggregated confidence, ties broken by higher
/// voter count, then by the label whose strongest single vote carries the
/// earlier timestamp.
fn pick_winner(votes: &[Vote], totals: &LabelTotals) -> Option<TradeLabel> {
    let mut best: Option<(TradeLabel, f32, usize, DateTime<Utc>)> = None;

    for label in TradeLabel::all() {
        let count = votes.iter().filter(|v| v.label == *label).count();
        if count == 0 {
            continue;
        }
        let total = totals.get(*label);
        let anchor = votes
            .iter()
            .filter(|v| v.label == *label)
            .max_by(|a, b| {
                a.confidence
                    .partial_cmp(&b.confidence)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| b.cast_at.cmp(&a.cast_at))
            })
            .map(|v| v.cast_at)?;

        let replace = match &best {
            None => true,
            Some((_, best_total, best_count, best_anchor)) => {
                total
                    .partial_cmp(best_total)
                    .unwrap_or(Ordering::Equal)
                    .then(count.cmp(best_count))
                    .then(best_anchor.cmp(&anchor))
                    == Ordering::Greater
            }
        };
        if replace {
            best = Some((*label, total, count, anchor));
        }
    }

    best.map(|(label, _, _, _)| label)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn config() -> WindowConfig {
        WindowConfig {
            deadline_ms: 1_000,
            vote_grace_ms: 0,
            max_duration_ms: 5_000,
        }
    }

    fn vote(voter: &str, label: TradeLabel, confidence: f32, secs: i64) -> Vote {
        Vote::new(voter, "BTC-USD", label, confidence, at(secs))
    }

    fn roster() -> Vec<String> {
        vec!["a".to_string(), "b".to_string(), "c".to_string()]
    }

    #[test]
    fn test_last_write_wins_per_voter() {
        let mut window = DecisionWindow::new("BTC-USD", 1, roster(), at(0), &config());
        window.cast(vote("a", TradeLabel::Buy, 0.9, 0), at(0)).unwrap();
        window.cast(vote("a", TradeLabel::Sell, 0.4, 0), at(0)).unwrap();

        let tally = window.provisional_tally();
        assert_eq!(tally.total_voters, 1);
        assert_eq!(tally.winning_label, Some(TradeLabel::Sell));
        assert!(tally.provisional);
    }

    #[test]
    fn test_closing_freezes_writes() {
        let mut window = DecisionWindow::new("BTC-USD", 1, roster(), at(0), &config());
        window.begin_close();
        let result = window.cast(vote("a", TradeLabel::Buy, 0.9, 0), at(0));
        assert!(matches!(result, Err(QuorumError::WindowClosed { .. })));
    }

    #[test]
    fn test_roster_complete_triggers_due() {
        let mut window = DecisionWindow::new("BTC-USD", 1, roster(), at(0), &config());
        for voter in ["a", "b", "c"] {
            window.cast(vote(voter, TradeLabel::Buy, 0.5, 0), at(0)).unwrap();
        }
        // Well before the deadline
        assert!(window.is_due(at(0)));
    }

    #[test]
    fn test_zero_votes_still_closes_with_empty_tally() {
        let mut window = DecisionWindow::new("BTC-USD", 1, roster(), at(0), &config());
        assert!(window.is_due(at(2)));

        let tally = window.finalize(at(2));
        assert_eq!(tally.total_voters, 0);
        assert_eq!(tally.missing_voters, 3);
        assert_eq!(tally.winning_label, None);
        assert!(!tally.provisional);
    }

    #[test]
    fn test_finalize_idempotent() {
        let mut window = DecisionWindow::new("BTC-USD", 1, roster(), at(0), &config());
        window.cast(vote("a", TradeLabel::Buy, 0.7, 0), at(0)).unwrap();

        let first = window.finalize(at(2));
        let second = window.finalize(at(9));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(window.state(), WindowState::Closed);
    }

    #[test]
    fn test_vote_grace_extends_deadline_up_to_cap() {
        let config = WindowConfig {
            deadline_ms: 1_000,
            vote_grace_ms: 2_000,
            max_duration_ms: 3_000,
        };
        let mut window = DecisionWindow::new("BTC-USD", 1, roster(), at(0), &config);
        assert_eq!(window.deadline(), at(1));

        window.cast(vote("a", TradeLabel::Buy, 0.5, 0), at(0)).unwrap();
        assert_eq!(window.deadline(), at(2));

        // Extension saturates at opened_at + max_duration
        window.cast(vote("b", TradeLabel::Buy, 0.5, 2), at(2)).unwrap();
        assert_eq!(window.deadline(), at(3));
    }

    #[test]
    fn test_tie_broken_by_voter_count() {
        let mut window = DecisionWindow::new("BTC-USD", 1, vec![], at(0), &config());
        window.cast(vote("a", TradeLabel::Buy, 0.3, 0), at(0)).unwrap();
        window.cast(vote("b", TradeLabel::Buy, 0.3, 1), at(1)).unwrap();
        window.cast(vote("c", TradeLabel::Sell, 0.6, 2), at(2)).unwrap();

        // Equal aggregated confidence 0.6; buy has two voters
        let tally = window.finalize(at(3));
        assert_eq!(tally.winning_label, Some(TradeLabel::Buy));
    }

    #[test]
    fn test_tie_broken_by_earlier_strongest_vote() {
        let mut window = DecisionWindow::new("BTC-USD", 1, vec![], at(0), &config());
        window.cast(vote("a", TradeLabel::Sell, 0.6, 0), at(0)).unwrap();
        window.cast(vote("b", TradeLabel::Buy, 0.6, 1), at(1)).unwrap();

        // Same total, same count: sell's strongest vote arrived first
        let tally = window.finalize(at(3));
        assert_eq!(tally.winning_label, Some(TradeLabel::Sell));
    }
}
