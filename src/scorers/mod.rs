//! Heuristic scorers
//!
//! Each scorer evaluates one independent wake signal over a flushed
//! batch. They are stateless or near-stateless; the only one with a
//! real backend is topic relevance, which is a pluggable
//! [`RelevanceBackend`]. A scorer that cannot reach its backend fails
//! with [`ScorerUnavailable`], which the gate treats as "signal absent"
//! — a backend outage must never cause a cascade of wakes.

mod blocklist;
mod botspeech;
mod idle;
mod insult;
mod mention;
mod probability;
mod question;
mod relevance;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use blocklist::BlocklistScorer;
pub use botspeech::BotSpeechScorer;
pub use idle::IdleScorer;
pub use insult::InsultScorer;
pub use mention::MentionScorer;
pub use probability::ProbabilityGate;
pub use question::QuestionScorer;
pub use relevance::{RelevanceBackend, RelevanceScorer, TfIdfRelevance};

use crate::config::Snapshot;
use crate::merge::Batch;

/// A scorer's backend could not be reached
#[derive(Debug, Error)]
#[error("scorer unavailable: {0}")]
pub struct ScorerUnavailable(pub String);

/// Everything a scorer may look at for one decision
pub struct ScoreContext<'a> {
    /// The config snapshot this decision runs against
    pub config: &'a Snapshot,
    /// The flushed batch under evaluation
    pub batch: &'a Batch,
    /// The batch's merged text
    pub text: &'a str,
    /// How long the conversation had been idle when the batch flushed
    pub idle_for: Duration,
}

/// Signal produced by a scorer
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Signal {
    /// Nothing fired
    None,
    /// The bot's nickname was mentioned
    Mentioned,
    /// The text looks like a question
    IsQuestion,
    /// The text matched an insult phrase
    IsInsult,
    /// The sender appears to be automated
    IsBotGenerated,
    /// Continuous topic-relevance score in [0, 1]
    Relevance(f64),
    /// The conversation has been idle past the boredom threshold
    IsBoredWake,
    /// The probability draw passed
    PassedProbability,
    /// The text matched a wake-blocking phrase
    Blocked,
}

/// Capability interface for heuristic scorers.
///
/// Async so that backed scorers (topic relevance) can reach out-of-process
/// implementations; the simple matchers return immediately.
#[async_trait]
pub trait Scorer: Send + Sync {
    /// Scorer name for logs
    fn name(&self) -> &'static str;

    /// Evaluate the scorer against one flushed batch
    async fn score(&self, cx: &ScoreContext<'_>) -> Result<Signal, ScorerUnavailable>;
}
