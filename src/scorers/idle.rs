//! Idle-time boredom wake
//!
//! Time-triggered, not message-triggered: the engine's periodic sweep
//! evaluates it for every conversation, and the message path also
//! consults it for the first message after a long lull.

use async_trait::async_trait;

use super::{ScoreContext, Scorer, ScorerUnavailable, Signal};

/// Fires when the conversation has been idle past the boredom threshold
#[derive(Debug, Default, Clone, Copy)]
pub struct IdleScorer;

#[async_trait]
impl Scorer for IdleScorer {
    fn name(&self) -> &'static str {
        "idle"
    }

    async fn score(&self, cx: &ScoreContext<'_>) -> Result<Signal, ScorerUnavailable> {
        let Some(threshold) = cx.config.boredom_threshold() else {
            return Ok(Signal::None);
        };
        Ok(if cx.idle_for >= threshold {
            Signal::IsBoredWake
        } else {
            Signal::None
        })
    }
}
