//! Probability gate
//!
//! Draws a uniform value per decision; independent of message content.
//! Applied last among the positive signals, so a zero probability never
//! blocks mention or question wakes.

use async_trait::async_trait;
use rand::Rng;

use super::{ScoreContext, Scorer, ScorerUnavailable, Signal};

/// Passes with the configured `wake_probability`
#[derive(Debug, Default, Clone, Copy)]
pub struct ProbabilityGate;

#[async_trait]
impl Scorer for ProbabilityGate {
    fn name(&self) -> &'static str {
        "probability"
    }

    async fn score(&self, cx: &ScoreContext<'_>) -> Result<Signal, ScorerUnavailable> {
        let p = cx.config.raw.wake_probability;
        if p <= 0.0 {
            return Ok(Signal::None);
        }
        let draw: f64 = rand::thread_rng().r#gen();
        Ok(if draw < p {
            Signal::PassedProbability
        } else {
            Signal::None
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;
    use crate::config::{Snapshot, WakeConfig};
    use crate::event::{ConversationKey, MessageEvent, UserKey};
    use crate::merge::Batch;

    async fn draw(probability: f64) -> Signal {
        let config = Snapshot::compile(WakeConfig {
            wake_probability: probability,
            ..Default::default()
        })
        .unwrap();
        let b = Batch {
            user: UserKey::new(ConversationKey::new("g1"), "u1"),
            messages: vec![MessageEvent::new("g1", "u1", "hi")],
            opened_at: Instant::now(),
        };
        let cx = ScoreContext {
            config: &config,
            batch: &b,
            text: "hi",
            idle_for: Duration::ZERO,
        };
        ProbabilityGate.score(&cx).await.unwrap()
    }

    #[tokio::test]
    async fn zero_probability_never_passes() {
        for _ in 0..32 {
            assert_eq!(draw(0.0).await, Signal::None);
        }
    }

    #[tokio::test]
    async fn certain_probability_always_passes() {
        for _ in 0..32 {
            assert_eq!(draw(1.0).await, Signal::PassedProbability);
        }
    }
}
