//! Insult detection
//!
//! The scorer itself only reads; the mute transition it triggers is
//! applied by the gate so that all timer mutation stays in the
//! cooldown/mute manager.

use async_trait::async_trait;

use super::{ScoreContext, Scorer, ScorerUnavailable, Signal};

/// Fires when the text contains a configured insult phrase
#[derive(Debug, Default, Clone, Copy)]
pub struct InsultScorer;

#[async_trait]
impl Scorer for InsultScorer {
    fn name(&self) -> &'static str {
        "insult"
    }

    async fn score(&self, cx: &ScoreContext<'_>) -> Result<Signal, ScorerUnavailable> {
        if cx.config.has_insult_phrase(cx.text) {
            return Ok(Signal::IsInsult);
        }
        Ok(Signal::None)
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;
    use crate::config::{Snapshot, WakeConfig};
    use crate::event::{ConversationKey, MessageEvent, UserKey};
    use crate::merge::Batch;

    #[tokio::test]
    async fn insult_phrase_fires_case_insensitively() {
        let config = Snapshot::compile(WakeConfig {
            insult_phrases: vec!["shut up stupid".to_string()],
            ..Default::default()
        })
        .unwrap();
        let b = Batch {
            user: UserKey::new(ConversationKey::new("g1"), "u1"),
            messages: vec![MessageEvent::new("g1", "u1", "oh SHUT UP STUPID bot")],
            opened_at: Instant::now(),
        };
        let cx = ScoreContext {
            config: &config,
            batch: &b,
            text: "oh SHUT UP STUPID bot",
            idle_for: Duration::ZERO,
        };
        assert_eq!(InsultScorer.score(&cx).await.unwrap(), Signal::IsInsult);
    }
}
