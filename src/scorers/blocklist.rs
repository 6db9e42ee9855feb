//! Wake-blocking phrase veto
//!
//! Evaluated before every other signal; a hit is final regardless of
//! mentions or any other positive signal.

use async_trait::async_trait;

use super::{ScoreContext, Scorer, ScorerUnavailable, Signal};

/// Fires when the text contains a configured wake-blocking phrase
#[derive(Debug, Default, Clone, Copy)]
pub struct BlocklistScorer;

#[async_trait]
impl Scorer for BlocklistScorer {
    fn name(&self) -> &'static str {
        "blocklist"
    }

    async fn score(&self, cx: &ScoreContext<'_>) -> Result<Signal, ScorerUnavailable> {
        if cx.config.has_blocked_phrase(cx.text) {
            return Ok(Signal::Blocked);
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
    async fn blocked_phrase_fires_inside_longer_text() {
        let config = Snapshot::compile(WakeConfig {
            blocked_phrases: vec!["ignore the bot".to_string()],
            ..Default::default()
        })
        .unwrap();
        let b = Batch {
            user: UserKey::new(ConversationKey::new("g1"), "u1"),
            messages: vec![MessageEvent::new("g1", "u1", "please Ignore The Bot today")],
            opened_at: Instant::now(),
        };
        let cx = ScoreContext {
            config: &config,
            batch: &b,
            text: "please Ignore The Bot today",
            idle_for: Duration::ZERO,
        };
        assert_eq!(BlocklistScorer.score(&cx).await.unwrap(), Signal::Blocked);
    }
}
