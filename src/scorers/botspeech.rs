//! Automated-sender detection
//!
//! Suppresses wakes from non-human peers: other bots echoing into the
//! conversation, bridge relays, webhook mirrors. Matches sender
//! metadata first, then configured text markers.

use async_trait::async_trait;

use super::{ScoreContext, Scorer, ScorerUnavailable, Signal};

/// Fires when the batch appears to come from an automated sender
#[derive(Debug, Default, Clone, Copy)]
pub struct BotSpeechScorer;

#[async_trait]
impl Scorer for BotSpeechScorer {
    fn name(&self) -> &'static str {
        "bot_speech"
    }

    async fn score(&self, cx: &ScoreContext<'_>) -> Result<Signal, ScorerUnavailable> {
        if !cx.config.raw.bot_sender_filtering {
            return Ok(Signal::None);
        }
        let flagged = cx.batch.messages.iter().any(|m| m.sender_is_bot)
            || cx.config.has_bot_marker(cx.text);
        Ok(if flagged {
            Signal::IsBotGenerated
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

    fn batch(event: MessageEvent) -> Batch {
        Batch {
            user: UserKey::new(ConversationKey::new("g1"), "u1"),
            messages: vec![event],
            opened_at: Instant::now(),
        }
    }

    #[tokio::test]
    async fn flagged_sender_fires() {
        let config = Snapshot::compile(WakeConfig::default()).unwrap();
        let b = batch(MessageEvent::new("g1", "u1", "beep").from_bot());
        let cx = ScoreContext {
            config: &config,
            batch: &b,
            text: "beep",
            idle_for: Duration::ZERO,
        };
        assert_eq!(
            BotSpeechScorer.score(&cx).await.unwrap(),
            Signal::IsBotGenerated
        );
    }

    #[tokio::test]
    async fn marker_fires_even_without_flag() {
        let config = Snapshot::compile(WakeConfig {
            bot_sender_markers: vec!["[relay]".to_string()],
            ..Default::default()
        })
        .unwrap();
        let b = batch(MessageEvent::new("g1", "u1", "[relay] forwarded text"));
        let cx = ScoreContext {
            config: &config,
            batch: &b,
            text: "[relay] forwarded text",
            idle_for: Duration::ZERO,
        };
        assert_eq!(
            BotSpeechScorer.score(&cx).await.unwrap(),
            Signal::IsBotGenerated
        );
    }

    #[tokio::test]
    async fn filtering_disabled_never_fires() {
        let config = Snapshot::compile(WakeConfig {
            bot_sender_filtering: false,
            ..Default::default()
        })
        .unwrap();
        let b = batch(MessageEvent::new("g1", "u1", "beep").from_bot());
        let cx = ScoreContext {
            config: &config,
            batch: &b,
            text: "beep",
            idle_for: Duration::ZERO,
        };
        assert_eq!(BotSpeechScorer.score(&cx).await.unwrap(), Signal::None);
    }
}
