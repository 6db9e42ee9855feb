//! Nickname mention detection

use async_trait::async_trait;

use super::{ScoreContext, Scorer, ScorerUnavailable, Signal};

/// Fires when the bot's configured nickname appears in the text.
///
/// Nicknames with clean word edges match on word boundaries; others
/// (CJK names, emoji handles) match as literal substrings. The matching
/// itself is precompiled into the config snapshot.
#[derive(Debug, Default, Clone, Copy)]
pub struct MentionScorer;

#[async_trait]
impl Scorer for MentionScorer {
    fn name(&self) -> &'static str {
        "mention"
    }

    async fn score(&self, cx: &ScoreContext<'_>) -> Result<Signal, ScorerUnavailable> {
        if cx.config.mentions_bot(cx.text) {
            return Ok(Signal::Mentioned);
        }
        Ok(Signal::None)
    }
}
