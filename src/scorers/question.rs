//! Question detection via interrogative markers

use async_trait::async_trait;

use super::{ScoreContext, Scorer, ScorerUnavailable, Signal};

/// Fires when the text carries a configured interrogative marker.
///
/// Markers are locale-configurable: `?` and `？` by default, extendable
/// with words like `how` or `为什么` per deployment.
#[derive(Debug, Default, Clone, Copy)]
pub struct QuestionScorer;

#[async_trait]
impl Scorer for QuestionScorer {
    fn name(&self) -> &'static str {
        "question"
    }

    async fn score(&self, cx: &ScoreContext<'_>) -> Result<Signal, ScorerUnavailable> {
        let lower = cx.text.to_lowercase();
        let hit = cx
            .config
            .raw
            .question_markers
            .iter()
            .filter(|m| !m.is_empty())
            .any(|m| lower.contains(&m.to_lowercase()));
        Ok(if hit { Signal::IsQuestion } else { Signal::None })
    }
}
