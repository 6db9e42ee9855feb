//! Topic relevance scoring
//!
//! The scoring algorithm is a pluggable [`RelevanceBackend`]; the gate
//! depends only on the interface. The bundled [`TfIdfRelevance`] backend
//! keeps a bounded per-conversation corpus and scores an incoming
//! message by cosine similarity against the bot's recent replies, so a
//! message that picks the thread back up can wake the bot without a
//! mention.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{ScoreContext, Scorer, ScorerUnavailable, Signal};
use crate::event::ConversationKey;

/// How many recent bot replies are scored against
const REPLY_WINDOW: usize = 5;

/// Replies this short are template chatter ("ok!", "来了") and are skipped
const TEMPLATE_TOKEN_THRESHOLD: usize = 1;

/// Pluggable topic-relevance scoring backend
#[async_trait]
pub trait RelevanceBackend: Send + Sync {
    /// Score `text` against the conversation's ongoing topic, in [0, 1]
    async fn relevance(
        &self,
        conversation: &ConversationKey,
        text: &str,
    ) -> Result<f64, ScorerUnavailable>;

    /// Feed a bot reply into the backend's notion of the current topic
    fn record_reply(&self, conversation: &ConversationKey, text: &str);
}

/// Scorer wrapping a [`RelevanceBackend`]
pub struct RelevanceScorer {
    backend: Arc<dyn RelevanceBackend>,
}

impl RelevanceScorer {
    /// Create a scorer over the given backend
    #[must_use]
    pub fn new(backend: Arc<dyn RelevanceBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Scorer for RelevanceScorer {
    fn name(&self) -> &'static str {
        "relevance"
    }

    async fn score(&self, cx: &ScoreContext<'_>) -> Result<Signal, ScorerUnavailable> {
        if cx.config.raw.topic_relevance_threshold <= 0.0 {
            return Ok(Signal::None);
        }
        let score = self
            .backend
            .relevance(&cx.batch.user.conversation, cx.text)
            .await?;
        Ok(Signal::Relevance(score))
    }
}

/// Per-conversation term statistics
#[derive(Debug, Default)]
struct Corpus {
    /// Recent message token lists, bounded by the history limit
    history: VecDeque<Vec<String>>,
    /// Document frequency per token, decremented as history rolls off
    df: HashMap<String, usize>,
    total_docs: usize,
    /// Recent bot reply token lists
    replies: VecDeque<Vec<String>>,
}

impl Corpus {
    fn observe(&mut self, tokens: &[String], limit: usize) {
        let unique: HashSet<&String> = tokens.iter().collect();
        for token in unique {
            *self.df.entry(token.clone()).or_insert(0) += 1;
        }
        self.total_docs += 1;
        self.history.push_back(tokens.to_vec());

        while self.history.len() > limit {
            if let Some(old) = self.history.pop_front() {
                let unique: HashSet<&String> = old.iter().collect();
                for token in unique {
                    if let Some(count) = self.df.get_mut(token) {
                        *count = count.saturating_sub(1);
                        if *count == 0 {
                            self.df.remove(token);
                        }
                    }
                }
                self.total_docs = self.total_docs.saturating_sub(1);
            }
        }
    }

    /// Stable TF-IDF weights for a token list
    #[allow(clippy::cast_precision_loss)]
    fn tfidf(&self, tokens: &[String]) -> HashMap<String, f64> {
        let total = self.total_docs.max(1) as f64;
        let mut tf: HashMap<&String, usize> = HashMap::new();
        for token in tokens {
            *tf.entry(token).or_insert(0) += 1;
        }
        tf.into_iter()
            .map(|(token, count)| {
                let df = self.df.get(token).copied().unwrap_or(0) as f64;
                let idf = ((total + 1.0) / (df + 1.0)).ln() + 1.0;
                (token.clone(), count as f64 * idf)
            })
            .collect()
    }
}

fn cosine(a: &HashMap<String, f64>, b: &HashMap<String, f64>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let dot: f64 = a
        .iter()
        .filter_map(|(k, v)| b.get(k).map(|w| v * w))
        .sum();
    let norm_a = a.values().map(|v| v * v).sum::<f64>().sqrt();
    let norm_b = b.values().map(|v| v * v).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// In-process TF-IDF relevance backend with per-conversation isolation
pub struct TfIdfRelevance {
    history_limit: usize,
    stopwords: HashSet<String>,
    corpora: Mutex<HashMap<ConversationKey, Corpus>>,
}

impl TfIdfRelevance {
    /// Create a backend keeping up to `history_limit` messages per conversation
    #[must_use]
    pub fn new(history_limit: usize) -> Self {
        Self {
            history_limit: history_limit.max(1),
            stopwords: default_stopwords(),
            corpora: Mutex::new(HashMap::new()),
        }
    }

    /// Replace the stopword set
    #[must_use]
    pub fn with_stopwords(mut self, stopwords: impl IntoIterator<Item = String>) -> Self {
        self.stopwords = stopwords.into_iter().collect();
        self
    }

    /// Lowercase and split into tokens; CJK characters tokenize singly
    fn tokenize(&self, text: &str) -> Vec<String> {
        let mut tokens = Vec::new();
        let mut current = String::new();
        for c in text.to_lowercase().chars() {
            if is_cjk(c) {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
                tokens.push(c.to_string());
            } else if c.is_alphanumeric() {
                current.push(c);
            } else if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
        }
        if !current.is_empty() {
            tokens.push(current);
        }
        tokens.retain(|t| !self.stopwords.contains(t));
        tokens
    }

    fn lock_corpora(&self) -> std::sync::MutexGuard<'_, HashMap<ConversationKey, Corpus>> {
        self.corpora
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl RelevanceBackend for TfIdfRelevance {
    async fn relevance(
        &self,
        conversation: &ConversationKey,
        text: &str,
    ) -> Result<f64, ScorerUnavailable> {
        let tokens = self.tokenize(text);
        if tokens.is_empty() {
            return Ok(0.0);
        }

        let mut corpora = self.lock_corpora();
        let corpus = corpora.entry(conversation.clone()).or_default();
        corpus.observe(&tokens, self.history_limit);

        let user_vec = corpus.tfidf(&tokens);
        let best = corpus
            .replies
            .iter()
            .filter(|reply| reply.len() > TEMPLATE_TOKEN_THRESHOLD)
            .map(|reply| cosine(&user_vec, &corpus.tfidf(reply)))
            .fold(0.0_f64, f64::max);

        Ok(best)
    }

    fn record_reply(&self, conversation: &ConversationKey, text: &str) {
        let tokens = self.tokenize(text);
        if tokens.is_empty() {
            return;
        }
        let mut corpora = self.lock_corpora();
        let corpus = corpora.entry(conversation.clone()).or_default();
        corpus.replies.push_back(tokens);
        while corpus.replies.len() > REPLY_WINDOW {
            corpus.replies.pop_front();
        }
    }
}

/// Whether the character sits in a CJK unified ideograph block
const fn is_cjk(c: char) -> bool {
    matches!(c, '\u{4E00}'..='\u{9FFF}' | '\u{3400}'..='\u{4DBF}')
}

fn default_stopwords() -> HashSet<String> {
    [
        // English
        "a", "an", "the", "is", "are", "am", "i", "you", "he", "she", "it", "we", "they", "to",
        "of", "and", "or", "in", "on", "at", "so", "ok", "okay",
        // Chinese particles, as in the reference corpus
        "的", "了", "吗", "吧", "啊", "哦", "嗯", "恩", "你", "我", "他", "她", "它", "这", "那",
        "就", "都", "又",
    ]
    .iter()
    .map(|s| (*s).to_string())
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conv() -> ConversationKey {
        ConversationKey::new("g1")
    }

    #[tokio::test]
    async fn empty_text_scores_zero() {
        let backend = TfIdfRelevance::new(120);
        assert_eq!(backend.relevance(&conv(), "").await.unwrap(), 0.0);
        assert_eq!(backend.relevance(&conv(), "!!!").await.unwrap(), 0.0);
    }

    #[tokio::test]
    async fn no_replies_scores_zero() {
        let backend = TfIdfRelevance::new(120);
        let score = backend
            .relevance(&conv(), "what about the rust borrow checker")
            .await
            .unwrap();
        assert_eq!(score, 0.0);
    }

    #[tokio::test]
    async fn on_topic_message_outscores_off_topic() {
        let backend = TfIdfRelevance::new(120);
        backend.record_reply(
            &conv(),
            "the borrow checker enforces aliasing rules at compile time",
        );

        let on_topic = backend
            .relevance(&conv(), "does the borrow checker reject aliasing here")
            .await
            .unwrap();
        let off_topic = backend
            .relevance(&conv(), "anyone watched the match yesterday evening")
            .await
            .unwrap();

        assert!(on_topic > off_topic, "{on_topic} <= {off_topic}");
        assert!(on_topic > 0.0);
    }

    #[tokio::test]
    async fn conversations_are_isolated() {
        let backend = TfIdfRelevance::new(120);
        backend.record_reply(&conv(), "compile times improve with incremental builds");

        let other = ConversationKey::new("g2");
        let score = backend
            .relevance(&other, "compile times improve with incremental builds")
            .await
            .unwrap();
        assert_eq!(score, 0.0);
    }

    #[tokio::test]
    async fn template_replies_are_ignored() {
        let backend = TfIdfRelevance::new(120);
        backend.record_reply(&conv(), "sure");
        let score = backend.relevance(&conv(), "sure thing bot").await.unwrap();
        assert_eq!(score, 0.0);
    }

    #[tokio::test]
    async fn history_stays_bounded() {
        let backend = TfIdfRelevance::new(4);
        for i in 0..20 {
            let _ = backend
                .relevance(&conv(), &format!("filler message number {i}"))
                .await;
        }
        let corpora = backend.lock_corpora();
        let corpus = corpora.get(&conv()).unwrap();
        assert!(corpus.history.len() <= 4);
        assert!(corpus.total_docs <= 4);
    }

    #[test]
    fn cjk_tokenizes_per_character() {
        let backend = TfIdfRelevance::new(120);
        let tokens = backend.tokenize("今天天气如何");
        assert!(tokens.contains(&"天".to_string()));
        assert!(!tokens.contains(&"今天天气如何".to_string()));
    }
}
