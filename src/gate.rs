//! Wake decision gate
//!
//! Combines the heuristic scorers with cooldown/mute state into one
//! verdict per flushed batch. The algorithm is ordered and
//! short-circuiting — each veto is final:
//!
//! 1. bot-speech veto
//! 2. blocklist / built-in command veto
//! 3. mute check (the insult scorer fires here as a side effect,
//!    muting the scope for future messages)
//! 4. cooldown check, with an optional `ExtendActivity` path
//! 5. OR-combined positive signals; any one is sufficient to wake
//!
//! The gate reads timing state through the quiet manager and never
//! mutates timers itself beyond `record_wake`/`extend_cooldown`/
//! `apply_mute` calls on it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::{MuteScope, Snapshot};
use crate::event::{Scope, SuppressReason, Verdict, WakeMode, WakeReason};
use crate::merge::Batch;
use crate::quiet::{Allowance, MuteReason, QuietManager};
use crate::scorers::{
    BlocklistScorer, BotSpeechScorer, IdleScorer, InsultScorer, MentionScorer, ProbabilityGate,
    QuestionScorer, RelevanceBackend, RelevanceScorer, ScoreContext, Scorer, Signal,
};

/// The central decision state machine
pub struct WakeGate {
    quiet: Arc<QuietManager>,
    mention: MentionScorer,
    question: QuestionScorer,
    insult: InsultScorer,
    bot_speech: BotSpeechScorer,
    blocklist: BlocklistScorer,
    idle: IdleScorer,
    probability: ProbabilityGate,
    relevance: RelevanceScorer,
}

/// Run a scorer, treating backend failure as "signal absent".
///
/// Fail-open toward suppression: a transient backend outage must never
/// cause a cascade of unwanted wakes.
async fn signal_of(scorer: &dyn Scorer, cx: &ScoreContext<'_>) -> Signal {
    match scorer.score(cx).await {
        Ok(signal) => signal,
        Err(e) => {
            tracing::warn!(scorer = scorer.name(), error = %e, "scorer unavailable, treating as absent");
            Signal::None
        }
    }
}

impl WakeGate {
    /// Create a gate over the shared quiet manager and relevance backend
    #[must_use]
    pub fn new(quiet: Arc<QuietManager>, relevance: Arc<dyn RelevanceBackend>) -> Self {
        Self {
            quiet,
            mention: MentionScorer,
            question: QuestionScorer,
            insult: InsultScorer,
            bot_speech: BotSpeechScorer,
            blocklist: BlocklistScorer,
            idle: IdleScorer,
            probability: ProbabilityGate,
            relevance: RelevanceScorer::new(relevance),
        }
    }

    /// The scope insult mutes apply to, per configuration
    fn insult_mute_scope(cfg: &Snapshot, batch: &Batch) -> Scope {
        match cfg.raw.mute_scope {
            MuteScope::PerUser => Scope::User(batch.user.clone()),
            MuteScope::PerConversation => {
                Scope::Conversation(batch.user.conversation.clone())
            }
        }
    }

    /// Decide the verdict for one flushed batch
    pub async fn decide(
        &self,
        batch: &Batch,
        cfg: &Snapshot,
        idle_for: Duration,
        now: Instant,
    ) -> Verdict {
        let text = batch.merged_text();
        let is_admin = batch.from_admin();
        let cx = ScoreContext {
            config: cfg,
            batch,
            text: &text,
            idle_for,
        };

        // Empty or unreadable content suppresses by default; a bare
        // @-mention is the one empty-text case with meaning.
        if text.trim().is_empty() && !batch.is_empty_mention() {
            return Verdict::Suppress {
                reason: SuppressReason::EmptyText,
            };
        }

        // 1. Bot-speech veto
        if signal_of(&self.bot_speech, &cx).await == Signal::IsBotGenerated {
            tracing::debug!(user = %batch.user, "suppressed: automated sender");
            return Verdict::Suppress {
                reason: SuppressReason::BotSender,
            };
        }

        // 2. Blocklist and built-in command vetoes (admins bypass)
        if !is_admin {
            if signal_of(&self.blocklist, &cx).await == Signal::Blocked {
                tracing::debug!(user = %batch.user, "suppressed: blocked phrase");
                return Verdict::Suppress {
                    reason: SuppressReason::BlockedPhrase,
                };
            }
            if cfg.is_builtin_command(&text) {
                tracing::debug!(user = %batch.user, "suppressed: built-in command");
                return Verdict::Suppress {
                    reason: SuppressReason::BuiltinCommand,
                };
            }
        }

        let user_scope = Scope::User(batch.user.clone());
        let conv_scope = Scope::Conversation(batch.user.conversation.clone());

        // 3. Mute check. The insult scorer fires here as a side effect:
        // it mutes the scope for future messages while this message is
        // still evaluated, unless configured to mute the trigger too.
        let already_muted = self.quiet.is_muted(&conv_scope, now)
            || self.quiet.is_muted(&user_scope, now);

        if !is_admin && signal_of(&self.insult, &cx).await == Signal::IsInsult {
            let scope = Self::insult_mute_scope(cfg, batch);
            self.quiet.apply_mute(
                &scope,
                MuteReason::InsultDetected,
                Some(cfg.mute_on_insult()),
                now,
            );
            if cfg.raw.mute_applies_to_trigger {
                return Verdict::Suppress {
                    reason: SuppressReason::Muted,
                };
            }
        }

        if already_muted && !is_admin {
            tracing::debug!(user = %batch.user, "suppressed: scope muted");
            return Verdict::Suppress {
                reason: SuppressReason::Muted,
            };
        }

        // 4. Cooldown check (admins share cooldown bookkeeping)
        let mentioned = signal_of(&self.mention, &cx).await == Signal::Mentioned;
        if self.quiet.allowance(&user_scope, now) == Allowance::OnCooldown {
            let within_extend = cfg
                .wake_extend()
                .is_some_and(|window| self.quiet.woke_within(&user_scope, now, window));
            if cfg.raw.extend_on_activity && (mentioned || within_extend) {
                self.quiet.extend_cooldown(&user_scope, now, cfg.cooldown());
                tracing::debug!(user = %batch.user, "activity during cooldown, extending");
                return Verdict::ExtendActivity;
            }
            tracing::debug!(user = %batch.user, "suppressed: on cooldown");
            return Verdict::Suppress {
                reason: SuppressReason::OnCooldown,
            };
        }

        // 5. Positive signals, OR-combined: any one suffices
        let decided = self.positive_signal(&cx, batch, mentioned).await;

        match decided {
            Some((mode, reason)) => {
                self.quiet.record_wake(&user_scope, now, cfg.cooldown());
                tracing::info!(user = %batch.user, ?reason, "wake");
                Verdict::Wake { mode, reason }
            }
            None => Verdict::Suppress {
                reason: SuppressReason::NoSignal,
            },
        }
    }

    /// Evaluate the OR-combined positive signals in order
    async fn positive_signal(
        &self,
        cx: &ScoreContext<'_>,
        batch: &Batch,
        mentioned: bool,
    ) -> Option<(WakeMode, WakeReason)> {
        // A bare @-mention gets a canned reply, not an LLM forward
        if batch.is_empty_mention() {
            return Some((WakeMode::Canned, WakeReason::EmptyMention));
        }
        if mentioned {
            return Some((WakeMode::Forward, WakeReason::Mention));
        }
        if signal_of(&self.question, cx).await == Signal::IsQuestion {
            return Some((WakeMode::Forward, WakeReason::Question));
        }
        if let Signal::Relevance(score) = signal_of(&self.relevance, cx).await {
            if score >= cx.config.raw.topic_relevance_threshold {
                return Some((WakeMode::Forward, WakeReason::Relevance { score }));
            }
        }
        if signal_of(&self.idle, cx).await == Signal::IsBoredWake {
            return Some((WakeMode::Forward, WakeReason::Bored));
        }
        if signal_of(&self.probability, cx).await == Signal::PassedProbability {
            return Some((WakeMode::Forward, WakeReason::Probability));
        }
        None
    }
}
