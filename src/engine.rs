//! Wake engine orchestration
//!
//! The engine owns the shared state (store, quiet manager, relevance
//! backend), drives events through the merge buffer and the gate, and
//! runs the periodic sweep that flushes due batches, fires boredom
//! wakes, expires mutes and evicts idle state. Verdicts for flushed
//! batches are delivered to a host-supplied [`VerdictSink`], exactly
//! once per batch. Messages rejected before batching (denylists, mute
//! commands) are logged but never reach the sink.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::{ConfigHandle, Snapshot, WakeConfig};
use crate::event::{ConversationKey, MessageEvent, Scope, UserKey, Verdict};
use crate::merge::{self, Batch, SubmitOutcome};
use crate::quiet::{MuteReason, QuietManager};
use crate::scorers::{RelevanceBackend, TfIdfRelevance};
use crate::snapshot::StateSnapshot;
use crate::state::StateStore;
use crate::{Result, WakeGate};

/// Receives the gate's verdicts, one call per flushed batch
#[async_trait]
pub trait VerdictSink: Send + Sync {
    /// Called exactly once for every flushed batch
    async fn on_verdict(&self, batch: &Batch, verdict: &Verdict);

    /// Called when a conversation crosses the boredom threshold with no
    /// message to attach the wake to. Default: ignore.
    async fn on_idle_wake(&self, conversation: &ConversationKey) {
        let _ = conversation;
    }
}

/// The wake decision engine
pub struct WakeEngine {
    config: ConfigHandle,
    store: StateStore,
    quiet: Arc<QuietManager>,
    relevance: Arc<dyn RelevanceBackend>,
    gate: WakeGate,
    sink: Arc<dyn VerdictSink>,
    shutdown_tx: watch::Sender<bool>,
}

impl WakeEngine {
    /// Create an engine with the bundled TF-IDF relevance backend
    #[must_use]
    pub fn new(config: ConfigHandle, sink: Arc<dyn VerdictSink>) -> Self {
        let history = config.snapshot().raw.relevance_history;
        Self::with_relevance(config, sink, Arc::new(TfIdfRelevance::new(history)))
    }

    /// Create an engine with a custom relevance backend
    #[must_use]
    pub fn with_relevance(
        config: ConfigHandle,
        sink: Arc<dyn VerdictSink>,
        relevance: Arc<dyn RelevanceBackend>,
    ) -> Self {
        let quiet = Arc::new(QuietManager::new());
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            gate: WakeGate::new(quiet.clone(), relevance.clone()),
            config,
            store: StateStore::new(),
            quiet,
            relevance,
            sink,
            shutdown_tx,
        }
    }

    /// The configuration handle (shared with reload triggers)
    #[must_use]
    pub fn config(&self) -> &ConfigHandle {
        &self.config
    }

    /// Validate and atomically install a new configuration
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Config`] naming the invalid key; the
    /// previous configuration stays active on failure
    pub fn reload(&self, config: WakeConfig) -> Result<()> {
        self.config.reload(config)
    }

    /// Handle one incoming message.
    ///
    /// Per-sender processing is serialized by the user slot's lock;
    /// different senders and conversations proceed independently.
    pub async fn handle_event(&self, event: MessageEvent) {
        let cfg = self.config.snapshot();
        let now = Instant::now();
        let conversation = event.conversation_key();
        let user = event.user_key();

        self.store.touch_seen(&conversation, now);

        if !event.sender_is_admin && !self.admitted(&cfg, &conversation, &user) {
            return;
        }

        // Conversation mute commands act immediately, skipping the
        // merge buffer so "shut up" can never be batched into a wake.
        // Only non-automated, admitted senders may issue them.
        if !event.sender_is_bot {
            if cfg.is_shutup_command(&event.text) {
                self.quiet.apply_mute(
                    &Scope::Conversation(conversation.clone()),
                    MuteReason::Manual,
                    None,
                    now,
                );
                return;
            }
            if cfg.is_unmute_command(&event.text) {
                self.quiet.unmute(&Scope::Conversation(conversation));
                return;
            }
        }

        let idle_before = self.store.idle_for(&conversation, now);

        // A different sender speaking ends their peers' merge windows
        self.flush_peers(&user, &cfg, now).await;

        let slot = self.store.user_slot(&user, now);
        let mut state = slot.state.lock().await;
        state.touched_at = now;
        let was_closed = state.batch.is_none();
        let outcome = merge::submit(&mut state.batch, &user, event, now, &cfg);
        if was_closed && state.batch.is_some() {
            state.idle_at_open = idle_before;
        }

        if let SubmitOutcome::Flushed(batch) = outcome {
            let idle = if was_closed { idle_before } else { state.idle_at_open };
            self.evaluate(&batch, &cfg, idle, now).await;
        }
    }

    /// Membership pre-filter: allowlist, conversation and user denylists
    fn admitted(&self, cfg: &Snapshot, conversation: &ConversationKey, user: &UserKey) -> bool {
        let lists = &cfg.raw;
        if !lists.conversation_allowlist.is_empty()
            && !lists
                .conversation_allowlist
                .iter()
                .any(|c| c == conversation.as_str())
        {
            tracing::trace!(conversation = %conversation, "dropped: not on allowlist");
            return false;
        }
        if lists
            .conversation_denylist
            .iter()
            .any(|c| c == conversation.as_str())
        {
            tracing::trace!(conversation = %conversation, "dropped: conversation denylisted");
            return false;
        }
        if lists.user_denylist.iter().any(|u| u == &user.sender) {
            tracing::trace!(user = %user, "dropped: sender denylisted");
            return false;
        }
        true
    }

    /// Force-flush open batches of other senders in the same conversation.
    ///
    /// Peer locks are taken one at a time and released before the
    /// caller's own slot lock, so two senders can never deadlock on each
    /// other's slots.
    async fn flush_peers(&self, user: &UserKey, cfg: &Snapshot, now: Instant) {
        for (peer, slot) in self.store.peer_slots(user) {
            let mut state = slot.state.lock().await;
            let idle = state.idle_at_open;
            if let Some(batch) = merge::force_flush(&mut state.batch, &peer) {
                self.evaluate(&batch, cfg, idle, now).await;
            }
        }
    }

    async fn evaluate(&self, batch: &Batch, cfg: &Snapshot, idle_for: Duration, now: Instant) {
        let verdict = self.gate.decide(batch, cfg, idle_for, now).await;
        // Suppressed batches don't reset the boredom clock
        if !verdict.is_suppress() {
            self.store.touch_activity(&batch.user.conversation, now);
        }
        self.sink.on_verdict(batch, &verdict).await;
    }

    /// One maintenance pass: flush due batches, fire boredom wakes,
    /// expire mutes, evict idle state. Driven by [`Self::spawn_sweeper`].
    pub async fn sweep(&self) {
        let cfg = self.config.snapshot();
        let now = Instant::now();

        for (user, slot) in self.store.all_slots() {
            // A slot busy with a live handler flushes on its own path
            let Ok(mut state) = slot.state.try_lock() else {
                continue;
            };
            let idle = state.idle_at_open;
            if let Some(batch) = merge::flush_due(&mut state.batch, &user, now) {
                self.evaluate(&batch, &cfg, idle, now).await;
            }
        }

        if let Some(threshold) = cfg.boredom_threshold() {
            for conversation in self.store.idle_conversations(threshold, now) {
                // Mute dominates the boredom signal too. The threshold
                // stays armed, so an unmute lets the next sweep fire.
                if self
                    .quiet
                    .is_muted(&Scope::Conversation(conversation.clone()), now)
                {
                    continue;
                }
                tracing::info!(conversation = %conversation, "boredom threshold crossed");
                self.sink.on_idle_wake(&conversation).await;
                // The wake counts as activity, re-arming the threshold
                self.store.touch_activity(&conversation, now);
            }
        }

        self.quiet
            .expire_due(now, cfg.wake_extend().unwrap_or(Duration::ZERO));
        self.store.evict_idle(cfg.entry_ttl(), now);
    }

    /// Spawn the background sweep task.
    ///
    /// The sweep period is re-read from the live configuration on every
    /// cycle, so a reload takes effect without restarting the task.
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let engine = self.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            loop {
                let period = engine.config.snapshot().sweep_interval();
                tokio::select! {
                    () = tokio::time::sleep(period) => engine.sweep().await,
                    _ = shutdown_rx.changed() => break,
                }
            }
            tracing::debug!("sweep task stopped");
        })
    }

    /// Stop the sweeper and drain: every buffered message flushes and
    /// gets a verdict before this returns.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let cfg = self.config.snapshot();
        let now = Instant::now();

        for (user, slot) in self.store.all_slots() {
            let mut state = slot.state.lock().await;
            let idle = state.idle_at_open;
            if let Some(batch) = merge::force_flush(&mut state.batch, &user) {
                self.evaluate(&batch, &cfg, idle, now).await;
            }
        }
        tracing::info!("engine drained");
    }

    /// Feed a bot reply into the relevance backend and the idle tracker
    pub fn record_bot_reply(&self, conversation: &ConversationKey, text: &str) {
        self.relevance.record_reply(conversation, text);
        self.store.touch_activity(conversation, Instant::now());
    }

    /// Persist timing state, idle trackers and unflushed batches to disk
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the file write fails
    pub async fn save_state(&self, path: &Path) -> Result<()> {
        let snapshot = StateSnapshot::capture(&self.store, &self.quiet, Instant::now()).await;
        snapshot.write_to_file(path)?;
        tracing::info!(path = %path.display(), "state snapshot written");
        Ok(())
    }

    /// Restore a state snapshot written by [`Self::save_state`].
    ///
    /// Batches whose flush deadline passed while the engine was down
    /// are flushed by the next sweep.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed
    pub async fn load_state(&self, path: &Path) -> Result<()> {
        let snapshot = StateSnapshot::read_from_file(path)?;
        snapshot
            .restore(&self.store, &self.quiet, Instant::now())
            .await;
        tracing::info!(path = %path.display(), "state snapshot restored");
        Ok(())
    }
}
