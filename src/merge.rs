//! Message merge buffer
//!
//! Closely-spaced messages from one sender accumulate into a
//! [`PendingBatch`] and reach the gate as a single [`Batch`]. A flush is
//! the only path by which events leave the buffer, so no message can
//! appear in two batches. The buffer itself lives inside the per-user
//! state slot; the functions here run under that slot's lock.

use std::time::{Duration, Instant};

use crate::config::{MergeDeadlinePolicy, Snapshot};
use crate::event::{MessageEvent, UserKey};

/// A flushed group of temporally adjacent messages from one sender
#[derive(Debug, Clone)]
pub struct Batch {
    /// Whose messages these are
    pub user: UserKey,
    /// Messages in arrival order, never empty
    pub messages: Vec<MessageEvent>,
    /// When the batch was opened
    pub opened_at: Instant,
}

impl Batch {
    /// All message texts joined into one logical unit
    #[must_use]
    pub fn merged_text(&self) -> String {
        self.messages
            .iter()
            .map(|m| m.text.as_str())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Whether the batch is a single bare @-mention of the bot
    #[must_use]
    pub fn is_empty_mention(&self) -> bool {
        self.messages.len() == 1 && self.messages[0].is_empty_mention
    }

    /// Whether any message in the batch came from an admin
    #[must_use]
    pub fn from_admin(&self) -> bool {
        self.messages.iter().any(|m| m.sender_is_admin)
    }
}

/// An open, still-accumulating batch. Owned exclusively by the merge
/// buffer; the gate only ever sees flushed [`Batch`]es.
#[derive(Debug)]
pub struct PendingBatch {
    messages: Vec<MessageEvent>,
    opened_at: Instant,
    merge_deadline: Instant,
}

impl PendingBatch {
    fn open(event: MessageEvent, now: Instant, cfg: &Snapshot) -> Self {
        Self {
            messages: vec![event],
            opened_at: now,
            merge_deadline: now + cfg.merge_window(),
        }
    }

    /// Whether the flush deadline has elapsed
    #[must_use]
    pub fn is_due(&self, now: Instant) -> bool {
        now >= self.merge_deadline
    }

    /// Number of buffered messages
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the pending batch holds no messages (it never does once open)
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Messages accumulated so far, in arrival order
    #[must_use]
    pub fn messages(&self) -> &[MessageEvent] {
        &self.messages
    }

    /// When the batch was opened
    #[must_use]
    pub const fn opened_at(&self) -> Instant {
        self.opened_at
    }

    /// Time left until the flush deadline; zero once due
    #[must_use]
    pub fn deadline_in(&self, now: Instant) -> Duration {
        self.merge_deadline.saturating_duration_since(now)
    }

    /// Rebuild a pending batch from restored state (snapshot recovery)
    #[must_use]
    pub const fn restore(
        messages: Vec<MessageEvent>,
        opened_at: Instant,
        merge_deadline: Instant,
    ) -> Self {
        Self {
            messages,
            opened_at,
            merge_deadline,
        }
    }

    fn into_batch(self, user: &UserKey) -> Batch {
        Batch {
            user: user.clone(),
            messages: self.messages,
            opened_at: self.opened_at,
        }
    }
}

/// Outcome of submitting one event to the merge buffer
#[derive(Debug)]
pub enum SubmitOutcome {
    /// The event was buffered; no verdict yet
    Buffered,
    /// A batch flushed and must be evaluated by the gate
    Flushed(Batch),
}

/// Submit an event to the user's merge slot.
///
/// Opens a batch on first message, appends while the deadline holds and
/// the size cap allows, and flushes on size cap. An event arriving after
/// the deadline (the sweep hasn't fired yet) is appended and the whole
/// batch flushes in this call, so arrival order is preserved and every
/// message reaches the gate exactly once.
pub fn submit(
    slot: &mut Option<PendingBatch>,
    user: &UserKey,
    event: MessageEvent,
    now: Instant,
    cfg: &Snapshot,
) -> SubmitOutcome {
    match slot.take() {
        None => {
            if cfg.merge_window().is_zero() {
                // Merging disabled: every message is its own batch
                return SubmitOutcome::Flushed(PendingBatch::open(event, now, cfg).into_batch(user));
            }
            let pending = PendingBatch::open(event, now, cfg);
            tracing::trace!(user = %user, deadline_in = ?cfg.merge_window(), "opened merge batch");
            *slot = Some(pending);
            SubmitOutcome::Buffered
        }
        Some(mut pending) => {
            pending.messages.push(event);

            if pending.is_due(now) || pending.messages.len() >= cfg.raw.max_batch_size {
                tracing::debug!(
                    user = %user,
                    size = pending.messages.len(),
                    "merge batch flushed on submit"
                );
                return SubmitOutcome::Flushed(pending.into_batch(user));
            }

            if cfg.raw.merge_deadline_policy == MergeDeadlinePolicy::SlidingPerAppend {
                pending.merge_deadline = now + cfg.merge_window();
            }
            *slot = Some(pending);
            SubmitOutcome::Buffered
        }
    }
}

/// Flush the slot if its deadline has elapsed (timer path, driven by the sweep)
pub fn flush_due(slot: &mut Option<PendingBatch>, user: &UserKey, now: Instant) -> Option<Batch> {
    if slot.as_ref().is_some_and(|p| p.is_due(now)) {
        return force_flush(slot, user);
    }
    None
}

/// Flush the slot unconditionally (peer trigger, shutdown drain)
pub fn force_flush(slot: &mut Option<PendingBatch>, user: &UserKey) -> Option<Batch> {
    slot.take().map(|pending| {
        tracing::debug!(user = %user, size = pending.messages.len(), "merge batch flushed");
        pending.into_batch(user)
    })
}
