//! Sharded per-conversation / per-user state store
//!
//! State is scoped per key so conversations never block on each other.
//! Each user slot carries a fair async mutex — holding it while handling
//! one message is what serializes a single sender's processing (FIFO).
//! Entries are created lazily on first message and evicted after a
//! configurable inactivity window; eviction never discards a slot that
//! still holds an unflushed merge batch.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::event::{ConversationKey, UserKey};
use crate::merge::PendingBatch;

/// Mutable per-user state, guarded by the slot's lock
#[derive(Debug)]
pub struct UserState {
    /// Open merge batch, if any
    pub batch: Option<PendingBatch>,
    /// Conversation idle time observed when the open batch started
    pub idle_at_open: Duration,
    /// Last time this slot handled a message
    pub touched_at: Instant,
}

/// One user's slot: a fair mutex over the mutable state
#[derive(Debug)]
pub struct UserSlot {
    /// Tokio's mutex queues waiters FIFO, which gives per-user ordering
    pub state: Mutex<UserState>,
}

/// Per-conversation bookkeeping
#[derive(Debug, Clone, Copy)]
struct ConversationState {
    /// Last non-suppressed activity (read by the boredom sweep)
    last_activity_at: Instant,
    /// Last time any message for this conversation was seen
    touched_at: Instant,
}

/// Holds all mutable per-conversation and per-user state
#[derive(Debug, Default)]
pub struct StateStore {
    users: DashMap<UserKey, Arc<UserSlot>>,
    conversations: DashMap<ConversationKey, ConversationState>,
}

impl StateStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or lazily create the slot for a user
    #[must_use]
    pub fn user_slot(&self, key: &UserKey, now: Instant) -> Arc<UserSlot> {
        self.users
            .entry(key.clone())
            .or_insert_with(|| {
                Arc::new(UserSlot {
                    state: Mutex::new(UserState {
                        batch: None,
                        idle_at_open: Duration::ZERO,
                        touched_at: now,
                    }),
                })
            })
            .clone()
    }

    /// All user slots in one conversation, excluding one sender.
    ///
    /// Used for the peer-sender flush trigger.
    #[must_use]
    pub fn peer_slots(&self, key: &UserKey) -> Vec<(UserKey, Arc<UserSlot>)> {
        self.users
            .iter()
            .filter(|entry| {
                entry.key().conversation == key.conversation && entry.key().sender != key.sender
            })
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// All user slots (sweep and shutdown drain)
    #[must_use]
    pub fn all_slots(&self) -> Vec<(UserKey, Arc<UserSlot>)> {
        self.users
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Mark conversation activity (updated on every non-suppressed message)
    pub fn touch_activity(&self, key: &ConversationKey, now: Instant) {
        let mut state = self
            .conversations
            .entry(key.clone())
            .or_insert(ConversationState {
                last_activity_at: now,
                touched_at: now,
            });
        state.last_activity_at = now;
        state.touched_at = now;
    }

    /// Mark that a conversation was seen, without counting it as activity
    pub fn touch_seen(&self, key: &ConversationKey, now: Instant) {
        let mut state = self
            .conversations
            .entry(key.clone())
            .or_insert(ConversationState {
                last_activity_at: now,
                touched_at: now,
            });
        state.touched_at = now;
    }

    /// How long the conversation has been idle; zero if never seen
    #[must_use]
    pub fn idle_for(&self, key: &ConversationKey, now: Instant) -> Duration {
        self.conversations
            .get(key)
            .map_or(Duration::ZERO, |state| {
                now.saturating_duration_since(state.last_activity_at)
            })
    }

    /// Conversations idle at least `threshold` (boredom sweep input)
    #[must_use]
    pub fn idle_conversations(&self, threshold: Duration, now: Instant) -> Vec<ConversationKey> {
        self.conversations
            .iter()
            .filter(|entry| {
                now.saturating_duration_since(entry.value().last_activity_at) >= threshold
            })
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Evict per-key state idle longer than `ttl`.
    ///
    /// A user slot survives eviction while it is locked (a handler is
    /// active) or while it holds an unflushed batch.
    pub fn evict_idle(&self, ttl: Duration, now: Instant) {
        self.users.retain(|_, slot| {
            let Ok(state) = slot.state.try_lock() else {
                // A handler holds the lock; the slot is live
                return true;
            };
            state.batch.is_some() || now.saturating_duration_since(state.touched_at) < ttl
        });
        self.conversations
            .retain(|_, state| now.saturating_duration_since(state.touched_at) < ttl);
    }

    /// Export idle-tracker state relative to `now` (snapshot support)
    #[must_use]
    pub fn export_idle(&self, now: Instant) -> Vec<(ConversationKey, Duration)> {
        self.conversations
            .iter()
            .map(|entry| {
                (
                    entry.key().clone(),
                    now.saturating_duration_since(entry.value().last_activity_at),
                )
            })
            .collect()
    }

    /// Reinstate idle-tracker state relative to `now` (snapshot support)
    pub fn restore_idle(&self, entries: Vec<(ConversationKey, Duration)>, now: Instant) {
        for (key, idle_for) in entries {
            let last = now.checked_sub(idle_for).unwrap_or(now);
            self.conversations.insert(
                key,
                ConversationState {
                    last_activity_at: last,
                    touched_at: now,
                },
            );
        }
    }

    /// Number of live user slots (tests and metrics-by-log)
    #[must_use]
    pub fn user_count(&self) -> usize {
        self.users.len()
    }
}
