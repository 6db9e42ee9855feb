//! Durable state snapshots
//!
//! Serializes the recoverable engine state — cooldown/mute timers, idle
//! trackers and unflushed merge batches — as JSON, with all instants
//! expressed as durations relative to capture time so a restore on a
//! fresh process (and a fresh monotonic clock) stays meaningful. A batch
//! whose flush deadline passed while the process was down restores as
//! already due and flushes on the next sweep.

use std::path::Path;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::Result;
use crate::event::{ConversationKey, MessageEvent, UserKey};
use crate::merge::PendingBatch;
use crate::quiet::{QuietExport, QuietManager};
use crate::state::StateStore;

/// One unflushed merge batch, relative to capture time
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BatchExport {
    user: UserKey,
    messages: Vec<MessageEvent>,
    /// How long the batch had been open at capture
    age: Duration,
    /// Time left until the flush deadline; zero if already due
    deadline_in: Duration,
    /// Conversation idle time observed when the batch opened
    idle_at_open: Duration,
}

/// Serializable engine state for crash/restart recovery
#[derive(Debug, Serialize, Deserialize)]
pub struct StateSnapshot {
    quiet: Vec<QuietExport>,
    idle: Vec<(ConversationKey, Duration)>,
    batches: Vec<BatchExport>,
}

impl StateSnapshot {
    /// Capture the current engine state relative to `now`
    pub async fn capture(store: &StateStore, quiet: &QuietManager, now: Instant) -> Self {
        let mut batches = Vec::new();
        for (user, slot) in store.all_slots() {
            let state = slot.state.lock().await;
            if let Some(pending) = &state.batch {
                batches.push(BatchExport {
                    user,
                    messages: pending.messages().to_vec(),
                    age: now.saturating_duration_since(pending.opened_at()),
                    deadline_in: pending.deadline_in(now),
                    idle_at_open: state.idle_at_open,
                });
            }
        }
        Self {
            quiet: quiet.export(now),
            idle: store.export_idle(now),
            batches,
        }
    }

    /// Reinstate the captured state relative to `now`
    pub async fn restore(self, store: &StateStore, quiet: &QuietManager, now: Instant) {
        quiet.restore(self.quiet, now);
        store.restore_idle(self.idle, now);
        for export in self.batches {
            let slot = store.user_slot(&export.user, now);
            let mut state = slot.state.lock().await;
            let opened_at = now.checked_sub(export.age).unwrap_or(now);
            state.batch = Some(PendingBatch::restore(
                export.messages,
                opened_at,
                now + export.deadline_in,
            ));
            state.idle_at_open = export.idle_at_open;
        }
        tracing::debug!("state snapshot reinstated");
    }

    /// Write the snapshot as JSON, replacing the file atomically
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the filesystem fails
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let staging = path.with_extension("tmp");
        std::fs::write(&staging, json)?;
        std::fs::rename(&staging, path)?;
        Ok(())
    }

    /// Read a snapshot written by [`Self::write_to_file`]
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed
    pub fn read_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}
