//! Wakegate - wake decision engine for group-chat bots
//!
//! This library decides, for every incoming group-chat message, whether
//! the bot should wake (respond), stay silent, or quietly extend its
//! active window:
//! - Merge buffering of rapid-fire messages per sender
//! - Heuristic wake scorers (mention, question, topic relevance, ...)
//! - Cooldown and mute timers per user and per conversation
//! - Hot config reload and crash-recovery state snapshots
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                 Host chat runtime                    │
//! │     Discord  │  Telegram  │  QQ  │  Matrix  │ ...   │
//! └────────────────────┬────────────────────────────────┘
//!                      │ MessageEvent
//! ┌────────────────────▼────────────────────────────────┐
//! │                   WakeEngine                         │
//! │   pre-filters │ merge buffer │ sweep │ snapshots    │
//! └────────────────────┬────────────────────────────────┘
//!                      │ Batch
//! ┌────────────────────▼────────────────────────────────┐
//! │                    WakeGate                          │
//! │   vetoes → mute/cooldown → OR-combined scorers      │
//! └────────────────────┬────────────────────────────────┘
//!                      │ Verdict
//!                 VerdictSink (host)
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod gate;
pub mod merge;
pub mod quiet;
pub mod scorers;
pub mod snapshot;
pub mod state;

pub use config::{ConfigHandle, MergeDeadlinePolicy, MuteScope, Snapshot, WakeConfig};
pub use engine::{VerdictSink, WakeEngine};
pub use error::{Error, Result};
pub use event::{
    ConversationKey, MessageEvent, Scope, SuppressReason, UserKey, Verdict, WakeMode, WakeReason,
};
pub use gate::WakeGate;
pub use merge::{Batch, PendingBatch, SubmitOutcome};
pub use quiet::{Allowance, MuteReason, QuietManager};
pub use scorers::{RelevanceBackend, ScoreContext, Scorer, ScorerUnavailable, Signal, TfIdfRelevance};
pub use snapshot::StateSnapshot;
pub use state::StateStore;
