//! Message events, state keys and gate verdicts

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifies a conversation (group/channel). Stable for the
/// conversation's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationKey(String);

impl ConversationKey {
    /// Create a conversation key
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw conversation identifier
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifies a specific participant's state within a conversation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserKey {
    /// The conversation this participant is in
    pub conversation: ConversationKey,
    /// Platform-specific sender identifier
    pub sender: String,
}

impl UserKey {
    /// Create a user key
    pub fn new(conversation: ConversationKey, sender: impl Into<String>) -> Self {
        Self {
            conversation,
            sender: sender.into(),
        }
    }
}

impl fmt::Display for UserKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.conversation, self.sender)
    }
}

/// Granularity at which cooldown/mute state is tracked
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scope {
    /// One participant in one conversation
    User(UserKey),
    /// A whole conversation
    Conversation(ConversationKey),
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(key) => write!(f, "user:{key}"),
            Self::Conversation(key) => write!(f, "conversation:{key}"),
        }
    }
}

/// An incoming chat message, supplied by the host messaging runtime
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEvent {
    /// Conversation (group/channel) identifier
    pub conversation_id: String,

    /// Sender identifier
    pub sender_id: String,

    /// Message text (may be empty)
    pub text: String,

    /// Host-supplied wall-clock timestamp
    pub timestamp: DateTime<Utc>,

    /// Whether the sender is known to be a bot
    #[serde(default)]
    pub sender_is_bot: bool,

    /// Whether this is a bare @-mention of the bot with no further text
    #[serde(default)]
    pub is_empty_mention: bool,

    /// Whether the sender is an administrator (bypasses vetoes and mutes)
    #[serde(default)]
    pub sender_is_admin: bool,
}

impl MessageEvent {
    /// Create a message event stamped with the current time
    pub fn new(
        conversation_id: impl Into<String>,
        sender_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            sender_id: sender_id.into(),
            text: text.into(),
            timestamp: Utc::now(),
            sender_is_bot: false,
            is_empty_mention: false,
            sender_is_admin: false,
        }
    }

    /// Mark the sender as a bot
    #[must_use]
    pub const fn from_bot(mut self) -> Self {
        self.sender_is_bot = true;
        self
    }

    /// Mark this as an empty @-mention of the bot
    #[must_use]
    pub const fn empty_mention(mut self) -> Self {
        self.is_empty_mention = true;
        self
    }

    /// Mark the sender as an administrator
    #[must_use]
    pub const fn from_admin(mut self) -> Self {
        self.sender_is_admin = true;
        self
    }

    /// The conversation key for this event
    #[must_use]
    pub fn conversation_key(&self) -> ConversationKey {
        ConversationKey::new(self.conversation_id.clone())
    }

    /// The user key for this event
    #[must_use]
    pub fn user_key(&self) -> UserKey {
        UserKey::new(self.conversation_key(), self.sender_id.clone())
    }
}

/// How a wake should be served
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WakeMode {
    /// Forward the batch to the LLM pipeline
    Forward,
    /// Serve a canned reply (empty @-mention, no content to forward)
    Canned,
}

/// Which signal caused a wake
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WakeReason {
    /// The bot's nickname was mentioned
    Mention,
    /// Bare @-mention with no further text
    EmptyMention,
    /// The message looks like a question
    Question,
    /// Topic relevance cleared the configured threshold
    Relevance {
        /// The relevance score that cleared the threshold
        score: f64,
    },
    /// The conversation has been idle past the boredom threshold
    Bored,
    /// The probability gate passed
    Probability,
}

/// Why a batch was suppressed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuppressReason {
    /// Sender is bot-generated and bot-speech filtering is enabled
    BotSender,
    /// Message matched a wake-blocking phrase
    BlockedPhrase,
    /// Message is a host built-in command
    BuiltinCommand,
    /// Scope is muted
    Muted,
    /// Scope is on wake cooldown
    OnCooldown,
    /// Merged message text is empty
    EmptyText,
    /// No positive signal fired
    NoSignal,
}

/// The gate's decision for one flushed batch
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "verdict")]
pub enum Verdict {
    /// Wake the bot
    Wake {
        /// How the wake should be served
        mode: WakeMode,
        /// Which signal fired
        reason: WakeReason,
    },
    /// Stay silent
    Suppress {
        /// Why the batch was suppressed
        reason: SuppressReason,
    },
    /// Push the cooldown forward without counting as a fresh wake
    ExtendActivity,
}

impl Verdict {
    /// Whether this verdict wakes the bot
    #[must_use]
    pub const fn is_wake(&self) -> bool {
        matches!(self, Self::Wake { .. })
    }

    /// Whether this verdict suppresses the batch
    #[must_use]
    pub const fn is_suppress(&self) -> bool {
        matches!(self, Self::Suppress { .. })
    }
}
