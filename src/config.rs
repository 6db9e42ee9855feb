//! Configuration for the wake engine
//!
//! The on-disk schema is YAML and partial — every key has a default, so a
//! config file only states what it overrides. A loaded config is validated,
//! then compiled into an immutable [`Snapshot`] (phrase sets lowercased,
//! mention regex built once). Reload swaps the snapshot atomically; a
//! decision already holding a snapshot keeps it.

use std::path::Path;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Policy for the merge-batch flush deadline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MergeDeadlinePolicy {
    /// Deadline fixed at `opened_at + merge_window`; bounds worst-case latency
    #[default]
    FixedFromFirst,
    /// Deadline reset to `now + merge_window` on each append
    SlidingPerAppend,
}

/// Granularity at which insult mutes are tracked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MuteScope {
    /// Mute the offending participant only
    #[default]
    PerUser,
    /// Mute the whole conversation
    PerConversation,
}

/// Wake engine configuration
///
/// All durations are in seconds unless the key says otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WakeConfig {
    /// Minimum interval between consecutive wakes per user
    pub cooldown_secs: f64,

    /// How long the merge buffer holds a batch open
    pub merge_window_secs: f64,

    /// Max messages per merge batch; reaching it flushes immediately
    pub max_batch_size: usize,

    /// Flush deadline policy for the merge buffer
    pub merge_deadline_policy: MergeDeadlinePolicy,

    /// Conversation idle time before a boredom wake fires (0 disables)
    pub boredom_threshold_secs: f64,

    /// Probability in [0, 1] of waking on an otherwise silent message
    pub wake_probability: f64,

    /// Topic relevance score in (0, 1] needed to wake (0 disables)
    pub topic_relevance_threshold: f64,

    /// Mute duration applied when the insult scorer fires
    pub mute_duration_on_insult_secs: f64,

    /// Whether an insult mutes the triggering message too, or only later ones
    pub mute_applies_to_trigger: bool,

    /// Scope of insult mutes
    pub mute_scope: MuteScope,

    /// Phrases that veto a wake outright
    pub blocked_phrases: Vec<String>,

    /// Phrases that trigger an insult mute
    pub insult_phrases: Vec<String>,

    /// Nicknames that count as mentioning the bot
    pub bot_nicknames: Vec<String>,

    /// Interrogative markers (locale-configurable)
    pub question_markers: Vec<String>,

    /// Phrases that mute the conversation until an unmute phrase arrives
    pub shutup_phrases: Vec<String>,

    /// Phrases that lift a conversation mute
    pub unmute_phrases: Vec<String>,

    /// Host built-in command words; exact-match messages never wake
    pub builtin_commands: Vec<String>,

    /// Conversations allowed to wake the bot (empty = all)
    pub conversation_allowlist: Vec<String>,

    /// Conversations never allowed to wake the bot
    pub conversation_denylist: Vec<String>,

    /// Senders never allowed to wake the bot
    pub user_denylist: Vec<String>,

    /// Suppress wakes from senders flagged or marked as bots
    pub bot_sender_filtering: bool,

    /// Text markers that identify automated senders
    pub bot_sender_markers: Vec<String>,

    /// Re-arm the cooldown on activity within `wake_extend_secs` of a wake
    pub extend_on_activity: bool,

    /// Window after a wake in which activity extends the cooldown
    pub wake_extend_secs: f64,

    /// Evict per-key state idle longer than this
    pub entry_ttl_secs: f64,

    /// Background sweep period in milliseconds
    pub sweep_interval_ms: u64,

    /// Messages of history the relevance backend keeps per conversation
    pub relevance_history: usize,
}

impl Default for WakeConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: 60.0,
            merge_window_secs: 2.0,
            max_batch_size: 8,
            merge_deadline_policy: MergeDeadlinePolicy::default(),
            boredom_threshold_secs: 0.0,
            wake_probability: 0.0,
            topic_relevance_threshold: 0.0,
            mute_duration_on_insult_secs: 300.0,
            mute_applies_to_trigger: false,
            mute_scope: MuteScope::default(),
            blocked_phrases: Vec::new(),
            insult_phrases: Vec::new(),
            bot_nicknames: Vec::new(),
            question_markers: vec!["?".to_string(), "？".to_string()],
            shutup_phrases: Vec::new(),
            unmute_phrases: Vec::new(),
            builtin_commands: Vec::new(),
            conversation_allowlist: Vec::new(),
            conversation_denylist: Vec::new(),
            user_denylist: Vec::new(),
            bot_sender_filtering: true,
            bot_sender_markers: Vec::new(),
            extend_on_activity: false,
            wake_extend_secs: 0.0,
            entry_ttl_secs: 3600.0,
            sweep_interval_ms: 250,
            relevance_history: 120,
        }
    }
}

/// Check a duration-like field: finite and non-negative
fn check_secs(value: f64, key: &str) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(Error::Config(format!(
            "{key} must be a non-negative number of seconds, got {value}"
        )));
    }
    Ok(())
}

/// Check a ratio field: finite and within [0, 1]
fn check_ratio(value: f64, key: &str) -> Result<()> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(Error::Config(format!(
            "{key} must be within [0, 1], got {value}"
        )));
    }
    Ok(())
}

impl WakeConfig {
    /// Validate the configuration, naming the first offending key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the invalid key. A failed
    /// validation never partially applies anything.
    pub fn validate(&self) -> Result<()> {
        check_secs(self.cooldown_secs, "cooldown_secs")?;
        check_secs(self.merge_window_secs, "merge_window_secs")?;
        check_secs(self.boredom_threshold_secs, "boredom_threshold_secs")?;
        check_secs(
            self.mute_duration_on_insult_secs,
            "mute_duration_on_insult_secs",
        )?;
        check_secs(self.wake_extend_secs, "wake_extend_secs")?;
        check_secs(self.entry_ttl_secs, "entry_ttl_secs")?;
        check_ratio(self.wake_probability, "wake_probability")?;
        check_ratio(self.topic_relevance_threshold, "topic_relevance_threshold")?;

        if self.max_batch_size == 0 {
            return Err(Error::Config(
                "max_batch_size must be at least 1".to_string(),
            ));
        }
        if self.sweep_interval_ms == 0 {
            return Err(Error::Config(
                "sweep_interval_ms must be at least 1".to_string(),
            ));
        }
        if self.relevance_history == 0 {
            return Err(Error::Config(
                "relevance_history must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Parse a YAML config string (partial keys on top of defaults)
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is malformed
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Load a YAML config file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_yaml(&content)?;
        tracing::info!(path = %path.display(), "loaded config file");
        Ok(config)
    }
}

/// A validated, compiled configuration snapshot
///
/// Immutable once built; shared by `Arc` across in-flight decisions.
#[derive(Debug)]
pub struct Snapshot {
    /// The raw validated configuration
    pub raw: WakeConfig,
    /// Word-boundary regex over nicknames that have clean word edges
    mention_re: Option<Regex>,
    /// Lowercased nicknames matched as plain substrings (no word edges)
    mention_plain: Vec<String>,
    blocked: Vec<String>,
    insults: Vec<String>,
    shutup: Vec<String>,
    unmute: Vec<String>,
    bot_markers: Vec<String>,
}

/// Lowercase a phrase list, dropping empty entries
fn lowered(phrases: &[String]) -> Vec<String> {
    phrases
        .iter()
        .map(|p| p.trim().to_lowercase())
        .filter(|p| !p.is_empty())
        .collect()
}

/// Whether a nickname can sit inside a `\b..\b` regex
fn has_word_edges(nick: &str) -> bool {
    let first = nick.chars().next();
    let last = nick.chars().next_back();
    matches!((first, last), (Some(f), Some(l))
        if (f.is_alphanumeric() || f == '_') && (l.is_alphanumeric() || l == '_'))
}

impl Snapshot {
    /// Validate and compile a configuration
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if validation fails or a nickname
    /// produces an uncompilable pattern
    pub fn compile(raw: WakeConfig) -> Result<Self> {
        raw.validate()?;

        let mut bounded = Vec::new();
        let mut plain = Vec::new();
        for nick in lowered(&raw.bot_nicknames) {
            if has_word_edges(&nick) {
                bounded.push(regex::escape(&nick));
            } else {
                plain.push(nick);
            }
        }

        let mention_re = if bounded.is_empty() {
            None
        } else {
            let pattern = format!(r"(?i)\b(?:{})\b", bounded.join("|"));
            Some(
                Regex::new(&pattern)
                    .map_err(|e| Error::Config(format!("bot_nicknames: {e}")))?,
            )
        };

        Ok(Self {
            mention_re,
            mention_plain: plain,
            blocked: lowered(&raw.blocked_phrases),
            insults: lowered(&raw.insult_phrases),
            shutup: lowered(&raw.shutup_phrases),
            unmute: lowered(&raw.unmute_phrases),
            bot_markers: lowered(&raw.bot_sender_markers),
            raw,
        })
    }

    /// Whether the text mentions one of the bot's nicknames
    #[must_use]
    pub fn mentions_bot(&self, text: &str) -> bool {
        if let Some(re) = &self.mention_re {
            if re.is_match(text) {
                return true;
            }
        }
        let lower = text.to_lowercase();
        self.mention_plain.iter().any(|n| lower.contains(n))
    }

    /// Whether the text contains a wake-blocking phrase
    #[must_use]
    pub fn has_blocked_phrase(&self, text: &str) -> bool {
        contains_any(text, &self.blocked)
    }

    /// Whether the text contains an insult phrase
    #[must_use]
    pub fn has_insult_phrase(&self, text: &str) -> bool {
        contains_any(text, &self.insults)
    }

    /// Whether the text is a shut-up command
    #[must_use]
    pub fn is_shutup_command(&self, text: &str) -> bool {
        matches_phrase(text, &self.shutup)
    }

    /// Whether the text is an unmute command
    #[must_use]
    pub fn is_unmute_command(&self, text: &str) -> bool {
        matches_phrase(text, &self.unmute)
    }

    /// Whether the text carries an automated-sender marker
    #[must_use]
    pub fn has_bot_marker(&self, text: &str) -> bool {
        contains_any(text, &self.bot_markers)
    }

    /// Whether the text is exactly a host built-in command
    #[must_use]
    pub fn is_builtin_command(&self, text: &str) -> bool {
        let trimmed = text.trim();
        self.raw.builtin_commands.iter().any(|c| c == trimmed)
    }

    /// Minimum interval between wakes per user
    #[must_use]
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs_f64(self.raw.cooldown_secs)
    }

    /// How long the merge buffer holds a batch open
    #[must_use]
    pub fn merge_window(&self) -> Duration {
        Duration::from_secs_f64(self.raw.merge_window_secs)
    }

    /// Boredom threshold, `None` when idle wakes are disabled
    #[must_use]
    pub fn boredom_threshold(&self) -> Option<Duration> {
        (self.raw.boredom_threshold_secs > 0.0)
            .then(|| Duration::from_secs_f64(self.raw.boredom_threshold_secs))
    }

    /// Mute duration applied on insult detection
    #[must_use]
    pub fn mute_on_insult(&self) -> Duration {
        Duration::from_secs_f64(self.raw.mute_duration_on_insult_secs)
    }

    /// Cooldown-extension window, `None` when disabled
    #[must_use]
    pub fn wake_extend(&self) -> Option<Duration> {
        (self.raw.extend_on_activity && self.raw.wake_extend_secs > 0.0)
            .then(|| Duration::from_secs_f64(self.raw.wake_extend_secs))
    }

    /// TTL for idle per-key state
    #[must_use]
    pub fn entry_ttl(&self) -> Duration {
        Duration::from_secs_f64(self.raw.entry_ttl_secs)
    }

    /// Background sweep period
    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.raw.sweep_interval_ms)
    }
}

/// Case-insensitive substring match against a lowercased phrase set
fn contains_any(text: &str, phrases: &[String]) -> bool {
    if phrases.is_empty() {
        return false;
    }
    let lower = text.to_lowercase();
    phrases.iter().any(|p| lower.contains(p.as_str()))
}

/// Case-insensitive whole-message match against a lowercased phrase set
fn matches_phrase(text: &str, phrases: &[String]) -> bool {
    let trimmed = text.trim().to_lowercase();
    phrases.iter().any(|p| *p == trimmed)
}

/// Shared handle to the current configuration snapshot
///
/// Reads clone an `Arc` under a brief read lock; reload validates, then
/// swaps the `Arc`. In-flight decisions keep the snapshot they started
/// with.
#[derive(Debug, Clone)]
pub struct ConfigHandle {
    current: Arc<RwLock<Arc<Snapshot>>>,
}

impl ConfigHandle {
    /// Create a handle from a raw configuration
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration is invalid
    pub fn new(config: WakeConfig) -> Result<Self> {
        let snapshot = Snapshot::compile(config)?;
        Ok(Self {
            current: Arc::new(RwLock::new(Arc::new(snapshot))),
        })
    }

    /// The current snapshot
    #[must_use]
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.current
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Validate and atomically install a new configuration.
    ///
    /// On failure the previous snapshot stays active.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the invalid key
    pub fn reload(&self, config: WakeConfig) -> Result<()> {
        let snapshot = Snapshot::compile(config)?;
        let mut guard = self
            .current
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard = Arc::new(snapshot);
        tracing::info!("configuration reloaded");
        Ok(())
    }
}
