//! Cooldown and mute management
//!
//! Tracks time-based suppression per scope: the wake cooldown, manual
//! mutes (shut-up command) and insult-triggered mutes with auto-expiry.
//! A scope is in one of three effective states — `Active`, `OnCooldown`,
//! `Muted` — reported by [`QuietManager::allowance`]. These methods are
//! the only mutation points for timing state; the gate never touches
//! timers directly.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::event::Scope;

/// Why a scope is muted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MuteReason {
    /// Shut-up command or host request
    Manual,
    /// Insult scorer fired
    InsultDetected,
}

/// Effective gate permission for a scope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Allowance {
    /// Wakes allowed
    Allowed,
    /// Suppressed until the cooldown elapses
    OnCooldown,
    /// Suppressed until unmute or mute expiry
    Muted,
}

#[derive(Debug, Clone, Copy)]
struct Mute {
    /// `None` means muted until an explicit unmute
    until: Option<Instant>,
    reason: MuteReason,
}

#[derive(Debug, Clone, Copy, Default)]
struct QuietState {
    wake_ready_at: Option<Instant>,
    last_wake_at: Option<Instant>,
    mute: Option<Mute>,
}

impl QuietState {
    /// Clear an expired mute; returns the effective allowance
    fn allowance(&mut self, now: Instant) -> Allowance {
        if let Some(mute) = self.mute {
            match mute.until {
                Some(until) if now >= until => {
                    // Auto-expiry observed lazily on read
                    self.mute = None;
                }
                _ => return Allowance::Muted,
            }
        }
        match self.wake_ready_at {
            Some(ready) if now < ready => Allowance::OnCooldown,
            _ => Allowance::Allowed,
        }
    }

    fn is_idle(&self, now: Instant) -> bool {
        let cooldown_over = match self.wake_ready_at {
            Some(ready) => now.checked_duration_since(ready).is_some(),
            None => true,
        };
        let mute_over = match self.mute {
            Some(Mute { until: Some(t), .. }) => now.checked_duration_since(t).is_some(),
            Some(Mute { until: None, .. }) => false,
            None => true,
        };
        cooldown_over && mute_over
    }
}

/// Exported timing state for one scope (snapshot support)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuietExport {
    /// Which scope this entry belongs to
    pub scope: Scope,
    /// Remaining cooldown, if any
    pub cooldown_remaining: Option<Duration>,
    /// Mute reason and remaining duration (`None` duration = indefinite)
    pub mute: Option<(MuteReason, Option<Duration>)>,
}

/// Tracks and enforces time-based wake suppression per scope
#[derive(Debug, Default)]
pub struct QuietManager {
    states: DashMap<Scope, QuietState>,
}

impl QuietManager {
    /// Create an empty manager
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Effective permission for the scope right now.
    ///
    /// An expired mute is cleared as a side effect of the read.
    pub fn allowance(&self, scope: &Scope, now: Instant) -> Allowance {
        match self.states.get_mut(scope) {
            Some(mut state) => state.allowance(now),
            None => Allowance::Allowed,
        }
    }

    /// Record a wake, arming the cooldown for the scope
    pub fn record_wake(&self, scope: &Scope, now: Instant, cooldown: Duration) {
        let mut state = self.states.entry(scope.clone()).or_default();
        state.last_wake_at = Some(now);
        if !cooldown.is_zero() {
            state.wake_ready_at = Some(now + cooldown);
        }
        tracing::debug!(scope = %scope, cooldown = ?cooldown, "wake recorded, cooldown armed");
    }

    /// Whether the scope woke within the given window (extend-on-activity rule)
    pub fn woke_within(&self, scope: &Scope, now: Instant, window: Duration) -> bool {
        self.states.get(scope).is_some_and(|state| {
            state
                .last_wake_at
                .is_some_and(|at| now.saturating_duration_since(at) <= window)
        })
    }

    /// Push the cooldown forward without counting as a fresh wake
    pub fn extend_cooldown(&self, scope: &Scope, now: Instant, cooldown: Duration) {
        if cooldown.is_zero() {
            return;
        }
        let mut state = self.states.entry(scope.clone()).or_default();
        state.wake_ready_at = Some(now + cooldown);
        tracing::debug!(scope = %scope, "cooldown extended on activity");
    }

    /// Mute the scope; `duration: None` mutes until an explicit unmute
    pub fn apply_mute(
        &self,
        scope: &Scope,
        reason: MuteReason,
        duration: Option<Duration>,
        now: Instant,
    ) {
        let mut state = self.states.entry(scope.clone()).or_default();
        state.mute = Some(Mute {
            until: duration.map(|d| now + d),
            reason,
        });
        tracing::info!(scope = %scope, ?reason, ?duration, "scope muted");
    }

    /// Lift a mute; returns whether the scope was muted.
    ///
    /// A manual unmute clears any pending auto-expiry, so a stale
    /// expiry deadline can never re-fire.
    pub fn unmute(&self, scope: &Scope) -> bool {
        let Some(mut state) = self.states.get_mut(scope) else {
            return false;
        };
        let was_muted = state.mute.take().is_some();
        if was_muted {
            tracing::info!(scope = %scope, "scope unmuted");
        }
        was_muted
    }

    /// Whether the scope is currently muted
    pub fn is_muted(&self, scope: &Scope, now: Instant) -> bool {
        self.allowance(scope, now) == Allowance::Muted
    }

    /// Drop entries whose cooldowns and mutes have all elapsed.
    ///
    /// Called by the background sweep; also realizes mute auto-expiry
    /// for scopes nobody is reading. `keep_recent_wake` preserves
    /// entries still inside the extend-on-activity window.
    pub fn expire_due(&self, now: Instant, keep_recent_wake: Duration) {
        self.states.retain(|_, state| {
            if let Some(Mute { until: Some(t), .. }) = state.mute {
                if now >= t {
                    state.mute = None;
                }
            }
            let wake_recent = state
                .last_wake_at
                .is_some_and(|at| now.saturating_duration_since(at) <= keep_recent_wake);
            wake_recent || !state.is_idle(now)
        });
    }

    /// Export all live timing state relative to `now` (snapshot support)
    #[must_use]
    pub fn export(&self, now: Instant) -> Vec<QuietExport> {
        self.states
            .iter()
            .filter_map(|entry| {
                let state = *entry.value();
                let cooldown_remaining = state
                    .wake_ready_at
                    .and_then(|ready| ready.checked_duration_since(now));
                // An expired timed mute is dropped rather than exported
                let mute = state.mute.and_then(|m| match m.until {
                    None => Some((m.reason, None)),
                    Some(t) => t.checked_duration_since(now).map(|d| (m.reason, Some(d))),
                });
                if cooldown_remaining.is_none() && mute.is_none() {
                    return None;
                }
                Some(QuietExport {
                    scope: entry.key().clone(),
                    cooldown_remaining,
                    mute,
                })
            })
            .collect()
    }

    /// Reinstate exported timing state relative to `now` (snapshot support)
    pub fn restore(&self, entries: Vec<QuietExport>, now: Instant) {
        for entry in entries {
            let mut state = self.states.entry(entry.scope).or_default();
            state.wake_ready_at = entry.cooldown_remaining.map(|d| now + d);
            state.mute = entry.mute.map(|(reason, remaining)| Mute {
                until: remaining.map(|d| now + d),
                reason,
            });
        }
    }
}
