// Automod domain models - messages, state snapshots, verdicts and errors.
//
// These are pure domain types with no Discord dependencies.
// The Discord layer converts serenity types into these before evaluation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum AutomodError {
    /// Channel, guild or member lookup failed.
    #[error("Context resolution error: {0}")]
    ContextResolution(String),

    #[error("Config load error: {0}")]
    ConfigLoad(String),

    #[error("Rule check error: {0}")]
    RuleCheck(String),

    #[error("Punishment dispatch error: {0}")]
    Dispatch(String),

    #[error("Message delete error: {0}")]
    Delete(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

// ============================================================================
// PUNISHMENT
// ============================================================================

/// Escalation tier. The derived ordering is the escalation order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub enum PunishmentLevel {
    #[default]
    None,
    Warn,
    Mute,
    Kick,
    Ban,
}

impl std::fmt::Display for PunishmentLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PunishmentLevel::None => write!(f, "None"),
            PunishmentLevel::Warn => write!(f, "Warn"),
            PunishmentLevel::Mute => write!(f, "Mute"),
            PunishmentLevel::Kick => write!(f, "Kick"),
            PunishmentLevel::Ban => write!(f, "Ban"),
        }
    }
}

/// Verdict of a single rule for a single message.
#[derive(Debug, Clone, PartialEq)]
pub struct ViolationResult {
    /// Whether the rule wants the message removed.
    pub triggered: bool,
    pub level: PunishmentLevel,
    pub reason: String,
}

impl ViolationResult {
    pub fn clean() -> Self {
        Self {
            triggered: false,
            level: PunishmentLevel::None,
            reason: String::new(),
        }
    }

    pub fn violation(level: PunishmentLevel, reason: impl Into<String>) -> Self {
        Self {
            triggered: true,
            level,
            reason: reason.into(),
        }
    }
}

/// Combined verdict of every rule for one message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateOutcome {
    pub delete: bool,
    pub level: PunishmentLevel,
    pub mute_duration_secs: u64,
    pub reasons: Vec<String>,
}

impl AggregateOutcome {
    /// Fold one rule result into the aggregate.
    ///
    /// Only a strictly higher level replaces the recorded mute duration, so the
    /// first rule to reach the final maximum decides how long a mute lasts.
    pub fn record(&mut self, result: ViolationResult, mute_duration_secs: u64) {
        if !result.triggered {
            return;
        }

        self.delete = true;
        self.reasons.push(result.reason);

        if result.level > self.level {
            self.level = result.level;
            self.mute_duration_secs = mute_duration_secs;
        }
    }

    /// Reasons joined by newlines, no trailing newline.
    pub fn reason_text(&self) -> String {
        self.reasons.join("\n")
    }
}

// ============================================================================
// MESSAGE & STATE SNAPSHOTS
// ============================================================================

/// The parts of an inbound (or edited) message the rules look at.
#[derive(Debug, Clone)]
pub struct MessageSnapshot {
    pub id: u64,
    pub channel_id: u64,
    pub guild_id: Option<u64>,
    pub author_id: u64,
    pub content: String,
    pub mention_user_ids: Vec<u64>,
    pub mention_role_ids: Vec<u64>,
    pub timestamp: DateTime<Utc>,
}

impl MessageSnapshot {
    /// Users and roles pinged by this message.
    pub fn mention_count(&self) -> usize {
        self.mention_user_ids.len() + self.mention_role_ids.len()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelInfo {
    pub id: u64,
    pub guild_id: Option<u64>,
    pub name: String,
    /// DMs and group DMs.
    pub is_private: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GuildInfo {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemberInfo {
    pub guild_id: u64,
    pub user_id: u64,
    pub display_name: String,
    pub role_ids: Vec<u64>,
}

/// One cached message from the channel history, reduced to what spam detection needs.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub message_id: u64,
    pub author_id: u64,
    pub timestamp: DateTime<Utc>,
}

/// Member and channel state captured under a single read lock.
///
/// Every rule in one evaluation sees the same snapshot.
#[derive(Debug, Clone)]
pub struct StateSnapshot {
    pub channel: ChannelInfo,
    pub member: MemberInfo,
    pub recent_messages: Vec<HistoryEntry>,
}

/// Published whenever a guild's automod settings change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigChanged {
    pub guild_id: u64,
}
