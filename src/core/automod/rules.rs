// The automod rules.
//
// Each rule config implements `Rule`. Detection is a pure function of the
// message and the state snapshot; once a rule fires it records a violation
// in the `ViolationStore` and turns the live violation count into a
// punishment level using its escalation settings.

use super::automod_config::{
    AutomodConfig, InviteRule, LinksRule, MentionRule, RuleKind, RuleSettings, SitesRule,
    SpamRule, WordsRule,
};
use super::automod_models::{AutomodError, MessageSnapshot, StateSnapshot, ViolationResult};
use super::matchers::{domain_matches, find_invite, link_hosts, normalize_domain};
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::HashSet;

// ============================================================================
// STORAGE TRAIT (PORT)
// ============================================================================

/// Counts rule violations per member so repeat offenders escalate.
#[async_trait]
pub trait ViolationStore: Send + Sync {
    /// Record a violation that stops counting after `expire_secs`.
    /// Returns the number of live violations of `rule`, including this one.
    async fn push_violation(
        &self,
        guild_id: u64,
        user_id: u64,
        rule: RuleKind,
        expire_secs: u64,
    ) -> Result<u32, AutomodError>;

    /// Forget every violation of a member (manual pardon).
    async fn clear_violations(&self, guild_id: u64, user_id: u64) -> Result<(), AutomodError>;

    /// Drop violations that expired before `now`. Returns how many were removed.
    async fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<u64, AutomodError>;
}

// ============================================================================
// RULE TRAIT
// ============================================================================

#[async_trait]
pub trait Rule: Send + Sync {
    fn kind(&self) -> RuleKind;

    fn settings(&self) -> &RuleSettings;

    /// Inspect the message. `Some(reason)` means the rule fired.
    fn detect(&self, message: &MessageSnapshot, snapshot: &StateSnapshot) -> Option<String>;

    /// Rule disabled, member holds the bypass role, or the channel is exempt.
    fn should_ignore(&self, snapshot: &StateSnapshot) -> bool {
        let settings = self.settings();
        if !settings.enabled {
            return true;
        }
        if let Some(role) = settings.ignore_role {
            if snapshot.member.role_ids.contains(&role) {
                return true;
            }
        }
        settings.ignore_channels.contains(&snapshot.channel.id)
    }

    /// Full verdict: detection plus escalation from the member's violation history.
    async fn check(
        &self,
        message: &MessageSnapshot,
        snapshot: &StateSnapshot,
        violations: &dyn ViolationStore,
    ) -> Result<ViolationResult, AutomodError> {
        let Some(reason) = self.detect(message, snapshot) else {
            return Ok(ViolationResult::clean());
        };

        let settings = self.settings();
        let count = violations
            .push_violation(
                snapshot.member.guild_id,
                message.author_id,
                self.kind(),
                settings.violations_expire_secs,
            )
            .await
            .map_err(|e| AutomodError::RuleCheck(format!("{}: {}", self.kind().key(), e)))?;

        Ok(ViolationResult::violation(settings.level_for(count), reason))
    }

    /// Seconds to mute for when this rule decides the punishment.
    fn mute_duration(&self) -> u64 {
        self.settings().mute_duration_secs
    }
}

impl AutomodConfig {
    /// All rules in evaluation order.
    pub fn rules(&self) -> [&dyn Rule; 6] {
        [
            &self.spam,
            &self.invite,
            &self.mention,
            &self.links,
            &self.words,
            &self.sites,
        ]
    }
}

// ============================================================================
// RULE IMPLEMENTATIONS
// ============================================================================

impl Rule for SpamRule {
    fn kind(&self) -> RuleKind {
        RuleKind::Spam
    }

    fn settings(&self) -> &RuleSettings {
        &self.settings
    }

    fn detect(&self, message: &MessageSnapshot, snapshot: &StateSnapshot) -> Option<String> {
        // A window too large to represent has no lower bound.
        let window_start = i64::try_from(self.within_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .and_then(|window| message.timestamp.checked_sub_signed(window));

        // The current message may or may not be in the cached history yet.
        let earlier = snapshot
            .recent_messages
            .iter()
            .filter(|m| m.message_id != message.id)
            .filter(|m| m.author_id == message.author_id)
            .filter(|m| window_start.map_or(true, |start| m.timestamp >= start))
            .filter(|m| m.timestamp <= message.timestamp)
            .count();
        let sent = earlier + 1;

        if sent > self.max_messages as usize {
            Some(format!(
                "Sent {} messages in {} seconds",
                sent, self.within_secs
            ))
        } else {
            None
        }
    }
}

impl Rule for InviteRule {
    fn kind(&self) -> RuleKind {
        RuleKind::Invite
    }

    fn settings(&self) -> &RuleSettings {
        &self.settings
    }

    fn detect(&self, message: &MessageSnapshot, _snapshot: &StateSnapshot) -> Option<String> {
        find_invite(&message.content).map(|code| format!("Sent a server invite: {}", code))
    }
}

impl Rule for MentionRule {
    fn kind(&self) -> RuleKind {
        RuleKind::Mention
    }

    fn settings(&self) -> &RuleSettings {
        &self.settings
    }

    fn detect(&self, message: &MessageSnapshot, _snapshot: &StateSnapshot) -> Option<String> {
        let mentions = message.mention_count();
        if self.threshold > 0 && mentions >= self.threshold as usize {
            Some(format!("Sent a message with {} mentions", mentions))
        } else {
            None
        }
    }
}

impl Rule for LinksRule {
    fn kind(&self) -> RuleKind {
        RuleKind::Links
    }

    fn settings(&self) -> &RuleSettings {
        &self.settings
    }

    fn detect(&self, message: &MessageSnapshot, _snapshot: &StateSnapshot) -> Option<String> {
        let allowed: HashSet<String> = self
            .allowed_domains
            .iter()
            .map(|d| normalize_domain(d))
            .collect();

        link_hosts(&message.content)
            .into_iter()
            .find(|host| domain_matches(&allowed, host).is_none())
            .map(|host| format!("Sent a link to {}", host))
    }
}

impl Rule for WordsRule {
    fn kind(&self) -> RuleKind {
        RuleKind::Words
    }

    fn settings(&self) -> &RuleSettings {
        &self.settings
    }

    fn detect(&self, message: &MessageSnapshot, _snapshot: &StateSnapshot) -> Option<String> {
        self.compiled()
            .find(&message.content)
            .map(|word| format!("Found word: {}", word))
    }
}

impl Rule for SitesRule {
    fn kind(&self) -> RuleKind {
        RuleKind::Sites
    }

    fn settings(&self) -> &RuleSettings {
        &self.settings
    }

    fn detect(&self, message: &MessageSnapshot, _snapshot: &StateSnapshot) -> Option<String> {
        self.compiled()
            .find(&message.content)
            .map(|domain| format!("Found banned site: {}", domain))
    }
}

// ============================================================================
// TESTS
// ============================================================================
