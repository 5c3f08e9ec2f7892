// Per-guild automod configuration.
//
// The raw config is what the store persists (serde JSON). Word and site rules
// additionally carry a compiled matcher that is built on first use after a
// load and never serialized.

use super::automod_models::PunishmentLevel;
use super::matchers::{
    normalize_domain, SiteMatcher, WordMatcher, BUILTIN_BAD_SITES, BUILTIN_SWEAR_WORDS,
};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Which rule a setting or violation belongs to. Declaration order is evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RuleKind {
    Spam,
    Invite,
    Mention,
    Links,
    Words,
    Sites,
}

impl RuleKind {
    pub const ALL: [RuleKind; 6] = [
        RuleKind::Spam,
        RuleKind::Invite,
        RuleKind::Mention,
        RuleKind::Links,
        RuleKind::Words,
        RuleKind::Sites,
    ];

    /// Stable key used for violation bookkeeping.
    pub fn key(&self) -> &'static str {
        match self {
            RuleKind::Spam => "spam",
            RuleKind::Invite => "invite",
            RuleKind::Mention => "mention",
            RuleKind::Links => "links",
            RuleKind::Words => "words",
            RuleKind::Sites => "sites",
        }
    }
}

impl std::fmt::Display for RuleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleKind::Spam => write!(f, "Spam"),
            RuleKind::Invite => write!(f, "Invites"),
            RuleKind::Mention => write!(f, "Mention Spam"),
            RuleKind::Links => write!(f, "Links"),
            RuleKind::Words => write!(f, "Banned Words"),
            RuleKind::Sites => write!(f, "Banned Sites"),
        }
    }
}

/// Settings every rule shares: exemptions and violation escalation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleSettings {
    pub enabled: bool,
    /// Members with this role bypass the rule.
    pub ignore_role: Option<u64>,
    pub ignore_channels: Vec<u64>,
    /// How long a violation counts towards escalation.
    pub violations_expire_secs: u64,
    /// Violation count thresholds, 0 disables the tier.
    pub mute_after: u32,
    pub mute_duration_secs: u64,
    pub kick_after: u32,
    pub ban_after: u32,
}

impl Default for RuleSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            ignore_role: None,
            ignore_channels: Vec::new(),
            violations_expire_secs: 30 * 60,
            mute_after: 0,
            mute_duration_secs: 10 * 60,
            kick_after: 0,
            ban_after: 0,
        }
    }
}

impl RuleSettings {
    /// Punishment for a member who now has `violations` live violations of this rule.
    pub fn level_for(&self, violations: u32) -> PunishmentLevel {
        if self.ban_after > 0 && violations >= self.ban_after {
            PunishmentLevel::Ban
        } else if self.kick_after > 0 && violations >= self.kick_after {
            PunishmentLevel::Kick
        } else if self.mute_after > 0 && violations >= self.mute_after {
            PunishmentLevel::Mute
        } else {
            PunishmentLevel::Warn
        }
    }

    #[cfg(test)]
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpamRule {
    pub settings: RuleSettings,
    /// Messages allowed within the window before it counts as spam.
    pub max_messages: u32,
    pub within_secs: u64,
}

impl Default for SpamRule {
    fn default() -> Self {
        Self {
            settings: RuleSettings::default(),
            max_messages: 5,
            within_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InviteRule {
    pub settings: RuleSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MentionRule {
    pub settings: RuleSettings,
    /// Mentions (users + roles) in one message that trigger the rule.
    pub threshold: u32,
}

impl Default for MentionRule {
    fn default() -> Self {
        Self {
            settings: RuleSettings::default(),
            threshold: 5,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LinksRule {
    pub settings: RuleSettings,
    /// Domains (and their subdomains) that may be linked freely.
    pub allowed_domains: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WordsRule {
    pub settings: RuleSettings,
    pub builtin_swear_words: bool,
    pub list: Vec<String>,
    #[serde(skip)]
    compiled: OnceLock<WordMatcher>,
}

impl WordsRule {
    #[cfg(test)]
    pub fn new(settings: RuleSettings, list: Vec<String>) -> Self {
        Self {
            settings,
            list,
            ..Default::default()
        }
    }

    #[cfg(test)]
    pub fn with_builtin_list(mut self, enabled: bool) -> Self {
        self.builtin_swear_words = enabled;
        self.compiled = OnceLock::new();
        self
    }

    /// The compiled matcher, built from the raw list on first call.
    pub fn compiled(&self) -> &WordMatcher {
        self.compiled.get_or_init(|| {
            let builtin: &[&str] = if self.builtin_swear_words {
                BUILTIN_SWEAR_WORDS
            } else {
                &[]
            };
            WordMatcher::new(builtin.iter().copied().chain(self.list.iter().map(String::as_str)))
        })
    }

    #[cfg(test)]
    pub fn is_compiled(&self) -> bool {
        self.compiled.get().is_some()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SitesRule {
    pub settings: RuleSettings,
    pub builtin_bad_sites: bool,
    pub list: Vec<String>,
    #[serde(skip)]
    compiled: OnceLock<SiteMatcher>,
}

impl SitesRule {
    #[cfg(test)]
    pub fn new(settings: RuleSettings, list: Vec<String>) -> Self {
        Self {
            settings,
            list,
            ..Default::default()
        }
    }

    #[cfg(test)]
    pub fn with_builtin_list(mut self, enabled: bool) -> Self {
        self.builtin_bad_sites = enabled;
        self.compiled = OnceLock::new();
        self
    }

    pub fn compiled(&self) -> &SiteMatcher {
        self.compiled.get_or_init(|| {
            let builtin: &[&str] = if self.builtin_bad_sites {
                BUILTIN_BAD_SITES
            } else {
                &[]
            };
            SiteMatcher::new(builtin.iter().copied().chain(self.list.iter().map(String::as_str)))
        })
    }

    #[cfg(test)]
    pub fn is_compiled(&self) -> bool {
        self.compiled.get().is_some()
    }
}

/// Everything automod needs to know about one guild.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomodConfig {
    pub enabled: bool,
    pub spam: SpamRule,
    pub invite: InviteRule,
    pub mention: MentionRule,
    pub links: LinksRule,
    pub words: WordsRule,
    pub sites: SitesRule,
}

impl AutomodConfig {
    /// Build the word and site matchers up front so no message pays for it.
    pub fn compile(&self) {
        self.words.compiled();
        self.sites.compiled();
    }

    pub fn settings(&self, kind: RuleKind) -> &RuleSettings {
        match kind {
            RuleKind::Spam => &self.spam.settings,
            RuleKind::Invite => &self.invite.settings,
            RuleKind::Mention => &self.mention.settings,
            RuleKind::Links => &self.links.settings,
            RuleKind::Words => &self.words.settings,
            RuleKind::Sites => &self.sites.settings,
        }
    }

    pub fn settings_mut(&mut self, kind: RuleKind) -> &mut RuleSettings {
        match kind {
            RuleKind::Spam => &mut self.spam.settings,
            RuleKind::Invite => &mut self.invite.settings,
            RuleKind::Mention => &mut self.mention.settings,
            RuleKind::Links => &mut self.links.settings,
            RuleKind::Words => &mut self.words.settings,
            RuleKind::Sites => &mut self.sites.settings,
        }
    }

    /// Add or remove a banned word. Returns false when nothing changed.
    pub fn set_banned_word(&mut self, word: &str, banned: bool) -> bool {
        let word = word.trim().to_lowercase();
        let changed = toggle_entry(&mut self.words.list, word, banned);
        if changed {
            self.words.compiled = OnceLock::new();
        }
        changed
    }

    pub fn set_banned_site(&mut self, domain: &str, banned: bool) -> bool {
        let changed = toggle_entry(&mut self.sites.list, normalize_domain(domain), banned);
        if changed {
            self.sites.compiled = OnceLock::new();
        }
        changed
    }

    pub fn set_allowed_domain(&mut self, domain: &str, allowed: bool) -> bool {
        toggle_entry(
            &mut self.links.allowed_domains,
            normalize_domain(domain),
            allowed,
        )
    }
}

fn toggle_entry(list: &mut Vec<String>, value: String, present: bool) -> bool {
    if value.is_empty() {
        return false;
    }
    let existing = list.iter().position(|v| *v == value);
    match (existing, present) {
        (None, true) => {
            list.push(value);
            true
        }
        (Some(idx), false) => {
            list.remove(idx);
            true
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_disabled() {
        let config = AutomodConfig::default();
        assert!(!config.enabled);
        assert!(RuleKind::ALL.iter().all(|k| !config.settings(*k).enabled));
    }

    #[test]
    fn test_level_for_thresholds() {
        let settings = RuleSettings {
            mute_after: 2,
            kick_after: 3,
            ban_after: 4,
            ..RuleSettings::enabled()
        };

        assert_eq!(settings.level_for(1), PunishmentLevel::Warn);
        assert_eq!(settings.level_for(2), PunishmentLevel::Mute);
        assert_eq!(settings.level_for(3), PunishmentLevel::Kick);
        assert_eq!(settings.level_for(9), PunishmentLevel::Ban);
    }

    #[test]
    fn test_zero_thresholds_never_escalate() {
        let settings = RuleSettings::enabled();
        assert_eq!(settings.level_for(100), PunishmentLevel::Warn);
    }

    #[test]
    fn test_matchers_compile_lazily() {
        let config = AutomodConfig {
            words: WordsRule::new(RuleSettings::enabled(), vec!["spam".into()]),
            ..Default::default()
        };

        assert!(!config.words.is_compiled());
        assert!(!config.sites.is_compiled());
        config.compile();
        assert!(config.words.is_compiled());
        assert!(config.sites.is_compiled());
        assert_eq!(config.words.compiled().find("this is spam"), Some("spam"));
    }

    #[test]
    fn test_builtin_lists_are_opt_in() {
        let words = WordsRule::new(RuleSettings::enabled(), Vec::new());
        assert!(words.compiled().is_empty());

        let words = words.with_builtin_list(true);
        assert!(!words.compiled().is_empty());
        assert_eq!(words.compiled().find("oh shit"), Some("shit"));
    }

    #[test]
    fn test_editing_lists_resets_compiled_matcher() {
        let mut config = AutomodConfig::default();
        config.compile();

        assert!(config.set_banned_word("Spam", true));
        assert!(!config.words.is_compiled());
        assert!(!config.set_banned_word("spam", true));
        assert_eq!(config.words.compiled().find("spam"), Some("spam"));

        assert!(config.set_banned_site("www.grabify.link", true));
        assert_eq!(config.sites.list, vec!["grabify.link"]);
        assert!(config.set_banned_site("grabify.link", false));
        assert!(config.sites.list.is_empty());
    }

    #[test]
    fn test_compiled_matcher_is_not_serialized() {
        let config = AutomodConfig {
            enabled: true,
            words: WordsRule::new(RuleSettings::enabled(), vec!["spam".into()]),
            ..Default::default()
        };
        config.compile();

        let json = serde_json::to_string(&config).unwrap();
        let restored: AutomodConfig = serde_json::from_str(&json).unwrap();

        assert!(restored.enabled);
        assert_eq!(restored.words.list, vec!["spam"]);
        assert!(!restored.words.is_compiled());
    }
}
