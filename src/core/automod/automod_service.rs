// Automod service - evaluates every inbound message against a guild's rules.
//
// One call to `check_message` is one pipeline run:
// resolve context -> load config -> resolve member -> snapshot state ->
// run rules -> decide -> dispatch punishment -> delete message.
//
// Errors never leave the pipeline: they are logged and the run stops (or,
// for a single rule, that rule is skipped).
//
// NO Discord dependencies here - the platform is reached through the
// `GuildState` and `ModerationActions` ports.

use super::automod_config::AutomodConfig;
use super::automod_models::{
    AggregateOutcome, AutomodError, ChannelInfo, GuildInfo, MemberInfo, MessageSnapshot,
    PunishmentLevel, StateSnapshot,
};
use super::config_cache::{AutomodConfigStore, ConfigCache};
use super::rules::ViolationStore;
use async_trait::async_trait;
use std::sync::Arc;

// ============================================================================
// PLATFORM TRAITS (PORTS)
// ============================================================================

/// Read access to the chat platform's guild, channel and member state.
#[async_trait]
pub trait GuildState: Send + Sync {
    /// The bot's own user id. Its messages are never evaluated.
    fn bot_user_id(&self) -> u64;

    /// A channel (or thread) of the given guild.
    async fn resolve_channel(
        &self,
        guild_id: u64,
        channel_id: u64,
    ) -> Result<ChannelInfo, AutomodError>;

    async fn resolve_guild(&self, guild_id: u64) -> Result<GuildInfo, AutomodError>;

    async fn resolve_member(&self, guild_id: u64, user_id: u64)
        -> Result<MemberInfo, AutomodError>;

    /// Capture member, channel and recent history in one step.
    ///
    /// Synchronous, so no state lock can be held across an await.
    fn snapshot(
        &self,
        channel: &ChannelInfo,
        member: &MemberInfo,
    ) -> Result<StateSnapshot, AutomodError>;
}

/// The moderation actions automod can take.
#[async_trait]
pub trait ModerationActions: Send + Sync {
    /// Direct-message a warning to a user.
    async fn warn(&self, user_id: u64, text: &str) -> Result<(), AutomodError>;

    async fn mute(
        &self,
        guild_id: u64,
        channel_id: u64,
        actor_id: u64,
        target_id: u64,
        reason: &str,
        duration_secs: u64,
    ) -> Result<(), AutomodError>;

    async fn kick(
        &self,
        guild_id: u64,
        channel_id: u64,
        actor_id: u64,
        target_id: u64,
        reason: &str,
    ) -> Result<(), AutomodError>;

    async fn ban(
        &self,
        guild_id: u64,
        channel_id: u64,
        actor_id: u64,
        target_id: u64,
        reason: &str,
    ) -> Result<(), AutomodError>;

    async fn delete_message(&self, channel_id: u64, message_id: u64) -> Result<(), AutomodError>;
}

// ============================================================================
// PIPELINE OUTCOME
// ============================================================================

/// How a pipeline run ended. Mostly useful for logging and tests.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    /// Own message, private channel, or unknown channel/guild.
    Ignored,
    /// Automod is turned off for the guild.
    Disabled,
    /// Config or member could not be loaded.
    Aborted,
    /// No rule fired.
    Clean,
    /// At least one rule fired; the punishment was dispatched and the message deleted.
    Enforced(AggregateOutcome),
}

// ============================================================================
// CORE SERVICE
// ============================================================================

pub struct AutomodService<C: AutomodConfigStore, V: ViolationStore> {
    configs: Arc<ConfigCache<C>>,
    violations: V,
}

impl<C: AutomodConfigStore, V: ViolationStore> AutomodService<C, V> {
    pub fn new(configs: Arc<ConfigCache<C>>, violations: V) -> Self {
        Self {
            configs,
            violations,
        }
    }

    #[cfg(test)]
    pub fn configs(&self) -> &Arc<ConfigCache<C>> {
        &self.configs
    }

    pub fn violations(&self) -> &V {
        &self.violations
    }

    pub async fn on_message_create<G: GuildState, A: ModerationActions>(
        &self,
        message: &MessageSnapshot,
        state: &G,
        actions: &A,
    ) -> PipelineOutcome {
        self.check_message(message, state, actions).await
    }

    /// Edits get a full, independent run; nothing is deduplicated against the create.
    pub async fn on_message_update<G: GuildState, A: ModerationActions>(
        &self,
        message: &MessageSnapshot,
        state: &G,
        actions: &A,
    ) -> PipelineOutcome {
        self.check_message(message, state, actions).await
    }

    /// Run the whole pipeline for one message.
    pub async fn check_message<G: GuildState, A: ModerationActions>(
        &self,
        message: &MessageSnapshot,
        state: &G,
        actions: &A,
    ) -> PipelineOutcome {
        let bot_id = state.bot_user_id();
        if message.author_id == bot_id {
            return PipelineOutcome::Ignored;
        }

        // Direct messages have no guild rules; skip them before any lookup.
        let Some(guild_id) = message.guild_id else {
            return PipelineOutcome::Ignored;
        };

        let Some((channel, guild)) = Self::resolve_context(message, guild_id, state).await else {
            return PipelineOutcome::Ignored;
        };

        let config = match self.configs.get(guild.id).await {
            Ok(config) => config,
            Err(e) => {
                tracing::error!(guild_id = guild.id, "Failed retrieving automod config: {}", e);
                return PipelineOutcome::Aborted;
            }
        };

        if !config.enabled {
            return PipelineOutcome::Disabled;
        }

        let member = match state.resolve_member(guild.id, message.author_id).await {
            Ok(member) => member,
            Err(e) => {
                tracing::error!(
                    guild_id = guild.id,
                    user_id = message.author_id,
                    "Failed finding guild member: {}",
                    e
                );
                return PipelineOutcome::Aborted;
            }
        };

        // Rules run on this copy, never on live state.
        let snapshot = match state.snapshot(&channel, &member) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::error!(
                    guild_id = guild.id,
                    channel_id = channel.id,
                    "Failed capturing guild state: {}",
                    e
                );
                return PipelineOutcome::Aborted;
            }
        };

        let outcome = self.evaluate_rules(&config, message, &snapshot).await;
        if !outcome.delete {
            return PipelineOutcome::Clean;
        }

        tracing::info!(
            guild_id = guild.id,
            user_id = message.author_id,
            message_id = message.id,
            level = %outcome.level,
            violations = outcome.reasons.len(),
            "Automod rules triggered"
        );

        // Punish before deleting so the action's audit trail still has the message.
        if let Err(e) = Self::dispatch(&outcome, message, &guild, &channel, bot_id, actions).await
        {
            tracing::error!(
                guild_id = guild.id,
                user_id = message.author_id,
                "Error carrying out punishment: {}",
                e
            );
        }

        if let Err(e) = actions.delete_message(message.channel_id, message.id).await {
            tracing::error!(
                channel_id = message.channel_id,
                message_id = message.id,
                "Failed deleting message: {}",
                e
            );
        }

        PipelineOutcome::Enforced(outcome)
    }

    /// Channel and guild for the message; `None` aborts silently.
    async fn resolve_context<G: GuildState>(
        message: &MessageSnapshot,
        guild_id: u64,
        state: &G,
    ) -> Option<(ChannelInfo, GuildInfo)> {
        let channel = match state.resolve_channel(guild_id, message.channel_id).await {
            Ok(channel) => channel,
            Err(e) => {
                tracing::debug!(channel_id = message.channel_id, "Skipping automod: {}", e);
                return None;
            }
        };

        if channel.is_private {
            return None;
        }

        match state.resolve_guild(guild_id).await {
            Ok(guild) => Some((channel, guild)),
            Err(e) => {
                tracing::debug!(guild_id, "Skipping automod: {}", e);
                None
            }
        }
    }

    /// Run every rule in order against one snapshot and fold the results.
    async fn evaluate_rules(
        &self,
        config: &AutomodConfig,
        message: &MessageSnapshot,
        snapshot: &StateSnapshot,
    ) -> AggregateOutcome {
        let mut outcome = AggregateOutcome::default();

        for rule in config.rules() {
            if rule.should_ignore(snapshot) {
                continue;
            }

            match rule.check(message, snapshot, &self.violations).await {
                Ok(result) => outcome.record(result, rule.mute_duration()),
                Err(e) => {
                    tracing::error!(
                        rule = rule.kind().key(),
                        message_id = message.id,
                        "Failed checking automod rule: {}",
                        e
                    );
                }
            }
        }

        outcome
    }

    /// Carry out exactly one action for the aggregate level.
    async fn dispatch<A: ModerationActions>(
        outcome: &AggregateOutcome,
        message: &MessageSnapshot,
        guild: &GuildInfo,
        channel: &ChannelInfo,
        bot_id: u64,
        actions: &A,
    ) -> Result<(), AutomodError> {
        let reasons = outcome.reason_text();
        let action_reason = format!("Automoderator: {}", reasons);

        match outcome.level {
            PunishmentLevel::None | PunishmentLevel::Warn => {
                actions
                    .warn(message.author_id, &warning_text(&guild.name, &reasons))
                    .await
            }
            PunishmentLevel::Mute => {
                actions
                    .mute(
                        guild.id,
                        channel.id,
                        bot_id,
                        message.author_id,
                        &action_reason,
                        outcome.mute_duration_secs,
                    )
                    .await
            }
            PunishmentLevel::Kick => {
                actions
                    .kick(guild.id, channel.id, bot_id, message.author_id, &action_reason)
                    .await
            }
            PunishmentLevel::Ban => {
                actions
                    .ban(guild.id, channel.id, bot_id, message.author_id, &action_reason)
                    .await
            }
        }
    }
}

/// DM sent for violations that don't escalate past a warning.
pub fn warning_text(guild_name: &str, reasons: &str) -> String {
    format!(
        "**Automoderator for {}, Rule violations:**\n{}\nRepeating this offence may cause you a kick, mute or ban.",
        guild_name, reasons
    )
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::automod::automod_config::{
        InviteRule, MentionRule, RuleKind, RuleSettings, SpamRule, WordsRule,
    };
    use crate::core::automod::automod_models::HistoryEntry;
    use chrono::{DateTime, Utc};
    use dashmap::DashMap;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Mutex, RwLock};

    const BOT: u64 = 1;
    const GUILD: u64 = 100;
    const CHANNEL: u64 = 200;
    const DM_CHANNEL: u64 = 201;
    const USER: u64 = 300;

    // ------------------------------------------------------------------------
    // Fakes
    // ------------------------------------------------------------------------

    struct MockConfigStore {
        configs: DashMap<u64, AutomodConfig>,
        fail: bool,
    }

    #[async_trait]
    impl AutomodConfigStore for MockConfigStore {
        async fn load(&self, guild_id: u64) -> Result<Option<AutomodConfig>, AutomodError> {
            if self.fail {
                return Err(AutomodError::Storage("connection refused".into()));
            }
            Ok(self.configs.get(&guild_id).map(|c| c.clone()))
        }

        async fn save(&self, guild_id: u64, config: &AutomodConfig) -> Result<(), AutomodError> {
            self.configs.insert(guild_id, config.clone());
            Ok(())
        }
    }

    struct MockViolationStore {
        counts: DashMap<(u64, u64, RuleKind), u32>,
        calls: AtomicUsize,
        fail_for: Option<RuleKind>,
    }

    #[async_trait]
    impl ViolationStore for MockViolationStore {
        async fn push_violation(
            &self,
            guild_id: u64,
            user_id: u64,
            rule: RuleKind,
            _expire_secs: u64,
        ) -> Result<u32, AutomodError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_for == Some(rule) {
                return Err(AutomodError::Storage("disk full".into()));
            }
            let mut count = self.counts.entry((guild_id, user_id, rule)).or_insert(0);
            *count += 1;
            Ok(*count)
        }

        async fn clear_violations(&self, _guild_id: u64, _user_id: u64) -> Result<(), AutomodError> {
            Ok(())
        }

        async fn cleanup_expired(&self, _now: DateTime<Utc>) -> Result<u64, AutomodError> {
            Ok(0)
        }
    }

    #[derive(Default)]
    struct PlatformData {
        channels: HashMap<u64, ChannelInfo>,
        guilds: HashMap<u64, GuildInfo>,
        members: HashMap<(u64, u64), MemberInfo>,
        history: HashMap<u64, Vec<HistoryEntry>>,
    }

    /// Platform state behind a readers-writer lock, like the real cache.
    struct FakeGuildState {
        data: RwLock<PlatformData>,
        snapshots: AtomicUsize,
        channel_lookups: AtomicUsize,
    }

    impl FakeGuildState {
        fn new() -> Self {
            let mut data = PlatformData::default();
            data.channels.insert(
                CHANNEL,
                ChannelInfo {
                    id: CHANNEL,
                    guild_id: Some(GUILD),
                    name: "general".into(),
                    is_private: false,
                },
            );
            data.channels.insert(
                DM_CHANNEL,
                ChannelInfo {
                    id: DM_CHANNEL,
                    guild_id: None,
                    name: "dm".into(),
                    is_private: true,
                },
            );
            data.guilds.insert(
                GUILD,
                GuildInfo {
                    id: GUILD,
                    name: "Rustaceans".into(),
                },
            );
            data.members.insert(
                (GUILD, USER),
                MemberInfo {
                    guild_id: GUILD,
                    user_id: USER,
                    display_name: "ferris".into(),
                    role_ids: vec![5],
                },
            );
            Self {
                data: RwLock::new(data),
                snapshots: AtomicUsize::new(0),
                channel_lookups: AtomicUsize::new(0),
            }
        }

        fn snapshots(&self) -> usize {
            self.snapshots.load(Ordering::SeqCst)
        }

        fn channel_lookups(&self) -> usize {
            self.channel_lookups.load(Ordering::SeqCst)
        }
    }

    fn not_found(what: &str) -> AutomodError {
        AutomodError::ContextResolution(format!("{} not found", what))
    }

    #[async_trait]
    impl GuildState for FakeGuildState {
        fn bot_user_id(&self) -> u64 {
            BOT
        }

        async fn resolve_channel(
            &self,
            guild_id: u64,
            channel_id: u64,
        ) -> Result<ChannelInfo, AutomodError> {
            self.channel_lookups.fetch_add(1, Ordering::SeqCst);
            let data = self.data.read().unwrap();
            data.channels
                .get(&channel_id)
                .filter(|c| c.guild_id.is_none() || c.guild_id == Some(guild_id))
                .cloned()
                .ok_or_else(|| not_found("channel"))
        }

        async fn resolve_guild(&self, guild_id: u64) -> Result<GuildInfo, AutomodError> {
            let data = self.data.read().unwrap();
            data.guilds
                .get(&guild_id)
                .cloned()
                .ok_or_else(|| not_found("guild"))
        }

        async fn resolve_member(
            &self,
            guild_id: u64,
            user_id: u64,
        ) -> Result<MemberInfo, AutomodError> {
            let data = self.data.read().unwrap();
            data.members
                .get(&(guild_id, user_id))
                .cloned()
                .ok_or_else(|| not_found("member"))
        }

        fn snapshot(
            &self,
            channel: &ChannelInfo,
            member: &MemberInfo,
        ) -> Result<StateSnapshot, AutomodError> {
            self.snapshots.fetch_add(1, Ordering::SeqCst);
            let data = self.data.read().unwrap();
            Ok(StateSnapshot {
                channel: data
                    .channels
                    .get(&channel.id)
                    .cloned()
                    .unwrap_or_else(|| channel.clone()),
                member: data
                    .members
                    .get(&(member.guild_id, member.user_id))
                    .cloned()
                    .unwrap_or_else(|| member.clone()),
                recent_messages: data.history.get(&channel.id).cloned().unwrap_or_default(),
            })
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    enum Action {
        Warn { user_id: u64, text: String },
        Mute { target_id: u64, reason: String, duration_secs: u64 },
        Kick { target_id: u64, reason: String },
        Ban { target_id: u64, reason: String },
        Delete { channel_id: u64, message_id: u64 },
    }

    /// Records every action in call order.
    #[derive(Default)]
    struct RecordingActions {
        log: Mutex<Vec<Action>>,
        fail_punishments: bool,
        fail_delete: bool,
    }

    impl RecordingActions {
        fn log(&self) -> Vec<Action> {
            self.log.lock().unwrap().clone()
        }

        fn push(&self, action: Action, fail: bool) -> Result<(), AutomodError> {
            self.log.lock().unwrap().push(action);
            if fail {
                Err(AutomodError::Dispatch("missing permissions".into()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl ModerationActions for RecordingActions {
        async fn warn(&self, user_id: u64, text: &str) -> Result<(), AutomodError> {
            self.push(
                Action::Warn {
                    user_id,
                    text: text.to_string(),
                },
                self.fail_punishments,
            )
        }

        async fn mute(
            &self,
            guild_id: u64,
            channel_id: u64,
            actor_id: u64,
            target_id: u64,
            reason: &str,
            duration_secs: u64,
        ) -> Result<(), AutomodError> {
            assert_eq!((guild_id, channel_id, actor_id), (GUILD, CHANNEL, BOT));
            self.push(
                Action::Mute {
                    target_id,
                    reason: reason.to_string(),
                    duration_secs,
                },
                self.fail_punishments,
            )
        }

        async fn kick(
            &self,
            guild_id: u64,
            channel_id: u64,
            actor_id: u64,
            target_id: u64,
            reason: &str,
        ) -> Result<(), AutomodError> {
            assert_eq!((guild_id, channel_id, actor_id), (GUILD, CHANNEL, BOT));
            self.push(
                Action::Kick {
                    target_id,
                    reason: reason.to_string(),
                },
                self.fail_punishments,
            )
        }

        async fn ban(
            &self,
            guild_id: u64,
            channel_id: u64,
            actor_id: u64,
            target_id: u64,
            reason: &str,
        ) -> Result<(), AutomodError> {
            assert_eq!((guild_id, channel_id, actor_id), (GUILD, CHANNEL, BOT));
            self.push(
                Action::Ban {
                    target_id,
                    reason: reason.to_string(),
                },
                self.fail_punishments,
            )
        }

        async fn delete_message(
            &self,
            channel_id: u64,
            message_id: u64,
        ) -> Result<(), AutomodError> {
            let fail = self.fail_delete;
            self.log.lock().unwrap().push(Action::Delete {
                channel_id,
                message_id,
            });
            if fail {
                Err(AutomodError::Delete("unknown message".into()))
            } else {
                Ok(())
            }
        }
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    fn service_with(
        config: Option<AutomodConfig>,
    ) -> AutomodService<MockConfigStore, MockViolationStore> {
        service_with_stores(config, false, None)
    }

    fn service_with_stores(
        config: Option<AutomodConfig>,
        config_fails: bool,
        violation_fails_for: Option<RuleKind>,
    ) -> AutomodService<MockConfigStore, MockViolationStore> {
        let configs = DashMap::new();
        if let Some(config) = config {
            configs.insert(GUILD, config);
        }
        let store = MockConfigStore {
            configs,
            fail: config_fails,
        };
        let violations = MockViolationStore {
            counts: DashMap::new(),
            calls: AtomicUsize::new(0),
            fail_for: violation_fails_for,
        };
        AutomodService::new(Arc::new(ConfigCache::new(Arc::new(store))), violations)
    }

    fn message(content: &str) -> MessageSnapshot {
        MessageSnapshot {
            id: 9000,
            channel_id: CHANNEL,
            guild_id: Some(GUILD),
            author_id: USER,
            content: content.to_string(),
            mention_user_ids: Vec::new(),
            mention_role_ids: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    fn words_config() -> AutomodConfig {
        AutomodConfig {
            enabled: true,
            words: WordsRule::new(RuleSettings::enabled(), vec!["spam".into()]),
            ..Default::default()
        }
    }

    /// Every rule enabled with a hair trigger, for messages that trip several at once.
    fn everything_config() -> AutomodConfig {
        AutomodConfig {
            enabled: true,
            spam: SpamRule {
                settings: RuleSettings {
                    mute_after: 1,
                    mute_duration_secs: 111,
                    ..RuleSettings::enabled()
                },
                max_messages: 0,
                within_secs: 60,
            },
            invite: InviteRule {
                settings: RuleSettings {
                    ban_after: 1,
                    mute_duration_secs: 222,
                    ..RuleSettings::enabled()
                },
            },
            mention: MentionRule {
                settings: RuleSettings {
                    mute_after: 1,
                    mute_duration_secs: 333,
                    ..RuleSettings::enabled()
                },
                threshold: 1,
            },
            ..Default::default()
        }
    }

    // ------------------------------------------------------------------------
    // Tests
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_banned_word_sends_dm_and_deletes() {
        let service = service_with(Some(words_config()));
        let state = FakeGuildState::new();
        let actions = RecordingActions::default();

        let outcome = service
            .check_message(&message("this is spam"), &state, &actions)
            .await;

        let aggregate = match outcome {
            PipelineOutcome::Enforced(aggregate) => aggregate,
            other => panic!("expected enforcement, got {:?}", other),
        };
        assert_eq!(aggregate.level, PunishmentLevel::Warn);
        assert_eq!(aggregate.reasons, vec!["Found word: spam"]);

        let log = actions.log();
        assert_eq!(log.len(), 2);
        match &log[0] {
            Action::Warn { user_id, text } => {
                assert_eq!(*user_id, USER);
                assert_eq!(
                    text,
                    "**Automoderator for Rustaceans, Rule violations:**\nFound word: spam\nRepeating this offence may cause you a kick, mute or ban."
                );
            }
            other => panic!("expected a warning first, got {:?}", other),
        }
        assert_eq!(
            log[1],
            Action::Delete {
                channel_id: CHANNEL,
                message_id: 9000
            }
        );
    }

    #[tokio::test]
    async fn test_disabled_config_has_no_side_effects() {
        let mut config = everything_config();
        config.enabled = false;
        let service = service_with(Some(config));
        let state = FakeGuildState::new();
        let actions = RecordingActions::default();

        let outcome = service
            .check_message(&message("discord.gg/abc spam"), &state, &actions)
            .await;

        assert_eq!(outcome, PipelineOutcome::Disabled);
        assert!(actions.log().is_empty());
        assert_eq!(state.snapshots(), 0);
        assert_eq!(service.violations().calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unconfigured_guild_is_disabled() {
        let service = service_with(None);
        let state = FakeGuildState::new();
        let actions = RecordingActions::default();

        let outcome = service
            .check_message(&message("anything"), &state, &actions)
            .await;
        assert_eq!(outcome, PipelineOutcome::Disabled);
    }

    #[tokio::test]
    async fn test_clean_message_is_left_alone() {
        let service = service_with(Some(words_config()));
        let state = FakeGuildState::new();
        let actions = RecordingActions::default();

        let outcome = service
            .check_message(&message("hello world"), &state, &actions)
            .await;

        assert_eq!(outcome, PipelineOutcome::Clean);
        assert!(actions.log().is_empty());
    }

    #[tokio::test]
    async fn test_own_messages_are_never_evaluated() {
        let service = service_with(Some(words_config()));
        let state = FakeGuildState::new();
        let actions = RecordingActions::default();
        let mut msg = message("this is spam");
        msg.author_id = BOT;

        let outcome = service.check_message(&msg, &state, &actions).await;

        assert_eq!(outcome, PipelineOutcome::Ignored);
        assert!(actions.log().is_empty());
        assert_eq!(service.configs().cached_count(), 0);
    }

    #[tokio::test]
    async fn test_private_and_unknown_channels_abort_silently() {
        let service = service_with(Some(words_config()));
        let state = FakeGuildState::new();
        let actions = RecordingActions::default();

        let mut dm = message("this is spam");
        dm.channel_id = DM_CHANNEL;
        dm.guild_id = None;
        assert_eq!(
            service.check_message(&dm, &state, &actions).await,
            PipelineOutcome::Ignored
        );
        // Guild-less messages never reach the platform lookups.
        assert_eq!(state.channel_lookups(), 0);

        let mut private = message("this is spam");
        private.channel_id = DM_CHANNEL;
        assert_eq!(
            service.check_message(&private, &state, &actions).await,
            PipelineOutcome::Ignored
        );

        let mut unknown = message("this is spam");
        unknown.channel_id = 4040;
        assert_eq!(
            service.check_message(&unknown, &state, &actions).await,
            PipelineOutcome::Ignored
        );

        assert!(actions.log().is_empty());
    }

    #[tokio::test]
    async fn test_config_load_failure_aborts() {
        let service = service_with_stores(Some(words_config()), true, None);
        let state = FakeGuildState::new();
        let actions = RecordingActions::default();

        let outcome = service
            .check_message(&message("this is spam"), &state, &actions)
            .await;

        assert_eq!(outcome, PipelineOutcome::Aborted);
        assert!(actions.log().is_empty());
    }

    #[tokio::test]
    async fn test_missing_member_aborts_without_punishment() {
        let service = service_with(Some(words_config()));
        let state = FakeGuildState::new();
        let actions = RecordingActions::default();
        let mut msg = message("this is spam");
        msg.author_id = 777;

        let outcome = service.check_message(&msg, &state, &actions).await;

        assert_eq!(outcome, PipelineOutcome::Aborted);
        assert!(actions.log().is_empty());
    }

    #[tokio::test]
    async fn test_highest_level_wins_with_first_duration() {
        let service = service_with(Some(everything_config()));
        let state = FakeGuildState::new();
        let actions = RecordingActions::default();
        let mut msg = message("join discord.gg/rust");
        msg.mention_user_ids = vec![42];

        let outcome = service.check_message(&msg, &state, &actions).await;

        let aggregate = match outcome {
            PipelineOutcome::Enforced(aggregate) => aggregate,
            other => panic!("expected enforcement, got {:?}", other),
        };
        // Spam (Mute) -> Invite (Ban) -> Mention (Mute)
        assert_eq!(aggregate.level, PunishmentLevel::Ban);
        assert_eq!(aggregate.mute_duration_secs, 222);
        assert_eq!(
            aggregate.reasons,
            vec![
                "Sent 1 messages in 60 seconds",
                "Sent a server invite: rust",
                "Sent a message with 1 mentions",
            ]
        );

        assert_eq!(
            actions.log(),
            vec![
                Action::Ban {
                    target_id: USER,
                    reason: "Automoderator: Sent 1 messages in 60 seconds\nSent a server invite: rust\nSent a message with 1 mentions".into(),
                },
                Action::Delete {
                    channel_id: CHANNEL,
                    message_id: 9000
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_mute_uses_first_rule_duration() {
        let mut config = everything_config();
        config.invite.settings.enabled = false;
        let service = service_with(Some(config));
        let state = FakeGuildState::new();
        let actions = RecordingActions::default();
        let mut msg = message("hey");
        msg.mention_role_ids = vec![9];

        service.check_message(&msg, &state, &actions).await;

        assert_eq!(
            actions.log()[0],
            Action::Mute {
                target_id: USER,
                reason: "Automoderator: Sent 1 messages in 60 seconds\nSent a message with 1 mentions"
                    .into(),
                duration_secs: 111,
            }
        );
    }

    #[tokio::test]
    async fn test_kick_dispatch() {
        let config = AutomodConfig {
            enabled: true,
            words: WordsRule::new(
                RuleSettings {
                    kick_after: 1,
                    ..RuleSettings::enabled()
                },
                vec!["spam".into()],
            ),
            ..Default::default()
        };
        let service = service_with(Some(config));
        let state = FakeGuildState::new();
        let actions = RecordingActions::default();

        service
            .check_message(&message("spam"), &state, &actions)
            .await;

        assert_eq!(
            actions.log()[0],
            Action::Kick {
                target_id: USER,
                reason: "Automoderator: Found word: spam".into(),
            }
        );
    }

    #[tokio::test]
    async fn test_rule_error_skips_only_that_rule() {
        let mut config = everything_config();
        config.words = WordsRule::new(RuleSettings::enabled(), vec!["spam".into()]);
        let service = service_with_stores(Some(config), false, Some(RuleKind::Invite));
        let state = FakeGuildState::new();
        let actions = RecordingActions::default();
        let mut msg = message("spam discord.gg/rust");
        msg.mention_user_ids = vec![42];

        let outcome = service.check_message(&msg, &state, &actions).await;

        let aggregate = match outcome {
            PipelineOutcome::Enforced(aggregate) => aggregate,
            other => panic!("expected enforcement, got {:?}", other),
        };
        assert_eq!(aggregate.level, PunishmentLevel::Mute);
        assert_eq!(aggregate.mute_duration_secs, 111);
        assert_eq!(
            aggregate.reasons,
            vec![
                "Sent 1 messages in 60 seconds",
                "Sent a message with 1 mentions",
                "Found word: spam",
            ]
        );
    }

    #[tokio::test]
    async fn test_bypass_role_skips_rule() {
        let mut config = words_config();
        config.words.settings.ignore_role = Some(5);
        let service = service_with(Some(config));
        let state = FakeGuildState::new();
        let actions = RecordingActions::default();

        let outcome = service
            .check_message(&message("this is spam"), &state, &actions)
            .await;

        assert_eq!(outcome, PipelineOutcome::Clean);
        assert_eq!(service.violations().calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_delete_still_happens_when_punishment_fails() {
        let service = service_with(Some(words_config()));
        let state = FakeGuildState::new();
        let actions = RecordingActions {
            fail_punishments: true,
            ..Default::default()
        };

        let outcome = service
            .check_message(&message("this is spam"), &state, &actions)
            .await;

        assert!(matches!(outcome, PipelineOutcome::Enforced(_)));
        let log = actions.log();
        assert!(matches!(log[0], Action::Warn { .. }));
        assert!(matches!(log[1], Action::Delete { .. }));
    }

    #[tokio::test]
    async fn test_delete_failure_is_not_fatal() {
        let service = service_with(Some(words_config()));
        let state = FakeGuildState::new();
        let actions = RecordingActions {
            fail_delete: true,
            ..Default::default()
        };

        let outcome = service
            .check_message(&message("this is spam"), &state, &actions)
            .await;

        assert!(matches!(outcome, PipelineOutcome::Enforced(_)));
        assert_eq!(actions.log().len(), 2);
    }

    #[tokio::test]
    async fn test_spam_rule_reads_channel_history_from_snapshot() {
        let config = AutomodConfig {
            enabled: true,
            spam: SpamRule {
                settings: RuleSettings::enabled(),
                max_messages: 2,
                within_secs: 10,
            },
            ..Default::default()
        };
        let service = service_with(Some(config));
        let state = FakeGuildState::new();
        let actions = RecordingActions::default();
        let msg = message("hi");
        {
            let mut data = state.data.write().unwrap();
            data.history.insert(
                CHANNEL,
                (1..=2)
                    .map(|i| HistoryEntry {
                        message_id: i,
                        author_id: USER,
                        timestamp: msg.timestamp - chrono::Duration::seconds(i as i64),
                    })
                    .collect(),
            );
        }

        let outcome = service.check_message(&msg, &state, &actions).await;

        assert!(matches!(outcome, PipelineOutcome::Enforced(_)));
        assert_eq!(state.snapshots(), 1);
    }

    #[tokio::test]
    async fn test_edit_runs_full_pipeline_again() {
        let service = service_with(Some(words_config()));
        let state = FakeGuildState::new();
        let actions = RecordingActions::default();
        let msg = message("this is spam");

        service.on_message_create(&msg, &state, &actions).await;
        service.on_message_update(&msg, &state, &actions).await;

        let warnings = actions
            .log()
            .iter()
            .filter(|a| matches!(a, Action::Warn { .. }))
            .count();
        assert_eq!(warnings, 2);
    }

    #[tokio::test]
    async fn test_dispatch_always_precedes_delete() {
        let service = service_with(Some(everything_config()));
        let state = FakeGuildState::new();

        for content in ["a", "discord.gg/x", "spam"] {
            let actions = RecordingActions::default();
            service
                .check_message(&message(content), &state, &actions)
                .await;

            let log = actions.log();
            assert_eq!(log.len(), 2);
            assert!(!matches!(log[0], Action::Delete { .. }));
            assert!(matches!(log[1], Action::Delete { .. }));
        }
    }
}
