// Automod slash commands for configuration.
//
// Every edit goes through the settings service, which saves the config and
// announces the change so the cached copy is dropped.

use crate::core::automod::{AutomodConfig, RuleKind, RuleSettings, ViolationStore};
use crate::discord::{Context, Error};
use poise::serenity_prelude as serenity;

#[derive(Debug, Clone, Copy, poise::ChoiceParameter)]
pub enum RuleChoice {
    #[name = "Spam"]
    Spam,
    #[name = "Invites"]
    Invite,
    #[name = "Mention Spam"]
    Mention,
    #[name = "Links"]
    Links,
    #[name = "Banned Words"]
    Words,
    #[name = "Banned Sites"]
    Sites,
}

impl From<RuleChoice> for RuleKind {
    fn from(choice: RuleChoice) -> Self {
        match choice {
            RuleChoice::Spam => RuleKind::Spam,
            RuleChoice::Invite => RuleKind::Invite,
            RuleChoice::Mention => RuleKind::Mention,
            RuleChoice::Links => RuleKind::Links,
            RuleChoice::Words => RuleKind::Words,
            RuleChoice::Sites => RuleKind::Sites,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, poise::ChoiceParameter)]
pub enum ListAction {
    #[name = "Add"]
    Add,
    #[name = "Remove"]
    Remove,
}

fn guild(ctx: &Context<'_>) -> Result<u64, Error> {
    Ok(ctx.guild_id().ok_or("Must be used in a server")?.get())
}

async fn edit_config<F>(ctx: &Context<'_>, edit: F) -> Result<AutomodConfig, Error>
where
    F: FnOnce(&mut AutomodConfig) + Send,
{
    let guild_id = guild(ctx)?;
    ctx.data()
        .settings
        .update(guild_id, edit)
        .await
        .map_err(|e| Error::from(e.to_string()))
}

fn escalation_summary(settings: &RuleSettings) -> String {
    let tier = |after: u32| {
        if after == 0 {
            "off".to_string()
        } else {
            after.to_string()
        }
    };
    format!(
        "mute after {} ({}m), kick after {}, ban after {}; violations expire after {}m",
        tier(settings.mute_after),
        settings.mute_duration_secs / 60,
        tier(settings.kick_after),
        tier(settings.ban_after),
        settings.violations_expire_secs / 60
    )
}

fn rule_details(config: &AutomodConfig, kind: RuleKind) -> String {
    match kind {
        RuleKind::Spam => format!(
            "{} messages / {} seconds",
            config.spam.max_messages, config.spam.within_secs
        ),
        RuleKind::Invite => "Server invites".to_string(),
        RuleKind::Mention => format!("{} mentions per message", config.mention.threshold),
        RuleKind::Links => format!("{} allowed domains", config.links.allowed_domains.len()),
        RuleKind::Words => format!(
            "{} custom words{}",
            config.words.list.len(),
            if config.words.builtin_swear_words {
                " + built-in list"
            } else {
                ""
            }
        ),
        RuleKind::Sites => format!(
            "{} custom sites{}",
            config.sites.list.len(),
            if config.sites.builtin_bad_sites {
                " + built-in list"
            } else {
                ""
            }
        ),
    }
}

/// Automoderator configuration commands.
///
/// Configure the automod rules for your server.
#[poise::command(
    slash_command,
    subcommands(
        "status",
        "enable",
        "disable",
        "rule",
        "escalation",
        "ignore",
        "word",
        "site",
        "allow_link",
        "limits",
        "builtins",
        "pardon"
    ),
    required_permissions = "MANAGE_GUILD",
    guild_only
)]
pub async fn automod(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Show the automod status and every rule's settings.
#[poise::command(slash_command, guild_only)]
pub async fn status(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = guild(&ctx)?;
    let config = ctx
        .data()
        .settings
        .get_config(guild_id)
        .await
        .map_err(|e| Error::from(e.to_string()))?;

    let mut embed = serenity::CreateEmbed::new()
        .title("🛡️ Automod Status")
        .color(if config.enabled { 0x00FF00 } else { 0xFF0000 })
        .field(
            "Status",
            if config.enabled {
                "✅ Enabled"
            } else {
                "❌ Disabled"
            },
            false,
        );

    for kind in RuleKind::ALL {
        let settings = config.settings(kind);
        let mut value = format!(
            "{} {}\n{}",
            if settings.enabled { "✅" } else { "❌" },
            rule_details(&config, kind),
            escalation_summary(settings)
        );
        if let Some(role) = settings.ignore_role {
            value.push_str(&format!("\nIgnores <@&{}>", role));
        }
        if !settings.ignore_channels.is_empty() {
            let channels: Vec<String> = settings
                .ignore_channels
                .iter()
                .map(|c| format!("<#{}>", c))
                .collect();
            value.push_str(&format!("\nIgnored in {}", channels.join(", ")));
        }
        embed = embed.field(kind.to_string(), value, false);
    }

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Enable automod for this server.
#[poise::command(slash_command, guild_only)]
pub async fn enable(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = guild(&ctx)?;
    ctx.data()
        .settings
        .set_enabled(guild_id, true)
        .await
        .map_err(|e| Error::from(e.to_string()))?;

    ctx.say("✅ Automod has been **enabled**.").await?;
    Ok(())
}

/// Disable automod for this server.
#[poise::command(slash_command, guild_only)]
pub async fn disable(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = guild(&ctx)?;
    ctx.data()
        .settings
        .set_enabled(guild_id, false)
        .await
        .map_err(|e| Error::from(e.to_string()))?;

    ctx.say("❌ Automod has been **disabled**.").await?;
    Ok(())
}

/// Turn a single rule on or off.
#[poise::command(slash_command, guild_only)]
pub async fn rule(
    ctx: Context<'_>,
    #[description = "Rule to change"] rule: RuleChoice,
    #[description = "Whether the rule is active"] enabled: bool,
) -> Result<(), Error> {
    let kind = RuleKind::from(rule);
    edit_config(&ctx, |config| config.settings_mut(kind).enabled = enabled).await?;

    ctx.say(format!(
        "{} **{}** has been {}.",
        if enabled { "✅" } else { "❌" },
        kind,
        if enabled { "enabled" } else { "disabled" }
    ))
    .await?;
    Ok(())
}

/// Configure how repeated violations of a rule are punished.
#[poise::command(slash_command, guild_only)]
pub async fn escalation(
    ctx: Context<'_>,
    #[description = "Rule to change"] rule: RuleChoice,
    #[description = "Violations before a mute (0 = never)"] mute_after: Option<u32>,
    #[description = "Mute duration in minutes"]
    #[min = 1]
    #[max = 40320]
    mute_minutes: Option<u64>,
    #[description = "Violations before a kick (0 = never)"] kick_after: Option<u32>,
    #[description = "Violations before a ban (0 = never)"] ban_after: Option<u32>,
    #[description = "Minutes a violation keeps counting"]
    #[min = 1]
    expire_minutes: Option<u64>,
) -> Result<(), Error> {
    let kind = RuleKind::from(rule);
    let config = edit_config(&ctx, |config| {
        let settings = config.settings_mut(kind);
        if let Some(v) = mute_after {
            settings.mute_after = v;
        }
        if let Some(v) = mute_minutes {
            settings.mute_duration_secs = v * 60;
        }
        if let Some(v) = kick_after {
            settings.kick_after = v;
        }
        if let Some(v) = ban_after {
            settings.ban_after = v;
        }
        if let Some(v) = expire_minutes {
            settings.violations_expire_secs = v * 60;
        }
    })
    .await?;

    ctx.say(format!(
        "✅ **{}**: {}",
        kind,
        escalation_summary(config.settings(kind))
    ))
    .await?;
    Ok(())
}

/// Exempt a role, or toggle a channel exemption, for a rule.
#[poise::command(slash_command, guild_only)]
pub async fn ignore(
    ctx: Context<'_>,
    #[description = "Rule to change"] rule: RuleChoice,
    #[description = "Members with this role bypass the rule"] role: Option<serenity::Role>,
    #[description = "Clear the ignored role"] clear_role: Option<bool>,
    #[description = "Toggle this channel's exemption"] channel: Option<serenity::GuildChannel>,
) -> Result<(), Error> {
    let kind = RuleKind::from(rule);
    let role_id = role.map(|r| r.id.get());
    let channel_id = channel.map(|c| c.id.get());

    let config = edit_config(&ctx, |config| {
        let settings = config.settings_mut(kind);
        if clear_role == Some(true) {
            settings.ignore_role = None;
        }
        if role_id.is_some() {
            settings.ignore_role = role_id;
        }
        if let Some(id) = channel_id {
            if let Some(pos) = settings.ignore_channels.iter().position(|c| *c == id) {
                settings.ignore_channels.remove(pos);
            } else {
                settings.ignore_channels.push(id);
            }
        }
    })
    .await?;

    let settings = config.settings(kind);
    ctx.say(format!(
        "✅ **{}** ignores role {} and {} channel(s).",
        kind,
        settings
            .ignore_role
            .map(|r| format!("<@&{}>", r))
            .unwrap_or_else(|| "none".to_string()),
        settings.ignore_channels.len()
    ))
    .await?;
    Ok(())
}

/// Add or remove a banned word.
#[poise::command(slash_command, guild_only)]
pub async fn word(
    ctx: Context<'_>,
    #[description = "Add or remove"] action: ListAction,
    #[description = "The word"] word: String,
) -> Result<(), Error> {
    let mut changed = false;
    edit_config(&ctx, |config| {
        changed = config.set_banned_word(&word, action == ListAction::Add)
    })
    .await?;

    reply_list_change(&ctx, "banned words", &word, action, changed).await
}

/// Add or remove a banned site. Subdomains are matched too.
#[poise::command(slash_command, guild_only)]
pub async fn site(
    ctx: Context<'_>,
    #[description = "Add or remove"] action: ListAction,
    #[description = "Domain, e.g. example.com"] domain: String,
) -> Result<(), Error> {
    let mut changed = false;
    edit_config(&ctx, |config| {
        changed = config.set_banned_site(&domain, action == ListAction::Add)
    })
    .await?;

    reply_list_change(&ctx, "banned sites", &domain, action, changed).await
}

/// Add or remove a domain the links rule allows.
#[poise::command(slash_command, guild_only)]
pub async fn allow_link(
    ctx: Context<'_>,
    #[description = "Add or remove"] action: ListAction,
    #[description = "Domain, e.g. example.com"] domain: String,
) -> Result<(), Error> {
    let mut changed = false;
    edit_config(&ctx, |config| {
        changed = config.set_allowed_domain(&domain, action == ListAction::Add)
    })
    .await?;

    reply_list_change(&ctx, "allowed link domains", &domain, action, changed).await
}

async fn reply_list_change(
    ctx: &Context<'_>,
    list: &str,
    value: &str,
    action: ListAction,
    changed: bool,
) -> Result<(), Error> {
    let text = match (action, changed) {
        (ListAction::Add, true) => format!("✅ Added `{}` to {}.", value, list),
        (ListAction::Remove, true) => format!("✅ Removed `{}` from {}.", value, list),
        (ListAction::Add, false) => format!("`{}` is already in {}.", value, list),
        (ListAction::Remove, false) => format!("`{}` is not in {}.", value, list),
    };
    ctx.say(text).await?;
    Ok(())
}

/// Adjust the spam and mention thresholds.
#[poise::command(slash_command, guild_only)]
pub async fn limits(
    ctx: Context<'_>,
    #[description = "Messages allowed within the spam window"]
    #[min = 1]
    spam_messages: Option<u32>,
    #[description = "Spam window in seconds"]
    #[min = 1]
    #[max = 300]
    spam_seconds: Option<u64>,
    #[description = "Mentions in one message that count as mention spam"]
    #[min = 1]
    mentions: Option<u32>,
) -> Result<(), Error> {
    let config = edit_config(&ctx, |config| {
        if let Some(v) = spam_messages {
            config.spam.max_messages = v;
        }
        if let Some(v) = spam_seconds {
            config.spam.within_secs = v;
        }
        if let Some(v) = mentions {
            config.mention.threshold = v;
        }
    })
    .await?;

    ctx.say(format!(
        "✅ Spam: {}\nMentions: {}",
        rule_details(&config, RuleKind::Spam),
        rule_details(&config, RuleKind::Mention)
    ))
    .await?;
    Ok(())
}

/// Toggle the built-in swear word and IP logger lists.
#[poise::command(slash_command, guild_only)]
pub async fn builtins(
    ctx: Context<'_>,
    #[description = "Use the built-in swear word list"] swear_words: Option<bool>,
    #[description = "Use the built-in IP logger site list"] bad_sites: Option<bool>,
) -> Result<(), Error> {
    let config = edit_config(&ctx, |config| {
        if let Some(v) = swear_words {
            config.words.builtin_swear_words = v;
        }
        if let Some(v) = bad_sites {
            config.sites.builtin_bad_sites = v;
        }
    })
    .await?;

    ctx.say(format!(
        "✅ Words: {}\nSites: {}",
        rule_details(&config, RuleKind::Words),
        rule_details(&config, RuleKind::Sites)
    ))
    .await?;
    Ok(())
}

/// Forget a member's automod violations.
#[poise::command(slash_command, guild_only)]
pub async fn pardon(
    ctx: Context<'_>,
    #[description = "Member to pardon"] user: serenity::User,
) -> Result<(), Error> {
    let guild_id = guild(&ctx)?;
    ctx.data()
        .automod
        .violations()
        .clear_violations(guild_id, user.id.get())
        .await
        .map_err(|e| Error::from(e.to_string()))?;

    ctx.say(format!("✅ Cleared all automod violations for <@{}>.", user.id))
        .await?;
    Ok(())
}
