// Serenity-backed implementation of the automod `GuildState` port.
//
// Lookups go to the guild's entry in the serenity cache first and fall back
// to the HTTP API. Guild refs are never held across an await: they are
// converted to plain domain structs inside a single statement or scope.

use crate::core::automod::{
    AutomodError, ChannelInfo, GuildInfo, GuildState, HistoryEntry, MemberInfo, StateSnapshot,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use poise::serenity_prelude as serenity;
use std::sync::Arc;

pub struct SerenityGuildState {
    cache: Arc<serenity::Cache>,
    http: Arc<serenity::Http>,
    bot_id: u64,
}

impl SerenityGuildState {
    pub fn new(ctx: &serenity::Context) -> Self {
        Self {
            cache: Arc::clone(&ctx.cache),
            http: Arc::clone(&ctx.http),
            bot_id: ctx.cache.current_user().id.get(),
        }
    }
}

pub fn to_utc(timestamp: &serenity::Timestamp) -> DateTime<Utc> {
    DateTime::from_timestamp(timestamp.unix_timestamp(), 0).unwrap_or_else(Utc::now)
}

fn guild_channel_info(channel: &serenity::GuildChannel) -> ChannelInfo {
    ChannelInfo {
        id: channel.id.get(),
        guild_id: Some(channel.guild_id.get()),
        name: channel.name.clone(),
        is_private: false,
    }
}

/// Text channels live in `channels`, active threads in `threads`.
fn cached_channel(guild: &serenity::Guild, channel_id: serenity::ChannelId) -> Option<ChannelInfo> {
    guild
        .channels
        .get(&channel_id)
        .or_else(|| guild.threads.iter().find(|t| t.id == channel_id))
        .map(guild_channel_info)
}

fn member_info(member: &serenity::Member) -> MemberInfo {
    MemberInfo {
        guild_id: member.guild_id.get(),
        user_id: member.user.id.get(),
        display_name: member.display_name().to_string(),
        role_ids: member.roles.iter().map(|r| r.get()).collect(),
    }
}

fn lookup_error(what: &str, id: u64, err: serenity::Error) -> AutomodError {
    AutomodError::ContextResolution(format!("{} {}: {}", what, id, err))
}

#[async_trait]
impl GuildState for SerenityGuildState {
    fn bot_user_id(&self) -> u64 {
        self.bot_id
    }

    async fn resolve_channel(
        &self,
        guild_id: u64,
        channel_id: u64,
    ) -> Result<ChannelInfo, AutomodError> {
        let id = serenity::ChannelId::new(channel_id);
        let cached = self
            .cache
            .guild(serenity::GuildId::new(guild_id))
            .and_then(|guild| cached_channel(&guild, id));
        if let Some(info) = cached {
            return Ok(info);
        }

        match id.to_channel(&self.http).await {
            Ok(serenity::Channel::Guild(channel)) => Ok(guild_channel_info(&channel)),
            Ok(serenity::Channel::Private(channel)) => Ok(ChannelInfo {
                id: channel.id.get(),
                guild_id: None,
                name: channel.name(),
                is_private: true,
            }),
            Ok(_) => Err(AutomodError::ContextResolution(format!(
                "channel {} has an unsupported type",
                channel_id
            ))),
            Err(e) => Err(lookup_error("channel", channel_id, e)),
        }
    }

    async fn resolve_guild(&self, guild_id: u64) -> Result<GuildInfo, AutomodError> {
        let id = serenity::GuildId::new(guild_id);
        let cached = self.cache.guild(id).map(|g| GuildInfo {
            id: guild_id,
            name: g.name.clone(),
        });
        if let Some(info) = cached {
            return Ok(info);
        }

        let guild = self
            .http
            .get_guild(id)
            .await
            .map_err(|e| lookup_error("guild", guild_id, e))?;
        Ok(GuildInfo {
            id: guild_id,
            name: guild.name,
        })
    }

    async fn resolve_member(
        &self,
        guild_id: u64,
        user_id: u64,
    ) -> Result<MemberInfo, AutomodError> {
        let guild = serenity::GuildId::new(guild_id);
        let user = serenity::UserId::new(user_id);
        let cached = self
            .cache
            .guild(guild)
            .and_then(|g| g.members.get(&user).map(member_info));
        if let Some(info) = cached {
            return Ok(info);
        }

        let member = self
            .http
            .get_member(guild, user)
            .await
            .map_err(|e| lookup_error("member", user_id, e))?;
        Ok(member_info(&member))
    }

    fn snapshot(
        &self,
        channel: &ChannelInfo,
        member: &MemberInfo,
    ) -> Result<StateSnapshot, AutomodError> {
        // Member and channel come from one read guard on the guild entry.
        let (channel, member) = match self.cache.guild(serenity::GuildId::new(member.guild_id)) {
            Some(guild) => (
                cached_channel(&guild, serenity::ChannelId::new(channel.id))
                    .unwrap_or_else(|| channel.clone()),
                guild
                    .members
                    .get(&serenity::UserId::new(member.user_id))
                    .map(member_info)
                    .unwrap_or_else(|| member.clone()),
            ),
            None => (channel.clone(), member.clone()),
        };

        // History is kept outside the guild entry and read after its guard drops.
        let recent_messages = self
            .cache
            .channel_messages(serenity::ChannelId::new(channel.id))
            .map(|messages| {
                messages
                    .values()
                    .map(|m| HistoryEntry {
                        message_id: m.id.get(),
                        author_id: m.author.id.get(),
                        timestamp: to_utc(&m.timestamp),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(StateSnapshot {
            channel,
            member,
            recent_messages,
        })
    }
}
