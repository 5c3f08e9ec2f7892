// Serenity-backed implementation of the automod `ModerationActions` port.
//
// Mutes are Discord timeouts; kicks and bans carry the automod reason into
// the audit log.

use crate::core::automod::{AutomodError, ModerationActions};
use async_trait::async_trait;
use chrono::Utc;
use poise::serenity_prelude as serenity;
use std::sync::Arc;

// Discord limits
const MAX_MESSAGE_LEN: usize = 2000;
const MAX_AUDIT_REASON_LEN: usize = 512;
const MAX_TIMEOUT_SECS: u64 = 28 * 24 * 60 * 60;
const MIN_TIMEOUT_SECS: u64 = 60;

pub struct SerenityModerationActions {
    http: Arc<serenity::Http>,
}

impl SerenityModerationActions {
    pub fn new(http: Arc<serenity::Http>) -> Self {
        Self { http }
    }
}

/// Cut `text` to at most `max` characters.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn dispatch_error(action: &str, err: serenity::Error) -> AutomodError {
    AutomodError::Dispatch(format!("{} failed: {}", action, err))
}

#[async_trait]
impl ModerationActions for SerenityModerationActions {
    async fn warn(&self, user_id: u64, text: &str) -> Result<(), AutomodError> {
        let dm = serenity::UserId::new(user_id)
            .create_dm_channel(&self.http)
            .await
            .map_err(|e| dispatch_error("opening DM", e))?;

        dm.say(&self.http, truncate_chars(text, MAX_MESSAGE_LEN))
            .await
            .map_err(|e| dispatch_error("sending warning", e))?;

        tracing::info!(user_id, "Sent automod warning");
        Ok(())
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
        let duration_secs = duration_secs.clamp(MIN_TIMEOUT_SECS, MAX_TIMEOUT_SECS);
        let until =
            serenity::Timestamp::from_unix_timestamp(Utc::now().timestamp() + duration_secs as i64)
                .map_err(|e| AutomodError::Dispatch(format!("bad timeout timestamp: {}", e)))?;

        serenity::GuildId::new(guild_id)
            .edit_member(
                &self.http,
                serenity::UserId::new(target_id),
                serenity::EditMember::new()
                    .disable_communication_until_datetime(until)
                    .audit_log_reason(truncate_chars(reason, MAX_AUDIT_REASON_LEN)),
            )
            .await
            .map_err(|e| dispatch_error("timeout", e))?;

        tracing::info!(
            guild_id,
            channel_id,
            actor_id,
            target_id,
            duration_secs,
            "Automod muted member"
        );
        Ok(())
    }

    async fn kick(
        &self,
        guild_id: u64,
        channel_id: u64,
        actor_id: u64,
        target_id: u64,
        reason: &str,
    ) -> Result<(), AutomodError> {
        serenity::GuildId::new(guild_id)
            .kick_with_reason(
                &self.http,
                serenity::UserId::new(target_id),
                truncate_chars(reason, MAX_AUDIT_REASON_LEN),
            )
            .await
            .map_err(|e| dispatch_error("kick", e))?;

        tracing::info!(guild_id, channel_id, actor_id, target_id, "Automod kicked member");
        Ok(())
    }

    async fn ban(
        &self,
        guild_id: u64,
        channel_id: u64,
        actor_id: u64,
        target_id: u64,
        reason: &str,
    ) -> Result<(), AutomodError> {
        // Keep message history: the offending message is deleted on its own.
        serenity::GuildId::new(guild_id)
            .ban_with_reason(
                &self.http,
                serenity::UserId::new(target_id),
                0,
                truncate_chars(reason, MAX_AUDIT_REASON_LEN),
            )
            .await
            .map_err(|e| dispatch_error("ban", e))?;

        tracing::info!(guild_id, channel_id, actor_id, target_id, "Automod banned member");
        Ok(())
    }

    async fn delete_message(&self, channel_id: u64, message_id: u64) -> Result<(), AutomodError> {
        serenity::ChannelId::new(channel_id)
            .delete_message(&self.http, serenity::MessageId::new(message_id))
            .await
            .map_err(|e| AutomodError::Delete(e.to_string()))
    }
}
