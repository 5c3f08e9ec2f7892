use crate::core::automod::{MessageSnapshot, PipelineOutcome};
use crate::discord::automod::guild_state::{to_utc, SerenityGuildState};
use crate::discord::automod::moderation_actions::SerenityModerationActions;
use crate::discord::Data;
use chrono::Utc;
use poise::serenity_prelude::{self as serenity, Context};
use std::sync::Arc;

pub fn message_snapshot(msg: &serenity::Message) -> MessageSnapshot {
    MessageSnapshot {
        id: msg.id.get(),
        channel_id: msg.channel_id.get(),
        guild_id: msg.guild_id.map(|id| id.get()),
        author_id: msg.author.id.get(),
        content: msg.content.clone(),
        mention_user_ids: msg.mentions.iter().map(|u| u.id.get()).collect(),
        mention_role_ids: msg.mention_roles.iter().map(|r| r.get()).collect(),
        timestamp: to_utc(&msg.timestamp),
    }
}

/// Build a snapshot from a partial update when the full message was not cached.
///
/// Returns `None` for updates without an author or content (embed unfurls).
pub fn update_snapshot(event: &serenity::MessageUpdateEvent) -> Option<MessageSnapshot> {
    let author = event.author.as_ref()?;
    let content = event.content.clone()?;

    Some(MessageSnapshot {
        id: event.id.get(),
        channel_id: event.channel_id.get(),
        guild_id: event.guild_id.map(|id| id.get()),
        author_id: author.id.get(),
        content,
        mention_user_ids: event
            .mentions
            .as_ref()
            .map(|users| users.iter().map(|u| u.id.get()).collect())
            .unwrap_or_default(),
        mention_role_ids: event
            .mention_roles
            .as_ref()
            .map(|roles| roles.iter().map(|r| r.get()).collect())
            .unwrap_or_default(),
        timestamp: event
            .edited_timestamp
            .as_ref()
            .map(to_utc)
            .unwrap_or_else(Utc::now),
    })
}

/// Embed unfurls and other system updates carry no edit timestamp or content.
pub fn is_user_edit(edited_timestamp: Option<&serenity::Timestamp>, content: Option<&str>) -> bool {
    edited_timestamp.is_some() && content.is_some()
}

pub async fn handle_message_create(ctx: &Context, data: &Data, msg: &serenity::Message) {
    let message = message_snapshot(msg);
    let state = SerenityGuildState::new(ctx);
    let actions = SerenityModerationActions::new(Arc::clone(&ctx.http));

    let outcome = data
        .automod
        .on_message_create(&message, &state, &actions)
        .await;
    log_outcome(&message, &outcome);
}

pub async fn handle_message_update(
    ctx: &Context,
    data: &Data,
    new: Option<&serenity::Message>,
    event: &serenity::MessageUpdateEvent,
) {
    if !is_user_edit(event.edited_timestamp.as_ref(), event.content.as_deref()) {
        return;
    }

    let message = match new.map(message_snapshot).or_else(|| update_snapshot(event)) {
        Some(message) => message,
        None => return,
    };
    let state = SerenityGuildState::new(ctx);
    let actions = SerenityModerationActions::new(Arc::clone(&ctx.http));

    let outcome = data
        .automod
        .on_message_update(&message, &state, &actions)
        .await;
    log_outcome(&message, &outcome);
}

fn log_outcome(message: &MessageSnapshot, outcome: &PipelineOutcome) {
    if let PipelineOutcome::Enforced(aggregate) = outcome {
        tracing::info!(
            guild_id = ?message.guild_id,
            channel_id = message.channel_id,
            user_id = message.author_id,
            level = %aggregate.level,
            "Automod enforced: {}",
            aggregate.reasons.join("; ")
        );
    }
}
