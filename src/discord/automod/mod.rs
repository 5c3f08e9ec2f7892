// Discord side of automod: serenity adapters for the core ports, event
// handlers and the /automod commands.

pub mod commands;
pub mod events;
pub mod guild_state;
pub mod moderation_actions;
