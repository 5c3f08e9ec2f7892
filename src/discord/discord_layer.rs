// Discord layer - commands and event handlers.

#[path = "automod/mod.rs"]
pub mod automod;

use crate::core::automod::{AutomodService, AutomodSettingsService};
use crate::infra::automod::{SqliteAutomodConfigStore, SqliteViolationStore};
use std::sync::Arc;

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;

/// Data that's shared across all commands and event handlers.
pub struct Data {
    pub automod: Arc<AutomodService<SqliteAutomodConfigStore, SqliteViolationStore>>,
    pub settings: Arc<AutomodSettingsService<SqliteAutomodConfigStore>>,
}

/// Every slash command the bot registers.
pub fn commands() -> Vec<poise::Command<Data, Error>> {
    vec![automod::commands::automod()]
}
