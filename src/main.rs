// Entry point of the automoderator bot.
//
// **Architecture Overview:**
// - `core/` = Automod pipeline (platform-agnostic)
// - `infra/` = SQLite implementations of the core stores
// - `discord/` = Serenity adapters, event handlers and commands
//
// This file's job is to:
// 1. Load configuration
// 2. Initialize services (dependency injection)
// 3. Start the background tasks (cache invalidation, violation cleanup)
// 4. Set up the Discord framework

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with half a dozen mod.rs files that all look the same.
#[path = "core/core_layer.rs"]
mod core;
#[path = "discord/discord_layer.rs"]
mod discord;
#[path = "infra/infra_layer.rs"]
mod infra;

use crate::core::automod::{
    AutomodService, AutomodSettingsService, ConfigCache, InvalidationListener, ViolationStore,
};
use crate::discord::automod::events as automod_events;
use crate::discord::{Data, Error};
use crate::infra::automod::{SqliteAutomodConfigStore, SqliteViolationStore};
use anyhow::Context as _;
use poise::serenity_prelude as serenity;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

const DEFAULT_CACHE_MESSAGES: usize = 10000;
const CONFIG_EVENT_CAPACITY: usize = 256;
const VIOLATION_CLEANUP_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Event handler for non-command Discord events.
/// Message creates and edits both run the automod pipeline.
async fn event_handler(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    match event {
        serenity::FullEvent::Message { new_message } => {
            automod_events::handle_message_create(ctx, data, new_message).await;
        }
        serenity::FullEvent::MessageUpdate { new, event, .. } => {
            automod_events::handle_message_update(ctx, data, new.as_ref(), event).await;
        }
        _ => {}
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load .env file if present
    dotenv::dotenv().ok();

    // ========================================================================
    // CONFIGURATION
    // ========================================================================

    let token = std::env::var("DISCORD_TOKEN").context("Missing DISCORD_TOKEN environment variable")?;
    let data_dir = std::env::var("AUTOMOD_DATA_DIR").unwrap_or_else(|_| "data".to_string());
    let cache_messages = std::env::var("AUTOMOD_CACHE_MESSAGES")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(DEFAULT_CACHE_MESSAGES);

    // Keep runtime databases in a dedicated folder so the repo root stays tidy.
    std::fs::create_dir_all(&data_dir).context("Failed to create data directory")?;
    let db_path = format!("{}/automod.db", data_dir);

    // ========================================================================
    // DEPENDENCY INJECTION
    // ========================================================================

    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .connect(&format!("sqlite://{}?mode=rwc", db_path))
        .await
        .context("Failed to connect to automod DB")?;

    let config_store = Arc::new(SqliteAutomodConfigStore::new(pool.clone()));
    config_store
        .migrate()
        .await
        .context("Failed to migrate automod config table")?;

    let violation_store = SqliteViolationStore::new(pool);
    violation_store
        .migrate()
        .await
        .context("Failed to migrate automod violations table")?;

    // Config edits flow: settings service -> broadcast -> invalidation listener -> cache.
    let (config_changes, config_events) = broadcast::channel(CONFIG_EVENT_CAPACITY);
    let config_cache = Arc::new(ConfigCache::new(Arc::clone(&config_store)));
    InvalidationListener::new(Arc::clone(&config_cache), config_events).spawn();

    let automod_service = Arc::new(AutomodService::new(config_cache, violation_store));
    let settings_service = Arc::new(AutomodSettingsService::new(config_store, config_changes));

    // Expired violations never count, so this only keeps the table small.
    let cleanup_service = Arc::clone(&automod_service);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(VIOLATION_CLEANUP_INTERVAL);
        loop {
            interval.tick().await;
            match cleanup_service
                .violations()
                .cleanup_expired(chrono::Utc::now())
                .await
            {
                Ok(0) => {}
                Ok(removed) => tracing::debug!("Removed {} expired automod violations", removed),
                Err(e) => tracing::warn!("Automod violation cleanup failed: {}", e),
            }
        }
    });

    let data = Data {
        automod: automod_service,
        settings: settings_service,
    };

    // ========================================================================
    // DISCORD FRAMEWORK SETUP
    // ========================================================================

    let intents = serenity::GatewayIntents::GUILD_MESSAGES
        | serenity::GatewayIntents::MESSAGE_CONTENT // Required to read message content
        | serenity::GatewayIntents::GUILDS
        | serenity::GatewayIntents::GUILD_MEMBERS;

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: discord::commands(),
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler(ctx, event, framework, data))
            },
            ..Default::default()
        })
        .setup(|ctx, _ready, framework| {
            Box::pin(async move {
                tracing::info!("Bot is starting up...");

                // Global registration can take up to an hour to propagate.
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;

                tracing::info!("Commands registered, bot is ready");
                Ok(data)
            })
        })
        .build();

    // The spam rule reads recent channel history from the message cache.
    let mut settings = serenity::cache::Settings::default();
    settings.max_messages = cache_messages;

    let mut client = serenity::ClientBuilder::new(token, intents)
        .framework(framework)
        .cache_settings(settings)
        .await
        .context("Error creating client")?;

    client.start().await.context("Error running bot")?;
    Ok(())
}
