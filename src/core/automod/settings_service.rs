// Automod settings service - reads and edits stored configs.
//
// Every successful save publishes a `ConfigChanged` event so the cache
// listener evicts the guild's compiled config.

use super::automod_config::AutomodConfig;
use super::automod_models::{AutomodError, ConfigChanged};
use super::config_cache::AutomodConfigStore;
use std::sync::Arc;
use tokio::sync::broadcast;

pub struct AutomodSettingsService<S: AutomodConfigStore> {
    store: Arc<S>,
    changes: broadcast::Sender<ConfigChanged>,
}

impl<S: AutomodConfigStore> AutomodSettingsService<S> {
    pub fn new(store: Arc<S>, changes: broadcast::Sender<ConfigChanged>) -> Self {
        Self { store, changes }
    }

    /// The stored config, or the default (disabled) one.
    pub async fn get_config(&self, guild_id: u64) -> Result<AutomodConfig, AutomodError> {
        Ok(self.store.load(guild_id).await?.unwrap_or_default())
    }

    /// Load, edit, save and announce. Returns the saved config.
    pub async fn update<F>(&self, guild_id: u64, edit: F) -> Result<AutomodConfig, AutomodError>
    where
        F: FnOnce(&mut AutomodConfig) + Send,
    {
        let mut config = self.get_config(guild_id).await?;
        edit(&mut config);
        self.store.save(guild_id, &config).await?;
        self.notify(guild_id);
        Ok(config)
    }

    pub async fn set_enabled(&self, guild_id: u64, enabled: bool) -> Result<(), AutomodError> {
        self.update(guild_id, |config| config.enabled = enabled)
            .await
            .map(|_| ())
    }

    /// Announce a change made outside this service (e.g. a dashboard write).
    pub fn notify(&self, guild_id: u64) {
        // Sending only fails when nobody listens, which is fine.
        if self.changes.send(ConfigChanged { guild_id }).is_err() {
            tracing::debug!(guild_id, "No automod cache listener for config change");
        }
    }
}
