// Process-wide cache of compiled automod configs.
//
// Entries live until something invalidates them: there is no TTL. Changes
// arrive as `ConfigChanged` events on a broadcast channel, which the
// `InvalidationListener` turns into evictions.

use super::automod_config::AutomodConfig;
use super::automod_models::{AutomodError, ConfigChanged};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

// ============================================================================
// STORAGE TRAIT (PORT)
// ============================================================================

#[async_trait]
pub trait AutomodConfigStore: Send + Sync {
    /// Load the stored config, `None` if the guild never saved one.
    async fn load(&self, guild_id: u64) -> Result<Option<AutomodConfig>, AutomodError>;

    async fn save(&self, guild_id: u64, config: &AutomodConfig) -> Result<(), AutomodError>;
}

// ============================================================================
// CACHE
// ============================================================================

/// One guild's slot. The generation is bumped on every invalidation so a
/// load that started earlier can tell it must not repopulate the slot.
#[derive(Default)]
struct CacheSlot {
    generation: u64,
    config: Option<Arc<AutomodConfig>>,
}

pub struct ConfigCache<S: AutomodConfigStore> {
    store: Arc<S>,
    entries: DashMap<u64, CacheSlot>,
}

impl<S: AutomodConfigStore> ConfigCache<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            entries: DashMap::new(),
        }
    }

    /// Cached config for the guild, loading and compiling it on a miss.
    ///
    /// Load failures are returned and never cached.
    pub async fn get(&self, guild_id: u64) -> Result<Arc<AutomodConfig>, AutomodError> {
        // The slot exists before the load starts so an invalidation racing it
        // bumps the generation. Keep the shard guard scoped: it must not be
        // held across the load.
        let generation = {
            let slot = self.entries.entry(guild_id).or_default();
            match &slot.config {
                Some(config) => return Ok(Arc::clone(config)),
                None => slot.generation,
            }
        };

        let config = self
            .store
            .load(guild_id)
            .await
            .map_err(|e| AutomodError::ConfigLoad(e.to_string()))?
            .unwrap_or_default();
        config.compile();
        let config = Arc::new(config);

        let mut slot = self.entries.entry(guild_id).or_default();
        if slot.generation == generation {
            slot.config = Some(Arc::clone(&config));
        } else {
            tracing::debug!(guild_id, "Automod config invalidated during load, not caching");
        }

        tracing::debug!(guild_id, enabled = config.enabled, "Loaded automod config");
        Ok(config)
    }

    /// Drop the cached config for a guild. Guilds never loaded are left alone.
    pub fn invalidate(&self, guild_id: u64) {
        if let Some(mut slot) = self.entries.get_mut(&guild_id) {
            slot.generation += 1;
            slot.config = None;
        }
    }

    /// Drop every cached config.
    pub fn invalidate_all(&self) {
        for mut slot in self.entries.iter_mut() {
            slot.generation += 1;
            slot.config = None;
        }
    }

    /// Number of guilds with a live cached config.
    #[cfg(test)]
    pub fn cached_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|slot| slot.config.is_some())
            .count()
    }

    #[cfg(test)]
    fn slot_count(&self) -> usize {
        self.entries.len()
    }
}

// ============================================================================
// INVALIDATION LISTENER
// ============================================================================

/// Evicts cache entries when a guild's settings change.
pub struct InvalidationListener<S: AutomodConfigStore> {
    cache: Arc<ConfigCache<S>>,
    events: broadcast::Receiver<ConfigChanged>,
}

impl<S: AutomodConfigStore + 'static> InvalidationListener<S> {
    pub fn new(cache: Arc<ConfigCache<S>>, events: broadcast::Receiver<ConfigChanged>) -> Self {
        Self { cache, events }
    }

    /// Process events until every sender is gone.
    pub async fn run(mut self) {
        loop {
            match self.events.recv().await {
                Ok(event) => {
                    tracing::debug!(guild_id = event.guild_id, "Invalidating automod config");
                    self.cache.invalidate(event.guild_id);
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    // We can't know which guilds the missed events named.
                    tracing::warn!(missed, "Automod invalidation listener lagged, clearing cache");
                    self.cache.invalidate_all();
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Automod invalidation channel closed, listener stopping");
                    break;
                }
            }
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}

// ============================================================================
// TESTS
// ============================================================================
