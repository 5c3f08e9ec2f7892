// SQLite-backed automod config store.
//
// Tables:
// - automod_config: one JSON document per guild

use crate::core::automod::{AutomodConfig, AutomodConfigStore, AutomodError};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Row, Sqlite};

pub struct SqliteAutomodConfigStore {
    pool: Pool<Sqlite>,
}

impl SqliteAutomodConfigStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Run database migrations to create required tables.
    pub async fn migrate(&self) -> Result<(), AutomodError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS automod_config (
                guild_id INTEGER PRIMARY KEY,
                config TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| AutomodError::Storage(e.to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl AutomodConfigStore for SqliteAutomodConfigStore {
    async fn load(&self, guild_id: u64) -> Result<Option<AutomodConfig>, AutomodError> {
        let row = sqlx::query("SELECT config FROM automod_config WHERE guild_id = ?")
            .bind(guild_id as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AutomodError::Storage(e.to_string()))?;

        match row {
            Some(row) => {
                let raw: String = row.get("config");
                let config = serde_json::from_str(&raw).map_err(|e| {
                    AutomodError::Storage(format!("corrupt config for guild {}: {}", guild_id, e))
                })?;
                Ok(Some(config))
            }
            None => Ok(None),
        }
    }

    async fn save(&self, guild_id: u64, config: &AutomodConfig) -> Result<(), AutomodError> {
        let raw =
            serde_json::to_string(config).map_err(|e| AutomodError::Storage(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO automod_config (guild_id, config, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(guild_id) DO UPDATE SET
                config = excluded.config,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(guild_id as i64)
        .bind(raw)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| AutomodError::Storage(e.to_string()))?;
        Ok(())
    }
}
