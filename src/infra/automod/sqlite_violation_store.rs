// SQLite-backed violation history for automod escalation.
//
// Tables:
// - automod_violations: one row per violation, with its expiry as a unix timestamp

use crate::core::automod::{AutomodError, RuleKind, ViolationStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Row, Sqlite};

pub struct SqliteViolationStore {
    pool: Pool<Sqlite>,
}

impl SqliteViolationStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Run database migrations to create required tables.
    pub async fn migrate(&self) -> Result<(), AutomodError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS automod_violations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                guild_id INTEGER NOT NULL,
                user_id INTEGER NOT NULL,
                rule TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_automod_violations_member
                ON automod_violations(guild_id, user_id, rule, expires_at);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| AutomodError::Storage(e.to_string()))?;

        Ok(())
    }

    async fn push_violation_at(
        &self,
        guild_id: u64,
        user_id: u64,
        rule: RuleKind,
        expire_secs: u64,
        now: DateTime<Utc>,
    ) -> Result<u32, AutomodError> {
        let now_ts = now.timestamp();
        let expires_at = now_ts.saturating_add(expire_secs as i64);

        sqlx::query(
            r#"
            INSERT INTO automod_violations (guild_id, user_id, rule, created_at, expires_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(guild_id as i64)
        .bind(user_id as i64)
        .bind(rule.key())
        .bind(now_ts)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AutomodError::Storage(e.to_string()))?;

        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS live
            FROM automod_violations
            WHERE guild_id = ? AND user_id = ? AND rule = ? AND expires_at > ?
            "#,
        )
        .bind(guild_id as i64)
        .bind(user_id as i64)
        .bind(rule.key())
        .bind(now_ts)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AutomodError::Storage(e.to_string()))?;

        let live: i64 = row.get("live");
        Ok(live as u32)
    }
}

#[async_trait]
impl ViolationStore for SqliteViolationStore {
    async fn push_violation(
        &self,
        guild_id: u64,
        user_id: u64,
        rule: RuleKind,
        expire_secs: u64,
    ) -> Result<u32, AutomodError> {
        self.push_violation_at(guild_id, user_id, rule, expire_secs, Utc::now())
            .await
    }

    async fn clear_violations(&self, guild_id: u64, user_id: u64) -> Result<(), AutomodError> {
        sqlx::query("DELETE FROM automod_violations WHERE guild_id = ? AND user_id = ?")
            .bind(guild_id as i64)
            .bind(user_id as i64)
            .execute(&self.pool)
            .await
            .map_err(|e| AutomodError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<u64, AutomodError> {
        let result = sqlx::query("DELETE FROM automod_violations WHERE expires_at <= ?")
            .bind(now.timestamp())
            .execute(&self.pool)
            .await
            .map_err(|e| AutomodError::Storage(e.to_string()))?;

        Ok(result.rows_affected())
    }
}
