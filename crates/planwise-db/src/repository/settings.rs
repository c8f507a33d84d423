//! # Settings Repository
//!
//! Durable key/value storage for small pieces of local state that survive a
//! restart (auth token, cached profile, login hint). Values are JSON.
//!
//! Settings are not records: writing one does not raise the dataset
//! modified signal and settings are never part of a backup.

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{debug, warn};

use crate::error::DbResult;
use planwise_core::format_timestamp;

/// Repository for persisted settings.
#[derive(Debug, Clone)]
pub struct SettingsRepository {
    pool: SqlitePool,
}

impl SettingsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SettingsRepository { pool }
    }

    /// Reads and deserializes a setting.
    ///
    /// A value that no longer deserializes (older format) is logged and
    /// treated as absent.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> DbResult<Option<T>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        let Some((raw,)) = row else {
            return Ok(None);
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!(key = %key, error = %e, "Ignoring unreadable setting");
                Ok(None)
            }
        }
    }

    /// Serializes and stores a setting, replacing any previous value.
    pub async fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> DbResult<()> {
        let raw = serde_json::to_string(value)?;

        sqlx::query(
            r#"
            INSERT INTO settings (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT (key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(&raw)
        .bind(format_timestamp(&Utc::now()))
        .execute(&self.pool)
        .await?;

        debug!(key = %key, "Setting stored");
        Ok(())
    }

    /// Removes a setting. Removing a missing key is not an error.
    pub async fn remove(&self, key: &str) -> DbResult<()> {
        sqlx::query("DELETE FROM settings WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await?;

        debug!(key = %key, "Setting removed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::pool::{Database, DbConfig};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Token {
        access_token: String,
        expires_in: u64,
    }

    #[tokio::test]
    async fn test_set_get_remove() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let settings = db.settings();

        assert_eq!(settings.get_json::<Token>("authToken").await.unwrap(), None);

        let token = Token {
            access_token: "abc".into(),
            expires_in: 3600,
        };
        settings.set_json("authToken", &token).await.unwrap();
        assert_eq!(
            settings.get_json::<Token>("authToken").await.unwrap(),
            Some(token)
        );

        settings.remove("authToken").await.unwrap();
        settings.remove("authToken").await.unwrap();
        assert_eq!(settings.get_json::<Token>("authToken").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unreadable_value_is_absent() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.settings().set_json("authToken", "just a string").await.unwrap();

        assert_eq!(db.settings().get_json::<Token>("authToken").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_settings_do_not_signal_changes() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.settings().set_json("credentialHint", "hint").await.unwrap();
        assert_eq!(db.changes().generation(), 0);
    }
}
