//! # Schema Migrations
//!
//! The store's tables come from SQL files under `migrations/sqlite/`,
//! compiled into the binary by `sqlx::migrate!`.
//!
//! ```text
//! Database::new ──► run_migrations ──► _sqlx_migrations bookkeeping
//!                                         │
//!                                         └── 001_initial_schema.sql
//!                                               records   (every table, JSON payload)
//!                                               settings  (persisted auth state)
//! ```
//!
//! Applied files are checksummed; editing one after release makes startup
//! fail. Schema changes go in a new `NNN_description.sql`.

use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::DbResult;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations/sqlite");

/// Embedded versus applied migrations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    /// Versions compiled into the binary.
    pub embedded: Vec<i64>,
    /// Versions recorded as applied, ascending.
    pub applied: Vec<i64>,
}

impl MigrationStatus {
    /// Embedded versions not applied yet.
    pub fn pending(&self) -> Vec<i64> {
        self.embedded
            .iter()
            .copied()
            .filter(|v| !self.applied.contains(v))
            .collect()
    }

    pub fn is_current(&self) -> bool {
        self.pending().is_empty()
    }
}

/// Applies every pending migration. Safe to call on an up-to-date store.
pub async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
    let before = migration_status(pool).await?;
    let pending = before.pending();
    if pending.is_empty() {
        debug!(applied = before.applied.len(), "Schema is current");
        return Ok(());
    }

    info!(?pending, "Applying migrations");
    MIGRATOR.run(pool).await?;
    info!(count = pending.len(), "Migrations applied");
    Ok(())
}

/// Reads the bookkeeping table. A store that never ran a migration reports
/// nothing applied.
pub async fn migration_status(pool: &SqlitePool) -> DbResult<MigrationStatus> {
    let embedded = MIGRATOR.iter().map(|m| m.version).collect();

    let has_table: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = '_sqlx_migrations'",
    )
    .fetch_one(pool)
    .await?;

    let applied = if has_table == 0 {
        Vec::new()
    } else {
        sqlx::query_scalar(
            "SELECT version FROM _sqlx_migrations WHERE success = 1 ORDER BY version ASC",
        )
        .fetch_all(pool)
        .await?
    };

    Ok(MigrationStatus { embedded, applied })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    #[tokio::test]
    async fn test_fresh_store_has_pending_schema() {
        let db = Database::new(DbConfig::in_memory().run_migrations(false))
            .await
            .unwrap();

        let status = migration_status(db.pool()).await.unwrap();
        assert!(status.applied.is_empty());
        assert_eq!(status.pending(), vec![1]);
        assert!(!status.is_current());
    }

    #[tokio::test]
    async fn test_run_is_idempotent() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        run_migrations(db.pool()).await.unwrap();

        let status = migration_status(db.pool()).await.unwrap();
        assert!(status.is_current());
        assert_eq!(status.applied, vec![1]);
    }

    #[tokio::test]
    async fn test_status_reports_query_failure() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.close().await;

        assert!(migration_status(db.pool()).await.is_err());
    }
}
