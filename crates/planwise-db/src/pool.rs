//! # Database Pool Management
//!
//! Connection pool creation and configuration for SQLite.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Database Connection Pool                           │
//! │                                                                         │
//! │  App startup                                                           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DbConfig::new(path) ← Configure pool settings                         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Database::new(config).await ← Create pool + run migrations            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────┐   ┌──────────────────┐    │
//! │  │            SqlitePool                    │   │   ChangeSignal   │    │
//! │  │  ┌─────┐ ┌─────┐ ┌─────┐                │   │  (generation)    │    │
//! │  │  │Conn1│ │Conn2│ │Conn3│ ...            │   └──────────────────┘    │
//! │  │  └─────┘ └─────┘ └─────┘                │     shared by every       │
//! │  └─────────────────────────────────────────┘     TableStore            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## WAL Mode
//! SQLite WAL (Write-Ahead Logging) lets the sync engine take a snapshot
//! while the UI keeps writing.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::changes::ChangeSignal;
use crate::error::{DbError, DbResult};
use crate::migrations;
use crate::repository::records::TableStore;
use crate::repository::settings::SettingsRepository;
use crate::repository::snapshot::SnapshotRepository;
use planwise_core::{cost_report, ReportPlan, TableName};

// =============================================================================
// Configuration
// =============================================================================

/// Database configuration.
///
/// ## Example
/// ```rust,ignore
/// let config = DbConfig::new("/path/to/planwise.db")
///     .max_connections(4)
///     .min_connections(1);
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Path to the SQLite database file.
    pub database_path: PathBuf,

    /// Maximum number of connections in the pool.
    /// Default: 4 (one writer, a few readers)
    pub max_connections: u32,

    /// Minimum number of connections to keep alive.
    /// Default: 1
    pub min_connections: u32,

    /// Connection timeout duration.
    /// Default: 30 seconds
    pub connect_timeout: Duration,

    /// Idle timeout before closing a connection.
    /// Default: 10 minutes
    pub idle_timeout: Duration,

    /// How long a writer waits for another connection's write lock.
    /// Default: 5 seconds
    pub busy_timeout: Duration,

    /// Whether to run migrations on connect.
    /// Default: true
    pub run_migrations: bool,
}

impl DbConfig {
    /// Creates a configuration for the database file at `path`.
    /// The file is created if it doesn't exist.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 4,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            busy_timeout: Duration::from_secs(5),
            run_migrations: true,
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    /// Creates an in-memory database configuration (for testing).
    ///
    /// The single connection is the whole database: it is never idled out,
    /// and every repository shares it.
    pub fn in_memory() -> Self {
        DbConfig {
            database_path: PathBuf::from(":memory:"),
            max_connections: 1, // In-memory requires single connection
            min_connections: 1,
            connect_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(3600),
            busy_timeout: Duration::from_secs(5),
            run_migrations: true,
        }
    }
}

// =============================================================================
// Write Transactions
// =============================================================================

/// Opens a transaction that holds the write lock from its first statement.
///
/// A deferred `BEGIN` that reads before writing has to upgrade its lock
/// later, and in WAL mode that upgrade fails with `SQLITE_BUSY` without
/// waiting when another connection committed in between. `BEGIN IMMEDIATE`
/// takes the lock up front, where the busy timeout applies.
pub(crate) async fn begin_write(pool: &SqlitePool) -> DbResult<Transaction<'static, Sqlite>> {
    pool.begin_with("BEGIN IMMEDIATE")
        .await
        .map_err(|e| DbError::TransactionFailed(e.to_string()))
}

// =============================================================================
// Database
// =============================================================================

/// Main database handle providing repository access.
///
/// Cloning is cheap; clones share the pool and the change signal.
///
/// ## Usage
/// ```rust,ignore
/// let db = Database::new(DbConfig::new("./planwise.db")).await?;
///
/// let person = db.people().save(json!({ "name": "Alex" })).await?;
/// let snapshot = db.snapshots().snapshot_all().await?;
/// ```
#[derive(Debug, Clone)]
pub struct Database {
    /// The SQLite connection pool.
    pool: SqlitePool,

    /// Raised after every committed save/delete/restore.
    changes: ChangeSignal,
}

impl Database {
    /// Creates a new database connection pool.
    ///
    /// ## What This Does
    /// 1. Creates the database file if it doesn't exist
    /// 2. Configures SQLite: WAL journal, NORMAL synchronous
    /// 3. Creates the connection pool
    /// 4. Runs migrations (if enabled)
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!(
            path = %config.database_path.display(),
            "Initializing database connection"
        );

        // sqlite://path creates file if not exists
        let connect_url = format!("sqlite://{}?mode=rwc", config.database_path.display());

        let connect_options = SqliteConnectOptions::from_str(&connect_url)
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
            // Readers don't block writers, writers don't block readers
            .journal_mode(SqliteJournalMode::Wal)
            // May lose the last transaction on power loss, never corrupts
            .synchronous(SqliteSynchronous::Normal)
            // Concurrent writers queue on the lock instead of failing
            .busy_timeout(config.busy_timeout)
            .create_if_missing(true);

        debug!("Connection options configured");

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout)
            .idle_timeout(Some(config.idle_timeout))
            .connect_with(connect_options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        info!(
            max_connections = config.max_connections,
            "Database pool created"
        );

        let db = Database {
            pool,
            changes: ChangeSignal::new(),
        };

        if config.run_migrations {
            db.run_migrations().await?;
        }

        Ok(db)
    }

    /// Runs pending migrations. Idempotent.
    pub async fn run_migrations(&self) -> DbResult<()> {
        info!("Running database migrations");
        migrations::run_migrations(&self.pool).await?;
        info!("Migrations complete");
        Ok(())
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // -------------------------------------------------------------------------
    // Repositories
    // -------------------------------------------------------------------------

    /// Returns the store for `table`.
    pub fn table(&self, table: TableName) -> TableStore {
        TableStore::new(self.pool.clone(), table, self.changes.clone())
    }

    pub fn plans(&self) -> TableStore {
        self.table(TableName::Plan)
    }

    pub fn people(&self) -> TableStore {
        self.table(TableName::Person)
    }

    pub fn categories(&self) -> TableStore {
        self.table(TableName::Category)
    }

    pub fn expenses(&self) -> TableStore {
        self.table(TableName::Expense)
    }

    pub fn coverages(&self) -> TableStore {
        self.table(TableName::Coverage)
    }

    /// Returns the snapshot/restore repository.
    pub fn snapshots(&self) -> SnapshotRepository {
        SnapshotRepository::new(self.pool.clone(), self.changes.clone())
    }

    /// Returns the persisted settings repository.
    pub fn settings(&self) -> SettingsRepository {
        SettingsRepository::new(self.pool.clone())
    }

    // -------------------------------------------------------------------------
    // Change Signal
    // -------------------------------------------------------------------------

    /// Subscribes to the dataset modified signal.
    pub fn subscribe_changes(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    pub fn changes(&self) -> &ChangeSignal {
        &self.changes
    }

    // -------------------------------------------------------------------------
    // Derived Views
    // -------------------------------------------------------------------------

    /// Builds the yearly cost report from live plans, expenses and coverages.
    pub async fn cost_report(&self) -> DbResult<Vec<ReportPlan>> {
        let mut records = self.plans().list(None).await?;
        records.extend(self.expenses().list(None).await?);
        records.extend(self.coverages().list(None).await?);
        Ok(cost_report(&records))
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Closes the pool. Every later operation fails.
    pub async fn close(&self) {
        info!("Closing database connection pool");
        self.pool.close().await;
    }

    /// Checks if the database can execute queries.
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrations::migration_status;
    use serde_json::json;

    #[tokio::test]
    async fn test_in_memory_database() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        assert!(db.health_check().await);
        assert!(migration_status(db.pool()).await.unwrap().is_current());
    }

    #[tokio::test]
    async fn test_config_builder() {
        let config = DbConfig::new("/tmp/planwise-test.db")
            .max_connections(10)
            .min_connections(2)
            .run_migrations(false);

        assert_eq!(config.max_connections, 10);
        assert_eq!(config.min_connections, 2);
        assert!(!config.run_migrations);
    }

    #[tokio::test]
    async fn test_tables_are_isolated() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let person = db.people().save(json!({ "name": "Casey" })).await.unwrap();

        assert!(db.categories().get(person.id()).await.is_err());
        assert_eq!(db.categories().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cost_report_over_stored_records() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let limit = json!({
            "deductible": 0,
            "familyDeductible": 0,
            "outOfPocketMax": 10000,
            "familyOutOfPocketMax": 20000,
        });
        let plan = db
            .plans()
            .save(json!({
                "name": "Bronze",
                "premium": 100,
                "inNetworkLimit": limit.clone(),
                "outOfNetworkLimit": limit,
            }))
            .await
            .unwrap();
        let person = db.people().save(json!({ "name": "Avery" })).await.unwrap();
        let category = db.categories().save(json!({ "name": "Therapy" })).await.unwrap();
        db.expenses()
            .save(json!({
                "name": "Sessions",
                "personId": person.id(),
                "categoryId": category.id(),
                "amount": 50,
                "months": [1, 2, 3],
            }))
            .await
            .unwrap();

        let report = db.cost_report().await.unwrap();
        assert_eq!(report.len(), 1);
        assert_eq!(report[0].plan_id, plan.id());
        assert_eq!(report[0].expenses.to_string(), "$150.00");
        assert_eq!(report[0].total.to_string(), "$1350.00");
    }

    #[tokio::test]
    async fn test_close() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.close().await;
        assert!(!db.health_check().await);
    }
}
