//! # planwise-db: Table Store for Planwise
//!
//! Durable, queryable storage for every record table, backed by SQLite
//! through sqlx.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Planwise Data Flow                               │
//! │                                                                         │
//! │  UI shell (save / delete)            Sync engine (snapshot)            │
//! │       │                                    ▲                            │
//! │       ▼                                    │ dataset modified           │
//! │  ┌─────────────────────────────────────────┴───────────────────────┐   │
//! │  │                     planwise-db (THIS CRATE)                    │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │               │    │  (embedded)  │  │   │
//! │  │   │ SqlitePool    │◄───│ TableStore    │    │ 001_initial  │  │   │
//! │  │   │ ChangeSignal  │    │ Snapshot      │    │ _schema.sql  │  │   │
//! │  │   │               │    │ Settings      │    │              │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite file in the platform data directory                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool and the `Database` handle
//! - [`migrations`] - Embedded database migrations
//! - [`changes`] - Dataset modified signal
//! - [`error`] - Database error types
//! - [`repository`] - Table store, snapshot/restore, settings
//!
//! ## Usage
//!
//! ```rust,ignore
//! use planwise_db::{Database, DbConfig, ListFilter};
//!
//! let db = Database::new(DbConfig::new("planwise.db")).await?;
//!
//! let person = db.people().save(json!({ "name": "Alex" })).await?;
//! let theirs = db
//!     .expenses()
//!     .list(Some(&ListFilter::new("personId", person.id())))
//!     .await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod changes;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use changes::ChangeSignal;
pub use error::{DbError, DbResult};
pub use migrations::MigrationStatus;
pub use pool::{Database, DbConfig};

pub use repository::records::{ListFilter, TableStore};
pub use repository::settings::SettingsRepository;
pub use repository::snapshot::{Snapshot, SnapshotRepository};
