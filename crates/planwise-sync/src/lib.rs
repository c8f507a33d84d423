//! # planwise-sync: Auth Session and Backup Sync for Planwise
//!
//! Keeps a remote backup of the local dataset up to date without blocking
//! the UI and without overlapping uploads.
//!
//! ## Sync Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Planwise Backup Architecture                       │
//! │                                                                         │
//! │  ┌──────────────┐  save / delete / restore                             │
//! │  │   UI shell   │──────────────────────────┐                           │
//! │  └──────┬───────┘                          ▼                           │
//! │         │ sign_in / sign_out       ┌───────────────┐                   │
//! │         ▼                          │  planwise-db  │                   │
//! │  ┌──────────────┐                  │  TableStore   │                   │
//! │  │ AppServices  │                  └───────┬───────┘                   │
//! │  └──────┬───────┘                          │ dataset modified          │
//! │         │                                  ▼                            │
//! │  ┌──────┴───────┐   access token   ┌───────────────┐                   │
//! │  │ AuthSession  │◄─────────────────│  SyncEngine   │                   │
//! │  └──────┬───────┘                  │  + Debouncer  │                   │
//! │         │                          └───────┬───────┘                   │
//! │         ▼                                  ▼                            │
//! │  ┌──────────────┐                  ┌───────────────┐                   │
//! │  │ AuthProvider │ (host)           │  BackupStore  │ (host)            │
//! │  └──────────────┘                  └───────────────┘                   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`config`] - TOML configuration with environment overrides
//! - [`error`] - Auth, sync and capability error types
//! - [`provider`] - Identity provider capability
//! - [`backup`] - Backup store capability and an in-memory store
//! - [`session`] - Auth session state machine
//! - [`scheduler`] - Single-slot debounce timer
//! - [`engine`] - Snapshot upload and the change watch loop
//! - [`services`] - Startup and teardown of the whole stack
//!
//! ## Usage
//!
//! ```rust,ignore
//! use planwise_sync::{AppConfig, AppServices};
//!
//! let services = AppServices::start(AppConfig::load_or_default(None), provider).await?;
//! services.attach_backup_store(drive).await;
//! services.sign_in().await?;
//!
//! services.database().people().save(json!({ "name": "Alex" })).await?;
//! // Ten quiet seconds later the backup is uploaded.
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod backup;
pub mod config;
pub mod engine;
pub mod error;
pub mod provider;
pub mod scheduler;
pub mod services;
pub mod session;

#[cfg(test)]
mod testing;

// =============================================================================
// Re-exports
// =============================================================================

pub use backup::{BackupObject, BackupStore, MemoryBackupStore, ObjectMetadata};
pub use config::{AppConfig, AuthSettings, StorageSettings, SyncSettings};
pub use engine::{SyncEngine, SyncEngineHandle, SyncOutcome, SyncStatus};
pub use error::{AuthError, BackupStoreError, ProviderError, SyncError, SyncResult};
pub use provider::{AuthProvider, Credential, Profile};
pub use scheduler::Debouncer;
pub use services::AppServices;
pub use session::{AuthSession, AuthToken, SessionState};
