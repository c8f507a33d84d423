//! # Application Services
//!
//! The one object the UI shell holds: database, auth session and sync
//! engine, started together and torn down together.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  AppServices::start(config, provider)                                  │
//! │       │                                                                 │
//! │       ├── Database::new(config.db_config())                            │
//! │       ├── AuthSession::restore(..)      SignedIn if a token is stored  │
//! │       │       ├── spawn revalidate_profile()                           │
//! │       │       └── spawn run_expiry_watcher()                           │
//! │       └── SyncEngine::start()           watch loop                     │
//! │                                                                         │
//! │  sign_in()  ─► AuthSession::sign_in                                    │
//! │  sign_out() ─► cancel pending backup, AuthSession::sign_out            │
//! │  shutdown() ─► stop watch loop and watcher, close the pool             │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use planwise_db::Database;

use crate::backup::BackupStore;
use crate::config::AppConfig;
use crate::engine::{SyncEngine, SyncEngineHandle, SyncOutcome, SyncStatus};
use crate::error::SyncResult;
use crate::provider::AuthProvider;
use crate::session::{AuthSession, SessionState};

/// Application-state service injected into the UI shell.
#[derive(Debug)]
pub struct AppServices {
    config: AppConfig,
    db: Database,
    session: Arc<AuthSession>,
    engine: SyncEngine,
    engine_handle: SyncEngineHandle,
    watcher_shutdown: mpsc::Sender<()>,
}

impl AppServices {
    /// Opens the configured database and starts every service.
    pub async fn start(config: AppConfig, provider: Arc<dyn AuthProvider>) -> SyncResult<Self> {
        config.validate()?;
        let db = Database::new(config.db_config()).await?;
        Self::start_with_database(config, db, provider).await
    }

    /// Starts every service on an already open database.
    pub async fn start_with_database(
        config: AppConfig,
        db: Database,
        provider: Arc<dyn AuthProvider>,
    ) -> SyncResult<Self> {
        let session = Arc::new(
            AuthSession::restore(provider, db.settings(), config.auth.scopes.clone()).await?,
        );

        if session.state().is_signed_in() {
            let session = session.clone();
            tokio::spawn(async move {
                match session.revalidate_profile().await {
                    Ok(Some(profile)) => debug!(email = %profile.email, "Profile revalidated"),
                    Ok(None) => info!("Stored profile cleared"),
                    Err(e) => warn!(error = %e, "Profile revalidation failed"),
                }
            });
        }

        let (watcher_shutdown, watcher_rx) = mpsc::channel(1);
        tokio::spawn(session.clone().run_expiry_watcher(watcher_rx));

        let engine = SyncEngine::new(db.clone(), session.clone(), &config.sync);
        let engine_handle = engine.start();

        info!(
            state = %session.state(),
            debounce_secs = config.sync.debounce_secs,
            "Application services started"
        );

        Ok(AppServices {
            config,
            db,
            session,
            engine,
            engine_handle,
            watcher_shutdown,
        })
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// The table store surface for the UI.
    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn session(&self) -> &Arc<AuthSession> {
        &self.session
    }

    pub fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    pub async fn sync_status(&self) -> SyncStatus {
        self.engine.status().await
    }

    // -------------------------------------------------------------------------
    // Operations
    // -------------------------------------------------------------------------

    /// Initializes the backup store capability.
    pub async fn attach_backup_store(&self, store: Arc<dyn BackupStore>) {
        self.engine.attach_backup_store(store).await;
    }

    pub async fn sign_in(&self) -> SyncResult<()> {
        self.session.sign_in().await?;
        Ok(())
    }

    /// Drops the pending backup, then clears the session.
    pub async fn sign_out(&self) {
        self.engine.cancel_pending();
        self.session.sign_out().await;
    }

    /// Manual sync, as triggered from the UI.
    pub async fn sync_now(&self) -> SyncResult<SyncOutcome> {
        self.engine.sync().await
    }

    /// Stops background tasks and closes the database.
    pub async fn shutdown(self) {
        info!("Shutting down application services");
        self.engine_handle.shutdown().await;
        let _ = self.watcher_shutdown.send(()).await;
        self.db.close().await;
        info!("Application services stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::MemoryBackupStore;
    use crate::session::{AuthToken, AUTH_TOKEN_KEY};
    use crate::testing::MockProvider;
    use chrono::Utc;
    use planwise_db::DbConfig;
    use serde_json::json;
    use std::time::Duration;

    async fn start(db: Database, provider: Arc<MockProvider>) -> AppServices {
        AppServices::start_with_database(AppConfig::default(), db, provider)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_sign_in_sync_sign_out() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let provider = Arc::new(MockProvider::new());
        let services = start(db, provider.clone()).await;
        assert_eq!(services.session_state(), SessionState::SignedOut);

        let store = Arc::new(MemoryBackupStore::new());
        services.attach_backup_store(store.clone()).await;
        services.sign_in().await.unwrap();
        assert!(services.engine().is_sync_enabled().await);

        services
            .database()
            .people()
            .save(json!({ "name": "Alex" }))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let outcome = services.sync_now().await.unwrap();
        assert!(matches!(outcome, SyncOutcome::Uploaded { created: true, .. }));
        assert!(services.engine().is_pending());

        services.sign_out().await;
        assert_eq!(services.session_state(), SessionState::SignedOut);
        assert!(!services.engine().is_pending());
        assert!(!services.engine().is_sync_enabled().await);
        assert_eq!(services.sync_now().await.unwrap(), SyncOutcome::Disabled);

        services.shutdown().await;
    }

    #[tokio::test]
    async fn test_restores_session_and_revalidates_profile() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let token = AuthToken {
            access_token: "stored".into(),
            expires_at: Utc::now() + chrono::Duration::hours(1),
        };
        db.settings().set_json(AUTH_TOKEN_KEY, &token).await.unwrap();

        let services = start(db, Arc::new(MockProvider::new())).await;
        assert_eq!(services.session_state(), SessionState::SignedIn);

        // Profile arrives from the background check
        tokio::time::timeout(Duration::from_secs(2), async {
            while services.session().profile().await.is_none() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        services.shutdown().await;
    }

    #[tokio::test]
    async fn test_start_rejects_invalid_config() {
        let mut config = AppConfig::default();
        config.sync.debounce_secs = 0;

        let err = AppServices::start(config, Arc::new(MockProvider::new()))
            .await
            .unwrap_err();
        assert!(err.is_config_error());
    }
}
