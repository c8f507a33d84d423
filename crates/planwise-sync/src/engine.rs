//! # Sync Engine
//!
//! Keeps the remote backup eventually consistent with the local dataset.
//!
//! ## Engine Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        SyncEngine Architecture                          │
//! │                                                                         │
//! │  planwise-db                                                            │
//! │  ChangeSignal ──── dataset modified ────┐                               │
//! │                                          ▼                              │
//! │                                 ┌──────────────────┐                    │
//! │  AuthSession ── SignedOut ─────►│   watch loop     │◄── shutdown (mpsc) │
//! │                 (cancel)        └────────┬─────────┘                    │
//! │                                          │ schedule()                   │
//! │                                          ▼                              │
//! │                                 ┌──────────────────┐                    │
//! │                                 │    Debouncer     │  10 s quiet period │
//! │                                 └────────┬─────────┘                    │
//! │                                          │ sync()                       │
//! │                                          ▼                              │
//! │  ┌────────────────────────────────────────────────────────────────┐   │
//! │  │ 1. is_syncing guard      (one upload at a time)                 │   │
//! │  │ 2. access token          (AuthSession, refreshes if expired)   │   │
//! │  │ 3. snapshot_all          (every table, tombstones included)     │   │
//! │  │ 4. list_objects(folder)  find the backup by name                │   │
//! │  │ 5. update_object or create_object                               │   │
//! │  └────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Failure Policy
//! A failed step aborts that attempt and is recorded in [`SyncStatus`]. The
//! local dataset is only read, never written, so it stays as it was. There
//! is no automatic retry; the next local change schedules a fresh attempt.
//!
//! The backup is a whole-document overwrite. The last upload wins, with no
//! merge against whatever another writer uploaded in between.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::{mpsc, watch, RwLock};
use tracing::{debug, error, info, trace, warn};

use planwise_core::TableName;
use planwise_db::Database;

use crate::backup::{BackupStore, ObjectMetadata};
use crate::config::SyncSettings;
use crate::error::{SyncError, SyncResult};
use crate::scheduler::Debouncer;
use crate::session::{AuthSession, SessionState};

// =============================================================================
// Status
// =============================================================================

/// Sync status for the UI.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    /// True strictly while an upload is in flight.
    pub is_syncing: bool,

    /// When the last upload finished.
    pub last_synced_at: Option<DateTime<Utc>>,

    /// Message of the last failed attempt, cleared by the next success.
    pub last_error: Option<String>,

    /// Completed uploads since startup.
    pub uploads: u64,

    /// Remote id of the backup object.
    pub last_object_id: Option<String>,
}

/// Result of a [`SyncEngine::sync`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The backup was written.
    Uploaded {
        object_id: String,
        record_count: usize,
        /// True if the backup object did not exist before.
        created: bool,
    },

    /// Not signed in, or no backup store attached. Nothing was called.
    Disabled,

    /// Another upload was in flight; this call did nothing.
    AlreadyRunning,
}

// =============================================================================
// Sync Guard
// =============================================================================

/// Holds the `is_syncing` flag for the duration of one upload.
struct SyncGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> SyncGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SyncGuard { flag })
    }
}

impl Drop for SyncGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

// =============================================================================
// Sync Engine
// =============================================================================

struct EngineInner {
    db: Database,
    session: Arc<AuthSession>,
    settings: SyncSettings,
    store: RwLock<Option<Arc<dyn BackupStore>>>,
    debouncer: Debouncer,
    is_syncing: AtomicBool,
    status: RwLock<SyncStatus>,
}

/// Debounced backup uploader.
///
/// Cloning is cheap; clones share the same engine.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

impl SyncEngine {
    /// Creates an engine using the configured debounce delay.
    pub fn new(db: Database, session: Arc<AuthSession>, settings: &SyncSettings) -> Self {
        Self::with_debounce(db, session, settings, settings.debounce())
    }

    /// Creates an engine with an explicit debounce delay.
    pub fn with_debounce(
        db: Database,
        session: Arc<AuthSession>,
        settings: &SyncSettings,
        delay: Duration,
    ) -> Self {
        SyncEngine {
            inner: Arc::new(EngineInner {
                db,
                session,
                settings: settings.clone(),
                store: RwLock::new(None),
                debouncer: Debouncer::new(delay),
                is_syncing: AtomicBool::new(false),
                status: RwLock::new(SyncStatus::default()),
            }),
        }
    }

    // -------------------------------------------------------------------------
    // Capability
    // -------------------------------------------------------------------------

    /// Makes the backup store available for uploads.
    pub async fn attach_backup_store(&self, store: Arc<dyn BackupStore>) {
        *self.inner.store.write().await = Some(store);
        info!("Backup store attached");
    }

    /// Removes the backup store and drops any pending upload.
    pub async fn detach_backup_store(&self) {
        *self.inner.store.write().await = None;
        self.cancel_pending();
        info!("Backup store detached");
    }

    // -------------------------------------------------------------------------
    // Status
    // -------------------------------------------------------------------------

    /// True when signed in and a backup store is attached.
    pub async fn is_sync_enabled(&self) -> bool {
        self.inner.session.state().is_signed_in() && self.inner.store.read().await.is_some()
    }

    pub fn is_syncing(&self) -> bool {
        self.inner.is_syncing.load(Ordering::Acquire)
    }

    /// True while a debounced upload is waiting to start.
    pub fn is_pending(&self) -> bool {
        self.inner.debouncer.is_pending()
    }

    pub async fn status(&self) -> SyncStatus {
        let mut status = self.inner.status.read().await.clone();
        status.is_syncing = self.is_syncing();
        status
    }

    // -------------------------------------------------------------------------
    // Scheduling
    // -------------------------------------------------------------------------

    /// Starts or restarts the debounce window. Returns false when sync is
    /// disabled and nothing was scheduled.
    pub async fn schedule(&self) -> bool {
        if !self.is_sync_enabled().await {
            trace!("Sync disabled, change not scheduled");
            return false;
        }

        let engine: Weak<EngineInner> = Arc::downgrade(&self.inner);
        self.inner.debouncer.arm(move || async move {
            if let Some(inner) = engine.upgrade() {
                SyncEngine { inner }.run_scheduled().await;
            }
        });

        debug!(
            delay_ms = self.inner.debouncer.delay().as_millis() as u64,
            "Backup scheduled"
        );
        true
    }

    /// Drops the pending debounce window, if any.
    pub fn cancel_pending(&self) -> bool {
        self.inner.debouncer.cancel()
    }

    /// Debounce target. An upload already in flight snapshotted the dataset
    /// before this window's changes, so the window is re-armed until that
    /// upload ends.
    fn run_scheduled(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            match self.sync().await {
                Ok(SyncOutcome::AlreadyRunning) => {
                    debug!("Upload in flight, re-arming backup");
                    self.schedule().await;
                }
                Ok(outcome) => debug!(?outcome, "Scheduled sync finished"),
                Err(e) => warn!(error = %e, "Scheduled sync failed"),
            }
        })
    }

    // -------------------------------------------------------------------------
    // Sync
    // -------------------------------------------------------------------------

    /// Uploads a full snapshot now.
    ///
    /// Returns `Disabled` without touching anything when sync is disabled,
    /// and `AlreadyRunning` when another upload holds the flag.
    pub async fn sync(&self) -> SyncResult<SyncOutcome> {
        if !self.is_sync_enabled().await {
            debug!("Sync requested while disabled");
            return Ok(SyncOutcome::Disabled);
        }

        let Some(_guard) = SyncGuard::acquire(&self.inner.is_syncing) else {
            debug!("Sync already running");
            return Ok(SyncOutcome::AlreadyRunning);
        };

        // Detached between the enabled check and the guard
        let Some(store) = self.inner.store.read().await.clone() else {
            return Ok(SyncOutcome::Disabled);
        };

        info!("Starting backup sync");
        let result = self.upload(store.as_ref()).await;
        self.record(&result).await;
        result
    }

    async fn upload(&self, store: &dyn BackupStore) -> SyncResult<SyncOutcome> {
        let settings = &self.inner.settings;

        let access_token = self.inner.session.access_token().await?;

        let snapshot = self.inner.db.snapshots().snapshot_all().await?;
        for table in TableName::ALL {
            trace!(table = %table, records = snapshot.table(table).count(), "Snapshot table");
        }
        let document = snapshot.to_document()?;

        let existing = store
            .list_objects(&access_token, &settings.backup_folder)
            .await?
            .into_iter()
            .find(|object| object.name == settings.backup_name);

        let (object_id, created) = match existing {
            Some(object) => {
                debug!(id = %object.id, "Updating existing backup");
                let id = store
                    .update_object(&access_token, &object.id, &document)
                    .await?;
                (id, false)
            }
            None => {
                debug!(name = %settings.backup_name, "Creating backup");
                let metadata = ObjectMetadata {
                    name: settings.backup_name.clone(),
                    mime_type: settings.mime_type.clone(),
                    parents: vec![settings.backup_folder.clone()],
                };
                let id = store
                    .create_object(&access_token, &metadata, &document)
                    .await?;
                (id, true)
            }
        };

        Ok(SyncOutcome::Uploaded {
            object_id,
            record_count: snapshot.len(),
            created,
        })
    }

    async fn record(&self, result: &SyncResult<SyncOutcome>) {
        let mut status = self.inner.status.write().await;
        match result {
            Ok(SyncOutcome::Uploaded {
                object_id,
                record_count,
                created,
            }) => {
                status.last_synced_at = Some(Utc::now());
                status.last_error = None;
                status.uploads += 1;
                status.last_object_id = Some(object_id.clone());
                info!(
                    object_id = %object_id,
                    records = record_count,
                    created,
                    "Backup sync complete"
                );
            }
            Ok(_) => {}
            Err(e) => {
                status.last_error = Some(e.to_string());
                error!(error = %e, auth = e.is_auth_error(), "Backup sync failed");
            }
        }
    }

    // -------------------------------------------------------------------------
    // Watch Loop
    // -------------------------------------------------------------------------

    /// Spawns the loop that schedules a backup on every local change.
    pub fn start(&self) -> SyncEngineHandle {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let changes = self.inner.db.subscribe_changes();
        let session = self.inner.session.subscribe();

        tokio::spawn(self.clone().watch_loop(changes, session, shutdown_rx));
        info!("Sync engine started");

        SyncEngineHandle {
            shutdown_tx,
            engine: self.clone(),
        }
    }

    async fn watch_loop(
        self,
        mut changes: watch::Receiver<u64>,
        mut session: watch::Receiver<SessionState>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        // Only changes made after startup count
        changes.borrow_and_update();

        loop {
            tokio::select! {
                changed = changes.changed() => {
                    if changed.is_err() {
                        debug!("Change signal closed");
                        break;
                    }
                    let generation = *changes.borrow_and_update();
                    trace!(generation, "Dataset modified");
                    self.schedule().await;
                }

                changed = session.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let state = *session.borrow_and_update();
                    if state == SessionState::SignedOut && self.cancel_pending() {
                        info!("Signed out, pending backup dropped");
                    }
                }

                _ = shutdown_rx.recv() => {
                    info!("Sync engine received shutdown");
                    break;
                }
            }
        }

        self.cancel_pending();
        info!("Sync engine stopped");
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("is_syncing", &self.is_syncing())
            .field("is_pending", &self.is_pending())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Engine Handle
// =============================================================================

/// Handle for a running watch loop.
#[derive(Debug)]
pub struct SyncEngineHandle {
    shutdown_tx: mpsc::Sender<()>,
    engine: SyncEngine,
}

impl SyncEngineHandle {
    pub async fn status(&self) -> SyncStatus {
        self.engine.status().await
    }

    /// Stops the watch loop and drops any pending upload. An upload already
    /// in flight runs to completion.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(()).await;
        self.engine.cancel_pending();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::MemoryBackupStore;
    use crate::error::{BackupStoreError, ProviderError};
    use crate::testing::{GatedStore, MockProvider};
    use planwise_db::{DbConfig, Snapshot};
    use serde_json::json;

    const DEBOUNCE: Duration = Duration::from_millis(50);

    struct Fixture {
        db: Database,
        provider: Arc<MockProvider>,
        session: Arc<AuthSession>,
        engine: SyncEngine,
    }

    async fn fixture() -> Fixture {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let provider = Arc::new(MockProvider::new());
        let session = Arc::new(
            AuthSession::restore(provider.clone(), db.settings(), vec!["scope".into()])
                .await
                .unwrap(),
        );
        let engine = SyncEngine::with_debounce(
            db.clone(),
            session.clone(),
            &SyncSettings::default(),
            DEBOUNCE,
        );
        Fixture {
            db,
            provider,
            session,
            engine,
        }
    }

    async fn signed_in_with(store: Arc<dyn BackupStore>) -> Fixture {
        let f = fixture().await;
        f.session.sign_in().await.unwrap();
        f.engine.attach_backup_store(store).await;
        f
    }

    #[tokio::test]
    async fn test_sync_disabled_makes_no_calls() {
        let f = fixture().await;
        let store = Arc::new(MemoryBackupStore::new());
        f.engine.attach_backup_store(store.clone()).await;

        // Attached but signed out
        assert!(!f.engine.is_sync_enabled().await);
        assert_eq!(f.engine.sync().await.unwrap(), SyncOutcome::Disabled);
        assert!(!f.engine.is_syncing());
        assert_eq!(store.list_calls(), 0);

        // Signed in but detached
        f.session.sign_in().await.unwrap();
        f.engine.detach_backup_store().await;
        assert_eq!(f.engine.sync().await.unwrap(), SyncOutcome::Disabled);
        assert_eq!(store.list_calls(), 0);
    }

    #[tokio::test]
    async fn test_first_sync_creates_then_updates() {
        let store = Arc::new(MemoryBackupStore::new());
        let f = signed_in_with(store.clone()).await;
        f.db.people().save(json!({ "name": "Alex" })).await.unwrap();

        let first = f.engine.sync().await.unwrap();
        assert!(matches!(
            first,
            SyncOutcome::Uploaded { created: true, record_count: 1, .. }
        ));

        f.db.people().save(json!({ "name": "Sam" })).await.unwrap();
        let second = f.engine.sync().await.unwrap();
        assert!(matches!(
            second,
            SyncOutcome::Uploaded { created: false, record_count: 2, .. }
        ));

        assert_eq!(store.create_calls(), 1);
        assert_eq!(store.update_calls(), 1);
        assert_eq!(store.object_count(), 1);

        let status = f.engine.status().await;
        assert_eq!(status.uploads, 2);
        assert_eq!(status.last_object_id.as_deref(), Some("object-1"));
        assert!(status.last_synced_at.is_some());
        assert!(!status.is_syncing);
    }

    #[tokio::test]
    async fn test_backup_document_restores_dataset() {
        let store = Arc::new(MemoryBackupStore::new());
        let f = signed_in_with(store.clone()).await;
        let person = f.db.people().save(json!({ "name": "Alex" })).await.unwrap();
        f.db.people().delete(person.id()).await.unwrap();
        f.db.categories().save(json!({ "name": "Dental" })).await.unwrap();

        f.engine.sync().await.unwrap();

        let document = store.payload("backup.json").unwrap();
        let snapshot = Snapshot::from_document(&document).unwrap();
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.table(TableName::Person).all(|r| r.is_deleted()));

        let fresh = Database::new(DbConfig::in_memory()).await.unwrap();
        fresh.snapshots().restore(&snapshot).await.unwrap();
        assert_eq!(fresh.categories().count().await.unwrap(), 1);
        assert!(fresh.people().get(person.id()).await.is_err());
    }

    #[tokio::test]
    async fn test_token_string_sent_on_every_call() {
        let store = Arc::new(MemoryBackupStore::new());
        let f = signed_in_with(store.clone()).await;

        f.engine.sync().await.unwrap();
        f.engine.sync().await.unwrap();

        let tokens = store.tokens_seen();
        assert_eq!(tokens.len(), 4);
        assert!(tokens.iter().all(|t| t == "token-1"));
    }

    #[tokio::test]
    async fn test_concurrent_sync_is_rejected() {
        let store = Arc::new(GatedStore::gated());
        let f = signed_in_with(store.clone()).await;

        let engine = f.engine.clone();
        let first = tokio::spawn(async move { engine.sync().await });

        store.entered.notified().await;
        assert!(f.engine.is_syncing());
        assert!(f.engine.status().await.is_syncing);
        assert_eq!(f.engine.sync().await.unwrap(), SyncOutcome::AlreadyRunning);

        store.release.notify_one();
        let outcome = first.await.unwrap().unwrap();
        assert!(matches!(outcome, SyncOutcome::Uploaded { .. }));
        assert_eq!(store.inner.list_calls(), 1);
        assert_eq!(store.inner.create_calls(), 1);
        assert!(!f.engine.is_syncing());
    }

    #[tokio::test]
    async fn test_failed_upload_is_recorded() {
        let store = Arc::new(GatedStore::failing(BackupStoreError::Request("503".into())));
        let f = signed_in_with(store.clone()).await;
        f.db.people().save(json!({ "name": "Alex" })).await.unwrap();

        let err = f.engine.sync().await.unwrap_err();
        assert!(matches!(err, SyncError::BackupStore(_)));

        let status = f.engine.status().await;
        assert!(!status.is_syncing);
        assert_eq!(status.uploads, 0);
        assert!(status.last_error.unwrap().contains("503"));
        assert_eq!(f.db.people().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_refresh_failure_aborts_sync() {
        let store = Arc::new(MemoryBackupStore::new());
        let f = fixture().await;
        f.db.settings()
            .set_json(
                crate::session::AUTH_TOKEN_KEY,
                &crate::session::AuthToken {
                    access_token: "old".into(),
                    expires_at: Utc::now() - chrono::Duration::minutes(1),
                },
            )
            .await
            .unwrap();
        f.db.settings()
            .set_json(crate::session::CREDENTIAL_HINT_KEY, "hint")
            .await
            .unwrap();
        f.provider
            .fail_silent(ProviderError::Rejected("invalid_grant".into()));
        let session = Arc::new(
            AuthSession::restore(f.provider.clone(), f.db.settings(), vec![])
                .await
                .unwrap(),
        );
        let engine =
            SyncEngine::with_debounce(f.db.clone(), session.clone(), &SyncSettings::default(), DEBOUNCE);
        engine.attach_backup_store(store.clone()).await;

        let err = engine.sync().await.unwrap_err();
        assert!(err.is_auth_error());
        assert_eq!(session.state(), SessionState::SignedOut);
        assert_eq!(store.list_calls(), 0);
    }

    #[tokio::test]
    async fn test_rapid_changes_produce_one_upload() {
        let store = Arc::new(MemoryBackupStore::new());
        let f = signed_in_with(store.clone()).await;
        let handle = f.engine.start();

        f.db.people().save(json!({ "name": "Alex" })).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        f.db.people().save(json!({ "name": "Sam" })).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(f.engine.is_pending());
        assert_eq!(store.list_calls(), 0);

        tokio::time::sleep(DEBOUNCE * 6).await;
        assert_eq!(store.list_calls(), 1);
        assert_eq!(store.create_calls(), 1);
        assert_eq!(handle.status().await.uploads, 1);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_changes_while_disabled_are_ignored() {
        let store = Arc::new(MemoryBackupStore::new());
        let f = fixture().await;
        f.engine.attach_backup_store(store.clone()).await;
        let handle = f.engine.start();

        f.db.people().save(json!({ "name": "Alex" })).await.unwrap();
        tokio::time::sleep(DEBOUNCE * 4).await;
        assert!(!f.engine.is_pending());
        assert_eq!(store.list_calls(), 0);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_sign_out_drops_pending_upload() {
        let store = Arc::new(MemoryBackupStore::new());
        let f = signed_in_with(store.clone()).await;
        let handle = f.engine.start();

        f.db.people().save(json!({ "name": "Alex" })).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(f.engine.is_pending());

        f.session.sign_out().await;
        tokio::time::sleep(DEBOUNCE * 4).await;
        assert!(!f.engine.is_pending());
        assert_eq!(store.list_calls(), 0);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_stops_scheduling() {
        let store = Arc::new(MemoryBackupStore::new());
        let f = signed_in_with(store.clone()).await;
        let handle = f.engine.start();

        handle.shutdown().await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        f.db.people().save(json!({ "name": "Alex" })).await.unwrap();
        tokio::time::sleep(DEBOUNCE * 4).await;
        assert_eq!(store.list_calls(), 0);
    }

    #[tokio::test]
    async fn test_change_during_upload_reaches_backup() {
        let store = Arc::new(GatedStore::gated());
        let f = signed_in_with(store.clone()).await;
        let handle = f.engine.start();

        let engine = f.engine.clone();
        let first = tokio::spawn(async move { engine.sync().await });
        store.entered.notified().await;

        // Saved after the in-flight upload took its snapshot
        f.db.people().save(json!({ "name": "Late change" })).await.unwrap();
        // Several windows elapse while the upload is held
        tokio::time::sleep(DEBOUNCE * 4).await;
        assert_eq!(store.inner.list_calls(), 0);

        store.release.notify_one();
        let outcome = first.await.unwrap().unwrap();
        assert!(matches!(outcome, SyncOutcome::Uploaded { record_count: 0, .. }));

        // The re-armed window uploads the late change
        tokio::time::timeout(Duration::from_secs(2), store.entered.notified())
            .await
            .unwrap();
        store.release.notify_one();
        tokio::time::timeout(Duration::from_secs(2), async {
            while f.engine.status().await.uploads < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        let document = store.inner.payload("backup.json").unwrap();
        let snapshot = Snapshot::from_document(&document).unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.records[0].name(), Some("Late change"));
        assert_eq!(store.inner.list_calls(), 2);

        handle.shutdown().await;
    }
}
