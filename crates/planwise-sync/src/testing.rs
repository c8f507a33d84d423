//! Test doubles for the external capabilities.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;

use crate::backup::{BackupObject, BackupStore, MemoryBackupStore, ObjectMetadata};
use crate::error::{BackupStoreError, ProviderError};
use crate::provider::{AuthProvider, Credential, Profile};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// =============================================================================
// Auth Provider
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProfileMode {
    Ok,
    Rejected,
    Unavailable,
}

/// Provider that issues `token-N` interactively and `silent-N` on refresh.
pub(crate) struct MockProvider {
    interactive: AtomicUsize,
    silent: AtomicUsize,
    revokes: AtomicUsize,
    interactive_error: Mutex<Option<ProviderError>>,
    silent_error: Mutex<Option<ProviderError>>,
    profile_mode: Mutex<ProfileMode>,
    last_hint: Mutex<Option<String>>,
    silent_gate: Mutex<Option<Arc<Notify>>>,
}

impl MockProvider {
    pub(crate) fn new() -> Self {
        MockProvider {
            interactive: AtomicUsize::new(0),
            silent: AtomicUsize::new(0),
            revokes: AtomicUsize::new(0),
            interactive_error: Mutex::new(None),
            silent_error: Mutex::new(None),
            profile_mode: Mutex::new(ProfileMode::Ok),
            last_hint: Mutex::new(None),
            silent_gate: Mutex::new(None),
        }
    }

    pub(crate) fn fail_interactive(&self, error: ProviderError) {
        *lock(&self.interactive_error) = Some(error);
    }

    pub(crate) fn fail_silent(&self, error: ProviderError) {
        *lock(&self.silent_error) = Some(error);
    }

    pub(crate) fn set_profile_mode(&self, mode: ProfileMode) {
        *lock(&self.profile_mode) = mode;
    }

    /// Holds silent refreshes until the returned gate is notified.
    pub(crate) fn gate_silent(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *lock(&self.silent_gate) = Some(gate.clone());
        gate
    }

    pub(crate) fn interactive_calls(&self) -> usize {
        self.interactive.load(Ordering::SeqCst)
    }

    pub(crate) fn silent_calls(&self) -> usize {
        self.silent.load(Ordering::SeqCst)
    }

    pub(crate) fn revoke_calls(&self) -> usize {
        self.revokes.load(Ordering::SeqCst)
    }

    pub(crate) fn last_hint(&self) -> Option<String> {
        lock(&self.last_hint).clone()
    }
}

#[async_trait]
impl AuthProvider for MockProvider {
    async fn request_credential(&self, _scopes: &[String]) -> Result<Credential, ProviderError> {
        let n = self.interactive.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(error) = lock(&self.interactive_error).clone() {
            return Err(error);
        }
        Ok(Credential {
            access_token: format!("token-{n}"),
            expires_in: 3600,
            login_hint: Some(format!("hint-{n}")),
        })
    }

    async fn request_silent_credential(
        &self,
        login_hint: &str,
    ) -> Result<Credential, ProviderError> {
        let n = self.silent.fetch_add(1, Ordering::SeqCst) + 1;
        *lock(&self.last_hint) = Some(login_hint.to_string());

        let gate = lock(&self.silent_gate).clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        if let Some(error) = lock(&self.silent_error).clone() {
            return Err(error);
        }
        Ok(Credential {
            access_token: format!("silent-{n}"),
            expires_in: 3600,
            login_hint: None,
        })
    }

    async fn fetch_profile(&self, _access_token: &str) -> Result<Profile, ProviderError> {
        let mode = *lock(&self.profile_mode);
        match mode {
            ProfileMode::Ok => Ok(Profile {
                name: "Alex Rivera".into(),
                email: "alex@example.com".into(),
                picture: None,
            }),
            ProfileMode::Rejected => Err(ProviderError::Rejected("invalid_token".into())),
            ProfileMode::Unavailable => Err(ProviderError::Unavailable("timeout".into())),
        }
    }

    async fn revoke(&self, _access_token: &str) -> Result<(), ProviderError> {
        self.revokes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// =============================================================================
// Backup Store
// =============================================================================

/// Wraps a [`MemoryBackupStore`]; `list_objects` signals `entered` and then
/// waits for `release`. Can also fail every list call.
pub(crate) struct GatedStore {
    pub(crate) inner: MemoryBackupStore,
    pub(crate) entered: Notify,
    pub(crate) release: Notify,
    gated: bool,
    failure: Mutex<Option<BackupStoreError>>,
}

impl GatedStore {
    pub(crate) fn gated() -> Self {
        GatedStore {
            inner: MemoryBackupStore::new(),
            entered: Notify::new(),
            release: Notify::new(),
            gated: true,
            failure: Mutex::new(None),
        }
    }

    pub(crate) fn failing(error: BackupStoreError) -> Self {
        GatedStore {
            inner: MemoryBackupStore::new(),
            entered: Notify::new(),
            release: Notify::new(),
            gated: false,
            failure: Mutex::new(Some(error)),
        }
    }
}

#[async_trait]
impl BackupStore for GatedStore {
    async fn list_objects(
        &self,
        access_token: &str,
        folder: &str,
    ) -> Result<Vec<BackupObject>, BackupStoreError> {
        if self.gated {
            self.entered.notify_one();
            self.release.notified().await;
        }
        if let Some(error) = lock(&self.failure).clone() {
            return Err(error);
        }
        self.inner.list_objects(access_token, folder).await
    }

    async fn create_object(
        &self,
        access_token: &str,
        metadata: &ObjectMetadata,
        payload: &str,
    ) -> Result<String, BackupStoreError> {
        self.inner.create_object(access_token, metadata, payload).await
    }

    async fn update_object(
        &self,
        access_token: &str,
        id: &str,
        payload: &str,
    ) -> Result<String, BackupStoreError> {
        self.inner.update_object(access_token, id, payload).await
    }
}
