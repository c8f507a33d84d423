//! # Backup Store Capability
//!
//! Remote object storage holding the backup document. Every call carries
//! the bearer token as a plain string.
//!
//! [`MemoryBackupStore`] keeps objects in process memory; it backs tests and
//! offline runs of the host application.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::debug;

use crate::error::BackupStoreError;

/// An object as listed by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupObject {
    pub id: String,
    pub name: String,
}

/// Metadata for a newly created object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMetadata {
    pub name: String,
    pub mime_type: String,
    /// Folder scopes the object is created in.
    pub parents: Vec<String>,
}

/// External object store for the backup document.
#[async_trait]
pub trait BackupStore: Send + Sync {
    /// Lists the objects in `folder`.
    async fn list_objects(
        &self,
        access_token: &str,
        folder: &str,
    ) -> Result<Vec<BackupObject>, BackupStoreError>;

    /// Creates an object and returns its id.
    async fn create_object(
        &self,
        access_token: &str,
        metadata: &ObjectMetadata,
        payload: &str,
    ) -> Result<String, BackupStoreError>;

    /// Replaces the payload of `id` and returns its id.
    async fn update_object(
        &self,
        access_token: &str,
        id: &str,
        payload: &str,
    ) -> Result<String, BackupStoreError>;
}

// =============================================================================
// In-Memory Store
// =============================================================================

#[derive(Debug, Clone)]
struct StoredObject {
    id: String,
    name: String,
    folders: Vec<String>,
    payload: String,
}

/// In-process [`BackupStore`] that counts its calls.
#[derive(Debug, Default)]
pub struct MemoryBackupStore {
    objects: Mutex<Vec<StoredObject>>,
    tokens: Mutex<Vec<String>>,
    lists: AtomicUsize,
    creates: AtomicUsize,
    updates: AtomicUsize,
}

impl MemoryBackupStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `list_objects` calls so far.
    pub fn list_calls(&self) -> usize {
        self.lists.load(Ordering::SeqCst)
    }

    /// Number of `create_object` calls so far.
    pub fn create_calls(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    /// Number of `update_object` calls so far.
    pub fn update_calls(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    /// Tokens received, in call order.
    pub fn tokens_seen(&self) -> Vec<String> {
        lock(&self.tokens).clone()
    }

    /// Current payload of the object called `name`.
    pub fn payload(&self, name: &str) -> Option<String> {
        lock(&self.objects)
            .iter()
            .find(|o| o.name == name)
            .map(|o| o.payload.clone())
    }

    /// Number of stored objects.
    pub fn object_count(&self) -> usize {
        lock(&self.objects).len()
    }

    fn record_token(&self, access_token: &str) {
        lock(&self.tokens).push(access_token.to_string());
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl BackupStore for MemoryBackupStore {
    async fn list_objects(
        &self,
        access_token: &str,
        folder: &str,
    ) -> Result<Vec<BackupObject>, BackupStoreError> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        self.record_token(access_token);

        Ok(lock(&self.objects)
            .iter()
            .filter(|o| o.folders.iter().any(|f| f == folder))
            .map(|o| BackupObject {
                id: o.id.clone(),
                name: o.name.clone(),
            })
            .collect())
    }

    async fn create_object(
        &self,
        access_token: &str,
        metadata: &ObjectMetadata,
        payload: &str,
    ) -> Result<String, BackupStoreError> {
        let n = self.creates.fetch_add(1, Ordering::SeqCst) + 1;
        self.record_token(access_token);

        let id = format!("object-{n}");
        lock(&self.objects).push(StoredObject {
            id: id.clone(),
            name: metadata.name.clone(),
            folders: metadata.parents.clone(),
            payload: payload.to_string(),
        });
        debug!(id = %id, name = %metadata.name, "Created object");
        Ok(id)
    }

    async fn update_object(
        &self,
        access_token: &str,
        id: &str,
        payload: &str,
    ) -> Result<String, BackupStoreError> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        self.record_token(access_token);

        let mut objects = lock(&self.objects);
        let object = objects
            .iter_mut()
            .find(|o| o.id == id)
            .ok_or_else(|| BackupStoreError::ObjectNotFound(id.to_string()))?;
        object.payload = payload.to_string();
        Ok(object.id.clone())
    }
}
