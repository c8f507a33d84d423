//! # Sync Error Types
//!
//! Error types for the auth session, the backup sync engine and the two
//! external capabilities they drive.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │      Auth       │  │     Backup Store        │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  AuthError      │  │  BackupStoreError       │ │
//! │  │  ConfigLoad..   │  │  (ProviderError)│  │  Unauthorized, Request  │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐                              │
//! │  │    Database     │  │    Internal     │                              │
//! │  │                 │  │                 │                              │
//! │  │  DbError        │  │  Internal       │                              │
//! │  │  Serialization  │  │  ShuttingDown   │                              │
//! │  └─────────────────┘  └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! None of these are fatal. A failed sign-in leaves the session signed out,
//! a failed sync leaves local data as it was.

use planwise_db::DbError;
use thiserror::Error;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

// =============================================================================
// Capability Errors
// =============================================================================

/// Failure reported by an [`AuthProvider`](crate::provider::AuthProvider).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// The provider refused the request (revoked grant, bad token).
    #[error("Provider rejected the request: {0}")]
    Rejected(String),

    /// The user closed the interactive sign-in.
    #[error("Sign-in was cancelled")]
    Cancelled,

    /// The provider could not be reached.
    #[error("Provider unavailable: {0}")]
    Unavailable(String),
}

impl ProviderError {
    /// Returns true if retrying with the same input cannot succeed.
    pub fn is_rejection(&self) -> bool {
        matches!(self, ProviderError::Rejected(_))
    }
}

/// Failure reported by a [`BackupStore`](crate::backup::BackupStore).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackupStoreError {
    /// The access token was not accepted.
    #[error("Backup store rejected the credential: {0}")]
    Unauthorized(String),

    /// The object to update no longer exists.
    #[error("Backup object not found: {0}")]
    ObjectNotFound(String),

    /// Network or server failure.
    #[error("Backup store request failed: {0}")]
    Request(String),
}

// =============================================================================
// Auth Errors
// =============================================================================

/// Auth session failure.
///
/// Every variant leaves the session in a consistent state: either it was
/// already signed out, or the failed transition put it back to signed out.
#[derive(Debug, Error)]
pub enum AuthError {
    /// An interactive sign-in or a refresh is already running.
    #[error("Sign-in already in progress")]
    SignInInProgress,

    /// No credential is available.
    #[error("Not signed in")]
    NotSignedIn,

    /// The provider failed the interactive request.
    #[error("Sign-in failed: {0}")]
    Provider(#[from] ProviderError),

    /// Silent refresh failed; interactive sign-in is required.
    #[error("Credential refresh failed: {0}")]
    RefreshFailed(String),

    /// Persisted session state could not be read or written.
    #[error("Session storage error: {0}")]
    Storage(#[from] DbError),
}

impl AuthError {
    /// Returns true if the user backed out of the interactive sign-in.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AuthError::Provider(ProviderError::Cancelled))
    }
}

// =============================================================================
// Sync Errors
// =============================================================================

/// Sync error type covering every failure of a backup attempt and of
/// application startup.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid configuration.
    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Auth Errors
    // =========================================================================
    /// No usable credential for the upload.
    #[error(transparent)]
    Auth(#[from] AuthError),

    // =========================================================================
    // Snapshot Errors
    // =========================================================================
    /// Reading the local dataset failed.
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    /// The backup document could not be produced.
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    // =========================================================================
    // Upload Errors
    // =========================================================================
    /// The backup store failed a list, create or update call.
    #[error(transparent)]
    BackupStore(#[from] BackupStoreError),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// The services are shutting down.
    #[error("Sync services are shutting down")]
    ShuttingDown,
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::SerializationFailed(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl SyncError {
    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
        )
    }

    /// Returns true if the user has to sign in again before the next sync
    /// can succeed.
    pub fn is_auth_error(&self) -> bool {
        matches!(
            self,
            SyncError::Auth(_) | SyncError::BackupStore(BackupStoreError::Unauthorized(_))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        assert!(SyncError::InvalidConfig("bad".into()).is_config_error());
        assert!(SyncError::ConfigLoadFailed("missing".into()).is_config_error());
        assert!(!SyncError::Internal("oops".into()).is_config_error());

        assert!(SyncError::Auth(AuthError::NotSignedIn).is_auth_error());
        assert!(SyncError::from(BackupStoreError::Unauthorized("expired".into())).is_auth_error());
        assert!(!SyncError::from(BackupStoreError::Request("503".into())).is_auth_error());
    }

    #[test]
    fn test_auth_error_is_transparent() {
        let err = SyncError::from(AuthError::RefreshFailed("no hint".into()));
        assert_eq!(err.to_string(), "Credential refresh failed: no hint");
    }

    #[test]
    fn test_provider_rejection() {
        assert!(ProviderError::Rejected("invalid_grant".into()).is_rejection());
        assert!(!ProviderError::Unavailable("timeout".into()).is_rejection());
        assert!(!ProviderError::Cancelled.is_rejection());
    }
}
