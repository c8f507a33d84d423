//! # Auth Provider Capability
//!
//! The identity provider the session obtains credentials from. The concrete
//! OAuth flow lives in the host application; this crate only sees the
//! results.
//!
//! ## Calls
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  AuthSession                               AuthProvider (host)         │
//! │       │                                          │                      │
//! │       │  request_credential(scopes)              │  interactive         │
//! │       │─────────────────────────────────────────►│  consent prompt      │
//! │       │◄──── Credential { token, expires_in,     │                      │
//! │       │                   login_hint }           │                      │
//! │       │                                          │                      │
//! │       │  request_silent_credential(hint)         │  no UI               │
//! │       │─────────────────────────────────────────►│                      │
//! │       │                                          │                      │
//! │       │  fetch_profile(token) / revoke(token)    │                      │
//! │       │─────────────────────────────────────────►│                      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// A bearer credential issued by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    /// Bearer token sent to the backup store.
    pub access_token: String,

    /// Lifetime of the token in seconds, counted from issue.
    pub expires_in: u64,

    /// Long-lived hint for later silent refreshes, when the provider
    /// issues one.
    pub login_hint: Option<String>,
}

/// Identity of the signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub picture: Option<String>,
}

/// External identity provider.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Interactive sign-in for `scopes`.
    async fn request_credential(&self, scopes: &[String]) -> Result<Credential, ProviderError>;

    /// Non-interactive refresh using a hint from an earlier sign-in.
    async fn request_silent_credential(&self, login_hint: &str)
        -> Result<Credential, ProviderError>;

    /// Looks up the profile the token belongs to.
    async fn fetch_profile(&self, access_token: &str) -> Result<Profile, ProviderError>;

    /// Revokes the token. Failures are reported but never block sign-out.
    async fn revoke(&self, access_token: &str) -> Result<(), ProviderError>;
}
