//! # Auth Session Manager
//!
//! Owns the bearer credential used for backups: interactive sign-in,
//! persistence across restarts, silent refresh and sign-out.
//!
//! ## State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Session States                                 │
//! │                                                                         │
//! │              sign_in()                 provider ok                      │
//! │  ┌───────────┐ ─────────► ┌─────────┐ ──────────► ┌──────────┐         │
//! │  │ SignedOut │            │ Pending │             │ SignedIn │◄──┐     │
//! │  └───────────┘ ◄───────── └─────────┘             └────┬─────┘   │     │
//! │       ▲          provider error                        │         │     │
//! │       │                                   token expired│ refresh │     │
//! │       │                                                ▼   ok    │     │
//! │       │          refresh failed                  ┌──────────┐    │     │
//! │       └──────────────────────────────────────────│ Expiring │────┘     │
//! │                                                  └──────────┘          │
//! │                                                                         │
//! │  sign_out() goes to SignedOut from every state.                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Persisted State
//! Stored through [`SettingsRepository`] so a restart resumes the session:
//!
//! | Key              | Value                          |
//! |------------------|--------------------------------|
//! | `authToken`      | `{ accessToken, expiresAt }`   |
//! | `profile`        | `{ name, email, picture }`     |
//! | `credentialHint` | login hint for silent refresh  |
//!
//! A stored token restores `SignedIn` immediately, even when it has
//! expired; the expiry watcher or the next [`AuthSession::access_token`]
//! call takes it through `Expiring`.
//!
//! ## Refresh Serialization
//! Refreshes run under a mutex with a re-check after acquiring it (the same
//! shape as a double-checked token cache), so concurrent callers that find
//! the token expired share one provider round trip.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tracing::{debug, info, warn};

use planwise_db::SettingsRepository;

use crate::error::AuthError;
use crate::provider::{AuthProvider, Credential, Profile};

/// Settings key of the persisted token.
pub const AUTH_TOKEN_KEY: &str = "authToken";

/// Settings key of the persisted profile.
pub const PROFILE_KEY: &str = "profile";

/// Settings key of the persisted login hint.
pub const CREDENTIAL_HINT_KEY: &str = "credentialHint";

// =============================================================================
// Session State
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    SignedOut,
    /// Interactive sign-in in flight.
    Pending,
    SignedIn,
    /// Silent refresh in flight.
    Expiring,
}

impl SessionState {
    pub fn is_signed_in(&self) -> bool {
        matches!(self, SessionState::SignedIn)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::SignedOut => write!(f, "signed_out"),
            SessionState::Pending => write!(f, "pending"),
            SessionState::SignedIn => write!(f, "signed_in"),
            SessionState::Expiring => write!(f, "expiring"),
        }
    }
}

// =============================================================================
// Token
// =============================================================================

/// Persisted bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthToken {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

impl AuthToken {
    /// Stamps `credential` with an absolute expiry counted from `issued_at`.
    pub fn from_credential(credential: &Credential, issued_at: DateTime<Utc>) -> Self {
        let lifetime = i64::try_from(credential.expires_in).unwrap_or(i64::MAX);
        let expires_at = chrono::Duration::try_seconds(lifetime)
            .and_then(|d| issued_at.checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        AuthToken {
            access_token: credential.access_token.clone(),
            expires_at,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }

    /// Time left before expiry, zero once expired.
    pub fn remaining(&self) -> Duration {
        (self.expires_at - Utc::now()).to_std().unwrap_or(Duration::ZERO)
    }
}

// =============================================================================
// Auth Session
// =============================================================================

/// Auth session manager.
///
/// Shared as `Arc<AuthSession>` between the sync engine, the expiry watcher
/// and the application services.
pub struct AuthSession {
    provider: Arc<dyn AuthProvider>,
    settings: SettingsRepository,
    scopes: Vec<String>,
    state: watch::Sender<SessionState>,
    token: RwLock<Option<AuthToken>>,
    profile: RwLock<Option<Profile>>,
    login_hint: RwLock<Option<String>>,
    refresh_lock: Mutex<()>,
}

impl AuthSession {
    /// Restores the session from persisted settings.
    ///
    /// Starts `SignedIn` when a token is stored, `SignedOut` otherwise.
    pub async fn restore(
        provider: Arc<dyn AuthProvider>,
        settings: SettingsRepository,
        scopes: Vec<String>,
    ) -> Result<Self, AuthError> {
        let token: Option<AuthToken> = settings.get_json(AUTH_TOKEN_KEY).await?;
        let profile: Option<Profile> = settings.get_json(PROFILE_KEY).await?;
        let login_hint: Option<String> = settings.get_json(CREDENTIAL_HINT_KEY).await?;

        let initial = if token.is_some() {
            SessionState::SignedIn
        } else {
            SessionState::SignedOut
        };

        info!(
            state = %initial,
            expired = ?token.as_ref().map(AuthToken::is_expired),
            has_profile = profile.is_some(),
            "Auth session restored"
        );

        let (state, _) = watch::channel(initial);

        Ok(AuthSession {
            provider,
            settings,
            scopes,
            state,
            token: RwLock::new(token),
            profile: RwLock::new(profile),
            login_hint: RwLock::new(login_hint),
            refresh_lock: Mutex::new(()),
        })
    }

    // -------------------------------------------------------------------------
    // Observation
    // -------------------------------------------------------------------------

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub async fn profile(&self) -> Option<Profile> {
        self.profile.read().await.clone()
    }

    /// Returns the stored token without refreshing it.
    pub async fn current_token(&self) -> Option<AuthToken> {
        self.token.read().await.clone()
    }

    fn set_state(&self, next: SessionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!(from = %previous, to = %next, "Session state changed");
        }
    }

    // -------------------------------------------------------------------------
    // Sign-in
    // -------------------------------------------------------------------------

    /// Interactive sign-in.
    ///
    /// A no-op when already signed in. Fails with `SignInInProgress` while a
    /// sign-in or refresh is running.
    pub async fn sign_in(&self) -> Result<(), AuthError> {
        let mut previous = SessionState::SignedOut;
        let claimed = self.state.send_if_modified(|state| {
            previous = *state;
            if *state == SessionState::SignedOut {
                *state = SessionState::Pending;
                true
            } else {
                false
            }
        });

        if !claimed {
            return match previous {
                SessionState::SignedIn => {
                    debug!("Already signed in");
                    Ok(())
                }
                _ => Err(AuthError::SignInInProgress),
            };
        }

        info!(scopes = self.scopes.len(), "Starting interactive sign-in");

        let credential = match self.provider.request_credential(&self.scopes).await {
            Ok(credential) => credential,
            Err(e) => {
                warn!(error = %e, "Interactive sign-in failed");
                self.set_state(SessionState::SignedOut);
                return Err(AuthError::Provider(e));
            }
        };

        // Signed out while the provider was prompting
        if self.state() != SessionState::Pending {
            warn!("Discarding credential from an abandoned sign-in");
            return Err(AuthError::NotSignedIn);
        }

        if let Err(e) = self.store_credential(&credential).await {
            warn!(error = %e, "Failed to persist credential");
            self.set_state(SessionState::SignedOut);
            return Err(e);
        }
        self.set_state(SessionState::SignedIn);
        info!("Signed in");

        if let Err(e) = self.load_profile(&credential.access_token).await {
            warn!(error = %e, "Signed in without a profile");
        }

        Ok(())
    }

    async fn store_credential(&self, credential: &Credential) -> Result<AuthToken, AuthError> {
        let token = AuthToken::from_credential(credential, Utc::now());
        self.settings.set_json(AUTH_TOKEN_KEY, &token).await?;

        if let Some(hint) = &credential.login_hint {
            self.settings.set_json(CREDENTIAL_HINT_KEY, hint).await?;
            *self.login_hint.write().await = Some(hint.clone());
        }

        *self.token.write().await = Some(token.clone());
        Ok(token)
    }

    async fn load_profile(&self, access_token: &str) -> Result<Profile, AuthError> {
        let profile = self.provider.fetch_profile(access_token).await?;
        self.settings.set_json(PROFILE_KEY, &profile).await?;
        *self.profile.write().await = Some(profile.clone());
        debug!(email = %profile.email, "Profile stored");
        Ok(profile)
    }

    // -------------------------------------------------------------------------
    // Credential Access
    // -------------------------------------------------------------------------

    /// Returns a valid access token, refreshing it first when it expired.
    pub async fn access_token(&self) -> Result<String, AuthError> {
        match self.state() {
            SessionState::SignedOut | SessionState::Pending => {
                return Err(AuthError::NotSignedIn)
            }
            SessionState::SignedIn | SessionState::Expiring => {}
        }

        if let Some(token) = self.token.read().await.as_ref() {
            if !token.is_expired() {
                return Ok(token.access_token.clone());
            }
        }

        self.refresh().await
    }

    /// Silently refreshes the token.
    ///
    /// Only one refresh runs at a time. A caller that waited on another
    /// caller's refresh gets its result without a second provider call.
    pub async fn refresh(&self) -> Result<String, AuthError> {
        let _guard = self.refresh_lock.lock().await;

        // Re-check: another caller may have refreshed while we waited
        match self.state() {
            SessionState::SignedOut | SessionState::Pending => {
                return Err(AuthError::NotSignedIn)
            }
            _ => {}
        }
        if let Some(token) = self.token.read().await.as_ref() {
            if !token.is_expired() {
                return Ok(token.access_token.clone());
            }
        }

        self.set_state(SessionState::Expiring);
        info!("Access token expired, attempting silent refresh");

        let hint = self.login_hint.read().await.clone();
        let result = match hint {
            Some(hint) => self
                .provider
                .request_silent_credential(&hint)
                .await
                .map_err(|e| AuthError::RefreshFailed(e.to_string())),
            None => Err(AuthError::RefreshFailed("no stored login hint".into())),
        };

        // Signed out while the provider was working
        if self.state() != SessionState::Expiring {
            return Err(AuthError::NotSignedIn);
        }

        let stored = match result {
            Ok(credential) => match self.store_credential(&credential).await {
                Ok(token) if token.is_expired() => Err(AuthError::RefreshFailed(
                    "provider returned an expired credential".into(),
                )),
                other => other,
            },
            Err(e) => Err(e),
        };

        match stored {
            Ok(token) => {
                self.set_state(SessionState::SignedIn);
                info!(expires_at = %token.expires_at, "Access token refreshed");
                Ok(token.access_token)
            }
            Err(e) => {
                warn!(error = %e, "Silent refresh failed, interactive sign-in required");
                self.clear_local().await;
                self.set_state(SessionState::SignedOut);
                Err(e)
            }
        }
    }

    /// Re-checks the stored profile against the provider.
    ///
    /// Replaces the profile on success and clears it when the provider
    /// rejects the token. A transient provider failure keeps the stored one.
    pub async fn revalidate_profile(&self) -> Result<Option<Profile>, AuthError> {
        let access_token = self.access_token().await?;

        match self.load_profile(&access_token).await {
            Ok(profile) => Ok(Some(profile)),
            Err(AuthError::Provider(e)) if e.is_rejection() => {
                warn!(error = %e, "Provider rejected the stored profile");
                *self.profile.write().await = None;
                self.settings.remove(PROFILE_KEY).await?;
                Ok(None)
            }
            Err(AuthError::Provider(e)) => {
                debug!(error = %e, "Profile check deferred");
                Ok(self.profile().await)
            }
            Err(e) => Err(e),
        }
    }

    // -------------------------------------------------------------------------
    // Expiry Watcher
    // -------------------------------------------------------------------------

    /// Refreshes the token whenever it expires while signed in. Runs until
    /// `shutdown_rx` receives a message or is closed.
    pub async fn run_expiry_watcher(self: Arc<Self>, mut shutdown_rx: mpsc::Receiver<()>) {
        let mut state_rx = self.subscribe();
        info!("Expiry watcher started");

        loop {
            let state = *state_rx.borrow_and_update();
            let remaining = match state {
                SessionState::SignedIn => self.current_token().await.map(|t| t.remaining()),
                _ => None,
            };

            if remaining == Some(Duration::ZERO) {
                if let Err(e) = self.refresh().await {
                    debug!(error = %e, "Watcher refresh did not complete");
                }
                continue;
            }

            let expiry = async {
                match remaining {
                    Some(remaining) => tokio::time::sleep(remaining).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                _ = expiry => {}
                changed = state_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = shutdown_rx.recv() => {
                    break;
                }
            }
        }

        info!("Expiry watcher stopped");
    }

    // -------------------------------------------------------------------------
    // Sign-out
    // -------------------------------------------------------------------------

    /// Clears every piece of session state and signs out.
    ///
    /// Always succeeds locally. Token revocation runs in the background and
    /// its failure is only logged.
    pub async fn sign_out(&self) {
        let token = self.token.read().await.clone();

        self.set_state(SessionState::SignedOut);
        self.clear_local().await;

        if let Some(token) = token {
            let provider = self.provider.clone();
            tokio::spawn(async move {
                if let Err(e) = provider.revoke(&token.access_token).await {
                    warn!(error = %e, "Token revocation failed");
                }
            });
        }

        info!("Signed out");
    }

    async fn clear_local(&self) {
        *self.token.write().await = None;
        *self.profile.write().await = None;
        *self.login_hint.write().await = None;

        for key in [AUTH_TOKEN_KEY, PROFILE_KEY, CREDENTIAL_HINT_KEY] {
            if let Err(e) = self.settings.remove(key).await {
                warn!(key, error = %e, "Failed to clear persisted session state");
            }
        }
    }
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("state", &self.state())
            .field("scopes", &self.scopes)
            .finish_non_exhaustive()
    }
}
