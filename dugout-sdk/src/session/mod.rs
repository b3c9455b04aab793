//! Authentication session state machine.
//!
//! States: `LoggedOut → LoggingIn → LoggedIn`, with
//! `LoggedIn → Refreshing → LoggedIn | LoggedOut`. All mutation goes through
//! the command methods here; consumers observe via a `watch` snapshot and a
//! `broadcast` event stream.
//!
//! The reissue endpoint is called directly on this manager's own HTTP
//! client, deliberately outside [`crate::http::HttpClient`]'s interceptor, so
//! the refresh path can never recurse into the retry-on-401 policy.

mod store;

pub use store::{StorageScope, StoredTokens, TokenStore};

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};

use crate::config::SdkConfig;
use crate::envelope::Envelope;
use crate::error::{ApiError, SessionError};

/// Identity fields exposed to the rest of the application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub user_id: u64,
    pub email: String,
    pub nickname: String,
    /// Favorite club, shown next to the nickname in room popups.
    #[serde(default)]
    pub club: Option<String>,
    #[serde(default)]
    pub profile_image: Option<String>,
    /// OAuth provider the account came from.
    #[serde(default)]
    pub provider: Option<String>,
}

impl UserProfile {
    /// Equality over the fields downstream consumers actually render.
    /// `set_user` is a no-op when these match, so an unchanged profile
    /// refresh does not ripple through every subscriber.
    fn identity_eq(&self, other: &UserProfile) -> bool {
        self.user_id == other.user_id
            && self.nickname == other.nickname
            && self.club == other.club
            && self.profile_image == other.profile_image
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    LoggedOut,
    LoggingIn,
    LoggedIn,
    Refreshing,
}

/// Atomic snapshot of the session singleton.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub user: Option<UserProfile>,
    pub access_token: Option<String>,
}

impl SessionSnapshot {
    fn empty() -> Self {
        Self {
            state: SessionState::LoggedOut,
            user: None,
            access_token: None,
        }
    }

    /// Invariant: authenticated iff both user and token are present.
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some() && self.access_token.is_some()
    }
}

/// Discrete session transitions, for toasts and navigation.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    LoggedIn,
    LoggedOut,
    TokenRefreshed,
    /// The session could not be recovered; show the notice.
    SessionExpired { reason: String },
    /// Emitted one grace period after `SessionExpired`, once the notice has
    /// had a chance to render.
    RedirectToLogin,
}

/// Reissue endpoint response payload.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenGrant {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    user: Option<UserProfile>,
}

pub struct SessionManager {
    http: reqwest::Client,
    base_url: String,
    reissue_path: String,
    logout_path: String,
    grace: std::time::Duration,
    store: TokenStore,
    state: Mutex<SessionSnapshot>,
    state_tx: watch::Sender<SessionSnapshot>,
    events_tx: broadcast::Sender<SessionEvent>,
    /// Serializes concurrent refresh attempts: the first caller refreshes,
    /// the rest coalesce on the swapped-in token.
    refresh_gate: tokio::sync::Mutex<()>,
    token_epoch: AtomicU64,
}

impl SessionManager {
    /// Construction fails only if the TLS-backed HTTP client cannot be
    /// built.
    pub fn new(config: &SdkConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        let dir = config
            .storage_dir
            .clone()
            .unwrap_or_else(TokenStore::default_dir);
        let (state_tx, _rx) = watch::channel(SessionSnapshot::empty());
        let (events_tx, _rx) = broadcast::channel(64);
        Ok(Self {
            http,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            reissue_path: config.reissue_path.clone(),
            logout_path: config.logout_path.clone(),
            grace: config.expiry_grace,
            store: TokenStore::new(dir),
            state: Mutex::new(SessionSnapshot::empty()),
            state_tx,
            events_tx,
            refresh_gate: tokio::sync::Mutex::new(()),
            token_epoch: AtomicU64::new(0),
        })
    }

    // ── Observation ──

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.lock().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.lock().is_authenticated()
    }

    pub fn access_token(&self) -> Option<String> {
        self.state.lock().access_token.clone()
    }

    pub fn user(&self) -> Option<UserProfile> {
        self.state.lock().user.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state_tx.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events_tx.subscribe()
    }

    // ── Transitions ──

    /// Enter the logged-in state with credentials obtained by the login page
    /// (password or OAuth callback). `remember_me` selects the durable
    /// storage scope; otherwise the credential dies with the process.
    pub fn login(
        &self,
        user: UserProfile,
        access_token: String,
        refresh_token: Option<String>,
        remember_me: bool,
    ) {
        self.replace_state(SessionSnapshot {
            state: SessionState::LoggingIn,
            user: None,
            access_token: None,
        });
        let scope = if remember_me {
            StorageScope::Durable
        } else {
            StorageScope::Session
        };
        self.store.save(
            scope,
            &StoredTokens {
                access_token: access_token.clone(),
                refresh_token,
            },
        );
        self.token_epoch.fetch_add(1, Ordering::Release);
        self.replace_state(SessionSnapshot {
            state: SessionState::LoggedIn,
            user: Some(user),
            access_token: Some(access_token),
        });
        let _ = self.events_tx.send(SessionEvent::LoggedIn);
        tracing::info!("logged in");
    }

    /// Log out. The server notification is best-effort; the client always
    /// ends in `LoggedOut` with both storage scopes cleared.
    pub async fn logout(&self) {
        if let Some(token) = self.access_token() {
            let url = format!("{}{}", self.base_url, self.logout_path);
            match self.http.post(&url).bearer_auth(&token).send().await {
                Ok(resp) if !resp.status().is_success() => {
                    tracing::warn!(status = %resp.status(), "logout notify rejected; clearing local session anyway");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "logout notify failed; clearing local session anyway");
                }
                Ok(_) => {}
            }
        }
        self.store.clear();
        self.replace_state(SessionSnapshot::empty());
        let _ = self.events_tx.send(SessionEvent::LoggedOut);
        tracing::info!("logged out");
    }

    /// Silent re-authentication from a persisted refresh credential.
    ///
    /// With no stored credential this returns
    /// [`SessionError::NoStoredCredential`] quietly — a first-time visitor is
    /// not an expired session. A stored credential the server rejects goes
    /// through the full expiry path: storage cleared, notice, delayed
    /// redirect.
    pub async fn try_auto_login(&self) -> Result<(), SessionError> {
        let Some((scope, tokens)) = self.store.load() else {
            return Err(SessionError::NoStoredCredential);
        };
        let Some(refresh_token) = tokens.refresh_token else {
            self.store.clear();
            return Err(SessionError::NoStoredCredential);
        };

        self.replace_state(SessionSnapshot {
            state: SessionState::LoggingIn,
            user: None,
            access_token: None,
        });
        match self.reissue(&refresh_token).await {
            Ok(grant) => {
                let Some(user) = grant.user else {
                    self.expire_session("reissue response carried no profile");
                    return Err(SessionError::Expired);
                };
                self.store.save(
                    scope,
                    &StoredTokens {
                        access_token: grant.access_token.clone(),
                        refresh_token: grant.refresh_token.or(Some(refresh_token)),
                    },
                );
                self.token_epoch.fetch_add(1, Ordering::Release);
                self.replace_state(SessionSnapshot {
                    state: SessionState::LoggedIn,
                    user: Some(user),
                    access_token: Some(grant.access_token),
                });
                let _ = self.events_tx.send(SessionEvent::LoggedIn);
                tracing::info!("silent login succeeded");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "silent login failed");
                self.expire_session("silent re-authentication failed");
                Err(e)
            }
        }
    }

    /// Swap in a fresh access token, transparently to in-flight callers.
    ///
    /// Single-flight: concurrent callers serialize on the gate, and any
    /// caller that arrives after another refresh already swapped the token
    /// returns immediately without spending the server a second reissue.
    /// On failure the session is forced to logged-out (expiry path).
    pub async fn refresh_access_token(&self) -> Result<(), SessionError> {
        let epoch = self.token_epoch.load(Ordering::Acquire);
        let _gate = self.refresh_gate.lock().await;
        if self.token_epoch.load(Ordering::Acquire) != epoch {
            return Ok(());
        }

        let Some((scope, tokens)) = self.store.load() else {
            self.expire_session("no stored credential to refresh with");
            return Err(SessionError::Expired);
        };
        let Some(refresh_token) = tokens.refresh_token else {
            self.expire_session("no refresh credential");
            return Err(SessionError::Expired);
        };

        self.mark_refreshing();
        match self.reissue(&refresh_token).await {
            Ok(grant) => {
                self.store.save(
                    scope,
                    &StoredTokens {
                        access_token: grant.access_token.clone(),
                        refresh_token: grant.refresh_token.or(Some(refresh_token)),
                    },
                );
                self.token_epoch.fetch_add(1, Ordering::Release);
                {
                    let mut state = self.state.lock();
                    state.state = SessionState::LoggedIn;
                    state.access_token = Some(grant.access_token);
                    let snapshot = state.clone();
                    drop(state);
                    self.state_tx.send_replace(snapshot);
                }
                if let Some(user) = grant.user {
                    self.set_user(user);
                }
                let _ = self.events_tx.send(SessionEvent::TokenRefreshed);
                tracing::debug!("access token refreshed");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "token refresh failed");
                self.expire_session("token refresh failed");
                Err(e)
            }
        }
    }

    /// Update the profile. No-op unless a user is present and an
    /// identity-relevant field actually changed. Returns whether an update
    /// was applied.
    pub fn set_user(&self, next: UserProfile) -> bool {
        let mut state = self.state.lock();
        match state.user.as_ref() {
            None => return false,
            Some(current) if current.identity_eq(&next) => return false,
            Some(_) => {}
        }
        state.user = Some(next);
        let snapshot = state.clone();
        drop(state);
        self.state_tx.send_replace(snapshot);
        true
    }

    /// Force the session to logged-out: clear both storage scopes, surface
    /// the expiry notice, and emit the redirect one grace period later.
    pub fn expire_session(&self, reason: &str) {
        tracing::warn!(reason, "session expired; forcing logout");
        self.store.clear();
        self.replace_state(SessionSnapshot::empty());
        let _ = self.events_tx.send(SessionEvent::SessionExpired {
            reason: reason.to_string(),
        });
        let events = self.events_tx.clone();
        let grace = self.grace;
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            let _ = events.send(SessionEvent::RedirectToLogin);
        });
    }

    // ── Internals ──

    fn replace_state(&self, next: SessionSnapshot) {
        *self.state.lock() = next.clone();
        self.state_tx.send_replace(next);
    }

    fn mark_refreshing(&self) {
        let mut state = self.state.lock();
        if state.state != SessionState::LoggedIn {
            return;
        }
        state.state = SessionState::Refreshing;
        let snapshot = state.clone();
        drop(state);
        self.state_tx.send_replace(snapshot);
    }

    async fn reissue(&self, refresh_token: &str) -> Result<TokenGrant, SessionError> {
        let url = format!("{}{}", self.base_url, self.reissue_path);
        let resp = self
            .http
            .post(&url)
            .json(&serde_json::json!({ "refreshToken": refresh_token }))
            .send()
            .await?;
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(SessionError::Rejected(format!("HTTP {status}")));
        }
        let envelope: Envelope<TokenGrant> = serde_json::from_str(&body)?;
        envelope.into_result().map_err(|e| match e {
            ApiError::Api { message, .. } => SessionError::Rejected(message),
            ApiError::Decode(e) => SessionError::Decode(e),
            other => SessionError::Rejected(other.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(nickname: &str) -> UserProfile {
        UserProfile {
            user_id: 1,
            email: "fan@example.com".to_string(),
            nickname: nickname.to_string(),
            club: Some("Bears".to_string()),
            profile_image: None,
            provider: None,
        }
    }

    fn manager(dir: &std::path::Path) -> SessionManager {
        let config = SdkConfig {
            storage_dir: Some(dir.to_path_buf()),
            ..SdkConfig::default()
        };
        SessionManager::new(&config).unwrap()
    }

    #[tokio::test]
    async fn login_populates_snapshot_and_invariant_holds() {
        let dir = tempfile::tempdir().unwrap();
        let session = manager(dir.path());
        assert!(!session.is_authenticated());

        session.login(profile("cheer"), "tok".to_string(), None, false);
        let snap = session.snapshot();
        assert_eq!(snap.state, SessionState::LoggedIn);
        assert!(snap.is_authenticated());
        assert_eq!(snap.access_token.as_deref(), Some("tok"));
    }

    #[tokio::test]
    async fn set_user_ignores_identity_equal_updates() {
        let dir = tempfile::tempdir().unwrap();
        let session = manager(dir.path());
        session.login(profile("cheer"), "tok".to_string(), None, false);

        // Same identity fields, different email: no update.
        let mut same = profile("cheer");
        same.email = "other@example.com".to_string();
        assert!(!session.set_user(same));

        assert!(session.set_user(profile("renamed")));
        assert_eq!(session.user().unwrap().nickname, "renamed");
    }

    #[tokio::test]
    async fn set_user_is_a_noop_when_logged_out() {
        let dir = tempfile::tempdir().unwrap();
        let session = manager(dir.path());
        assert!(!session.set_user(profile("cheer")));
        assert!(session.user().is_none());
    }

    #[tokio::test]
    async fn auto_login_without_credentials_is_quiet() {
        let dir = tempfile::tempdir().unwrap();
        let session = manager(dir.path());
        let mut events = session.events();

        let err = session.try_auto_login().await.unwrap_err();
        assert!(matches!(err, SessionError::NoStoredCredential));
        // No session-expired theatrics for a first-time visitor.
        assert!(matches!(
            events.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn expire_emits_notice_then_redirect_after_grace() {
        let dir = tempfile::tempdir().unwrap();
        let config = SdkConfig {
            storage_dir: Some(dir.path().to_path_buf()),
            expiry_grace: std::time::Duration::from_millis(20),
            ..SdkConfig::default()
        };
        let session = SessionManager::new(&config).unwrap();
        session.login(profile("cheer"), "tok".to_string(), None, true);
        let mut events = session.events();

        session.expire_session("idle too long");
        assert!(matches!(
            events.recv().await.unwrap(),
            SessionEvent::SessionExpired { .. }
        ));
        let next = tokio::time::timeout(std::time::Duration::from_secs(1), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(next, SessionEvent::RedirectToLogin);
        assert!(!session.is_authenticated());
    }
}
