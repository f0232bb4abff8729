//! Session handling against the backend's auth endpoints
//!
//! A [`SessionHandle`] is shared by every client component. Operations that act
//! on behalf of a user read the current user id from it and fail with
//! [`SyncError::Unauthenticated`] when nobody is signed in.
//!
//! Access tokens are short-lived. [`spawn_auto_refresh`] keeps the handle's
//! token fresh for as long as the returned [`AutoRefresh`] is alive.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::RwLock;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::BackendConfig;
use crate::error::{ErrorKind, SyncError, SyncResult};
use crate::models::UserId;

/// Tokens for the signed-in user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub user_id: UserId,
    pub email: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// True when the access token expires within `margin`
    pub fn expires_within(&self, margin: ChronoDuration) -> bool {
        self.expires_at - margin <= Utc::now()
    }
}

/// Shared, swappable view of the current session
#[derive(Debug, Clone, Default)]
pub struct SessionHandle {
    inner: Arc<RwLock<Option<Session>>>,
}

impl SessionHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signed_in(session: Session) -> Self {
        let handle = Self::new();
        handle.set(session);
        handle
    }

    pub fn set(&self, session: Session) {
        *self.inner.write() = Some(session);
    }

    pub fn clear(&self) {
        *self.inner.write() = None;
    }

    pub fn current(&self) -> Option<Session> {
        self.inner.read().clone()
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.inner.read().as_ref().map(|s| s.user_id)
    }

    /// Current user id, or `Unauthenticated`
    pub fn require_user(&self) -> SyncResult<UserId> {
        self.user_id()
            .ok_or_else(|| SyncError::Unauthenticated("no active session".to_string()))
    }

    pub fn access_token(&self) -> Option<String> {
        self.inner.read().as_ref().map(|s| s.access_token.clone())
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: AuthUser,
}

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: UserId,
    #[serde(default)]
    email: Option<String>,
}

/// Sign-up returns a session when email confirmation is off, a bare user otherwise
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SignUpResponse {
    Session(TokenResponse),
    User(AuthUser),
}

impl From<TokenResponse> for Session {
    fn from(token: TokenResponse) -> Self {
        let expires_at = token
            .expires_at
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
            .unwrap_or_else(|| Utc::now() + ChronoDuration::seconds(token.expires_in.unwrap_or(3600)));
        Session {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            user_id: token.user.id,
            email: token.user.email,
            expires_at,
        }
    }
}

/// Client for `/auth/v1`
pub struct AuthClient {
    http: Client,
    base_url: String,
    anon_key: String,
    session: SessionHandle,
}

impl AuthClient {
    pub fn new(config: &BackendConfig, session: SessionHandle) -> SyncResult<Self> {
        let http = Client::builder()
            .timeout(config.http_timeout())
            .build()
            .map_err(|e| SyncError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            base_url: format!("{}/auth/v1", config.url.trim_end_matches('/')),
            anon_key: config.anon_key.clone(),
            session,
        })
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    pub async fn sign_in_with_password(&self, email: &str, password: &str) -> SyncResult<Session> {
        let body = serde_json::json!({ "email": email, "password": password });
        let token: TokenResponse = self.token_grant("password", &body).await?;
        let session = Session::from(token);
        info!(user_id = %session.user_id, "Signed in");
        self.session.set(session.clone());
        Ok(session)
    }

    /// Register a user; `None` when the backend requires email confirmation first
    pub async fn sign_up(&self, email: &str, password: &str, name: &str) -> SyncResult<Option<Session>> {
        let body = serde_json::json!({
            "email": email,
            "password": password,
            "data": { "name": name },
        });
        let response = self
            .http
            .post(format!("{}/signup", self.base_url))
            .header("apikey", &self.anon_key)
            .json(&body)
            .send()
            .await?;
        match parse_json::<SignUpResponse>(response).await? {
            SignUpResponse::Session(token) => {
                let session = Session::from(token);
                info!(user_id = %session.user_id, "Signed up");
                self.session.set(session.clone());
                Ok(Some(session))
            }
            SignUpResponse::User(user) => {
                info!(user_id = %user.id, "Signed up, confirmation pending");
                Ok(None)
            }
        }
    }

    /// Exchange the current refresh token for a new session
    pub async fn refresh(&self) -> SyncResult<Session> {
        let current = self
            .session
            .current()
            .ok_or_else(|| SyncError::Unauthenticated("no session to refresh".to_string()))?;
        let body = serde_json::json!({ "refresh_token": current.refresh_token });
        let token: TokenResponse = self.token_grant("refresh_token", &body).await?;
        let session = Session::from(token);
        debug!(user_id = %session.user_id, expires_at = %session.expires_at, "Session refreshed");
        self.session.set(session.clone());
        Ok(session)
    }

    /// Revoke the session remotely and forget it locally
    pub async fn sign_out(&self) -> SyncResult<()> {
        let Some(session) = self.session.current() else {
            return Ok(());
        };
        let result = self
            .http
            .post(format!("{}/logout", self.base_url))
            .header("apikey", &self.anon_key)
            .bearer_auth(&session.access_token)
            .send()
            .await;
        self.session.clear();

        let response = result?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::from_status(status, body));
        }
        info!(user_id = %session.user_id, "Signed out");
        Ok(())
    }

    async fn token_grant(&self, grant_type: &str, body: &serde_json::Value) -> SyncResult<TokenResponse> {
        let response = self
            .http
            .post(format!("{}/token", self.base_url))
            .query(&[("grant_type", grant_type)])
            .header("apikey", &self.anon_key)
            .json(body)
            .send()
            .await?;
        parse_json(response).await
    }
}

/// Exchanges the current session for a fresh one
#[async_trait]
pub trait SessionRefresher: Send + Sync {
    async fn refresh_session(&self) -> SyncResult<Session>;
}

#[async_trait]
impl SessionRefresher for AuthClient {
    async fn refresh_session(&self) -> SyncResult<Session> {
        self.refresh().await
    }
}

/// Refresh when the session expires within `margin`; `Ok(None)` while it is still fresh
pub async fn refresh_if_expiring(
    refresher: &dyn SessionRefresher,
    session: &SessionHandle,
    margin: ChronoDuration,
) -> SyncResult<Option<Session>> {
    match session.current() {
        Some(current) if !current.expires_within(margin) => Ok(None),
        Some(_) => refresher.refresh_session().await.map(Some),
        None => Err(SyncError::Unauthenticated("no active session".to_string())),
    }
}

/// Background session refresh; stops when dropped
#[derive(Debug)]
pub struct AutoRefresh {
    task: JoinHandle<()>,
}

impl AutoRefresh {
    pub fn stop(self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for AutoRefresh {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Check the session every `every` and refresh it ahead of expiry
///
/// Failed refreshes are retried on the next check. A rejected refresh token
/// clears the session.
pub fn spawn_auto_refresh(
    refresher: Arc<dyn SessionRefresher>,
    session: SessionHandle,
    every: Duration,
    margin: ChronoDuration,
) -> AutoRefresh {
    let task = tokio::spawn(async move {
        let mut checks = tokio::time::interval(every);
        checks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            checks.tick().await;
            if session.current().is_none() {
                continue;
            }
            match refresh_if_expiring(refresher.as_ref(), &session, margin).await {
                Ok(Some(fresh)) => {
                    debug!(user_id = %fresh.user_id, expires_at = %fresh.expires_at, "Access token renewed")
                }
                Ok(None) => {}
                Err(e) if e.kind() == ErrorKind::Unauthenticated => {
                    warn!(error = %e, "Refresh token rejected, clearing session");
                    session.clear();
                }
                Err(e) => warn!(error = %e, "Session refresh failed"),
            }
        }
    });
    AutoRefresh { task }
}

async fn parse_json<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> SyncResult<T> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        // The auth service reports bad credentials as 400
        if status.as_u16() == 400 && body.contains("invalid_grant") {
            return Err(SyncError::Unauthenticated(body));
        }
        return Err(SyncError::from_status(status.as_u16(), body));
    }
    Ok(serde_json::from_str(&body)?)
}
