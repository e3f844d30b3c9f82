// Sign-in and the user session.
//
// The session starts `Pending` and becomes `Ready` once sign-in yields a user
// id. Nothing that writes user data runs before then: operations take a
// `&UserId`, which only a ready session can hand out.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::error::AuthError;

/// Stable, opaque identifier for a signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Build a user id. Ids become path segments, so they must be non-empty
    /// and free of `/`.
    pub fn new(raw: impl Into<String>) -> Result<Self, AuthError> {
        let raw = raw.into();
        if raw.is_empty() || raw.contains('/') {
            return Err(AuthError::InvalidUserId(raw));
        }
        Ok(UserId(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How to sign in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignIn {
    /// Fresh anonymous identity.
    Anonymous,
    /// A pre-issued custom token. The token carries the user id.
    Token(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    Pending,
    Ready(UserId),
    Failed(AuthError),
}

static ANON_SEQ: AtomicU64 = AtomicU64::new(0);

fn anonymous_id() -> String {
    let seq = ANON_SEQ.fetch_add(1, Ordering::Relaxed);
    let now = chrono::Utc::now();
    format!("anon_{}_{seq:04}", now.format("%Y%m%d%H%M%S%6f"))
}

/// Resolve a sign-in method to a user id.
pub fn sign_in(method: &SignIn) -> Result<UserId, AuthError> {
    match method {
        SignIn::Anonymous => UserId::new(anonymous_id()),
        SignIn::Token(token) => {
            let token = token.trim();
            if token.is_empty() {
                return Err(AuthError::EmptyToken);
            }
            UserId::new(token)
        }
    }
}

/// The current user's auth state, observable from any task.
pub struct Session {
    tx: watch::Sender<AuthState>,
}

impl Default for Session {
    fn default() -> Self {
        Self::pending()
    }
}

impl Session {
    pub fn pending() -> Self {
        let (tx, _rx) = watch::channel(AuthState::Pending);
        Session { tx }
    }

    /// Run sign-in and publish the result to everyone waiting on the session.
    pub fn complete(&self, method: &SignIn) -> Result<UserId, AuthError> {
        match sign_in(method) {
            Ok(user) => {
                info!("Signed in as {}", user);
                self.tx.send_replace(AuthState::Ready(user.clone()));
                Ok(user)
            }
            Err(e) => {
                warn!("Sign-in failed: {}", e);
                self.tx.send_replace(AuthState::Failed(e.clone()));
                Err(e)
            }
        }
    }

    /// The signed-in user, if sign-in has completed.
    pub fn user(&self) -> Option<UserId> {
        match &*self.tx.borrow() {
            AuthState::Ready(user) => Some(user.clone()),
            _ => None,
        }
    }

    pub fn state(&self) -> AuthState {
        self.tx.borrow().clone()
    }

    /// Wait until sign-in has either produced a user id or failed.
    pub async fn wait_ready(&self) -> Result<UserId, AuthError> {
        let mut rx = self.tx.subscribe();
        let state = rx
            .wait_for(|s| !matches!(s, AuthState::Pending))
            .await
            .map_err(|_| AuthError::SignInFailed("session closed".into()))?;
        match &*state {
            AuthState::Ready(user) => Ok(user.clone()),
            AuthState::Failed(e) => Err(e.clone()),
            AuthState::Pending => Err(AuthError::SignInFailed("still pending".into())),
        }
    }
}
