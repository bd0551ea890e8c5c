//! Session tokens and login state.

use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info};

/// Bearer tokens for the REST API.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Token sent as `Authorization: Bearer ..`.
    #[serde(alias = "access_token", alias = "token")]
    pub access_token: String,

    /// Token exchanged at `/auth/refresh` for a new session.
    #[serde(default, alias = "refresh_token", skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl Session {
    /// Creates a session without a refresh token.
    #[must_use]
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
        }
    }

    /// Sets the refresh token.
    #[must_use]
    pub fn with_refresh_token(mut self, token: impl Into<String>) -> Self {
        self.refresh_token = Some(token.into());
        self
    }
}

// Tokens stay out of logs.
impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Login state observable by the UI layer.
///
/// A transition to [`AuthState::LoggedOut`] after a failed refresh is the
/// signal to send the user back to the login screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    /// No session.
    LoggedOut,
    /// A session is held.
    LoggedIn,
}

/// Credentials posted to `/auth/login`.
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    /// Account name or email.
    pub username: String,
    /// Account password.
    pub password: String,
}

/// Shared session holder; clones observe the same session.
#[derive(Debug, Clone)]
pub(crate) struct SessionHolder {
    session: Arc<Mutex<Option<Session>>>,
    state: Arc<watch::Sender<AuthState>>,
}

impl SessionHolder {
    pub(crate) fn new(session: Option<Session>) -> Self {
        let initial = if session.is_some() {
            AuthState::LoggedIn
        } else {
            AuthState::LoggedOut
        };
        let (state, _) = watch::channel(initial);
        Self {
            session: Arc::new(Mutex::new(session)),
            state: Arc::new(state),
        }
    }

    pub(crate) fn get(&self) -> Option<Session> {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn access_token(&self) -> Option<String> {
        self.get().map(|s| s.access_token)
    }

    pub(crate) fn set(&self, session: Session) {
        *self.session.lock().unwrap_or_else(PoisonError::into_inner) = Some(session);
        self.state.send_if_modified(|state| {
            let changed = *state != AuthState::LoggedIn;
            *state = AuthState::LoggedIn;
            changed
        });
        debug!("session stored");
    }

    pub(crate) fn clear(&self) {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let changed = self.state.send_if_modified(|state| {
            let changed = *state != AuthState::LoggedOut;
            *state = AuthState::LoggedOut;
            changed
        });
        if changed {
            info!("session cleared, login required");
        }
    }

    pub(crate) fn state(&self) -> AuthState {
        *self.state.borrow()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }
}
