//! services/client/src/web/session.rs
//!
//! The session store: the single source of truth for who is signed in.
//!
//! `SessionStore` is the only writer and is deliberately not `Clone`; it is
//! owned by whatever drives sign-in and sign-out. Everything else receives a
//! `SessionReader`, which hands out immutable `Session` snapshots.

use docunexus_core::domain::User;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

//=========================================================================================
// Session Snapshot
//=========================================================================================

/// An immutable view of the session at one point in time.
#[derive(Debug, Clone, Default)]
pub struct Session {
    user: Option<Arc<User>>,
}

impl Session {
    pub fn user(&self) -> Option<&User> {
        self.user.as_deref()
    }

    /// True iff a user is present.
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    pub fn access_token(&self) -> Option<&str> {
        self.user.as_deref().map(|u| u.access_token.as_str())
    }
}

//=========================================================================================
// Writer
//=========================================================================================

pub struct SessionStore {
    tx: watch::Sender<Session>,
}

impl SessionStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Session::default());
        Self { tx }
    }

    /// Replaces the current user and marks the session authenticated.
    pub fn set_user(&self, user: User) {
        info!(user_id = %user.id, "Session started");
        self.tx.send_replace(Session {
            user: Some(Arc::new(user)),
        });
    }

    /// Swaps in a refreshed access token for the signed-in user. Returns
    /// `false`, changing nothing, when nobody is signed in.
    pub fn replace_token(&self, access_token: String, expires_in: Option<i64>) -> bool {
        self.tx.send_if_modified(|session| {
            let Some(user) = session.user.as_deref() else {
                return false;
            };
            let mut user = user.clone();
            user.access_token = access_token;
            user.expires_in = expires_in;
            session.user = Some(Arc::new(user));
            true
        })
    }

    /// Removes the current user, leaving the session unauthenticated.
    pub fn clear_user(&self) {
        let previous = self.tx.send_replace(Session::default());
        if let Some(user) = previous.user() {
            info!(user_id = %user.id, "Session cleared");
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.tx.borrow().is_authenticated()
    }

    pub fn snapshot(&self) -> Session {
        self.tx.borrow().clone()
    }

    /// Hands out a read-only handle for injection into other components.
    pub fn reader(&self) -> SessionReader {
        SessionReader {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

//=========================================================================================
// Reader
//=========================================================================================

#[derive(Debug, Clone)]
pub struct SessionReader {
    rx: watch::Receiver<Session>,
}

impl SessionReader {
    pub fn snapshot(&self) -> Session {
        self.rx.borrow().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.rx.borrow().is_authenticated()
    }

    /// The bearer token to attach to the next request, if any.
    pub fn access_token(&self) -> Option<String> {
        self.rx.borrow().access_token().map(str::to_string)
    }

    /// Waits for the next sign-in or sign-out. Returns `false` once the
    /// store has been dropped.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}
