//! # Session
//!
//! Who is operating the terminal. Workflows never look the user up
//! themselves; callers resolve a [`UserContext`] once and pass it in.
//!
//! ```text
//! ┌──────────────────┐  current_user()   ┌──────────────────┐
//! │ SessionProvider  │──────────────────►│   UserContext    │──► record_sale(&user, ..)
//! │ (LocalSession)   │                   └──────────────────┘
//! │                  │  subscribe()
//! │                  │──────────────────► SessionEvent::{SignedIn, SignedOut}
//! └──────────────────┘
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use tracing::info;

use crate::error::{EngineError, EngineResult};

/// Capacity of the session event channel. Slow subscribers lag, they never block sign-in.
const EVENT_CAPACITY: usize = 16;

/// The signed-in operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserContext {
    pub user_id: String,
    pub display_name: String,
}

impl UserContext {
    pub fn new(user_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        UserContext {
            user_id: user_id.into(),
            display_name: display_name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    SignedIn(UserContext),
    SignedOut,
}

/// Source of the current user and of sign-in/out notifications.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn current_user(&self) -> Option<UserContext>;

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent>;

    /// The current user, or [`EngineError::Unauthenticated`].
    async fn require_user(&self) -> EngineResult<UserContext> {
        self.current_user()
            .await
            .ok_or(EngineError::Unauthenticated)
    }
}

/// In-process session held by the terminal.
#[derive(Debug)]
pub struct LocalSession {
    user: RwLock<Option<UserContext>>,
    events: broadcast::Sender<SessionEvent>,
}

impl Default for LocalSession {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalSession {
    pub fn new() -> Self {
        Self::with_user(None)
    }

    /// A session that starts signed in.
    pub fn signed_in(user: UserContext) -> Self {
        Self::with_user(Some(user))
    }

    fn with_user(user: Option<UserContext>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        LocalSession {
            user: RwLock::new(user),
            events,
        }
    }

    pub async fn sign_in(&self, user: UserContext) {
        info!(user_id = %user.user_id, "User signed in");
        *self.user.write().await = Some(user.clone());
        // No subscribers is fine.
        let _ = self.events.send(SessionEvent::SignedIn(user));
    }

    pub async fn sign_out(&self) {
        if self.user.write().await.take().is_some() {
            info!("User signed out");
            let _ = self.events.send(SessionEvent::SignedOut);
        }
    }
}

#[async_trait]
impl SessionProvider for LocalSession {
    async fn current_user(&self) -> Option<UserContext> {
        self.user.read().await.clone()
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[tokio::test]
    async fn test_sign_in_and_out_broadcast() {
        let session = LocalSession::new();
        let mut events = session.subscribe();
        assert_eq!(
            session.require_user().await.unwrap_err().kind(),
            ErrorKind::Unauthenticated
        );

        let user = UserContext::new("u1", "Amina");
        session.sign_in(user.clone()).await;
        assert_eq!(session.require_user().await.unwrap(), user);
        assert_eq!(events.recv().await.unwrap(), SessionEvent::SignedIn(user));

        session.sign_out().await;
        assert!(session.current_user().await.is_none());
        assert_eq!(events.recv().await.unwrap(), SessionEvent::SignedOut);
    }

    #[tokio::test]
    async fn test_signed_in_constructor() {
        let session = LocalSession::signed_in(UserContext::new("u2", "Juma"));
        assert_eq!(session.current_user().await.unwrap().user_id, "u2");
    }
}
