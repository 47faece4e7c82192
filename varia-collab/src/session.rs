//! Session identities.
//!
//! A session is one live transport connection. Clients identify themselves
//! either by signing up as a guest (the server hands out a number) or by
//! registering an email; the registry keeps at most one live session per
//! email.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Transport session id, issued per connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn nil() -> Self {
        Self(Uuid::nil())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Maps identities to their current session.
pub struct SessionRegistry {
    /// Next guest number; never reused for the lifetime of the registry.
    next_guest: AtomicU64,
    /// email → session
    identities: RwLock<HashMap<String, SessionId>>,
    /// session → guest number
    guests: RwLock<HashMap<SessionId, u64>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            next_guest: AtomicU64::new(1),
            identities: RwLock::new(HashMap::new()),
            guests: RwLock::new(HashMap::new()),
        }
    }

    /// Issue the next guest number to `session`.
    pub async fn assign_guest_id(&self, session: SessionId) -> u64 {
        let guest_id = self.next_guest.fetch_add(1, Ordering::SeqCst);
        self.guests.write().await.insert(session, guest_id);
        guest_id
    }

    pub async fn guest_of(&self, session: SessionId) -> Option<u64> {
        self.guests.read().await.get(&session).copied()
    }

    /// Bind `email` to `session`. Returns the session it was bound to before.
    pub async fn register_identity(&self, email: &str, session: SessionId) -> Option<SessionId> {
        self.identities
            .write()
            .await
            .insert(email.to_string(), session)
    }

    pub async fn resolve_session(&self, email: &str) -> Option<SessionId> {
        self.identities.read().await.get(email).copied()
    }

    /// Forget everything bound to a terminated session. Returns the email
    /// that pointed at it, if any.
    pub async fn remove_session(&self, session: SessionId) -> Option<String> {
        self.guests.write().await.remove(&session);

        let mut identities = self.identities.write().await;
        let email = identities
            .iter()
            .find(|(_, s)| **s == session)
            .map(|(email, _)| email.clone())?;
        identities.remove(&email);
        Some(email)
    }

    #[cfg(test)]
    async fn identity_count(&self) -> usize {
        self.identities.read().await.len()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
