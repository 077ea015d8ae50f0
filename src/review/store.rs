//! Keyed store for active review sessions.
//!
//! The map itself is guarded by an `RwLock`; each session is wrapped in
//! its own `Mutex` so control events for one session serialize without
//! blocking events for other sessions. Keys are never reused: rekeying
//! retires the old key and registers the new one inside a single write
//! critical section, so there is no window where the session is
//! reachable by neither key.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use super::session::{ReviewSession, SessionKey};

/// Shared handle to one session's serialized state.
pub type SessionHandle = Arc<Mutex<ReviewSession>>;

/// Process-wide mapping from session key to live session.
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<SessionKey, SessionHandle>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a session under a key. Returns the handle.
    pub async fn insert(&self, key: SessionKey, session: ReviewSession) -> SessionHandle {
        let handle = Arc::new(Mutex::new(session));
        let mut sessions = self.sessions.write().await;
        sessions.insert(key, handle.clone());
        handle
    }

    /// Looks up the handle for a live session.
    pub async fn get(&self, key: &SessionKey) -> Option<SessionHandle> {
        let sessions = self.sessions.read().await;
        sessions.get(key).cloned()
    }

    /// Retires a session. Late results for a removed key are no-ops.
    pub async fn remove(&self, key: &SessionKey) -> Option<SessionHandle> {
        let mut sessions = self.sessions.write().await;
        sessions.remove(key)
    }

    /// Atomically retires `old` and registers the same session under
    /// `new`. Returns false (and changes nothing) if `old` is not live.
    pub async fn rekey(&self, old: &SessionKey, new: SessionKey) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.remove(old) {
            Some(handle) => {
                sessions.insert(new, handle);
                true
            }
            None => false,
        }
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        let sessions = self.sessions.read().await;
        sessions.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
