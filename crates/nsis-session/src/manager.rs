//! Session storage: a session-id-keyed map behind a single `RwLock`, each
//! entry independently `Mutex`-guarded
//! (`Arc<RwLock<HashMap<session_id, Arc<Mutex<Session>>>>>`): the outer
//! lock only ever guards insertion/removal of whole entries, so two
//! dispatcher tasks processing different sessions never block each other.

use std::collections::HashMap;
use std::sync::Arc;

use nsis_collab::SessionId;
use tokio::sync::{Mutex, RwLock};

use crate::dispatcher::Session;

/// Live sessions, keyed by [`SessionId`].
#[derive(Default)]
pub struct SessionManager {
    sessions: RwLock<HashMap<SessionId, Arc<Mutex<Session>>>>,
}

impl SessionManager {
    /// An empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self { sessions: RwLock::new(HashMap::new()) }
    }

    /// The live session for `id`, if any.
    pub async fn get(&self, id: SessionId) -> Option<Arc<Mutex<Session>>> {
        self.sessions.read().await.get(&id).cloned()
    }

    /// Insert a freshly created session, replacing whatever was there.
    /// Returns the shared handle the caller should lock to drive it.
    pub async fn insert(&self, id: SessionId, session: Session) -> Arc<Mutex<Session>> {
        let handle = Arc::new(Mutex::new(session));
        self.sessions.write().await.insert(id, handle.clone());
        handle
    }

    /// Drop a session once it has reached `Final` — removed from the
    /// manager only once its handler emits `RemoveSession`, never before.
    pub async fn remove(&self, id: SessionId) {
        self.sessions.write().await.remove(&id);
    }

    /// Number of live sessions. Exposed for tests and metrics, not load-bearing logic.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::natfw::{NatfwPolicy, NiSession};

    #[tokio::test]
    async fn insert_get_remove_round_trips() {
        let manager = SessionManager::new();
        let id = SessionId::new(1);
        manager.insert(id, Session::NatfwNi(NiSession::new(id, NatfwPolicy::default()))).await;
        assert_eq!(manager.len().await, 1);
        assert!(manager.get(id).await.is_some());

        manager.remove(id).await;
        assert_eq!(manager.len().await, 0);
        assert!(manager.get(id).await.is_none());
    }

    #[tokio::test]
    async fn get_on_unknown_id_is_none() {
        let manager = SessionManager::new();
        assert!(manager.get(SessionId::new(42)).await.is_none());
    }
}
