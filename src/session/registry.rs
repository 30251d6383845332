use super::{ConversationKey, Session};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;

/// Map of conversations that currently have a running execution.
///
/// The lock is only ever held for a map operation, never across an await.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<ConversationKey, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ConversationKey, Arc<Session>>> {
        // The map stays consistent even if a holder panicked
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Atomically register a session for `key` unless one already exists.
    ///
    /// Returns the stored session and `true` when it was already present,
    /// in which case nothing new is created. A fresh session's token is a
    /// child of `parent`, so cancelling the parent reaches every session.
    pub fn register_if_absent(
        &self,
        key: ConversationKey,
        parent: &CancellationToken,
    ) -> (Arc<Session>, bool) {
        let mut sessions = self.lock();
        if let Some(existing) = sessions.get(&key) {
            return (Arc::clone(existing), true);
        }
        let session = Arc::new(Session::new(key.clone(), parent.child_token()));
        sessions.insert(key, Arc::clone(&session));
        (session, false)
    }

    pub fn remove(&self, key: &ConversationKey) -> Option<Arc<Session>> {
        self.lock().remove(key)
    }

    #[cfg(test)]
    pub fn get(&self, key: &ConversationKey) -> Option<Arc<Session>> {
        self.lock().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
