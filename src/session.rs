//! Per-conversation execution sessions
//!
//! At most one execution runs per [`ConversationKey`]. The registry is an
//! identity map; it never touches a session's internals, only its presence.

mod key;
mod registry;

pub use key::ConversationKey;
pub use registry::SessionRegistry;

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// A cancellable execution bound to one conversation
#[derive(Debug)]
pub struct Session {
    key: ConversationKey,
    token: CancellationToken,
}

impl Session {
    fn new(key: ConversationKey, token: CancellationToken) -> Self {
        Self { key, token }
    }

    pub fn key(&self) -> &ConversationKey {
        &self.key
    }

    /// Token observed by every suspension point of the execution
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Idempotent
    pub fn cancel(&self) {
        self.token.cancel();
    }
}

/// Cancels the session and drops it from the registry when it goes out of
/// scope, on success, error and panic alike.
pub struct SessionGuard {
    registry: Arc<SessionRegistry>,
    session: Arc<Session>,
}

impl SessionGuard {
    pub fn new(registry: Arc<SessionRegistry>, session: Arc<Session>) -> Self {
        Self { registry, session }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.session.cancel();
        self.registry.remove(self.session.key());
        tracing::debug!(conv_key = %self.session.key(), "Session released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_releases_on_drop() {
        let registry = Arc::new(SessionRegistry::new());
        let root = CancellationToken::new();
        let key = ConversationKey::new("C1", "1.0", "U1");

        let (session, _) = registry.register_if_absent(key.clone(), &root);
        let token = session.token();
        {
            let _guard = SessionGuard::new(Arc::clone(&registry), session);
            assert_eq!(registry.len(), 1);
        }
        assert!(token.is_cancelled());
        assert!(registry.get(&key).is_none());
        assert!(!root.is_cancelled());
    }

    #[tokio::test]
    async fn test_guard_releases_when_task_panics() {
        let registry = Arc::new(SessionRegistry::new());
        let root = CancellationToken::new();
        let key = ConversationKey::new("C1", "2.0", "U1");
        let (session, _) = registry.register_if_absent(key.clone(), &root);

        let guard = SessionGuard::new(Arc::clone(&registry), session);
        let result = tokio::spawn(async move {
            let _guard = guard;
            panic!("boom");
        })
        .await;

        assert!(result.is_err());
        assert!(registry.is_empty());
    }
}
