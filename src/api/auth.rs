use super::ApiError;
use crate::runtime::ChatError;
use crate::slack::SlackUser;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Source of user records
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn lookup(&self, user_id: &str) -> Result<SlackUser, ChatError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authorization {
    Allowed(SlackUser),
    /// Bots and app users; their mentions are dropped silently
    Ignored,
}

/// Resolves and caches users, then applies the allow-list
pub struct UserGate {
    directory: Arc<dyn UserDirectory>,
    allowed: HashSet<String>,
    cache: RwLock<HashMap<String, SlackUser>>,
}

impl UserGate {
    /// An empty allow-list admits every human user
    pub fn new(directory: Arc<dyn UserDirectory>, allowed: impl IntoIterator<Item = String>) -> Self {
        Self {
            directory,
            allowed: allowed.into_iter().collect(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub async fn authorize(&self, user_id: &str) -> Result<Authorization, ApiError> {
        let cached = self.cache.read().await.get(user_id).cloned();
        let user = if let Some(user) = cached {
            user
        } else {
            let user = self.directory.lookup(user_id).await.map_err(|e| {
                tracing::warn!(user = %user_id, error = %e, "User lookup failed");
                match e {
                    ChatError::Api(_) => ApiError::Unauthorized(e.to_string()),
                    ChatError::Transport(_) | ChatError::Timeout(_) => {
                        ApiError::Internal(e.to_string())
                    }
                }
            })?;
            self.cache
                .write()
                .await
                .insert(user_id.to_string(), user.clone());
            user
        };

        if user.is_automated() {
            return Ok(Authorization::Ignored);
        }
        if !self.allowed.is_empty() && !self.allowed.contains(&user.id) {
            return Err(ApiError::Forbidden);
        }
        Ok(Authorization::Allowed(user))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Directory backed by a fixed map, counting lookups
    #[derive(Default)]
    pub struct StaticDirectory {
        users: HashMap<String, SlackUser>,
        pub lookups: AtomicUsize,
    }

    impl StaticDirectory {
        pub fn with_user(mut self, id: &str, is_bot: bool) -> Self {
            self.users.insert(
                id.to_string(),
                SlackUser {
                    id: id.to_string(),
                    name: id.to_lowercase(),
                    is_bot,
                    is_app_user: false,
                },
            );
            self
        }
    }

    #[async_trait]
    impl UserDirectory for StaticDirectory {
        async fn lookup(&self, user_id: &str) -> Result<SlackUser, ChatError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            self.users
                .get(user_id)
                .cloned()
                .ok_or_else(|| ChatError::Api("users.info failed: user_not_found".into()))
        }
    }

    #[tokio::test]
    async fn test_lookups_are_cached() {
        let directory = Arc::new(StaticDirectory::default().with_user("U1", false));
        let gate = UserGate::new(Arc::clone(&directory) as Arc<dyn UserDirectory>, Vec::new());

        for _ in 0..3 {
            assert!(matches!(
                gate.authorize("U1").await,
                Ok(Authorization::Allowed(_))
            ));
        }
        assert_eq!(directory.lookups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_allow_list_and_bots() {
        let directory = Arc::new(
            StaticDirectory::default()
                .with_user("U1", false)
                .with_user("U2", false)
                .with_user("B1", true),
        );
        let gate = UserGate::new(directory, vec!["U1".to_string()]);

        assert!(matches!(gate.authorize("U1").await, Ok(Authorization::Allowed(_))));
        assert!(matches!(gate.authorize("U2").await, Err(ApiError::Forbidden)));
        assert_eq!(gate.authorize("B1").await.unwrap(), Authorization::Ignored);
        assert!(matches!(
            gate.authorize("U404").await,
            Err(ApiError::Unauthorized(_))
        ));
    }

    struct UnreachableDirectory;

    #[async_trait]
    impl UserDirectory for UnreachableDirectory {
        async fn lookup(&self, _user_id: &str) -> Result<SlackUser, ChatError> {
            Err(ChatError::Timeout(std::time::Duration::from_secs(10)))
        }
    }

    #[tokio::test]
    async fn test_unreachable_directory_is_internal() {
        let gate = UserGate::new(Arc::new(UnreachableDirectory), Vec::new());
        assert!(matches!(
            gate.authorize("U1").await,
            Err(ApiError::Internal(_))
        ));
    }
}
