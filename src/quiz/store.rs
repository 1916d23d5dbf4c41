//! Read-only interfaces to the external account and quiz systems.
//!
//! The session core never owns quiz content or user accounts. It consults
//! them through these traits to resolve session tokens and to verify quiz
//! ownership before every privileged host action. The in-memory
//! implementations back the binary (seeded from the environment) and the
//! test suite.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

pub type UserId = u64;
pub type QuizId = u64;

/// An authenticated identity, as established by the external login system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    pub username: String,
}

/// Resolves an opaque session token to the identity it was issued for.
/// Tokens can expire or be revoked at any time, so callers must not cache
/// the result across events.
#[async_trait]
pub trait SessionAuth: Send + Sync {
    async fn resolve(&self, token: &str) -> Option<Identity>;
}

/// Account lookup. A resolved token is only as good as the account behind
/// it: a deleted user invalidates every outstanding session.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_user(&self, user_id: UserId) -> Option<Identity>;
}

/// Quiz content lookup, reduced to the single question the session core
/// ever asks: who owns this quiz?
#[async_trait]
pub trait QuizStore: Send + Sync {
    async fn owner_of(&self, quiz_id: QuizId) -> Option<UserId>;
}

pub struct InMemorySessions {
    tokens: RwLock<HashMap<String, Identity>>,
}

impl InMemorySessions {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            tokens: RwLock::new(HashMap::new()),
        })
    }

    pub async fn insert(&self, token: impl Into<String>, identity: Identity) {
        self.tokens.write().await.insert(token.into(), identity);
    }

    /// Revoking a token takes effect on the next gated event, even for
    /// connections that authenticated with it earlier.
    pub async fn revoke(&self, token: &str) {
        self.tokens.write().await.remove(token);
    }
}

#[async_trait]
impl SessionAuth for InMemorySessions {
    async fn resolve(&self, token: &str) -> Option<Identity> {
        self.tokens.read().await.get(token).cloned()
    }
}

pub struct InMemoryUsers {
    users: RwLock<HashMap<UserId, Identity>>,
}

impl InMemoryUsers {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            users: RwLock::new(HashMap::new()),
        })
    }

    pub async fn insert(&self, identity: Identity) {
        self.users.write().await.insert(identity.user_id, identity);
    }

    pub async fn remove(&self, user_id: UserId) {
        self.users.write().await.remove(&user_id);
    }
}

#[async_trait]
impl UserDirectory for InMemoryUsers {
    async fn find_user(&self, user_id: UserId) -> Option<Identity> {
        self.users.read().await.get(&user_id).cloned()
    }
}

pub struct InMemoryQuizzes {
    owners: RwLock<HashMap<QuizId, UserId>>,
}

impl InMemoryQuizzes {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            owners: RwLock::new(HashMap::new()),
        })
    }

    pub async fn insert(&self, quiz_id: QuizId, owner: UserId) {
        self.owners.write().await.insert(quiz_id, owner);
    }

    /// Deleting a quiz mid-session is the case that forces ownership to be
    /// re-verified on every host action instead of cached at connect time.
    pub async fn remove(&self, quiz_id: QuizId) {
        self.owners.write().await.remove(&quiz_id);
    }
}

#[async_trait]
impl QuizStore for InMemoryQuizzes {
    async fn owner_of(&self, quiz_id: QuizId) -> Option<UserId> {
        self.owners.read().await.get(&quiz_id).copied()
    }
}

/// Builds the in-memory collaborators from the environment.
///
/// `QUIZ_AUTH_TOKENS` holds comma-separated `token:user_id:username`
/// entries; `QUIZ_OWNERS` holds comma-separated `quiz_id:user_id` entries.
/// Malformed entries are skipped with a warning rather than aborting
/// startup.
pub async fn seed_from_env() -> (Arc<InMemorySessions>, Arc<InMemoryUsers>, Arc<InMemoryQuizzes>) {
    let sessions = InMemorySessions::new();
    let users = InMemoryUsers::new();
    let quizzes = InMemoryQuizzes::new();

    if let Ok(raw) = std::env::var("QUIZ_AUTH_TOKENS") {
        for entry in raw.split(',').filter(|e| !e.trim().is_empty()) {
            let parts: Vec<&str> = entry.trim().splitn(3, ':').collect();
            let parsed = match parts.as_slice() {
                [token, user_id, username] => user_id
                    .parse::<UserId>()
                    .ok()
                    .map(|id| (token.to_string(), id, username.to_string())),
                _ => None,
            };
            match parsed {
                Some((token, user_id, username)) => {
                    let identity = Identity { user_id, username };
                    users.insert(identity.clone()).await;
                    sessions.insert(token, identity).await;
                }
                None => {
                    tracing::warn!(entry = %entry, "Skipping malformed QUIZ_AUTH_TOKENS entry");
                }
            }
        }
    }

    if let Ok(raw) = std::env::var("QUIZ_OWNERS") {
        for entry in raw.split(',').filter(|e| !e.trim().is_empty()) {
            let parts: Vec<&str> = entry.trim().splitn(2, ':').collect();
            let parsed = match parts.as_slice() {
                [quiz_id, user_id] => quiz_id
                    .parse::<QuizId>()
                    .ok()
                    .zip(user_id.parse::<UserId>().ok()),
                _ => None,
            };
            match parsed {
                Some((quiz_id, user_id)) => quizzes.insert(quiz_id, user_id).await,
                None => {
                    tracing::warn!(entry = %entry, "Skipping malformed QUIZ_OWNERS entry");
                }
            }
        }
    }

    (sessions, users, quizzes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_and_revoke() {
        let sessions = InMemorySessions::new();
        let identity = Identity {
            user_id: 1,
            username: "alice".to_string(),
        };
        sessions.insert("tok", identity.clone()).await;

        assert_eq!(sessions.resolve("tok").await, Some(identity));
        sessions.revoke("tok").await;
        assert_eq!(sessions.resolve("tok").await, None);
    }

    #[tokio::test]
    async fn test_quiz_ownership_lookup() {
        let quizzes = InMemoryQuizzes::new();
        quizzes.insert(5, 1).await;

        assert_eq!(quizzes.owner_of(5).await, Some(1));
        assert_eq!(quizzes.owner_of(6).await, None);

        quizzes.remove(5).await;
        assert_eq!(quizzes.owner_of(5).await, None);
    }
}
