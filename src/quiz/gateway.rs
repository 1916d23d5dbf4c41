//! Per-connection session records and the identity gate.
//!
//! Every connection gets an explicit record at handshake time instead of ad
//! hoc fields attached to a socket object. The gate re-resolves the session
//! token before every privileged event because the backing session can
//! expire or be revoked while the connection stays open.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::{QuizError, Result};
use crate::quiz::store::{Identity, SessionAuth, UserDirectory};

/// Server-generated identifier for one WebSocket connection.
pub type ConnectionId = u64;

/// Everything the server knows about one connection.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub token: String,
    pub identity: Identity,
    pub room_code: Option<String>,
    pub is_host: bool,
}

pub struct ConnectionGateway {
    auth: Arc<dyn SessionAuth>,
    users: Arc<dyn UserDirectory>,
    records: RwLock<HashMap<ConnectionId, SessionRecord>>,
    next_id: AtomicU64,
}

impl ConnectionGateway {
    pub fn new(auth: Arc<dyn SessionAuth>, users: Arc<dyn UserDirectory>) -> Self {
        Self {
            auth,
            users,
            records: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Handshake: resolve the token and bind a fresh connection id to it.
    /// A token that does not resolve fails the handshake outright.
    pub async fn attach(&self, token: &str) -> Result<ConnectionId> {
        let identity = self
            .auth
            .resolve(token)
            .await
            .ok_or(QuizError::InvalidSession)?;

        let conn_id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let record = SessionRecord {
            token: token.to_string(),
            identity: identity.clone(),
            room_code: None,
            is_host: false,
        };
        self.records.write().await.insert(conn_id, record);

        tracing::info!(conn_id, user_id = identity.user_id, "Session attached");
        Ok(conn_id)
    }

    /// Re-validates the session bound to a connection. Runs per event, not
    /// only at connect time: both the token and the account behind it must
    /// still be live.
    pub async fn authorize(&self, conn_id: ConnectionId) -> Result<Identity> {
        let token = {
            let records = self.records.read().await;
            records
                .get(&conn_id)
                .ok_or(QuizError::SessionNotFound(conn_id))?
                .token
                .clone()
        };

        let identity = self
            .auth
            .resolve(&token)
            .await
            .ok_or(QuizError::InvalidSession)?;

        self.users
            .find_user(identity.user_id)
            .await
            .ok_or(QuizError::InvalidSession)?;

        Ok(identity)
    }

    /// Records which room the connection belongs to and in which role.
    pub async fn bind_room(&self, conn_id: ConnectionId, code: &str, is_host: bool) {
        let mut records = self.records.write().await;
        if let Some(record) = records.get_mut(&conn_id) {
            record.room_code = Some(code.to_string());
            record.is_host = is_host;
        }
    }

    pub async fn unbind_room(&self, conn_id: ConnectionId) {
        let mut records = self.records.write().await;
        if let Some(record) = records.get_mut(&conn_id) {
            record.room_code = None;
            record.is_host = false;
        }
    }

    /// The room this connection is bound to, with its host flag.
    pub async fn room_of(&self, conn_id: ConnectionId) -> Option<(String, bool)> {
        let records = self.records.read().await;
        records
            .get(&conn_id)
            .and_then(|r| r.room_code.clone().map(|code| (code, r.is_host)))
    }

    /// Drops the record for a closed connection, returning it so the
    /// disconnect reconciler can finish the room-side cleanup.
    pub async fn detach(&self, conn_id: ConnectionId) -> Option<SessionRecord> {
        self.records.write().await.remove(&conn_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quiz::store::{InMemorySessions, InMemoryUsers};

    async fn gateway_with_alice() -> (ConnectionGateway, Arc<InMemorySessions>, Arc<InMemoryUsers>) {
        let sessions = InMemorySessions::new();
        let users = InMemoryUsers::new();
        let alice = Identity {
            user_id: 1,
            username: "alice".to_string(),
        };
        users.insert(alice.clone()).await;
        sessions.insert("alice-token", alice).await;
        let gateway = ConnectionGateway::new(sessions.clone(), users.clone());
        (gateway, sessions, users)
    }

    #[tokio::test]
    async fn test_attach_rejects_unknown_token() {
        let (gateway, _sessions, _users) = gateway_with_alice().await;
        let result = gateway.attach("bogus").await;
        assert!(matches!(result, Err(QuizError::InvalidSession)));
    }

    #[tokio::test]
    async fn test_authorize_after_revocation_fails() {
        let (gateway, sessions, _users) = gateway_with_alice().await;
        let conn_id = gateway.attach("alice-token").await.unwrap();
        assert!(gateway.authorize(conn_id).await.is_ok());

        sessions.revoke("alice-token").await;
        let result = gateway.authorize(conn_id).await;
        assert!(matches!(result, Err(QuizError::InvalidSession)));
    }

    #[tokio::test]
    async fn test_authorize_after_account_deletion_fails() {
        let (gateway, _sessions, users) = gateway_with_alice().await;
        let conn_id = gateway.attach("alice-token").await.unwrap();

        users.remove(1).await;
        let result = gateway.authorize(conn_id).await;
        assert!(matches!(result, Err(QuizError::InvalidSession)));
    }

    #[tokio::test]
    async fn test_room_binding_lifecycle() {
        let (gateway, _sessions, _users) = gateway_with_alice().await;
        let conn_id = gateway.attach("alice-token").await.unwrap();
        assert_eq!(gateway.room_of(conn_id).await, None);

        gateway.bind_room(conn_id, "123456", true).await;
        assert_eq!(
            gateway.room_of(conn_id).await,
            Some(("123456".to_string(), true))
        );

        let record = gateway.detach(conn_id).await.unwrap();
        assert_eq!(record.room_code.as_deref(), Some("123456"));
        assert!(record.is_host);
        assert!(gateway.detach(conn_id).await.is_none());
    }

    #[tokio::test]
    async fn test_connection_ids_are_unique() {
        let (gateway, _sessions, _users) = gateway_with_alice().await;
        let a = gateway.attach("alice-token").await.unwrap();
        let b = gateway.attach("alice-token").await.unwrap();
        assert_ne!(a, b);
    }
}
