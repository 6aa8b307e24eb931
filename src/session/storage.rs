// Session storage backends

use super::types::Session;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Storage backend errors
#[derive(Debug)]
pub enum StorageError {
    ConnectionError(String),
    SerializationError(String),
    InvalidData(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::ConnectionError(msg) => write!(f, "Connection error: {}", msg),
            StorageError::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            StorageError::InvalidData(msg) => write!(f, "Invalid data: {}", msg),
        }
    }
}

impl std::error::Error for StorageError {}

/// Trait for pluggable session storage backends.
///
/// All operations must be safe for concurrent invocation from request tasks
/// and the manager's sweep loop.
#[async_trait]
pub trait SessionStorage: Send + Sync {
    /// Read a session by identifier. A missing identifier is `Ok(None)`, not an error.
    async fn read(&self, id: &str) -> Result<Option<Session>, StorageError>;

    /// Upsert a session keyed by its identifier. Last writer wins.
    async fn write(&self, session: Session) -> Result<(), StorageError>;

    /// Delete a session. Deleting a missing identifier is a no-op.
    async fn destroy(&self, id: &str) -> Result<(), StorageError>;

    /// Delete every session past its idle or absolute timeout.
    /// Returns the number of sessions removed.
    async fn sweep(
        &self,
        idle_timeout_secs: i64,
        absolute_timeout_secs: i64,
    ) -> Result<usize, StorageError>;
}

/// In-memory session storage
///
/// Thread-safe table behind a single reader/writer lock: shared access for
/// reads, exclusive for writes, destroys and sweeps.
pub struct MemorySessionStorage {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
}

impl MemorySessionStorage {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for MemorySessionStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStorage for MemorySessionStorage {
    async fn read(&self, id: &str) -> Result<Option<Session>, StorageError> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(id).cloned())
    }

    async fn write(&self, session: Session) -> Result<(), StorageError> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(session.id.clone(), session);
        Ok(())
    }

    async fn destroy(&self, id: &str) -> Result<(), StorageError> {
        let mut sessions = self.sessions.write().await;
        sessions.remove(id);
        Ok(())
    }

    async fn sweep(
        &self,
        idle_timeout_secs: i64,
        absolute_timeout_secs: i64,
    ) -> Result<usize, StorageError> {
        // The exclusive lock is held for the whole pass so the sweep is atomic
        // with respect to concurrent reads, writes and destroys.
        let mut sessions = self.sessions.write().await;
        let now = Utc::now();
        let before = sessions.len();

        sessions.retain(|_, session| {
            now - session.last_activity_at <= Duration::seconds(idle_timeout_secs)
                && now - session.created_at <= Duration::seconds(absolute_timeout_secs)
        });

        let removed = before - sessions.len();
        if removed > 0 {
            debug!("Swept {} expired session(s)", removed);
        }

        Ok(removed)
    }
}
