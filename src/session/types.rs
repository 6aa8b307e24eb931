// Session types and identifier generation

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use super::storage::StorageError;

/// Session manager configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Idle timeout: maximum gap since last activity before the session is discarded
    pub idle_timeout_secs: i64,
    /// Absolute timeout: maximum session age since creation, regardless of activity
    pub absolute_timeout_secs: i64,
    /// Name of the cookie carrying the session identifier
    pub cookie_name: String,
    /// Optional Domain attribute for the session cookie
    pub cookie_domain: Option<String>,
    /// Interval between background sweep passes
    pub sweep_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 600,      // 10 minutes
            absolute_timeout_secs: 3600, // 1 hour
            cookie_name: "session".to_string(),
            cookie_domain: None,
            sweep_interval_secs: 300, // 5 minutes
        }
    }
}

impl SessionConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.cookie_name.is_empty() {
            return Err(SessionError::EmptyCookieName);
        }
        Ok(())
    }
}

/// Errors surfaced by the session manager and middleware
#[derive(Debug)]
pub enum SessionError {
    /// The configured cookie name is empty
    EmptyCookieName,
    /// The secure random source failed while generating an identifier
    IdGeneration(String),
    /// A storage operation failed
    Storage(StorageError),
    /// A record the manager ruled expired could not be removed from storage
    InvariantViolation(String),
    /// A handler asked for the session on a request the middleware never saw
    SessionNotBound,
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::EmptyCookieName => write!(f, "Cookie name cannot be empty"),
            SessionError::IdGeneration(msg) => {
                write!(f, "Failed to generate session identifier: {}", msg)
            }
            SessionError::Storage(err) => write!(f, "Session storage error: {}", err),
            SessionError::InvariantViolation(msg) => {
                write!(f, "Session invariant violation: {}", msg)
            }
            SessionError::SessionNotBound => {
                write!(
                    f,
                    "Session not bound to request; is the session middleware installed?"
                )
            }
        }
    }
}

impl std::error::Error for SessionError {}

impl From<StorageError> for SessionError {
    fn from(err: StorageError) -> Self {
        SessionError::Storage(err)
    }
}

/// A server-held session record keyed by an opaque identifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub(crate) id: String,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) last_activity_at: DateTime<Utc>,
    pub(crate) data: HashMap<String, Value>,
}

impl Session {
    /// Create a fresh session with a newly generated identifier and empty payload
    pub fn new() -> Result<Self, SessionError> {
        let now = Utc::now();

        Ok(Self {
            id: generate_session_id()?,
            created_at: now,
            last_activity_at: now,
            data: HashMap::new(),
        })
    }

    /// The opaque session identifier
    pub fn id(&self) -> &str {
        &self.id
    }

    /// When the session was created; anchors the absolute expiration check
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Last recorded activity; anchors the idle expiration check
    pub fn last_activity_at(&self) -> DateTime<Utc> {
        self.last_activity_at
    }

    /// Read a payload value. An absent key yields `None`.
    pub fn get(&mut self, key: &str) -> Option<Value> {
        self.touch();
        self.data.get(key).cloned()
    }

    /// Store a payload value under `key`, replacing any previous value
    pub fn put(&mut self, key: impl Into<String>, value: Value) {
        self.touch();
        self.data.insert(key.into(), value);
    }

    /// Remove a payload value. Removing an absent key is a no-op.
    pub fn remove(&mut self, key: &str) {
        self.touch();
        self.data.remove(key);
    }

    // Touching payload counts as activity
    pub(crate) fn touch(&mut self) {
        self.last_activity_at = Utc::now();
    }
}

/// Generate a 32-byte cryptographically random identifier, URL-safe without padding.
///
/// A failing random source is fatal: a predictable identifier is a security
/// failure, not a condition to degrade from.
pub(crate) fn generate_session_id() -> Result<String, SessionError> {
    let mut bytes = [0u8; 32];

    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| SessionError::IdGeneration(e.to_string()))?;

    Ok(URL_SAFE_NO_PAD.encode(bytes))
}
