// Session manager for lifecycle orchestration

use super::storage::{MemorySessionStorage, SessionStorage};
use super::types::{generate_session_id, Session, SessionConfig, SessionError};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, warn};

/// Orchestrates session lookup, validation, persistence and expiration.
///
/// The manager owns its configuration and the background sweep task; the task
/// handle is aborted when the manager is dropped, so multiple managers in one
/// process never collide.
pub struct SessionManager {
    storage: Arc<dyn SessionStorage>,
    config: SessionConfig,
    sweeper: JoinHandle<()>,
}

impl SessionManager {
    /// Create a manager and start its background sweep loop
    pub fn new(
        storage: Arc<dyn SessionStorage>,
        config: SessionConfig,
    ) -> Result<Arc<Self>, SessionError> {
        config.validate()?;

        let sweeper = spawn_sweeper(
            Arc::clone(&storage),
            config.idle_timeout_secs,
            config.absolute_timeout_secs,
            config.sweep_interval_secs,
        );

        Ok(Arc::new(Self {
            storage,
            config,
            sweeper,
        }))
    }

    /// Manager over a fresh in-memory storage with default configuration
    pub fn with_defaults() -> Result<Arc<Self>, SessionError> {
        Self::new(
            Arc::new(MemorySessionStorage::new()),
            SessionConfig::default(),
        )
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Resolve the session presented by a client, falling back to a fresh one.
    ///
    /// A missing cookie, an unknown identifier and an expired record all yield
    /// a brand-new session. A storage read failure is logged and treated as a
    /// miss: the client gets a fresh session rather than a failed request.
    pub async fn begin(&self, cookie_value: Option<&str>) -> Result<Session, SessionError> {
        if let Some(id) = cookie_value {
            match self.storage.read(id).await {
                Ok(Some(session)) => {
                    if self.validate(&session).await? {
                        debug!("Resumed session {}", session.id());
                        return Ok(session);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("Failed to read session from storage: {}", e);
                }
            }
        }

        let session = Session::new()?;
        debug!("Created session {}", session.id());
        Ok(session)
    }

    /// Check both expiration clocks. An expired record is destroyed on the spot.
    ///
    /// A record the manager just ruled dead must be removable; a destroy
    /// failure here is an invariant violation, not a recoverable condition.
    pub async fn validate(&self, session: &Session) -> Result<bool, SessionError> {
        let now = Utc::now();
        let expired = (now - session.created_at).num_seconds() > self.config.absolute_timeout_secs
            || (now - session.last_activity_at).num_seconds() > self.config.idle_timeout_secs;

        if expired {
            self.storage.destroy(&session.id).await.map_err(|e| {
                SessionError::InvariantViolation(format!(
                    "failed to destroy expired session {}: {}",
                    session.id, e
                ))
            })?;
            debug!("Destroyed expired session {}", session.id());
            return Ok(false);
        }

        Ok(true)
    }

    /// Stamp activity and persist the record. Storage failures propagate to
    /// the caller.
    pub async fn save(&self, session: &mut Session) -> Result<(), SessionError> {
        session.touch();
        self.storage.write(session.clone()).await?;
        Ok(())
    }

    /// Replace the session identifier while preserving payload, defeating
    /// session fixation. The record is not written back under the new
    /// identifier; the caller must `save` afterwards.
    pub async fn rotate(&self, session: &mut Session) -> Result<(), SessionError> {
        self.storage.destroy(&session.id).await?;
        session.id = generate_session_id()?;
        debug!("Rotated session identifier to {}", session.id());
        Ok(())
    }

    /// Explicitly remove a session from storage (logout)
    pub async fn destroy(&self, session: &Session) -> Result<(), SessionError> {
        self.storage.destroy(&session.id).await?;
        debug!("Destroyed session {}", session.id());
        Ok(())
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        // Stopping the ticker is the only shutdown handshake; an in-flight
        // sweep pass finishes naturally.
        self.sweeper.abort();
    }
}

fn spawn_sweeper(
    storage: Arc<dyn SessionStorage>,
    idle_timeout_secs: i64,
    absolute_timeout_secs: i64,
    sweep_interval_secs: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(sweep_interval_secs.max(1)));
        // The first tick completes immediately; consume it so sweeps run at
        // interval boundaries only.
        ticker.tick().await;

        loop {
            ticker.tick().await;

            match storage.sweep(idle_timeout_secs, absolute_timeout_secs).await {
                Ok(removed) if removed > 0 => {
                    debug!("Background sweep removed {} session(s)", removed)
                }
                Ok(_) => {}
                Err(e) => warn!("Background session sweep failed: {}", e),
            }
        }
    })
}

/// Shared manager state for axum layers and handlers
#[derive(Clone)]
pub struct SessionManagerState {
    pub manager: Arc<SessionManager>,
}

impl SessionManagerState {
    pub fn new(manager: Arc<SessionManager>) -> Self {
        Self { manager }
    }
}
