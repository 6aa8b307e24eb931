// Session middleware
// Binds a session record to each request and emits the session cookie

use crate::session::{Session, SessionConfig, SessionError, SessionManager, SessionManagerState};
use axum::{
    extract::{Request, State},
    http::{header, Extensions, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::Response,
};
use cookie::Cookie;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::error;

/// Shared handle to the session bound to the current request.
///
/// Handlers extract it with `Extension<SessionHandle>`. Payload accessors lock
/// the record internally, so handler mutations and the middleware's save step
/// observe the same state. A session is expected to be driven by one request
/// at a time; if a client replays the same cookie concurrently, last save wins.
#[derive(Clone)]
pub struct SessionHandle(Arc<Mutex<Session>>);

impl SessionHandle {
    fn new(session: Session) -> Self {
        Self(Arc::new(Mutex::new(session)))
    }

    /// Retrieve the handle bound by the session middleware.
    ///
    /// Calling this on a request that never passed through the middleware is a
    /// programming error, surfaced as `SessionError::SessionNotBound`.
    pub fn from_extensions(extensions: &Extensions) -> Result<Self, SessionError> {
        extensions
            .get::<SessionHandle>()
            .cloned()
            .ok_or(SessionError::SessionNotBound)
    }

    /// Current session identifier
    pub async fn id(&self) -> String {
        self.0.lock().await.id().to_string()
    }

    /// Read a payload value. An absent key yields `None`.
    pub async fn get(&self, key: &str) -> Option<Value> {
        self.0.lock().await.get(key)
    }

    /// Store a payload value under `key`, replacing any previous value
    pub async fn put(&self, key: impl Into<String>, value: Value) {
        self.0.lock().await.put(key, value);
    }

    /// Remove a payload value
    pub async fn remove(&self, key: &str) {
        self.0.lock().await.remove(key);
    }

    /// Rotate the session identifier through the manager, defeating session
    /// fixation. The middleware's save step persists the record under the new
    /// identifier and replays it to the client.
    pub async fn rotate(&self, manager: &SessionManager) -> Result<(), SessionError> {
        let mut session = self.0.lock().await;
        manager.rotate(&mut session).await
    }

    /// Run `f` against the locked record for bulk inspection or edits
    pub async fn with_session<R>(&self, f: impl FnOnce(&mut Session) -> R) -> R {
        let mut session = self.0.lock().await;
        f(&mut session)
    }
}

/// axum middleware wiring sessions into the request/response cycle.
///
/// Resolves the inbound cookie to a session (or creates a fresh one), binds it
/// into the request extensions, runs the inner handler, saves the record and
/// decorates the response with the session cookie and cache headers.
pub async fn session_middleware(
    State(state): State<SessionManagerState>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let manager = &state.manager;

    let cookie_value = request
        .headers()
        .get(header::COOKIE)
        .and_then(|h| h.to_str().ok())
        .and_then(|raw| find_session_cookie(raw, &manager.config().cookie_name));

    let session = manager
        .begin(cookie_value.as_deref())
        .await
        .map_err(|e| {
            error!("Failed to begin session: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    let handle = SessionHandle::new(session);
    request.extensions_mut().insert(handle.clone());

    let mut response = next.run(request).await;

    // Persist before the response leaves. The cookie replays whatever
    // identifier the record carries now, so a rotation performed inside the
    // handler reaches the client here.
    let (id, saved) = {
        let mut session = handle.0.lock().await;
        let result = manager.save(&mut session).await;
        (session.id().to_string(), result)
    };
    if let Err(e) = saved {
        error!("Failed to save session: {}", e);
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }

    let headers = response.headers_mut();
    headers.insert(header::VARY, HeaderValue::from_static("Cookie"));
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static(r#"no-cache="Set-Cookie""#),
    );
    set_session_cookie(headers, manager.config(), &id);

    Ok(response)
}

fn find_session_cookie(raw: &str, name: &str) -> Option<String> {
    Cookie::split_parse(raw)
        .filter_map(|c| c.ok())
        .find(|c| c.name() == name)
        .map(|c| c.value().to_string())
}

// The session cookie is appended exactly once per response, after the handler
// has produced the body.
fn set_session_cookie(headers: &mut HeaderMap, config: &SessionConfig, id: &str) {
    let mut cookie = Cookie::new(config.cookie_name.clone(), id.to_string());
    cookie.set_http_only(true);
    cookie.set_secure(true);
    cookie.set_path("/");
    cookie.set_max_age(cookie::time::Duration::seconds(config.idle_timeout_secs));
    if let Some(domain) = &config.cookie_domain {
        cookie.set_domain(domain.clone());
    }

    match HeaderValue::from_str(&cookie.to_string()) {
        Ok(value) => {
            headers.append(header::SET_COOKIE, value);
        }
        Err(e) => error!("Failed to encode session cookie: {}", e),
    }
}
