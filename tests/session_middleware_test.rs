// End-to-end tests for the session middleware over an axum router

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    routing::get,
    Extension, Json, Router,
};
use http_body_util::BodyExt;
use mem_sessions::{
    session_middleware, MemorySessionStorage, SessionConfig, SessionHandle, SessionManagerState,
    SessionManager, SessionStorage,
};
use serde_json::json;
use std::sync::Arc;
use tower::ServiceExt;

/// Per-session request counter, mirroring the demo server endpoint
async fn count(Extension(session): Extension<SessionHandle>) -> Json<serde_json::Value> {
    let count = session
        .get("count")
        .await
        .and_then(|v| v.as_i64())
        .unwrap_or(0)
        + 1;

    session.put("count", json!(count)).await;

    Json(json!(count))
}

async fn rotate(
    axum::extract::State(state): axum::extract::State<SessionManagerState>,
    Extension(session): Extension<SessionHandle>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    session
        .rotate(&state.manager)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(json!("rotated")))
}

fn test_app(storage: Arc<MemorySessionStorage>, config: SessionConfig) -> Router {
    let manager = SessionManager::new(storage, config).unwrap();
    let state = SessionManagerState::new(manager);

    Router::new()
        .route("/test", get(count))
        .route("/rotate", get(rotate))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            session_middleware,
        ))
        .with_state(state)
}

fn request(path: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(path);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

fn session_cookie(response: &axum::response::Response) -> String {
    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .expect("response should carry a session cookie")
        .to_str()
        .unwrap();

    // "session=<id>; Path=/; ..." -> "session=<id>"
    set_cookie.split(';').next().unwrap().to_string()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_counter_increments_across_requests() {
    let app = test_app(
        Arc::new(MemorySessionStorage::new()),
        SessionConfig::default(),
    );

    let response = app.clone().oneshot(request("/test", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = session_cookie(&response);
    assert_eq!(body_string(response).await, "1");

    let response = app
        .clone()
        .oneshot(request("/test", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(body_string(response).await, "2");

    let response = app.oneshot(request("/test", Some(&cookie))).await.unwrap();
    assert_eq!(body_string(response).await, "3");
}

#[tokio::test]
async fn test_forced_sweep_discards_session() {
    let storage = Arc::new(MemorySessionStorage::new());
    let app = test_app(storage.clone(), SessionConfig::default());

    let response = app.clone().oneshot(request("/test", None)).await.unwrap();
    let cookie = session_cookie(&response);
    assert_eq!(body_string(response).await, "1");

    let response = app
        .clone()
        .oneshot(request("/test", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(body_string(response).await, "2");

    // A sweep with an idle timeout of zero expires everything
    storage.sweep(0, 0).await.unwrap();

    let response = app.oneshot(request("/test", Some(&cookie))).await.unwrap();
    let fresh_cookie = session_cookie(&response);
    assert_eq!(body_string(response).await, "1");
    assert_ne!(fresh_cookie, cookie);
}

#[tokio::test]
async fn test_idle_expired_session_is_replaced_transparently() {
    let config = SessionConfig {
        idle_timeout_secs: 0,
        ..Default::default()
    };
    let app = test_app(Arc::new(MemorySessionStorage::new()), config);

    let response = app.clone().oneshot(request("/test", None)).await.unwrap();
    let first_cookie = session_cookie(&response);
    assert_eq!(body_string(response).await, "1");

    // The replayed session is already idle-expired, so the client silently
    // gets a fresh one: no error, just loss of prior state.
    let response = app
        .oneshot(request("/test", Some(&first_cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let second_cookie = session_cookie(&response);
    assert_eq!(body_string(response).await, "1");
    assert_ne!(second_cookie, first_cookie);
}

#[tokio::test]
async fn test_cookie_attributes_and_response_headers() {
    let config = SessionConfig {
        cookie_domain: Some("example.com".to_string()),
        ..Default::default()
    };
    let app = test_app(Arc::new(MemorySessionStorage::new()), config);

    let response = app.oneshot(request("/test", None)).await.unwrap();

    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap();
    assert!(set_cookie.starts_with("session="));
    assert!(set_cookie.contains("HttpOnly"));
    assert!(set_cookie.contains("Secure"));
    assert!(set_cookie.contains("Path=/"));
    assert!(set_cookie.contains("Max-Age=600"));
    assert!(set_cookie.contains("Domain=example.com"));

    assert_eq!(response.headers().get(header::VARY).unwrap(), "Cookie");
    assert_eq!(
        response.headers().get(header::CACHE_CONTROL).unwrap(),
        r#"no-cache="Set-Cookie""#
    );
}

#[tokio::test]
async fn test_session_cookie_is_set_exactly_once() {
    let app = test_app(
        Arc::new(MemorySessionStorage::new()),
        SessionConfig::default(),
    );

    let response = app.oneshot(request("/test", None)).await.unwrap();

    assert_eq!(
        response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .count(),
        1
    );
}

#[tokio::test]
async fn test_rotation_preserves_state_and_invalidates_old_cookie() {
    let app = test_app(
        Arc::new(MemorySessionStorage::new()),
        SessionConfig::default(),
    );

    let response = app.clone().oneshot(request("/test", None)).await.unwrap();
    let old_cookie = session_cookie(&response);
    assert_eq!(body_string(response).await, "1");

    // Rotation hands the client a new identifier in the same response
    let response = app
        .clone()
        .oneshot(request("/rotate", Some(&old_cookie)))
        .await
        .unwrap();
    let new_cookie = session_cookie(&response);
    assert_ne!(new_cookie, old_cookie);

    // Payload survived under the new identifier
    let response = app
        .clone()
        .oneshot(request("/test", Some(&new_cookie)))
        .await
        .unwrap();
    assert_eq!(body_string(response).await, "2");

    // The old identifier now resolves to a fresh session
    let response = app
        .oneshot(request("/test", Some(&old_cookie)))
        .await
        .unwrap();
    assert_eq!(body_string(response).await, "1");
}

#[tokio::test]
async fn test_unrelated_cookies_are_ignored() {
    let app = test_app(
        Arc::new(MemorySessionStorage::new()),
        SessionConfig::default(),
    );

    let response = app
        .oneshot(request("/test", Some("theme=dark; lang=en")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "1");
}
