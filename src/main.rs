use axum::{routing::get, Extension, Json, Router};
use mem_sessions::{session_middleware, SessionHandle, SessionManager, SessionManagerState};
use serde_json::json;
use std::net::SocketAddr;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mem_sessions=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    let manager = match SessionManager::with_defaults() {
        Ok(manager) => manager,
        Err(e) => {
            tracing::error!("Failed to start session manager: {}", e);
            std::process::exit(1);
        }
    };
    let state = SessionManagerState::new(manager);

    // Build our application with routes
    let app = Router::new()
        .route("/test", get(count))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            session_middleware,
        ))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    // Run the server
    let port = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(4200);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Starting session demo server on {}", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}

/// Per-session request counter
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
