//! HTTP router and shared state

use std::sync::Arc;

use axum::{
    Json, Router,
    http::{HeaderValue, Method, StatusCode, header},
    middleware,
    response::IntoResponse,
    routing::{delete, get, post},
};
use serde_json::json;
use tower_http::{
    catch_panic::CatchPanicLayer, cors::CorsLayer, limit::RequestBodyLimitLayer,
    timeout::TimeoutLayer, trace::TraceLayer,
};

use super::auth::{self, require_session};
use super::guestbook;
use crate::config::Config;
use crate::github::IdentityProvider;
use crate::secrets::SecretCache;
use crate::store::EntryStore;
use crate::{Error, Result};

/// Shared application state
pub struct AppState {
    /// Configuration
    pub config: Config,
    /// Cached secrets (OAuth client credentials, signing key)
    pub secrets: Arc<SecretCache>,
    /// Identity provider for the OAuth flow
    pub identity: Arc<dyn IdentityProvider>,
    /// Entry storage
    pub store: Arc<dyn EntryStore>,
}

/// Create the router
///
/// Routes that act on behalf of a user sit behind [`require_session`].
pub fn create_router(state: Arc<AppState>) -> Result<Router> {
    let session = middleware::from_fn_with_state(Arc::clone(&state), require_session);

    let frontend: HeaderValue = state
        .config
        .site
        .frontend_url
        .parse()
        .map_err(|e| Error::Config(format!("Invalid frontend_url: {e}")))?;
    let cors = CorsLayer::new()
        .allow_origin(frontend)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE]);

    let server = &state.config.server;
    let router = Router::new()
        .route("/health", get(health_handler))
        .route("/auth/login", get(auth::login))
        .route("/auth/callback", get(auth::callback))
        .route("/auth/me", get(auth::me).route_layer(session.clone()))
        .route("/auth/logout", post(auth::logout))
        .route(
            "/guestbook",
            get(guestbook::list).merge(post(guestbook::sign).route_layer(session.clone())),
        )
        .route(
            "/guestbook/{entry_id}",
            delete(guestbook::remove).route_layer(session),
        )
        .fallback(not_found_handler)
        .layer(RequestBodyLimitLayer::new(server.max_body_size))
        .layer(TimeoutLayer::new(server.request_timeout))
        .layer(cors)
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    Ok(router)
}

/// `GET /health`
async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn not_found_handler() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "Not found" })))
}
