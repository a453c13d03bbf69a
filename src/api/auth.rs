//! Sign-in routes and the session middleware
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/auth/login`    | Redirect to GitHub's authorize page |
//! | `GET`  | `/auth/callback` | Exchange the code, set the session cookie, redirect to the site |
//! | `GET`  | `/auth/me`       | Current user (session required) |
//! | `POST` | `/auth/logout`   | Expire the session cookie |
//!
//! Sessions are stateless: logging out only asks the browser to forget the
//! cookie. A copied token stays valid until it expires.

use std::sync::Arc;

use axum::{
    Extension, Json,
    body::Body,
    extract::{Query, State},
    http::{HeaderValue, Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;
use session_core::Identity;
use tracing::{debug, error, info, warn};

use super::cookie::{clear_cookie, issue_cookie, session_cookie};
use super::error::ApiError;
use super::router::AppState;
use crate::github::ClientCredentials;
use crate::{Error, Result};

/// Reject requests without a valid session; otherwise attach the session's
/// [`Identity`] to the request extensions.
///
/// Runs before the handler, so nothing a protected handler does can happen
/// for an unauthenticated caller.
pub async fn require_session(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    let Some(token) = session_cookie(request.headers()) else {
        debug!(path = %path, "No session cookie");
        return ApiError::Unauthenticated.into_response();
    };

    let secrets = match state.secrets.get().await {
        Ok(secrets) => secrets,
        Err(e) => return ApiError::from(e).into_response(),
    };

    let Some(claims) = session_core::verify(&token, &secrets.signing_key) else {
        warn!(path = %path, "Rejected session cookie");
        return ApiError::InvalidSession.into_response();
    };

    request.extensions_mut().insert(claims.identity());
    next.run(request).await
}

/// `GET /auth/login`
pub async fn login(State(state): State<Arc<AppState>>) -> std::result::Result<Response, ApiError> {
    let secrets = state.secrets.get().await?;
    let url = state
        .identity
        .authorize_url(&secrets.github_client_id, &state.config.site.callback_url())?;

    Ok(found(&url, None))
}

/// Query string of the OAuth callback
#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    /// Authorization code
    pub code: Option<String>,
}

/// `GET /auth/callback?code=...`
///
/// Any failure after the code is present sends the browser back to the site
/// with `?auth_error=1` rather than showing a raw error.
pub async fn callback(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CallbackParams>,
) -> Response {
    let Some(code) = params.code.filter(|c| !c.is_empty()) else {
        return ApiError::BadRequest("Missing code parameter".to_string()).into_response();
    };

    let frontend = &state.config.site.frontend_url;
    match complete_login(&state, &code).await {
        Ok((identity, cookie)) => {
            info!(login = %identity.handle, "User signed in");
            found(frontend, Some(cookie))
        }
        Err(e) => {
            error!(error = %e, "OAuth callback failed");
            found(&format!("{frontend}?auth_error=1"), None)
        }
    }
}

/// Sign the user in and build their `Set-Cookie` value
async fn complete_login(state: &AppState, code: &str) -> Result<(Identity, HeaderValue)> {
    let secrets = state.secrets.get().await?;
    let credentials = ClientCredentials {
        client_id: &secrets.github_client_id,
        client_secret: &secrets.github_client_secret,
    };

    let identity = state.identity.authenticate(code, credentials).await?;
    let token = session_core::issue(&identity, &secrets.signing_key)?;
    let cookie = HeaderValue::from_str(&issue_cookie(
        &token,
        &state.config.site.cookie_domain(),
    ))
    .map_err(|e| Error::Internal(format!("Session cookie is not a valid header value: {e}")))?;
    Ok((identity, cookie))
}

/// `GET /auth/me`
pub async fn me(Extension(identity): Extension<Identity>) -> impl IntoResponse {
    Json(json!({
        "id": identity.subject_id,
        "login": identity.handle,
        "avatar_url": identity.avatar_url,
    }))
}

/// `POST /auth/logout`
pub async fn logout(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::SET_COOKIE, clear_cookie(&state.config.site.cookie_domain()))],
        Json(json!({ "ok": true })),
    )
}

/// 302 Found, optionally setting a cookie
fn found(location: &str, cookie: Option<HeaderValue>) -> Response {
    let mut response = (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response();
    if let Some(cookie) = cookie {
        response.headers_mut().insert(header::SET_COOKIE, cookie);
    }
    response
}
