//! Guestbook routes
//!
//! - `GET /guestbook`: public list, newest first
//! - `POST /guestbook`: sign (session required)
//! - `DELETE /guestbook/{entry_id}`: delete own entry (session required)

use std::sync::Arc;

use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;
use session_core::Identity;
use tracing::{info, warn};

use super::error::ApiError;
use super::router::AppState;
use crate::store::{Entry, list_entries};

/// Body of `POST /guestbook`
#[derive(Debug, Default, Deserialize)]
struct SignRequest {
    #[serde(default)]
    message: Option<String>,
}

/// Trim and bound-check a submitted message
fn validate_message(raw: Option<&str>, max_len: usize) -> Result<String, ApiError> {
    let message = raw.unwrap_or_default().trim();
    if message.is_empty() {
        return Err(ApiError::BadRequest("Message is required".to_string()));
    }
    if message.chars().count() > max_len {
        return Err(ApiError::BadRequest(format!(
            "Message must be {max_len} characters or fewer"
        )));
    }
    Ok(message.to_string())
}

/// `GET /guestbook`
pub async fn list(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let entries = list_entries(state.store.as_ref()).await?;
    Ok(Json(json!({ "entries": entries })))
}

/// `POST /guestbook`
pub async fn sign(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let request: SignRequest = if body.is_empty() {
        SignRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|_| ApiError::BadRequest("Invalid JSON body".to_string()))?
    };

    let message = validate_message(
        request.message.as_deref(),
        state.config.guestbook.max_message_length,
    )?;

    let entry = Entry::new(identity.handle, identity.avatar_url, message);
    state.store.put(entry.clone()).await?;
    info!(entry_id = %entry.entry_id, login = %entry.login, "Guestbook signed");

    Ok((StatusCode::CREATED, Json(json!({ "entry": entry }))))
}

/// `DELETE /guestbook/{entry_id}`
pub async fn remove(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(entry_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let Some(entry) = state.store.get(&entry_id).await? else {
        return Err(ApiError::NotFound("Entry not found".to_string()));
    };

    if !entry.is_authored_by(&identity.handle) {
        warn!(
            entry_id = %entry_id,
            author = %entry.login,
            requester = %identity.handle,
            "Refused to delete another user's entry"
        );
        return Err(ApiError::Forbidden(
            "You can only delete your own entries".to_string(),
        ));
    }

    state.store.delete(&entry_id).await?;
    info!(entry_id = %entry_id, login = %identity.handle, "Entry deleted");

    Ok(Json(json!({ "ok": true })))
}
