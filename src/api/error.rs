//! HTTP error responses
//!
//! Every error body has the shape `{"error": "<message>"}`. Session failures
//! map to exactly two messages: one for a missing cookie and one for every
//! verification failure, whatever the cause.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::error;

use crate::Error;

/// An error rendered as a JSON response
#[derive(Debug)]
pub enum ApiError {
    /// 400 with a client-facing message
    BadRequest(String),
    /// 401: no session cookie
    Unauthenticated,
    /// 401: the session cookie failed verification
    InvalidSession,
    /// 403 with a client-facing message
    Forbidden(String),
    /// 404 with a client-facing message
    NotFound(String),
    /// 500; details are logged, never returned
    Internal(Error),
}

impl ApiError {
    /// Status code for this error
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthenticated | Self::InvalidSession => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown to the client
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::BadRequest(m) | Self::Forbidden(m) | Self::NotFound(m) => m.as_str(),
            Self::Unauthenticated => "Not authenticated",
            Self::InvalidSession => "Invalid or expired session",
            Self::Internal(_) => "Internal server error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self::Internal(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Internal(ref err) = self {
            error!(error = %err, upstream = err.is_upstream(), "Request failed");
        }
        (self.status(), Json(json!({ "error": self.message() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_failures_share_status() {
        assert_eq!(ApiError::Unauthenticated.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::InvalidSession.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::InvalidSession.message(), "Invalid or expired session");
    }

    #[test]
    fn test_internal_error_hides_details() {
        let err = ApiError::from(Error::SecretStore("ssm timeout at 10.0.0.1".into()));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message(), "Internal server error");
    }
}
