//! Error types for the guestbook API

use std::io;

use thiserror::Error;

/// Result type alias for the guestbook API
pub type Result<T> = std::result::Result<T, Error>;

/// Guestbook errors
///
/// Session verification failures are not represented here; they become a
/// single 401 at the HTTP boundary.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Secret store lookup failed
    #[error("Secret store error: {0}")]
    SecretStore(String),

    /// Identity provider (OAuth) failure
    #[error("Identity provider error: {0}")]
    IdentityProvider(String),

    /// Entry store failure
    #[error("Store error: {0}")]
    Store(String),

    /// Session token could not be issued
    #[error("Session error: {0}")]
    Session(#[from] session_core::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the failure came from a collaborator outside this process
    /// (secret store, identity provider, data store, network).
    #[must_use]
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            Self::SecretStore(_) | Self::IdentityProvider(_) | Self::Store(_) | Self::Http(_)
        )
    }
}
