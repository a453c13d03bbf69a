//! Guestbook API Library
//!
//! Backend for a personal-site guestbook: visitors sign in with GitHub, leave
//! a short message, and may delete their own entries.
//!
//! # Features
//!
//! - **Stateless sessions**: HS256-signed tokens in an `HttpOnly` cookie,
//!   verified in constant time, valid for seven days (see [`session_core`])
//! - **GitHub OAuth**: authorization-code flow against a pluggable
//!   [`github::IdentityProvider`]
//! - **Secret cache**: client credentials and the signing key fetched together
//!   and refreshed lazily
//! - **Pluggable storage**: in-memory or JSON-file entry stores
//! - **Production Ready**: health check, request tracing, graceful shutdown

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod github;
pub mod secrets;
pub mod store;

pub use error::{Error, Result};
pub use session_core;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => subscriber
            .with(fmt::layer().json())
            .try_init()
            .map_err(|e| Error::Internal(format!("Failed to install subscriber: {e}")))?,
        _ => subscriber
            .with(fmt::layer())
            .try_init()
            .map_err(|e| Error::Internal(format!("Failed to install subscriber: {e}")))?,
    }

    Ok(())
}
