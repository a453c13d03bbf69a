//! HTTP API

pub mod auth;
pub mod cookie;
pub mod error;
pub mod guestbook;
mod router;
mod server;

pub use auth::require_session;
pub use error::ApiError;
pub use router::{AppState, create_router};
pub use server::Server;
