//! FDS API crate - axum HTTP server, chat endpoint, SSE streaming.
//!
//! Provides the REST surface for the analytics agent: the streaming chat
//! endpoint, session listing and history, and health checks.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::{create_router, start_server};
pub use state::AppState;
