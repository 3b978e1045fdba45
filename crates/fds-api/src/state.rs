//! Application state shared across all route handlers.
//!
//! AppState holds the configuration and the chat orchestrator.
//! It is passed to handlers via axum's State extractor.

use std::sync::Arc;
use std::time::Instant;

use fds_core::config::FdsConfig;

use fds_chat::ChatOrchestrator;

/// Shared application state.
///
/// All fields use `Arc` for cheap cloning across handler tasks.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<FdsConfig>,
    /// The conversation orchestrator, including the session registry.
    pub orchestrator: Arc<ChatOrchestrator>,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    /// Create a new AppState with the given components.
    pub fn new(config: FdsConfig, orchestrator: ChatOrchestrator) -> Self {
        Self {
            config: Arc::new(config),
            orchestrator: Arc::new(orchestrator),
            start_time: Instant::now(),
        }
    }
}
