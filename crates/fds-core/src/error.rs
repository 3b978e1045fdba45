use thiserror::Error;

/// Top-level error type for the FDS agent.
///
/// Each variant wraps a subsystem-specific error. Subsystem crates define
/// their own error types and implement `From<SubsystemError> for FdsError`
/// so that the `?` operator works seamlessly across crate boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FdsError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Tool error: {0}")]
    Tool(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Chat error: {0}")]
    Chat(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for FdsError {
    fn from(err: toml::de::Error) -> Self {
        FdsError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for FdsError {
    fn from(err: toml::ser::Error) -> Self {
        FdsError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for FdsError {
    fn from(err: serde_json::Error) -> Self {
        FdsError::Serialization(err.to_string())
    }
}

/// Convenience result alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, FdsError>;
