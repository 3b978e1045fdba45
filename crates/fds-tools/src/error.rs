//! Error types for the tool catalog and invoker.

use fds_core::error::FdsError;

/// Errors from catalog lookup, validation, and invoker construction.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("unknown operation: {0}")]
    UnknownOperation(String),
    #[error("invalid arguments: {}", .0.join("; "))]
    InvalidArguments(Vec<String>),
    #[error("invoker setup failed: {0}")]
    Setup(String),
}

impl ToolError {
    /// Issues suitable for feeding back to the model as a correction.
    pub fn issues(&self) -> Vec<String> {
        match self {
            ToolError::UnknownOperation(name) => {
                vec![format!("operation '{}' does not exist", name)]
            }
            ToolError::InvalidArguments(issues) => issues.clone(),
            ToolError::Setup(msg) => vec![msg.clone()],
        }
    }
}

impl From<ToolError> for FdsError {
    fn from(err: ToolError) -> Self {
        match &err {
            ToolError::UnknownOperation(_) => FdsError::Catalog(err.to_string()),
            _ => FdsError::Tool(err.to_string()),
        }
    }
}
