//! Error types for the conversation engine.

use fds_core::error::FdsError;
use fds_tools::ToolError;

/// Errors from the chat engine.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("chat is disabled")]
    Disabled,
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("message exceeds maximum length of {0} characters")]
    MessageTooLong(usize),
    #[error("session not found: {0}")]
    SessionNotFound(uuid::Uuid),
    #[error("model error: {0}")]
    Model(String),
    #[error("tool error: {0}")]
    Tool(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ToolError> for ChatError {
    fn from(err: ToolError) -> Self {
        ChatError::Tool(err.to_string())
    }
}

impl From<ChatError> for FdsError {
    fn from(err: ChatError) -> Self {
        match &err {
            ChatError::Model(_) => FdsError::Model(err.to_string()),
            ChatError::Tool(_) => FdsError::Tool(err.to_string()),
            _ => FdsError::Chat(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_chat_error_display() {
        assert_eq!(ChatError::Disabled.to_string(), "chat is disabled");
        assert_eq!(
            ChatError::EmptyMessage.to_string(),
            "message cannot be empty"
        );
        assert_eq!(
            ChatError::MessageTooLong(2000).to_string(),
            "message exceeds maximum length of 2000 characters"
        );

        let id = Uuid::new_v4();
        assert_eq!(
            ChatError::SessionNotFound(id).to_string(),
            format!("session not found: {}", id)
        );

        assert_eq!(
            ChatError::Model("connection reset".to_string()).to_string(),
            "model error: connection reset"
        );
    }

    #[test]
    fn test_chat_error_from_tool_error() {
        let err: ChatError = ToolError::UnknownOperation("nope".to_string()).into();
        assert!(matches!(err, ChatError::Tool(_)));
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn test_chat_error_into_fds_error() {
        let err: FdsError = ChatError::Model("x".to_string()).into();
        assert!(matches!(err, FdsError::Model(_)));

        let err: FdsError = ChatError::EmptyMessage.into();
        assert!(matches!(err, FdsError::Chat(_)));
    }
}
