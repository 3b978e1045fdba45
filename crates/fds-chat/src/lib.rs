//! Conversational orchestration for the FDS analytics agent.
//!
//! Owns the dialogue loop: consults the language model, constrains its
//! intent into validated tool calls, streams the reply fragments, and keeps
//! per-session turn history for follow-up resolution.

pub mod aggregator;
pub mod error;
pub mod model;
pub mod orchestrator;
pub mod prompt;
pub mod session;

pub use aggregator::{reply_channel, FragmentSink, ReplyAggregator};
pub use error::ChatError;
pub use model::{
    MessageRole, ModelClient, ModelDecision, ModelRequest, OpenAiModelClient, TranscriptMessage,
};
pub use orchestrator::{ChatOrchestrator, TurnOutcome, MAX_MESSAGE_LENGTH};
pub use session::{
    CallStatus, Conversation, SessionRegistry, SessionSummary, ToolCallRecord, Turn,
};
