//! Session registry: conversation identity and append-only turn history.
//!
//! Associates a session id with ordered turns so multi-turn context
//! ("compare that to last month") resolves correctly. Turns are appended at
//! the start of processing and completed in place; prior turns are never
//! rewritten.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Local, TimeZone};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use fds_tools::{ToolCall, ToolResult};

use crate::error::ChatError;
use crate::model::TranscriptMessage;

/// Lifecycle of one recorded tool call.
///
/// A record is written as `Cancelled` before the invoker is awaited and
/// overwritten when the result arrives, so a caller that drops the turn
/// mid-invoke leaves an accurate record behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallStatus {
    Cancelled,
    Completed,
    Failed,
}

/// One tool call and its result, as recorded in a turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub seq: u32,
    pub operation: String,
    pub arguments: Map<String, Value>,
    pub status: CallStatus,
    pub result: Option<ToolResult>,
}

/// One user utterance, the tool calls made while answering it, and the
/// final reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub user_message: String,
    pub calls: Vec<ToolCallRecord>,
    pub reply: String,
    pub chart_url: Option<String>,
    pub completed: bool,
    pub created_at: i64,
}

/// One conversation: a session id plus append-only turns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub user_id: String,
    pub started_at: i64,
    pub last_message_at: i64,
    pub turns: Vec<Turn>,
}

/// Summary of a session for listing endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: Uuid,
    pub user_id: String,
    pub started_at: String,
    pub last_message_at: String,
    pub turn_count: usize,
}

/// Registry of active conversations.
pub struct SessionRegistry {
    sessions: Mutex<HashMap<Uuid, Conversation>>,
    turn_locks: Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>,
    context_turns: usize,
    timeout_minutes: u32,
}

impl SessionRegistry {
    pub fn new(context_turns: usize, timeout_minutes: u32) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            turn_locks: Mutex::new(HashMap::new()),
            context_turns,
            timeout_minutes,
        }
    }

    /// Acquire the exclusive turn lock for a session.
    ///
    /// Turns within one conversation run strictly sequentially: a second
    /// message on the same session waits here until the in-flight turn
    /// finalizes or its future is dropped. The guard must be held for the
    /// whole turn.
    pub async fn lock_turn(&self, sid: Uuid) -> Result<OwnedMutexGuard<()>, ChatError> {
        let lock = {
            let mut locks = self
                .turn_locks
                .lock()
                .map_err(|e| ChatError::Internal(format!("turn lock poisoned: {}", e)))?;
            Arc::clone(locks.entry(sid).or_default())
        };
        Ok(lock.lock_owned().await)
    }

    /// Resolve or create a session for the given user.
    ///
    /// A requested id is reused while fresh; an expired or unknown id gets a
    /// new session.
    pub fn resolve(&self, user_id: &str, requested: Option<Uuid>) -> Result<Uuid, ChatError> {
        let mut sessions = self.lock()?;

        if let Some(sid) = requested {
            if let Some(conv) = sessions.get(&sid) {
                if !self.is_expired(conv) {
                    return Ok(sid);
                }
                // Session expired; remove and create new.
                sessions.remove(&sid);
                if let Ok(mut locks) = self.turn_locks.lock() {
                    locks.remove(&sid);
                }
            }
        }

        let now = Local::now().timestamp();
        let conv = Conversation {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            started_at: now,
            last_message_at: now,
            turns: Vec::new(),
        };
        let sid = conv.id;
        sessions.insert(sid, conv);
        Ok(sid)
    }

    fn is_expired(&self, conv: &Conversation) -> bool {
        let now = Local::now().timestamp();
        let timeout_secs = i64::from(self.timeout_minutes) * 60;
        now - conv.last_message_at > timeout_secs
    }

    /// Append a fresh turn for the incoming message; returns its index.
    pub fn begin_turn(&self, sid: Uuid, message: &str) -> Result<usize, ChatError> {
        let mut sessions = self.lock()?;
        let conv = sessions
            .get_mut(&sid)
            .ok_or(ChatError::SessionNotFound(sid))?;
        let now = Local::now().timestamp();
        conv.last_message_at = now;
        conv.turns.push(Turn {
            user_message: message.to_string(),
            calls: Vec::new(),
            reply: String::new(),
            chart_url: None,
            completed: false,
            created_at: now,
        });
        Ok(conv.turns.len() - 1)
    }

    /// Record a tool call about to be dispatched; returns its record index.
    pub fn record_call(&self, sid: Uuid, turn: usize, call: &ToolCall) -> Result<usize, ChatError> {
        let mut sessions = self.lock()?;
        let conv = sessions
            .get_mut(&sid)
            .ok_or(ChatError::SessionNotFound(sid))?;
        let turn = conv
            .turns
            .get_mut(turn)
            .ok_or_else(|| ChatError::Internal(format!("turn {} out of range", turn)))?;
        turn.calls.push(ToolCallRecord {
            seq: call.seq,
            operation: call.operation.clone(),
            arguments: call.arguments.clone(),
            status: CallStatus::Cancelled,
            result: None,
        });
        Ok(turn.calls.len() - 1)
    }

    /// Attach the result to a previously recorded call.
    pub fn complete_call(
        &self,
        sid: Uuid,
        turn: usize,
        call: usize,
        result: ToolResult,
    ) -> Result<(), ChatError> {
        let mut sessions = self.lock()?;
        let conv = sessions
            .get_mut(&sid)
            .ok_or(ChatError::SessionNotFound(sid))?;
        let record = conv
            .turns
            .get_mut(turn)
            .and_then(|t| t.calls.get_mut(call))
            .ok_or_else(|| ChatError::Internal(format!("call {}/{} out of range", turn, call)))?;
        record.status = if result.is_success() {
            CallStatus::Completed
        } else {
            CallStatus::Failed
        };
        record.result = Some(result);
        Ok(())
    }

    /// Complete a turn with its final reply.
    pub fn finalize_turn(
        &self,
        sid: Uuid,
        turn: usize,
        reply: &str,
        chart_url: Option<String>,
    ) -> Result<(), ChatError> {
        let mut sessions = self.lock()?;
        let conv = sessions
            .get_mut(&sid)
            .ok_or(ChatError::SessionNotFound(sid))?;
        conv.last_message_at = Local::now().timestamp();
        let turn = conv
            .turns
            .get_mut(turn)
            .ok_or_else(|| ChatError::Internal(format!("turn {} out of range", turn)))?;
        turn.reply = reply.to_string();
        turn.chart_url = chart_url;
        turn.completed = true;
        Ok(())
    }

    /// Render the most recent completed turns into transcript messages for
    /// the model, including the intermediate tool calls and results.
    pub fn context_messages(&self, sid: Uuid) -> Result<Vec<TranscriptMessage>, ChatError> {
        let sessions = self.lock()?;
        let conv = sessions.get(&sid).ok_or(ChatError::SessionNotFound(sid))?;

        let start = conv.turns.len().saturating_sub(self.context_turns);
        let mut messages = Vec::new();
        for turn in &conv.turns[start..] {
            messages.push(TranscriptMessage::user(turn.user_message.clone()));
            for call in &turn.calls {
                messages.push(TranscriptMessage::assistant(format!(
                    "[tool_call {}] {}",
                    call.operation,
                    Value::Object(call.arguments.clone())
                )));
                if let Some(ref result) = call.result {
                    messages.push(TranscriptMessage::user(render_result(
                        &call.operation,
                        result,
                    )));
                }
            }
            if turn.completed && !turn.reply.is_empty() {
                messages.push(TranscriptMessage::assistant(turn.reply.clone()));
            }
        }
        Ok(messages)
    }

    /// Snapshot of a conversation.
    pub fn get(&self, sid: Uuid) -> Option<Conversation> {
        self.lock().ok().and_then(|s| s.get(&sid).cloned())
    }

    /// Full turn history of a session.
    pub fn history(&self, sid: Uuid) -> Result<Vec<Turn>, ChatError> {
        let sessions = self.lock()?;
        sessions
            .get(&sid)
            .map(|c| c.turns.clone())
            .ok_or(ChatError::SessionNotFound(sid))
    }

    /// List all active sessions as summaries.
    pub fn summaries(&self) -> Vec<SessionSummary> {
        let sessions = match self.lock() {
            Ok(s) => s,
            Err(_) => return vec![],
        };
        sessions
            .values()
            .map(|c| SessionSummary {
                id: c.id,
                user_id: c.user_id.clone(),
                started_at: format_epoch(c.started_at),
                last_message_at: format_epoch(c.last_message_at),
                turn_count: c.turns.len(),
            })
            .collect()
    }

    /// Delete a session by id.
    pub fn delete(&self, sid: Uuid) -> Result<(), ChatError> {
        let removed = self.lock()?.remove(&sid).is_some();
        if let Ok(mut locks) = self.turn_locks.lock() {
            locks.remove(&sid);
        }
        if removed {
            Ok(())
        } else {
            Err(ChatError::SessionNotFound(sid))
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<Uuid, Conversation>>, ChatError> {
        self.sessions
            .lock()
            .map_err(|e| ChatError::Internal(format!("session lock poisoned: {}", e)))
    }

    #[cfg(test)]
    pub(crate) fn force_last_message_at(&self, sid: Uuid, epoch: i64) {
        if let Ok(mut sessions) = self.sessions.lock() {
            if let Some(conv) = sessions.get_mut(&sid) {
                conv.last_message_at = epoch;
            }
        }
    }
}

fn render_result(operation: &str, result: &ToolResult) -> String {
    match result {
        ToolResult::Success { data, .. } => {
            format!("[tool_result {}] {}", operation, data)
        }
        ToolResult::Failure { kind, detail } => {
            format!("[tool_failure {}] {}: {}", operation, kind, detail)
        }
    }
}

/// Format epoch seconds as ISO 8601 string.
fn format_epoch(epoch: i64) -> String {
    Local
        .timestamp_opt(epoch, 0)
        .single()
        .map(|dt: DateTime<Local>| dt.to_rfc3339())
        .unwrap_or_else(|| epoch.to_string())
}
