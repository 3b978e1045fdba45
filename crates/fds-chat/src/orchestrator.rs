//! Conversation orchestrator: the per-turn dialogue loop.
//!
//! Consults the model, validates its proposed tool calls against the
//! catalog, dispatches them one at a time, and folds results back into the
//! transcript until the model produces a final answer. Every bound in the
//! loop is an explicit counter; no failure crosses the conversational
//! boundary unhandled.

use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

use fds_core::config::ChatConfig;
use fds_tools::{validate, Catalog, ToolCall, ToolInvoker, ToolResult, TENANT_PARAM};

use crate::aggregator::{reply_channel, FragmentSink};
use crate::error::ChatError;
use crate::model::{ModelClient, ModelDecision, ModelRequest, TranscriptMessage};
use crate::prompt::system_prompt;
use crate::session::SessionRegistry;

/// Maximum message length in characters.
pub const MAX_MESSAGE_LENGTH: usize = 2000;

const APOLOGY: &str = "I'm sorry, I wasn't able to get that answer from the \
                       analytics service right now. Please try again in a moment \
                       or rephrase the question.";

/// Result of one completed turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// The full aggregated reply.
    pub reply: String,
    /// Chart reference from the first tool result that carried one.
    pub chart_url: Option<String>,
    /// Number of tool calls dispatched during the turn.
    pub tool_calls: u32,
}

/// Central orchestrator coordinating model, catalog, invoker, and sessions.
pub struct ChatOrchestrator {
    catalog: Arc<Catalog>,
    model: Arc<dyn ModelClient>,
    invoker: Arc<dyn ToolInvoker>,
    sessions: SessionRegistry,
    config: ChatConfig,
    system: String,
    declarations: Vec<Value>,
}

impl ChatOrchestrator {
    /// Create a new orchestrator with the given collaborators.
    pub fn new(
        catalog: Arc<Catalog>,
        model: Arc<dyn ModelClient>,
        invoker: Arc<dyn ToolInvoker>,
        config: ChatConfig,
    ) -> Self {
        let sessions = SessionRegistry::new(config.context_turns, config.session_timeout_minutes);
        let system = system_prompt(&catalog, &config.tenant_id);
        let declarations = catalog.function_declarations();
        Self {
            catalog,
            model,
            invoker,
            sessions,
            config,
            system,
            declarations,
        }
    }

    /// Session registry, for listing, history, and deletion.
    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// Handle one user message, streaming reply fragments into `sink`.
    ///
    /// Returns the turn outcome and the session id (new or existing).
    pub async fn handle_message(
        &self,
        user_id: &str,
        session_id: Option<Uuid>,
        message: &str,
        sink: &FragmentSink,
    ) -> Result<(TurnOutcome, Uuid), ChatError> {
        if !self.config.enabled {
            return Err(ChatError::Disabled);
        }
        if message.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        if message.chars().count() > MAX_MESSAGE_LENGTH {
            return Err(ChatError::MessageTooLong(MAX_MESSAGE_LENGTH));
        }

        let sid = self.sessions.resolve(user_id, session_id)?;
        // Turns within one session run strictly sequentially; a concurrent
        // message waits here until the in-flight turn finalizes.
        let _turn_guard = self.sessions.lock_turn(sid).await?;
        let mut transcript = self.sessions.context_messages(sid)?;
        let turn = self.sessions.begin_turn(sid, message)?;
        transcript.push(TranscriptMessage::user(message));

        let mut corrections: u32 = 0;
        let mut failures: u32 = 0;
        let mut seq: u32 = 0;
        let mut chart_url: Option<String> = None;

        loop {
            if seq >= self.config.max_tool_calls {
                tracing::warn!(session = %sid, "Tool call budget exhausted");
                return self.finish(sid, turn, sink, APOLOGY, chart_url, seq).await;
            }

            let decision = match self
                .model
                .propose(ModelRequest {
                    system: &self.system,
                    messages: &transcript,
                    tools: &self.declarations,
                })
                .await
            {
                Ok(decision) => decision,
                Err(err) => {
                    // The raw error never reaches the user; the turn still
                    // finalizes so history stays consistent.
                    tracing::error!(session = %sid, "Model consultation failed: {}", err);
                    return self.finish(sid, turn, sink, APOLOGY, chart_url, seq).await;
                }
            };

            let (name, mut arguments) = match decision {
                ModelDecision::Answer(fragments) => {
                    let mut reply = String::new();
                    for fragment in fragments {
                        reply.push_str(&fragment);
                        // A false return means the caller disconnected; the
                        // turn still completes and stays in history.
                        let _ = sink.push(fragment).await;
                    }
                    self.sessions
                        .finalize_turn(sid, turn, &reply, chart_url.clone())?;
                    let outcome = TurnOutcome {
                        reply,
                        chart_url,
                        tool_calls: seq,
                    };
                    return Ok((outcome, sid));
                }
                ModelDecision::ToolRequest { name, arguments } => (name, arguments),
            };

            // The tenant is never the model's to choose.
            arguments.remove(TENANT_PARAM);

            let issues = match self.catalog.lookup(&name) {
                None => vec![format!("operation '{}' does not exist", name)],
                Some(op) => match validate(op, &arguments) {
                    Ok(()) => Vec::new(),
                    Err(err) => err.issues(),
                },
            };

            if !issues.is_empty() {
                corrections += 1;
                tracing::debug!(
                    session = %sid,
                    operation = %name,
                    round = corrections,
                    "Rejected tool request: {}",
                    issues.join("; ")
                );
                if corrections > self.config.max_correction_rounds {
                    return self.finish(sid, turn, sink, APOLOGY, chart_url, seq).await;
                }
                transcript.push(TranscriptMessage::assistant(format!(
                    "[tool_call {}] {}",
                    name,
                    Value::Object(arguments)
                )));
                transcript.push(TranscriptMessage::user(format!(
                    "That call was rejected: {}. Available operations: {}. \
                     Correct the request and try again.",
                    issues.join("; "),
                    self.operation_names()
                )));
                continue;
            }

            arguments.insert(
                TENANT_PARAM.to_string(),
                Value::String(self.config.tenant_id.clone()),
            );

            seq += 1;
            let call = ToolCall {
                seq,
                operation: name.clone(),
                arguments,
            };
            let record = self.sessions.record_call(sid, turn, &call)?;
            transcript.push(TranscriptMessage::assistant(format!(
                "[tool_call {}] {}",
                call.operation,
                Value::Object(call.arguments.clone())
            )));

            let result = self.invoker.invoke(&call).await;
            self.sessions.complete_call(sid, turn, record, result.clone())?;

            match result {
                ToolResult::Success { data, chart_url: cu } => {
                    failures = 0;
                    if chart_url.is_none() {
                        chart_url = cu;
                    }
                    transcript.push(TranscriptMessage::user(format!(
                        "[tool_result {}] {}",
                        name, data
                    )));
                }
                ToolResult::Failure { kind, detail } => {
                    failures += 1;
                    tracing::warn!(
                        session = %sid,
                        operation = %name,
                        %kind,
                        consecutive = failures,
                        "Tool call failed"
                    );
                    if failures >= self.config.max_tool_failures {
                        return self.finish(sid, turn, sink, APOLOGY, chart_url, seq).await;
                    }
                    transcript.push(TranscriptMessage::user(format!(
                        "[tool_failure {}] {}: {}. You may retry with adjusted \
                         arguments or apologize to the user.",
                        name, kind, detail
                    )));
                }
            }
        }
    }

    /// Handle one message and return the fully collected reply.
    pub async fn handle_message_collected(
        &self,
        user_id: &str,
        session_id: Option<Uuid>,
        message: &str,
    ) -> Result<(TurnOutcome, Uuid), ChatError> {
        let (sink, mut agg) = reply_channel(64);
        // Drain concurrently so a reply longer than the channel capacity
        // cannot block the producer.
        let drain = tokio::spawn(async move { agg.collect_all().await });
        let result = self.handle_message(user_id, session_id, message, &sink).await;
        drop(sink);
        let _ = drain.await;
        result
    }

    async fn finish(
        &self,
        sid: Uuid,
        turn: usize,
        sink: &FragmentSink,
        reply: &str,
        chart_url: Option<String>,
        tool_calls: u32,
    ) -> Result<(TurnOutcome, Uuid), ChatError> {
        let _ = sink.push(reply).await;
        self.sessions
            .finalize_turn(sid, turn, reply, chart_url.clone())?;
        let outcome = TurnOutcome {
            reply: reply.to_string(),
            chart_url,
            tool_calls,
        };
        Ok((outcome, sid))
    }

    fn operation_names(&self) -> String {
        self.catalog
            .operations()
            .iter()
            .map(|op| op.name)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::CallStatus;
    use async_trait::async_trait;
    use fds_tools::FailureKind;
    use serde_json::{json, Map};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    // ---- Test doubles ----

    struct ScriptedModel {
        script: Mutex<VecDeque<ModelDecision>>,
        transcripts: Mutex<Vec<Vec<String>>>,
    }

    impl ScriptedModel {
        fn new(steps: Vec<ModelDecision>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(steps.into()),
                transcripts: Mutex::new(Vec::new()),
            })
        }

        fn last_transcript(&self) -> Vec<String> {
            self.transcripts.lock().unwrap().last().cloned().unwrap_or_default()
        }
    }

    #[async_trait]
    impl ModelClient for ScriptedModel {
        async fn propose(&self, request: ModelRequest<'_>) -> Result<ModelDecision, ChatError> {
            self.transcripts
                .lock()
                .unwrap()
                .push(request.messages.iter().map(|m| m.content.clone()).collect());
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| ChatError::Model("script exhausted".to_string()))
        }
    }

    struct MockInvoker {
        results: Mutex<VecDeque<ToolResult>>,
        calls: Mutex<Vec<ToolCall>>,
    }

    impl MockInvoker {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                results: Mutex::new(VecDeque::new()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn with_results(results: Vec<ToolResult>) -> Arc<Self> {
            Arc::new(Self {
                results: Mutex::new(results.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<ToolCall> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ToolInvoker for MockInvoker {
        async fn invoke(&self, call: &ToolCall) -> ToolResult {
            self.calls.lock().unwrap().push(call.clone());
            self.results.lock().unwrap().pop_front().unwrap_or(ToolResult::Success {
                data: json!({"total": 500.0}),
                chart_url: None,
            })
        }
    }

    struct SlowInvoker;

    #[async_trait]
    impl ToolInvoker for SlowInvoker {
        async fn invoke(&self, _call: &ToolCall) -> ToolResult {
            tokio::time::sleep(Duration::from_secs(5)).await;
            ToolResult::Success {
                data: json!({}),
                chart_url: None,
            }
        }
    }

    struct DelayedInvoker {
        delay: Duration,
    }

    #[async_trait]
    impl ToolInvoker for DelayedInvoker {
        async fn invoke(&self, _call: &ToolCall) -> ToolResult {
            tokio::time::sleep(self.delay).await;
            ToolResult::Success {
                data: json!({"total": 500.0}),
                chart_url: None,
            }
        }
    }

    // ---- Helpers ----

    fn tool_request(name: &str, arguments: Value) -> ModelDecision {
        let arguments: Map<String, Value> = arguments.as_object().unwrap().clone();
        ModelDecision::ToolRequest {
            name: name.to_string(),
            arguments,
        }
    }

    fn answer(text: &str) -> ModelDecision {
        ModelDecision::Answer(vec![text.to_string()])
    }

    fn orchestrator(
        model: Arc<dyn ModelClient>,
        invoker: Arc<dyn ToolInvoker>,
    ) -> ChatOrchestrator {
        ChatOrchestrator::new(
            Arc::new(Catalog::analytics()),
            model,
            invoker,
            ChatConfig::default(),
        )
    }

    fn orchestrator_with_config(
        model: Arc<dyn ModelClient>,
        invoker: Arc<dyn ToolInvoker>,
        config: ChatConfig,
    ) -> ChatOrchestrator {
        ChatOrchestrator::new(Arc::new(Catalog::analytics()), model, invoker, config)
    }

    // ---- Input validation ----

    #[tokio::test]
    async fn test_empty_message_rejected() {
        let orch = orchestrator(ScriptedModel::new(vec![]), MockInvoker::new());
        let err = orch
            .handle_message_collected("op", None, "")
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::EmptyMessage));
    }

    #[tokio::test]
    async fn test_oversized_message_rejected() {
        let orch = orchestrator(ScriptedModel::new(vec![]), MockInvoker::new());
        let long = "a".repeat(MAX_MESSAGE_LENGTH + 1);
        let err = orch
            .handle_message_collected("op", None, &long)
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::MessageTooLong(_)));
    }

    #[tokio::test]
    async fn test_disabled_chat_rejected() {
        let config = ChatConfig {
            enabled: false,
            ..ChatConfig::default()
        };
        let orch =
            orchestrator_with_config(ScriptedModel::new(vec![]), MockInvoker::new(), config);
        let err = orch
            .handle_message_collected("op", None, "hello")
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Disabled));
    }

    #[tokio::test]
    async fn test_message_length_counted_in_characters() {
        let model = ScriptedModel::new(vec![answer("ok")]);
        let orch = orchestrator(model, MockInvoker::new());
        // Exactly at the limit by character count, over it by byte length.
        let msg = "\u{00e9}".repeat(MAX_MESSAGE_LENGTH);
        assert!(orch
            .handle_message_collected("op", None, &msg)
            .await
            .is_ok());
    }

    // ---- Direct answers ----

    #[tokio::test]
    async fn test_answer_without_tools() {
        let model = ScriptedModel::new(vec![answer("What period would you like?")]);
        let orch = orchestrator(model, MockInvoker::new());
        let (outcome, sid) = orch
            .handle_message_collected("op", None, "top items")
            .await
            .unwrap();
        assert_eq!(outcome.reply, "What period would you like?");
        assert_eq!(outcome.tool_calls, 0);
        assert!(outcome.chart_url.is_none());

        let history = orch.sessions().history(sid).unwrap();
        assert_eq!(history.len(), 1);
        assert!(history[0].completed);
        assert!(history[0].calls.is_empty());
    }

    #[tokio::test]
    async fn test_answer_fragments_streamed_in_order() {
        let model = ScriptedModel::new(vec![ModelDecision::Answer(vec![
            "Sales ".to_string(),
            "were ".to_string(),
            "$500".to_string(),
        ])]);
        let orch = orchestrator(model, MockInvoker::new());
        let (sink, mut agg) = reply_channel(8);
        let (outcome, _) = orch
            .handle_message("op", None, "total sales?", &sink)
            .await
            .unwrap();
        drop(sink);
        assert_eq!(outcome.reply, "Sales were $500");
        assert_eq!(agg.collect_all().await, "Sales were $500");
    }

    // ---- End-to-end scenarios ----

    #[tokio::test]
    async fn test_daily_sales_scenario() {
        let model = ScriptedModel::new(vec![
            tool_request(
                "show_daily_sales",
                json!({"startDate": "2025-05-01", "endDate": "2025-05-31"}),
            ),
            answer("Here are the daily sales for May. Chart: see link."),
        ]);
        let invoker = MockInvoker::with_results(vec![ToolResult::Success {
            data: json!({"rows": [], "chartUrl": "https://charts.example/may"}),
            chart_url: Some("https://charts.example/may".to_string()),
        }]);
        let orch = orchestrator(model, invoker.clone());

        let (outcome, sid) = orch
            .handle_message_collected("op", None, "Show me daily sales for May 2025")
            .await
            .unwrap();

        assert_eq!(outcome.tool_calls, 1);
        assert_eq!(outcome.chart_url.as_deref(), Some("https://charts.example/may"));

        let calls = invoker.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].operation, "show_daily_sales");
        assert_eq!(calls[0].arguments["startDate"], "2025-05-01");
        assert_eq!(calls[0].arguments["endDate"], "2025-05-31");
        assert_eq!(calls[0].arguments["tenant_id"], "senso-sushi");

        let history = orch.sessions().history(sid).unwrap();
        assert_eq!(history[0].calls.len(), 1);
        assert_eq!(history[0].calls[0].status, CallStatus::Completed);
        assert_eq!(
            history[0].chart_url.as_deref(),
            Some("https://charts.example/may")
        );
    }

    #[tokio::test]
    async fn test_top_items_scenario() {
        let model = ScriptedModel::new(vec![
            tool_request(
                "show_top_items",
                json!({"limit": 10, "startDate": "2025-07-01", "endDate": "2025-07-31"}),
            ),
            answer("The top 10 items in July were led by the Salmon Roll."),
        ]);
        let invoker = MockInvoker::new();
        let orch = orchestrator(model, invoker.clone());

        orch.handle_message_collected("op", None, "What are the top 10 items in July 2025?")
            .await
            .unwrap();

        let calls = invoker.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].operation, "show_top_items");
        assert_eq!(calls[0].arguments["limit"], 10);
    }

    // ---- Tenant override invariant ----

    #[tokio::test]
    async fn test_tenant_always_overridden() {
        let model = ScriptedModel::new(vec![
            tool_request(
                "get_total_sales",
                json!({
                    "startDate": "2025-05-01",
                    "endDate": "2025-05-31",
                    "tenant_id": "someone-else"
                }),
            ),
            answer("Total sales were $500."),
        ]);
        let invoker = MockInvoker::new();
        let orch = orchestrator(model, invoker.clone());

        orch.handle_message_collected("op", None, "total sales for may")
            .await
            .unwrap();

        let calls = invoker.calls();
        assert_eq!(calls[0].arguments["tenant_id"], "senso-sushi");
    }

    // ---- Validation loop ----

    #[tokio::test]
    async fn test_invalid_arguments_never_reach_network() {
        let model = ScriptedModel::new(vec![
            tool_request(
                "show_top_items",
                json!({"limit": 5000, "startDate": "2025-07-01", "endDate": "2025-07-31"}),
            ),
            tool_request(
                "show_top_items",
                json!({"limit": 10, "startDate": "2025-07-01", "endDate": "2025-07-31"}),
            ),
            answer("Here are the top items."),
        ]);
        let invoker = MockInvoker::new();
        let orch = orchestrator(model.clone(), invoker.clone());

        orch.handle_message_collected("op", None, "top 5000 items in July")
            .await
            .unwrap();

        // Only the corrected call hit the invoker.
        let calls = invoker.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].arguments["limit"], 10);

        // The correction was fed back to the model.
        let transcript = model.last_transcript();
        assert!(transcript.iter().any(|m| m.contains("rejected")));
    }

    #[tokio::test]
    async fn test_unknown_operation_treated_as_validation_error() {
        let model = ScriptedModel::new(vec![
            tool_request("show_magic_numbers", json!({})),
            answer("Sorry, I can only report on sales data."),
        ]);
        let invoker = MockInvoker::new();
        let orch = orchestrator(model, invoker.clone());

        let (outcome, _) = orch
            .handle_message_collected("op", None, "show me magic numbers")
            .await
            .unwrap();

        assert!(invoker.calls().is_empty());
        assert_eq!(outcome.reply, "Sorry, I can only report on sales data.");
    }

    #[tokio::test]
    async fn test_correction_rounds_bounded() {
        // Four invalid proposals against a bound of three.
        let bad = || tool_request("show_daily_sales", json!({"startDate": "nope"}));
        let model = ScriptedModel::new(vec![bad(), bad(), bad(), bad()]);
        let invoker = MockInvoker::new();
        let orch = orchestrator(model, invoker.clone());

        let (outcome, sid) = orch
            .handle_message_collected("op", None, "daily sales")
            .await
            .unwrap();

        assert!(invoker.calls().is_empty());
        assert_eq!(outcome.reply, APOLOGY);
        assert!(orch.sessions().history(sid).unwrap()[0].completed);
    }

    // ---- Tool failure handling ----

    #[tokio::test]
    async fn test_failure_fed_back_model_apologizes() {
        let model = ScriptedModel::new(vec![
            tool_request(
                "get_total_sales",
                json!({"startDate": "2025-05-01", "endDate": "2025-05-31"}),
            ),
            answer("Sorry, the analytics service is unavailable right now."),
        ]);
        let invoker = MockInvoker::with_results(vec![ToolResult::Failure {
            kind: FailureKind::Unreachable,
            detail: "connection refused".to_string(),
        }]);
        let orch = orchestrator(model.clone(), invoker.clone());

        let (outcome, _) = orch
            .handle_message_collected("op", None, "total sales for may")
            .await
            .unwrap();

        assert_eq!(invoker.calls().len(), 1);
        assert!(outcome.reply.contains("unavailable"));
        let transcript = model.last_transcript();
        assert!(transcript.iter().any(|m| m.contains("tool_failure")));
    }

    #[tokio::test]
    async fn test_repeated_timeouts_end_in_apology() {
        let valid = || {
            tool_request(
                "get_total_sales",
                json!({"startDate": "2025-05-01", "endDate": "2025-05-31"}),
            )
        };
        let model = ScriptedModel::new(vec![valid(), valid(), valid()]);
        let timeout = || ToolResult::Failure {
            kind: FailureKind::Timeout,
            detail: "deadline exceeded".to_string(),
        };
        let invoker = MockInvoker::with_results(vec![timeout(), timeout(), timeout()]);
        let orch = orchestrator(model, invoker.clone());

        let (outcome, sid) = orch
            .handle_message_collected("op", None, "total sales for may")
            .await
            .unwrap();

        // Three attempts, then a plain-language apology; never a fault.
        assert_eq!(invoker.calls().len(), 3);
        assert_eq!(outcome.reply, APOLOGY);
        let history = orch.sessions().history(sid).unwrap();
        assert_eq!(history[0].calls.len(), 3);
        assert!(history[0]
            .calls
            .iter()
            .all(|c| c.status == CallStatus::Failed));
    }

    // ---- Model failures ----

    #[tokio::test]
    async fn test_model_failure_yields_apology() {
        // An exhausted script makes every consultation fail.
        let orch = orchestrator(ScriptedModel::new(vec![]), MockInvoker::new());
        let (outcome, sid) = orch
            .handle_message_collected("op", None, "total sales")
            .await
            .unwrap();

        // The raw model error never reaches the user.
        assert_eq!(outcome.reply, APOLOGY);
        let history = orch.sessions().history(sid).unwrap();
        assert!(history[0].completed);
        assert_eq!(history[0].reply, APOLOGY);
    }

    #[tokio::test]
    async fn test_model_failure_after_tool_call_finalizes_turn() {
        let model = ScriptedModel::new(vec![tool_request(
            "get_total_sales",
            json!({"startDate": "2025-05-01", "endDate": "2025-05-31"}),
        )]);
        let invoker = MockInvoker::new();
        let orch = orchestrator(model, invoker.clone());

        let (outcome, sid) = orch
            .handle_message_collected("op", None, "total for may")
            .await
            .unwrap();

        assert_eq!(outcome.reply, APOLOGY);
        assert_eq!(outcome.tool_calls, 1);
        let history = orch.sessions().history(sid).unwrap();
        assert!(history[0].completed);
        assert_eq!(history[0].calls.len(), 1);
        assert_eq!(history[0].calls[0].status, CallStatus::Completed);
    }

    // ---- Chaining and budgets ----

    #[tokio::test]
    async fn test_tool_calls_chained_sequentially() {
        let model = ScriptedModel::new(vec![
            tool_request(
                "get_total_sales",
                json!({"startDate": "2025-05-01", "endDate": "2025-05-31"}),
            ),
            tool_request(
                "show_top_items",
                json!({"limit": 5, "startDate": "2025-05-01", "endDate": "2025-05-31"}),
            ),
            answer("May totals and top sellers, coming up."),
        ]);
        let invoker = MockInvoker::new();
        let orch = orchestrator(model, invoker.clone());

        let (outcome, _) = orch
            .handle_message_collected("op", None, "summarize May")
            .await
            .unwrap();

        let calls = invoker.calls();
        assert_eq!(outcome.tool_calls, 2);
        assert_eq!(calls[0].seq, 1);
        assert_eq!(calls[1].seq, 2);
        assert_eq!(calls[0].operation, "get_total_sales");
        assert_eq!(calls[1].operation, "show_top_items");
    }

    #[tokio::test]
    async fn test_tool_call_budget_bounded() {
        let valid = || {
            tool_request(
                "get_total_sales",
                json!({"startDate": "2025-05-01", "endDate": "2025-05-31"}),
            )
        };
        let model = ScriptedModel::new(vec![valid(), valid()]);
        let invoker = MockInvoker::new();
        let config = ChatConfig {
            max_tool_calls: 2,
            ..ChatConfig::default()
        };
        let orch = orchestrator_with_config(model, invoker.clone(), config);

        let (outcome, _) = orch
            .handle_message_collected("op", None, "keep querying")
            .await
            .unwrap();

        assert_eq!(invoker.calls().len(), 2);
        assert_eq!(outcome.reply, APOLOGY);
    }

    // ---- Idempotence ----

    #[tokio::test]
    async fn test_identical_call_identical_result() {
        let req = || {
            tool_request(
                "get_total_sales",
                json!({"startDate": "2025-05-01", "endDate": "2025-05-31"}),
            )
        };
        let model = ScriptedModel::new(vec![req(), answer("a"), req(), answer("b")]);
        let invoker = MockInvoker::new();
        let orch = orchestrator(model, invoker.clone());

        let (_, sid) = orch
            .handle_message_collected("op", None, "total for may")
            .await
            .unwrap();
        orch.handle_message_collected("op", Some(sid), "again please")
            .await
            .unwrap();

        let history = orch.sessions().history(sid).unwrap();
        let first = history[0].calls[0].result.clone().unwrap();
        let second = history[1].calls[0].result.clone().unwrap();
        assert_eq!(first, second);
        // The dispatched arguments were identical too.
        let calls = invoker.calls();
        assert_eq!(calls[0].arguments, calls[1].arguments);
    }

    // ---- Sessions and context ----

    #[tokio::test]
    async fn test_session_reused_across_turns() {
        let model = ScriptedModel::new(vec![answer("first"), answer("second")]);
        let orch = orchestrator(model.clone(), MockInvoker::new());

        let (_, sid1) = orch
            .handle_message_collected("op", None, "hello")
            .await
            .unwrap();
        let (_, sid2) = orch
            .handle_message_collected("op", Some(sid1), "compare that to last month")
            .await
            .unwrap();

        assert_eq!(sid1, sid2);
        assert_eq!(orch.sessions().history(sid1).unwrap().len(), 2);

        // The second consultation saw the first turn's exchange.
        let transcript = model.last_transcript();
        assert!(transcript.iter().any(|m| m == "hello"));
        assert!(transcript.iter().any(|m| m == "first"));
    }

    #[tokio::test]
    async fn test_turns_serialized_within_session() {
        let model = ScriptedModel::new(vec![
            tool_request(
                "get_total_sales",
                json!({"startDate": "2025-05-01", "endDate": "2025-05-31"}),
            ),
            answer("May total was $500."),
            answer("June total was $600."),
        ]);
        let orch = Arc::new(orchestrator(
            model.clone(),
            Arc::new(DelayedInvoker {
                delay: Duration::from_millis(300),
            }),
        ));
        let sid = orch.sessions().resolve("op", None).unwrap();

        // Second message arrives while the first turn is mid-invoke.
        let first = {
            let orch = Arc::clone(&orch);
            tokio::spawn(async move {
                orch.handle_message_collected("op", Some(sid), "total for may")
                    .await
                    .unwrap()
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        let (second, _) = orch
            .handle_message_collected("op", Some(sid), "and for june?")
            .await
            .unwrap();
        let (first, _) = first.await.unwrap();

        assert_eq!(first.reply, "May total was $500.");
        assert_eq!(second.reply, "June total was $600.");

        // The second turn waited for the first: its consultation saw the
        // finished first turn, and history holds both turns in order.
        let transcript = model.last_transcript();
        assert!(transcript.iter().any(|m| m == "May total was $500."));
        let history = orch.sessions().history(sid).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].user_message, "total for may");
        assert!(history[0].completed);
        assert!(history[1].completed);
    }

    #[tokio::test]
    async fn test_collected_reply_longer_than_channel_capacity() {
        let fragments: Vec<String> = (0..300).map(|_| "x".to_string()).collect();
        let model = ScriptedModel::new(vec![ModelDecision::Answer(fragments)]);
        let orch = orchestrator(model, MockInvoker::new());

        let (outcome, _) = orch
            .handle_message_collected("op", None, "long answer")
            .await
            .unwrap();
        assert_eq!(outcome.reply.len(), 300);
    }

    // ---- Cancellation ----

    #[tokio::test]
    async fn test_cancelled_invoke_leaves_cancelled_record() {
        let model = ScriptedModel::new(vec![tool_request(
            "get_total_sales",
            json!({"startDate": "2025-05-01", "endDate": "2025-05-31"}),
        )]);
        let orch = orchestrator(model, Arc::new(SlowInvoker));

        let (sink, _agg) = reply_channel(8);
        let result = tokio::time::timeout(
            Duration::from_millis(100),
            orch.handle_message("op", None, "total sales for may", &sink),
        )
        .await;
        assert!(result.is_err(), "slow invoke should have been cancelled");

        let summaries = orch.sessions().summaries();
        assert_eq!(summaries.len(), 1);
        let history = orch.sessions().history(summaries[0].id).unwrap();
        assert_eq!(history.len(), 1);
        assert!(!history[0].completed);
        assert_eq!(history[0].calls.len(), 1);
        assert_eq!(history[0].calls[0].status, CallStatus::Cancelled);
    }
}
