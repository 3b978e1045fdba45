//! HTTP invoker for the external analytics tool server.
//!
//! Performs exactly one network request per call with a mandatory timeout.
//! Transport and status failures are mapped to typed `ToolResult::Failure`
//! values; nothing escapes this boundary as a fault.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;

use fds_core::config::ToolServerConfig;

use crate::error::ToolError;
use crate::types::{FailureKind, ToolCall, ToolResult};

/// Seam between the orchestrator and the external tool server.
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    /// Dispatch one validated tool call. Retries are the caller's policy.
    async fn invoke(&self, call: &ToolCall) -> ToolResult;
}

/// Invoker backed by the tool server's HTTP API: one POST per operation.
pub struct HttpToolInvoker {
    client: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
}

impl HttpToolInvoker {
    /// Build an invoker from the tool server configuration.
    pub fn new(config: &ToolServerConfig) -> Result<Self, ToolError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .build()
            .map_err(|e| ToolError::Setup(e.to_string()))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth_token: config.auth_token.clone(),
        })
    }

    fn endpoint(&self, operation: &str) -> String {
        format!("{}/tools/{}", self.base_url, operation)
    }
}

#[async_trait]
impl ToolInvoker for HttpToolInvoker {
    async fn invoke(&self, call: &ToolCall) -> ToolResult {
        let mut request = self
            .client
            .post(self.endpoint(&call.operation))
            .json(&call.arguments);
        if let Some(ref token) = self.auth_token {
            request = request.bearer_auth(token);
        }

        tracing::debug!(operation = %call.operation, seq = call.seq, "Dispatching tool call");

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => return transport_failure(&e),
        };

        let status = response.status();
        if let Some(kind) = classify_status(status) {
            let detail = response.text().await.unwrap_or_default();
            tracing::warn!(operation = %call.operation, %status, "Tool call failed");
            return ToolResult::Failure {
                kind,
                detail: format!("{}: {}", status, truncate(&detail, 500)),
            };
        }

        match response.json::<Value>().await {
            Ok(body) => parse_success_body(body),
            Err(e) => ToolResult::Failure {
                kind: FailureKind::ServerError,
                detail: format!("invalid response body: {}", e),
            },
        }
    }
}

fn transport_failure(err: &reqwest::Error) -> ToolResult {
    let kind = if err.is_timeout() {
        FailureKind::Timeout
    } else {
        FailureKind::Unreachable
    };
    ToolResult::Failure {
        kind,
        detail: err.to_string(),
    }
}

/// Map an HTTP status to a failure kind; `None` means success.
pub(crate) fn classify_status(status: StatusCode) -> Option<FailureKind> {
    if status.is_success() {
        return None;
    }
    let kind = match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => FailureKind::Unauthorized,
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => FailureKind::Timeout,
        s if s.is_server_error() => FailureKind::ServerError,
        _ => FailureKind::BadRequest,
    };
    Some(kind)
}

/// Extract the chart reference and pass the payload through unreshaped.
pub(crate) fn parse_success_body(body: Value) -> ToolResult {
    let chart_url = body
        .get("chartUrl")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    ToolResult::Success {
        data: body,
        chart_url,
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
