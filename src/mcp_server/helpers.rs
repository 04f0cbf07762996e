//! Shared helpers for mapping this crate's domain types onto the MCP wire
//! format.
//!
//! Per the wire contract, a domain-level failure (a session that doesn't
//! exist, a lock held by someone else, a malformed extract mode) is a
//! *successful* JSON-RPC response whose `CallToolResult` carries
//! `isError: true` — the E-code lives in the tool result, not in a
//! transport-level JSON-RPC error. `ErrorCode`-based [`McpError`] is
//! reserved for things rmcp itself can't route as a tool result (an
//! unknown tool name, a request that fails to deserialize at all).

use rmcp::model::{CallToolResult, Content, ErrorCode};
use rmcp::ErrorData as McpError;

use orchestrator_core::types::error::{OrchestratorError, SessionError};

/// Build the structured JSON payload for a domain error: `{code, message}`
/// plus, for `SessionError::LockContention`, the `locked_by`/`locked_at`
/// fields the caller needs instead of a flattened Display string.
fn error_payload(err: &OrchestratorError) -> serde_json::Value {
    let mut value = serde_json::json!({
        "code": err.code(),
        "message": err.to_string(),
    });
    if let OrchestratorError::Session(SessionError::LockContention { locked_by, locked_at, .. }) = err {
        value["locked_by"] = serde_json::Value::String(locked_by.clone());
        value["locked_at"] = serde_json::Value::String(locked_at.to_rfc3339());
    }
    value
}

/// Turn a domain error into a tool-level failure result: `Ok(...)` at the
/// JSON-RPC layer, `isError: true` in the `CallToolResult`.
pub fn domain_error_result(err: OrchestratorError) -> Result<CallToolResult, McpError> {
    let payload = error_payload(&err);
    let text = serde_json::to_string_pretty(&payload).unwrap_or_else(|_| err.to_string());
    Ok(CallToolResult::error(vec![Content::text(text)]))
}

/// Wrap a transport/protocol-level failure (not a domain error) as a
/// JSON-RPC error. Used only where rmcp itself can't express the problem
/// as a tool result.
pub fn to_mcp_error(err: OrchestratorError) -> McpError {
    McpError::new(
        ErrorCode::INTERNAL_ERROR,
        format!("[{}] {}", err.code(), err),
        None::<serde_json::Value>,
    )
}

pub fn parse_id<T: std::str::FromStr>(raw: &str, field: &str) -> Result<T, McpError> {
    raw.parse().map_err(|_| {
        McpError::new(
            ErrorCode::INVALID_PARAMS,
            format!("invalid {field}: '{raw}'"),
            None::<serde_json::Value>,
        )
    })
}

pub fn json_result<T: serde::Serialize>(value: &T) -> Result<CallToolResult, McpError> {
    let text = serde_json::to_string_pretty(value).map_err(|e| {
        McpError::new(
            ErrorCode::INTERNAL_ERROR,
            format!("serialization failed: {e}"),
            None::<serde_json::Value>,
        )
    })?;
    Ok(CallToolResult::success(vec![Content::text(text)]))
}

pub fn text_result(text: impl Into<String>) -> Result<CallToolResult, McpError> {
    Ok(CallToolResult::success(vec![Content::text(text.into())]))
}
