//! MCP tool implementations.
//!
//! Each tool is a thin adapter from JSON parameters to a [`Worker`](crate::worker::Worker)
//! operation; results are returned as pretty-printed JSON text.

pub mod cache;
pub mod control;
pub mod fetch;
pub mod records;
pub mod status;

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use serde::Serialize;

use binsync_core::Error;

pub use control::{ConnectivityParams, ControlParams};
pub use fetch::FetchParams;
pub use records::AddRecordParams;

/// Serialize `output` into a successful tool result.
pub(crate) fn json_result<T: Serialize>(output: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(output).map_err(Error::from)?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

/// Parse the JSON text of a tool result.
#[cfg(test)]
pub(crate) fn result_json(result: &CallToolResult) -> serde_json::Value {
    let content_val = serde_json::to_value(&result.content[0]).unwrap();
    let text = content_val.get("text").and_then(|v| v.as_str()).expect("Expected text field in content");
    serde_json::from_str(text).unwrap()
}
