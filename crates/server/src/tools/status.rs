//! worker_status tool implementation.

use rmcp::{ErrorData as McpError, model::CallToolResult};

use crate::tools::json_result;
use crate::worker::Worker;

/// Serving version, lifecycle slots, connectivity, queue depth, cache usage
/// and the most recent client notifications.
pub async fn status_impl(worker: &Worker) -> Result<CallToolResult, McpError> {
    let status = worker.status().await?;
    json_result(&status)
}
