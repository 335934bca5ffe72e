//! clear_cache tool implementation.

use rmcp::{ErrorData as McpError, model::CallToolResult};

use crate::tools::json_result;
use crate::worker::Worker;
use binsync_core::ControlMessage;

/// Drop every cache, the live generation's included.
///
/// The router keeps working afterwards: entries are refilled from the network
/// on the next request.
pub async fn clear_impl(worker: &Worker) -> Result<CallToolResult, McpError> {
    let reply = worker.handle_message(ControlMessage::ClearCache).await?;
    json_result(&reply)
}
