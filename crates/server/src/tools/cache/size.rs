//! get_cache_size tool implementation.

use rmcp::{ErrorData as McpError, model::CallToolResult};

use crate::tools::json_result;
use crate::worker::Worker;
use binsync_core::ControlMessage;

/// Total body bytes across every cache.
pub async fn size_impl(worker: &Worker) -> Result<CallToolResult, McpError> {
    let reply = worker.handle_message(ControlMessage::GetCacheSize).await?;
    json_result(&reply)
}
