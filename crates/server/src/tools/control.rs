//! Control-channel tools: control, skip_waiting, sync_now and set_connectivity.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::tools::json_result;
use crate::worker::Worker;
use binsync_core::ControlMessage;

/// Input parameters for the control tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ControlParams {
    /// A message tagged by `type`, e.g. `{"type": "SKIP_WAITING"}`.
    pub message: ControlMessage,
}

/// Input parameters for the set_connectivity tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ConnectivityParams {
    pub online: bool,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ConnectivityOutput {
    pub online: bool,
    /// False when the worker was already in the requested state.
    pub changed: bool,
}

pub async fn control_impl(worker: &Worker, params: ControlParams) -> Result<CallToolResult, McpError> {
    let reply = worker.handle_message(params.message).await?;
    json_result(&reply)
}

pub async fn skip_waiting_impl(worker: &Worker) -> Result<CallToolResult, McpError> {
    control_impl(worker, ControlParams { message: ControlMessage::SkipWaiting }).await
}

pub async fn sync_now_impl(worker: &Worker) -> Result<CallToolResult, McpError> {
    control_impl(worker, ControlParams { message: ControlMessage::SyncNow }).await
}

/// Going online wakes the sync loop, which drains the queue.
pub fn connectivity_impl(worker: &Worker, params: ConnectivityParams) -> Result<CallToolResult, McpError> {
    let changed = worker.set_online(params.online);
    json_result(&ConnectivityOutput { online: params.online, changed })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::records::{AddRecordParams, add_impl};
    use crate::tools::result_json;
    use crate::worker::testing::harness;

    #[tokio::test]
    async fn test_control_message_round_trip() {
        let h = harness("1.0.0").await;
        let params: ControlParams = serde_json::from_str(r#"{"message": {"type": "GET_CACHE_SIZE"}}"#).unwrap();
        let reply = result_json(&control_impl(&h.worker, params).await.unwrap());
        assert_eq!(reply["type"], "CACHE_SIZE");
        assert!(reply["bytes"].as_u64().unwrap() > 0);
    }

    #[tokio::test]
    async fn test_skip_waiting_without_update() {
        let h = harness("1.0.0").await;
        let reply = result_json(&skip_waiting_impl(&h.worker).await.unwrap());
        assert_eq!(reply["type"], "NOTHING_WAITING");
    }

    #[tokio::test]
    async fn test_connectivity_then_sync_now() {
        let h = harness("1.0.0").await;
        let first = result_json(&connectivity_impl(&h.worker, ConnectivityParams { online: false }).unwrap());
        assert_eq!(first["changed"], true);
        let again = result_json(&connectivity_impl(&h.worker, ConnectivityParams { online: false }).unwrap());
        assert_eq!(again["changed"], false);

        let record = AddRecordParams { category: "metal".into(), weight_kg: 0.3, note: None };
        add_impl(&h.worker, record).await.unwrap();
        let report = result_json(&sync_now_impl(&h.worker).await.unwrap());
        assert_eq!(report["type"], "SYNC_REPORT");
        assert_eq!(report["remaining"], 1);

        h.worker.set_online(true);
        let report = result_json(&sync_now_impl(&h.worker).await.unwrap());
        assert_eq!(report["delivered"], 1);
        assert_eq!(report["remaining"], 0);
        assert_eq!(h.remote.applied().len(), 1);
    }
}
