//! Waste-diary tools: add_record and today_records.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::tools::json_result;
use crate::worker::Worker;
use binsync_core::NewWasteEntry;

/// Input parameters for the add_record tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AddRecordParams {
    /// Waste category, e.g. "plastic" or "glass".
    pub category: String,

    /// Weight in kilograms. Must be positive.
    pub weight_kg: f64,

    /// Optional free-text note.
    #[serde(default)]
    pub note: Option<String>,
}

impl From<AddRecordParams> for NewWasteEntry {
    fn from(params: AddRecordParams) -> Self {
        NewWasteEntry { category: params.category, weight_kg: params.weight_kg, note: params.note }
    }
}

/// Store a record locally and queue it for sync.
pub async fn add_impl(worker: &Worker, params: AddRecordParams) -> Result<CallToolResult, McpError> {
    let outcome = worker.add_record(params.into()).await?;
    json_result(&outcome)
}

/// Records created today (UTC).
pub async fn today_impl(worker: &Worker) -> Result<CallToolResult, McpError> {
    let records = worker.today_records().await;
    json_result(&records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::result_json;
    use crate::worker::testing::harness;

    fn params(category: &str, weight_kg: f64) -> AddRecordParams {
        AddRecordParams { category: category.into(), weight_kg, note: None }
    }

    #[tokio::test]
    async fn test_add_then_list_today() {
        let h = harness("1.0.0").await;
        let added = result_json(&add_impl(&h.worker, params("glass", 2.5)).await.unwrap());
        assert_eq!(added["synced"], true);
        assert_eq!(added["pending"], 0);
        assert_eq!(added["entry"]["category"], "glass");

        let today = result_json(&today_impl(&h.worker).await.unwrap());
        assert_eq!(today.as_array().unwrap().len(), 1);
        assert_eq!(today[0]["id"], added["entry"]["id"]);
        assert_eq!(h.remote.applied().len(), 1);
    }

    #[tokio::test]
    async fn test_add_rejects_bad_weight() {
        let h = harness("1.0.0").await;
        let err = add_impl(&h.worker, params("paper", -1.0)).await.unwrap_err();
        assert_eq!(err.code.0, -32602);
        assert!(result_json(&today_impl(&h.worker).await.unwrap()).as_array().unwrap().is_empty());
    }
}
