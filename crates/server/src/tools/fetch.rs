//! fetch tool implementation.
//!
//! Routes one request through the live router generation, exactly as an
//! intercepted page or asset request would be.

use std::collections::BTreeMap;

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::tools::json_result;
use crate::worker::Worker;
use binsync_client::{RequestClass, ResponseSource};

/// Input parameters for the fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FetchParams {
    /// App path (e.g. "/assets/app.js") or absolute URL.
    pub target: String,

    /// Treat the request as a page navigation, which falls back to the offline page.
    #[serde(default)]
    pub navigation: bool,

    /// HTTP method (default GET). Anything but GET bypasses the caches.
    #[serde(default)]
    pub method: Option<String>,

    /// Request headers forwarded to the network.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Request body forwarded to the network.
    #[serde(default)]
    pub body: Option<String>,
}

#[cfg(test)]
impl FetchParams {
    pub fn get(target: &str) -> Self {
        Self { target: target.into(), navigation: false, method: None, headers: BTreeMap::new(), body: None }
    }

    pub fn navigate(target: &str) -> Self {
        Self { navigation: true, ..Self::get(target) }
    }
}

/// Output of the fetch tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct FetchOutput {
    pub status: u16,
    pub source: ResponseSource,
    pub class: Option<RequestClass>,
    pub headers: BTreeMap<String, String>,
    pub body_bytes: usize,
    /// Body decoded as UTF-8, with invalid sequences replaced.
    pub body: String,
}

pub async fn fetch_impl(worker: &Worker, params: FetchParams) -> Result<CallToolResult, McpError> {
    let mut request = worker.request(&params.target, params.navigation).await?;
    if let Some(method) = &params.method {
        request = request.with_method_name(method)?;
    }
    for (name, value) in &params.headers {
        request = request.with_header(name, value);
    }
    if let Some(body) = params.body {
        request = request.with_body(body);
    }

    let routed = worker.route(&request).await;
    let response = routed.response;
    let output = FetchOutput {
        status: response.status,
        source: routed.source,
        class: routed.class,
        body_bytes: response.body.len(),
        body: String::from_utf8_lossy(&response.body).into_owned(),
        headers: response.headers,
    };
    json_result(&output)
}
