//! MCP server handler implementation.
//!
//! This module exposes the worker's control channel and request path as MCP
//! tools and routes tool calls to the implementations in [`crate::tools`].
use std::sync::Arc;

use crate::tools::{
    AddRecordParams, ConnectivityParams, ControlParams, FetchParams, cache, control, fetch::fetch_impl, records,
    status::status_impl,
};
use crate::worker::Worker;

use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};

/// The MCP server handler for the binsync worker.
#[derive(Clone)]
pub struct WorkerServer {
    worker: Arc<Worker>,
    tool_router: ToolRouter<Self>,
}

/// Tool router implementation using the #[tool_router] macro.
#[tool_router]
impl WorkerServer {
    pub fn new(worker: Arc<Worker>) -> Self {
        Self { worker, tool_router: Self::tool_router() }
    }

    #[tool(description = "Route a request through the cache strategies. Non-GET requests pass through uncached.")]
    async fn fetch(&self, params: Parameters<FetchParams>) -> Result<CallToolResult, McpError> {
        fetch_impl(&self.worker, params.0).await
    }

    #[tool(description = "Report a connectivity change. Going online drains the sync queue.")]
    async fn set_connectivity(&self, params: Parameters<ConnectivityParams>) -> Result<CallToolResult, McpError> {
        control::connectivity_impl(&self.worker, params.0)
    }

    #[tool(description = "Log a waste entry. It is stored locally first and synced when the remote is reachable.")]
    async fn add_record(&self, params: Parameters<AddRecordParams>) -> Result<CallToolResult, McpError> {
        records::add_impl(&self.worker, params.0).await
    }

    #[tool(description = "List waste entries created today.")]
    async fn today_records(&self) -> Result<CallToolResult, McpError> {
        records::today_impl(&self.worker).await
    }

    #[tool(description = "Serving version, update lifecycle, connectivity, pending sync and cache state.")]
    async fn worker_status(&self) -> Result<CallToolResult, McpError> {
        status_impl(&self.worker).await
    }

    #[tool(description = "Send a control message: SKIP_WAITING, GET_CACHE_SIZE, CLEAR_CACHE or SYNC_NOW.")]
    async fn control(&self, params: Parameters<ControlParams>) -> Result<CallToolResult, McpError> {
        control::control_impl(&self.worker, params.0).await
    }

    #[tool(description = "Activate the waiting worker version now. All clients must reload afterwards.")]
    async fn skip_waiting(&self) -> Result<CallToolResult, McpError> {
        control::skip_waiting_impl(&self.worker).await
    }

    #[tool(description = "Total bytes held in the response caches.")]
    async fn get_cache_size(&self) -> Result<CallToolResult, McpError> {
        cache::size_impl(&self.worker).await
    }

    #[tool(description = "Delete every response cache.")]
    async fn clear_cache(&self) -> Result<CallToolResult, McpError> {
        cache::clear_impl(&self.worker).await
    }

    #[tool(description = "Drain the sync queue now. Does nothing while offline.")]
    async fn sync_now(&self) -> Result<CallToolResult, McpError> {
        control::sync_now_impl(&self.worker).await
    }
}

impl ServerHandler for WorkerServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "binsync-worker".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}
