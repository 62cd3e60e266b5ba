//! MCP server handler implementation.
//!
//! Routes tool calls to the offline cache tools. Every tool goes through one
//! shared [`CacheClient`], so replies are correlated and events fan out from a
//! single subscriber.

use std::sync::Arc;

use crate::tools::{
    DocumentParams,
    cache_work::{CacheWorkParams, cache_work_impl},
    list_works::list_works_impl,
    read_work::{ReadWorkParams, read_work_impl},
    refresh_retention::refresh_impl,
    remove_work::remove_impl,
    revoke_work::revoke_impl,
};

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
use shelf_core::CacheClient;

/// The main MCP server handler for mcp-shelf.
#[derive(Clone)]
pub struct ShelfServer {
    client: Arc<CacheClient>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl ShelfServer {
    pub fn new(client: Arc<CacheClient>) -> Self {
        Self { client, tool_router: Self::tool_router() }
    }

    #[tool(
        description = "Save a work for offline reading. Retention follows the owner's consent level: FullOffline keeps it 30 days, TransientOnly 48 hours, Disallowed is refused."
    )]
    async fn offline_cache_work(&self, params: Parameters<CacheWorkParams>) -> Result<CallToolResult, McpError> {
        cache_work_impl(&self.client, params.0).await
    }

    #[tool(description = "Remove the reader's offline copy of a work. Succeeds even if no copy exists.")]
    async fn offline_remove_work(&self, params: Parameters<DocumentParams>) -> Result<CallToolResult, McpError> {
        remove_impl(&self.client, params.0).await
    }

    #[tool(description = "List works available offline with their consent level and expiry.")]
    async fn offline_list_works(&self) -> Result<CallToolResult, McpError> {
        list_works_impl(&self.client).await
    }

    #[tool(description = "Read the offline copy of a work, optionally a single chapter.")]
    async fn offline_read_work(&self, params: Parameters<ReadWorkParams>) -> Result<CallToolResult, McpError> {
        read_work_impl(&self.client, params.0).await
    }

    #[tool(description = "Restart a cached work's retention window from now. Limited number of refreshes per copy.")]
    async fn offline_refresh_retention(&self, params: Parameters<DocumentParams>) -> Result<CallToolResult, McpError> {
        refresh_impl(&self.client, params.0).await
    }

    #[tool(description = "Drop an offline copy because the owner deleted the work or withdrew consent.")]
    async fn offline_revoke_work(&self, params: Parameters<DocumentParams>) -> Result<CallToolResult, McpError> {
        revoke_impl(&self.client, params.0).await
    }
}

impl ServerHandler for ShelfServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "mcp-shelf".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            instructions: Some("Consent-aware offline cache for published works.".into()),
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
