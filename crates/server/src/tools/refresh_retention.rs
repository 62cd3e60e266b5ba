//! offline_refresh_retention tool implementation.
//!
//! Restarts a copy's retention window from now, up to the refresh limit.

use rmcp::ErrorData as McpError;
use rmcp::model::CallToolResult;
use shelf_core::CacheClient;

use super::{DocumentParams, document_id, json_result};

/// Implementation of the offline_refresh_retention tool.
pub async fn refresh_impl(client: &CacheClient, params: DocumentParams) -> Result<CallToolResult, McpError> {
    let id = document_id(&params.document_id)?;
    let receipt = client.refresh_retention(id).await?;
    json_result(&receipt)
}
