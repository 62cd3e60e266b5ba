//! offline_list_works tool implementation.

use rmcp::ErrorData as McpError;
use rmcp::model::CallToolResult;
use serde::{Deserialize, Serialize};
use shelf_core::{CacheClient, CacheSummary};

use super::json_result;

/// Output from the offline_list_works tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListWorksOutput {
    /// Number of readable offline copies.
    pub count: usize,
    pub works: Vec<CacheSummary>,
}

/// Implementation of the offline_list_works tool.
pub async fn list_works_impl(client: &CacheClient) -> Result<CallToolResult, McpError> {
    let works = client.list_offline_works().await?;
    json_result(&ListWorksOutput { count: works.len(), works })
}
