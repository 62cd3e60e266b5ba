//! offline_remove_work tool implementation.
//!
//! Removes a reader's offline copy. Removing a work that is not cached succeeds.

use rmcp::ErrorData as McpError;
use rmcp::model::CallToolResult;
use serde::{Deserialize, Serialize};
use shelf_core::{CacheClient, DeleteReason};

use super::{DocumentParams, document_id, json_result};

/// Output from the offline_remove_work and offline_revoke_work tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveWorkOutput {
    pub document_id: String,
    pub reason: DeleteReason,
}

/// Implementation of the offline_remove_work tool.
pub async fn remove_impl(client: &CacheClient, params: DocumentParams) -> Result<CallToolResult, McpError> {
    let id = document_id(&params.document_id)?;
    client.remove_work(id.as_str()).await?;
    json_result(&RemoveWorkOutput { document_id: id, reason: DeleteReason::Manual })
}
