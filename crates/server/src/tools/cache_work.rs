//! offline_cache_work tool implementation.
//!
//! Saves a work for offline reading under its owner's consent level.

use rmcp::ErrorData as McpError;
use rmcp::model::CallToolResult;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use shelf_core::{CacheClient, ConsentLevel, WorkPayload};

use super::{document_id, json_result};

/// Parameters for the offline_cache_work tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheWorkParams {
    /// Identifier of the work.
    pub document_id: String,

    /// The owner's consent level: "FullOffline", "TransientOnly" or "Disallowed".
    pub consent_level: ConsentLevel,

    /// Work content to keep offline.
    pub work: WorkPayload,
}

/// Implementation of the offline_cache_work tool.
pub async fn cache_work_impl(client: &CacheClient, params: CacheWorkParams) -> Result<CallToolResult, McpError> {
    let id = document_id(&params.document_id)?;
    let receipt = client.cache_work(id, params.work, params.consent_level).await?;
    json_result(&receipt)
}
