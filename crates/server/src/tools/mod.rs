//! MCP tool implementations.
//!
//! Each tool validates its parameters, sends one command through the cache
//! client and returns the outcome as pretty-printed JSON text.

pub mod cache_work;
pub mod list_works;
pub mod read_work;
pub mod refresh_retention;
pub mod remove_work;
pub mod revoke_work;

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::ToolError;

/// Parameters for tools that act on a single cached work.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DocumentParams {
    /// Identifier of the work.
    pub document_id: String,
}

/// Trimmed, non-empty document id.
pub(crate) fn document_id(raw: &str) -> Result<String, ToolError> {
    let id = raw.trim();
    if id.is_empty() {
        return Err(ToolError::InvalidInput("document_id must not be empty".to_string()));
    }
    Ok(id.to_string())
}

pub(crate) fn json_result<T: Serialize>(output: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(output)
        .map_err(|e| ToolError::SerializeFailed(format!("Failed to serialize output: {e}")))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use rmcp::model::CallToolResult;
    use serde::de::DeserializeOwned;
    use shelf_core::{AgentSettings, CacheClient, CacheDb, ChapterPayload, ConsentPolicy, SystemClock, WorkPayload, spawn_agent};

    pub async fn client() -> CacheClient {
        let db = CacheDb::open_in_memory().await.unwrap();
        let (handle, _task) = spawn_agent(db, ConsentPolicy::default(), Arc::new(SystemClock), AgentSettings::default());
        assert!(handle.wait_ready().await);
        CacheClient::connect(&handle)
    }

    pub fn work(title: &str) -> WorkPayload {
        WorkPayload {
            title: title.to_string(),
            chapters: vec![
                ChapterPayload { number: 1, content: "First.".to_string(), ..Default::default() },
                ChapterPayload { number: 2, content: "Second.".to_string(), ..Default::default() },
            ],
            ..Default::default()
        }
    }

    pub fn output<T: DeserializeOwned>(result: &CallToolResult) -> T {
        let content_val = serde_json::to_value(&result.content[0]).unwrap();
        let text = content_val
            .get("text")
            .and_then(|v| v.as_str())
            .expect("Expected text field in content");
        serde_json::from_str(text).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_id_is_trimmed() {
        assert_eq!(document_id("  w-1 ").unwrap(), "w-1");
    }

    #[test]
    fn test_blank_document_id_is_rejected() {
        assert!(matches!(document_id("   "), Err(ToolError::InvalidInput(_))));
    }
}
