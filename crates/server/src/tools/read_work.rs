//! offline_read_work tool implementation.
//!
//! Returns the stored copy of a work, or one chapter of it.

use rmcp::ErrorData as McpError;
use rmcp::model::CallToolResult;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use shelf_core::{CacheClient, OfflineWork};

use super::{document_id, json_result};
use crate::error::ToolError;

/// Parameters for the offline_read_work tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ReadWorkParams {
    /// Identifier of the work.
    pub document_id: String,

    /// Only return this chapter number.
    #[serde(default)]
    pub chapter: Option<u32>,
}

/// Output from the offline_read_work tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadWorkOutput {
    /// False when there is no readable copy (never cached, removed, revoked or expired).
    pub found: bool,
    pub work: Option<OfflineWork>,
}

/// Implementation of the offline_read_work tool.
pub async fn read_work_impl(client: &CacheClient, params: ReadWorkParams) -> Result<CallToolResult, McpError> {
    let id = document_id(&params.document_id)?;
    let mut work = client.read_work(id).await?;

    if let (Some(work), Some(number)) = (work.as_mut(), params.chapter) {
        work.payload.chapters.retain(|chapter| chapter.number == number);
        if work.payload.chapters.is_empty() {
            return Err(ToolError::InvalidInput(format!("chapter {number} is not in the offline copy")).into());
        }
    }

    json_result(&ReadWorkOutput { found: work.is_some(), work })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::{client, output, work};
    use rmcp::model::ErrorCode;
    use shelf_core::ConsentLevel;

    #[tokio::test]
    async fn test_read_missing() {
        let client = client().await;
        let params = ReadWorkParams { document_id: "w-1".to_string(), chapter: None };

        let result = read_work_impl(&client, params).await.unwrap();
        let read: ReadWorkOutput = output(&result);
        assert!(!read.found);
        assert!(read.work.is_none());
    }

    #[tokio::test]
    async fn test_read_single_chapter() {
        let client = client().await;
        client.cache_work("w-1", work("Sky"), ConsentLevel::FullOffline).await.unwrap();

        let params = ReadWorkParams { document_id: "w-1".to_string(), chapter: Some(2) };
        let result = read_work_impl(&client, params).await.unwrap();
        let read: ReadWorkOutput = output(&result);
        let chapters = read.work.unwrap().payload.chapters;
        assert_eq!(chapters.len(), 1);
        assert_eq!(chapters[0].content, "Second.");
    }

    #[tokio::test]
    async fn test_read_unknown_chapter() {
        let client = client().await;
        client.cache_work("w-1", work("Sky"), ConsentLevel::FullOffline).await.unwrap();

        let params = ReadWorkParams { document_id: "w-1".to_string(), chapter: Some(9) };
        let err = read_work_impl(&client, params).await.unwrap_err();
        assert_eq!(err.code, ErrorCode(-32602));
    }
}
