//! offline_revoke_work tool implementation.
//!
//! Drops a copy because its owner deleted the work or withdrew consent.

use rmcp::ErrorData as McpError;
use rmcp::model::CallToolResult;
use shelf_core::{CacheClient, DeleteReason};

use super::remove_work::RemoveWorkOutput;
use super::{DocumentParams, document_id, json_result};

/// Implementation of the offline_revoke_work tool.
pub async fn revoke_impl(client: &CacheClient, params: DocumentParams) -> Result<CallToolResult, McpError> {
    let id = document_id(&params.document_id)?;
    client.revoke_work(id.as_str()).await?;
    json_result(&RemoveWorkOutput { document_id: id, reason: DeleteReason::Revoked })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::{client, output, work};
    use shelf_core::{ConsentLevel, Event};

    #[tokio::test]
    async fn test_revoke_broadcasts_revoked() {
        let client = client().await;
        client.cache_work("w-1", work("Sky"), ConsentLevel::FullOffline).await.unwrap();
        let mut events = client.subscribe();

        let result = revoke_impl(&client, DocumentParams { document_id: "w-1".to_string() }).await.unwrap();
        let revoked: RemoveWorkOutput = output(&result);
        assert_eq!(revoked.reason, DeleteReason::Revoked);
        assert_eq!(
            events.recv().await.unwrap(),
            Event::WorkDeleted { document_id: "w-1".to_string(), reason: DeleteReason::Revoked }
        );
        assert!(client.list_offline_works().await.unwrap().is_empty());
    }
}
