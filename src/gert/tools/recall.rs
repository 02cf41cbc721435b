//! Tool for recalling past conversations.

use async_trait::async_trait;
use std::error::Error;
use std::sync::Arc;

use crate::gert::store::ConversationStore;
use crate::gert::tool_protocol::{
    Tool, ToolMetadata, ToolParameter, ToolParameterType, ToolResult,
};

const MAX_RESULTS: usize = 5;

/// Searches stored conversations by topic or content.
pub struct RecallTool {
    store: Arc<ConversationStore>,
    metadata: ToolMetadata,
}

impl RecallTool {
    pub fn new(store: Arc<ConversationStore>) -> Self {
        let metadata = ToolMetadata::new(
            "lookup_past_conversations",
            "Search past conversations by topic or content.",
        )
        .with_parameter(
            ToolParameter::new("query", ToolParameterType::String)
                .with_description("Search query to find relevant past conversations")
                .required(),
        );
        Self { store, metadata }
    }
}

#[async_trait]
impl Tool for RecallTool {
    fn metadata(&self) -> &ToolMetadata {
        &self.metadata
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
    ) -> Result<ToolResult, Box<dyn Error + Send + Sync>> {
        let query = match arguments.get("query").and_then(|v| v.as_str()) {
            Some(query) => query,
            None => return Ok(ToolResult::failure("'query' is required")),
        };

        let ids = match self.store.search(query).await {
            Ok(ids) => ids,
            Err(err) => return Ok(ToolResult::failure(err.to_string())),
        };
        if ids.is_empty() {
            return Ok(ToolResult::success(serde_json::json!({
                "message": "No matching conversations found"
            })));
        }

        let index = match self.store.list().await {
            Ok(entries) => entries,
            Err(err) => return Ok(ToolResult::failure(err.to_string())),
        };

        let mut matches = Vec::new();
        for id in ids.iter().take(MAX_RESULTS) {
            if let Some(entry) = index.iter().find(|e| &e.id == id) {
                matches.push(serde_json::json!({
                    "id": entry.id,
                    "summary": entry.summary,
                    "turn_count": entry.turn_count,
                    "last_updated": entry.last_updated,
                }));
            }
        }

        Ok(ToolResult::success(
            serde_json::json!({ "conversations": matches }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gert::conversation::Turn;

    #[tokio::test]
    async fn test_recall_finds_matching_conversation() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ConversationStore::open(dir.path()).unwrap());
        let id = store.create().await.unwrap();
        store
            .append(&id, Turn::user("let's talk about sourdough bread"))
            .await
            .unwrap();

        let tool = RecallTool::new(Arc::clone(&store));
        let result = tool
            .execute(serde_json::json!({"query": "sourdough"}))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.output["conversations"][0]["id"], id.as_str());
    }

    #[tokio::test]
    async fn test_recall_reports_no_matches() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ConversationStore::open(dir.path()).unwrap());
        let tool = RecallTool::new(store);

        let result = tool
            .execute(serde_json::json!({"query": "nothing"}))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.output["message"], "No matching conversations found");
    }
}
