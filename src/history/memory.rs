//! In-process history store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::HistoryError;
use crate::exercise::types::{ChatHistory, ChatHistoryRecord};

use super::HistoryStore;

/// History kept in memory for the lifetime of the process.
#[derive(Debug, Default)]
pub struct InMemoryHistoryStore {
    records: RwLock<HashMap<String, Vec<ChatHistoryRecord>>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records stored for `user_id`, oldest first.
    pub async fn records(&self, user_id: &str) -> Vec<ChatHistoryRecord> {
        self.records
            .read()
            .await
            .get(user_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of records across all users.
    pub async fn total_records(&self) -> usize {
        self.records.read().await.values().map(Vec::len).sum()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn load_history(&self, user_id: &str) -> Result<ChatHistory, HistoryError> {
        let records = self.records.read().await;
        let turns = records
            .get(user_id)
            .map(|rs| rs.iter().flat_map(ChatHistoryRecord::to_turns).collect())
            .unwrap_or_default();
        Ok(ChatHistory::from_turns(turns))
    }

    async fn append_history(
        &self,
        user_id: &str,
        topic: &str,
        context: &str,
        raw_reply: &str,
        prompt: &str,
    ) -> Result<bool, HistoryError> {
        let record = ChatHistoryRecord::new(user_id, topic, context, raw_reply, prompt);
        self.records
            .write()
            .await
            .entry(user_id.to_string())
            .or_default()
            .push(record);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exercise::types::{ChatRole, ChatTurn};

    #[tokio::test]
    async fn test_unknown_user_has_empty_history() {
        let store = InMemoryHistoryStore::new();
        assert!(store.load_history("nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_append_then_load_preserves_order() {
        let store = InMemoryHistoryStore::new();
        assert!(store
            .append_history("u1", "Correlation", "weather", "reply 1", "prompt 1")
            .await
            .unwrap());
        store
            .append_history("u1", "DataFrame", "zoo", "reply 2", "prompt 2")
            .await
            .unwrap();
        store
            .append_history("u2", "DataFrame", "zoo", "other", "other prompt")
            .await
            .unwrap();

        let history = store.load_history("u1").await.unwrap();
        assert_eq!(
            history.turns(),
            &[
                ChatTurn::user("prompt 1"),
                ChatTurn::model("reply 1"),
                ChatTurn::user("prompt 2"),
                ChatTurn::model("reply 2"),
            ]
        );
        assert_eq!(history.turns()[0].role, ChatRole::User);
        assert_eq!(store.records("u1").await.len(), 2);
        assert_eq!(store.total_records().await, 3);
    }
}
