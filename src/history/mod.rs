//! Per-user chat history.
//!
//! History is an append-only log of successful generations keyed by user
//! identity. The orchestrator only ever reads a user's whole log once per
//! request and appends one record on success.

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryHistoryStore;
pub use sqlite::SqliteHistoryStore;

use async_trait::async_trait;

use crate::error::HistoryError;
use crate::exercise::types::ChatHistory;

/// Storage backend for chat history.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// All turns recorded for `user_id`, oldest first. Unknown users have an
    /// empty history.
    async fn load_history(&self, user_id: &str) -> Result<ChatHistory, HistoryError>;

    /// Appends one generation. Returns `Ok(false)` when the store declined the
    /// write without an underlying error.
    async fn append_history(
        &self,
        user_id: &str,
        topic: &str,
        context: &str,
        raw_reply: &str,
        prompt: &str,
    ) -> Result<bool, HistoryError>;
}
