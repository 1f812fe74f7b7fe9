//! SQLite-backed chat history.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::error::HistoryError;
use crate::exercise::types::{ChatHistory, ChatHistoryRecord};

use super::HistoryStore;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS chat_history (
    seq         INTEGER PRIMARY KEY AUTOINCREMENT,
    id          TEXT    NOT NULL UNIQUE,
    user_id     TEXT    NOT NULL,
    topic       TEXT    NOT NULL,
    context     TEXT    NOT NULL,

    -- Raw model reply and the prompt that produced it
    question    TEXT    NOT NULL,
    prompt      TEXT    NOT NULL,

    created_at  TEXT    NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_chat_history_user ON chat_history(user_id, seq);
"#;

/// Append-only history table in a SQLite database.
#[derive(Clone)]
pub struct SqliteHistoryStore {
    pool: SqlitePool,
}

impl std::fmt::Debug for SqliteHistoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteHistoryStore").finish_non_exhaustive()
    }
}

impl SqliteHistoryStore {
    /// Opens (creating if needed) the database at `path`.
    pub async fn open(path: &str) -> Result<Self, HistoryError> {
        let opts = SqliteConnectOptions::from_str(&format!("sqlite://{}", path))
            .map_err(|e| HistoryError::ConnectionFailed(e.to_string()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(opts)
            .await
            .map_err(|e| HistoryError::ConnectionFailed(e.to_string()))?;

        sqlx::query(SCHEMA_SQL).execute(&pool).await?;

        tracing::info!(path = path, "Chat history store opened");
        Ok(Self { pool })
    }

    /// Records stored for `user_id`, in insertion order.
    pub async fn records(&self, user_id: &str) -> Result<Vec<ChatHistoryRecord>, HistoryError> {
        let rows = sqlx::query(
            "SELECT id, user_id, topic, context, question, prompt, created_at
             FROM chat_history WHERE user_id = ?1 ORDER BY seq ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let id: String = row.get("id");
                let created_at: String = row.get("created_at");
                Ok(ChatHistoryRecord {
                    id: Uuid::parse_str(&id)
                        .map_err(|e| HistoryError::InvalidRecord(format!("id '{}': {}", id, e)))?,
                    user_id: row.get("user_id"),
                    topic: row.get("topic"),
                    context: row.get("context"),
                    question: row.get("question"),
                    prompt: row.get("prompt"),
                    created_at: DateTime::parse_from_rfc3339(&created_at)
                        .map(|t| t.with_timezone(&Utc))
                        .map_err(|e| {
                            HistoryError::InvalidRecord(format!(
                                "created_at '{}': {}",
                                created_at, e
                            ))
                        })?,
                })
            })
            .collect()
    }

    pub async fn count(&self, user_id: &str) -> Result<u64, HistoryError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM chat_history WHERE user_id = ?1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get::<i64, _>("n") as u64)
    }

    async fn insert(&self, record: &ChatHistoryRecord) -> Result<bool, HistoryError> {
        let result = sqlx::query(
            "INSERT INTO chat_history (id, user_id, topic, context, question, prompt, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(record.id.to_string())
        .bind(&record.user_id)
        .bind(&record.topic)
        .bind(&record.context)
        .bind(&record.question)
        .bind(&record.prompt)
        .bind(record.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl HistoryStore for SqliteHistoryStore {
    async fn load_history(&self, user_id: &str) -> Result<ChatHistory, HistoryError> {
        let records = self.records(user_id).await?;
        tracing::debug!(user_id = user_id, records = records.len(), "Loaded chat history");
        Ok(ChatHistory::from_turns(
            records.iter().flat_map(ChatHistoryRecord::to_turns).collect(),
        ))
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
        self.insert(&record).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exercise::types::ChatTurn;

    async fn open_temp() -> (tempfile::TempDir, SqliteHistoryStore) {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("history.db");
        let store = SqliteHistoryStore::open(db_path.to_str().unwrap())
            .await
            .unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_open_and_append() {
        let (_dir, store) = open_temp().await;

        let ok = store
            .append_history("alice", "Correlation", "exam scores", "{\"Code\": []}", "prompt")
            .await
            .unwrap();
        assert!(ok);
        assert_eq!(store.count("alice").await.unwrap(), 1);
        assert_eq!(store.count("bob").await.unwrap(), 0);

        let records = store.records("alice").await.unwrap();
        assert_eq!(records[0].topic, "Correlation");
        assert_eq!(records[0].context, "exam scores");
        assert_eq!(records[0].question, "{\"Code\": []}");
    }

    #[tokio::test]
    async fn test_history_is_ordered_by_insertion() {
        let (_dir, store) = open_temp().await;

        for i in 0..3 {
            store
                .append_history("alice", "DataFrame", "zoo", &format!("reply {}", i), &format!("prompt {}", i))
                .await
                .unwrap();
        }
        store
            .append_history("bob", "DataFrame", "zoo", "bob reply", "bob prompt")
            .await
            .unwrap();

        let history = store.load_history("alice").await.unwrap();
        assert_eq!(history.len(), 6);
        assert_eq!(history.turns()[0], ChatTurn::user("prompt 0"));
        assert_eq!(history.turns()[1], ChatTurn::model("reply 0"));
        assert_eq!(history.turns()[5], ChatTurn::model("reply 2"));
    }

    #[tokio::test]
    async fn test_reopen_keeps_records() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("history.db");
        let path = db_path.to_str().unwrap();

        {
            let store = SqliteHistoryStore::open(path).await.unwrap();
            store
                .append_history("carol", "NMI", "genes", "reply", "prompt")
                .await
                .unwrap();
        }

        let store = SqliteHistoryStore::open(path).await.unwrap();
        let records = store.records("carol").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].prompt, "prompt");
    }
}
