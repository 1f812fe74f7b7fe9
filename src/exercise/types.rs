//! Core types for exercise generation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::llm::Message;

// ============================================================================
// Topics
// ============================================================================

/// Topic selecting a prompt template.
///
/// Known topics carry a fixed label used for the exact-match clause lookup.
/// Anything else is kept verbatim as `Custom` and falls back to the generic
/// clause.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Topic {
    DataFrame,
    Nmi,
    Nltk,
    Correlation,
    LinearRegression,
    DecisionTree,
    Csv,
    Custom(String),
}

impl Topic {
    /// Returns all known topics.
    pub fn all() -> Vec<Topic> {
        vec![
            Topic::DataFrame,
            Topic::Nmi,
            Topic::Nltk,
            Topic::Correlation,
            Topic::LinearRegression,
            Topic::DecisionTree,
            Topic::Csv,
        ]
    }

    /// Short key accepted on the command line.
    pub fn key(&self) -> &str {
        match self {
            Topic::DataFrame => "DataFrame",
            Topic::Nmi => "NMI",
            Topic::Nltk => "NLTK",
            Topic::Correlation => "Correlation",
            Topic::LinearRegression => "LinearRegression",
            Topic::DecisionTree => "DecisionTree",
            Topic::Csv => "CSV",
            Topic::Custom(label) => label,
        }
    }

    /// Label embedded in prompts and persisted with history records.
    pub fn label(&self) -> &str {
        match self {
            Topic::DataFrame => "DataFrame",
            Topic::Nmi => "NMI (Normalised Mutual Information)",
            Topic::Nltk => "Sentence splitting using nltk (i.e. nltk.sent_tokenize())",
            Topic::Correlation => "Correlation",
            Topic::LinearRegression => "Linear Regression",
            Topic::DecisionTree => "Decision Tree Classifier",
            Topic::Csv => "Reading/Writing CSV files",
            Topic::Custom(label) => label,
        }
    }

    /// Parses a key or a label. Keys match case-insensitively, labels exactly.
    pub fn parse(s: &str) -> Topic {
        let s = s.trim();
        Topic::all()
            .into_iter()
            .find(|t| t.key().eq_ignore_ascii_case(s) || t.label() == s)
            .unwrap_or_else(|| Topic::Custom(s.to_string()))
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl From<&str> for Topic {
    fn from(s: &str) -> Self {
        Topic::parse(s)
    }
}

// ============================================================================
// Chat history
// ============================================================================

/// Who produced a chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Model,
}

/// One role-tagged turn of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub text: String,
}

impl ChatTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Model,
            text: text.into(),
        }
    }

    /// Converts into a provider-neutral message.
    pub fn to_message(&self) -> Message {
        match self.role {
            ChatRole::User => Message::user(self.text.clone()),
            ChatRole::Model => Message::assistant(self.text.clone()),
        }
    }
}

/// Ordered, append-only sequence of chat turns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatHistory {
    turns: Vec<ChatTurn>,
}

impl ChatHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_turns(turns: Vec<ChatTurn>) -> Self {
        Self { turns }
    }

    /// Appends a (user prompt, model reply) pair.
    pub fn push_exchange(&mut self, prompt: impl Into<String>, reply: impl Into<String>) {
        self.turns.push(ChatTurn::user(prompt));
        self.turns.push(ChatTurn::model(reply));
    }

    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Messages for the whole history followed by a new user prompt.
    pub fn to_messages_with(&self, prompt: &str) -> Vec<Message> {
        self.turns
            .iter()
            .map(ChatTurn::to_message)
            .chain(std::iter::once(Message::user(prompt)))
            .collect()
    }
}

/// Persisted record of one successful generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatHistoryRecord {
    pub id: Uuid,
    pub user_id: String,
    pub topic: String,
    pub context: String,
    /// Raw model reply.
    pub question: String,
    pub prompt: String,
    pub created_at: DateTime<Utc>,
}

impl ChatHistoryRecord {
    pub fn new(
        user_id: impl Into<String>,
        topic: impl Into<String>,
        context: impl Into<String>,
        question: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            topic: topic.into(),
            context: context.into(),
            question: question.into(),
            prompt: prompt.into(),
            created_at: Utc::now(),
        }
    }

    /// The (prompt, reply) pair this record contributes to a conversation.
    pub fn to_turns(&self) -> [ChatTurn; 2] {
        [
            ChatTurn::user(self.prompt.clone()),
            ChatTurn::model(self.question.clone()),
        ]
    }
}

// ============================================================================
// Exercises
// ============================================================================

/// A programming exercise extracted from a model reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedExercise {
    /// Code lines, in order. After finalization this holds the normalized lines.
    pub code: Vec<String>,
    pub description: String,
    pub expected_output: String,
    pub csv_name: Option<String>,
    pub csv_content: Option<String>,
}

impl GeneratedExercise {
    /// Lines that contain something other than whitespace.
    pub fn non_blank_lines(&self) -> usize {
        self.code.iter().filter(|l| !l.trim().is_empty()).count()
    }

    /// Lines whose first non-whitespace character starts a Python comment.
    pub fn comment_lines(&self) -> usize {
        self.code
            .iter()
            .filter(|l| l.trim_start().starts_with('#'))
            .count()
    }

    /// Encodes the exercise in the response shape the model is asked for.
    pub fn to_payload_json(&self) -> serde_json::Value {
        serde_json::json!({
            "Code": self.code,
            "Description": self.description,
            "ExpectedOutput": self.expected_output,
            "CSVName": self.csv_name.clone().unwrap_or_default(),
            "CSV": self.csv_content.clone().unwrap_or_default(),
        })
    }
}

/// Outcome of a syntax check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub passed: bool,
    pub diagnostic: Option<String>,
}

impl ValidationResult {
    pub fn pass() -> Self {
        Self {
            passed: true,
            diagnostic: None,
        }
    }

    pub fn fail(diagnostic: impl Into<String>) -> Self {
        Self {
            passed: false,
            diagnostic: Some(diagnostic.into()),
        }
    }
}

/// Result returned to callers of `generate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationOutcome {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exercise: Option<FinalizedExercise>,
    /// Attempts made, including the successful one.
    pub attempts: u32,
}

/// A validated exercise with its code joined into one block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizedExercise {
    pub code: String,
    pub description: String,
    pub expected_output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub csv_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub csv_content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_parse_key_and_label() {
        assert_eq!(Topic::parse("correlation"), Topic::Correlation);
        assert_eq!(Topic::parse("NMI"), Topic::Nmi);
        assert_eq!(
            Topic::parse("NMI (Normalised Mutual Information)"),
            Topic::Nmi
        );
        assert_eq!(Topic::parse("csv"), Topic::Csv);
        assert_eq!(
            Topic::parse("Reading/Writing CSV files"),
            Topic::Csv
        );
        assert_eq!(
            Topic::parse(" Recursion "),
            Topic::Custom("Recursion".to_string())
        );
    }

    #[test]
    fn test_topic_labels() {
        assert_eq!(Topic::all().len(), 7);
        assert_eq!(Topic::DecisionTree.label(), "Decision Tree Classifier");
        assert_eq!(Topic::Custom("Sorting".into()).to_string(), "Sorting");
        assert_eq!(Topic::Custom("Sorting".into()).key(), "Sorting");
    }

    #[test]
    fn test_chat_history_exchange_order() {
        let mut history = ChatHistory::new();
        history.push_exchange("p1", "r1");
        history.push_exchange("p2", "r2");

        assert_eq!(history.len(), 4);
        assert_eq!(history.turns()[0], ChatTurn::user("p1"));
        assert_eq!(history.turns()[3], ChatTurn::model("r2"));

        let messages = history.to_messages_with("p3");
        assert_eq!(messages.len(), 5);
        assert_eq!(messages[1], Message::assistant("r1"));
        assert_eq!(messages[4], Message::user("p3"));
    }

    #[test]
    fn test_record_turns() {
        let record = ChatHistoryRecord::new("u1", "Correlation", "exams", "reply", "prompt");
        let [user, model] = record.to_turns();
        assert_eq!(user, ChatTurn::user("prompt"));
        assert_eq!(model, ChatTurn::model("reply"));
    }

    #[test]
    fn test_exercise_line_counts() {
        let exercise = GeneratedExercise {
            code: vec![
                "import pandas as pd".to_string(),
                "".to_string(),
                "    # a comment".to_string(),
                "print(1)".to_string(),
            ],
            description: String::new(),
            expected_output: String::new(),
            csv_name: None,
            csv_content: None,
        };
        assert_eq!(exercise.non_blank_lines(), 3);
        assert_eq!(exercise.comment_lines(), 1);
    }

    #[test]
    fn test_payload_encoding_uses_wire_names() {
        let exercise = GeneratedExercise {
            code: vec!["print(1)".to_string()],
            description: "d".to_string(),
            expected_output: "1".to_string(),
            csv_name: None,
            csv_content: None,
        };
        let payload = exercise.to_payload_json();
        assert_eq!(payload["Code"][0], "print(1)");
        assert_eq!(payload["ExpectedOutput"], "1");
        assert_eq!(payload["CSVName"], "");
        assert_eq!(payload["CSV"], "");
    }
}
