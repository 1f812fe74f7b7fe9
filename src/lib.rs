//! exercise-forge: LLM-backed generator of validated Python exercises.
//!
//! A request names a topic and a context. The [`exercise::GenerationOrchestrator`]
//! prompts a model, extracts the structured exercise from its reply, writes
//! any data file the code reads, checks the code's syntax without running it,
//! and retries until an exercise passes.

pub mod cli;
pub mod config;
pub mod error;
pub mod exercise;
pub mod history;
pub mod llm;
pub mod utils;

// Re-export commonly used types
pub use config::{ConfigError, ForgeConfig, ProviderKind};
pub use error::{ExerciseError, ExerciseResult, HistoryError, LlmError};
pub use exercise::{
    GeneratedExercise, GenerationOrchestrator, GenerationOutcome, OrchestratorConfig,
    RetryPolicy, Topic,
};
pub use history::HistoryStore;
pub use llm::LlmProvider;
