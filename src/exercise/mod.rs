//! Exercise generation pipeline.
//!
//! - [`prompt`]: instruction prompts per topic
//! - [`extractor`]: structured payload extraction from model replies
//! - [`normalizer`]: canonical indentation of generated code
//! - [`artifact`]: per-attempt synthetic data files
//! - [`validator`]: check-only syntax validation
//! - [`orchestrator`]: the retrying generation loop tying them together

pub mod artifact;
pub mod extractor;
pub mod normalizer;
pub mod orchestrator;
pub mod prompt;
pub mod types;
pub mod validator;

pub use artifact::{ArtifactMaterializer, AttemptWorkspace};
pub use extractor::extract_exercise;
pub use normalizer::{normalize, normalize_to_block};
pub use orchestrator::{
    Backoff, GenerationOrchestrator, OrchestratorConfig, RetryPolicy, SAVE_FAILED_MESSAGE,
    SUCCESS_MESSAGE,
};
pub use prompt::PromptBuilder;
pub use types::{
    ChatHistory, ChatHistoryRecord, ChatRole, ChatTurn, FinalizedExercise, GeneratedExercise,
    GenerationOutcome, Topic, ValidationResult,
};
pub use validator::{PythonSyntaxValidator, SyntaxValidator, DEFAULT_SYNTAX_TIMEOUT};
