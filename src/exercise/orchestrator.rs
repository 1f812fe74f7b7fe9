//! Generation orchestrator.
//!
//! Drives one request through build prompt, call model, extract, materialize
//! and validate, retrying from a fresh prompt whenever any step fails. Failed
//! attempts are logged and dropped; only the final validated exchange is
//! persisted.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{ExerciseResult, LlmError};
use crate::history::HistoryStore;
use crate::llm::{GenerationRequest, LlmProvider};

use super::artifact::AttemptWorkspace;
use super::extractor::extract_exercise;
use super::normalizer::normalize_to_block;
use super::prompt::{PromptBuilder, MIN_CODE_LINES};
use super::types::{ChatHistory, FinalizedExercise, GeneratedExercise, GenerationOutcome, Topic};
use super::validator::SyntaxValidator;

/// Message returned with a validated exercise.
pub const SUCCESS_MESSAGE: &str = "Exercise generated successfully";

/// Message returned when the validated exchange could not be persisted.
pub const SAVE_FAILED_MESSAGE: &str = "Error saving chat history";

/// Message returned when the user's history could not be read.
pub const LOAD_FAILED_MESSAGE: &str = "Error loading chat history";

// ============================================================================
// Retry policy
// ============================================================================

/// Exponential delay between attempts that follow a failed model call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(500),
            max: Duration::from_secs(8),
        }
    }
}

impl Backoff {
    /// Delay after the `failures`-th consecutive model failure (1-based).
    pub fn delay(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32.checked_shl(failures - 1).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }
}

/// When the orchestrator stops retrying.
///
/// `None` limits are unlimited; a policy with neither limit retries until an
/// attempt succeeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: Option<u32>,
    pub deadline: Option<Duration>,
    pub backoff: Option<Backoff>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: Some(10),
            deadline: None,
            backoff: Some(Backoff::default()),
        }
    }
}

impl RetryPolicy {
    /// Retries forever.
    pub fn unbounded() -> Self {
        Self {
            max_attempts: None,
            ..Self::default()
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = Some(backoff);
        self
    }

    pub fn without_backoff(mut self) -> Self {
        self.backoff = None;
        self
    }

    /// Reason to stop before starting another attempt, if any.
    fn stop_reason(&self, attempts: u32, elapsed: Duration) -> Option<String> {
        if let Some(max) = self.max_attempts {
            if attempts >= max {
                return Some(format!(
                    "Exhausted {} attempts without a valid exercise",
                    attempts
                ));
            }
        }
        if let Some(deadline) = self.deadline {
            if elapsed >= deadline {
                return Some(format!(
                    "Deadline of {:?} reached after {} attempts without a valid exercise",
                    deadline, attempts
                ));
            }
        }
        None
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for the [`GenerationOrchestrator`].
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Model identifier; empty uses the provider default.
    pub model: String,
    pub temperature: f64,
    pub max_tokens: Option<u32>,
    /// Minimum non-blank code lines an accepted exercise must have.
    pub min_code_lines: usize,
    /// Reject code containing comment lines.
    pub reject_comment_lines: bool,
    /// Parent directory for per-attempt scratch directories.
    pub scratch_root: Option<PathBuf>,
    pub retry: RetryPolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            temperature: 1.0,
            max_tokens: None,
            min_code_lines: MIN_CODE_LINES,
            reject_comment_lines: true,
            scratch_root: None,
            retry: RetryPolicy::default(),
        }
    }
}

impl OrchestratorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_min_code_lines(mut self, min_code_lines: usize) -> Self {
        self.min_code_lines = min_code_lines;
        self
    }

    pub fn with_reject_comment_lines(mut self, reject: bool) -> Self {
        self.reject_comment_lines = reject;
        self
    }

    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(root.into());
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

/// What became of a reply the model did produce.
enum ReplyVerdict {
    /// The exercise and the normalized code block that passed validation.
    Accepted(GeneratedExercise, String),
    Rejected(String),
}

/// Generates validated exercises from a model.
pub struct GenerationOrchestrator {
    llm: Arc<dyn LlmProvider>,
    validator: Arc<dyn SyntaxValidator>,
    history: Arc<dyn HistoryStore>,
    prompt_builder: PromptBuilder,
    config: OrchestratorConfig,
}

impl GenerationOrchestrator {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        validator: Arc<dyn SyntaxValidator>,
        history: Arc<dyn HistoryStore>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            llm,
            validator,
            history,
            prompt_builder: PromptBuilder::new(),
            config,
        }
    }

    /// Replaces the prompt builder (e.g. with a seeded one).
    pub fn with_prompt_builder(mut self, prompt_builder: PromptBuilder) -> Self {
        self.prompt_builder = prompt_builder;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Generates one exercise about `topic` in `context`.
    ///
    /// With a `user_id`, that user's history seeds the conversation and the
    /// validated exchange is appended to it. Without one, the conversation
    /// starts empty and nothing is persisted.
    pub async fn generate(
        &self,
        topic: &Topic,
        context: &str,
        user_id: Option<&str>,
    ) -> GenerationOutcome {
        let started = Instant::now();
        tracing::info!(topic = %topic, context = context, user = ?user_id, "Generating exercise");

        let mut session = match user_id {
            Some(uid) => match self.history.load_history(uid).await {
                Ok(history) => history,
                Err(e) => {
                    tracing::error!(user = uid, error = %e, "Failed to load chat history");
                    return failure(LOAD_FAILED_MESSAGE, 0);
                }
            },
            None => ChatHistory::new(),
        };

        let mut attempts = 0u32;
        let mut model_failures = 0u32;

        loop {
            if let Some(reason) = self.config.retry.stop_reason(attempts, started.elapsed()) {
                tracing::warn!(topic = %topic, attempts = attempts, "{}", reason);
                return failure(reason, attempts);
            }
            attempts += 1;

            let prompt = self.prompt_builder.build(topic, context, &session);
            tracing::debug!(attempt = attempts, prompt = %prompt, "Prompt built");

            let reply = match self.call_model(&session, &prompt).await {
                Ok(reply) => {
                    model_failures = 0;
                    reply
                }
                Err(e) => {
                    model_failures += 1;
                    tracing::warn!(
                        attempt = attempts,
                        error = %e,
                        transient = e.is_transient(),
                        "Model call failed, retrying..."
                    );
                    self.back_off(model_failures, started).await;
                    continue;
                }
            };
            tracing::debug!(attempt = attempts, reply = %reply, "Model replied");
            session.push_exchange(prompt.clone(), reply.clone());

            let (exercise, code) = match self.evaluate(&reply).await {
                Ok(ReplyVerdict::Accepted(exercise, code)) => (exercise, code),
                Ok(ReplyVerdict::Rejected(reason)) => {
                    tracing::warn!(attempt = attempts, reason = %reason, "Exercise rejected, retrying...");
                    continue;
                }
                Err(e) => {
                    tracing::warn!(attempt = attempts, error = %e, "Attempt discarded, retrying...");
                    continue;
                }
            };

            let finalized = finalize(exercise, code);

            if let Some(uid) = user_id {
                let saved = self
                    .history
                    .append_history(uid, topic.label(), context, &reply, &prompt)
                    .await;
                match saved {
                    Ok(true) => {}
                    Ok(false) => {
                        tracing::error!(user = uid, "History store declined the exchange");
                        return failure(SAVE_FAILED_MESSAGE, attempts);
                    }
                    Err(e) => {
                        tracing::error!(user = uid, error = %e, "Failed to save chat history");
                        return failure(SAVE_FAILED_MESSAGE, attempts);
                    }
                }
            }

            tracing::info!(
                topic = %topic,
                attempts = attempts,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Exercise generated"
            );
            return GenerationOutcome {
                success: true,
                message: SUCCESS_MESSAGE.to_string(),
                exercise: Some(finalized),
                attempts,
            };
        }
    }

    async fn call_model(&self, session: &ChatHistory, prompt: &str) -> Result<String, LlmError> {
        let mut request = GenerationRequest::new(
            self.config.model.clone(),
            session.to_messages_with(prompt),
        )
        .with_temperature(self.config.temperature);
        if let Some(max_tokens) = self.config.max_tokens {
            request = request.with_max_tokens(max_tokens);
        }

        let response = self.llm.generate(request).await?;
        response
            .first_content()
            .filter(|c| !c.trim().is_empty())
            .map(str::to_string)
            .ok_or_else(|| LlmError::ParseError("Empty model response".to_string()))
    }

    /// Extracts, checks and validates one reply inside its own scratch
    /// directory.
    async fn evaluate(&self, reply: &str) -> ExerciseResult<ReplyVerdict> {
        let exercise = extract_exercise(reply)?;

        if let Some(reason) = self.content_problem(&exercise) {
            return Ok(ReplyVerdict::Rejected(reason));
        }

        let workspace = AttemptWorkspace::create(self.config.scratch_root.as_deref())?;
        workspace
            .materializer()
            .materialize(exercise.csv_name.as_deref(), exercise.csv_content.as_deref())
            .await?;

        let code = normalize_to_block(&exercise.code);
        let result = self.validator.validate(&code, workspace.path()).await?;

        if result.passed {
            Ok(ReplyVerdict::Accepted(exercise, code))
        } else {
            Ok(ReplyVerdict::Rejected(format!(
                "syntax check failed: {}",
                result.diagnostic.unwrap_or_default()
            )))
        }
    }

    fn content_problem(&self, exercise: &GeneratedExercise) -> Option<String> {
        let lines = exercise.non_blank_lines();
        if lines < self.config.min_code_lines {
            return Some(format!(
                "code has {} non-blank lines, need {}",
                lines, self.config.min_code_lines
            ));
        }
        if self.config.reject_comment_lines {
            let comments = exercise.comment_lines();
            if comments > 0 {
                return Some(format!("code has {} comment lines", comments));
            }
        }
        None
    }

    async fn back_off(&self, failures: u32, started: Instant) {
        let Some(backoff) = self.config.retry.backoff else {
            return;
        };
        let mut delay = backoff.delay(failures);
        if let Some(deadline) = self.config.retry.deadline {
            delay = delay.min(deadline.saturating_sub(started.elapsed()));
        }
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

fn finalize(exercise: GeneratedExercise, code: String) -> FinalizedExercise {
    FinalizedExercise {
        code,
        description: exercise.description,
        expected_output: exercise.expected_output,
        csv_name: exercise.csv_name,
        csv_content: exercise.csv_content,
    }
}

fn failure(message: impl Into<String>, attempts: u32) -> GenerationOutcome {
    GenerationOutcome {
        success: false,
        message: message.into(),
        exercise: None,
        attempts,
    }
}
