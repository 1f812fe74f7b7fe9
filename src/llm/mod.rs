//! LLM integration for exercise-forge.
//!
//! The generation pipeline only depends on the [`LlmProvider`] trait, so the
//! model collaborator is always passed in explicitly and tests can substitute
//! a scripted fake.
//!
//! ```ignore
//! use exercise_forge::llm::{GeminiProvider, GenerationRequest, LlmProvider, Message};
//!
//! let provider = GeminiProvider::new(std::env::var("GEMINI_API_KEY")?)?;
//! let request = GenerationRequest::new("", vec![Message::user("Hello")]);
//! let response = provider.generate(request).await?;
//! ```

pub mod litellm;
pub mod providers;

pub use litellm::{
    Choice, GenerationRequest, GenerationResponse, LiteLlmClient, LlmProvider, Message, Usage,
    DEFAULT_LITELLM_MODEL,
};
pub use providers::{GeminiProvider, DEFAULT_GEMINI_MODEL};
