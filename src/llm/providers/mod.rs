//! Concrete LLM providers beyond the OpenAI-compatible client.

pub mod gemini;

pub use gemini::{GeminiProvider, DEFAULT_GEMINI_MODEL};
