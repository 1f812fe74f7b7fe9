//! Environment-driven configuration for the exercise generator.
//!
//! Covers provider selection and credentials, sampling temperature, the
//! syntax checker, the retry cap and the optional history database.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::error::LlmError;
use crate::exercise::orchestrator::{OrchestratorConfig, RetryPolicy};
use crate::exercise::validator::{PythonSyntaxValidator, DEFAULT_SYNTAX_TIMEOUT};
use crate::llm::{
    GeminiProvider, LiteLlmClient, LlmProvider, DEFAULT_GEMINI_MODEL, DEFAULT_LITELLM_MODEL,
};

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    /// The configured provider could not be constructed.
    #[error("Provider setup failed: {0}")]
    Provider(#[from] LlmError),
}

/// Which model backend to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProviderKind {
    #[default]
    Gemini,
    LiteLlm,
}

impl FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gemini" => Ok(Self::Gemini),
            "litellm" | "openai" => Ok(Self::LiteLlm),
            other => Err(ConfigError::InvalidValue {
                key: "FORGE_PROVIDER".to_string(),
                message: format!("unknown provider '{}', expected gemini or litellm", other),
            }),
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gemini => write!(f, "gemini"),
            Self::LiteLlm => write!(f, "litellm"),
        }
    }
}

/// Runtime configuration.
#[derive(Clone)]
pub struct ForgeConfig {
    // Provider settings
    pub provider: ProviderKind,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub litellm_api_base: Option<String>,
    pub litellm_api_key: Option<String>,
    pub litellm_model: String,
    /// Sampling temperature for every model call.
    pub temperature: f64,

    // Validation settings
    /// Interpreter used for the check-only syntax validation.
    pub python: PathBuf,
    pub syntax_timeout: Duration,

    // Retry settings
    /// `None` retries until an attempt succeeds.
    pub max_attempts: Option<u32>,

    // Storage settings
    /// SQLite database for chat history; in-memory when unset.
    pub history_db: Option<PathBuf>,
}

impl std::fmt::Debug for ForgeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForgeConfig")
            .field("provider", &self.provider)
            .field("gemini_api_key", &self.gemini_api_key.as_ref().map(|_| "***"))
            .field("gemini_model", &self.gemini_model)
            .field("litellm_api_base", &self.litellm_api_base)
            .field("litellm_api_key", &self.litellm_api_key.as_ref().map(|_| "***"))
            .field("litellm_model", &self.litellm_model)
            .field("temperature", &self.temperature)
            .field("python", &self.python)
            .field("syntax_timeout", &self.syntax_timeout)
            .field("max_attempts", &self.max_attempts)
            .field("history_db", &self.history_db)
            .finish()
    }
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Gemini,
            gemini_api_key: None,
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
            litellm_api_base: None,
            litellm_api_key: None,
            litellm_model: DEFAULT_LITELLM_MODEL.to_string(),
            temperature: 1.0,
            python: PathBuf::from("python3"),
            syntax_timeout: DEFAULT_SYNTAX_TIMEOUT,
            max_attempts: Some(10),
            history_db: None,
        }
    }
}

impl ForgeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `FORGE_PROVIDER`: `gemini` or `litellm` (default: gemini)
    /// - `GEMINI_API_KEY`: Gemini API key (required for gemini)
    /// - `GEMINI_MODEL`: Gemini model (default: gemini-1.5-flash)
    /// - `LITELLM_API_BASE`: LiteLLM base URL (required for litellm)
    /// - `LITELLM_API_KEY`: LiteLLM API key (optional)
    /// - `LITELLM_DEFAULT_MODEL`: LiteLLM model (default: gemini/gemini-1.5-flash)
    /// - `FORGE_TEMPERATURE`: Sampling temperature (default: 1.0)
    /// - `FORGE_PYTHON`: Python interpreter (default: python3)
    /// - `FORGE_SYNTAX_TIMEOUT_SECS`: Syntax check timeout (default: 20)
    /// - `FORGE_MAX_ATTEMPTS`: Attempt cap, `0` for unbounded (default: 10)
    /// - `FORGE_HISTORY_DB`: SQLite path for chat history (optional)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable has an invalid value or the
    /// resulting configuration is inconsistent.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ForgeConfig::from_env`] with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        // Provider settings
        if let Some(val) = lookup("FORGE_PROVIDER") {
            config.provider = val.parse()?;
        }
        config.gemini_api_key = lookup("GEMINI_API_KEY").filter(|v| !v.trim().is_empty());
        if let Some(val) = lookup("GEMINI_MODEL") {
            config.gemini_model = val;
        }
        config.litellm_api_base = lookup("LITELLM_API_BASE").filter(|v| !v.trim().is_empty());
        config.litellm_api_key = lookup("LITELLM_API_KEY").filter(|v| !v.trim().is_empty());
        if let Some(val) = lookup("LITELLM_DEFAULT_MODEL") {
            config.litellm_model = val;
        }
        if let Some(val) = lookup("FORGE_TEMPERATURE") {
            config.temperature = parse_env_value(&val, "FORGE_TEMPERATURE")?;
        }

        // Validation settings
        if let Some(val) = lookup("FORGE_PYTHON") {
            config.python = PathBuf::from(val);
        }
        if let Some(val) = lookup("FORGE_SYNTAX_TIMEOUT_SECS") {
            let secs: u64 = parse_env_value(&val, "FORGE_SYNTAX_TIMEOUT_SECS")?;
            config.syntax_timeout = Duration::from_secs(secs);
        }

        // Retry settings
        if let Some(val) = lookup("FORGE_MAX_ATTEMPTS") {
            let max: u32 = parse_env_value(&val, "FORGE_MAX_ATTEMPTS")?;
            config.max_attempts = (max > 0).then_some(max);
        }

        // Storage settings
        if let Some(val) = lookup("FORGE_HISTORY_DB").filter(|v| !v.trim().is_empty()) {
            config.history_db = Some(PathBuf::from(val));
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// Credentials are checked when the provider is built, not here.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationFailed(
                "temperature must be between 0.0 and 2.0".to_string(),
            ));
        }

        if self.syntax_timeout.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "syntax_timeout must be greater than 0".to_string(),
            ));
        }

        if self.python.as_os_str().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "python interpreter cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    pub fn with_provider(mut self, provider: ProviderKind) -> Self {
        self.provider = provider;
        self
    }

    /// `0` means unbounded.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = (max_attempts > 0).then_some(max_attempts);
        self
    }

    pub fn with_history_db(mut self, path: impl Into<PathBuf>) -> Self {
        self.history_db = Some(path.into());
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        match self.max_attempts {
            Some(max) => RetryPolicy::default().with_max_attempts(max),
            None => RetryPolicy::unbounded(),
        }
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig::new()
            .with_temperature(self.temperature)
            .with_retry(self.retry_policy())
    }

    pub fn syntax_validator(&self) -> PythonSyntaxValidator {
        PythonSyntaxValidator::new(self.python.clone()).with_timeout(self.syntax_timeout)
    }

    /// Builds the configured model provider.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` when the provider's credential or
    /// endpoint is not configured.
    pub fn build_provider(&self) -> Result<Arc<dyn LlmProvider>, ConfigError> {
        match self.provider {
            ProviderKind::Gemini => {
                let key = self
                    .gemini_api_key
                    .clone()
                    .ok_or_else(|| ConfigError::MissingEnvVar("GEMINI_API_KEY".to_string()))?;
                let provider = GeminiProvider::with_model(key, self.gemini_model.clone())?;
                Ok(Arc::new(provider))
            }
            ProviderKind::LiteLlm => {
                let base = self
                    .litellm_api_base
                    .clone()
                    .ok_or_else(|| ConfigError::MissingEnvVar("LITELLM_API_BASE".to_string()))?;
                let client = LiteLlmClient::new(
                    base,
                    self.litellm_api_key.clone(),
                    self.litellm_model.clone(),
                )?;
                Ok(Arc::new(client))
            }
        }
    }
}

/// Parse an environment variable value.
fn parse_env_value<T: FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}
