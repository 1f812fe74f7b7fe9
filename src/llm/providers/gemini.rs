//! Google Gemini provider.
//!
//! Talks to the `generateContent` REST endpoint directly. Conversation roles are
//! mapped onto Gemini's `user`/`model` pair; system messages become the
//! request's `systemInstruction`.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;
use crate::llm::litellm::build_http_client;
use crate::llm::{Choice, GenerationRequest, GenerationResponse, LlmProvider, Message, Usage};

/// Default Gemini API endpoint.
const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default model to use if none specified.
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";

/// Gemini provider for LLM requests.
pub struct GeminiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    default_model: String,
}

impl std::fmt::Debug for GeminiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiProvider")
            .field("base_url", &self.base_url)
            .field("default_model", &self.default_model)
            .field("api_key", &self.api_key_masked())
            .finish_non_exhaustive()
    }
}

impl GeminiProvider {
    /// Create a provider using the default model and endpoint.
    pub fn new(api_key: impl Into<String>) -> Result<Self, LlmError> {
        Self::with_custom_url(api_key, GEMINI_BASE_URL, DEFAULT_GEMINI_MODEL)
    }

    /// Create a provider with a specific default model.
    pub fn with_model(
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, LlmError> {
        Self::with_custom_url(api_key, GEMINI_BASE_URL, model)
    }

    /// Create a provider with a custom base URL, e.g. a regional endpoint or proxy.
    pub fn with_custom_url(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, LlmError> {
        Ok(Self {
            client: build_http_client()?,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            default_model: model.into(),
        })
    }

    /// Get the API key (masked for logging).
    pub fn api_key_masked(&self) -> String {
        if self.api_key.len() <= 8 {
            "*".repeat(self.api_key.len())
        } else {
            format!(
                "{}...{}",
                &self.api_key[..4],
                &self.api_key[self.api_key.len() - 4..]
            )
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }
}

/// Converts provider-neutral messages into Gemini `contents` plus an optional
/// system instruction.
fn to_gemini_contents(messages: Vec<Message>) -> (Vec<Content>, Option<Content>) {
    let mut system_parts = Vec::new();
    let mut contents = Vec::with_capacity(messages.len());

    for message in messages {
        match message.role.as_str() {
            "system" => system_parts.push(Part {
                text: message.content,
            }),
            "assistant" | "model" => contents.push(Content {
                role: Some("model".to_string()),
                parts: vec![Part {
                    text: message.content,
                }],
            }),
            _ => contents.push(Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: message.content,
                }],
            }),
        }
    }

    let system_instruction = if system_parts.is_empty() {
        None
    } else {
        Some(Content {
            role: None,
            parts: system_parts,
        })
    };

    (contents, system_instruction)
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, LlmError> {
        let model = if request.model.is_empty() {
            self.default_model.clone()
        } else {
            request.model.clone()
        };

        let (contents, system_instruction) = to_gemini_contents(request.messages);
        let api_request = ApiRequest {
            contents,
            system_instruction,
            generation_config: GenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_tokens,
            },
        };

        let url = format!("{}/models/{}:generateContent", self.base_url, model);

        let http_response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("x-goog-api-key", &self.api_key)
            .json(&api_request)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        let status = http_response.status();

        if !status.is_success() {
            let status_code = status.as_u16();
            let error_text = http_response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());

            let message = serde_json::from_str::<ApiErrorResponse>(&error_text)
                .map(|e| e.error.message)
                .unwrap_or(error_text);

            if status_code == 429 {
                return Err(LlmError::RateLimited(message));
            }
            return Err(LlmError::ApiError {
                code: status_code,
                message,
            });
        }

        let api_response: ApiResponse = http_response
            .json()
            .await
            .map_err(|e| LlmError::ParseError(format!("Failed to parse API response: {}", e)))?;

        into_generation_response(api_response, model)
    }
}

fn into_generation_response(
    api_response: ApiResponse,
    model: String,
) -> Result<GenerationResponse, LlmError> {
    if api_response.candidates.is_empty() {
        let reason = api_response
            .prompt_feedback
            .and_then(|f| f.block_reason)
            .unwrap_or_else(|| "no candidates returned".to_string());
        return Err(LlmError::Blocked(reason));
    }

    let choices = api_response
        .candidates
        .into_iter()
        .enumerate()
        .map(|(i, candidate)| {
            let text = candidate
                .content
                .map(|c| {
                    c.parts
                        .into_iter()
                        .map(|p| p.text)
                        .collect::<Vec<_>>()
                        .join("")
                })
                .unwrap_or_default();
            Choice {
                index: candidate.index.unwrap_or(i as u32),
                message: Message::assistant(text),
                finish_reason: candidate
                    .finish_reason
                    .map(|r| r.to_lowercase())
                    .unwrap_or_else(|| "stop".to_string()),
            }
        })
        .collect();

    let usage = api_response
        .usage_metadata
        .map(|u| Usage {
            prompt_tokens: u.prompt_token_count,
            completion_tokens: u.candidates_token_count,
            total_tokens: u.total_token_count,
        })
        .unwrap_or_default();

    Ok(GenerationResponse {
        id: api_response.response_id.unwrap_or_default(),
        model: api_response.model_version.unwrap_or(model),
        choices,
        usage,
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
    usage_metadata: Option<UsageMetadata>,
    model_version: Option<String>,
    response_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
    index: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gemini_provider_new() {
        let provider = GeminiProvider::new("test-api-key").expect("provider should build");

        assert_eq!(provider.base_url(), GEMINI_BASE_URL);
        assert_eq!(provider.default_model(), DEFAULT_GEMINI_MODEL);
        assert_eq!(provider.api_key_masked(), "test...-key");
    }

    #[test]
    fn test_gemini_provider_with_custom_url() {
        let provider =
            GeminiProvider::with_custom_url("abc", "http://localhost:8080/v1beta/", "gemini-pro")
                .expect("provider should build");

        assert_eq!(provider.base_url(), "http://localhost:8080/v1beta");
        assert_eq!(provider.default_model(), "gemini-pro");
        assert_eq!(provider.api_key_masked(), "***");
    }

    #[test]
    fn test_role_mapping() {
        let (contents, system) = to_gemini_contents(vec![
            Message::system("be terse"),
            Message::user("prompt one"),
            Message::assistant("reply one"),
            Message::user("prompt two"),
        ]);

        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0].role.as_deref(), Some("user"));
        assert_eq!(contents[1].role.as_deref(), Some("model"));
        assert_eq!(contents[1].parts[0].text, "reply one");
        let system = system.expect("system instruction present");
        assert!(system.role.is_none());
        assert_eq!(system.parts[0].text, "be terse");
    }

    #[test]
    fn test_request_serialization_uses_camel_case() {
        let request = ApiRequest {
            contents: vec![],
            system_instruction: None,
            generation_config: GenerationConfig {
                temperature: Some(1.0),
                max_output_tokens: Some(2048),
            },
        };
        let json = serde_json::to_string(&request).expect("serialization should succeed");
        assert!(json.contains("\"generationConfig\""));
        assert!(json.contains("\"maxOutputTokens\":2048"));
        assert!(!json.contains("systemInstruction"));
    }

    #[test]
    fn test_response_conversion_joins_parts() {
        let body = r#"{
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "{\"Code\": "}, {"text": "[]}"}]},
                "finishReason": "STOP",
                "index": 0
            }],
            "usageMetadata": {"promptTokenCount": 12, "candidatesTokenCount": 8, "totalTokenCount": 20},
            "modelVersion": "gemini-1.5-flash-002"
        }"#;
        let api_response: ApiResponse = serde_json::from_str(body).expect("should parse");
        let response = into_generation_response(api_response, "gemini-1.5-flash".to_string())
            .expect("should convert");

        assert_eq!(response.first_content(), Some("{\"Code\": []}"));
        assert_eq!(response.model, "gemini-1.5-flash-002");
        assert_eq!(response.choices[0].finish_reason, "stop");
        assert_eq!(response.usage.total_tokens, 20);
    }

    #[test]
    fn test_blocked_response() {
        let body = r#"{"promptFeedback": {"blockReason": "SAFETY"}}"#;
        let api_response: ApiResponse = serde_json::from_str(body).expect("should parse");
        let err = into_generation_response(api_response, "m".to_string())
            .expect_err("blocked prompt has no candidates");
        assert!(matches!(err, LlmError::Blocked(ref r) if r == "SAFETY"));
    }
}
