//! OpenAI-compatible adapter for chat completions and embeddings.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use super::error::{ErrorContext, ProviderError};
use super::pricing::PriceTable;
use super::types::*;

// =============================================================================
// TRAITS
// =============================================================================

/// Trait for chat completion providers.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError>;
}

/// Trait for embedding providers.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, req: &EmbedRequest) -> Result<EmbedResponse, ProviderError>;
}

// =============================================================================
// OPENAI ADAPTER
// =============================================================================

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Maximum allowed chat response body (1MB).
const MAX_RESPONSE_LEN: usize = 1_024 * 1_024;

/// Maximum allowed embeddings response body (64MB). A 1536-dim vector is
/// 20-30KB of JSON.
const MAX_EMBED_RESPONSE_LEN: usize = 64 * 1_024 * 1_024;

/// Maximum allowed downloaded file body (512MB).
pub(super) const MAX_FILE_CONTENT_LEN: usize = 512 * 1_024 * 1_024;

/// Maximum allowed input characters (~125k tokens).
const MAX_INPUT_CHARS: usize = 500_000;

pub(super) const PROVIDER: &str = "openai";

/// OpenAI API adapter.
#[derive(Debug, Clone)]
pub struct OpenAiAdapter {
    pub(super) client: reqwest::Client,
    pub(super) base_url: String,
    pub(super) timeout: Duration,
    prices: PriceTable,
}

impl OpenAiAdapter {
    /// Create from API key against the public endpoint.
    pub fn new(api_key: impl Into<String>) -> Result<Self, ProviderError> {
        Self::with_config(
            api_key,
            DEFAULT_BASE_URL,
            Duration::from_secs(120),
            PriceTable::openai_sync(),
        )
    }

    /// Create with custom configuration.
    pub fn with_config(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
        prices: PriceTable,
    ) -> Result<Self, ProviderError> {
        let api_key = api_key.into();
        let base_url = base_url.into().trim_end_matches('/').to_string();

        let mut headers = HeaderMap::new();
        let auth_value = HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|_| ProviderError::config("Invalid API key format"))?;
        headers.insert(AUTHORIZATION, auth_value);

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .gzip(true)
            .build()
            .map_err(|e| ProviderError::config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            timeout,
            prices,
        })
    }

    pub(super) fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Extract request ID from response headers.
    pub(super) fn extract_request_id(headers: &HeaderMap) -> Option<String> {
        headers
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
    }

    /// Read a response body while enforcing `limit` bytes.
    pub(super) async fn read_body(
        mut response: reqwest::Response,
        timeout: Duration,
        limit: usize,
    ) -> Result<String, ProviderError> {
        let mut bytes = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| ProviderError::from_transport(e, timeout))?
        {
            let new_len = bytes.len() + chunk.len();
            if new_len > limit {
                return Err(ProviderError::provider(
                    PROVIDER,
                    format!("Response too large: {new_len} bytes"),
                ));
            }
            bytes.extend_from_slice(&chunk);
        }
        Ok(String::from_utf8_lossy(&bytes).to_string())
    }

    /// Turn a non-success HTTP response into a classified error.
    pub(super) fn error_from_status(
        status: u16,
        body: &str,
        request_id: Option<String>,
    ) -> ProviderError {
        let ctx = ErrorContext::new().with_status(status);
        let ctx = match request_id {
            Some(id) => ctx.with_request_id(id),
            None => ctx,
        };

        let parsed = serde_json::from_str::<ErrorEnvelope>(body)
            .ok()
            .and_then(|e| e.error);
        let (message, code) = match parsed {
            Some(err) => (
                err.message.unwrap_or_else(|| format!("HTTP {status}")),
                err.code.or(err.error_type),
            ),
            None => (format!("HTTP {status}"), None),
        };
        let rate_limit_code = code
            .as_deref()
            .map(|c| c.contains("rate_limit"))
            .unwrap_or(false);
        let ctx = match code {
            Some(code) => ctx.with_code(code),
            None => ctx,
        };

        if status == 429 || rate_limit_code {
            ProviderError::rate_limited(message, Some(ctx))
        } else if status == 408 {
            ProviderError::Timeout(Duration::ZERO, Some(ctx))
        } else {
            ProviderError::provider_with_context(PROVIDER, message, ctx)
        }
    }
}

// =============================================================================
// API TYPES
// =============================================================================

#[derive(Serialize)]
pub(super) struct ChatApiRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<ApiMessage<'a>>,
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl<'a> ChatApiRequest<'a> {
    pub(super) fn from_request(req: &'a ChatRequest) -> Self {
        Self {
            model: &req.model,
            messages: req.messages.iter().map(ApiMessage::from).collect(),
            temperature: req.temperature,
            max_tokens: req.max_tokens,
        }
    }
}

#[derive(Serialize)]
pub(super) struct ApiMessage<'a> {
    role: &'static str,
    content: &'a str,
}

impl<'a> From<&'a Message> for ApiMessage<'a> {
    fn from(m: &'a Message) -> Self {
        Self {
            role: match m.role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
            },
            content: &m.content,
        }
    }
}

#[derive(Deserialize)]
pub(super) struct ChatApiResponse {
    pub choices: Option<Vec<Choice>>,
    pub usage: Option<Usage>,
    pub error: Option<ApiError>,
}

#[derive(Deserialize)]
pub(super) struct Choice {
    pub message: Option<ChoiceMessage>,
    pub finish_reason: Option<String>,
}

#[derive(Deserialize)]
pub(super) struct ChoiceMessage {
    pub content: Option<String>,
}

#[derive(Deserialize)]
pub(super) struct Usage {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
}

#[derive(Deserialize)]
pub(super) struct ApiError {
    pub message: Option<String>,
    pub code: Option<String>,
    #[serde(rename = "type")]
    pub error_type: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: Option<ApiError>,
}

#[derive(Serialize)]
struct EmbedApiRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedApiResponse {
    data: Vec<EmbedDatum>,
    usage: Option<EmbedUsage>,
}

#[derive(Deserialize)]
struct EmbedDatum {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Deserialize)]
struct EmbedUsage {
    prompt_tokens: Option<u32>,
}

/// Content, token counts and finish reason pulled out of a completion body.
pub(super) struct ParsedCompletion {
    pub content: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub finish_reason: FinishReason,
}

impl ChatApiResponse {
    /// Extract the first choice and usage, shared by sync and batch parsing.
    pub(super) fn into_completion(self) -> Result<ParsedCompletion, ProviderError> {
        if let Some(error) = self.error {
            return Err(ProviderError::provider(
                PROVIDER,
                error.message.unwrap_or_default(),
            ));
        }

        let choice = self
            .choices
            .and_then(|c| c.into_iter().next())
            .ok_or_else(|| ProviderError::provider(PROVIDER, "No choices in response"))?;

        let mut content = choice
            .message
            .and_then(|m| m.content)
            .unwrap_or_default();
        if content.len() > MAX_RESPONSE_LEN {
            content.truncate(MAX_RESPONSE_LEN);
        }

        let usage = self
            .usage
            .ok_or_else(|| ProviderError::provider(PROVIDER, "Missing usage in response"))?;

        Ok(ParsedCompletion {
            content,
            input_tokens: usage.prompt_tokens.unwrap_or(0),
            output_tokens: usage.completion_tokens.unwrap_or(0),
            finish_reason: FinishReason::from(choice.finish_reason),
        })
    }
}

// =============================================================================
// PROVIDER IMPLS
// =============================================================================

#[async_trait]
impl ChatProvider for OpenAiAdapter {
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let total_chars: usize = req.messages.iter().map(|m| m.content.len()).sum();
        if total_chars > MAX_INPUT_CHARS {
            return Err(ProviderError::invalid_request(format!(
                "Input too large: {total_chars} chars (max {MAX_INPUT_CHARS})"
            )));
        }

        let start = Instant::now();
        let timeout = req.timeout.unwrap_or(self.timeout);

        let response = self
            .client
            .post(self.url("chat/completions"))
            .header(CONTENT_TYPE, "application/json")
            .timeout(timeout)
            .json(&ChatApiRequest::from_request(req))
            .send()
            .await
            .map_err(|e| ProviderError::from_transport(e, timeout))?;

        let status = response.status();
        let request_id = Self::extract_request_id(response.headers());
        let body = Self::read_body(response, timeout, MAX_RESPONSE_LEN).await?;

        if !status.is_success() {
            return Err(Self::error_from_status(status.as_u16(), &body, request_id));
        }

        let parsed: ChatApiResponse = serde_json::from_str(&body)
            .map_err(|e| ProviderError::provider(PROVIDER, format!("Invalid JSON: {e}")))?;
        let completion = parsed.into_completion()?;

        let cost = self.prices.cost(
            &req.model,
            completion.input_tokens,
            completion.output_tokens,
        );

        Ok(ChatResponse {
            content: completion.content,
            input_tokens: completion.input_tokens,
            output_tokens: completion.output_tokens,
            cost_nanodollars: cost,
            latency: start.elapsed(),
            finish_reason: completion.finish_reason,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiAdapter {
    async fn embed(&self, req: &EmbedRequest) -> Result<EmbedResponse, ProviderError> {
        if req.texts.is_empty() {
            return Ok(EmbedResponse {
                embeddings: Vec::new(),
                tokens: 0,
                cost_nanodollars: 0,
                latency: Duration::ZERO,
            });
        }

        let start = Instant::now();
        let response = self
            .client
            .post(self.url("embeddings"))
            .header(CONTENT_TYPE, "application/json")
            .json(&EmbedApiRequest {
                model: &req.model,
                input: &req.texts,
            })
            .send()
            .await
            .map_err(|e| ProviderError::from_transport(e, self.timeout))?;

        let status = response.status();
        let request_id = Self::extract_request_id(response.headers());
        let body = Self::read_body(response, self.timeout, MAX_EMBED_RESPONSE_LEN).await?;

        if !status.is_success() {
            return Err(Self::error_from_status(status.as_u16(), &body, request_id));
        }

        let mut parsed: EmbedApiResponse = serde_json::from_str(&body)
            .map_err(|e| ProviderError::provider(PROVIDER, format!("Invalid JSON: {e}")))?;

        if parsed.data.len() != req.texts.len() {
            return Err(ProviderError::provider(
                PROVIDER,
                format!(
                    "Expected {} embeddings, got {}",
                    req.texts.len(),
                    parsed.data.len()
                ),
            ));
        }
        parsed.data.sort_by_key(|d| d.index);

        let tokens = parsed
            .usage
            .and_then(|u| u.prompt_tokens)
            .unwrap_or(0);

        Ok(EmbedResponse {
            embeddings: parsed.data.into_iter().map(|d| d.embedding).collect(),
            tokens,
            cost_nanodollars: self.prices.cost(&req.model, tokens, 0),
            latency: start.elapsed(),
        })
    }
}
