//! Files and batches endpoints of the completion service.
//!
//! A batch is a newline-delimited JSON file of chat requests, each tagged with
//! a `custom_id`. The service runs it asynchronously and produces a result
//! file whose lines carry the same ids.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};

use super::error::ProviderError;
use super::openai::{
    ChatApiRequest, ChatApiResponse, OpenAiAdapter, MAX_FILE_CONTENT_LEN, PROVIDER,
};
use super::types::ChatRequest;

/// Endpoint every batch line targets.
pub const CHAT_COMPLETIONS_ENDPOINT: &str = "/v1/chat/completions";

/// Completion window requested for every batch.
pub const COMPLETION_WINDOW: &str = "24h";

// =============================================================================
// JOB TYPES
// =============================================================================

/// Lifecycle status reported by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Validating,
    InProgress,
    Finalizing,
    Completed,
    Failed,
    Expired,
    Cancelling,
    Cancelled,
    #[serde(other)]
    Unknown,
}

impl BatchStatus {
    /// Statuses after which the job never changes again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BatchStatus::Completed
                | BatchStatus::Failed
                | BatchStatus::Expired
                | BatchStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Validating => "validating",
            BatchStatus::InProgress => "in_progress",
            BatchStatus::Finalizing => "finalizing",
            BatchStatus::Completed => "completed",
            BatchStatus::Failed => "failed",
            BatchStatus::Expired => "expired",
            BatchStatus::Cancelling => "cancelling",
            BatchStatus::Cancelled => "cancelled",
            BatchStatus::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestCounts {
    #[serde(default)]
    pub total: u32,
    #[serde(default)]
    pub completed: u32,
    #[serde(default)]
    pub failed: u32,
}

/// Snapshot of a batch job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchJob {
    pub id: String,
    pub status: BatchStatus,
    #[serde(default)]
    pub output_file_id: Option<String>,
    #[serde(default)]
    pub request_counts: Option<RequestCounts>,
}

// =============================================================================
// TRAIT
// =============================================================================

/// Bulk submission surface of the completion service.
#[async_trait]
pub trait BatchProvider: Send + Sync {
    /// Upload a JSONL job file; returns the file id.
    async fn upload_batch_file(
        &self,
        file_name: &str,
        contents: Vec<u8>,
    ) -> Result<String, ProviderError>;

    /// Create a batch job over an uploaded file.
    async fn create_batch(&self, input_file_id: &str) -> Result<BatchJob, ProviderError>;

    /// Fetch the current state of a batch job.
    async fn retrieve_batch(&self, batch_id: &str) -> Result<BatchJob, ProviderError>;

    /// Download a file's contents as text.
    async fn file_content(&self, file_id: &str) -> Result<String, ProviderError>;
}

// =============================================================================
// LINE CODECS
// =============================================================================

#[derive(Serialize)]
struct BatchRequestLine<'a> {
    custom_id: &'a str,
    method: &'static str,
    url: &'static str,
    body: ChatApiRequest<'a>,
}

/// Serialize one chat request as a batch input line (no trailing newline).
pub fn encode_batch_line(custom_id: &str, req: &ChatRequest) -> Result<String, serde_json::Error> {
    serde_json::to_string(&BatchRequestLine {
        custom_id,
        method: "POST",
        url: CHAT_COMPLETIONS_ENDPOINT,
        body: ChatApiRequest::from_request(req),
    })
}

#[derive(Deserialize)]
struct BatchResultLine {
    custom_id: String,
    response: Option<BatchResultResponse>,
    error: Option<BatchLineError>,
}

#[derive(Deserialize)]
struct BatchResultResponse {
    #[serde(default)]
    status_code: Option<u16>,
    body: ChatApiResponse,
}

#[derive(Deserialize)]
struct BatchLineError {
    code: Option<String>,
    message: Option<String>,
}

/// One parsed line of a batch result file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchCompletion {
    pub custom_id: String,
    pub content: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Parse one batch output line.
pub fn decode_batch_line(line: &str) -> Result<BatchCompletion, ProviderError> {
    let parsed: BatchResultLine = serde_json::from_str(line)
        .map_err(|e| ProviderError::provider(PROVIDER, format!("Invalid batch line: {e}")))?;

    if let Some(err) = parsed.error {
        return Err(ProviderError::provider(
            PROVIDER,
            format!(
                "{}: {} ({})",
                parsed.custom_id,
                err.message.unwrap_or_default(),
                err.code.unwrap_or_default()
            ),
        ));
    }

    let response = parsed.response.ok_or_else(|| {
        ProviderError::provider(PROVIDER, format!("{}: missing response", parsed.custom_id))
    })?;
    if let Some(code) = response.status_code.filter(|c| *c >= 400) {
        return Err(ProviderError::provider(
            PROVIDER,
            format!("{}: HTTP {code}", parsed.custom_id),
        ));
    }

    let completion = response.body.into_completion()?;
    Ok(BatchCompletion {
        custom_id: parsed.custom_id,
        content: completion.content,
        input_tokens: completion.input_tokens,
        output_tokens: completion.output_tokens,
    })
}

// =============================================================================
// HTTP IMPL
// =============================================================================

#[derive(Deserialize)]
struct FileObject {
    id: String,
}

#[derive(Serialize)]
struct CreateBatchRequest<'a> {
    input_file_id: &'a str,
    endpoint: &'static str,
    completion_window: &'static str,
}

/// File and batch objects are small metadata documents.
const MAX_JOB_RESPONSE_LEN: usize = 1_024 * 1_024;

impl OpenAiAdapter {
    async fn send_and_read(
        &self,
        builder: reqwest::RequestBuilder,
        limit: usize,
    ) -> Result<String, ProviderError> {
        let response = builder
            .send()
            .await
            .map_err(|e| ProviderError::from_transport(e, self.timeout))?;
        let status = response.status();
        let request_id = Self::extract_request_id(response.headers());
        let body = Self::read_body(response, self.timeout, limit).await?;
        if !status.is_success() {
            return Err(Self::error_from_status(status.as_u16(), &body, request_id));
        }
        Ok(body)
    }

    fn parse_json<T: for<'de> Deserialize<'de>>(body: &str) -> Result<T, ProviderError> {
        serde_json::from_str(body)
            .map_err(|e| ProviderError::provider(PROVIDER, format!("Invalid JSON: {e}")))
    }
}

#[async_trait]
impl BatchProvider for OpenAiAdapter {
    async fn upload_batch_file(
        &self,
        file_name: &str,
        contents: Vec<u8>,
    ) -> Result<String, ProviderError> {
        let part = Part::bytes(contents)
            .file_name(file_name.to_string())
            .mime_str("application/jsonl")
            .map_err(|e| ProviderError::invalid_request(e.to_string()))?;
        let form = Form::new().text("purpose", "batch").part("file", part);

        let body = self
            .send_and_read(
                self.client.post(self.url("files")).multipart(form),
                MAX_JOB_RESPONSE_LEN,
            )
            .await?;
        let file: FileObject = Self::parse_json(&body)?;
        Ok(file.id)
    }

    async fn create_batch(&self, input_file_id: &str) -> Result<BatchJob, ProviderError> {
        let body = self
            .send_and_read(
                self.client
                    .post(self.url("batches"))
                    .header(CONTENT_TYPE, "application/json")
                    .json(&CreateBatchRequest {
                        input_file_id,
                        endpoint: CHAT_COMPLETIONS_ENDPOINT,
                        completion_window: COMPLETION_WINDOW,
                    }),
                MAX_JOB_RESPONSE_LEN,
            )
            .await?;
        Self::parse_json(&body)
    }

    async fn retrieve_batch(&self, batch_id: &str) -> Result<BatchJob, ProviderError> {
        let body = self
            .send_and_read(
                self.client.get(self.url(&format!("batches/{batch_id}"))),
                MAX_JOB_RESPONSE_LEN,
            )
            .await?;
        Self::parse_json(&body)
    }

    async fn file_content(&self, file_id: &str) -> Result<String, ProviderError> {
        self.send_and_read(
            self.client.get(self.url(&format!("files/{file_id}/content"))),
            MAX_FILE_CONTENT_LEN,
        )
        .await
    }
}
