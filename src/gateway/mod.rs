//! Provider gateway for an OpenAI-compatible completion service.

pub mod batch;
pub mod error;
pub mod openai;
pub mod pricing;
pub mod types;
pub mod usage;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;

use usage::{CallStatus, ProviderCallRecord, UsageSink as UsageSinkTrait};

pub use batch::{BatchCompletion, BatchJob, BatchProvider, BatchStatus, RequestCounts};
pub use error::{ErrorContext, ProviderError};
pub use openai::{ChatProvider, EmbeddingProvider, OpenAiAdapter};
pub use pricing::*;
pub use types::*;
pub use usage::{NoopUsageSink, TracingUsageSink, UsageSink};

#[async_trait::async_trait]
pub trait ChatGateway: Send + Sync {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, ProviderError>;
}

#[async_trait::async_trait]
impl<G: ChatGateway + ?Sized> ChatGateway for Arc<G> {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, ProviderError> {
        (**self).chat(req).await
    }
}

// =============================================================================
// RETRY
// =============================================================================

/// Bounded retry with linearly growing backoff.
///
/// After the k-th transient failure the loop waits `backoff_step * k` before
/// attempt k + 1. At most `max_attempts` calls are made.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_step: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_step: Duration::from_secs(7),
        }
    }
}

impl RetryPolicy {
    /// Wait before the retry that follows failure number `failures` (1-based).
    pub fn backoff_delay(&self, failures: u32) -> Duration {
        self.backoff_step * failures
    }
}

/// Result of a bounded retry loop.
#[derive(Debug)]
pub enum RetryOutcome<T> {
    Success { value: T, attempts: u32 },
    /// Every attempt failed transiently.
    Exhausted { attempts: u32, last_error: ProviderError },
    /// A non-transient error ended the loop.
    Fatal { attempts: u32, error: ProviderError },
}

impl<T> RetryOutcome<T> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryOutcome::Success { attempts, .. }
            | RetryOutcome::Exhausted { attempts, .. }
            | RetryOutcome::Fatal { attempts, .. } => *attempts,
        }
    }

    pub fn into_result(self) -> Result<T, ProviderError> {
        match self {
            RetryOutcome::Success { value, .. } => Ok(value),
            RetryOutcome::Exhausted {
                attempts,
                last_error,
            } => Err(ProviderError::RetriesExhausted {
                attempts,
                last: Box::new(last_error),
            }),
            RetryOutcome::Fatal { error, .. } => Err(error),
        }
    }
}

/// Run `op` until it succeeds, fails fatally, or the attempt budget runs out.
///
/// `op` receives the 1-based attempt number. Errors are classified with
/// [`ProviderError::is_transient`].
pub async fn retry_with_backoff<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> RetryOutcome<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match op(attempt).await {
            Ok(value) => {
                return RetryOutcome::Success {
                    value,
                    attempts: attempt,
                }
            }
            Err(error) if !error.is_transient() => {
                return RetryOutcome::Fatal {
                    attempts: attempt,
                    error,
                }
            }
            Err(error) if attempt >= max_attempts => {
                return RetryOutcome::Exhausted {
                    attempts: attempt,
                    last_error: error,
                }
            }
            Err(error) => {
                let delay = policy.backoff_delay(attempt);
                tracing::warn!(
                    code = error.code(),
                    attempt,
                    max_attempts,
                    wait_secs = delay.as_secs_f64(),
                    "transient provider error, backing off: {error}"
                );
                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

// =============================================================================
// GATEWAY
// =============================================================================

pub struct ProviderGateway<P: ChatProvider, U: UsageSinkTrait> {
    provider: P,
    usage_sink: Arc<U>,
    policy: RetryPolicy,
}

#[async_trait::async_trait]
impl<P: ChatProvider, U: UsageSinkTrait> ChatGateway for ProviderGateway<P, U> {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, ProviderError> {
        self.chat_with_retry(&req).await.into_result()
    }
}

impl<P: ChatProvider, U: UsageSinkTrait> ProviderGateway<P, U> {
    pub fn new(provider: P, usage_sink: Arc<U>) -> Self {
        Self::with_policy(provider, usage_sink, RetryPolicy::default())
    }

    pub fn with_policy(provider: P, usage_sink: Arc<U>, policy: RetryPolicy) -> Self {
        Self {
            provider,
            usage_sink,
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Call the provider under the retry policy, recording every attempt.
    pub async fn chat_with_retry(&self, req: &ChatRequest) -> RetryOutcome<ChatResponse> {
        retry_with_backoff(&self.policy, |attempt| async move {
            match self.provider.chat(req).await {
                Ok(resp) => {
                    self.record_usage(req, &resp, attempt, CallStatus::Success, None)
                        .await;
                    Ok(resp)
                }
                Err(err) => {
                    let code = err.code().to_string();
                    self.record_usage(
                        req,
                        &ChatResponse::empty(),
                        attempt,
                        CallStatus::Error,
                        Some(code),
                    )
                    .await;
                    Err(err)
                }
            }
        })
        .await
    }

    async fn record_usage(
        &self,
        req: &ChatRequest,
        resp: &ChatResponse,
        attempt: u32,
        status: CallStatus,
        error_code: Option<String>,
    ) {
        let record = ProviderCallRecord::new("chat/completions", &req.model, req.attribution.caller)
            .attempt(attempt)
            .tokens(resp.input_tokens, resp.output_tokens)
            .cost(resp.cost_nanodollars)
            .run(req.attribution.run_id)
            .latency(resp.latency.as_millis() as u64);

        let record = if status == CallStatus::Error {
            record.error(error_code.unwrap_or_else(|| "provider_error".to_string()))
        } else {
            record
        };

        self.usage_sink.record(record).await;
    }
}
