//! Error types for the provider gateway.

use std::time::Duration;
use thiserror::Error;

/// Additional context from provider errors for debugging.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// HTTP status code from the provider.
    pub http_status: Option<u16>,
    /// Provider-specific error code (e.g. "rate_limit_exceeded").
    pub provider_code: Option<String>,
    /// Request ID from provider (x-request-id header).
    pub request_id: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.provider_code = Some(code.into());
        self
    }

    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }
}

/// Errors that can occur when calling the completion service.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The service returned 429 or a rate-limit error code.
    #[error("rate limited: {message}")]
    RateLimited {
        message: String,
        context: Option<ErrorContext>,
    },

    /// Request timed out before a response arrived.
    #[error("timeout after {0:?}")]
    Timeout(Duration, Option<ErrorContext>),

    /// Invalid request - permanent error.
    #[error("invalid request: {message}")]
    InvalidRequest {
        message: String,
        context: Option<ErrorContext>,
    },

    /// Any other provider-side failure.
    #[error("{provider} error: {message}")]
    Provider {
        provider: &'static str,
        message: String,
        context: Option<ErrorContext>,
    },

    /// Transient failures kept recurring until the attempt budget ran out.
    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<ProviderError>,
    },

    /// HTTP/network error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration error (missing API key, etc.).
    #[error("configuration error: {0}")]
    Config(String),
}

impl ProviderError {
    /// Create a rate limited error.
    pub fn rate_limited(message: impl Into<String>, context: Option<ErrorContext>) -> Self {
        Self::RateLimited {
            message: message.into(),
            context,
        }
    }

    /// Create an invalid request error.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
            context: None,
        }
    }

    /// Create a provider error.
    pub fn provider(provider: &'static str, message: impl Into<String>) -> Self {
        Self::Provider {
            provider,
            message: message.into(),
            context: None,
        }
    }

    /// Create a provider error with context.
    pub fn provider_with_context(
        provider: &'static str,
        message: impl Into<String>,
        context: ErrorContext,
    ) -> Self {
        Self::Provider {
            provider,
            message: message.into(),
            context: Some(context),
        }
    }

    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Map a transport error, classifying timeouts separately.
    pub fn from_transport(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            Self::Timeout(timeout, None)
        } else {
            Self::Http(err)
        }
    }

    /// Whether the retry loop should try again: rate limits and timeouts only.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RateLimited { .. } => true,
            Self::Timeout(_, _) => true,
            Self::Http(e) => e.is_timeout(),
            Self::InvalidRequest { .. } => false,
            Self::Provider { .. } => false,
            Self::RetriesExhausted { .. } => false,
            Self::Config(_) => false,
        }
    }

    /// Get a short error code for logging.
    pub fn code(&self) -> &'static str {
        match self {
            Self::RateLimited { .. } => "rate_limited",
            Self::Timeout(_, _) => "timeout",
            Self::InvalidRequest { .. } => "invalid_request",
            Self::Provider { .. } => "provider_error",
            Self::RetriesExhausted { .. } => "retries_exhausted",
            Self::Http(_) => "http_error",
            Self::Config(_) => "config_error",
        }
    }

    /// Get the error context if available.
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Self::RateLimited { context, .. } => context.as_ref(),
            Self::Timeout(_, context) => context.as_ref(),
            Self::InvalidRequest { context, .. } => context.as_ref(),
            Self::Provider { context, .. } => context.as_ref(),
            Self::RetriesExhausted { last, .. } => last.context(),
            Self::Http(_) => None,
            Self::Config(_) => None,
        }
    }

    /// Get the request ID if available.
    pub fn request_id(&self) -> Option<&str> {
        self.context().and_then(|c| c.request_id.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_rate_limits_and_timeouts_are_transient() {
        assert!(ProviderError::rate_limited("slow down", None).is_transient());
        assert!(ProviderError::Timeout(Duration::from_secs(3), None).is_transient());
        assert!(!ProviderError::provider("openai", "HTTP 500").is_transient());
        assert!(!ProviderError::invalid_request("bad").is_transient());
        assert!(!ProviderError::config("missing key").is_transient());
    }

    #[test]
    fn exhausted_error_exposes_last_context() {
        let ctx = ErrorContext::new().with_status(429).with_request_id("req-1");
        let err = ProviderError::RetriesExhausted {
            attempts: 5,
            last: Box::new(ProviderError::rate_limited("busy", Some(ctx))),
        };
        assert_eq!(err.code(), "retries_exhausted");
        assert_eq!(err.request_id(), Some("req-1"));
        assert!(!err.is_transient());
    }
}
