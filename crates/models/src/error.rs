//! Error taxonomy shared by the client, the streaming surface, and the
//! high-level generation helpers.
//!
//! Provider-originated errors carry an [`ErrorDetails`] payload with the
//! provider name, HTTP status, provider error code, and retry hints.
//! Classification methods are exhaustive (no wildcard arms) so adding a
//! variant forces a compile-time decision.

use serde::{Deserialize, Serialize};

/// The result type for all client operations.
pub type LlmResult<T> = Result<T, LlmError>;

/// Provider-level metadata attached to errors that originate from an LLM
/// provider response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetails {
    /// Name of the provider that produced the error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    /// HTTP status code, when the error came from an HTTP response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    /// Provider-specific error code (e.g. `"rate_limit_exceeded"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    /// Seconds to wait before retrying, from a `Retry-After` hint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<f64>,
    /// Whether a retry may succeed.
    #[serde(default)]
    pub retryable: bool,
    /// Raw provider error body, when available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<serde_json::Value>,
}

/// Errors produced by the LLM client stack.
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LlmError {
    // -- Provider errors (carry details) --
    /// Invalid or missing credentials (401).
    #[error("authentication failed: {message}")]
    Authentication {
        message: String,
        details: ErrorDetails,
    },

    /// Credentials valid but access refused (403).
    #[error("access denied: {message}")]
    AccessDenied {
        message: String,
        details: ErrorDetails,
    },

    /// Model or resource not found (404).
    #[error("not found: {message}")]
    NotFound {
        message: String,
        details: ErrorDetails,
    },

    /// Malformed or rejected request (400/422).
    #[error("invalid request: {message}")]
    InvalidRequest {
        message: String,
        details: ErrorDetails,
    },

    /// Rate limit exceeded (429). Retryable.
    #[error("rate limited: {message}")]
    RateLimit {
        message: String,
        details: ErrorDetails,
    },

    /// Provider-side server error (5xx). Retryable.
    #[error("server error: {message}")]
    Server {
        message: String,
        details: ErrorDetails,
    },

    /// The conversation exceeded the model's context window.
    #[error("context length exceeded: {message}")]
    ContextLength {
        message: String,
        details: ErrorDetails,
    },

    /// Account quota or billing limit exhausted.
    #[error("quota exceeded: {message}")]
    QuotaExceeded {
        message: String,
        details: ErrorDetails,
    },

    /// Output blocked by the provider's content filter.
    #[error("content filtered: {message}")]
    ContentFilter {
        message: String,
        details: ErrorDetails,
    },

    /// The request timed out (408). Retryable.
    #[error("request timeout: {message}")]
    RequestTimeout {
        message: String,
        details: ErrorDetails,
    },

    /// Unclassifiable provider error. Retryable by default.
    #[error("provider error: {message}")]
    Provider {
        message: String,
        details: ErrorDetails,
    },

    // -- Local errors (no provider details) --
    /// Cancelled by the caller.
    #[error("aborted: {message}")]
    Abort { message: String },

    /// Transport-level failure before a response was received. Retryable.
    #[error("network error: {message}")]
    Network { message: String },

    /// The event stream broke mid-response. Retryable.
    #[error("stream error: {message}")]
    Stream { message: String },

    /// The model produced a tool call that could not be interpreted.
    #[error("invalid tool call: {message}")]
    InvalidToolCall { message: String },

    /// `generate_object` could not produce a schema-conforming object.
    #[error("no object generated: {message}")]
    NoObjectGenerated { message: String },

    /// Client misconfiguration (unknown provider, missing default, etc.).
    #[error("configuration error: {message}")]
    Configuration { message: String },
}

/// Message-substring classification used when a status code alone cannot
/// determine the error kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClassification {
    Authentication,
    NotFound,
    ContextLength,
    ContentFilter,
}

impl LlmError {
    /// Whether a retry of the same request may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimit { .. }
            | Self::Server { .. }
            | Self::RequestTimeout { .. }
            | Self::Network { .. }
            | Self::Stream { .. } => true,

            Self::Provider { details, .. } => details.retryable,

            Self::Authentication { .. }
            | Self::AccessDenied { .. }
            | Self::NotFound { .. }
            | Self::InvalidRequest { .. }
            | Self::ContextLength { .. }
            | Self::QuotaExceeded { .. }
            | Self::ContentFilter { .. }
            | Self::Abort { .. }
            | Self::InvalidToolCall { .. }
            | Self::NoObjectGenerated { .. }
            | Self::Configuration { .. } => false,
        }
    }

    /// Provider details, for variants that carry them.
    #[must_use]
    pub fn details(&self) -> Option<&ErrorDetails> {
        match self {
            Self::Authentication { details, .. }
            | Self::AccessDenied { details, .. }
            | Self::NotFound { details, .. }
            | Self::InvalidRequest { details, .. }
            | Self::RateLimit { details, .. }
            | Self::Server { details, .. }
            | Self::ContextLength { details, .. }
            | Self::QuotaExceeded { details, .. }
            | Self::ContentFilter { details, .. }
            | Self::RequestTimeout { details, .. }
            | Self::Provider { details, .. } => Some(details),

            Self::Abort { .. }
            | Self::Network { .. }
            | Self::Stream { .. }
            | Self::InvalidToolCall { .. }
            | Self::NoObjectGenerated { .. }
            | Self::Configuration { .. } => None,
        }
    }

    /// HTTP status code, when known.
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        self.details().and_then(|d| d.status_code)
    }

    /// Retry-after hint in seconds, when the provider supplied one.
    #[must_use]
    pub fn retry_after(&self) -> Option<f64> {
        self.details().and_then(|d| d.retry_after)
    }

    /// A short stable code suitable for event payloads and logs.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Authentication { .. } => "AUTHENTICATION",
            Self::AccessDenied { .. } => "ACCESS_DENIED",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::InvalidRequest { .. } => "INVALID_REQUEST",
            Self::RateLimit { .. } => "RATE_LIMIT",
            Self::Server { .. } => "SERVER_ERROR",
            Self::ContextLength { .. } => "CONTEXT_LENGTH",
            Self::QuotaExceeded { .. } => "QUOTA_EXCEEDED",
            Self::ContentFilter { .. } => "CONTENT_FILTER",
            Self::RequestTimeout { .. } => "REQUEST_TIMEOUT",
            Self::Provider { .. } => "PROVIDER_ERROR",
            Self::Abort { .. } => "ABORT",
            Self::Network { .. } => "NETWORK",
            Self::Stream { .. } => "STREAM",
            Self::InvalidToolCall { .. } => "INVALID_TOOL_CALL",
            Self::NoObjectGenerated { .. } => "NO_OBJECT_GENERATED",
            Self::Configuration { .. } => "CONFIGURATION",
        }
    }

    /// Map an HTTP status code and message to the appropriate error kind.
    ///
    /// Explicit status cases follow the provider-error table; 400/422 with
    /// context-length phrasing become [`ContextLength`](Self::ContextLength).
    /// Unknown statuses fall back to message classification, and anything
    /// still unclassified becomes a retryable [`Provider`](Self::Provider)
    /// error.
    #[must_use]
    pub fn from_status(
        status: u16,
        message: &str,
        provider: Option<String>,
        error_code: Option<String>,
        retry_after: Option<f64>,
        raw: Option<serde_json::Value>,
    ) -> Self {
        let details = |retryable: bool| ErrorDetails {
            provider: provider.clone(),
            status_code: Some(status),
            error_code: error_code.clone(),
            retry_after,
            retryable,
            raw: raw.clone(),
        };
        let message = message.to_string();

        match status {
            400 | 422 => {
                if mentions_context_length(&message) {
                    Self::ContextLength {
                        message,
                        details: details(false),
                    }
                } else {
                    Self::InvalidRequest {
                        message,
                        details: details(false),
                    }
                }
            }
            401 => Self::Authentication {
                message,
                details: details(false),
            },
            403 => Self::AccessDenied {
                message,
                details: details(false),
            },
            404 => Self::NotFound {
                message,
                details: details(false),
            },
            408 => Self::RequestTimeout {
                message,
                details: details(true),
            },
            413 => Self::ContextLength {
                message,
                details: details(false),
            },
            429 => Self::RateLimit {
                message,
                details: details(true),
            },
            500..=599 => Self::Server {
                message,
                details: details(true),
            },
            _ => match Self::classify_from_message(&message) {
                Some(ErrorClassification::Authentication) => Self::Authentication {
                    message,
                    details: details(false),
                },
                Some(ErrorClassification::NotFound) => Self::NotFound {
                    message,
                    details: details(false),
                },
                Some(ErrorClassification::ContextLength) => Self::ContextLength {
                    message,
                    details: details(false),
                },
                Some(ErrorClassification::ContentFilter) => Self::ContentFilter {
                    message,
                    details: details(false),
                },
                None => Self::Provider {
                    message,
                    details: details(true),
                },
            },
        }
    }

    /// Classify an error from its message text alone.
    ///
    /// Used for providers that return errors without a status code, and as
    /// the fallback for unrecognized status codes.
    #[must_use]
    pub fn classify_from_message(message: &str) -> Option<ErrorClassification> {
        let lower = message.to_lowercase();
        if lower.contains("not found") || lower.contains("does not exist") {
            return Some(ErrorClassification::NotFound);
        }
        if lower.contains("unauthorized")
            || lower.contains("invalid key")
            || lower.contains("invalid api key")
        {
            return Some(ErrorClassification::Authentication);
        }
        if mentions_context_length(&lower) {
            return Some(ErrorClassification::ContextLength);
        }
        if lower.contains("content filter") || lower.contains("safety") {
            return Some(ErrorClassification::ContentFilter);
        }
        None
    }
}

/// Whether a message uses context-window-exhaustion phrasing.
fn mentions_context_length(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("context length")
        || lower.contains("too many tokens")
        || lower.contains("maximum context")
}
