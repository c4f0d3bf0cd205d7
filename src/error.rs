use std::time::Duration;
use thiserror::Error;

/// Errors produced by the pipeline and its components.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Low-level HTTP transport failure (connection refused, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// JSON parsing failed at the serde level.
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// A pipeline stage failed with a descriptive message.
    #[error("Stage '{stage}' failed: {message}")]
    StageFailed { stage: String, message: String },

    /// The pipeline or payload was cancelled via the cancellation flag.
    #[error("Pipeline was cancelled")]
    Cancelled,

    /// Invalid configuration detected at build time.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// HTTP error with status code, response body, and optional Retry-After hint.
    ///
    /// Returned by [`Backend`](crate::backend::Backend) implementations when
    /// the provider returns a non-success status code. The `retry_after` field
    /// is populated from the `Retry-After` response header when present.
    #[error("HTTP {status}: {body}")]
    HttpError {
        /// HTTP status code (e.g. 429, 500, 503).
        status: u16,
        /// Response body text.
        body: String,
        /// Parsed `Retry-After` header value, if present.
        retry_after: Option<Duration>,
    },

    /// Catch-all for other errors.
    #[error("{0}")]
    Other(String),

    /// The incoming request failed validation before any I/O was attempted.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// An upstream dependency (RPC node, explorer, price service, ...) failed
    /// or returned something the caller could not use.
    #[error("upstream '{source}' failed: {detail}")]
    Upstream { source: String, detail: String },

    /// Data received from an upstream could not be decoded into the shape a
    /// tool expected (malformed ABI payload, truncated log data, ...).
    #[error("decode failed: {0}")]
    Decode(String),

    /// A stage or the overall request exceeded its deadline.
    #[error("operation timed out")]
    Timeout,

    /// An LLM-backed stage exhausted its retries without producing output
    /// that satisfied schema validation.
    #[error("LLM call failed: {0}")]
    LlmFailure(String),

    /// A structural invariant the pipeline is supposed to guarantee was
    /// violated (duplicate baggage writer, cyclic dependency graph, ...).
    #[error("internal invariant violated: {0}")]
    Invariant(String),
}

impl PipelineError {
    /// Sanitized category label safe to surface to a caller, independent of
    /// the detailed message (which may carry upstream response bodies).
    pub fn category(&self) -> &'static str {
        match self {
            PipelineError::InvalidRequest(_) => "invalid_request",
            PipelineError::Upstream { .. } => "upstream_unavailable",
            PipelineError::Decode(_) => "decode_error",
            PipelineError::Timeout => "timeout",
            PipelineError::Cancelled => "cancelled",
            PipelineError::LlmFailure(_) => "llm_failure",
            PipelineError::Invariant(_) => "internal_error",
            PipelineError::Request(_) => "upstream_unavailable",
            PipelineError::HttpError { .. } => "upstream_unavailable",
            PipelineError::Json(_) => "decode_error",
            PipelineError::StageFailed { .. } => "internal_error",
            PipelineError::InvalidConfig(_) => "invalid_request",
            PipelineError::Other(_) => "internal_error",
        }
    }
}

impl From<anyhow::Error> for PipelineError {
    fn from(err: anyhow::Error) -> Self {
        PipelineError::Other(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
