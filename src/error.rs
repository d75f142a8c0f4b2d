//! Error taxonomy for the question-answering pipeline.
//!
//! Every fallible library operation returns [`Result`]. Each variant maps to
//! a stable machine-readable [`code`](Error::code) used in HTTP error bodies,
//! so callers can tell a missing index apart from a rate-limited model.

use std::fmt;

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while loading, indexing, retrieving, or answering.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid or missing configuration (fatal at startup).
    #[error("configuration error: {0}")]
    Config(String),

    /// The document directory could not be read.
    #[error("document source error: {0}")]
    Documents(String),

    /// Text extraction failed for a single file.
    #[error("extraction failed for {path}: {message}")]
    Extract { path: String, message: String },

    /// The document directory produced zero chunks.
    #[error("no indexable text found in {0}")]
    EmptyCorpus(String),

    /// A question arrived before any index was built.
    #[error("index is not ready; build the index before asking questions")]
    NotReady,

    /// Caller-supplied input was rejected before reaching any provider.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Another rebuild is already running.
    #[error("an index build is already in progress")]
    BuildInProgress,

    /// The embedding provider failed or returned malformed vectors.
    #[error("embedding error ({provider}): {message}")]
    Embedding { provider: String, message: String },

    /// The language model call failed.
    #[error("model error ({provider}, {kind}): {message}")]
    Model {
        provider: String,
        kind: ModelErrorKind,
        message: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn embedding(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Embedding {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub(crate) fn model(
        provider: impl Into<String>,
        kind: ModelErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Error::Model {
            provider: provider.into(),
            kind,
            message: message.into(),
        }
    }

    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Config(_) => "config",
            Error::Documents(_) => "documents",
            Error::Extract { .. } => "extract",
            Error::EmptyCorpus(_) => "empty_corpus",
            Error::NotReady => "not_ready",
            Error::InvalidInput(_) => "bad_request",
            Error::BuildInProgress => "build_in_progress",
            Error::Embedding { .. } => "embedding_error",
            Error::Model { kind, .. } => kind.code(),
            Error::Io(_) => "io",
        }
    }
}

/// Failure category of a language model call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelErrorKind {
    /// The request exceeded `llm.timeout_secs`.
    Timeout,
    /// HTTP 429.
    RateLimited,
    /// HTTP 401 or 403.
    Auth,
    /// Any other non-success HTTP status.
    Api,
    /// Connection-level failure.
    Transport,
    /// The response body did not contain an answer.
    InvalidResponse,
}

impl ModelErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            ModelErrorKind::Timeout => "model_timeout",
            ModelErrorKind::RateLimited => "model_rate_limited",
            ModelErrorKind::Auth => "model_auth",
            ModelErrorKind::Api => "model_api_error",
            ModelErrorKind::Transport => "model_transport",
            ModelErrorKind::InvalidResponse => "model_invalid_response",
        }
    }

    /// Whether an explicitly configured retry policy may retry this failure.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            ModelErrorKind::Timeout | ModelErrorKind::RateLimited | ModelErrorKind::Transport
        )
    }
}

impl fmt::Display for ModelErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ModelErrorKind::Timeout => "timeout",
            ModelErrorKind::RateLimited => "rate limited",
            ModelErrorKind::Auth => "authentication",
            ModelErrorKind::Api => "api",
            ModelErrorKind::Transport => "transport",
            ModelErrorKind::InvalidResponse => "invalid response",
        };
        f.write_str(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_errors_carry_category_code() {
        let err = Error::model("groq", ModelErrorKind::RateLimited, "slow down");
        assert_eq!(err.code(), "model_rate_limited");
        assert!(err.to_string().contains("rate limited"));
    }

    #[test]
    fn transient_kinds() {
        assert!(ModelErrorKind::Timeout.is_transient());
        assert!(ModelErrorKind::Transport.is_transient());
        assert!(!ModelErrorKind::Auth.is_transient());
        assert!(!ModelErrorKind::InvalidResponse.is_transient());
    }
}
