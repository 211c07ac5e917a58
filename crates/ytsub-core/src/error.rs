//! Closed core error type (spec §4.10, §10.2).

use thiserror::Error;
use ytsub_models::{classify_message, ErrorType};

pub type CoreResult<T> = Result<T, CoreError>;

/// Every error the pipeline core can produce. Carries an `ErrorType` via
/// [`CoreError::kind`] so stage processors and the failure logger never
/// need to re-derive a classification from a message string more than once.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("network error: {0}")]
    Network(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("rate limited: {0}")]
    RateLimit(String),

    #[error("auth error: {0}")]
    Auth(String),

    #[error("content error: {0}")]
    Content(String),

    #[error("file I/O error: {0}")]
    FileIo(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("cancelled: {0}")]
    Cancelled(String),

    #[error("external service error: {0}")]
    ExternalService(String),

    #[error("unknown error: {0}")]
    Unknown(String),
}

impl CoreError {
    pub fn kind(&self) -> ErrorType {
        match self {
            CoreError::Network(_) => ErrorType::Network,
            CoreError::Timeout(_) => ErrorType::Timeout,
            CoreError::RateLimit(_) => ErrorType::RateLimit,
            CoreError::Auth(_) => ErrorType::Auth,
            CoreError::Content(_) => ErrorType::Content,
            CoreError::FileIo(_) => ErrorType::FileIo,
            CoreError::Parse(_) => ErrorType::Parse,
            CoreError::InvalidInput(_) => ErrorType::InvalidInput,
            CoreError::Cancelled(_) => ErrorType::Cancelled,
            CoreError::ExternalService(_) => ErrorType::ExternalService,
            CoreError::Unknown(_) => ErrorType::Unknown,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, CoreError::Cancelled(_))
    }

    pub fn cancelled(reason: impl Into<String>) -> Self {
        CoreError::Cancelled(reason.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        CoreError::InvalidInput(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        CoreError::Parse(msg.into())
    }

    pub fn content(msg: impl Into<String>) -> Self {
        CoreError::Content(msg.into())
    }

    /// Build a `CoreError` from a raw adapter message using the spec §4.10
    /// keyword classification table.
    pub fn classify(message: impl Into<String>, is_nonzero_exit: bool) -> Self {
        let message = message.into();
        match classify_message(&message, is_nonzero_exit) {
            ErrorType::Network => CoreError::Network(message),
            ErrorType::Timeout => CoreError::Timeout(message),
            ErrorType::RateLimit => CoreError::RateLimit(message),
            ErrorType::Auth => CoreError::Auth(message),
            ErrorType::Content => CoreError::Content(message),
            ErrorType::FileIo => CoreError::FileIo(message),
            ErrorType::Parse => CoreError::Parse(message),
            ErrorType::InvalidInput => CoreError::InvalidInput(message),
            ErrorType::Cancelled => CoreError::Cancelled(message),
            ErrorType::ExternalService => CoreError::ExternalService(message),
            ErrorType::Unknown => CoreError::Unknown(message),
        }
    }
}

impl From<std::io::Error> for CoreError {
    fn from(e: std::io::Error) -> Self {
        CoreError::classify(e.to_string(), false)
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::Parse(e.to_string())
    }
}
