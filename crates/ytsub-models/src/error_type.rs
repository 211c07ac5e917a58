//! Closed error taxonomy (spec §4.10).

use serde::{Deserialize, Serialize};

/// Classification of every failure the pipeline can observe, closed so that
/// retry policy and manifest persistence can match exhaustively on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorType {
    Network,
    Timeout,
    RateLimit,
    Auth,
    Content,
    FileIo,
    Parse,
    InvalidInput,
    Cancelled,
    ExternalService,
    Unknown,
}

impl ErrorType {
    /// `{NETWORK, TIMEOUT, RATE_LIMIT, EXTERNAL_SERVICE}` are retryable by
    /// the resume mechanism; everything else either never clears on retry
    /// or is already terminal.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorType::Network | ErrorType::Timeout | ErrorType::RateLimit | ErrorType::ExternalService
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorType::Network => "NETWORK",
            ErrorType::Timeout => "TIMEOUT",
            ErrorType::RateLimit => "RATE_LIMIT",
            ErrorType::Auth => "AUTH",
            ErrorType::Content => "CONTENT",
            ErrorType::FileIo => "FILE_IO",
            ErrorType::Parse => "PARSE",
            ErrorType::InvalidInput => "INVALID_INPUT",
            ErrorType::Cancelled => "CANCELLED",
            ErrorType::ExternalService => "EXTERNAL_SERVICE",
            ErrorType::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for ErrorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Classify a raw message (subprocess stderr, adapter error string, etc.)
/// into an `ErrorType` using the precedence order from spec §4.10: explicit
/// cancellation and timeouts are checked first, then network/rate-limit/
/// auth/content keywords in that order, falling back to `ExternalService`
/// for any other reported non-zero exit and `Unknown` otherwise.
///
/// `is_nonzero_exit` should be `true` when the caller knows the signal came
/// from a failing external process exit (so the `EXTERNAL_SERVICE` fallback
/// applies) and `false` for arbitrary error strings (where `Unknown` is the
/// safer fallback).
pub fn classify_message(message: &str, is_nonzero_exit: bool) -> ErrorType {
    let lower = message.to_lowercase();

    if lower.contains("cancel") {
        return ErrorType::Cancelled;
    }
    if lower.contains("timeout") || lower.contains("timed out") {
        return ErrorType::Timeout;
    }
    if contains_any(
        &lower,
        &["network", "connection", "dns", "refused", "reset", "unreachable", "failed to connect"],
    ) {
        return ErrorType::Network;
    }
    if contains_any(&lower, &["429", "rate limit", "too many requests"]) {
        return ErrorType::RateLimit;
    }
    if contains_any(&lower, &["401", "403", "unauthorized"]) {
        return ErrorType::Auth;
    }
    if contains_any(
        &lower,
        &[
            "404", "not found", "unavailable", "private", "deleted", "removed", "blocked", "region",
            "copyright",
        ],
    ) {
        return ErrorType::Content;
    }
    if is_nonzero_exit {
        return ErrorType::ExternalService;
    }
    ErrorType::Unknown
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_timeout_before_keyword_scan() {
        assert_eq!(classify_message("request timed out after 60s", false), ErrorType::Timeout);
    }

    #[test]
    fn classifies_rate_limit() {
        assert_eq!(classify_message("HTTP 429: Too Many Requests", false), ErrorType::RateLimit);
    }

    #[test]
    fn classifies_auth() {
        assert_eq!(classify_message("401 Unauthorized", false), ErrorType::Auth);
        assert_eq!(classify_message("403 Forbidden", false), ErrorType::Auth);
    }

    #[test]
    fn classifies_content() {
        assert_eq!(classify_message("Video unavailable", false), ErrorType::Content);
        assert_eq!(classify_message("This video is private", false), ErrorType::Content);
    }

    #[test]
    fn classifies_network() {
        assert_eq!(classify_message("Connection refused", false), ErrorType::Network);
    }

    #[test]
    fn falls_back_to_external_service_for_nonzero_exit() {
        assert_eq!(classify_message("yt-dlp exited with code 2", true), ErrorType::ExternalService);
    }

    #[test]
    fn falls_back_to_unknown_otherwise() {
        assert_eq!(classify_message("something odd happened", false), ErrorType::Unknown);
    }

    #[test]
    fn retryability_matches_spec_table() {
        assert!(ErrorType::Network.is_retryable());
        assert!(ErrorType::Timeout.is_retryable());
        assert!(ErrorType::RateLimit.is_retryable());
        assert!(ErrorType::ExternalService.is_retryable());
        assert!(!ErrorType::Auth.is_retryable());
        assert!(!ErrorType::Content.is_retryable());
        assert!(!ErrorType::InvalidInput.is_retryable());
        assert!(!ErrorType::Parse.is_retryable());
    }

    #[test]
    fn serializes_screaming_snake_case() {
        assert_eq!(serde_json::to_string(&ErrorType::RateLimit).unwrap(), "\"RATE_LIMIT\"");
    }
}
