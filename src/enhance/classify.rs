//! Mapping raw provider failures onto the enhancement error taxonomy.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{EnhanceError, LlmError};

const AUTH_MARKERS: &[&str] = &[
    "invalid api key",
    "incorrect api key",
    "api key",
    "api_key",
    "unauthorized",
    "authentication",
    "permission denied",
    "forbidden",
];

const TIMEOUT_MARKERS: &[&str] = &[
    "timeout",
    "timed out",
    "deadline exceeded",
    "connection refused",
    "econnrefused",
];

const RATE_LIMIT_MARKERS: &[&str] = &[
    "rate limit",
    "rate_limit",
    "ratelimit",
    "too many requests",
    "quota",
];

/// HTTP status codes quoted in free text; ports and request ids don't count.
static AUTH_STATUS: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\b(?:401|403)\b").ok());

static RATE_LIMIT_STATUS: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\b429\b").ok());

fn matches_status(pattern: &LazyLock<Option<Regex>>, text: &str) -> bool {
    pattern.as_ref().is_some_and(|re| re.is_match(text))
}

/// Classify a provider error.
///
/// Structured signals (status codes, error variants) are trusted first; the
/// message text decides the rest.
pub fn classify(error: &LlmError) -> EnhanceError {
    let message = error.to_string();
    match error {
        LlmError::MissingApiKey(_) => EnhanceError::Auth(message),
        LlmError::ApiError {
            code: 401 | 403, ..
        } => EnhanceError::Auth(message),
        LlmError::ApiError {
            code: 408 | 504, ..
        } => EnhanceError::Timeout(message),
        LlmError::ApiError { code: 429, .. } | LlmError::RateLimited(_) => {
            EnhanceError::RateLimit(message)
        }
        _ => classify_message(&message),
    }
}

/// Classify a free-form error signal by its markers.
///
/// Checked in order: authentication, then timeout/connection, then rate limit.
/// Anything unmatched is an unknown provider failure.
pub fn classify_message(signal: &str) -> EnhanceError {
    let lowered = signal.to_lowercase();
    let has_any = |markers: &[&str]| markers.iter().any(|marker| lowered.contains(marker));

    if has_any(AUTH_MARKERS) || matches_status(&AUTH_STATUS, &lowered) {
        EnhanceError::Auth(signal.to_string())
    } else if has_any(TIMEOUT_MARKERS) {
        EnhanceError::Timeout(signal.to_string())
    } else if has_any(RATE_LIMIT_MARKERS) || matches_status(&RATE_LIMIT_STATUS, &lowered) {
        EnhanceError::RateLimit(signal.to_string())
    } else {
        EnhanceError::UnknownProvider(signal.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_message_markers() {
        assert!(matches!(classify_message("Invalid API key provided"), EnhanceError::Auth(_)));
        assert!(matches!(classify_message("HTTP 401 Unauthorized"), EnhanceError::Auth(_)));
        assert!(matches!(classify_message("request timeout after 30s"), EnhanceError::Timeout(_)));
        assert!(matches!(
            classify_message("connect ECONNREFUSED 127.0.0.1:11434"),
            EnhanceError::Timeout(_)
        ));
        assert!(matches!(classify_message("Rate limit reached"), EnhanceError::RateLimit(_)));
        assert!(matches!(
            classify_message("You exceeded your current quota"),
            EnhanceError::RateLimit(_)
        ));
        assert!(matches!(
            classify_message("model overloaded"),
            EnhanceError::UnknownProvider(_)
        ));
    }

    #[test]
    fn test_status_digits_inside_urls_and_ids_are_ignored() {
        assert!(matches!(
            classify_message(
                "connection refused: error sending request for url (http://localhost:4010/v1/chat)"
            ),
            EnhanceError::Timeout(_)
        ));
        assert!(matches!(
            classify_message("internal server error, request id req_84291"),
            EnhanceError::UnknownProvider(_)
        ));
        assert!(matches!(
            classify_message("upstream returned 5429 bytes"),
            EnhanceError::UnknownProvider(_)
        ));
    }

    #[test]
    fn test_quoted_status_codes_still_classify() {
        assert!(matches!(classify_message("status 401"), EnhanceError::Auth(_)));
        assert!(matches!(classify_message("got 403 from gateway"), EnhanceError::Auth(_)));
        assert!(matches!(classify_message("HTTP 429"), EnhanceError::RateLimit(_)));
    }

    #[test]
    fn test_auth_takes_precedence() {
        let err = classify_message("invalid api key (request timeout while retrying)");
        assert!(matches!(err, EnhanceError::Auth(_)));
    }

    #[test]
    fn test_message_is_preserved() {
        assert_eq!(
            classify_message("Too Many Requests"),
            EnhanceError::RateLimit("Too Many Requests".to_string())
        );
    }

    #[test]
    fn test_classify_structured_errors() {
        assert!(matches!(
            classify(&LlmError::MissingApiKey("openai".to_string())),
            EnhanceError::Auth(_)
        ));
        assert!(matches!(
            classify(&LlmError::ApiError {
                code: 403,
                message: "nope".to_string()
            }),
            EnhanceError::Auth(_)
        ));
        assert!(matches!(
            classify(&LlmError::ApiError {
                code: 504,
                message: "gateway".to_string()
            }),
            EnhanceError::Timeout(_)
        ));
        assert!(matches!(
            classify(&LlmError::RateLimited("slow down".to_string())),
            EnhanceError::RateLimit(_)
        ));
    }

    #[test]
    fn test_classify_falls_back_to_message() {
        assert!(matches!(
            classify(&LlmError::RequestFailed("connection refused: tcp connect".to_string())),
            EnhanceError::Timeout(_)
        ));
        assert!(matches!(
            classify(&LlmError::ApiError {
                code: 500,
                message: "internal error".to_string()
            }),
            EnhanceError::UnknownProvider(_)
        ));
        assert!(matches!(classify(&LlmError::EmptyResponse), EnhanceError::UnknownProvider(_)));
    }
}
