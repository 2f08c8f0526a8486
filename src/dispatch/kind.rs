use reqwest::StatusCode;

/// Why one dispatch attempt failed, independent of any provider's own error
/// body shape. Distinct from the `thiserror` enums (`PolluxError`,
/// `GeminiCliError`, `CodexError`) that render a response to the caller —
/// this one only drives the retry loop's next move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// 5xx, timeout, connection error, or an unclassified 4xx.
    TransientUpstream,
    /// 401/403.
    AccountAuth,
    /// 429.
    AccountRateLimit,
    /// 400, or a body carrying one of the terminal keywords below.
    ClientError,
    /// The provider's OAuth refresh call itself failed.
    TokenRefresh,
    /// A retry would be required but the response body has already started
    /// streaming to the caller.
    ResponseStarted,
    /// `Pick()` returned nothing.
    PoolExhausted,
    /// The caller disconnected mid-request.
    ClientCancelled,
}

/// Body substrings that mark a 400 (or any status, if present) as a terminal
/// client error rather than something retrying against a different account
/// could fix. Matched case-insensitively.
const TERMINAL_BODY_KEYWORDS: &[&str] = &[
    "invalid_argument",
    "permission_denied",
    "resource_exhausted",
    "\"invalid_argument\"",
    "invalid_request_error",
    "missing_required_parameter",
];

impl FailureKind {
    /// Classify an upstream HTTP response by status and raw body text.
    pub fn classify(status: StatusCode, body: &str) -> Self {
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return FailureKind::AccountAuth;
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            return FailureKind::AccountRateLimit;
        }
        if status == StatusCode::BAD_REQUEST || Self::body_is_terminal(body) {
            return FailureKind::ClientError;
        }
        FailureKind::TransientUpstream
    }

    fn body_is_terminal(body: &str) -> bool {
        let lower = body.to_ascii_lowercase();
        TERMINAL_BODY_KEYWORDS
            .iter()
            .any(|needle| lower.contains(&needle.to_ascii_lowercase()))
    }

    /// Whether the retry loop may try another attempt for this kind, in
    /// isolation from attempt-count/response-started bookkeeping (see
    /// `RetryDecision`).
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            FailureKind::TransientUpstream
                | FailureKind::AccountAuth
                | FailureKind::AccountRateLimit
                | FailureKind::TokenRefresh
        )
    }
}

/// What the dispatch loop decided to do after one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Success,
    Retry,
    Terminal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_by_status_first() {
        assert_eq!(
            FailureKind::classify(StatusCode::UNAUTHORIZED, ""),
            FailureKind::AccountAuth
        );
        assert_eq!(
            FailureKind::classify(StatusCode::FORBIDDEN, ""),
            FailureKind::AccountAuth
        );
        assert_eq!(
            FailureKind::classify(StatusCode::TOO_MANY_REQUESTS, ""),
            FailureKind::AccountRateLimit
        );
        assert_eq!(
            FailureKind::classify(StatusCode::BAD_REQUEST, ""),
            FailureKind::ClientError
        );
    }

    #[test]
    fn terminal_keyword_wins_even_on_other_status() {
        let body = r#"{"error":{"status":"INVALID_ARGUMENT","message":"bad field"}}"#;
        assert_eq!(
            FailureKind::classify(StatusCode::INTERNAL_SERVER_ERROR, body),
            FailureKind::ClientError
        );
    }

    #[test]
    fn keyword_match_is_case_insensitive() {
        let body = r#"{"message":"Permission_Denied for project"}"#;
        assert_eq!(
            FailureKind::classify(StatusCode::OK, body),
            FailureKind::ClientError
        );
    }

    #[test]
    fn unclassified_4xx_is_transient() {
        assert_eq!(
            FailureKind::classify(StatusCode::NOT_FOUND, "{}"),
            FailureKind::TransientUpstream
        );
    }

    #[test]
    fn retryable_kinds() {
        assert!(FailureKind::TransientUpstream.is_retryable());
        assert!(FailureKind::AccountAuth.is_retryable());
        assert!(FailureKind::AccountRateLimit.is_retryable());
        assert!(FailureKind::TokenRefresh.is_retryable());
        assert!(!FailureKind::ClientError.is_retryable());
        assert!(!FailureKind::ResponseStarted.is_retryable());
        assert!(!FailureKind::PoolExhausted.is_retryable());
        assert!(!FailureKind::ClientCancelled.is_retryable());
    }
}
