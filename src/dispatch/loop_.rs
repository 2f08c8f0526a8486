use super::kind::FailureKind;
use reqwest::StatusCode;

/// Attempt budget for one logical request, across every account the pool
/// hands out for it.
pub const MAX_RETRIES: u32 = 15;

/// What the loop should do after attempt number `attempt` (1-based) failed
/// with `kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Try again; `next_attempt` is what the caller should pass back in on
    /// the following call.
    Retry { next_attempt: u32 },
    /// Stop. `status` is the HTTP status to surface to the caller, if any
    /// (`None` means synthesize a 503 — pool exhausted with no prior
    /// response at all).
    Terminal { status: Option<StatusCode> },
}

/// Decide the next step given the attempt that just ran, its classified
/// failure, and the status code it carried (if any — a network error or
/// pool-exhaustion has none).
///
/// Pure and stateless: the caller owns actually picking the next account,
/// refreshing its token, and re-issuing the request. This only answers
/// "retry or stop", matching the loop described for the four core
/// subsystems — account picking, OAuth resolution, upstream classification
/// live in the provider clients and `providers::policy`.
pub fn next_step(attempt: u32, kind: FailureKind, status: Option<StatusCode>) -> RetryDecision {
    if !kind.is_retryable() {
        return RetryDecision::Terminal { status };
    }

    if attempt >= MAX_RETRIES {
        return RetryDecision::Terminal { status };
    }

    RetryDecision::Retry {
        next_attempt: attempt + 1,
    }
}

/// Enforce the shared attempt budget on top of a provider client's own
/// verdict for one failed attempt. The provider clients already classify
/// status/body nuance themselves (`classify_upstream_error` /
/// `IsRetryable`); this only answers whether attempt `attempt` may be
/// followed by another, against the one budget every dispatch path shares.
/// Returns the next attempt number to retry with, or `None` to stop.
pub fn next_attempt(attempt: u32, retryable: bool) -> Option<u32> {
    let kind = if retryable {
        FailureKind::TransientUpstream
    } else {
        FailureKind::ClientError
    };
    match next_step(attempt, kind, None) {
        RetryDecision::Retry { next_attempt } => Some(next_attempt),
        RetryDecision::Terminal { .. } => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retries_transient_failures_until_the_budget_runs_out() {
        for attempt in 1..MAX_RETRIES {
            assert_eq!(
                next_step(attempt, FailureKind::TransientUpstream, None),
                RetryDecision::Retry {
                    next_attempt: attempt + 1
                }
            );
        }
        assert_eq!(
            next_step(MAX_RETRIES, FailureKind::TransientUpstream, None),
            RetryDecision::Terminal { status: None }
        );
    }

    #[test]
    fn client_error_is_terminal_on_the_first_attempt() {
        assert_eq!(
            next_step(1, FailureKind::ClientError, Some(StatusCode::BAD_REQUEST)),
            RetryDecision::Terminal {
                status: Some(StatusCode::BAD_REQUEST)
            }
        );
    }

    #[test]
    fn next_attempt_caps_at_shared_budget_regardless_of_caller() {
        let mut attempt = 1;
        while let Some(next) = next_attempt(attempt, true) {
            attempt = next;
        }
        assert_eq!(attempt, MAX_RETRIES);
    }

    #[test]
    fn next_attempt_stops_immediately_when_not_retryable() {
        assert_eq!(next_attempt(1, false), None);
    }

    #[test]
    fn pool_exhausted_never_retries() {
        assert_eq!(
            next_step(1, FailureKind::PoolExhausted, None),
            RetryDecision::Terminal { status: None }
        );
    }

    #[test]
    fn response_started_is_terminal_regardless_of_attempt_number() {
        assert_eq!(
            next_step(3, FailureKind::ResponseStarted, None),
            RetryDecision::Terminal { status: None }
        );
    }

    #[test]
    fn total_attempts_never_exceed_max_retries() {
        let mut attempt = 1;
        loop {
            match next_step(attempt, FailureKind::AccountRateLimit, None) {
                RetryDecision::Retry { next_attempt } => attempt = next_attempt,
                RetryDecision::Terminal { .. } => break,
            }
        }
        assert_eq!(attempt, MAX_RETRIES);
    }
}
