use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Per-call dispatch telemetry, updated in place by a provider client as its
/// retry loop runs so the caller can read it back after the call resolves,
/// whether that call ended in `Ok` or `Err`.
///
/// Cheap to clone (an `Arc` around the mutable state); construct one per
/// request and hand the same handle to the dispatching client.
#[derive(Clone, Default)]
pub struct CallTelemetry(Arc<Mutex<CallTelemetryState>>);

#[derive(Default)]
struct CallTelemetryState {
    account_id: Option<u64>,
    used_affinity: bool,
    total_attempts: u32,
    rate_limited: Option<Duration>,
}

impl CallTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the credential that served (or was tried for) the current
    /// attempt. Called once per attempt, so the last call before the retry
    /// loop exits wins.
    pub fn record_attempt(&self, account_id: u64, used_affinity: bool, attempt: u32) {
        let mut state = self.0.lock().expect("telemetry mutex poisoned");
        state.account_id = Some(account_id);
        state.used_affinity = used_affinity;
        state.total_attempts = attempt;
    }

    /// Record that an attempt was rejected with a rate limit.
    pub fn record_rate_limit(&self, reset_after: Duration) {
        let mut state = self.0.lock().expect("telemetry mutex poisoned");
        state.rate_limited = Some(reset_after);
    }

    pub fn snapshot(&self) -> CallTelemetrySnapshot {
        let state = self.0.lock().expect("telemetry mutex poisoned");
        CallTelemetrySnapshot {
            account_id: state.account_id,
            used_affinity: state.used_affinity,
            total_attempts: state.total_attempts,
            rate_limited: state.rate_limited,
        }
    }
}

/// Immutable read of a `CallTelemetry` once the call it tracked has resolved.
#[derive(Debug, Clone, Copy, Default)]
pub struct CallTelemetrySnapshot {
    pub account_id: Option<u64>,
    pub used_affinity: bool,
    pub total_attempts: u32,
    pub rate_limited: Option<Duration>,
}
