use chrono::{DateTime, Utc};

/// One request's opening log row, submitted by the route handler the moment
/// a credential has been assigned and before the upstream call is made.
#[derive(Debug, Clone)]
pub struct NewLogEntry {
    pub request_id: String,
    pub provider: String,
    pub account_id: Option<i64>,
    pub model: String,
    pub conversation_id: Option<String>,
    pub session_id: Option<String>,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    pub originator: Option<String>,
    pub session_stickiness_used: bool,
}

/// A follow-up to a previously submitted [`NewLogEntry`], referenced by the
/// temp id `LogPipelineHandle::insert` returned. Every field a caller
/// doesn't know leaves as `None` and is left untouched in the stored row.
#[derive(Debug, Clone, Default)]
pub struct LogUpdate {
    pub account_id: Option<i64>,
    pub status_code: Option<i64>,
    pub retry_count: Option<i64>,
    pub total_attempts: Option<i64>,
    pub prompt_tokens: Option<i64>,
    pub completion_tokens: Option<i64>,
    pub total_tokens: Option<i64>,
    pub latency_ms: Option<i64>,
    pub time_to_first_byte_ms: Option<i64>,
    pub error_kind: Option<String>,
    pub is_success: Option<bool>,
    pub is_rate_limited: Option<bool>,
    pub rate_limit_reset_seconds: Option<i64>,
    pub session_stickiness_used: Option<bool>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub(super) enum LogEvent {
    Insert {
        temp_id: u64,
        entry: NewLogEntry,
        created_at: DateTime<Utc>,
    },
    Update {
        temp_id: u64,
        update: LogUpdate,
    },
    /// Flush everything buffered and stop, sent once from the shutdown path.
    Shutdown,
}
