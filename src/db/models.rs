use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct DbGeminiCliResource {
    pub id: i64,
    pub email: Option<String>,
    pub sub: String,
    pub project_id: String,
    pub refresh_token: String,
    pub access_token: Option<String>,
    pub expiry: DateTime<Utc>,
    pub status: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[sqlx(default)]
    pub usage_count: i64,
    #[sqlx(default)]
    pub last_used_at: Option<DateTime<Utc>>,
    #[sqlx(default)]
    pub is_rate_limited: bool,
    #[sqlx(default)]
    pub rate_limit_reset_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct DbCodexResource {
    pub id: i64,
    pub email: Option<String>,
    pub sub: String,
    pub account_id: String,
    pub refresh_token: String,
    pub access_token: String,
    pub expiry: DateTime<Utc>,
    pub chatgpt_plan_type: Option<String>,
    pub status: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[sqlx(default)]
    pub usage_count: i64,
    #[sqlx(default)]
    pub last_used_at: Option<DateTime<Utc>>,
    #[sqlx(default)]
    pub is_rate_limited: bool,
    #[sqlx(default)]
    pub rate_limit_reset_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct DbAntigravityResource {
    pub id: i64,
    pub email: Option<String>,
    /// Stable unique key (real subject if available, otherwise synthetic).
    pub sub: String,
    pub project_id: String,
    pub refresh_token: String,
    pub access_token: Option<String>,
    pub expiry: DateTime<Utc>,
    pub status: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[sqlx(default)]
    pub usage_count: i64,
    #[sqlx(default)]
    pub last_used_at: Option<DateTime<Utc>>,
    #[sqlx(default)]
    pub is_rate_limited: bool,
    #[sqlx(default)]
    pub rate_limit_reset_time: Option<DateTime<Utc>>,
}

/// One row of `request_logs`: a single proxied request's terminal outcome.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct DbRequestLog {
    pub id: i64,
    pub request_id: String,
    pub provider: String,
    pub account_id: Option<i64>,
    pub model: String,
    pub status_code: Option<i64>,
    pub retry_count: i64,
    pub prompt_tokens: Option<i64>,
    pub completion_tokens: Option<i64>,
    pub latency_ms: Option<i64>,
    pub error_kind: Option<String>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub conversation_id: Option<String>,
    pub session_id: Option<String>,
    pub is_success: Option<bool>,
    pub total_attempts: i64,
    pub time_to_first_byte_ms: Option<i64>,
    pub total_tokens: Option<i64>,
    pub is_rate_limited: bool,
    pub rate_limit_reset_seconds: Option<i64>,
    pub session_stickiness_used: bool,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    pub originator: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// A `request_logs` row not yet assigned a database id, as produced by the
/// log pipeline's producer side and consumed in a batch insert.
#[derive(Debug, Clone)]
pub struct NewRequestLog {
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
    pub created_at: DateTime<Utc>,
}

/// A terminal (or mid-flight) update to a previously inserted `request_logs`
/// row, keyed by the row's real database id.
#[derive(Debug, Clone, Default)]
pub struct RequestLogUpdate {
    pub id: i64,
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

/// One row of `hourly_summary_overall`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct DbHourlySummaryOverall {
    pub hour_start: DateTime<Utc>,
    pub request_count: i64,
    pub error_count: i64,
    pub prompt_tokens_total: i64,
    pub completion_tokens_total: i64,
    pub latency_p50_ms: i64,
    pub latency_p95_ms: i64,
    pub latency_p99_ms: i64,
    pub computed_at: DateTime<Utc>,
}

/// One row of `hourly_summary_by_model`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct DbHourlySummaryByModel {
    pub hour_start: DateTime<Utc>,
    pub model: String,
    pub request_count: i64,
    pub error_count: i64,
    pub prompt_tokens_total: i64,
    pub completion_tokens_total: i64,
    pub latency_p50_ms: i64,
    pub latency_p95_ms: i64,
    pub latency_p99_ms: i64,
    pub computed_at: DateTime<Utc>,
}

/// One row of `hourly_summary_by_account`. Unlike the other two summary
/// tables this one carries no latency percentiles — `hourly_summary_by_account`
/// tracks volume/error/token totals per account only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct DbHourlySummaryByAccount {
    pub hour_start: DateTime<Utc>,
    pub provider: String,
    pub account_id: i64,
    pub request_count: i64,
    pub error_count: i64,
    pub prompt_tokens_total: i64,
    pub completion_tokens_total: i64,
    pub computed_at: DateTime<Utc>,
}
