//! SQL DDL for initializing the database schema.
//! SQLite-first design; can be adapted for other RDBMS.

/// SQLite schema includes:
/// - `gemini_cli` table (Gemini CLI provider, one (sub, project_id) per row)
/// - `codex` table (Codex provider, one (sub, account_id) per row)
/// - `antigravity` table (Antigravity provider, one (sub, project_id) per row)
pub const SQLITE_INIT: &str = r#"
-- ---------------------------------------------------------------------------
-- Gemini CLI provider
-- ---------------------------------------------------------------------------
CREATE TABLE IF NOT EXISTS gemini_cli (
    id INTEGER PRIMARY KEY NOT NULL,
    email TEXT NULL,
    sub TEXT NOT NULL,
    project_id TEXT NOT NULL,
    refresh_token TEXT NOT NULL,
    access_token TEXT NULL,
    expiry TEXT NOT NULL, -- RFC3339
    status INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL, -- RFC3339
    updated_at TEXT NOT NULL, -- RFC3339
    UNIQUE(sub, project_id)
);

CREATE INDEX IF NOT EXISTS idx_gemini_cli_status ON gemini_cli(status);

-- ---------------------------------------------------------------------------
-- Codex provider (one (sub, account_id) per row)
-- ---------------------------------------------------------------------------
CREATE TABLE IF NOT EXISTS codex (
    id INTEGER PRIMARY KEY NOT NULL,
    email TEXT NULL,
    sub TEXT NOT NULL,
    account_id TEXT NOT NULL,
    refresh_token TEXT NOT NULL,
    access_token TEXT NOT NULL,
    expiry TEXT NOT NULL, -- RFC3339
    chatgpt_plan_type TEXT NULL,
    status INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL, -- RFC3339
    updated_at TEXT NOT NULL, -- RFC3339
    UNIQUE(sub, account_id)
);

CREATE INDEX IF NOT EXISTS idx_codex_status ON codex(status);

-- ---------------------------------------------------------------------------
-- Antigravity provider (one (sub, project_id) per row)
-- ---------------------------------------------------------------------------
CREATE TABLE IF NOT EXISTS antigravity (
    id INTEGER PRIMARY KEY NOT NULL,
    email TEXT NULL,
    sub TEXT NOT NULL,
    project_id TEXT NOT NULL,
    refresh_token TEXT NOT NULL,
    access_token TEXT NULL,
    expiry TEXT NOT NULL, -- RFC3339
    status INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL, -- RFC3339
    updated_at TEXT NOT NULL, -- RFC3339
    UNIQUE(sub, project_id)
);

CREATE INDEX IF NOT EXISTS idx_antigravity_status ON antigravity(status);

-- ---------------------------------------------------------------------------
-- Account scoring columns, added to every provider table.
-- SQLite has no "ADD COLUMN IF NOT EXISTS"; callers ignore the duplicate-
-- column error these statements raise on a database that already has them.
-- ---------------------------------------------------------------------------
ALTER TABLE gemini_cli ADD COLUMN usage_count INTEGER NOT NULL DEFAULT 0;
ALTER TABLE gemini_cli ADD COLUMN last_used_at TEXT NULL;
ALTER TABLE gemini_cli ADD COLUMN is_rate_limited INTEGER NOT NULL DEFAULT 0;
ALTER TABLE gemini_cli ADD COLUMN rate_limit_reset_time TEXT NULL;

ALTER TABLE codex ADD COLUMN usage_count INTEGER NOT NULL DEFAULT 0;
ALTER TABLE codex ADD COLUMN last_used_at TEXT NULL;
ALTER TABLE codex ADD COLUMN is_rate_limited INTEGER NOT NULL DEFAULT 0;
ALTER TABLE codex ADD COLUMN rate_limit_reset_time TEXT NULL;

ALTER TABLE antigravity ADD COLUMN usage_count INTEGER NOT NULL DEFAULT 0;
ALTER TABLE antigravity ADD COLUMN last_used_at TEXT NULL;
ALTER TABLE antigravity ADD COLUMN is_rate_limited INTEGER NOT NULL DEFAULT 0;
ALTER TABLE antigravity ADD COLUMN rate_limit_reset_time TEXT NULL;

-- ---------------------------------------------------------------------------
-- Request log pipeline
-- ---------------------------------------------------------------------------
CREATE TABLE IF NOT EXISTS request_logs (
    id INTEGER PRIMARY KEY NOT NULL,
    request_id TEXT NOT NULL,
    provider TEXT NOT NULL,
    account_id INTEGER NULL,
    model TEXT NOT NULL,
    status_code INTEGER NULL,
    retry_count INTEGER NOT NULL DEFAULT 0,
    prompt_tokens INTEGER NULL,
    completion_tokens INTEGER NULL,
    latency_ms INTEGER NULL,
    error_kind TEXT NULL,
    created_at TEXT NOT NULL,
    finished_at TEXT NULL
);

CREATE INDEX IF NOT EXISTS idx_request_logs_created_at ON request_logs(created_at);
CREATE INDEX IF NOT EXISTS idx_request_logs_provider_model ON request_logs(provider, model);

-- Additional request_logs columns, added the same duplicate-column-
-- tolerant way as the provider scoring columns above.
ALTER TABLE request_logs ADD COLUMN conversation_id TEXT NULL;
ALTER TABLE request_logs ADD COLUMN session_id TEXT NULL;
ALTER TABLE request_logs ADD COLUMN is_success INTEGER NULL;
ALTER TABLE request_logs ADD COLUMN total_attempts INTEGER NOT NULL DEFAULT 1;
ALTER TABLE request_logs ADD COLUMN time_to_first_byte_ms INTEGER NULL;
ALTER TABLE request_logs ADD COLUMN total_tokens INTEGER NULL;
ALTER TABLE request_logs ADD COLUMN is_rate_limited INTEGER NOT NULL DEFAULT 0;
ALTER TABLE request_logs ADD COLUMN rate_limit_reset_seconds INTEGER NULL;
ALTER TABLE request_logs ADD COLUMN session_stickiness_used INTEGER NOT NULL DEFAULT 0;
ALTER TABLE request_logs ADD COLUMN client_ip TEXT NULL;
ALTER TABLE request_logs ADD COLUMN user_agent TEXT NULL;
ALTER TABLE request_logs ADD COLUMN originator TEXT NULL;
ALTER TABLE request_logs ADD COLUMN updated_at TEXT NULL;

CREATE INDEX IF NOT EXISTS idx_request_logs_conversation_id ON request_logs(conversation_id);

-- ---------------------------------------------------------------------------
-- Hourly aggregates, one row per (hour_start, dimension value).
-- ---------------------------------------------------------------------------
CREATE TABLE IF NOT EXISTS hourly_summary_overall (
    hour_start TEXT PRIMARY KEY NOT NULL,
    request_count INTEGER NOT NULL,
    error_count INTEGER NOT NULL,
    prompt_tokens_total INTEGER NOT NULL,
    completion_tokens_total INTEGER NOT NULL,
    latency_p50_ms INTEGER NOT NULL,
    latency_p95_ms INTEGER NOT NULL,
    latency_p99_ms INTEGER NOT NULL,
    computed_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS hourly_summary_by_model (
    hour_start TEXT NOT NULL,
    model TEXT NOT NULL,
    request_count INTEGER NOT NULL,
    error_count INTEGER NOT NULL,
    prompt_tokens_total INTEGER NOT NULL,
    completion_tokens_total INTEGER NOT NULL,
    latency_p50_ms INTEGER NOT NULL,
    latency_p95_ms INTEGER NOT NULL,
    latency_p99_ms INTEGER NOT NULL,
    computed_at TEXT NOT NULL,
    PRIMARY KEY (hour_start, model)
);

CREATE TABLE IF NOT EXISTS hourly_summary_by_account (
    hour_start TEXT NOT NULL,
    provider TEXT NOT NULL,
    account_id INTEGER NOT NULL,
    request_count INTEGER NOT NULL,
    error_count INTEGER NOT NULL,
    prompt_tokens_total INTEGER NOT NULL,
    completion_tokens_total INTEGER NOT NULL,
    computed_at TEXT NOT NULL,
    PRIMARY KEY (hour_start, provider, account_id)
);
"#;
