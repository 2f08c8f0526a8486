use crate::db::models::{
    DbAntigravityResource, DbCodexResource, DbGeminiCliResource, DbHourlySummaryByAccount,
    DbHourlySummaryByModel, DbHourlySummaryOverall, DbRequestLog, NewRequestLog, RequestLogUpdate,
};
use crate::db::patch::{ProviderCreate, ProviderPatch};
use crate::db::schema::SQLITE_INIT;
use crate::db::traits::DbPatchable;
use crate::error::PolluxError;
use chrono::{DateTime, Utc};
use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use std::{str::FromStr, time::Duration};
use tracing::info;

#[derive(Debug)]
pub enum DbActorMessage {
    /// Create (or upsert) a provider record and return its id.
    Create(ProviderCreate, RpcReplyPort<Result<i64, PolluxError>>),

    /// Patch a provider record by id.
    Patch(ProviderPatch, RpcReplyPort<Result<(), PolluxError>>),

    /// List active Gemini CLI credentials (status=1).
    ListActiveGeminiCli(RpcReplyPort<Result<Vec<DbGeminiCliResource>, PolluxError>>),

    /// List active Codex keys (status=1).
    ListActiveCodex(RpcReplyPort<Result<Vec<DbCodexResource>, PolluxError>>),

    /// List active Antigravity credentials (status=1).
    ListActiveAntigravity(RpcReplyPort<Result<Vec<DbAntigravityResource>, PolluxError>>),

    /// Get Codex key by id.
    GetCodexById(i64, RpcReplyPort<Result<DbCodexResource, PolluxError>>),

    /// Batch-insert new `request_logs` rows; returns each row's real id in
    /// the same order the rows were submitted, for temp-id resolution.
    InsertRequestLogs(Vec<NewRequestLog>, RpcReplyPort<Result<Vec<i64>, PolluxError>>),

    /// Batch-apply updates to previously inserted `request_logs` rows.
    UpdateRequestLogs(Vec<RequestLogUpdate>, RpcReplyPort<Result<(), PolluxError>>),

    /// Fetch every `request_logs` row with `created_at` in `[start, end)`.
    QueryLogsForHour(
        DateTime<Utc>,
        DateTime<Utc>,
        RpcReplyPort<Result<Vec<DbRequestLog>, PolluxError>>,
    ),

    /// Whether `hourly_summary_overall` already has a row for `hour_start`.
    HourlySummaryExists(DateTime<Utc>, RpcReplyPort<Result<bool, PolluxError>>),

    /// Whether `hourly_summary_overall` has any row at all, used by the
    /// aggregator to decide whether a from-scratch catch-up walk is needed.
    AnyHourlySummaryExists(RpcReplyPort<Result<bool, PolluxError>>),

    /// Earliest `request_logs.created_at`, or `None` if the table is empty.
    EarliestLogTimestamp(RpcReplyPort<Result<Option<DateTime<Utc>>, PolluxError>>),

    UpsertHourlySummaryOverall(
        DbHourlySummaryOverall,
        RpcReplyPort<Result<(), PolluxError>>,
    ),
    UpsertHourlySummaryByModel(
        DbHourlySummaryByModel,
        RpcReplyPort<Result<(), PolluxError>>,
    ),
    UpsertHourlySummaryByAccount(
        DbHourlySummaryByAccount,
        RpcReplyPort<Result<(), PolluxError>>,
    ),
}

#[derive(Clone)]
pub struct DbActorHandle {
    actor: ActorRef<DbActorMessage>,
}

impl DbActorHandle {
    pub async fn create(&self, create: ProviderCreate) -> Result<i64, PolluxError> {
        ractor::call!(self.actor, DbActorMessage::Create, create)
            .map_err(|e| PolluxError::RactorError(format!("DbActor Create RPC failed: {e}")))?
    }

    pub async fn patch(&self, patch: ProviderPatch) -> Result<(), PolluxError> {
        ractor::call!(self.actor, DbActorMessage::Patch, patch)
            .map_err(|e| PolluxError::RactorError(format!("DbActor Patch RPC failed: {e}")))?
    }

    pub async fn list_active_geminicli(&self) -> Result<Vec<DbGeminiCliResource>, PolluxError> {
        ractor::call!(self.actor, DbActorMessage::ListActiveGeminiCli).map_err(|e| {
            PolluxError::RactorError(format!("DbActor ListActiveGeminiCli RPC failed: {e}"))
        })?
    }

    pub async fn list_active_codex(&self) -> Result<Vec<DbCodexResource>, PolluxError> {
        ractor::call!(self.actor, DbActorMessage::ListActiveCodex).map_err(|e| {
            PolluxError::RactorError(format!("DbActor ListActiveCodex RPC failed: {e}"))
        })?
    }

    pub async fn list_active_antigravity(&self) -> Result<Vec<DbAntigravityResource>, PolluxError> {
        ractor::call!(self.actor, DbActorMessage::ListActiveAntigravity).map_err(|e| {
            PolluxError::RactorError(format!("DbActor ListActiveAntigravity RPC failed: {e}"))
        })?
    }

    pub async fn get_codex_by_id(&self, id: i64) -> Result<DbCodexResource, PolluxError> {
        ractor::call!(self.actor, DbActorMessage::GetCodexById, id).map_err(|e| {
            PolluxError::RactorError(format!("DbActor GetCodexById RPC failed: {e}"))
        })?
    }

    pub async fn insert_request_logs(
        &self,
        rows: Vec<NewRequestLog>,
    ) -> Result<Vec<i64>, PolluxError> {
        ractor::call!(self.actor, DbActorMessage::InsertRequestLogs, rows).map_err(|e| {
            PolluxError::RactorError(format!("DbActor InsertRequestLogs RPC failed: {e}"))
        })?
    }

    pub async fn update_request_logs(
        &self,
        updates: Vec<RequestLogUpdate>,
    ) -> Result<(), PolluxError> {
        ractor::call!(self.actor, DbActorMessage::UpdateRequestLogs, updates).map_err(|e| {
            PolluxError::RactorError(format!("DbActor UpdateRequestLogs RPC failed: {e}"))
        })?
    }

    pub async fn query_logs_for_hour(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<DbRequestLog>, PolluxError> {
        ractor::call!(self.actor, DbActorMessage::QueryLogsForHour, start, end).map_err(|e| {
            PolluxError::RactorError(format!("DbActor QueryLogsForHour RPC failed: {e}"))
        })?
    }

    pub async fn hourly_summary_exists(
        &self,
        hour_start: DateTime<Utc>,
    ) -> Result<bool, PolluxError> {
        ractor::call!(self.actor, DbActorMessage::HourlySummaryExists, hour_start).map_err(|e| {
            PolluxError::RactorError(format!("DbActor HourlySummaryExists RPC failed: {e}"))
        })?
    }

    pub async fn any_hourly_summary_exists(&self) -> Result<bool, PolluxError> {
        ractor::call!(self.actor, DbActorMessage::AnyHourlySummaryExists).map_err(|e| {
            PolluxError::RactorError(format!("DbActor AnyHourlySummaryExists RPC failed: {e}"))
        })?
    }

    pub async fn earliest_log_timestamp(&self) -> Result<Option<DateTime<Utc>>, PolluxError> {
        ractor::call!(self.actor, DbActorMessage::EarliestLogTimestamp).map_err(|e| {
            PolluxError::RactorError(format!("DbActor EarliestLogTimestamp RPC failed: {e}"))
        })?
    }

    pub async fn upsert_hourly_summary_overall(
        &self,
        row: DbHourlySummaryOverall,
    ) -> Result<(), PolluxError> {
        ractor::call!(self.actor, DbActorMessage::UpsertHourlySummaryOverall, row).map_err(|e| {
            PolluxError::RactorError(format!("DbActor UpsertHourlySummaryOverall RPC failed: {e}"))
        })?
    }

    pub async fn upsert_hourly_summary_by_model(
        &self,
        row: DbHourlySummaryByModel,
    ) -> Result<(), PolluxError> {
        ractor::call!(self.actor, DbActorMessage::UpsertHourlySummaryByModel, row).map_err(|e| {
            PolluxError::RactorError(format!(
                "DbActor UpsertHourlySummaryByModel RPC failed: {e}"
            ))
        })?
    }

    pub async fn upsert_hourly_summary_by_account(
        &self,
        row: DbHourlySummaryByAccount,
    ) -> Result<(), PolluxError> {
        ractor::call!(self.actor, DbActorMessage::UpsertHourlySummaryByAccount, row).map_err(
            |e| {
                PolluxError::RactorError(format!(
                    "DbActor UpsertHourlySummaryByAccount RPC failed: {e}"
                ))
            },
        )?
    }
}

struct DbActorState {
    pool: SqlitePool,
}

struct DbActor;

#[ractor::async_trait]
impl Actor for DbActor {
    type Msg = DbActorMessage;
    type State = DbActorState;
    type Arguments = String;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        database_url: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        let connect_opts = SqliteConnectOptions::from_str(database_url.as_str())
            .map_err(|e| ActorProcessingErr::from(format!("invalid database url: {e}")))?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5))
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .connect_with(connect_opts)
            .await
            .map_err(|e| ActorProcessingErr::from(format!("db connect failed: {e}")))?;

        apply_schema(&pool)
            .await
            .map_err(|e| ActorProcessingErr::from(format!("db schema init failed: {e}")))?;

        info!("DbActor initialized");
        Ok(DbActorState { pool })
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            DbActorMessage::Create(create, reply) => {
                let res = self.create_provider(&state.pool, create).await;
                let _ = reply.send(res);
            }
            DbActorMessage::Patch(patch, reply) => {
                let res = patch.apply_patch(&state.pool).await;
                let _ = reply.send(res);
            }
            DbActorMessage::ListActiveGeminiCli(reply) => {
                let res = self.list_active_geminicli(&state.pool).await;
                let _ = reply.send(res);
            }
            DbActorMessage::ListActiveCodex(reply) => {
                let res = self.list_active_codex(&state.pool).await;
                let _ = reply.send(res);
            }
            DbActorMessage::ListActiveAntigravity(reply) => {
                let res = self.list_active_antigravity(&state.pool).await;
                let _ = reply.send(res);
            }
            DbActorMessage::GetCodexById(id, reply) => {
                let res = self.get_codex_by_id(&state.pool, id).await;
                let _ = reply.send(res);
            }
            DbActorMessage::InsertRequestLogs(rows, reply) => {
                let res = self.insert_request_logs(&state.pool, rows).await;
                let _ = reply.send(res);
            }
            DbActorMessage::UpdateRequestLogs(updates, reply) => {
                let res = self.update_request_logs(&state.pool, updates).await;
                let _ = reply.send(res);
            }
            DbActorMessage::QueryLogsForHour(start, end, reply) => {
                let res = self.query_logs_for_hour(&state.pool, start, end).await;
                let _ = reply.send(res);
            }
            DbActorMessage::HourlySummaryExists(hour_start, reply) => {
                let res = self.hourly_summary_exists(&state.pool, hour_start).await;
                let _ = reply.send(res);
            }
            DbActorMessage::AnyHourlySummaryExists(reply) => {
                let res = self.any_hourly_summary_exists(&state.pool).await;
                let _ = reply.send(res);
            }
            DbActorMessage::EarliestLogTimestamp(reply) => {
                let res = self.earliest_log_timestamp(&state.pool).await;
                let _ = reply.send(res);
            }
            DbActorMessage::UpsertHourlySummaryOverall(row, reply) => {
                let res = self.upsert_hourly_summary_overall(&state.pool, row).await;
                let _ = reply.send(res);
            }
            DbActorMessage::UpsertHourlySummaryByModel(row, reply) => {
                let res = self.upsert_hourly_summary_by_model(&state.pool, row).await;
                let _ = reply.send(res);
            }
            DbActorMessage::UpsertHourlySummaryByAccount(row, reply) => {
                let res = self
                    .upsert_hourly_summary_by_account(&state.pool, row)
                    .await;
                let _ = reply.send(res);
            }
        }
        Ok(())
    }
}

impl DbActor {
    async fn create_provider(
        &self,
        pool: &SqlitePool,
        create: ProviderCreate,
    ) -> Result<i64, PolluxError> {
        match create {
            ProviderCreate::GeminiCli(c) => {
                let now = Utc::now();
                let id: i64 = sqlx::query_scalar(
                    r#"
                INSERT INTO gemini_cli (
                    email, sub, project_id, refresh_token, access_token, expiry, status, created_at, updated_at
                )
                VALUES (?, ?, ?, ?, ?, ?, 1, ?, ?)
                ON CONFLICT(sub, project_id) DO UPDATE SET
                    email=excluded.email,
                    refresh_token=excluded.refresh_token,
                    access_token=excluded.access_token,
                    expiry=excluded.expiry,
                    status=1,
                    updated_at=excluded.updated_at
                RETURNING id
                "#,
                )
                .bind(c.email)
                .bind(c.sub)
                .bind(c.project_id)
                .bind(c.refresh_token)
                .bind(c.access_token)
                .bind(c.expiry)
                .bind(now)
                .bind(now)
                .fetch_one(pool)
                .await?;

                Ok(id)
            }

            ProviderCreate::Codex(c) => {
                let now = Utc::now();

                let id: i64 = sqlx::query_scalar(
                    r#"
                INSERT INTO codex (
                    email, sub, account_id, refresh_token, access_token, expiry, chatgpt_plan_type, status, created_at, updated_at
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, 1, ?, ?)
                ON CONFLICT(sub, account_id) DO UPDATE SET
                    email = COALESCE(excluded.email, email),
                    refresh_token = excluded.refresh_token,
                    access_token = excluded.access_token,
                    expiry = excluded.expiry,
                    chatgpt_plan_type = COALESCE(excluded.chatgpt_plan_type, chatgpt_plan_type),
                    status = 1,
                    updated_at = excluded.updated_at
                RETURNING id
                "#,
                )
                .bind(c.email)
                .bind(c.sub)
                .bind(c.account_id)
                .bind(c.refresh_token)
                .bind(c.access_token)
                .bind(c.expiry)
                .bind(c.chatgpt_plan_type)
                .bind(now)
                .bind(now)
                .fetch_one(pool)
                .await?;

                Ok(id)
            }

            ProviderCreate::Antigravity(c) => {
                let now = Utc::now();
                let sub = c
                    .sub
                    .unwrap_or_else(|| synthetic_sub_from_refresh_token(&c.refresh_token));

                let id: i64 = sqlx::query_scalar(
                    r#"
                INSERT INTO antigravity (
                    email, sub, project_id, refresh_token, access_token, expiry, status, created_at, updated_at
                )
                VALUES (?, ?, ?, ?, ?, ?, 1, ?, ?)
                ON CONFLICT(sub, project_id) DO UPDATE SET
                    email=excluded.email,
                    refresh_token=excluded.refresh_token,
                    access_token=excluded.access_token,
                    expiry=excluded.expiry,
                    status=1,
                    updated_at=excluded.updated_at
                RETURNING id
                "#,
                )
                .bind(c.email)
                .bind(sub)
                .bind(c.project_id)
                .bind(c.refresh_token)
                .bind(c.access_token)
                .bind(c.expiry)
                .bind(now)
                .bind(now)
                .fetch_one(pool)
                .await?;

                Ok(id)
            }
        }
    }

    async fn list_active_geminicli(
        &self,
        pool: &SqlitePool,
    ) -> Result<Vec<DbGeminiCliResource>, PolluxError> {
        let rows = sqlx::query_as::<_, DbGeminiCliResource>(
            r#"
        SELECT id, email, sub, project_id, refresh_token, access_token, expiry, status, created_at, updated_at,
               usage_count, last_used_at, is_rate_limited, rate_limit_reset_time
        FROM gemini_cli
        WHERE status = 1
        ORDER BY id
        "#,
        )
        .fetch_all(pool)
        .await?;

        Ok(rows)
    }

    async fn list_active_codex(
        &self,
        pool: &SqlitePool,
    ) -> Result<Vec<DbCodexResource>, PolluxError> {
        let rows = sqlx::query_as::<_, DbCodexResource>(
            r#"
        SELECT id, email, sub, account_id, refresh_token, access_token, expiry, chatgpt_plan_type, status, created_at, updated_at,
               usage_count, last_used_at, is_rate_limited, rate_limit_reset_time
        FROM codex
        WHERE status = 1
        ORDER BY id
        "#,
        )
        .fetch_all(pool)
        .await?;

        Ok(rows)
    }

    async fn list_active_antigravity(
        &self,
        pool: &SqlitePool,
    ) -> Result<Vec<DbAntigravityResource>, PolluxError> {
        let rows = sqlx::query_as::<_, DbAntigravityResource>(
            r#"
        SELECT id, email, sub, project_id, refresh_token, access_token, expiry, status, created_at, updated_at,
               usage_count, last_used_at, is_rate_limited, rate_limit_reset_time
        FROM antigravity
        WHERE status = 1
        ORDER BY id
        "#,
        )
        .fetch_all(pool)
        .await?;

        Ok(rows)
    }

    async fn get_codex_by_id(
        &self,
        pool: &SqlitePool,
        id: i64,
    ) -> Result<DbCodexResource, PolluxError> {
        let row = sqlx::query_as::<_, DbCodexResource>(
            r#"
        SELECT id, email, sub, account_id, refresh_token, access_token, expiry, chatgpt_plan_type, status, created_at, updated_at,
               usage_count, last_used_at, is_rate_limited, rate_limit_reset_time
        FROM codex
        WHERE id = ?
        "#,
        )
        .bind(id)
        .fetch_one(pool)
        .await?;

        Ok(row)
    }
}

impl DbActor {
    async fn insert_request_logs(
        &self,
        pool: &SqlitePool,
        rows: Vec<NewRequestLog>,
    ) -> Result<Vec<i64>, PolluxError> {
        let mut ids = Vec::with_capacity(rows.len());
        let mut tx = pool.begin().await?;
        for row in rows {
            let id: i64 = sqlx::query_scalar(
                r#"
                INSERT INTO request_logs (
                    request_id, provider, account_id, model, conversation_id, session_id,
                    client_ip, user_agent, originator, session_stickiness_used, created_at
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                RETURNING id
                "#,
            )
            .bind(row.request_id)
            .bind(row.provider)
            .bind(row.account_id)
            .bind(row.model)
            .bind(row.conversation_id)
            .bind(row.session_id)
            .bind(row.client_ip)
            .bind(row.user_agent)
            .bind(row.originator)
            .bind(row.session_stickiness_used)
            .bind(row.created_at)
            .fetch_one(&mut *tx)
            .await?;
            ids.push(id);
        }
        tx.commit().await?;
        Ok(ids)
    }

    async fn update_request_logs(
        &self,
        pool: &SqlitePool,
        updates: Vec<RequestLogUpdate>,
    ) -> Result<(), PolluxError> {
        let now = Utc::now();
        let mut tx = pool.begin().await?;
        for update in updates {
            sqlx::query(
                r#"
                UPDATE request_logs SET
                    account_id = COALESCE(?, account_id),
                    status_code = COALESCE(?, status_code),
                    retry_count = COALESCE(?, retry_count),
                    total_attempts = COALESCE(?, total_attempts),
                    prompt_tokens = COALESCE(?, prompt_tokens),
                    completion_tokens = COALESCE(?, completion_tokens),
                    total_tokens = COALESCE(?, total_tokens),
                    latency_ms = COALESCE(?, latency_ms),
                    time_to_first_byte_ms = COALESCE(?, time_to_first_byte_ms),
                    error_kind = COALESCE(?, error_kind),
                    is_success = COALESCE(?, is_success),
                    is_rate_limited = COALESCE(?, is_rate_limited),
                    rate_limit_reset_seconds = COALESCE(?, rate_limit_reset_seconds),
                    session_stickiness_used = COALESCE(?, session_stickiness_used),
                    finished_at = COALESCE(?, finished_at),
                    updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(update.account_id)
            .bind(update.status_code)
            .bind(update.retry_count)
            .bind(update.total_attempts)
            .bind(update.prompt_tokens)
            .bind(update.completion_tokens)
            .bind(update.total_tokens)
            .bind(update.latency_ms)
            .bind(update.time_to_first_byte_ms)
            .bind(update.error_kind)
            .bind(update.is_success)
            .bind(update.is_rate_limited)
            .bind(update.rate_limit_reset_seconds)
            .bind(update.session_stickiness_used)
            .bind(update.finished_at)
            .bind(now)
            .bind(update.id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn query_logs_for_hour(
        &self,
        pool: &SqlitePool,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<DbRequestLog>, PolluxError> {
        let rows = sqlx::query_as::<_, DbRequestLog>(
            r#"
            SELECT id, request_id, provider, account_id, model, status_code, retry_count,
                   prompt_tokens, completion_tokens, latency_ms, error_kind, created_at, finished_at,
                   conversation_id, session_id, is_success, total_attempts, time_to_first_byte_ms,
                   total_tokens, is_rate_limited, rate_limit_reset_seconds, session_stickiness_used,
                   client_ip, user_agent, originator, updated_at
            FROM request_logs
            WHERE created_at >= ? AND created_at < ?
            ORDER BY id
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(pool)
        .await?;

        Ok(rows)
    }

    async fn hourly_summary_exists(
        &self,
        pool: &SqlitePool,
        hour_start: DateTime<Utc>,
    ) -> Result<bool, PolluxError> {
        let exists: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM hourly_summary_overall WHERE hour_start = ?")
                .bind(hour_start)
                .fetch_optional(pool)
                .await?;
        Ok(exists.is_some())
    }

    async fn any_hourly_summary_exists(&self, pool: &SqlitePool) -> Result<bool, PolluxError> {
        let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM hourly_summary_overall LIMIT 1")
            .fetch_optional(pool)
            .await?;
        Ok(exists.is_some())
    }

    async fn earliest_log_timestamp(
        &self,
        pool: &SqlitePool,
    ) -> Result<Option<DateTime<Utc>>, PolluxError> {
        let earliest: Option<DateTime<Utc>> =
            sqlx::query_scalar("SELECT MIN(created_at) FROM request_logs")
                .fetch_one(pool)
                .await?;
        Ok(earliest)
    }

    async fn upsert_hourly_summary_overall(
        &self,
        pool: &SqlitePool,
        row: DbHourlySummaryOverall,
    ) -> Result<(), PolluxError> {
        sqlx::query(
            r#"
            INSERT INTO hourly_summary_overall (
                hour_start, request_count, error_count, prompt_tokens_total,
                completion_tokens_total, latency_p50_ms, latency_p95_ms, latency_p99_ms, computed_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(hour_start) DO UPDATE SET
                request_count = excluded.request_count,
                error_count = excluded.error_count,
                prompt_tokens_total = excluded.prompt_tokens_total,
                completion_tokens_total = excluded.completion_tokens_total,
                latency_p50_ms = excluded.latency_p50_ms,
                latency_p95_ms = excluded.latency_p95_ms,
                latency_p99_ms = excluded.latency_p99_ms,
                computed_at = excluded.computed_at
            "#,
        )
        .bind(row.hour_start)
        .bind(row.request_count)
        .bind(row.error_count)
        .bind(row.prompt_tokens_total)
        .bind(row.completion_tokens_total)
        .bind(row.latency_p50_ms)
        .bind(row.latency_p95_ms)
        .bind(row.latency_p99_ms)
        .bind(row.computed_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    async fn upsert_hourly_summary_by_model(
        &self,
        pool: &SqlitePool,
        row: DbHourlySummaryByModel,
    ) -> Result<(), PolluxError> {
        sqlx::query(
            r#"
            INSERT INTO hourly_summary_by_model (
                hour_start, model, request_count, error_count, prompt_tokens_total,
                completion_tokens_total, latency_p50_ms, latency_p95_ms, latency_p99_ms, computed_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(hour_start, model) DO UPDATE SET
                request_count = excluded.request_count,
                error_count = excluded.error_count,
                prompt_tokens_total = excluded.prompt_tokens_total,
                completion_tokens_total = excluded.completion_tokens_total,
                latency_p50_ms = excluded.latency_p50_ms,
                latency_p95_ms = excluded.latency_p95_ms,
                latency_p99_ms = excluded.latency_p99_ms,
                computed_at = excluded.computed_at
            "#,
        )
        .bind(row.hour_start)
        .bind(row.model)
        .bind(row.request_count)
        .bind(row.error_count)
        .bind(row.prompt_tokens_total)
        .bind(row.completion_tokens_total)
        .bind(row.latency_p50_ms)
        .bind(row.latency_p95_ms)
        .bind(row.latency_p99_ms)
        .bind(row.computed_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    async fn upsert_hourly_summary_by_account(
        &self,
        pool: &SqlitePool,
        row: DbHourlySummaryByAccount,
    ) -> Result<(), PolluxError> {
        sqlx::query(
            r#"
            INSERT INTO hourly_summary_by_account (
                hour_start, provider, account_id, request_count, error_count,
                prompt_tokens_total, completion_tokens_total, computed_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(hour_start, provider, account_id) DO UPDATE SET
                request_count = excluded.request_count,
                error_count = excluded.error_count,
                prompt_tokens_total = excluded.prompt_tokens_total,
                completion_tokens_total = excluded.completion_tokens_total,
                computed_at = excluded.computed_at
            "#,
        )
        .bind(row.hour_start)
        .bind(row.provider)
        .bind(row.account_id)
        .bind(row.request_count)
        .bind(row.error_count)
        .bind(row.prompt_tokens_total)
        .bind(row.completion_tokens_total)
        .bind(row.computed_at)
        .execute(pool)
        .await?;
        Ok(())
    }
}

fn synthetic_sub_from_refresh_token(refresh_token: &str) -> String {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut h = DefaultHasher::new();
    refresh_token.hash(&mut h);
    format!("rt_hash:{:016x}", h.finish())
}

/// Spawn the database actor and return a cloneable handle.
pub async fn spawn(database_url: &str) -> DbActorHandle {
    let (actor, _jh) = ractor::Actor::spawn(
        Some("DbActor".to_string()),
        DbActor,
        database_url.to_string(),
    )
    .await
    .expect("failed to spawn DbActor");

    DbActorHandle { actor }
}

async fn apply_schema(pool: &SqlitePool) -> Result<(), PolluxError> {
    for stmt in SQLITE_INIT.split(';') {
        let s = stmt.trim();
        if s.is_empty() {
            continue;
        }
        if let Err(e) = sqlx::query(s).execute(pool).await {
            // SQLite has no `ALTER TABLE ... ADD COLUMN IF NOT EXISTS`; on a
            // database that already has these scoring columns the ALTERs
            // below are expected to fail with "duplicate column name".
            if s.starts_with("ALTER TABLE") && e.to_string().contains("duplicate column name") {
                continue;
            }
            return Err(e.into());
        }
    }
    Ok(())
}
