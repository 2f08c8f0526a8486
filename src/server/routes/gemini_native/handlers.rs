use super::extract::{GeminiNativePreprocess, GeminiNativeTarget};
use crate::error::GeminiCliError;
use crate::logpipeline::{LogUpdate, NewLogEntry};
use crate::providers::antigravity::AntigravityClient;
use crate::providers::geminicli::client::GeminiClient;
use crate::providers::{CallTelemetry, CallTelemetrySnapshot};
use crate::server::router::PolluxState;
use crate::server::routes::{antigravity, geminicli};
use axum::{
    extract::State,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use std::time::Instant;
use uuid::Uuid;

pub async fn gemini_native_handler(
    State(state): State<PolluxState>,
    GeminiNativePreprocess(body, target): GeminiNativePreprocess,
) -> Result<Response, GeminiCliError> {
    let request_id = Uuid::new_v4().to_string();
    let start = Instant::now();
    let telemetry = CallTelemetry::new();

    match target {
        GeminiNativeTarget::GeminiCli(ctx) => {
            let temp_id = state.providers.logpipeline.insert(NewLogEntry {
                request_id,
                provider: "geminicli".to_string(),
                account_id: None,
                model: ctx.model.clone(),
                conversation_id: ctx.conversation_id.clone(),
                session_id: None,
                client_ip: None,
                user_agent: None,
                originator: Some("gemini_native".to_string()),
                session_stickiness_used: false,
            });

            let caller = GeminiClient::new(state.providers.geminicli_cfg.as_ref(), state.client.clone());
            let result = caller
                .call_gemini_cli_with_affinity(
                    &state.providers.geminicli,
                    &ctx,
                    &body,
                    Some(&state.providers.affinity),
                    &telemetry,
                )
                .await;
            finalize_log(&state, temp_id, start, &result, telemetry.snapshot(), |e| e.to_string());
            let upstream_resp = result?;

            if ctx.stream {
                Ok(geminicli::respond::build_stream_response(upstream_resp).into_response())
            } else {
                Ok(geminicli::respond::build_json_response(upstream_resp).await.into_response())
            }
        }
        GeminiNativeTarget::Antigravity(ctx) => {
            let temp_id = state.providers.logpipeline.insert(NewLogEntry {
                request_id,
                provider: "antigravity".to_string(),
                account_id: None,
                model: ctx.model.clone(),
                conversation_id: None,
                session_id: None,
                client_ip: None,
                user_agent: None,
                originator: Some("gemini_native".to_string()),
                session_stickiness_used: false,
            });

            let caller = AntigravityClient::new(
                state.providers.antigravity_cfg.as_ref(),
                state.antigravity_client.clone(),
                None,
            );
            let result = caller
                .call_antigravity(&state.providers.antigravity, &ctx, &body, &telemetry)
                .await;
            finalize_log(&state, temp_id, start, &result, telemetry.snapshot(), |e| e.to_string());
            let upstream_resp = result.map_err(map_antigravity_error)?;

            if ctx.stream {
                Ok(antigravity::respond::build_stream_response(upstream_resp, state.clone()).into_response())
            } else {
                Ok(antigravity::respond::build_json_response(upstream_resp, &state)
                    .await?
                    .into_response())
            }
        }
    }
}

fn finalize_log<E>(
    state: &PolluxState,
    temp_id: u64,
    start: Instant,
    result: &Result<reqwest::Response, E>,
    telemetry: CallTelemetrySnapshot,
    describe_err: impl FnOnce(&E) -> String,
) {
    let mut update = match result {
        Ok(resp) => LogUpdate {
            status_code: Some(i64::from(resp.status().as_u16())),
            time_to_first_byte_ms: Some(start.elapsed().as_millis() as i64),
            is_success: Some(resp.status().is_success()),
            finished_at: Some(Utc::now()),
            ..Default::default()
        },
        Err(err) => LogUpdate {
            latency_ms: Some(start.elapsed().as_millis() as i64),
            is_success: Some(false),
            error_kind: Some(describe_err(err)),
            finished_at: Some(Utc::now()),
            ..Default::default()
        },
    };
    update.account_id = telemetry.account_id.map(|id| id as i64);
    update.session_stickiness_used = Some(telemetry.used_affinity);
    if telemetry.total_attempts > 0 {
        update.total_attempts = Some(i64::from(telemetry.total_attempts));
        update.retry_count = Some(i64::from(telemetry.total_attempts - 1));
    }
    if let Some(reset_after) = telemetry.rate_limited {
        update.is_rate_limited = Some(true);
        update.rate_limit_reset_seconds = Some(reset_after.as_secs() as i64);
    }
    state.providers.logpipeline.update(temp_id, update);
}

fn map_antigravity_error(err: crate::PolluxError) -> GeminiCliError {
    match err {
        crate::PolluxError::UpstreamStatus(status) => GeminiCliError::UpstreamFallbackError {
            status,
            body: String::new(),
        },
        other => other.into(),
    }
}
