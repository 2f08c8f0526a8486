use super::{extract::CodexPreprocess, respond};
use crate::error::CodexError;
use crate::logpipeline::{LogUpdate, NewLogEntry};
use crate::providers::CallTelemetry;
use crate::providers::codex::client::CodexClient;
use crate::server::router::PolluxState;
use axum::{
    Json,
    extract::State,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use pollux_schema::CodexRequestBody;
use pollux_schema::openai::OpenaiModelList;
use std::time::Instant;
use tracing::debug;
use uuid::Uuid;

pub(super) async fn codex_response_handler(
    State(state): State<PolluxState>,
    CodexPreprocess(body, ctx): CodexPreprocess,
) -> Result<Response, CodexError> {
    let codex_body: CodexRequestBody = body.into();

    debug!(
        model = %ctx.model,
        client_stream = ctx.stream,
        upstream_stream = codex_body.stream,
        model_mask = format_args!("0x{:016x}", ctx.model_mask),
        "Incoming Codex request"
    );

    let temp_id = state.providers.logpipeline.insert(NewLogEntry {
        request_id: Uuid::new_v4().to_string(),
        provider: "codex".to_string(),
        account_id: None,
        model: ctx.model.clone(),
        conversation_id: None,
        session_id: None,
        client_ip: None,
        user_agent: None,
        originator: Some("codex".to_string()),
        session_stickiness_used: false,
    });

    let start = Instant::now();
    let telemetry = CallTelemetry::new();
    let caller = CodexClient::new(
        state.providers.codex_cfg.as_ref(),
        state.codex_client.clone(),
        None,
    );

    let result = caller
        .call_codex(
            &state.providers.codex,
            ctx.model.as_str(),
            ctx.model_mask,
            ctx.stream,
            &codex_body,
            &telemetry,
        )
        .await;

    let snapshot = telemetry.snapshot();
    let mut update = match &result {
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
            error_kind: Some(err.to_string()),
            finished_at: Some(Utc::now()),
            ..Default::default()
        },
    };
    update.account_id = snapshot.account_id.map(|id| id as i64);
    update.session_stickiness_used = Some(snapshot.used_affinity);
    if snapshot.total_attempts > 0 {
        update.total_attempts = Some(i64::from(snapshot.total_attempts));
        update.retry_count = Some(i64::from(snapshot.total_attempts - 1));
    }
    if let Some(reset_after) = snapshot.rate_limited {
        update.is_rate_limited = Some(true);
        update.rate_limit_reset_seconds = Some(reset_after.as_secs() as i64);
    }
    state.providers.logpipeline.update(temp_id, update);

    let upstream_resp = result?;

    if ctx.stream {
        Ok(respond::build_stream_response(upstream_resp).into_response())
    } else {
        let (status, body) = respond::build_json_response_from_stream(upstream_resp).await?;
        Ok((status, body).into_response())
    }
}

pub(super) async fn codex_models_handler() -> Result<Json<OpenaiModelList>, CodexError> {
    Ok(Json(super::CODEX_MODEL_LIST.clone()))
}
