use super::{
    extract::AntigravityPreprocess,
    respond::{build_json_response, build_stream_response},
};
use crate::error::GeminiCliError;
use crate::logpipeline::{LogUpdate, NewLogEntry};
use crate::providers::antigravity::AntigravityClient;
use crate::providers::CallTelemetry;
use crate::server::router::PolluxState;
use axum::{
    Json,
    extract::State,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use pollux_schema::gemini::GeminiModelList;
use std::time::Instant;
use uuid::Uuid;

pub async fn antigravity_proxy_handler(
    State(state): State<PolluxState>,
    AntigravityPreprocess(body, ctx): AntigravityPreprocess,
) -> Result<Response, GeminiCliError> {
    let temp_id = state.providers.logpipeline.insert(NewLogEntry {
        request_id: Uuid::new_v4().to_string(),
        provider: "antigravity".to_string(),
        account_id: None,
        model: ctx.model.clone(),
        conversation_id: None,
        session_id: None,
        client_ip: None,
        user_agent: None,
        originator: Some("antigravity".to_string()),
        session_stickiness_used: false,
    });

    let start = Instant::now();
    let telemetry = CallTelemetry::new();
    let caller = AntigravityClient::new(
        state.providers.antigravity_cfg.as_ref(),
        state.antigravity_client.clone(),
        None,
    );

    let result = caller
        .call_antigravity(&state.providers.antigravity, &ctx, &body, &telemetry)
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

    let upstream_resp = result.map_err(map_antigravity_error)?;

    if ctx.stream {
        Ok(build_stream_response(upstream_resp, state.clone()).into_response())
    } else {
        Ok(build_json_response(upstream_resp, &state)
            .await?
            .into_response())
    }
}

pub async fn antigravity_models_handler(
    State(state): State<PolluxState>,
) -> Result<Json<GeminiModelList>, GeminiCliError> {
    Ok(Json(GeminiModelList::from_model_names(
        state.providers.antigravity_cfg.model_list.iter().cloned(),
    )))
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
