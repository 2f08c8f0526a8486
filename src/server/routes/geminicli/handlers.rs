use super::{
    extract::GeminiPreprocess,
    respond::{build_json_response, build_stream_response},
};
use crate::error::GeminiCliError;
use crate::logpipeline::{LogUpdate, NewLogEntry};
use crate::providers::geminicli::client::GeminiClient;
use crate::providers::CallTelemetry;
use crate::server::router::PolluxState;
use axum::{
    Json,
    extract::State,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use pollux_schema::{gemini::GeminiModelList, openai::OpenaiModelList};
use std::time::Instant;
use uuid::Uuid;

pub async fn gemini_cli_handler(
    State(state): State<PolluxState>,
    GeminiPreprocess(body, ctx): GeminiPreprocess,
) -> Result<Response, GeminiCliError> {
    let temp_id = state.providers.logpipeline.insert(NewLogEntry {
        request_id: Uuid::new_v4().to_string(),
        provider: "geminicli".to_string(),
        account_id: None,
        model: ctx.model.clone(),
        conversation_id: ctx.conversation_id.clone(),
        session_id: None,
        client_ip: None,
        user_agent: None,
        originator: Some("geminicli".to_string()),
        session_stickiness_used: false,
    });

    let start = Instant::now();
    let telemetry = CallTelemetry::new();
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
        Ok(build_stream_response(upstream_resp).into_response())
    } else {
        Ok(build_json_response(upstream_resp).await.into_response())
    }
}

/// Fetch Gemini native model list via API key and proxy through Pollux.
pub async fn gemini_models_handler() -> Result<Json<GeminiModelList>, GeminiCliError> {
    Ok(Json((super::GEMINI_MODEL_LIST).clone()))
}

/// Fetch Gemini models in OpenAI-compatible list format.
pub async fn gemini_openai_models_handler() -> Result<Json<OpenaiModelList>, GeminiCliError> {
    Ok(Json((super::GEMINI_OPENAI_MODEL_LIST).clone()))
}
