use super::{
    extract::{OpenAiChatContext, OpenAiChatPreprocess},
    respond,
};
use crate::error::OpenAiChatError;
use crate::logpipeline::{LogUpdate, NewLogEntry};
use crate::providers::antigravity::{AntigravityClient, AntigravityContext};
use crate::providers::geminicli::{GeminiContext, client::GeminiClient};
use crate::providers::manifest::ProviderKind;
use crate::providers::{CallTelemetry, CallTelemetrySnapshot};
use crate::server::router::PolluxState;
use crate::translate;
use axum::{
    extract::State,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use pollux_schema::gemini::GeminiGenerateContentRequest;
use std::time::Instant;
use uuid::Uuid;

pub async fn chat_completions_handler(
    State(state): State<PolluxState>,
    OpenAiChatPreprocess(body, ctx): OpenAiChatPreprocess,
) -> Result<Response, OpenAiChatError> {
    let (gemini_req, mapper) = translate::openai_chat::to_gemini(&body, &ctx.prep)?;

    let id = format!("chatcmpl-{}", Uuid::new_v4().simple());
    let created = Utc::now().timestamp();
    let request_id = Uuid::new_v4().to_string();

    let temp_id = state.providers.logpipeline.insert(NewLogEntry {
        request_id,
        provider: provider_label(ctx.provider).to_string(),
        account_id: None,
        model: ctx.prep.model.clone(),
        conversation_id: ctx.conversation_id.clone(),
        session_id: None,
        client_ip: None,
        user_agent: None,
        originator: Some("openai_chat".to_string()),
        session_stickiness_used: false,
    });

    let wants_stream = body.stream;
    let start = Instant::now();

    // Fake-streaming dispatches non-streaming upstream, but must not block
    // the response on it: the call (plus its log bookkeeping) runs as a
    // background future, and the handler returns an SSE stream immediately
    // so heartbeats can flush while it's in flight.
    if wants_stream && ctx.prep.fake_streaming {
        let state = state.clone();
        let ctx = ctx.clone();
        let model = ctx.prep.model.clone();
        let mapper_for_fetch = mapper.clone();
        let id_for_fetch = id.clone();
        let fetch = async move {
            let telemetry = CallTelemetry::new();
            let upstream_resp = dispatch(&state, &ctx, &gemini_req, false, &telemetry).await;
            finalize_log(&state, temp_id, start, &upstream_resp, telemetry.snapshot());
            let upstream_resp = upstream_resp?;
            respond::json_response(upstream_resp, &ctx.prep.model, &mapper_for_fetch, created, &id_for_fetch).await
        };
        return Ok(respond::fake_stream_response(fetch, model, id, created).into_response());
    }

    let upstream_stream = wants_stream;
    let telemetry = CallTelemetry::new();
    let result = dispatch(&state, &ctx, &gemini_req, upstream_stream, &telemetry).await;
    finalize_log(&state, temp_id, start, &result, telemetry.snapshot());
    let upstream_resp = result?;

    if !wants_stream {
        let full = respond::json_response(upstream_resp, &ctx.prep.model, &mapper, created, &id).await?;
        return Ok(axum::Json(full).into_response());
    }

    Ok(respond::stream_response(upstream_resp, ctx.prep.model.clone(), mapper, created, id).into_response())
}

fn finalize_log(
    state: &PolluxState,
    temp_id: u64,
    start: Instant,
    result: &Result<reqwest::Response, OpenAiChatError>,
    telemetry: CallTelemetrySnapshot,
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
            error_kind: Some(err.to_string()),
            finished_at: Some(Utc::now()),
            ..Default::default()
        },
    };
    apply_telemetry(&mut update, telemetry);
    state.providers.logpipeline.update(temp_id, update);
}

/// Folds dispatch telemetry (serving account, whether affinity pinned it,
/// attempt count, any rate limit hit) into a log update, regardless of
/// whether the call that produced it ultimately succeeded.
fn apply_telemetry(update: &mut LogUpdate, telemetry: CallTelemetrySnapshot) {
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
}

async fn dispatch(
    state: &PolluxState,
    ctx: &OpenAiChatContext,
    gemini_req: &GeminiGenerateContentRequest,
    stream: bool,
    telemetry: &CallTelemetry,
) -> Result<reqwest::Response, OpenAiChatError> {
    match ctx.provider {
        ProviderKind::Antigravity => {
            let caller = AntigravityClient::new(
                state.providers.antigravity_cfg.as_ref(),
                state.antigravity_client.clone(),
                None,
            );
            let antigravity_ctx = AntigravityContext {
                model: ctx.prep.model.clone(),
                stream,
                path: "/v1/chat/completions".to_string(),
                model_mask: ctx.model_mask,
            };
            caller
                .call_antigravity(&state.providers.antigravity, &antigravity_ctx, gemini_req, telemetry)
                .await
                .map_err(OpenAiChatError::from)
        }
        _ => {
            let caller = GeminiClient::new(state.providers.geminicli_cfg.as_ref(), state.client.clone());
            let gemini_ctx = GeminiContext {
                model: ctx.prep.model.clone(),
                stream,
                path: "/v1/chat/completions".to_string(),
                model_mask: ctx.model_mask,
                conversation_id: ctx.conversation_id.clone(),
            };
            caller
                .call_gemini_cli_with_affinity(
                    &state.providers.geminicli,
                    &gemini_ctx,
                    gemini_req,
                    Some(&state.providers.affinity),
                    telemetry,
                )
                .await
                .map_err(OpenAiChatError::from)
        }
    }
}

fn provider_label(provider: ProviderKind) -> &'static str {
    match provider {
        ProviderKind::GeminiCli => "geminicli",
        ProviderKind::Codex => "codex",
        ProviderKind::Antigravity => "antigravity",
    }
}
