use crate::config::GeminiCliResolvedConfig;
use crate::dispatch;
use crate::error::{GeminiCliError, GeminiCliErrorBody, IsRetryable};
use crate::pool::{ConversationAffinity, InFlightExclusions};
use crate::providers::CallTelemetry;
use crate::providers::geminicli::{GeminiCliActorHandle, GeminiContext};
use crate::providers::policy::classify_upstream_error;
use backon::{ExponentialBuilder, Retryable};
use pollux_schema::gemini::GeminiGenerateContentRequest;
use serde::Serialize;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use super::api::GeminiApi;

pub struct GeminiClient {
    client: reqwest::Client,
    retry_policy: ExponentialBuilder,
}

#[derive(Clone, Serialize)]
struct CliPostFormatBody {
    model: String,
    project: String,
    request: GeminiGenerateContentRequest,
}

impl GeminiClient {
    pub fn new(_cfg: &GeminiCliResolvedConfig, client: reqwest::Client) -> Self {
        let retry_policy = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_millis(300))
            .with_max_times(dispatch::MAX_RETRIES as usize)
            .with_jitter();
        Self {
            client,
            retry_policy,
        }
    }

    pub async fn call_gemini_cli(
        &self,
        handle: &GeminiCliActorHandle,
        ctx: &GeminiContext,
        body: &GeminiGenerateContentRequest,
        telemetry: &CallTelemetry,
    ) -> Result<reqwest::Response, GeminiCliError> {
        self.call_gemini_cli_with_affinity(handle, ctx, body, None, telemetry)
            .await
    }

    /// Same as `call_gemini_cli`, but consults `affinity` for a sticky
    /// credential keyed by `ctx.conversation_id` before falling into plain
    /// scoring, and records the credential that ends up serving the request
    /// back into `affinity` so the next call on the same conversation sticks.
    ///
    /// `telemetry` is updated in place with the credential id, whether
    /// affinity pinned it, the attempt count, and any rate limit hit, as the
    /// retry loop runs -- readable by the caller once this resolves, whether
    /// it resolves to `Ok` or `Err`.
    pub async fn call_gemini_cli_with_affinity(
        &self,
        handle: &GeminiCliActorHandle,
        ctx: &GeminiContext,
        body: &GeminiGenerateContentRequest,
        affinity: Option<&ConversationAffinity>,
        telemetry: &CallTelemetry,
    ) -> Result<reqwest::Response, GeminiCliError> {
        let base_payload = CliPostFormatBody {
            model: ctx.model.clone(),
            project: String::new(),
            request: body.clone(),
        };

        let affinity_key = ctx.conversation_id.clone();
        let affinity_hint = affinity
            .zip(affinity_key.as_ref())
            .and_then(|(cache, key)| cache.get(key));
        let affinity = affinity.cloned();

        let handle = handle.clone();
        let client = self.client.clone();
        let stream = ctx.stream;
        let retry_policy_inner = self.retry_policy;
        let exclusions = Arc::new(Mutex::new(InFlightExclusions::default()));
        let attempt = Arc::new(AtomicU32::new(1));
        let telemetry = telemetry.clone();

        let op = {
            let base_payload = base_payload.clone();
            let affinity = affinity.clone();
            let affinity_key = affinity_key.clone();
            let attempt = attempt.clone();
            let telemetry = telemetry.clone();
            move || {
                let handle = handle.clone();
                let client = client.clone();
                let base_payload = base_payload.clone();
                let exclusions = exclusions.clone();
                let affinity = affinity.clone();
                let affinity_key = affinity_key.clone();
                let attempt = attempt.clone();
                let telemetry = telemetry.clone();
                async move {
                    let start = Instant::now();
                    let tried = exclusions.lock().expect("exclusions mutex poisoned").clone();
                    let assigned = handle
                        .get_credential_with_affinity(ctx.model_mask, &tried, affinity_hint)
                        .await?
                        .ok_or(GeminiCliError::NoAvailableCredential)?;

                    telemetry.record_attempt(
                        assigned.id,
                        assigned.used_affinity,
                        attempt.load(Ordering::Relaxed),
                    );

                    if let (Some(cache), Some(key)) = (&affinity, &affinity_key) {
                        cache.record(key.clone(), assigned.id);
                    }

                    let actor_took = start.elapsed();
                    info!(
                        channel = "geminicli",
                        lease.id = assigned.id,
                        lease.waited_us = actor_took.as_micros() as u64,
                        req.model = %ctx.model,
                        req.stream = stream,

                        "[GeminiCli] [ID: {}] [{:?}] Post responses -> {}",
                        assigned.id,
                        actor_took,
                        ctx.model
                    );

                    let mut payload = base_payload.clone();
                    payload.project = assigned.project_id.clone();

                    let resp = GeminiApi::try_post_cli(
                        client.clone(),
                        assigned.access_token,
                        stream,
                        retry_policy_inner,
                        &payload,
                    )
                    .await?;
                    if !resp.status().is_success() {
                        let status = resp.status();
                        exclusions
                            .lock()
                            .expect("exclusions mutex poisoned")
                            .insert(assigned.id);

                        let (action, final_error) = classify_upstream_error(
                            resp,
                            |json: GeminiCliErrorBody| GeminiCliError::UpstreamMappedError {
                                status,
                                body: json,
                            },
                            |status, body| GeminiCliError::UpstreamFallbackError { status, body },
                        )
                        .await;

                        match &action {
                            crate::providers::ActionForError::RateLimit(duration) => {
                                handle
                                    .report_rate_limit(assigned.id, ctx.model_mask, *duration)
                                    .await;
                                handle
                                    .mark_quota_exhausted(assigned.id, duration.as_secs().max(1))
                                    .await;
                                telemetry.record_rate_limit(*duration);
                                info!(
                                    "Project: {}, rate limited, retry in {:?}",
                                    assigned.project_id, duration
                                );
                            }
                            crate::providers::ActionForError::Ban => {
                                handle.report_baned(assigned.id).await;
                                info!("Project: {}, banned", assigned.project_id);
                            }
                            crate::providers::ActionForError::ModelUnsupported => {
                                handle
                                    .report_model_unsupported(assigned.id, ctx.model_mask)
                                    .await;
                                info!("Project: {}, model unsupported", assigned.project_id);
                            }
                            crate::providers::ActionForError::Invalid => {
                                handle.report_invalid(assigned.id).await;
                                info!("Project: {}, invalid", assigned.project_id);
                            }
                            crate::providers::ActionForError::None => {}
                        }

                        match &final_error {
                            GeminiCliError::UpstreamMappedError { status, .. } => {
                                warn!(
                                    lease_id = assigned.id,
                                    model = %ctx.model,
                                    status = %status,
                                    action = ?action,
                                    "[GeminiCli] Upstream mapped error"
                                );
                            }
                            GeminiCliError::UpstreamFallbackError { status, .. } => {
                                warn!(
                                    lease_id = assigned.id,
                                    model = %ctx.model,
                                    status = %status,
                                    action = ?action,
                                    "[GeminiCli] Upstream fallback error"
                                );
                            }
                            GeminiCliError::Reqwest(error) => {
                                warn!(
                                    lease_id = assigned.id,
                                    model = %ctx.model,
                                    status = ?error.status(),
                                    action = ?action,
                                    "[GeminiCli] Upstream reqwest error"
                                );
                            }
                            _ => {
                                warn!(
                                    lease_id = assigned.id,
                                    model = %ctx.model,
                                    status = "N/A",
                                    action = ?action,
                                    "[GeminiCli] Upstream other error"
                                );
                            }
                        }

                        return Err(final_error);
                    }
                    Ok(resp)
                }
            }
        };

        op.retry(&self.retry_policy)
            .when(move |err: &GeminiCliError| {
                let cur = attempt.load(Ordering::Relaxed);
                match dispatch::next_attempt(cur, err.is_retryable()) {
                    Some(next) => {
                        attempt.store(next, Ordering::Relaxed);
                        true
                    }
                    None => false,
                }
            })
            .notify(|err, dur: Duration| {
                error!(
                    "[GeminiCLI] Upstream Error {} retry after {:?}",
                    err.to_string(),
                    dur
                );
            })
            .await
    }
}
