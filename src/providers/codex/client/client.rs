use crate::config::CodexResolvedConfig;
use crate::dispatch;
use crate::error::{CodexError, IsRetryable};
use crate::pool::{InFlightExclusions, QuotaInfo};
use crate::providers::codex::CodexActorHandle;
use crate::providers::manifest::CodexLease;
use crate::providers::provider_endpoints::ProviderEndpoints;
use crate::providers::upstream_retry::post_json_with_retry;
use crate::providers::{ActionForError, CallTelemetry, policy::classify_upstream_error};
use crate::utils::logging::with_pretty_json_debug;
use backon::{ExponentialBuilder, Retryable};
use pollux_schema::{CodexErrorBody, CodexRequestBody};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::info;
use url::Url;

/// Minimal passthrough client for Codex upstream.
///
/// Notes:
/// - Schema conversion is handled by the router; this client only serializes and forwards JSON.
/// - OAuth/token refresh is intentionally left as future work (placeholders in config).
pub(crate) struct CodexClient {
    client: reqwest::Client,
    retry_policy: ExponentialBuilder,
    endpoints: ProviderEndpoints,
}

impl CodexClient {
    pub(crate) fn new(
        _cfg: &CodexResolvedConfig,
        client: reqwest::Client,
        base_url: Option<Url>,
    ) -> Self {
        let retry_policy = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_millis(300))
            .with_max_times(dispatch::MAX_RETRIES as usize)
            .with_jitter();
        let endpoints = base_url
            .map(Self::endpoints_for_base)
            .unwrap_or_else(Self::default_endpoints);

        Self {
            client,
            retry_policy,
            endpoints,
        }
    }

    fn default_endpoints() -> ProviderEndpoints {
        Self::endpoints_for_base(
            Url::parse("https://chatgpt.com").expect("invalid fixed Codex base URL"),
        )
    }

    fn endpoints_for_base(base: Url) -> ProviderEndpoints {
        ProviderEndpoints::new(
            base,
            "/backend-api/codex/responses",
            None,
            "/backend-api/codex/responses",
            None,
        )
    }

    pub(crate) async fn call_codex(
        &self,
        handle: &CodexActorHandle,
        model: &str,
        model_mask: u64,
        client_stream: bool,
        body: &CodexRequestBody,
        telemetry: &CallTelemetry,
    ) -> Result<reqwest::Response, CodexError> {
        let handle = handle.clone();
        let client = self.client.clone();
        let endpoints = self.endpoints.clone();
        let body = body.clone();
        let model = model.to_string();
        let exclusions = Arc::new(Mutex::new(InFlightExclusions::default()));
        let attempt = Arc::new(AtomicU32::new(1));
        let telemetry = telemetry.clone();

        let op = {
            let attempt = attempt.clone();
            let telemetry = telemetry.clone();
            move || {
                let handle = handle.clone();
                let client = client.clone();
                let endpoints = endpoints.clone();
                let body = body.clone();
                let model = model.clone();
                let exclusions = exclusions.clone();
                let attempt = attempt.clone();
                let telemetry = telemetry.clone();
                async move {
                    let start = Instant::now();
                    let tried = exclusions.lock().expect("exclusions mutex poisoned").clone();
                    let lease = handle
                        .get_credential(model_mask, &tried)
                        .await?
                        .ok_or(CodexError::NoAvailableCredential)?;

                    // Codex has no conversation-affinity concept.
                    telemetry.record_attempt(lease.id, false, attempt.load(Ordering::Relaxed));

                    let actor_took = start.elapsed();
                    info!(
                        channel = "codex",
                        lease.id = lease.id,
                        lease.waited_us = actor_took.as_micros() as u64,
                        req.model = %model,
                        req.stream = client_stream,

                        "[Codex] [ID: {}] [{:?}] Post responses -> {}",
                        lease.id,
                        actor_took,
                        model
                    );

                    with_pretty_json_debug(&body, |pretty_payload| {
                        tracing::debug!(
                            channel = "codex",
                            lease.id = lease.id,
                            req.model = %model,
                            req.client_stream = client_stream,
                            req.upstream_stream = body.stream,
                            body = %pretty_payload,
                            "[Codex] Prepared upstream payload"
                        );
                    });

                    let resp = post_json_with_retry(
                        "Codex",
                        &client,
                        endpoints.select(client_stream),
                        Some(Self::headers(&lease)),
                        &body,
                    )
                    .await?;

                    if let Some(info) = QuotaInfo::from_headers(resp.headers()) {
                        handle.report_quota(lease.id, info).await;
                    }

                    if resp.status().is_success() {
                        return Ok(resp);
                    }

                    exclusions
                        .lock()
                        .expect("exclusions mutex poisoned")
                        .insert(lease.id);

                    let status = resp.status();
                    let had_quota_headers = QuotaInfo::from_headers(resp.headers()).is_some();
                    let (action, final_error) = classify_upstream_error(
                        resp,
                        |json: CodexErrorBody| CodexError::UpstreamMappedError { status, body: json },
                        |status, body| CodexError::UpstreamFallbackError { status, body },
                    )
                    .await;

                    match &action {
                        ActionForError::RateLimit(duration) => {
                            handle
                                .report_rate_limit(lease.id, model_mask, *duration)
                                .await;
                            if !had_quota_headers {
                                handle
                                    .mark_quota_exhausted(lease.id, duration.as_secs().max(1))
                                    .await;
                            }
                            telemetry.record_rate_limit(*duration);
                        }
                        ActionForError::Ban => {
                            handle.report_baned(lease.id).await;
                        }
                        ActionForError::ModelUnsupported => {
                            handle.report_model_unsupported(lease.id, model_mask).await;
                        }
                        ActionForError::Invalid => {
                            handle.report_invalid(lease.id).await;
                        }
                        ActionForError::None => {
                            // Do nothing
                        }
                    }

                    match &final_error {
                        CodexError::UpstreamMappedError { status, .. } => {
                            tracing::warn!(
                                lease_id = lease.id,
                                model = %model,
                                status = %status,
                                action = ?action,
                                "[Codex] Upstream mapped error"
                            );
                        }
                        CodexError::UpstreamFallbackError { status, .. } => {
                            tracing::warn!(
                                lease_id = lease.id,
                                model = %model,
                                status = %status,
                                action = ?action,
                                "[Codex] Upstream fallback error"
                            );
                        }
                        CodexError::Reqwest(error) => {
                            tracing::warn!(
                                lease_id = lease.id,
                                model = %model,
                                status = ?error.status(),
                                action = ?action,
                                "[Codex] Upstream reqwest error"
                            );
                        }
                        _ => {
                            tracing::warn!(
                                lease_id = lease.id,
                                model = %model,
                                status = "N/A",
                                action = ?action,
                                "[Codex] Upstream other error"
                            );
                        }
                    }

                    Err(final_error)
                }
            }
        };

        op.retry(&self.retry_policy)
            .when(move |err: &CodexError| {
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
                tracing::warn!("Codex retrying after error {} in {:?}", err, dur);
            })
            .await
    }

    fn headers(lease: &CodexLease) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", lease.access_token))
                .expect("invalid fixed auth header value"),
        );
        headers.insert(
            "Chatgpt-Account-Id",
            HeaderValue::from_str(lease.account_id.as_str())
                .expect("invalid fixed account id header value"),
        );
        headers
    }
}
