use crate::error::GeminiCliError;
use crate::server::router::PolluxState;
use axum::{
    Json,
    http::StatusCode,
    response::{
        IntoResponse,
        sse::{Event, KeepAlive, Sse},
    },
};
use eventsource_stream::Eventsource;
use futures::Stream;
use pollux_schema::{gemini::GeminiResponseBody, geminicli::GeminiCliResponseBody};
use std::time::Duration;
use tokio_stream::StreamExt;
use tracing::{error, warn};

/// Build JSON response from upstream, sniffing its thought signatures into
/// the shared cache before returning it to the caller.
pub async fn build_json_response(
    upstream_resp: reqwest::Response,
    state: &PolluxState,
) -> Result<(StatusCode, Json<GeminiResponseBody>), GeminiCliError> {
    let status = upstream_resp.status();
    let response_body = transform_nostream(upstream_resp).await?;

    let mut sniffer = state.providers.antigravity_thoughtsig.build_sniffer();
    state
        .providers
        .antigravity_thoughtsig
        .sniff_response(&response_body, &mut sniffer);

    Ok((status, Json(response_body)))
}

/// Build SSE stream response, sniffing each chunk's thought signatures into
/// the shared cache as it passes through.
pub fn build_stream_response(
    upstream_resp: reqwest::Response,
    state: PolluxState,
) -> impl IntoResponse {
    let raw_stream = upstream_resp.bytes_stream().eventsource();
    let timed_stream = transform_stream(raw_stream, state)
        .timeout(Duration::from_secs(60))
        .map(|item| match item {
            Ok(Ok(event)) => Ok(event),
            Ok(Err(e)) => Err(GeminiCliError::StreamProtocolError(e.to_string())),
            Err(_) => {
                error!("Upstream Antigravity SSE stream timed out (idle > 60s)");
                Err(GeminiCliError::StreamProtocolError(
                    "Stream idle timeout".to_string(),
                ))
            }
        });

    Sse::new(timed_stream).keep_alive(KeepAlive::default())
}

/// Convert upstream SSE events carrying CLI envelopes into SSE `Event`s for
/// clients, sniffing each chunk's thought signatures along the way.
///
/// Threads the sniffer through `scan` rather than `try_filter_map` because the
/// latter would need to move the same captured sniffer into a fresh `async
/// move` block on every poll.
pub fn transform_stream<I, E>(s: I, state: PolluxState) -> impl Stream<Item = Result<Event, E>>
where
    I: Stream<Item = Result<eventsource_stream::Event, E>>,
{
    let sniffer = state.providers.antigravity_thoughtsig.build_sniffer();

    let scanned = futures::StreamExt::scan(s, sniffer, move |sniffer, item| {
        let state = state.clone();
        async move {
            let upstream_event = match item {
                Err(e) => return Some(Some(Err(e))),
                Ok(event) => event,
            };

            if upstream_event.data.is_empty() {
                return Some(None);
            }

            let Ok(cli_resp) = serde_json::from_str::<GeminiCliResponseBody>(&upstream_event.data)
            else {
                warn!(
                    "Skipping invalid SSE JSON data: {:.50}...",
                    upstream_event.data
                );
                return Some(None);
            };

            let gemini_resp: GeminiResponseBody = cli_resp.into();
            state
                .providers
                .antigravity_thoughtsig
                .sniff_response(&gemini_resp, sniffer);

            match Event::default().json_data(gemini_resp) {
                Ok(ev) => Some(Some(Ok(ev))),
                Err(e) => {
                    warn!("Failed to serialize GeminiResponse: {}", e);
                    Some(None)
                }
            }
        }
    });

    futures::StreamExt::filter_map(scanned, futures::future::ready)
}

/// Convert non-streaming CLI envelope into `GeminiResponse`.
pub async fn transform_nostream(
    upstream_resp: reqwest::Response,
) -> Result<GeminiResponseBody, GeminiCliError> {
    let envelope = upstream_resp.json::<GeminiCliResponseBody>().await?;
    Ok(envelope.into())
}
