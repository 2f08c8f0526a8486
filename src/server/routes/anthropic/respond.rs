use crate::error::{AnthropicError, GeminiCliError};
use crate::translate::{self, ToolNameMapper, fake_stream};
use axum::response::{
    IntoResponse,
    sse::{Event, KeepAlive, Sse},
};
use eventsource_stream::Eventsource;
use futures::{StreamExt, stream};
use pollux_schema::anthropic::{AnthropicResponse, AnthropicStreamEvent, ContentBlock, ContentDelta, MessageDeltaPayload};
use pollux_schema::gemini::GeminiResponseBody;
use pollux_schema::geminicli::GeminiCliResponseBody;
use std::future::Future;
use std::time::Duration;
use tokio_stream::StreamExt as _;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{error, warn};

/// Fetch and translate a non-streaming upstream response into an
/// `AnthropicResponse`.
pub async fn json_response(
    upstream_resp: reqwest::Response,
    model: &str,
    mapper: &ToolNameMapper,
    id: &str,
) -> Result<AnthropicResponse, AnthropicError> {
    let envelope = upstream_resp
        .json::<GeminiCliResponseBody>()
        .await
        .map_err(GeminiCliError::from)?;
    let gemini_resp: GeminiResponseBody = envelope.into();
    Ok(translate::anthropic::from_gemini_response(&gemini_resp, model, mapper, id))
}

fn event_for(ev: AnthropicStreamEvent) -> Result<Event, AnthropicError> {
    let name = match &ev {
        AnthropicStreamEvent::MessageStart { .. } => "message_start",
        AnthropicStreamEvent::ContentBlockStart { .. } => "content_block_start",
        AnthropicStreamEvent::ContentBlockDelta { .. } => "content_block_delta",
        AnthropicStreamEvent::ContentBlockStop { .. } => "content_block_stop",
        AnthropicStreamEvent::MessageDelta { .. } => "message_delta",
        AnthropicStreamEvent::MessageStop => "message_stop",
        AnthropicStreamEvent::Ping => "ping",
        AnthropicStreamEvent::Error { .. } => "error",
    };
    Event::default()
        .event(name)
        .json_data(ev)
        .map_err(|e| AnthropicError::Translate(crate::translate::TranslateError::InvalidContent(e.to_string())))
}

/// Translate a genuine upstream SSE stream into the `/v1/messages` event
/// sequence, driving one [`translate::anthropic::StreamTranslator`] across
/// every upstream chunk.
pub fn stream_response(
    upstream_resp: reqwest::Response,
    model: String,
    mapper: ToolNameMapper,
    id: String,
    input_tokens: u32,
) -> impl IntoResponse {
    let mut translator = translate::anthropic::StreamTranslator::new();
    let start_event = translator.start(&id, &model, input_tokens);

    let raw_stream = upstream_resp.bytes_stream().eventsource();
    let body_events = raw_stream.filter_map(move |item| {
        let mapper = mapper.clone();
        let event = match item {
            Ok(event) => event,
            Err(e) => {
                return futures::future::ready(Some(vec![AnthropicStreamEvent::Error {
                    error: serde_json::json!({"type": "api_error", "message": e.to_string()}),
                }]));
            }
        };
        if event.data.is_empty() || event.data == "[DONE]" {
            return futures::future::ready(None);
        }
        let Ok(cli_resp) = serde_json::from_str::<GeminiCliResponseBody>(&event.data) else {
            warn!("Skipping invalid Messages SSE JSON data: {:.50}...", event.data);
            return futures::future::ready(None);
        };
        let gemini_resp: GeminiResponseBody = cli_resp.into();
        let finish_reason = gemini_resp.candidates.first().and_then(|c| c.finish_reason.clone());
        let usage = gemini_resp
            .usageMetadata
            .as_ref()
            .map(usage_from_value)
            .unwrap_or_default();

        let mut events = translator.push_chunk(&gemini_resp, &mapper);
        if let Some(reason) = finish_reason {
            events.extend(translator.finish(Some(&reason), usage));
        }
        futures::future::ready(Some(events))
    });

    let all_events = stream::once(async move { vec![start_event] })
        .chain(body_events)
        .flat_map(stream::iter);

    let translated = tokio_stream::StreamExt::timeout(all_events.map(event_for), Duration::from_secs(60)).map(
        |item| match item {
            Ok(inner) => inner,
            Err(_) => {
                error!("Upstream Messages SSE stream timed out (idle > 60s)");
                Err(AnthropicError::Upstream(GeminiCliError::StreamProtocolError(
                    "Stream idle timeout".to_string(),
                )))
            }
        },
    );

    Sse::new(translated).keep_alive(KeepAlive::default())
}

fn usage_from_value(metadata: &serde_json::Value) -> pollux_schema::anthropic::Usage {
    pollux_schema::anthropic::Usage {
        input_tokens: metadata
            .get("promptTokenCount")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(0) as u32,
        output_tokens: metadata
            .get("candidatesTokenCount")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(0) as u32,
        cache_creation_input_tokens: None,
        cache_read_input_tokens: None,
    }
}

/// Heartbeat-while-fetching `/v1/messages` SSE stream for models carrying
/// the `假流式/` prefix: `fetch` runs the real (non-streaming) upstream call
/// and its own log bookkeeping; while it is in flight this flushes a `ping`
/// event every [`fake_stream::HEARTBEAT_INTERVAL`] so the connection stays
/// alive for a client that insisted on `stream: true`. Once `fetch`
/// resolves, the full answer is emitted as a single content block (tool
/// calls, which are already atomic, pass through unchanged) and the stream
/// ends.
pub fn fake_stream_response<F>(fetch: F, model: String, id: String, input_tokens: u32) -> impl IntoResponse
where
    F: Future<Output = Result<AnthropicResponse, AnthropicError>> + Send + 'static,
{
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

    tokio::spawn(async move {
        let translator = translate::anthropic::StreamTranslator::new();
        if tx.send(event_for(translator.start(&id, &model, input_tokens))).is_err() {
            return;
        }

        let mut ticker = tokio::time::interval(fake_stream::HEARTBEAT_INTERVAL);
        ticker.tick().await; // first tick fires immediately; the message_start above already covers it

        tokio::pin!(fetch);
        let result = loop {
            tokio::select! {
                res = &mut fetch => break res,
                _ = ticker.tick() => {
                    if tx.send(event_for(AnthropicStreamEvent::Ping)).is_err() {
                        return;
                    }
                }
            }
        };

        let full = match result {
            Ok(full) => full,
            Err(e) => {
                let _ = tx.send(Err(e));
                return;
            }
        };

        let has_tool_use = full.content.iter().any(|b| matches!(b, ContentBlock::ToolUse { .. }));
        let blocks: Vec<ContentBlock> = if has_tool_use {
            full.content
        } else {
            let text = joined_text(&full.content);
            let thinking = joined_thinking(&full.content);
            let resolved = fake_stream::resolve_content(
                Some(text.as_str()).filter(|s| !s.is_empty()),
                Some(thinking.as_str()).filter(|s| !s.is_empty()),
            );
            vec![ContentBlock::Text {
                text: resolved,
                extra: Default::default(),
            }]
        };

        for (index, block) in blocks.into_iter().enumerate() {
            for event in block_events(index as u32, block) {
                if tx.send(event_for(event)).is_err() {
                    return;
                }
            }
        }

        let finish = [
            AnthropicStreamEvent::MessageDelta {
                delta: MessageDeltaPayload {
                    stop_reason: full.stop_reason,
                    stop_sequence: full.stop_sequence,
                },
                usage: full.usage,
            },
            AnthropicStreamEvent::MessageStop,
        ];
        for event in finish {
            if tx.send(event_for(event)).is_err() {
                return;
            }
        }
    });

    Sse::new(UnboundedReceiverStream::new(rx)).keep_alive(KeepAlive::default())
}

fn joined_text(content: &[ContentBlock]) -> String {
    content
        .iter()
        .filter_map(|b| match b {
            ContentBlock::Text { text, .. } => Some(text.as_str()),
            _ => None,
        })
        .collect()
}

fn joined_thinking(content: &[ContentBlock]) -> String {
    content
        .iter()
        .filter_map(|b| match b {
            ContentBlock::Thinking { thinking, .. } => Some(thinking.as_str()),
            _ => None,
        })
        .collect()
}

/// A single already-complete content block's start/delta/stop event triple.
fn block_events(index: u32, block: ContentBlock) -> Vec<AnthropicStreamEvent> {
    match block {
        ContentBlock::Text { text, .. } => vec![
            AnthropicStreamEvent::ContentBlockStart {
                index,
                content_block: ContentBlock::Text {
                    text: String::new(),
                    extra: Default::default(),
                },
            },
            AnthropicStreamEvent::ContentBlockDelta {
                index,
                delta: ContentDelta::TextDelta { text },
            },
            AnthropicStreamEvent::ContentBlockStop { index },
        ],
        ContentBlock::Thinking { thinking, signature } => {
            let mut events = vec![
                AnthropicStreamEvent::ContentBlockStart {
                    index,
                    content_block: ContentBlock::Thinking {
                        thinking: String::new(),
                        signature: None,
                    },
                },
                AnthropicStreamEvent::ContentBlockDelta {
                    index,
                    delta: ContentDelta::ThinkingDelta { thinking },
                },
            ];
            if let Some(signature) = signature {
                events.push(AnthropicStreamEvent::ContentBlockDelta {
                    index,
                    delta: ContentDelta::SignatureDelta { signature },
                });
            }
            events.push(AnthropicStreamEvent::ContentBlockStop { index });
            events
        }
        ContentBlock::ToolUse { id, name, input } => vec![
            AnthropicStreamEvent::ContentBlockStart {
                index,
                content_block: ContentBlock::ToolUse {
                    id,
                    name,
                    input: serde_json::Value::Null,
                },
            },
            AnthropicStreamEvent::ContentBlockDelta {
                index,
                delta: ContentDelta::InputJsonDelta {
                    partial_json: input.to_string(),
                },
            },
            AnthropicStreamEvent::ContentBlockStop { index },
        ],
        // Assistant responses never carry these block kinds; nothing to stream.
        ContentBlock::Image { .. } | ContentBlock::RedactedThinking { .. } | ContentBlock::ToolResult { .. } => vec![],
    }
}
