use crate::error::{GeminiCliError, OpenAiChatError};
use crate::translate::{self, ToolNameMapper, fake_stream};
use axum::response::{
    IntoResponse,
    sse::{Event, KeepAlive, Sse},
};
use eventsource_stream::Eventsource;
use futures::StreamExt;
use pollux_schema::gemini::GeminiResponseBody;
use pollux_schema::geminicli::GeminiCliResponseBody;
use pollux_schema::openai_chat::{ChatCompletionChunk, ChatCompletionResponse, ChoiceDelta, ChunkChoice};
use std::future::Future;
use std::time::Duration;
use tokio_stream::StreamExt as _;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{error, warn};

/// Fetch and translate a non-streaming upstream response into the Chat
/// Completions JSON body.
pub async fn json_response(
    upstream_resp: reqwest::Response,
    model: &str,
    mapper: &ToolNameMapper,
    created: i64,
    id: &str,
) -> Result<ChatCompletionResponse, OpenAiChatError> {
    let envelope = upstream_resp
        .json::<GeminiCliResponseBody>()
        .await
        .map_err(GeminiCliError::from)?;
    let gemini_resp: GeminiResponseBody = envelope.into();
    Ok(translate::openai_chat::from_gemini_response(
        &gemini_resp,
        model,
        mapper,
        created,
        id,
    ))
}

/// Translate a genuine upstream SSE stream into `chat.completion.chunk`s.
pub fn stream_response(
    upstream_resp: reqwest::Response,
    model: String,
    mapper: ToolNameMapper,
    created: i64,
    id: String,
) -> impl IntoResponse {
    let raw_stream = upstream_resp.bytes_stream().eventsource();
    let translated = raw_stream
        .filter_map(move |item| {
            let model = model.clone();
            let mapper = mapper.clone();
            let id = id.clone();
            async move {
                let event = match item {
                    Ok(event) => event,
                    Err(e) => {
                        return Some(Err(OpenAiChatError::Upstream(
                            GeminiCliError::StreamProtocolError(e.to_string()),
                        )));
                    }
                };
                if event.data.is_empty() || event.data == "[DONE]" {
                    return None;
                }

                let Ok(cli_resp) = serde_json::from_str::<GeminiCliResponseBody>(&event.data) else {
                    warn!("Skipping invalid Chat Completions SSE JSON data: {:.50}...", event.data);
                    return None;
                };
                let gemini_resp: GeminiResponseBody = cli_resp.into();
                let chunk =
                    translate::openai_chat::chunk_from_gemini_response(&gemini_resp, &model, &mapper, created, &id);
                match Event::default().json_data(chunk) {
                    Ok(ev) => Some(Ok(ev)),
                    Err(e) => {
                        warn!("Failed to serialize ChatCompletionChunk: {}", e);
                        None
                    }
                }
            }
        })
        .timeout(Duration::from_secs(60))
        .map(|item| match item {
            Ok(inner) => inner,
            Err(_) => {
                error!("Upstream Chat Completions SSE stream timed out (idle > 60s)");
                Err(OpenAiChatError::Upstream(GeminiCliError::StreamProtocolError(
                    "Stream idle timeout".to_string(),
                )))
            }
        });

    Sse::new(translated).keep_alive(KeepAlive::default())
}

fn heartbeat_chunk(id: &str, model: &str, created: i64) -> ChatCompletionChunk {
    ChatCompletionChunk {
        id: id.to_string(),
        object: "chat.completion.chunk".to_string(),
        created,
        model: model.to_string(),
        choices: vec![ChunkChoice {
            index: 0,
            delta: ChoiceDelta {
                role: Some("assistant".to_string()),
                content: Some(String::new()),
                ..Default::default()
            },
            finish_reason: None,
        }],
        usage: None,
    }
}

fn chunk_event(chunk: ChatCompletionChunk) -> Result<Event, OpenAiChatError> {
    Event::default()
        .json_data(chunk)
        .map_err(|e| OpenAiChatError::Translate(crate::translate::TranslateError::InvalidContent(e.to_string())))
}

/// Heartbeat-while-fetching SSE stream for callers whose model carries the
/// `假流式/` prefix: `fetch` runs the real (non-streaming) upstream call and
/// its own log bookkeeping; while it is in flight this flushes an empty
/// `chat.completion.chunk` heartbeat every [`fake_stream::HEARTBEAT_INTERVAL`]
/// so the connection stays alive for a client that insisted on
/// `stream: true`. Once `fetch` resolves, the full answer is emitted as a
/// single content chunk and the stream ends.
pub fn fake_stream_response<F>(fetch: F, model: String, id: String, created: i64) -> impl IntoResponse
where
    F: Future<Output = Result<ChatCompletionResponse, OpenAiChatError>> + Send + 'static,
{
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

    tokio::spawn(async move {
        if tx.send(chunk_event(heartbeat_chunk(&id, &model, created))).is_err() {
            return;
        }

        let mut ticker = tokio::time::interval(fake_stream::HEARTBEAT_INTERVAL);
        ticker.tick().await; // first tick fires immediately; the heartbeat above already covers it

        tokio::pin!(fetch);
        let result = loop {
            tokio::select! {
                res = &mut fetch => break res,
                _ = ticker.tick() => {
                    if tx.send(chunk_event(heartbeat_chunk(&id, &model, created))).is_err() {
                        return;
                    }
                }
            }
        };

        match result {
            Ok(full) => {
                let choice = full.choices.into_iter().next();
                let (content, reasoning, tool_calls, finish_reason) = match choice {
                    Some(c) => (c.message.content, c.message.reasoning_content, c.message.tool_calls, c.finish_reason),
                    None => (None, None, None, None),
                };
                let content = fake_stream::resolve_content(content.as_deref(), reasoning.as_deref());

                let chunk = ChatCompletionChunk {
                    id,
                    object: "chat.completion.chunk".to_string(),
                    created,
                    model,
                    choices: vec![ChunkChoice {
                        index: 0,
                        delta: ChoiceDelta {
                            content: Some(content),
                            tool_calls,
                            ..Default::default()
                        },
                        finish_reason,
                    }],
                    usage: full.usage,
                };
                let _ = tx.send(chunk_event(chunk));
            }
            Err(e) => {
                let _ = tx.send(Err(e));
            }
        }
    });

    Sse::new(UnboundedReceiverStream::new(rx)).keep_alive(KeepAlive::default())
}
