use crate::translate::names::ToolNameMapper;
use pollux_schema::anthropic::{
    AnthropicStreamEvent, ContentBlock, ContentDelta, MessageDeltaPayload, MessageStartPayload, StopReason, Usage,
};
use pollux_schema::gemini::{GeminiResponseBody, Part};
use serde_json::Value;

/// What kind of content block is currently open on the wire. Mirrors the
/// states a `/v1/messages` SSE consumer walks through: plain `None` between
/// blocks, `Text`/`Thinking` while consecutive chunks extend the same block,
/// `ToolUse` for a (always single-shot, from this proxy's perspective)
/// function call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    None,
    Text,
    Thinking,
    ToolUse,
}

/// Stateful translator from a sequence of upstream Gemini response chunks
/// into the Anthropic `/v1/messages` SSE event sequence. One instance per
/// request; call `start`, then `push_chunk` for every upstream chunk, then
/// `finish` once the upstream stream ends.
pub struct StreamTranslator {
    state: StreamState,
    current_index: u32,
    next_index: u32,
    pending_tool: Option<(String, String)>,
}

impl StreamTranslator {
    pub fn new() -> Self {
        Self {
            state: StreamState::None,
            current_index: 0,
            next_index: 0,
            pending_tool: None,
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn start(&self, id: &str, model: &str, input_tokens: u32) -> AnthropicStreamEvent {
        AnthropicStreamEvent::MessageStart {
            message: MessageStartPayload {
                id: id.to_string(),
                message_type: "message".to_string(),
                role: "assistant".to_string(),
                model: model.to_string(),
                content: vec![],
                usage: Usage {
                    input_tokens,
                    output_tokens: 0,
                    cache_creation_input_tokens: None,
                    cache_read_input_tokens: None,
                },
            },
        }
    }

    /// Translate one upstream chunk's parts into zero or more SSE events.
    pub fn push_chunk(&mut self, resp: &GeminiResponseBody, mapper: &ToolNameMapper) -> Vec<AnthropicStreamEvent> {
        let parts = resp
            .candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| c.parts.as_slice())
            .unwrap_or(&[]);

        let mut events = Vec::new();
        for part in parts {
            events.extend(self.push_part(part, mapper));
        }
        events
    }

    fn push_part(&mut self, part: &Part, mapper: &ToolNameMapper) -> Vec<AnthropicStreamEvent> {
        if let Some(call) = &part.function_call {
            return self.emit_tool_use(call, mapper);
        }

        let Some(text) = &part.text else { return vec![] };
        if part.thought == Some(true) {
            self.emit_delta(StreamState::Thinking, text, part)
        } else {
            self.emit_delta(StreamState::Text, text, part)
        }
    }

    fn emit_delta(&mut self, kind: StreamState, text: &str, part: &Part) -> Vec<AnthropicStreamEvent> {
        let mut events = Vec::new();

        if self.state != kind {
            events.extend(self.close_current());
            events.push(self.open_block(kind));
        }

        let delta = match kind {
            StreamState::Text => ContentDelta::TextDelta { text: text.to_string() },
            StreamState::Thinking => ContentDelta::ThinkingDelta { thinking: text.to_string() },
            _ => unreachable!("emit_delta only called for Text/Thinking"),
        };
        events.push(AnthropicStreamEvent::ContentBlockDelta {
            index: self.current_index,
            delta,
        });

        if kind == StreamState::Thinking {
            if let Some(signature) = &part.thought_signature {
                events.push(AnthropicStreamEvent::ContentBlockDelta {
                    index: self.current_index,
                    delta: ContentDelta::SignatureDelta {
                        signature: signature.clone(),
                    },
                });
            }
        }

        events
    }

    fn emit_tool_use(&mut self, call: &Value, mapper: &ToolNameMapper) -> Vec<AnthropicStreamEvent> {
        let mut events = self.close_current();

        let sanitised = call.get("name").and_then(Value::as_str).unwrap_or_default();
        let id = call.get("id").and_then(Value::as_str).unwrap_or_default();
        let args = call.get("args").cloned().unwrap_or(Value::Null);

        self.pending_tool = Some((id.to_string(), mapper.denormalise(sanitised)));
        events.push(self.open_block(StreamState::ToolUse));

        events.push(AnthropicStreamEvent::ContentBlockDelta {
            index: self.current_index,
            delta: ContentDelta::InputJsonDelta {
                partial_json: args.to_string(),
            },
        });

        // Gemini never streams a function call across multiple chunks, so a
        // tool_use block always closes in the same push it opened in.
        events.extend(self.close_current());
        events
    }

    fn open_block(&mut self, kind: StreamState) -> AnthropicStreamEvent {
        self.state = kind;
        self.current_index = self.next_index;
        self.next_index += 1;

        let content_block = match kind {
            StreamState::Text => ContentBlock::Text {
                text: String::new(),
                extra: Default::default(),
            },
            StreamState::Thinking => ContentBlock::Thinking {
                thinking: String::new(),
                signature: None,
            },
            StreamState::ToolUse => {
                let (id, name) = self.pending_tool.take().unwrap_or_default();
                ContentBlock::ToolUse {
                    id,
                    name,
                    input: Value::Null,
                }
            }
            StreamState::None => unreachable!("open_block never called with None"),
        };

        AnthropicStreamEvent::ContentBlockStart {
            index: self.current_index,
            content_block,
        }
    }

    fn close_current(&mut self) -> Vec<AnthropicStreamEvent> {
        if self.state == StreamState::None {
            return vec![];
        }
        let index = self.current_index;
        self.state = StreamState::None;
        vec![AnthropicStreamEvent::ContentBlockStop { index }]
    }

    /// Close any still-open block and emit the terminal `message_delta` +
    /// `message_stop` pair.
    pub fn finish(&mut self, finish_reason: Option<&str>, usage: Usage) -> Vec<AnthropicStreamEvent> {
        let mut events = self.close_current();

        events.push(AnthropicStreamEvent::MessageDelta {
            delta: MessageDeltaPayload {
                stop_reason: finish_reason.map(map_finish_reason),
                stop_sequence: None,
            },
            usage,
        });
        events.push(AnthropicStreamEvent::MessageStop);
        events
    }
}

impl Default for StreamTranslator {
    fn default() -> Self {
        Self::new()
    }
}

fn map_finish_reason(reason: &str) -> StopReason {
    match reason {
        "MAX_TOKENS" => StopReason::MaxTokens,
        _ => StopReason::EndTurn,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pollux_schema::gemini::{Candidate, Content};
    use serde_json::json;
    use std::collections::BTreeMap;

    fn chunk_with_text(text: &str) -> GeminiResponseBody {
        GeminiResponseBody {
            candidates: vec![Candidate {
                content: Some(Content {
                    role: Some("model".to_string()),
                    parts: vec![Part {
                        text: Some(text.to_string()),
                        ..Default::default()
                    }],
                    extra: BTreeMap::new(),
                }),
                index: Some(0),
                finish_reason: None,
                extra: BTreeMap::new(),
            }],
            promptFeedback: None,
            usageMetadata: None,
            modelVersion: None,
            responseId: None,
            extra: BTreeMap::new(),
        }
    }

    #[test]
    fn pure_text_stream_is_one_block_with_many_deltas() {
        let mapper = ToolNameMapper::new();
        let mut translator = StreamTranslator::new();

        let mut events = vec![translator.start("msg_1", "claude-sonnet-4-5", 10)];
        events.extend(translator.push_chunk(&chunk_with_text("hel"), &mapper));
        events.extend(translator.push_chunk(&chunk_with_text("lo"), &mapper));
        events.extend(translator.finish(
            Some("STOP"),
            Usage {
                input_tokens: 10,
                output_tokens: 2,
                cache_creation_input_tokens: None,
                cache_read_input_tokens: None,
            },
        ));

        assert!(matches!(events[0], AnthropicStreamEvent::MessageStart { .. }));
        assert!(matches!(events[1], AnthropicStreamEvent::ContentBlockStart { index: 0, .. }));
        assert!(matches!(&events[2], AnthropicStreamEvent::ContentBlockDelta { index: 0, delta: ContentDelta::TextDelta { text } } if text == "hel"));
        assert!(matches!(&events[3], AnthropicStreamEvent::ContentBlockDelta { index: 0, delta: ContentDelta::TextDelta { text } } if text == "lo"));
        assert!(matches!(events[4], AnthropicStreamEvent::ContentBlockStop { index: 0 }));
        assert!(matches!(events[5], AnthropicStreamEvent::MessageDelta { .. }));
        assert!(matches!(events[6], AnthropicStreamEvent::MessageStop));
        assert_eq!(events.len(), 7);
    }

    #[test]
    fn switching_from_thinking_to_text_closes_and_opens_a_new_block() {
        let mapper = ToolNameMapper::new();
        let mut translator = StreamTranslator::new();

        let thinking_chunk = GeminiResponseBody {
            candidates: vec![Candidate {
                content: Some(Content {
                    role: Some("model".to_string()),
                    parts: vec![Part {
                        text: Some("pondering".to_string()),
                        thought: Some(true),
                        ..Default::default()
                    }],
                    extra: BTreeMap::new(),
                }),
                index: Some(0),
                finish_reason: None,
                extra: BTreeMap::new(),
            }],
            promptFeedback: None,
            usageMetadata: None,
            modelVersion: None,
            responseId: None,
            extra: BTreeMap::new(),
        };

        let mut events = translator.push_chunk(&thinking_chunk, &mapper);
        events.extend(translator.push_chunk(&chunk_with_text("answer"), &mapper));

        assert!(matches!(events[0], AnthropicStreamEvent::ContentBlockStart { index: 0, .. }));
        assert!(matches!(events[1], AnthropicStreamEvent::ContentBlockDelta { index: 0, .. }));
        assert!(matches!(events[2], AnthropicStreamEvent::ContentBlockStop { index: 0 }));
        assert!(matches!(events[3], AnthropicStreamEvent::ContentBlockStart { index: 1, .. }));
        assert!(matches!(events[4], AnthropicStreamEvent::ContentBlockDelta { index: 1, .. }));
    }

    #[test]
    fn tool_use_block_opens_and_closes_within_one_push() {
        let mapper = ToolNameMapper::new();
        let mut translator = StreamTranslator::new();

        let chunk = GeminiResponseBody {
            candidates: vec![Candidate {
                content: Some(Content {
                    role: Some("model".to_string()),
                    parts: vec![Part {
                        function_call: Some(json!({"id": "toolu_1", "name": "get_weather", "args": {"city": "sf"}})),
                        ..Default::default()
                    }],
                    extra: BTreeMap::new(),
                }),
                index: Some(0),
                finish_reason: None,
                extra: BTreeMap::new(),
            }],
            promptFeedback: None,
            usageMetadata: None,
            modelVersion: None,
            responseId: None,
            extra: BTreeMap::new(),
        };

        let events = translator.push_chunk(&chunk, &mapper);
        assert!(matches!(events[0], AnthropicStreamEvent::ContentBlockStart { index: 0, .. }));
        assert!(matches!(events[1], AnthropicStreamEvent::ContentBlockDelta { index: 0, .. }));
        assert!(matches!(events[2], AnthropicStreamEvent::ContentBlockStop { index: 0 }));
        assert_eq!(translator.state(), StreamState::None);
    }
}
