use crate::translate::names::ToolNameMapper;
use pollux_schema::gemini::{GeminiResponseBody, Part};
use pollux_schema::openai_chat::{
    ChatCompletionChunk, ChatCompletionResponse, ChoiceDelta, ChoiceMessage, ChunkChoice, Usage,
};
use pollux_schema::openai_chat::{Choice, FunctionCallOut, ToolCallOut};
use rand::Rng;
use serde_json::Value;

const EMPTY_CONTENT_WITH_REASONING: &str = "[模型正在思考中，请稍后再试或重新提问]";
const BOTH_EMPTY: &str = "[响应为空，请重新尝试]";

pub fn from_gemini_response(
    resp: &GeminiResponseBody,
    model: &str,
    mapper: &ToolNameMapper,
    created: i64,
    id: &str,
) -> ChatCompletionResponse {
    let candidate = resp.candidates.first();
    let parts = candidate
        .and_then(|c| c.content.as_ref())
        .map(|c| c.parts.as_slice())
        .unwrap_or(&[]);

    let (text, reasoning, tool_calls) = partition_parts(parts, mapper);

    let content = fallback_content(&text, &reasoning, &tool_calls);

    let finish_reason = if !tool_calls.is_empty() {
        Some("tool_calls".to_string())
    } else {
        candidate
            .and_then(|c| c.finish_reason.as_deref())
            .map(map_finish_reason)
    };

    let usage = resp.usageMetadata.as_ref().map(usage_from_metadata);

    ChatCompletionResponse {
        id: id.to_string(),
        object: "chat.completion".to_string(),
        created,
        model: model.to_string(),
        choices: vec![Choice {
            index: 0,
            message: ChoiceMessage {
                role: "assistant".to_string(),
                content,
                reasoning_content: (!reasoning.is_empty()).then_some(reasoning),
                tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
            },
            finish_reason,
        }],
        usage,
        extra: Default::default(),
    }
}

/// Translate one upstream SSE chunk (already unwrapped from the CLI
/// envelope) into an OpenAI `chat.completion.chunk`, reusing `id` across the
/// whole stream. Usage is only attached once `finish_reason` is known.
pub fn chunk_from_gemini_response(
    resp: &GeminiResponseBody,
    model: &str,
    mapper: &ToolNameMapper,
    created: i64,
    id: &str,
) -> ChatCompletionChunk {
    let candidate = resp.candidates.first();
    let parts = candidate
        .and_then(|c| c.content.as_ref())
        .map(|c| c.parts.as_slice())
        .unwrap_or(&[]);

    let (text, reasoning, tool_calls) = partition_parts(parts, mapper);

    let finish_reason = if !tool_calls.is_empty() {
        Some("tool_calls".to_string())
    } else {
        candidate
            .and_then(|c| c.finish_reason.as_deref())
            .map(map_finish_reason)
    };

    let usage = finish_reason
        .is_some()
        .then(|| resp.usageMetadata.as_ref().map(usage_from_metadata))
        .flatten();

    ChatCompletionChunk {
        id: id.to_string(),
        object: "chat.completion.chunk".to_string(),
        created,
        model: model.to_string(),
        choices: vec![ChunkChoice {
            index: 0,
            delta: ChoiceDelta {
                role: Some("assistant".to_string()),
                content: (!text.is_empty()).then_some(text),
                reasoning_content: (!reasoning.is_empty()).then_some(reasoning),
                tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
            },
            finish_reason,
        }],
        usage,
    }
}

fn partition_parts(parts: &[Part], mapper: &ToolNameMapper) -> (String, String, Vec<ToolCallOut>) {
    let mut text = String::new();
    let mut reasoning = String::new();
    let mut tool_calls = Vec::new();

    for part in parts {
        if let Some(call) = &part.function_call {
            let sanitised_name = call.get("name").and_then(Value::as_str).unwrap_or_default();
            let args = call.get("args").cloned().unwrap_or(Value::Null);
            tool_calls.push(ToolCallOut {
                id: format!("call_{}", random_hex(24)),
                r#type: "function".to_string(),
                function: FunctionCallOut {
                    name: mapper.denormalise(sanitised_name),
                    arguments: args.to_string(),
                },
            });
            continue;
        }

        let Some(part_text) = &part.text else { continue };
        if part.thought == Some(true) {
            reasoning.push_str(part_text);
        } else {
            text.push_str(part_text);
        }
    }

    (text, reasoning, tool_calls)
}

fn fallback_content(text: &str, reasoning: &str, tool_calls: &[ToolCallOut]) -> Option<String> {
    if !text.is_empty() {
        return Some(text.to_string());
    }
    if !tool_calls.is_empty() {
        return None;
    }
    if !reasoning.is_empty() {
        return Some(EMPTY_CONTENT_WITH_REASONING.to_string());
    }
    Some(BOTH_EMPTY.to_string())
}

fn map_finish_reason(reason: &str) -> String {
    match reason {
        "STOP" => "stop",
        "MAX_TOKENS" => "length",
        "SAFETY" | "RECITATION" => "content_filter",
        _ => return "null".to_string(),
    }
    .to_string()
}

fn usage_from_metadata(metadata: &Value) -> Usage {
    Usage {
        prompt_tokens: metadata
            .get("promptTokenCount")
            .and_then(Value::as_u64)
            .unwrap_or(0) as u32,
        completion_tokens: metadata
            .get("candidatesTokenCount")
            .and_then(Value::as_u64)
            .unwrap_or(0) as u32,
        total_tokens: metadata
            .get("totalTokenCount")
            .and_then(Value::as_u64)
            .unwrap_or(0) as u32,
    }
}

fn random_hex(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| std::char::from_digit(rng.random_range(0..16), 16).unwrap())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pollux_schema::gemini::Candidate;
    use pollux_schema::gemini::Content;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn response_with_text(text: &str, thought: bool, finish_reason: Option<&str>) -> GeminiResponseBody {
        GeminiResponseBody {
            candidates: vec![Candidate {
                content: Some(Content {
                    role: Some("model".to_string()),
                    parts: vec![Part {
                        text: Some(text.to_string()),
                        thought: thought.then_some(true),
                        ..Default::default()
                    }],
                    extra: BTreeMap::new(),
                }),
                index: Some(0),
                finish_reason: finish_reason.map(str::to_string),
                extra: BTreeMap::new(),
            }],
            promptFeedback: None,
            usageMetadata: Some(json!({
                "promptTokenCount": 10,
                "candidatesTokenCount": 5,
                "totalTokenCount": 15
            })),
            modelVersion: None,
            responseId: None,
            extra: BTreeMap::new(),
        }
    }

    #[test]
    fn text_round_trips_verbatim() {
        let resp = response_with_text("hello there", false, Some("STOP"));
        let mapper = ToolNameMapper::new();
        let out = from_gemini_response(&resp, "gemini-2.5-pro", &mapper, 0, "chatcmpl-1");

        assert_eq!(out.choices[0].message.content.as_deref(), Some("hello there"));
        assert_eq!(out.choices[0].finish_reason.as_deref(), Some("stop"));
        assert_eq!(out.usage.unwrap().total_tokens, 15);
    }

    #[test]
    fn empty_content_with_reasoning_gets_fallback_text() {
        let resp = response_with_text("pondering...", true, Some("STOP"));
        let mapper = ToolNameMapper::new();
        let out = from_gemini_response(&resp, "gemini-2.5-pro", &mapper, 0, "chatcmpl-1");

        assert_eq!(
            out.choices[0].message.content.as_deref(),
            Some(EMPTY_CONTENT_WITH_REASONING)
        );
        assert_eq!(out.choices[0].message.reasoning_content.as_deref(), Some("pondering..."));
    }

    #[test]
    fn fully_empty_response_gets_generic_fallback() {
        let mut resp = response_with_text("", false, Some("STOP"));
        resp.candidates[0].content.as_mut().unwrap().parts[0].text = None;
        let mapper = ToolNameMapper::new();
        let out = from_gemini_response(&resp, "gemini-2.5-pro", &mapper, 0, "chatcmpl-1");

        assert_eq!(out.choices[0].message.content.as_deref(), Some(BOTH_EMPTY));
    }

    #[test]
    fn function_call_maps_to_tool_call_with_denormalised_name() {
        let mut mapper = ToolNameMapper::new();
        let sanitised = mapper.sanitise("weird name!");

        let resp = GeminiResponseBody {
            candidates: vec![Candidate {
                content: Some(Content {
                    role: Some("model".to_string()),
                    parts: vec![Part {
                        function_call: Some(json!({"name": sanitised, "args": {"x": 1}})),
                        ..Default::default()
                    }],
                    extra: BTreeMap::new(),
                }),
                index: Some(0),
                finish_reason: Some("STOP".to_string()),
                extra: BTreeMap::new(),
            }],
            promptFeedback: None,
            usageMetadata: None,
            modelVersion: None,
            responseId: None,
            extra: BTreeMap::new(),
        };

        let out = from_gemini_response(&resp, "gemini-2.5-pro", &mapper, 0, "chatcmpl-1");
        let tool_calls = out.choices[0].message.tool_calls.as_ref().unwrap();
        assert_eq!(tool_calls[0].function.name, "weird name!");
        assert_eq!(out.choices[0].finish_reason.as_deref(), Some("tool_calls"));
    }

    #[test]
    fn usage_only_attached_to_chunk_with_finish_reason() {
        let mapper = ToolNameMapper::new();
        let mid_stream = response_with_text("partial", false, None);
        let chunk = chunk_from_gemini_response(&mid_stream, "gemini-2.5-pro", &mapper, 0, "chatcmpl-1");
        assert!(chunk.usage.is_none());

        let last = response_with_text("partial", false, Some("STOP"));
        let chunk = chunk_from_gemini_response(&last, "gemini-2.5-pro", &mapper, 0, "chatcmpl-1");
        assert!(chunk.usage.is_some());
    }
}
