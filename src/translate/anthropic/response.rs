use crate::translate::names::ToolNameMapper;
use pollux_schema::anthropic::{AnthropicRequest, AnthropicResponse, ContentBlock, CountTokensResponse, StopReason, Usage};
use pollux_schema::gemini::{GeminiResponseBody, Part};
use serde_json::Value;

const CHARS_PER_TOKEN: usize = 4;
const TOKENS_PER_IMAGE: usize = 300;

pub fn from_gemini_response(
    resp: &GeminiResponseBody,
    model: &str,
    mapper: &ToolNameMapper,
    id: &str,
) -> AnthropicResponse {
    let candidate = resp.candidates.first();
    let parts = candidate
        .and_then(|c| c.content.as_ref())
        .map(|c| c.parts.as_slice())
        .unwrap_or(&[]);

    let content = parts.iter().filter_map(|part| map_part(part, mapper)).collect();

    let has_tool_use = parts.iter().any(|p| p.function_call.is_some());
    let stop_reason = if has_tool_use {
        Some(StopReason::ToolUse)
    } else {
        candidate
            .and_then(|c| c.finish_reason.as_deref())
            .map(map_finish_reason)
    };

    let usage = resp
        .usageMetadata
        .as_ref()
        .map(usage_from_metadata)
        .unwrap_or_default();

    AnthropicResponse {
        id: id.to_string(),
        response_type: "message".to_string(),
        role: "assistant".to_string(),
        model: model.to_string(),
        content,
        stop_reason,
        stop_sequence: None,
        usage,
        extra: Default::default(),
    }
}

fn map_part(part: &Part, mapper: &ToolNameMapper) -> Option<ContentBlock> {
    if let Some(call) = &part.function_call {
        let sanitised = call.get("name").and_then(Value::as_str).unwrap_or_default();
        return Some(ContentBlock::ToolUse {
            id: call
                .get("id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            name: mapper.denormalise(sanitised),
            input: call.get("args").cloned().unwrap_or(Value::Null),
        });
    }

    let text = part.text.as_ref()?;
    if part.thought == Some(true) {
        return Some(ContentBlock::Thinking {
            thinking: text.clone(),
            signature: part.thought_signature.clone(),
        });
    }

    Some(ContentBlock::Text {
        text: text.clone(),
        extra: Default::default(),
    })
}

fn map_finish_reason(reason: &str) -> StopReason {
    match reason {
        "MAX_TOKENS" => StopReason::MaxTokens,
        _ => StopReason::EndTurn,
    }
}

fn usage_from_metadata(metadata: &Value) -> Usage {
    Usage {
        input_tokens: metadata
            .get("promptTokenCount")
            .and_then(Value::as_u64)
            .unwrap_or(0) as u32,
        output_tokens: metadata
            .get("candidatesTokenCount")
            .and_then(Value::as_u64)
            .unwrap_or(0) as u32,
        cache_creation_input_tokens: None,
        cache_read_input_tokens: None,
    }
}

/// Local token estimate for `/v1/messages/count_tokens`: this proxy never
/// calls upstream for a count, it approximates from the request body itself.
pub fn count_tokens(req: &AnthropicRequest) -> CountTokensResponse {
    let mut chars = req.system.as_ref().map(|s| s.as_text().chars().count()).unwrap_or(0);
    let mut images = 0usize;

    for message in &req.messages {
        for block in message.content.blocks() {
            match block {
                ContentBlock::Text { text, .. } => chars += text.chars().count(),
                ContentBlock::Thinking { thinking, .. } => chars += thinking.chars().count(),
                ContentBlock::ToolResult { content: Some(c), .. } => chars += c.as_text().chars().count(),
                ContentBlock::ToolUse { input, .. } => chars += input.to_string().chars().count(),
                ContentBlock::Image { .. } => images += 1,
                _ => {}
            }
        }
    }

    let estimate = chars.div_ceil(CHARS_PER_TOKEN) + images * TOKENS_PER_IMAGE;

    CountTokensResponse {
        input_tokens: estimate.max(1) as u32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pollux_schema::anthropic::InputMessage;
    use pollux_schema::anthropic::InputMessageContent;
    use pollux_schema::gemini::{Candidate, Content};
    use serde_json::json;
    use std::collections::BTreeMap;

    #[test]
    fn text_response_maps_to_text_block_and_end_turn() {
        let resp = GeminiResponseBody {
            candidates: vec![Candidate {
                content: Some(Content {
                    role: Some("model".to_string()),
                    parts: vec![Part {
                        text: Some("hi there".to_string()),
                        ..Default::default()
                    }],
                    extra: BTreeMap::new(),
                }),
                index: Some(0),
                finish_reason: Some("STOP".to_string()),
                extra: BTreeMap::new(),
            }],
            promptFeedback: None,
            usageMetadata: Some(json!({"promptTokenCount": 5, "candidatesTokenCount": 2})),
            modelVersion: None,
            responseId: None,
            extra: BTreeMap::new(),
        };
        let mapper = ToolNameMapper::new();
        let out = from_gemini_response(&resp, "claude-sonnet-4-5", &mapper, "msg_1");

        assert_eq!(out.stop_reason, Some(StopReason::EndTurn));
        assert!(matches!(&out.content[0], ContentBlock::Text { text, .. } if text == "hi there"));
        assert_eq!(out.usage.input_tokens, 5);
    }

    #[test]
    fn function_call_maps_to_tool_use_with_tool_use_stop_reason() {
        let resp = GeminiResponseBody {
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
                finish_reason: Some("STOP".to_string()),
                extra: BTreeMap::new(),
            }],
            promptFeedback: None,
            usageMetadata: None,
            modelVersion: None,
            responseId: None,
            extra: BTreeMap::new(),
        };
        let mapper = ToolNameMapper::new();
        let out = from_gemini_response(&resp, "claude-sonnet-4-5", &mapper, "msg_1");

        assert_eq!(out.stop_reason, Some(StopReason::ToolUse));
        assert!(matches!(&out.content[0], ContentBlock::ToolUse { name, .. } if name == "get_weather"));
    }

    #[test]
    fn count_tokens_estimates_from_chars_and_images() {
        let req = AnthropicRequest {
            model: "claude-sonnet-4-5".to_string(),
            messages: vec![InputMessage {
                role: "user".to_string(),
                content: InputMessageContent::Text("a".repeat(40)),
            }],
            max_tokens: 100,
            system: None,
            stream: false,
            temperature: None,
            top_p: None,
            top_k: None,
            stop_sequences: None,
            tools: None,
            tool_choice: None,
            thinking: None,
            extra: Default::default(),
        };

        let out = count_tokens(&req);
        assert_eq!(out.input_tokens, 10);
    }

    #[test]
    fn count_tokens_never_reports_zero() {
        let req = AnthropicRequest {
            model: "claude-sonnet-4-5".to_string(),
            messages: vec![],
            max_tokens: 100,
            system: None,
            stream: false,
            temperature: None,
            top_p: None,
            top_k: None,
            stop_sequences: None,
            tools: None,
            tool_choice: None,
            thinking: None,
            extra: Default::default(),
        };

        assert_eq!(count_tokens(&req).input_tokens, 1);
    }
}
