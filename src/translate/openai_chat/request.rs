use crate::translate::error::TranslateError;
use crate::translate::model_prefs::{ModelPreprocessed, ThinkingDirective};
use crate::translate::names::ToolNameMapper;
use crate::translate::safety::fixed_safety_settings;
use pollux_schema::gemini::{
    Content, GeminiGenerateContentRequest, GenerationConfig, Part, Tool, ToolConfig,
};
use pollux_schema::openai_chat::{ChatCompletionRequest, ChatMessage, MessageContent, MessageContentPart};
use serde_json::{Value, json};
use std::collections::BTreeMap;

const MAX_OUTPUT_TOKENS_CEILING: u32 = 65535;
const DEFAULT_TOP_K: u32 = 64;
const EMPTY_CONVERSATION_PLACEHOLDER: &str = "请根据系统指令回答。";

/// Translate an OpenAI Chat Completions request into the internal Gemini
/// wire shape, applying the already-preprocessed model directives.
pub fn to_gemini(
    req: &ChatCompletionRequest,
    prep: &ModelPreprocessed,
) -> Result<(GeminiGenerateContentRequest, ToolNameMapper), TranslateError> {
    let mut mapper = ToolNameMapper::new();
    let (system_instruction, contents) = map_messages(&req.messages, &mut mapper)?;

    let contents = if contents.is_empty() {
        vec![Content {
            role: Some("user".to_string()),
            parts: vec![Part {
                text: Some(EMPTY_CONVERSATION_PLACEHOLDER.to_string()),
                ..Default::default()
            }],
            extra: BTreeMap::new(),
        }]
    } else {
        contents
    };

    let generation_config = build_generation_config(req, prep);

    let mut extra = BTreeMap::new();
    extra.insert("safetySettings".to_string(), fixed_safety_settings());

    let mut tools = None;
    if prep.inject_search_tool {
        tools = Some(vec![Tool {
            function_declarations: None,
            extra: BTreeMap::from([("googleSearch".to_string(), json!({}))]),
        }]);
    }

    Ok((
        GeminiGenerateContentRequest {
            contents,
            system_instruction,
            generation_config: Some(generation_config),
            tools,
            tool_config: None::<ToolConfig>,
            extra,
        },
        mapper,
    ))
}

fn map_messages(
    messages: &[ChatMessage],
    mapper: &mut ToolNameMapper,
) -> Result<(Option<Content>, Vec<Content>), TranslateError> {
    let mut system_parts: Vec<String> = Vec::new();
    let mut still_leading = true;
    let mut contents = Vec::new();

    for message in messages {
        if message.role == "system" && still_leading {
            system_parts.push(message.content.as_ref().map(MessageContent::as_text).unwrap_or_default());
            continue;
        }
        still_leading = false;

        match message.role.as_str() {
            "system" => {
                // Demoted: a system message after the conversation has started.
                let text = message.content.as_ref().map(MessageContent::as_text).unwrap_or_default();
                contents.push(text_content("user", &text));
            }
            "tool" => {
                let name = message
                    .name
                    .clone()
                    .or_else(|| resolve_tool_name(&contents, message.tool_call_id.as_deref()))
                    .unwrap_or_else(|| "unknown".to_string());
                let output = message.content.as_ref().map(MessageContent::as_text).unwrap_or_default();
                contents.push(Content {
                    role: Some("user".to_string()),
                    parts: vec![Part {
                        function_response: Some(json!({
                            "name": name,
                            "response": {"output": output},
                        })),
                        ..Default::default()
                    }],
                    extra: BTreeMap::new(),
                });
            }
            "assistant" => {
                contents.push(map_assistant_message(message, mapper)?);
            }
            _ => {
                contents.push(map_user_message(message));
            }
        }
    }

    let system_instruction = (!system_parts.is_empty()).then(|| Content {
        role: None,
        parts: vec![Part {
            text: Some(system_parts.join("\n\n")),
            ..Default::default()
        }],
        extra: BTreeMap::new(),
    });

    Ok((system_instruction, contents))
}

fn text_content(role: &str, text: &str) -> Content {
    Content {
        role: Some(role.to_string()),
        parts: vec![Part {
            text: Some(text.to_string()),
            ..Default::default()
        }],
        extra: BTreeMap::new(),
    }
}

fn map_user_message(message: &ChatMessage) -> Content {
    let parts = match &message.content {
        Some(MessageContent::String(text)) => vec![Part {
            text: Some(text.clone()),
            ..Default::default()
        }],
        Some(MessageContent::Parts(parts)) => parts
            .iter()
            .filter_map(|part| match part {
                MessageContentPart::Text { text } => Some(Part {
                    text: Some(text.clone()),
                    ..Default::default()
                }),
                MessageContentPart::ImageUrl { image_url } => {
                    parse_data_url(&image_url.url).map(|(mime, data)| Part {
                        inline_data: Some(json!({"mimeType": mime, "data": data})),
                        ..Default::default()
                    })
                }
                MessageContentPart::Unknown => None,
            })
            .collect(),
        None => vec![],
    };

    Content {
        role: Some("user".to_string()),
        parts,
        extra: BTreeMap::new(),
    }
}

fn map_assistant_message(
    message: &ChatMessage,
    mapper: &mut ToolNameMapper,
) -> Result<Content, TranslateError> {
    let mut parts = Vec::new();

    if let Some(MessageContent::String(text)) = &message.content {
        if !text.is_empty() {
            parts.push(Part {
                text: Some(text.clone()),
                ..Default::default()
            });
        }
    }

    let mut any_call_parsed = false;
    let mut any_call_seen = false;

    if let Some(tool_calls) = &message.tool_calls {
        for call in tool_calls {
            any_call_seen = true;
            let args: Value = match serde_json::from_str(&call.function.arguments) {
                Ok(v) => {
                    any_call_parsed = true;
                    v
                }
                Err(_) => continue,
            };

            let name = mapper.sanitise(&call.function.name);
            parts.push(Part {
                function_call: Some(json!({
                    "id": call.id,
                    "name": name,
                    "args": args,
                })),
                ..Default::default()
            });
        }
    }

    if any_call_seen && !any_call_parsed && parts.is_empty() {
        return Err(TranslateError::InvalidToolCallArguments(
            message
                .tool_calls
                .as_ref()
                .map(|calls| calls.iter().map(|c| c.function.name.clone()).collect::<Vec<_>>().join(","))
                .unwrap_or_default(),
        ));
    }

    Ok(Content {
        role: Some("model".to_string()),
        parts,
        extra: BTreeMap::new(),
    })
}

/// Scan prior assistant messages for the tool call matching `tool_call_id`
/// to recover the function name a bare `tool` message doesn't carry itself.
fn resolve_tool_name(contents: &[Content], tool_call_id: Option<&str>) -> Option<String> {
    let tool_call_id = tool_call_id?;
    for content in contents.iter().rev() {
        for part in &content.parts {
            if let Some(call) = &part.function_call {
                if call.get("id").and_then(Value::as_str) == Some(tool_call_id) {
                    return call.get("name").and_then(Value::as_str).map(str::to_string);
                }
            }
        }
    }
    None
}

fn parse_data_url(url: &str) -> Option<(String, String)> {
    let rest = url.strip_prefix("data:")?;
    let (mime_and_encoding, data) = rest.split_once(',')?;
    let mime = mime_and_encoding.strip_suffix(";base64")?;
    Some((mime.to_string(), data.to_string()))
}

fn build_generation_config(req: &ChatCompletionRequest, prep: &ModelPreprocessed) -> GenerationConfig {
    let mut extra = BTreeMap::new();

    if let Some(stop) = &req.stop {
        extra.insert("stopSequences".to_string(), normalise_stop(stop));
    }
    if let Some(fp) = req.frequency_penalty {
        extra.insert("frequencyPenalty".to_string(), json!(fp));
    }
    if let Some(pp) = req.presence_penalty {
        extra.insert("presencePenalty".to_string(), json!(pp));
    }
    if let Some(n) = req.n {
        extra.insert("candidateCount".to_string(), json!(n));
    }
    if let Some(seed) = req.seed {
        extra.insert("seed".to_string(), json!(seed));
    }
    if matches!(req.response_format.as_ref().and_then(|v| v.get("type")).and_then(Value::as_str), Some("json_object")) {
        extra.insert("responseMimeType".to_string(), json!("application/json"));
    }

    let max_output_tokens = req
        .effective_max_tokens()
        .map(|tokens| tokens.min(MAX_OUTPUT_TOKENS_CEILING));

    let mut config = GenerationConfig {
        temperature: req.temperature,
        top_p: req.top_p,
        top_k: Some(DEFAULT_TOP_K),
        max_output_tokens,
        thinking_config: None,
        image_config: None,
        extra,
    };

    if let Some(directive) = prep.thinking {
        *config.thinking_config_mut() = Some(thinking_config_value(directive));
    }

    config
}

fn thinking_config_value(directive: ThinkingDirective) -> Value {
    match directive {
        ThinkingDirective::None { include_thoughts } => json!({
            "thinkingBudget": 128,
            "includeThoughts": include_thoughts,
        }),
        ThinkingDirective::Max { budget } => json!({
            "thinkingBudget": budget,
        }),
    }
}

fn normalise_stop(stop: &Value) -> Value {
    match stop {
        Value::String(_) => json!([stop]),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pollux_schema::openai_chat::{ToolCall, ToolCallFunction};
    use std::collections::HashMap as StdHashMap;

    fn prep(model: &str) -> ModelPreprocessed {
        crate::translate::model_prefs::preprocess(model, &StdHashMap::new())
    }

    fn msg(role: &str, text: &str) -> ChatMessage {
        ChatMessage {
            role: role.to_string(),
            content: Some(MessageContent::String(text.to_string())),
            reasoning_content: None,
            tool_calls: None,
            tool_call_id: None,
            name: None,
            extra: Default::default(),
        }
    }

    #[test]
    fn leading_system_messages_join_with_blank_line() {
        let messages = vec![msg("system", "be nice"), msg("system", "be brief"), msg("user", "hi")];
        let (req, _) = to_gemini(
            &ChatCompletionRequest {
                model: "gemini-2.5-pro".to_string(),
                messages,
                stream: false,
                temperature: None,
                top_p: None,
                n: None,
                seed: None,
                max_tokens: None,
                max_completion_tokens: None,
                stop: None,
                frequency_penalty: None,
                presence_penalty: None,
                response_format: None,
                tools: None,
                tool_choice: None,
                extra: Default::default(),
            },
            &prep("gemini-2.5-pro"),
        )
        .unwrap();

        assert_eq!(
            req.system_instruction.unwrap().parts[0].text.as_deref(),
            Some("be nice\n\nbe brief")
        );
        assert_eq!(req.contents.len(), 1);
        assert_eq!(req.contents[0].role.as_deref(), Some("user"));
    }

    #[test]
    fn system_message_after_conversation_start_is_demoted_to_user() {
        let messages = vec![msg("user", "hi"), msg("system", "late instruction")];
        let (req, _) = to_gemini(
            &ChatCompletionRequest {
                model: "gemini-2.5-pro".to_string(),
                messages,
                stream: false,
                temperature: None,
                top_p: None,
                n: None,
                seed: None,
                max_tokens: None,
                max_completion_tokens: None,
                stop: None,
                frequency_penalty: None,
                presence_penalty: None,
                response_format: None,
                tools: None,
                tool_choice: None,
                extra: Default::default(),
            },
            &prep("gemini-2.5-pro"),
        )
        .unwrap();

        assert!(req.system_instruction.is_none());
        assert_eq!(req.contents.len(), 2);
        assert_eq!(req.contents[1].role.as_deref(), Some("user"));
        assert_eq!(req.contents[1].parts[0].text.as_deref(), Some("late instruction"));
    }

    #[test]
    fn empty_conversation_gets_placeholder_message() {
        let (req, _) = to_gemini(
            &ChatCompletionRequest {
                model: "gemini-2.5-pro".to_string(),
                messages: vec![],
                stream: false,
                temperature: None,
                top_p: None,
                n: None,
                seed: None,
                max_tokens: None,
                max_completion_tokens: None,
                stop: None,
                frequency_penalty: None,
                presence_penalty: None,
                response_format: None,
                tools: None,
                tool_choice: None,
                extra: Default::default(),
            },
            &prep("gemini-2.5-pro"),
        )
        .unwrap();

        assert_eq!(req.contents.len(), 1);
        assert_eq!(
            req.contents[0].parts[0].text.as_deref(),
            Some(EMPTY_CONVERSATION_PLACEHOLDER)
        );
    }

    #[test]
    fn assistant_tool_call_with_unparseable_args_and_no_text_is_invalid() {
        let mut assistant = msg("assistant", "");
        assistant.content = None;
        assistant.tool_calls = Some(vec![ToolCall {
            id: "call_1".to_string(),
            r#type: "function".to_string(),
            function: ToolCallFunction {
                name: "do_thing".to_string(),
                arguments: "not json".to_string(),
            },
        }]);

        let messages = vec![msg("user", "hi"), assistant];
        let result = to_gemini(
            &ChatCompletionRequest {
                model: "gemini-2.5-pro".to_string(),
                messages,
                stream: false,
                temperature: None,
                top_p: None,
                n: None,
                seed: None,
                max_tokens: None,
                max_completion_tokens: None,
                stop: None,
                frequency_penalty: None,
                presence_penalty: None,
                response_format: None,
                tools: None,
                tool_choice: None,
                extra: Default::default(),
            },
            &prep("gemini-2.5-pro"),
        );

        assert!(matches!(result, Err(TranslateError::InvalidToolCallArguments(_))));
    }

    #[test]
    fn max_tokens_is_clamped_to_ceiling() {
        let (req, _) = to_gemini(
            &ChatCompletionRequest {
                model: "gemini-2.5-pro".to_string(),
                messages: vec![msg("user", "hi")],
                stream: false,
                temperature: None,
                top_p: None,
                n: None,
                seed: None,
                max_tokens: Some(999_999),
                max_completion_tokens: None,
                stop: None,
                frequency_penalty: None,
                presence_penalty: None,
                response_format: None,
                tools: None,
                tool_choice: None,
                extra: Default::default(),
            },
            &prep("gemini-2.5-pro"),
        )
        .unwrap();

        assert_eq!(
            req.generation_config.unwrap().max_output_tokens,
            Some(MAX_OUTPUT_TOKENS_CEILING)
        );
    }

    #[test]
    fn search_suffix_injects_google_search_tool() {
        let (req, _) = to_gemini(
            &ChatCompletionRequest {
                model: "gemini-2.5-pro-search".to_string(),
                messages: vec![msg("user", "hi")],
                stream: false,
                temperature: None,
                top_p: None,
                n: None,
                seed: None,
                max_tokens: None,
                max_completion_tokens: None,
                stop: None,
                frequency_penalty: None,
                presence_penalty: None,
                response_format: None,
                tools: None,
                tool_choice: None,
                extra: Default::default(),
            },
            &prep("gemini-2.5-pro-search"),
        )
        .unwrap();

        let tools = req.tools.unwrap();
        assert_eq!(tools.len(), 1);
        assert!(tools[0].extra.contains_key("googleSearch"));
    }
}
