use crate::translate::model_prefs::{ModelPreprocessed, ThinkingDirective};
use crate::translate::names::ToolNameMapper;
use crate::translate::safety::fixed_safety_settings;
use pollux_schema::anthropic::{AnthropicRequest, AnthropicTool, ContentBlock, InputMessage, ToolChoice};
use pollux_schema::gemini::{
    Content, FunctionDeclaration, GeminiGenerateContentRequest, GenerationConfig, Part, Tool, ToolConfig,
};
use serde_json::{Value, json};
use std::collections::BTreeMap;

const MAX_OUTPUT_TOKENS_CEILING: u32 = 65535;
const DEFAULT_TOP_K: u32 = 64;

/// Translate an Anthropic `/v1/messages` request into the internal Gemini
/// wire shape. Each content block becomes its own `Content` turn (rather
/// than grouping a message's blocks into one multi-part turn) so that a
/// `tool_result` block can be relocated next to the `function_call` it
/// answers without disturbing any sibling text/thinking blocks.
pub fn to_gemini(
    req: &AnthropicRequest,
    prep: &ModelPreprocessed,
) -> (GeminiGenerateContentRequest, ToolNameMapper) {
    let mut mapper = ToolNameMapper::new();
    let system_instruction = req.system.as_ref().map(|s| Content {
        role: None,
        parts: vec![Part {
            text: Some(s.as_text()),
            ..Default::default()
        }],
        extra: BTreeMap::new(),
    });

    let contents = map_messages(&req.messages, &mut mapper);

    let generation_config = build_generation_config(req, prep);

    let mut extra = BTreeMap::new();
    extra.insert("safetySettings".to_string(), fixed_safety_settings());

    let mut tools: Option<Vec<Tool>> = req.tools.as_ref().map(|tools| {
        vec![Tool {
            function_declarations: Some(
                tools
                    .iter()
                    .map(|tool| function_declaration(tool, &mut mapper))
                    .collect(),
            ),
            extra: BTreeMap::new(),
        }]
    });

    if prep.inject_search_tool {
        let search_tool = Tool {
            function_declarations: None,
            extra: BTreeMap::from([("googleSearch".to_string(), json!({}))]),
        };
        tools.get_or_insert_with(Vec::new).push(search_tool);
    }

    let tool_config = req.tool_choice.as_ref().map(tool_config_from_choice);

    (
        GeminiGenerateContentRequest {
            contents,
            system_instruction,
            generation_config: Some(generation_config),
            tools,
            tool_config,
            extra,
        },
        mapper,
    )
}

fn function_declaration(tool: &AnthropicTool, mapper: &mut ToolNameMapper) -> FunctionDeclaration {
    FunctionDeclaration {
        name: mapper.sanitise(&tool.name),
        description: tool.description.clone().unwrap_or_default(),
        behavior: None,
        parameters: None,
        parameters_json_schema: Some(tool.input_schema.clone()),
        response: None,
        response_json_schema: None,
        extra: BTreeMap::new(),
    }
}

fn tool_config_from_choice(choice: &ToolChoice) -> ToolConfig {
    let mode = match choice {
        ToolChoice::Auto => json!({"mode": "AUTO"}),
        ToolChoice::Any => json!({"mode": "ANY"}),
        ToolChoice::None => json!({"mode": "NONE"}),
        ToolChoice::Tool { name } => json!({"mode": "ANY", "allowedFunctionNames": [name]}),
    };

    ToolConfig {
        function_calling_config: Some(mode),
        retrieval_config: None,
        extra: BTreeMap::new(),
    }
}

fn map_messages(messages: &[InputMessage], mapper: &mut ToolNameMapper) -> Vec<Content> {
    let mut contents = Vec::new();
    let mut last_tool_use_order: Vec<String> = Vec::new();

    for message in messages {
        let role = if message.role == "assistant" { "model" } else { "user" };
        let mut blocks = message.content.blocks();

        if role == "user" {
            reorder_tool_results(&mut blocks, &last_tool_use_order);
        }

        let mut seen_tool_use = Vec::new();
        for block in &blocks {
            if let ContentBlock::ToolUse { id, .. } = block {
                seen_tool_use.push(id.clone());
            }
        }
        if !seen_tool_use.is_empty() {
            last_tool_use_order = seen_tool_use;
        }

        for block in blocks {
            if let Some(part) = map_block(block, mapper) {
                contents.push(Content {
                    role: Some(role.to_string()),
                    parts: vec![part],
                    extra: BTreeMap::new(),
                });
            }
        }
    }

    contents
}

/// Move `tool_result` blocks into the order their matching `tool_use`
/// blocks appeared in the previous assistant turn, so paired function
/// call/response turns stay adjacent. Results with no known match, or when
/// there was no preceding tool_use turn, keep their original relative order
/// at the end.
fn reorder_tool_results(blocks: &mut [ContentBlock], order: &[String]) {
    if order.is_empty() {
        return;
    }

    let rank = |block: &ContentBlock| -> usize {
        match block {
            ContentBlock::ToolResult { tool_use_id, .. } => order
                .iter()
                .position(|id| id == tool_use_id)
                .unwrap_or(order.len()),
            _ => order.len(),
        }
    };

    blocks.sort_by_key(rank);
}

fn map_block(block: ContentBlock, mapper: &mut ToolNameMapper) -> Option<Part> {
    match block {
        ContentBlock::Text { text, .. } => Some(Part {
            text: Some(text),
            ..Default::default()
        }),
        ContentBlock::Image { source } => Some(Part {
            inline_data: Some(json!({"mimeType": source.media_type, "data": source.data})),
            ..Default::default()
        }),
        ContentBlock::Thinking { thinking, signature } => Some(Part {
            text: Some(thinking),
            thought: Some(true),
            thought_signature: signature,
            ..Default::default()
        }),
        ContentBlock::RedactedThinking { data } => Some(Part {
            thought: Some(true),
            extra: BTreeMap::from([("redactedThinkingData".to_string(), json!(data))]),
            ..Default::default()
        }),
        ContentBlock::ToolUse { id, name, input } => Some(Part {
            function_call: Some(json!({
                "id": id,
                "name": mapper.sanitise(&name),
                "args": input,
            })),
            ..Default::default()
        }),
        ContentBlock::ToolResult {
            tool_use_id,
            content,
            is_error,
        } => {
            let output = content.map(|c| c.as_text()).unwrap_or_default();
            let response = if is_error == Some(true) {
                json!({"error": output})
            } else {
                json!({"output": output})
            };
            Some(Part {
                function_response: Some(json!({
                    "id": tool_use_id,
                    "response": response,
                })),
                ..Default::default()
            })
        }
        ContentBlock::Unknown => None,
    }
}

fn build_generation_config(req: &AnthropicRequest, prep: &ModelPreprocessed) -> GenerationConfig {
    let mut extra = BTreeMap::new();
    if let Some(stop) = &req.stop_sequences {
        extra.insert("stopSequences".to_string(), json!(stop));
    }

    let mut config = GenerationConfig {
        temperature: req.temperature,
        top_p: req.top_p,
        top_k: Some(req.top_k.unwrap_or(DEFAULT_TOP_K)),
        max_output_tokens: Some(req.max_tokens.min(MAX_OUTPUT_TOKENS_CEILING)),
        thinking_config: None,
        image_config: None,
        extra,
    };

    if let Some(directive) = prep.thinking {
        config.thinking_config = Some(thinking_config_value(directive));
    } else if let Some(thinking) = &req.thinking {
        config.thinking_config = Some(thinking_config_from_request(thinking));
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

/// Anthropic's `thinking: {type: "enabled", budget_tokens: N}` maps to a
/// Gemini thinking budget with thoughts always surfaced back to the caller.
fn thinking_config_from_request(thinking: &Value) -> Value {
    let budget = thinking.get("budget_tokens").and_then(Value::as_u64);
    match budget {
        Some(budget) => json!({"thinkingBudget": budget, "includeThoughts": true}),
        None => json!({"includeThoughts": true}),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pollux_schema::anthropic::{ImageSource, InputMessageContent, ToolResultContent};
    use std::collections::HashMap as StdHashMap;

    fn prep(model: &str) -> ModelPreprocessed {
        crate::translate::model_prefs::preprocess(model, &StdHashMap::new())
    }

    fn base_req(messages: Vec<InputMessage>) -> AnthropicRequest {
        AnthropicRequest {
            model: "claude-sonnet-4-5".to_string(),
            messages,
            max_tokens: 1024,
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
        }
    }

    fn text_msg(role: &str, text: &str) -> InputMessage {
        InputMessage {
            role: role.to_string(),
            content: InputMessageContent::Text(text.to_string()),
        }
    }

    #[test]
    fn plain_text_turns_map_one_to_one() {
        let req = base_req(vec![text_msg("user", "hi"), text_msg("assistant", "hello")]);
        let (gemini, _) = to_gemini(&req, &prep("claude-sonnet-4-5"));

        assert_eq!(gemini.contents.len(), 2);
        assert_eq!(gemini.contents[0].role.as_deref(), Some("user"));
        assert_eq!(gemini.contents[1].role.as_deref(), Some("model"));
        assert_eq!(gemini.contents[1].parts[0].text.as_deref(), Some("hello"));
    }

    #[test]
    fn max_tokens_is_clamped_to_ceiling() {
        let mut req = base_req(vec![text_msg("user", "hi")]);
        req.max_tokens = 999_999;
        let (gemini, _) = to_gemini(&req, &prep("claude-sonnet-4-5"));
        assert_eq!(
            gemini.generation_config.unwrap().max_output_tokens,
            Some(MAX_OUTPUT_TOKENS_CEILING)
        );
    }

    #[test]
    fn tool_use_maps_to_function_call_with_sanitised_name() {
        let assistant = InputMessage {
            role: "assistant".to_string(),
            content: InputMessageContent::Blocks(vec![ContentBlock::ToolUse {
                id: "toolu_1".to_string(),
                name: "weird name!".to_string(),
                input: json!({"x": 1}),
            }]),
        };
        let req = base_req(vec![text_msg("user", "hi"), assistant]);
        let (gemini, mapper) = to_gemini(&req, &prep("claude-sonnet-4-5"));

        let call = gemini.contents[1].parts[0].function_call.as_ref().unwrap();
        let sanitised = call.get("name").and_then(Value::as_str).unwrap();
        assert_eq!(mapper.denormalise(sanitised), "weird name!");
    }

    #[test]
    fn tool_results_are_reordered_to_match_preceding_tool_use_order() {
        let assistant = InputMessage {
            role: "assistant".to_string(),
            content: InputMessageContent::Blocks(vec![
                ContentBlock::ToolUse {
                    id: "first".to_string(),
                    name: "a".to_string(),
                    input: json!({}),
                },
                ContentBlock::ToolUse {
                    id: "second".to_string(),
                    name: "b".to_string(),
                    input: json!({}),
                },
            ]),
        };
        let user = InputMessage {
            role: "user".to_string(),
            content: InputMessageContent::Blocks(vec![
                ContentBlock::ToolResult {
                    tool_use_id: "second".to_string(),
                    content: Some(ToolResultContent::Text("b result".to_string())),
                    is_error: None,
                },
                ContentBlock::ToolResult {
                    tool_use_id: "first".to_string(),
                    content: Some(ToolResultContent::Text("a result".to_string())),
                    is_error: None,
                },
            ]),
        };

        let req = base_req(vec![text_msg("user", "hi"), assistant, user]);
        let (gemini, _) = to_gemini(&req, &prep("claude-sonnet-4-5"));

        // contents[1] and [2] are the tool_use turns, [3] and [4] the results,
        // reordered so "first" precedes "second".
        let first_response = gemini.contents[3].parts[0].function_response.as_ref().unwrap();
        assert_eq!(first_response.get("id").and_then(Value::as_str), Some("first"));
    }

    #[test]
    fn image_block_maps_to_inline_data() {
        let user = InputMessage {
            role: "user".to_string(),
            content: InputMessageContent::Blocks(vec![ContentBlock::Image {
                source: ImageSource {
                    source_type: "base64".to_string(),
                    media_type: "image/png".to_string(),
                    data: "abc123".to_string(),
                },
            }]),
        };
        let req = base_req(vec![user]);
        let (gemini, _) = to_gemini(&req, &prep("claude-sonnet-4-5"));

        let inline = gemini.contents[0].parts[0].inline_data.as_ref().unwrap();
        assert_eq!(inline.get("mimeType").and_then(Value::as_str), Some("image/png"));
    }

    #[test]
    fn tool_choice_specific_tool_sets_allowed_function_names() {
        let mut req = base_req(vec![text_msg("user", "hi")]);
        req.tool_choice = Some(ToolChoice::Tool {
            name: "get_weather".to_string(),
        });
        let (gemini, _) = to_gemini(&req, &prep("claude-sonnet-4-5"));

        let cfg = gemini.tool_config.unwrap().function_calling_config.unwrap();
        assert_eq!(cfg.get("mode").and_then(Value::as_str), Some("ANY"));
    }
}
