//! End-to-end protocol-translation benchmarks: OpenAI Chat request -> the
//! internal Gemini wire shape -> back into an OpenAI response, the exact
//! round trip every `/v1/chat/completions` call pays on ingress/egress.

use std::collections::HashMap;

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use pollux::translate::{self, openai_chat};
use pollux_schema::gemini::GeminiResponseBody;
use pollux_schema::openai_chat::ChatCompletionRequest;
use serde_json::json;

fn sample_request() -> ChatCompletionRequest {
    let body = json!({
        "model": "gemini-2.5-pro",
        "stream": false,
        "temperature": 0.7,
        "messages": [
            {"role": "system", "content": "You are a helpful assistant."},
            {"role": "user", "content": "What's the weather like in Tokyo?"},
            {
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": "call_1",
                    "type": "function",
                    "function": {"name": "get_weather", "arguments": "{\"city\":\"Tokyo\"}"}
                }]
            },
            {"role": "tool", "tool_call_id": "call_1", "name": "get_weather", "content": "Sunny, 24C"},
        ],
        "tools": [{
            "type": "function",
            "function": {
                "name": "get_weather",
                "description": "Look up current weather for a city",
                "parameters": {"type": "object", "properties": {"city": {"type": "string"}}}
            }
        }],
    });
    serde_json::from_value(body).expect("fixture request must deserialize")
}

fn sample_gemini_response() -> GeminiResponseBody {
    let body = json!({
        "candidates": [{
            "content": {
                "role": "model",
                "parts": [
                    {"text": "It's sunny and 24C in Tokyo right now."}
                ]
            },
            "finishReason": "STOP",
            "index": 0
        }],
        "usageMetadata": {
            "promptTokenCount": 42,
            "candidatesTokenCount": 12,
            "totalTokenCount": 54
        }
    });
    serde_json::from_value(body).expect("fixture response must deserialize")
}

fn bench_request_translation(c: &mut Criterion) {
    let req = sample_request();
    let alias_table = HashMap::new();
    c.bench_function("openai_chat_request_to_gemini", |b| {
        b.iter(|| {
            let prep = translate::preprocess(black_box(&req.model), &alias_table);
            openai_chat::to_gemini(black_box(&req), &prep).expect("translation must succeed")
        });
    });
}

fn bench_response_translation(c: &mut Criterion) {
    let req = sample_request();
    let alias_table = HashMap::new();
    let prep = translate::preprocess(&req.model, &alias_table);
    let (_, mapper) = openai_chat::to_gemini(&req, &prep).expect("translation must succeed");
    let resp = sample_gemini_response();

    c.bench_function("gemini_response_to_openai_chat", |b| {
        b.iter(|| {
            openai_chat::from_gemini_response(
                black_box(&resp),
                "gemini-2.5-pro",
                &mapper,
                1_700_000_000,
                "chatcmpl-bench",
            )
        });
    });
}

fn bench_full_round_trip(c: &mut Criterion) {
    let req = sample_request();
    let alias_table = HashMap::new();
    let resp = sample_gemini_response();

    c.bench_function("openai_chat_full_round_trip", |b| {
        b.iter(|| {
            let prep = translate::preprocess(black_box(&req.model), &alias_table);
            let (_, mapper) =
                openai_chat::to_gemini(black_box(&req), &prep).expect("translation must succeed");
            openai_chat::from_gemini_response(
                black_box(&resp),
                &prep.model,
                &mapper,
                1_700_000_000,
                "chatcmpl-bench",
            )
        });
    });
}

criterion_group!(
    benches,
    bench_request_translation,
    bench_response_translation,
    bench_full_round_trip
);
criterion_main!(benches);
