pub mod anthropic;
pub mod antigravity;
pub mod codex;
pub mod gemini;
pub mod geminicli;
pub mod openai;
pub mod openai_chat;

pub use anthropic::{
    AnthropicErrorBody, AnthropicErrorObject, AnthropicRequest, AnthropicResponse,
    AnthropicStreamEvent, ContentBlock, SystemPrompt,
};
pub use antigravity::{AntigravityRequestBody, AntigravityRequestMeta};
pub use codex::{CodexErrorBody, CodexRequestBody};
pub use geminicli::{GeminiCliRequest, GeminiCliRequestMeta, GeminiCliResponseBody};
pub use openai::{OpenaiRequestBody, OpenaiResponsesErrorBody, OpenaiResponsesErrorObject};
pub use openai_chat::{ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse};
