//! OpenAI Chat Completions wire schema (`/v1/chat/completions`).
//!
//! Mirrors the typed-with-catch-all style used by the Gemini request schema:
//! known fields are strongly typed, everything else lands in `extra` so the
//! gateway can round-trip fields it doesn't understand yet.

mod message;
mod request;
mod response;

pub use message::{
    ChatMessage, MessageContent, MessageContentPart, ToolCall, ToolCallFunction,
};
pub use request::ChatCompletionRequest;
pub use response::{
    ChatCompletionChunk, ChatCompletionResponse, Choice, ChoiceDelta, ChunkChoice, FunctionCallOut,
    ToolCallOut, Usage,
};
