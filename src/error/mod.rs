mod anthropic;
mod codex;
mod gemini;
mod oauth;
mod openai_chat;
mod pollux;

pub use anthropic::AnthropicError;
pub(crate) use codex::CodexError;
pub use gemini::{
    GeminiCliError, GeminiCliErrorBody, GeminiCliErrorObject, GeminiErrorBody, GeminiErrorObject,
};
pub use oauth::OauthError;
pub use openai_chat::OpenAiChatError;
pub use pollux::{ApiErrorBody, ApiErrorObject, PolluxError};

pub trait IsRetryable {
    fn is_retryable(&self) -> bool;
}
