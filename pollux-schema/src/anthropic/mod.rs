//! Anthropic Messages wire schema (`/v1/messages`, `/v1/messages/count_tokens`).
//!
//! Same typed-with-catch-all approach as [`crate::gemini`] and
//! [`crate::openai_chat`]: known fields are strongly typed, everything else
//! round-trips through `extra`.

mod content;
mod error;
mod request;
mod response;
mod stream;

pub use content::{ContentBlock, ImageSource, SystemBlock, SystemPrompt, ToolResultContent};
pub use error::{AnthropicErrorBody, AnthropicErrorObject};
pub use request::{AnthropicRequest, AnthropicTool, InputMessage, InputMessageContent, ToolChoice};
pub use response::{AnthropicResponse, CountTokensResponse, StopReason, Usage};
pub use stream::AnthropicStreamEvent;
