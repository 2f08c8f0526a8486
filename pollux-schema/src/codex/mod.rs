//! Codex upstream wire schema (`/v1internal` request envelope + the
//! OpenAI-style error body Codex's upstream returns on failure).

mod codex_error;
mod codex_request;

pub use codex_error::{CodexErrorBody, CodexErrorObject};
pub use codex_request::CodexRequestBody;
