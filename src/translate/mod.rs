//! Conversion between caller-facing wire protocols (OpenAI Chat, Anthropic
//! Messages) and the internal Gemini request/response shapes every provider
//! client speaks on the wire.

mod error;
pub mod fake_stream;
mod model_prefs;
mod names;
mod safety;

pub mod anthropic;
pub mod openai_chat;

pub use error::TranslateError;
pub use fake_stream::{EMPTY_PLACEHOLDER, HEARTBEAT_INTERVAL, THINKING_PLACEHOLDER, resolve_content};
pub use model_prefs::{AliasRule, ModelPreprocessed, ThinkingDirective, parse_target_provider, preprocess};
pub use names::{ToolNameMapper, normalise};
pub use safety::fixed_safety_settings;
