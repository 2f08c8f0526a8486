//! Anthropic Messages API error schema.

use serde::{Deserialize, Serialize};

/// Anthropic-compatible error response schema.
///
/// Standard envelope:
/// `{ "type": "error", "error": { "type": "...", "message": "..." } }`
#[derive(Debug, Serialize, Deserialize)]
pub struct AnthropicErrorBody {
    #[serde(rename = "type")]
    pub envelope_type: AnthropicErrorEnvelope,
    pub error: AnthropicErrorObject,
}

#[derive(Debug, Serialize, Deserialize)]
pub enum AnthropicErrorEnvelope {
    #[serde(rename = "error")]
    Error,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnthropicErrorObject {
    pub r#type: String,
    pub message: String,
}

impl AnthropicErrorBody {
    pub fn new(r#type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            envelope_type: AnthropicErrorEnvelope::Error,
            error: AnthropicErrorObject {
                r#type: r#type.into(),
                message: message.into(),
            },
        }
    }
}
