//! Antigravity upstream wire schema (a Gemini `generateContent` envelope
//! wrapped with `session_id`/`requestId`/`userAgent`).

mod antigravity_request;

pub use antigravity_request::{AntigravityRequestBody, AntigravityRequestMeta};
