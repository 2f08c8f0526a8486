pub mod anthropic;
pub mod antigravity;
pub mod codex;
pub mod gemini_native;
pub mod geminicli;
pub mod openai_chat;
